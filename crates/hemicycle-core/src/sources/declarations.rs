//! Interest declarations published by the transparency authority.

use crate::extract::{SectionMarker, ShapeDescriptor, TagMatcher, extract};
use crate::models::{DeclarationRecord, DeputySummary};
use crate::util::{collapse_whitespace, find_date, normalize_name};

use super::absolute_url;

pub fn declaration_index_shape() -> ShapeDescriptor {
    ShapeDescriptor::new("declaration-index", TagMatcher::tag("ul"))
        .section(SectionMarker::by_id("div", "resultats"))
        .entry("li")
        .capture("href")
}

pub fn declarations_shape() -> ShapeDescriptor {
    ShapeDescriptor::new("declarations", TagMatcher::tag("ul"))
        .section(SectionMarker::by_id("div", "declarations"))
        .entry("li")
        .capture("href")
}

/// A declarant listed in the search results, with the page of their declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarantLink {
    pub name: String,
    pub url: String,
}

pub fn parse_declaration_index(document: &str, base: &str) -> Option<Vec<DeclarantLink>> {
    let doc = extract(document, &declaration_index_shape());
    let section = doc.section("resultats")?;
    let links = section
        .entries
        .iter()
        .filter_map(|entry| {
            let url = absolute_url(base, entry.attribute("href")?)?;
            let name = collapse_whitespace(&entry.texts.join(" "));
            (!name.is_empty()).then_some(DeclarantLink { name, url })
        })
        .collect();
    Some(links)
}

/// Find a deputy among declarants, in either name order.
pub fn find_declarant<'a>(
    links: &'a [DeclarantLink],
    deputy: &DeputySummary,
) -> Option<&'a DeclarantLink> {
    let forward = normalize_name(&format!("{} {}", deputy.first_name, deputy.last_name));
    let backward = normalize_name(&format!("{} {}", deputy.last_name, deputy.first_name));
    links.iter().find(|link| {
        let name = normalize_name(&link.name);
        name == forward || name == backward
    })
}

/// Each `li` reads as title then date; the link points at the document.
pub fn parse_declarations(document: &str, base: &str) -> Option<Vec<DeclarationRecord>> {
    let doc = extract(document, &declarations_shape());
    let section = doc.section("declarations")?;
    let records = section
        .entries
        .iter()
        .filter_map(|entry| {
            Some(DeclarationRecord {
                title: collapse_whitespace(entry.text(0)?),
                date: entry.texts.iter().skip(1).find_map(|t| find_date(t)),
                url: absolute_url(base, entry.attribute("href")?)?,
            })
        })
        .collect();
    Some(records)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn deputy(first: &str, last: &str) -> DeputySummary {
        DeputySummary {
            official_id: "1".into(),
            first_name: first.into(),
            last_name: last.into(),
            constituency: None,
        }
    }

    #[test]
    fn test_parse_index_and_find_declarant() {
        let html = r#"
            <div id="resultats"><ul>
              <li><a href="/fiche-nominative/?declarant=dupont-jean">M. DUPONT Jean</a></li>
              <li><a href="/fiche-nominative/?declarant=martin-elise">MARTIN Élise</a></li>
              <li>Pas de lien</li>
            </ul></div>"#;
        let links = parse_declaration_index(html, "http://hatvp.example/recherche").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(
            links[1].url,
            "http://hatvp.example/fiche-nominative/?declarant=martin-elise"
        );

        let found = find_declarant(&links, &deputy("Élise", "Martin")).unwrap();
        assert_eq!(found.name, "MARTIN Élise");
        assert!(find_declarant(&links, &deputy("Jean", "Dupont")).is_none());
    }

    #[test]
    fn test_parse_declarations() {
        let html = r#"
            <div id="declarations"><ul>
              <li><a href="/pdf/di-1.pdf">Déclaration d'intérêts et d'activités</a> <span>publiée le 05/10/2017</span></li>
              <li><a href="/pdf/dsp-1.pdf">Déclaration de situation patrimoniale</a></li>
            </ul></div>"#;
        let records = parse_declarations(html, "http://hatvp.example/fiche").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Déclaration d'intérêts et d'activités");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2017, 10, 5));
        assert_eq!(records[0].url, "http://hatvp.example/pdf/di-1.pdf");
        assert_eq!(records[1].date, None);
    }

    #[test]
    fn test_missing_sections() {
        assert_eq!(parse_declarations("<html></html>", "http://x"), None);
        assert_eq!(parse_declaration_index("<html></html>", "http://x"), None);
    }
}
