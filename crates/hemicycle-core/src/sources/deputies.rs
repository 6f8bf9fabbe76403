//! Deputy list and deputy profile pages.

use crate::extract::{ExtractedDocument, SectionMarker, ShapeDescriptor, TagMatcher, extract};
use crate::models::{DeputyProfile, DeputySummary, EndOfMandate, InstanceRole, MandateRecord};
use crate::util::{collapse_whitespace, find_date};

use super::label_value;

pub const SECTION_CURRENT: &str = "autres";
pub const SECTION_PAST_DEPUTY: &str = "mandats-an-historique";
pub const SECTION_PAST_NATIONAL: &str = "mandats-nationaux-historique";
pub const SECTION_PAST_INTERNATIONAL: &str = "internationales-judiciaires-historique";
const SECTION_INFOS: &str = "infos";
const SECTION_INSTANCES: &str = "instances";
const SECTION_END: &str = "fin-mandat";

const MANDATE_SECTIONS: [&str; 4] = [
    SECTION_CURRENT,
    SECTION_PAST_DEPUTY,
    SECTION_PAST_NATIONAL,
    SECTION_PAST_INTERNATIONAL,
];

/// Profile URLs end in `OMC_PA{id}`.
const ID_PREFIX: &str = "OMC_PA";

pub fn deputy_list_shape() -> ShapeDescriptor {
    ShapeDescriptor::new("deputy-list", TagMatcher::tag("tbody"))
        .section(SectionMarker::by_id("table", "deputes"))
        .entry("tr")
        .capture("href")
}

pub fn deputy_profile_shape() -> ShapeDescriptor {
    ShapeDescriptor::new("deputy-profile", TagMatcher::tag("ul"))
        .section(SectionMarker::by_id("div", SECTION_CURRENT))
        .section(
            SectionMarker::by_id("div", SECTION_PAST_DEPUTY)
                .gated("Mandat de député", "h4")
                .with_container(TagMatcher::with_class("ul", "fonctions-liste-attributs")),
        )
        .section(SectionMarker::by_id("div", SECTION_PAST_NATIONAL))
        .section(SectionMarker::by_id("div", SECTION_PAST_INTERNATIONAL))
        .section(SectionMarker::by_id("div", SECTION_INFOS))
        .section(SectionMarker::by_id("div", SECTION_INSTANCES))
        .section(SectionMarker::by_id("div", SECTION_END).with_container(TagMatcher::tag("p")))
        .entry("li")
}

/// Rows of the deputy table: last name, first name, constituency.
///
/// Rows without a recognizable profile link are dropped.
pub fn parse_deputy_list(document: &str) -> Option<Vec<DeputySummary>> {
    let doc = extract(document, &deputy_list_shape());
    let section = doc.section("deputes")?;

    let deputies = section
        .entries
        .iter()
        .filter_map(|row| {
            let official_id = official_id_from_href(row.attribute("href")?)?;
            let last_name = collapse_whitespace(row.text(0)?);
            let first_name = collapse_whitespace(row.text(1).unwrap_or_default());
            let constituency = row.text(2).map(collapse_whitespace);
            Some(DeputySummary {
                official_id,
                first_name,
                last_name,
                constituency,
            })
        })
        .collect();
    Some(deputies)
}

/// `.../deputes/fiche/OMC_PA1012` -> `1012`.
pub fn official_id_from_href(href: &str) -> Option<String> {
    let start = href.rfind(ID_PREFIX)? + ID_PREFIX.len();
    let id: String = href[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    (!id.is_empty()).then_some(id)
}

/// Everything read from one profile page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePage {
    pub profile: DeputyProfile,
    /// `None` when none of the mandate sections are present.
    pub mandates: Option<MandateRecord>,
    pub instances: Vec<InstanceRole>,
}

/// Parse a profile page; `None` if it carries none of the known sections.
pub fn parse_profile(document: &str) -> Option<ProfilePage> {
    let doc = extract(document, &deputy_profile_shape());
    if doc.is_empty() {
        return None;
    }
    Some(ProfilePage {
        profile: profile_infos(&doc),
        mandates: mandates(&doc),
        instances: instances(&doc),
    })
}

/// `<li><span>Commission des finances</span><span>Vice-président</span></li>`.
///
/// An entry with a single text is a plain membership.
fn instances(doc: &ExtractedDocument) -> Vec<InstanceRole> {
    let Some(section) = doc.section(SECTION_INSTANCES) else {
        return Vec::new();
    };
    section
        .entries
        .iter()
        .filter_map(|entry| {
            let (instance, role) = entry.texts.split_first()?;
            let role = collapse_whitespace(&role.join(" "));
            Some(InstanceRole {
                instance: collapse_whitespace(instance),
                role: (!role.is_empty()).then_some(role),
            })
        })
        .collect()
}

fn profile_infos(doc: &ExtractedDocument) -> DeputyProfile {
    let mut profile = DeputyProfile::default();

    if let Some(infos) = doc.section(SECTION_INFOS) {
        for (label, value) in infos.entries.iter().filter_map(label_value) {
            if label.starts_with("mél") || label.starts_with("email") || label.starts_with("courriel") {
                profile.email = Some(value);
            } else if label.starts_with("téléphone") {
                profile.phone = Some(value);
            } else if label.starts_with("profession") {
                profile.job = Some(value);
            } else if label.starts_with("né") {
                profile.birth_date = find_date(&value);
            } else if label.starts_with("groupe") {
                profile.parliament_group = Some(value);
            } else if label.starts_with("place") || label.starts_with("siège") {
                profile.seat_number = Some(value);
            } else if label.starts_with("début de mandat") {
                profile.current_mandate_start = find_date(&value);
            }
        }
    }

    profile.end_of_mandate = doc.joined(SECTION_END).map(|text| end_of_mandate(&text));
    profile
}

/// "Mandat clos le 20/06/2022 (Fin de législature)" -> date + reason.
fn end_of_mandate(text: &str) -> EndOfMandate {
    let reason = text
        .rfind('(')
        .and_then(|open| {
            let inner = &text[open + 1..];
            inner.find(')').map(|close| inner[..close].trim().to_string())
        })
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| text.to_string());
    EndOfMandate {
        date: find_date(text),
        reason,
    }
}

fn mandates(doc: &ExtractedDocument) -> Option<MandateRecord> {
    let missing_sections: Vec<String> = MANDATE_SECTIONS
        .iter()
        .filter(|id| doc.section(id).is_none())
        .map(|id| id.to_string())
        .collect();
    if missing_sections.len() == MANDATE_SECTIONS.len() {
        return None;
    }

    let items = |id: &str| doc.items(id).map(<[String]>::to_vec).unwrap_or_default();
    Some(MandateRecord {
        current_mandates: items(SECTION_CURRENT),
        past_deputy_mandates: items(SECTION_PAST_DEPUTY),
        past_national_missions: items(SECTION_PAST_NATIONAL),
        past_international_missions: items(SECTION_PAST_INTERNATIONAL),
        missing_sections,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const LIST: &str = r#"
        <html><body>
        <table id="deputes">
          <thead><tr><th>Nom</th><th>Prénom</th><th>Département</th></tr></thead>
          <tbody>
            <tr><td><a href="/deputes/fiche/OMC_PA1012">Dupont</a></td><td>Jean</td><td>Ain (1ère)</td></tr>
            <tr><td><a href="/deputes/fiche/OMC_PA722142">Martin</a></td><td>Élise</td><td>Paris (5ème)</td></tr>
            <tr><td>Sans lien</td><td>Personne</td><td>Nulle part</td></tr>
          </tbody>
        </table>
        </body></html>"#;

    const PROFILE: &str = r#"
        <html><body>
        <div id="infos">
          <ul>
            <li><span>Né le</span><span>12 mars 1970 à Lyon (Rhône)</span></li>
            <li><span>Profession :</span><span>Avocat</span></li>
            <li><span>Mél</span><a href="mailto:jean.dupont@example.fr">jean.dupont@example.fr</a></li>
            <li><span>Téléphone</span><span>01 40 63 60 00</span></li>
            <li><span>Groupe politique</span><span>Non inscrit</span></li>
            <li><span>Place dans l'hémicycle</span><span>512</span></li>
            <li><span>Début de mandat</span><span>21/06/2017</span></li>
          </ul>
        </div>
        <div id="autres">
          <h3>Mandats locaux en cours</h3>
          <ul><li>Conseiller municipal de Bourg-en-Bresse</li></ul>
        </div>
        <div id="mandats-an-historique">
          <h4>Mandat de sénateur</h4>
          <ul class="fonctions-liste-attributs"><li>Sénateur de l'Ain</li></ul>
          <h4>Mandat de député</h4>
          <ul class="fonctions-liste-attributs"><li>Du 20/06/2012 au 20/06/2017 (Ain)</li></ul>
        </div>
        <div id="mandats-nationaux-historique">
          <ul><li>Secrétaire d'État</li></ul>
        </div>
        <div id="instances">
          <h3>Organes</h3>
          <ul>
            <li><span>Commission des finances</span><span>Vice-président</span></li>
            <li><span>Délégation aux droits des femmes</span></li>
          </ul>
        </div>
        </body></html>"#;

    #[test]
    fn test_parse_deputy_list() {
        let deputies = parse_deputy_list(LIST).unwrap();
        assert_eq!(deputies.len(), 2);
        assert_eq!(deputies[0].official_id, "1012");
        assert_eq!(deputies[0].last_name, "Dupont");
        assert_eq!(deputies[0].first_name, "Jean");
        assert_eq!(deputies[0].constituency.as_deref(), Some("Ain (1ère)"));
        assert_eq!(deputies[1].full_name(), "Élise Martin");
    }

    #[test]
    fn test_deputy_list_without_table() {
        assert_eq!(parse_deputy_list("<html><body>maintenance</body></html>"), None);
    }

    #[test]
    fn test_official_id_from_href() {
        assert_eq!(
            official_id_from_href("http://example.com/deputes/fiche/OMC_PA1012#autres"),
            Some("1012".into())
        );
        assert_eq!(official_id_from_href("/deputes/fiche/OMC_PA"), None);
        assert_eq!(official_id_from_href("/ailleurs"), None);
    }

    #[test]
    fn test_parse_profile_infos() {
        let page = parse_profile(PROFILE).unwrap();
        let p = &page.profile;
        assert_eq!(p.birth_date, NaiveDate::from_ymd_opt(1970, 3, 12));
        assert_eq!(p.job.as_deref(), Some("Avocat"));
        assert_eq!(p.email.as_deref(), Some("jean.dupont@example.fr"));
        assert_eq!(p.phone.as_deref(), Some("01 40 63 60 00"));
        assert_eq!(p.parliament_group.as_deref(), Some("Non inscrit"));
        assert_eq!(p.seat_number.as_deref(), Some("512"));
        assert_eq!(p.current_mandate_start, NaiveDate::from_ymd_opt(2017, 6, 21));
        assert_eq!(p.end_of_mandate, None);
    }

    #[test]
    fn test_parse_profile_mandates() {
        let mandates = parse_profile(PROFILE).unwrap().mandates.unwrap();
        assert_eq!(mandates.current_mandates, ["Conseiller municipal de Bourg-en-Bresse"]);
        assert_eq!(mandates.past_deputy_mandates, ["Du 20/06/2012 au 20/06/2017 (Ain)"]);
        assert_eq!(mandates.past_national_missions, ["Secrétaire d'État"]);
        assert!(mandates.past_international_missions.is_empty());
        assert_eq!(mandates.missing_sections, [SECTION_PAST_INTERNATIONAL]);
        assert!(mandates.is_partial());
    }

    #[test]
    fn test_parse_profile_instances() {
        let instances = parse_profile(PROFILE).unwrap().instances;
        assert_eq!(
            instances,
            [
                InstanceRole {
                    instance: "Commission des finances".into(),
                    role: Some("Vice-président".into()),
                },
                InstanceRole {
                    instance: "Délégation aux droits des femmes".into(),
                    role: None,
                },
            ]
        );
    }

    #[test]
    fn test_end_of_mandate() {
        let html = r#"
            <div id="infos"><ul><li><span>Profession</span><span>Retraité</span></li></ul></div>
            <div id="fin-mandat"><p>Mandat clos le 20/06/2022 (Fin de législature)</p></div>"#;
        let page = parse_profile(html).unwrap();
        assert_eq!(
            page.profile.end_of_mandate,
            Some(EndOfMandate {
                date: NaiveDate::from_ymd_opt(2022, 6, 20),
                reason: "Fin de législature".into(),
            })
        );
        assert_eq!(page.mandates, None);
        assert!(page.instances.is_empty());
    }

    #[test]
    fn test_profile_without_known_sections() {
        assert_eq!(parse_profile("<html><body><h1>Erreur</h1></body></html>"), None);
    }
}
