/// Matches an opening tag by name and, optionally, one attribute.
///
/// The `class` attribute matches on any of its whitespace-separated tokens;
/// every other attribute must equal the expected value exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatcher {
    pub tag: String,
    pub attribute: Option<(String, String)>,
}

impl TagMatcher {
    pub fn tag(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attribute: None,
        }
    }

    pub fn with_id(tag: &str, id: &str) -> Self {
        Self::with_attribute(tag, "id", id)
    }

    pub fn with_class(tag: &str, class: &str) -> Self {
        Self::with_attribute(tag, "class", class)
    }

    pub fn with_attribute(tag: &str, key: &str, value: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attribute: Some((key.to_string(), value.to_string())),
        }
    }

    pub fn matches(&self, name: &str, attributes: &[(String, String)]) -> bool {
        if name != self.tag {
            return false;
        }
        let Some((key, expected)) = &self.attribute else {
            return true;
        };
        attributes
            .iter()
            .filter(|(k, _)| k == key)
            .any(|(_, value)| {
                if key == "class" {
                    value.split_whitespace().any(|token| token == expected)
                } else {
                    value == expected
                }
            })
    }
}

/// Sub-condition scoped to one section: collection only starts once
/// `opens_on_text` has been seen, and stops when `closes_on_tag` opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    pub opens_on_text: String,
    pub closes_on_tag: String,
}

/// A logical section of a document and how to recognise it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMarker {
    pub id: String,
    pub matcher: TagMatcher,
    pub gate: Option<Gate>,
    /// Overrides the shape's container for this section.
    pub container: Option<TagMatcher>,
}

impl SectionMarker {
    pub fn new(id: &str, matcher: TagMatcher) -> Self {
        Self {
            id: id.to_string(),
            matcher,
            gate: None,
            container: None,
        }
    }

    /// Section identified by `<tag id="{id}">`.
    pub fn by_id(tag: &str, id: &str) -> Self {
        Self::new(id, TagMatcher::with_id(tag, id))
    }

    pub fn gated(mut self, opens_on_text: &str, closes_on_tag: &str) -> Self {
        self.gate = Some(Gate {
            opens_on_text: opens_on_text.to_string(),
            closes_on_tag: closes_on_tag.to_string(),
        });
        self
    }

    pub fn with_container(mut self, container: TagMatcher) -> Self {
        self.container = Some(container);
        self
    }
}

/// Declarative description of one extraction shape.
///
/// Interpreted by [`super::StructuralExtractor`]; adding a shape is a data
/// change, not new control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDescriptor {
    pub name: String,
    pub sections: Vec<SectionMarker>,
    pub container: TagMatcher,
    /// Tag that starts a new entry inside a container (`li`, `tr`).
    pub entry: Option<String>,
    /// Attributes captured into the current entry.
    pub capture_attributes: Vec<String>,
}

impl ShapeDescriptor {
    pub fn new(name: &str, container: TagMatcher) -> Self {
        Self {
            name: name.to_string(),
            sections: Vec::new(),
            container,
            entry: None,
            capture_attributes: Vec::new(),
        }
    }

    pub fn section(mut self, marker: SectionMarker) -> Self {
        self.sections.push(marker);
        self
    }

    pub fn entry(mut self, tag: &str) -> Self {
        self.entry = Some(tag.to_string());
        self
    }

    pub fn capture(mut self, attribute: &str) -> Self {
        self.capture_attributes.push(attribute.to_string());
        self
    }

    pub(crate) fn section_for(
        &self,
        name: &str,
        attributes: &[(String, String)],
    ) -> Option<&SectionMarker> {
        self.sections
            .iter()
            .find(|marker| marker.matcher.matches(name, attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn class_matches_any_token() {
        let m = TagMatcher::with_class("ul", "liste-documents");
        assert!(m.matches("ul", &attrs(&[("class", "big liste-documents")])));
        assert!(!m.matches("ul", &attrs(&[("class", "liste")])));
        assert!(!m.matches("ol", &attrs(&[("class", "liste-documents")])));
    }

    #[test]
    fn id_matches_exactly() {
        let m = TagMatcher::with_id("div", "autres");
        assert!(m.matches("div", &attrs(&[("id", "autres")])));
        assert!(!m.matches("div", &attrs(&[("id", "autres-2")])));
        assert!(!m.matches("div", &[]));
    }

    #[test]
    fn bare_tag_matches_any_attributes() {
        assert!(TagMatcher::tag("ul").matches("ul", &attrs(&[("class", "x")])));
    }
}
