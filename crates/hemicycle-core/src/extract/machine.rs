//! The single-pass section state machine.
//!
//! ```text
//! Idle --[section marker opens]--> SectionExpected --[container opens, gate open]--> ItemCollecting
//!  ^                                   |   ^                                              |
//!  |                                   |   +-----------[container closes / gate closes]---+
//!  +------[section tag closes: emit]---+--------------------------------------------------+
//! ```
//!
//! Every parse builds its own [`StructuralExtractor`], so concurrent parses
//! share nothing.

use crate::util::collapse_whitespace;

use super::events::{EventStream, ExtractionEvent};
use super::shape::{SectionMarker, ShapeDescriptor};

/// Items grouped under one entry tag, with captured attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub texts: Vec<String>,
    pub attributes: Vec<(String, String)>,
}

impl Entry {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        self.texts.get(index).map(String::as_str)
    }
}

/// Items collected for one section marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub id: String,
    /// Trimmed, non-empty text nodes inside the container(s), in order.
    pub items: Vec<String>,
    /// Same texts grouped per entry tag, when the shape declares one.
    pub entries: Vec<Entry>,
}

/// Sections found in one document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub sections: Vec<Section>,
}

impl ExtractedDocument {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// First section with this id.
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn items(&self, id: &str) -> Option<&[String]> {
        self.section(id).map(|s| s.items.as_slice())
    }

    /// Items of a section joined with single spaces.
    pub fn joined(&self, id: &str) -> Option<String> {
        self.items(id)
            .filter(|items| !items.is_empty())
            .map(|items| collapse_whitespace(&items.join(" ")))
    }
}

struct Active<'s> {
    marker: &'s SectionMarker,
    /// Open elements named like the section tag, the marker included.
    depth: usize,
    gate_open: bool,
    section: Section,
}

enum State<'s> {
    Idle,
    SectionExpected(Active<'s>),
    /// Second field: open elements named like the container tag.
    ItemCollecting(Active<'s>, usize),
}

/// Interprets a [`ShapeDescriptor`] over a stream of [`ExtractionEvent`]s.
pub struct StructuralExtractor<'s> {
    shape: &'s ShapeDescriptor,
    state: State<'s>,
    done: Vec<Section>,
}

impl<'s> StructuralExtractor<'s> {
    pub fn new(shape: &'s ShapeDescriptor) -> Self {
        Self {
            shape,
            state: State::Idle,
            done: Vec::new(),
        }
    }

    /// Consume one event.
    pub fn feed(&mut self, event: ExtractionEvent) {
        match event {
            ExtractionEvent::TagOpen { name, attributes } => self.on_open(&name, &attributes),
            ExtractionEvent::Text(text) => self.on_text(&text),
            ExtractionEvent::TagClose(name) => self.on_close(&name),
            ExtractionEvent::StreamEnd => self.flush(),
        }
    }

    /// End of input: flush any section still open and return the result.
    pub fn finish(mut self) -> ExtractedDocument {
        self.flush();
        ExtractedDocument {
            sections: self.done,
        }
    }

    fn on_open(&mut self, name: &str, attributes: &[(String, String)]) {
        let shape = self.shape;
        if let Some(marker) = shape.section_for(name, attributes) {
            self.flush();
            self.state = State::SectionExpected(Active {
                marker,
                depth: 1,
                gate_open: false,
                section: Section {
                    id: marker.id.clone(),
                    ..Section::default()
                },
            });
            return;
        }

        let state = std::mem::replace(&mut self.state, State::Idle);
        self.state = match state {
            State::Idle => State::Idle,
            State::SectionExpected(mut active) => {
                if name == active.marker.matcher.tag {
                    active.depth += 1;
                }
                if let Some(gate) = &active.marker.gate {
                    if active.gate_open && name == gate.closes_on_tag {
                        active.gate_open = false;
                    }
                }
                let container = active.marker.container.as_ref().unwrap_or(&shape.container);
                let gate_allows = active.marker.gate.is_none() || active.gate_open;
                if gate_allows && container.matches(name, attributes) {
                    capture(shape, &mut active.section, name, attributes);
                    State::ItemCollecting(active, 1)
                } else {
                    State::SectionExpected(active)
                }
            }
            State::ItemCollecting(mut active, mut container_depth) => {
                if name == active.marker.matcher.tag {
                    active.depth += 1;
                }
                let container = active.marker.container.as_ref().unwrap_or(&shape.container);
                if name == container.tag {
                    container_depth += 1;
                }
                let gate_closes = active
                    .marker
                    .gate
                    .as_ref()
                    .is_some_and(|gate| active.gate_open && name == gate.closes_on_tag);
                if gate_closes {
                    active.gate_open = false;
                    State::SectionExpected(active)
                } else {
                    capture(shape, &mut active.section, name, attributes);
                    State::ItemCollecting(active, container_depth)
                }
            }
        };
    }

    fn on_text(&mut self, text: &str) {
        let active = match &mut self.state {
            State::Idle => return,
            State::SectionExpected(active) | State::ItemCollecting(active, _) => active,
        };

        let trimmed = text.trim();
        if let Some(gate) = &active.marker.gate {
            if !active.gate_open && collapse_whitespace(trimmed) == gate.opens_on_text {
                active.gate_open = true;
            }
        }

        if let State::ItemCollecting(active, _) = &mut self.state {
            if trimmed.is_empty() {
                return;
            }
            active.section.items.push(trimmed.to_string());
            if let Some(entry) = active.section.entries.last_mut() {
                entry.texts.push(trimmed.to_string());
            }
        }
    }

    fn on_close(&mut self, name: &str) {
        let shape = self.shape;
        let state = std::mem::replace(&mut self.state, State::Idle);
        let (mut active, collecting) = match state {
            State::Idle => return,
            State::SectionExpected(active) => (active, None),
            State::ItemCollecting(active, container_depth) => {
                let container = active.marker.container.as_ref().unwrap_or(&shape.container);
                if name == container.tag {
                    (active, Some(container_depth - 1).filter(|d| *d > 0))
                } else {
                    (active, Some(container_depth))
                }
            }
        };

        if name == active.marker.matcher.tag {
            active.depth -= 1;
            if active.depth == 0 {
                self.done.push(active.section);
                return;
            }
        }

        self.state = match collecting {
            Some(container_depth) => State::ItemCollecting(active, container_depth),
            None => State::SectionExpected(active),
        };
    }

    fn flush(&mut self) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {}
            State::SectionExpected(active) | State::ItemCollecting(active, _) => {
                self.done.push(active.section);
            }
        }
    }
}

/// Start entries and capture attributes while collecting.
fn capture(
    shape: &ShapeDescriptor,
    section: &mut Section,
    name: &str,
    attributes: &[(String, String)],
) {
    if shape.entry.as_deref() == Some(name) {
        section.entries.push(Entry::default());
    }
    let Some(entry) = section.entries.last_mut() else {
        return;
    };
    for (key, value) in attributes {
        let wanted = shape.capture_attributes.iter().any(|k| k == key);
        if wanted && entry.attribute(key).is_none() {
            entry.attributes.push((key.clone(), value.clone()));
        }
    }
}

/// Parse `document` with a fresh machine for `shape`.
///
/// A document without any matching section yields an empty result.
pub fn extract(document: &str, shape: &ShapeDescriptor) -> ExtractedDocument {
    let mut machine = StructuralExtractor::new(shape);
    for event in EventStream::new(document) {
        machine.feed(event);
    }
    machine.finish()
}
