use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesStart, Event};

/// One step of a forward scan over a markup document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionEvent {
    /// Tag and attribute names are lower-cased.
    TagOpen {
        name: String,
        attributes: Vec<(String, String)>,
    },
    /// Entity-decoded character data, untrimmed.
    Text(String),
    TagClose(String),
    StreamEnd,
}

/// Lenient tokenizer turning a document into [`ExtractionEvent`]s.
///
/// Mismatched or missing end tags are tolerated, attributes may be unquoted,
/// and HTML5 named entities are decoded. Self-closing tags produce an open
/// event immediately followed by a close event. The first tokenizer error ends
/// the stream: everything read so far is still delivered, then `StreamEnd`.
pub struct EventStream<'a> {
    reader: Reader<&'a [u8]>,
    pending_close: Option<String>,
    finished: bool,
}

impl<'a> EventStream<'a> {
    pub fn new(document: &'a str) -> Self {
        let mut reader = Reader::from_str(document);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        Self {
            reader,
            pending_close: None,
            finished: false,
        }
    }
}

impl Iterator for EventStream<'_> {
    type Item = ExtractionEvent;

    fn next(&mut self) -> Option<ExtractionEvent> {
        if let Some(name) = self.pending_close.take() {
            return Some(ExtractionEvent::TagClose(name));
        }
        if self.finished {
            return None;
        }

        loop {
            match self.reader.read_event() {
                Ok(Event::Start(start)) => return Some(open_event(&start)),
                Ok(Event::Empty(start)) => {
                    let event = open_event(&start);
                    if let ExtractionEvent::TagOpen { name, .. } = &event {
                        self.pending_close = Some(name.clone());
                    }
                    return Some(event);
                }
                Ok(Event::End(end)) => {
                    return Some(ExtractionEvent::TagClose(tag_name(end.name().as_ref())));
                }
                Ok(Event::Text(text)) => {
                    let content = text
                        .unescape_with(resolve_html5_entity)
                        .map(Cow::into_owned)
                        .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                    return Some(ExtractionEvent::Text(content));
                }
                Ok(Event::CData(data)) => {
                    return Some(ExtractionEvent::Text(
                        String::from_utf8_lossy(&data).into_owned(),
                    ));
                }
                Ok(Event::Eof) => {
                    self.finished = true;
                    return Some(ExtractionEvent::StreamEnd);
                }
                // Comments, doctype, processing instructions.
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(
                        position = self.reader.buffer_position(),
                        error = %e,
                        "Markup tokenizer stopped early"
                    );
                    self.finished = true;
                    return Some(ExtractionEvent::StreamEnd);
                }
            }
        }
    }
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn open_event(start: &BytesStart<'_>) -> ExtractionEvent {
    let name = tag_name(start.name().as_ref());

    let mut attributes = Vec::new();
    let mut attrs = start.html_attributes();
    attrs.with_checks(false);
    for attr in attrs.flatten() {
        let key = tag_name(attr.key.as_ref());
        let value = attr
            .unescape_value_with(resolve_html5_entity)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        attributes.push((key, value));
    }

    ExtractionEvent::TagOpen { name, attributes }
}
