//! Extraction shapes and record adapters, one module per remote source.
//!
//! Every page the pipeline reads is described by a [`ShapeDescriptor`] built
//! here and interpreted by the shared machine in [`crate::extract`]. Adapters
//! return `None` when the page holds no matching section, so a layout change
//! upstream surfaces as absent records rather than as errors.
//!
//! [`ShapeDescriptor`]: crate::extract::ShapeDescriptor

pub mod ballots;
pub mod declarations;
pub mod deputies;
pub mod laws;
pub mod works;

use url::Url;

use crate::extract::Entry;
use crate::util::collapse_whitespace;

/// Resolve `href` against the page it was found on.
pub(crate) fn absolute_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(base) {
        Ok(base) => base.join(href).ok().map(String::from),
        Err(_) => Url::parse(href).ok().map(String::from),
    }
}

/// `(label, value)` of a two-cell entry such as `<li><span>Pour</span><span>12</span></li>`.
///
/// The label is folded to lower case without a trailing colon; the value is
/// every following text joined.
pub(crate) fn label_value(entry: &Entry) -> Option<(String, String)> {
    let (label, rest) = entry.texts.split_first()?;
    let label = collapse_whitespace(label.trim_end_matches(':')).to_lowercase();
    let value = collapse_whitespace(&rest.join(" "));
    if value.is_empty() {
        return None;
    }
    Some((label, value))
}
