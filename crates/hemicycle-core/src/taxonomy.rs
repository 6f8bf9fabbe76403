use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::ThemeRef;
use crate::util::collapse_whitespace;

/// Longest theme label that can be displayed as-is.
pub const MAX_THEME_LENGTH: usize = 55;

/// One node of the curated theme hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeNode {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<u32>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ThemeNode {
    pub fn to_ref(&self) -> ThemeRef {
        ThemeRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnclassifiedReason {
    /// No theme, alias or shortened name matches.
    Unknown,
    /// Longer than [`MAX_THEME_LENGTH`] with no shortened name registered.
    TooLong,
}

/// A label the taxonomy could not place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnclassifiedLabel {
    pub raw_text: String,
    pub context_url: Option<String>,
    pub reason: UnclassifiedReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched(ThemeNode),
    Unrecognized(UnclassifiedLabel),
}

impl Resolution {
    pub fn theme(&self) -> Option<&ThemeNode> {
        match self {
            Resolution::Matched(node) => Some(node),
            Resolution::Unrecognized(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    themes: Vec<ThemeNode>,
    #[serde(default)]
    short_names: HashMap<String, String>,
}

/// Read-only theme hierarchy with name and alias lookup.
///
/// Built once at startup and shared behind an `Arc`; lookups never fail.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    nodes: Vec<ThemeNode>,
    /// Normalized name or alias -> index into `nodes`. Names win over aliases.
    index: HashMap<String, usize>,
    /// Normalized long label -> registered short name.
    short_names: HashMap<String, String>,
}

impl Taxonomy {
    pub fn new(nodes: Vec<ThemeNode>, short_names: HashMap<String, String>) -> Self {
        let mut index = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            index.entry(normalize(&node.name)).or_insert(i);
        }
        for (i, node) in nodes.iter().enumerate() {
            for alias in &node.aliases {
                index.entry(normalize(alias)).or_insert(i);
            }
        }
        let short_names = short_names
            .into_iter()
            .map(|(long, short)| (normalize(&long), short))
            .collect();

        Self {
            nodes,
            index,
            short_names,
        }
    }

    /// Parse a taxonomy document: `{"themes": [...], "short_names": {...}}`.
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let file: TaxonomyFile = serde_json::from_str(json)
            .map_err(|e| AppError::TaxonomyError(format!("Invalid taxonomy JSON: {e}")))?;
        Ok(Self::new(file.themes, file.short_names))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::TaxonomyError(format!(
                "Failed to read taxonomy file {}: {e}",
                path.display()
            ))
        })?;
        let taxonomy = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), themes = taxonomy.len(), "Taxonomy loaded");
        Ok(taxonomy)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&ThemeNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn parent_of(&self, node: &ThemeNode) -> Option<&ThemeNode> {
        node.parent_id.and_then(|id| self.get(id))
    }

    /// Map a free-text label onto a theme node.
    ///
    /// Exact name, then alias, then (for labels over [`MAX_THEME_LENGTH`])
    /// the registered shortened name. Anything else is `Unrecognized`.
    pub fn resolve(&self, label: &str, context_url: Option<&str>) -> Resolution {
        let key = normalize(label);
        if let Some(node) = self.lookup(&key) {
            return Resolution::Matched(node.clone());
        }

        let too_long = label.trim().chars().count() > MAX_THEME_LENGTH;
        if too_long {
            let short = self.short_names.get(&key).and_then(|s| self.lookup(&normalize(s)));
            if let Some(node) = short {
                return Resolution::Matched(node.clone());
            }
        }

        let reason = if too_long && !self.short_names.contains_key(&key) {
            UnclassifiedReason::TooLong
        } else {
            UnclassifiedReason::Unknown
        };
        Resolution::Unrecognized(UnclassifiedLabel {
            raw_text: collapse_whitespace(label),
            context_url: context_url.map(str::to_string),
            reason,
        })
    }

    fn lookup(&self, key: &str) -> Option<&ThemeNode> {
        if key.is_empty() {
            return None;
        }
        self.index.get(key).map(|&i| &self.nodes[i])
    }
}

/// Trimmed, lower-cased, whitespace-collapsed.
fn normalize(label: &str) -> String {
    collapse_whitespace(label).to_lowercase()
}
