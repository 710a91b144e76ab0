//! Catalog categories and the distributor category mapping

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of catalog categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Electronics,
    Connectors,
    Mechanical,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electronics => "electronics",
            Category::Connectors => "connectors",
            Category::Mechanical => "mechanical",
            Category::Other => "other",
        }
    }

    /// Parse a stored category name; unknown names fall back to `Other`
    pub fn from_db(value: &str) -> Self {
        match value {
            "electronics" => Category::Electronics,
            "connectors" => Category::Connectors,
            "mechanical" => Category::Mechanical,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substring rules, evaluated in order. "Electromechanics" must be tested
/// before "Mechanics" since the latter is a substring of the former.
const CATEGORY_RULES: &[(&str, Category)] = &[
    ("semiconductors", Category::Electronics),
    ("passive components", Category::Electronics),
    ("electromechanics", Category::Connectors),
    ("connectors", Category::Connectors),
    ("power supplies", Category::Electronics),
    ("cables", Category::Connectors),
    ("mechanics", Category::Mechanical),
    ("tools", Category::Mechanical),
];

/// Map a distributor category name onto a catalog category
///
/// Case-insensitive substring match, first rule wins, `Other` when nothing
/// matches or no category was supplied.
pub fn map_category(name: Option<&str>) -> Category {
    let Some(name) = name else {
        return Category::Other;
    };
    let lowered = name.to_lowercase();

    CATEGORY_RULES
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Other)
}
