//! Block groups

use serde::{Deserialize, Serialize};

/// Reserved group holding every block not explicitly grouped
pub const NONE_GROUP: &str = "NONE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,

    /// Block names in display order
    #[serde(default)]
    pub blocks: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            component: None,
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn is_none_group(&self) -> bool {
        self.is_named(NONE_GROUP)
    }

    pub fn contains(&self, block: &str) -> bool {
        self.blocks.iter().any(|b| b.eq_ignore_ascii_case(block))
    }

    /// Remove a block, returning whether it was present
    pub fn remove(&mut self, block: &str) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| !b.eq_ignore_ascii_case(block));
        before != self.blocks.len()
    }
}
