//! Document schema validation
//!
//! The engine validates every document it reads from disk (and every details
//! document it receives) through a [`SchemaValidator`] before touching state.
//! [`StructuralValidator`] checks the serde shape of each document kind; a
//! deployment can plug a stricter validator in through the same trait.

use crate::errors::{CfgError, Result};
use crate::model::block::Block;
use crate::model::details::ConfigDetails;
use crate::model::group::Group;
use crate::model::ioc::Ioc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// The documents making up a stored configuration, plus the details form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Meta,
    Blocks,
    Groups,
    Iocs,
    Components,
    Details,
}

impl DocumentKind {
    /// File name of this document inside an item directory
    pub fn file_name(&self) -> &'static str {
        match self {
            DocumentKind::Meta => "meta.json",
            DocumentKind::Blocks => "blocks.json",
            DocumentKind::Groups => "groups.json",
            DocumentKind::Iocs => "iocs.json",
            DocumentKind::Components => "components.json",
            DocumentKind::Details => "details.json",
        }
    }

    /// Documents that must all be present for an item directory to load
    pub fn required(is_component: bool) -> &'static [DocumentKind] {
        if is_component {
            &[
                DocumentKind::Meta,
                DocumentKind::Blocks,
                DocumentKind::Groups,
                DocumentKind::Iocs,
            ]
        } else {
            &[
                DocumentKind::Meta,
                DocumentKind::Blocks,
                DocumentKind::Groups,
                DocumentKind::Iocs,
                DocumentKind::Components,
            ]
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// meta.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub synoptic: String,
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub protected: bool,
}

/// One entry of components.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub name: String,
}

/// Validates a parsed document against the schema for its kind
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, document: &JsonValue, kind: DocumentKind) -> Result<()>;
}

/// Shape validation through the typed document definitions
#[derive(Debug, Clone, Default)]
pub struct StructuralValidator;

impl StructuralValidator {
    fn check<T: DeserializeOwned>(document: &JsonValue, kind: DocumentKind) -> Result<()> {
        T::deserialize(document)
            .map(|_| ())
            .map_err(|e| CfgError::Validation(format!("{} does not match schema: {}", kind, e)))
    }
}

impl SchemaValidator for StructuralValidator {
    fn validate(&self, document: &JsonValue, kind: DocumentKind) -> Result<()> {
        match kind {
            DocumentKind::Meta => Self::check::<MetaDocument>(document, kind),
            DocumentKind::Blocks => Self::check::<Vec<Block>>(document, kind),
            DocumentKind::Groups => Self::check::<Vec<Group>>(document, kind),
            DocumentKind::Iocs => Self::check::<Vec<Ioc>>(document, kind),
            DocumentKind::Components => Self::check::<Vec<ComponentRef>>(document, kind),
            DocumentKind::Details => Self::check::<ConfigDetails>(document, kind),
        }
    }
}
