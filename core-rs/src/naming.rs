//! Protocol-safe identifiers derived from human-readable names
//!
//! Identifiers end up as PV name segments, so they may only contain uppercase
//! letters, digits and underscores. Derivation is pure: the only input besides
//! the name is the set of identifiers already taken in the same namespace.
//!
//! ```
//! use blockcfg_core::naming::{derive, DEFAULT_CONFIG_TOKEN};
//! use std::collections::HashSet;
//!
//! let mut taken = HashSet::new();
//! let first = derive("#@!", &taken, DEFAULT_CONFIG_TOKEN);
//! taken.insert(first.clone());
//! let second = derive("$%^", &taken, DEFAULT_CONFIG_TOKEN);
//!
//! assert_eq!(first, "CONFIG");
//! assert_eq!(second, "CONFIG0");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Substituted when a configuration name has no usable letters
pub const DEFAULT_CONFIG_TOKEN: &str = "CONFIG";

/// Substituted when a component name has no usable letters
pub const DEFAULT_COMPONENT_TOKEN: &str = "COMPONENT";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s").expect("static whitespace regex"));
static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Z0-9_]").expect("static identifier regex"));

/// Sanitise a name without collision handling
pub fn sanitize(name: &str, default_token: &str) -> String {
    let upper = name.to_uppercase();
    let underscored = WHITESPACE.replace_all(&upper, "_");
    let cleaned = DISALLOWED.replace_all(&underscored, "").into_owned();

    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_alphabetic()) {
        default_token.to_string()
    } else {
        cleaned
    }
}

/// Derive a unique identifier for `name`
///
/// On collision the smallest non-negative integer suffix that makes the
/// identifier unique is appended (`X`, `X0`, `X1`, ...).
pub fn derive(name: &str, existing: &HashSet<String>, default_token: &str) -> String {
    let base = sanitize(name, default_token);
    if !existing.contains(&base) {
        return base;
    }
    (0u64..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or(base)
}
