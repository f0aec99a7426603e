//! Identifier Derivation Contract Tests
//!
//! Derived identifiers end up as protocol names on the control system. They
//! are persisted nowhere, so every process deriving them must agree.

use blockcfg_core::naming::{derive, sanitize, DEFAULT_COMPONENT_TOKEN, DEFAULT_CONFIG_TOKEN};
use std::collections::HashSet;

fn taken(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// WHY: Names with no usable characters still need an identifier
/// BREAKS: Catalogue import of items named only with punctuation
#[test]
fn punctuation_only_names_fall_back_to_token() {
    let mut existing = HashSet::new();
    let first = derive("#@!", &existing, DEFAULT_CONFIG_TOKEN);
    assert_eq!(first, "CONFIG");
    existing.insert(first);

    let second = derive("$%^", &existing, DEFAULT_CONFIG_TOKEN);
    assert_eq!(second, "CONFIG0");
}

/// WHY: Components and configurations live in separate identifier spaces
/// BREAKS: Published identifiers of components
#[test]
fn component_namespace_uses_its_own_token() {
    assert_eq!(derive("***", &HashSet::new(), DEFAULT_COMPONENT_TOKEN), "COMPONENT");
}

/// WHY: Identifiers are uppercase with whitespace mapped to underscores
/// BREAKS: Clients addressing configurations by identifier
#[test]
fn identifiers_are_uppercase_and_underscored() {
    assert_eq!(sanitize("beam line 2", DEFAULT_CONFIG_TOKEN), "BEAM_LINE_2");
    let id = derive("Cryo: Main", &HashSet::new(), DEFAULT_CONFIG_TOKEN);
    assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'));
}

/// WHY: The suffix is the smallest free integer, starting at 0
/// BREAKS: Stable identifiers across restarts with the same catalogue
#[test]
fn collision_suffix_is_smallest_free_integer() {
    assert_eq!(derive("demo", &taken(&["DEMO"]), DEFAULT_CONFIG_TOKEN), "DEMO0");
    assert_eq!(derive("demo", &taken(&["DEMO", "DEMO0"]), DEFAULT_CONFIG_TOKEN), "DEMO1");
    assert_eq!(derive("demo", &taken(&["DEMO", "DEMO1"]), DEFAULT_CONFIG_TOKEN), "DEMO0");
}

/// WHY: Same inputs must give the same identifier
/// BREAKS: Any consumer that re-derives instead of reading the catalogue
#[test]
fn derivation_is_deterministic() {
    let existing = taken(&["A", "B", "A0"]);
    for name in ["a", "b", "some name", ""] {
        assert_eq!(
            derive(name, &existing, DEFAULT_CONFIG_TOKEN),
            derive(name, &existing, DEFAULT_CONFIG_TOKEN)
        );
    }
}
