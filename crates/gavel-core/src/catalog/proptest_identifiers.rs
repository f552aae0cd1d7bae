//! Property-based tests for identifier normalization and the permission
//! vocabulary.

use proptest::prelude::*;

use super::{normalize_identifier, Action, Grant, Permission, ResourceType};

/// Strategy for raw identifier input as callers actually send it: mixed
/// case, stray whitespace, underscores, wildcards.
fn raw_identifier() -> impl Strategy<Value = String> {
    "[ \ta-zA-Z0-9_*]{0,40}"
}

fn any_resource() -> impl Strategy<Value = ResourceType> {
    prop_oneof![
        Just(ResourceType::Document),
        Just(ResourceType::Case),
        Just(ResourceType::Client),
        Just(ResourceType::ClientData),
        Just(ResourceType::Billing),
        Just(ResourceType::User),
        Just(ResourceType::AuditLog),
        Just(ResourceType::WorkProduct),
    ]
}

fn any_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Read),
        Just(Action::Create),
        Just(Action::Update),
        Just(Action::Export),
        Just(Action::Approve),
        Just(Action::Delete),
    ]
}

proptest! {
    /// Normalization is idempotent: a normalized identifier passes
    /// through unchanged.
    #[test]
    fn prop_normalize_is_idempotent(raw in raw_identifier()) {
        let once = normalize_identifier(&raw);
        prop_assert_eq!(normalize_identifier(&once), once);
    }

    /// Normalized output never contains whitespace or lowercase.
    #[test]
    fn prop_normalized_form_is_canonical(raw in raw_identifier()) {
        let normalized = normalize_identifier(&raw);
        prop_assert!(!normalized.chars().any(char::is_whitespace));
        prop_assert!(!normalized.chars().any(|c| c.is_ascii_lowercase()));
    }

    /// Case never changes the normalized result.
    #[test]
    fn prop_normalize_is_case_insensitive(raw in raw_identifier()) {
        prop_assert_eq!(
            normalize_identifier(&raw.to_lowercase()),
            normalize_identifier(&raw.to_uppercase())
        );
    }

    /// Every permission survives a canonical-string round trip, even for
    /// multi-underscore resources like `CLIENT_DATA`.
    #[test]
    fn prop_permission_round_trips(resource in any_resource(), action in any_action()) {
        let permission = Permission::new(resource, action);
        let parsed = Permission::parse(&permission.as_string()).unwrap();
        prop_assert_eq!(parsed, permission);
    }

    /// Grant config strings round-trip the same way.
    #[test]
    fn prop_grant_round_trips(resource in any_resource(), action in any_action()) {
        for grant in [
            Grant::All,
            Grant::Resource(resource),
            Grant::Exact(Permission::new(resource, action)),
        ] {
            prop_assert_eq!(Grant::parse(&grant.as_string()).unwrap(), grant);
        }
    }

    /// Spacing variants of a permission normalize to its canonical form.
    #[test]
    fn prop_spaced_permissions_normalize(
        resource in any_resource(),
        action in any_action(),
        pad in "[ \t]{0,4}",
    ) {
        let spaced = format!(
            "{pad}{} {}{pad}",
            resource.as_str().to_lowercase(),
            action.as_str().to_lowercase()
        );
        let parsed = Permission::parse(&normalize_identifier(&spaced)).unwrap();
        prop_assert_eq!(parsed, Permission::new(resource, action));
    }
}
