//! Catalog construction and lookup tests.

use super::*;

#[test]
fn test_normalize_identifier() {
    assert_eq!(normalize_identifier("  attorney "), "ATTORNEY");
    assert_eq!(normalize_identifier("managing  partner"), "MANAGING_PARTNER");
    assert_eq!(normalize_identifier("Super\tAdmin"), "SUPER_ADMIN");
    assert_eq!(normalize_identifier("FIRM_ADMIN"), "FIRM_ADMIN");
    assert_eq!(normalize_identifier(""), "");
}

#[test]
fn test_builtin_catalog_roles() {
    let catalog = PolicyCatalog::builtin();
    let admin = catalog.role(SUPER_ADMIN_ROLE).unwrap();
    assert_eq!(admin.level, 100);
    assert!(admin.is_global());
    assert!(admin.grants.contains(&Grant::All));

    let attorney = catalog.role("ATTORNEY").unwrap();
    assert_eq!(attorney.level, 70);
    assert!(!attorney.is_global());
    assert!(!attorney.external);

    let external = catalog.role("EXTERNAL_COUNSEL").unwrap();
    assert!(external.external);
}

#[test]
fn test_attorney_cannot_delete_documents() {
    // Level 70 with DOCUMENT_* is below DOCUMENT_DELETE's level 90.
    let catalog = PolicyCatalog::builtin();
    let attorney = catalog.role("ATTORNEY").unwrap();
    let delete = Permission::new(ResourceType::Document, Action::Delete);
    assert!(!attorney.satisfies(delete));
    assert!(attorney.satisfies(Permission::new(ResourceType::Document, Action::Read)));
}

#[test]
fn test_from_toml() {
    let catalog = PolicyCatalog::from_toml(
        r#"
        [[roles]]
        name = "archivist"
        level = 55
        grants = ["DOCUMENT_READ", "DOCUMENT_*"]
        scope = "tenant"
        requires_mfa = true
        "#,
    )
    .unwrap();
    let role = catalog.role("ARCHIVIST").unwrap();
    assert_eq!(role.level, 55);
    assert!(role.requires_mfa);
    assert_eq!(role.scope, ScopeTier::Tenant);
}

#[test]
fn test_from_toml_rejects_unknown_grant() {
    let result = PolicyCatalog::from_toml(
        r#"
        [[roles]]
        name = "broken"
        level = 1
        grants = ["DOCUMENT_SHRED"]
        scope = "tenant"
        "#,
    );
    assert!(matches!(
        result,
        Err(CatalogError::UnknownPermission { .. })
    ));
}

#[test]
fn test_duplicate_role_rejected() {
    let result = PolicyCatalog::from_toml(
        r#"
        [[roles]]
        name = "clerk"
        level = 10
        scope = "tenant"

        [[roles]]
        name = "Clerk"
        level = 20
        scope = "tenant"
        "#,
    );
    assert!(matches!(result, Err(CatalogError::DuplicateRole { .. })));
}

#[test]
fn test_roles_at_tier_includes_broader_scopes() {
    let catalog = PolicyCatalog::builtin();
    let at_client = catalog.roles_at_tier(ScopeTier::Client);
    assert!(at_client.contains("CLIENT_REPRESENTATIVE"));
    assert!(at_client.contains(SUPER_ADMIN_ROLE));

    let at_global = catalog.roles_at_tier(ScopeTier::Global);
    assert!(at_global.contains(SUPER_ADMIN_ROLE));
    assert!(!at_global.contains("ATTORNEY"));
}

#[test]
fn test_shared_catalog_swap() {
    let shared = SharedCatalog::new(PolicyCatalog::builtin());
    let before = shared.load();
    assert!(before.role("ATTORNEY").is_some());

    let replacement = PolicyCatalog::from_toml(
        r#"
        [[roles]]
        name = "ONLY_ROLE"
        level = 1
        scope = "tenant"
        "#,
    )
    .unwrap();
    shared.swap(replacement);

    // Old snapshot remains readable; new loads see the replacement.
    assert!(before.role("ATTORNEY").is_some());
    let after = shared.load();
    assert!(after.role("ATTORNEY").is_none());
    assert!(after.role("ONLY_ROLE").is_some());
}
