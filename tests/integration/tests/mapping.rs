//! Entity mapping through real backends.

use std::sync::Arc;

use idm_model::{AttributeValue, Group, IdentityType, Partition, User};
use idm_storage::mapping::{
    property, standard_mappings, EntityMapping, MappingRegistryBuilder, TypeMapping,
};
use idm_storage::{
    FieldKind, FieldValue, IdentityQuery, MappingRegistry, Region, StorageError, TypeKey,
};

use crate::common::{names, TestEnv, STORES};

/// The standard schema with roles stored in a renamed unit and column.
fn renamed_role_registry() -> anyhow::Result<MappingRegistry> {
    let standard = MappingRegistry::standard();
    let role = standard.resolve_mapper(TypeKey::Role)?;
    let mut renamed = TypeMapping::new(TypeKey::Role, role.root().clone()).with_unit(
        EntityMapping::child("access_role", "role_identity_id").bind(
            property::NAME,
            "role_name",
            FieldKind::Text,
            false,
        ),
    );
    renamed.attributes = role.attributes.clone();

    Ok(MappingRegistry::builder().map(renamed).with_standard().build()?)
}

#[tokio::test]
async fn stored_records_round_trip_through_the_registry() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let parent = env.add(IdentityType::group("eng")).await?;
        env.add(IdentityType::new(Group::new("web").with_parent(&parent))).await?;
        env.add(
            IdentityType::new(User::new("alice").with_first_name("Alice").with_email("a@x.com"))
                .with_attribute("level", 3_i64)
                .with_attribute("tags", AttributeValue::multi(["a", "b"])),
        )
        .await?;
        env.add(IdentityType::agent("svc").with_enabled(false)).await?;

        let registry = env.manager.registry();
        let partition = env.ctx.partition_id();
        for region in [Region::Agents(partition), Region::Groups(partition)] {
            for record in env.backend.load(region).await? {
                let identity: IdentityType = registry.materialize(&record)?;
                assert_eq!(registry.dematerialize(&identity)?, record, "{store} {region}");
            }
        }
        for record in env.backend.load(Region::Partitions).await? {
            let partition: Partition = registry.materialize(&record)?;
            assert_eq!(registry.dematerialize(&partition)?, record, "{store}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn custom_unit_names_are_used_for_storage() -> anyhow::Result<()> {
    for store in STORES {
        let registry = Arc::new(renamed_role_registry()?);
        let env = TestEnv::configured(store, registry, |b| b).await?;
        let admin = env.add(IdentityType::role("admin")).await?;

        let records = env.backend.load(Region::Roles(env.ctx.partition_id())).await?;
        assert_eq!(records.len(), 1, "{store}");
        let row = records[0].unit("access_role");
        assert_eq!(
            row.and_then(|r| r.get("role_name")),
            Some(&FieldValue::Text("admin".into())),
            "{store}"
        );
        assert!(records[0].unit("identity_role").is_none(), "{store}");

        let found = env.manager.get_role(&env.ctx, "admin").await?;
        assert_eq!(found.and_then(|r| r.id), admin.id, "{store}");
        let roles = env.manager.fetch_identities(&env.ctx, &IdentityQuery::roles()).await?;
        assert_eq!(names(&roles), ["admin"], "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn unmapped_identity_type_is_rejected() -> anyhow::Result<()> {
    for store in STORES {
        let registry = standard_mappings()
            .into_iter()
            .filter(|m| m.key != TypeKey::Group)
            .fold(MappingRegistry::builder(), MappingRegistryBuilder::map)
            .build()?;
        let env = TestEnv::configured(store, Arc::new(registry), |b| b).await?;

        let err = env
            .manager
            .add_identity(&env.ctx, IdentityType::group("ops"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedIdentityType(_)), "{store}");

        // Other types are unaffected.
        env.add(IdentityType::role("admin")).await?;
    }
    Ok(())
}

#[test]
fn conflicting_custom_mapping_fails_to_build() {
    let standard = MappingRegistry::standard();
    let role = standard.resolve_mapper(TypeKey::Role).unwrap();
    let broken = TypeMapping::new(TypeKey::Role, role.root().clone()).with_unit(
        EntityMapping::child("access_role", "role_identity_id")
            .bind(property::NAME, "role_name", FieldKind::Text, false)
            .bind("label", "role_name", FieldKind::Text, true),
    );

    let err = MappingRegistry::builder()
        .map(broken)
        .with_standard()
        .build()
        .unwrap_err();
    assert!(matches!(err, StorageError::Mapping(_)));
}
