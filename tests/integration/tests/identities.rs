//! Identity lifecycle against both backends.

use idm_core::EventType;
use idm_model::{
    AttributeValue, CredentialType, CredentialUpdate, Group, IdentityType, Partition, Relationship,
    RelationshipKind, User,
};
use idm_storage::{
    IdentityParameter, IdentityQuery, Region, RelationshipParameter, RelationshipQuery,
    StorageError,
};

use crate::common::{logins, TestEnv, STORES};

#[tokio::test]
async fn duplicate_login_name_is_rejected() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        env.add(IdentityType::user("john")).await?;

        let err = env.add(IdentityType::agent("john")).await.unwrap_err();
        let err = err.downcast::<StorageError>()?;
        assert!(matches!(err, StorageError::AlreadyExists { .. }), "{store}");

        let users = env
            .manager
            .fetch_identities(&env.ctx, &IdentityQuery::agents())
            .await?;
        assert_eq!(logins(&users), ["john"], "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn same_login_name_in_another_realm_is_allowed() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        env.add(IdentityType::user("john")).await?;

        let other = env.manager.create_partition(Partition::realm("other")).await?;
        let other_ctx = env.manager.context(other)?;
        let john = env
            .manager
            .add_identity(&other_ctx, IdentityType::user("john"))
            .await?;

        let found = env.manager.get_user(&other_ctx, "john").await?;
        assert_eq!(found.and_then(|u| u.id), john.id, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn agents_cannot_live_in_tiers() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let tier = env.manager.create_partition(Partition::tier("apps")).await?;
        let ctx = env.manager.context(tier)?;

        let err = env
            .manager
            .add_identity(&ctx, IdentityType::user("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn update_is_idempotent_in_storage() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let alice = env
            .add(IdentityType::new(User::new("alice").with_email("a@x.com")))
            .await?;
        let partition = env.ctx.partition_id();

        let mut changed = alice.clone();
        changed.attributes.set("dept", "it");
        env.manager.update_identity(&env.ctx, changed.clone()).await?;
        let once = env.backend.load(Region::Agents(partition)).await?;

        env.manager.update_identity(&env.ctx, changed).await?;
        let twice = env.backend.load(Region::Agents(partition)).await?;

        assert_eq!(once, twice, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn update_keeps_creation_date_and_partition() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let alice = env.add(IdentityType::user("alice")).await?;

        let mut changed = alice.clone();
        changed.created_date = chrono::Utc::now() + chrono::Duration::days(30);
        changed.partition_id = None;
        changed.enabled = false;
        let updated = env.manager.update_identity(&env.ctx, changed).await?;

        assert_eq!(updated.created_date, alice.created_date, "{store}");
        assert_eq!(updated.partition_id, alice.partition_id, "{store}");
        let stored = env.manager.get_user(&env.ctx, "alice").await?;
        assert_eq!(stored.map(|u| u.enabled), Some(false), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn removing_a_group_cascades_to_its_relationships() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let alice = env.add(IdentityType::user("alice")).await?;
        let group = env.add(IdentityType::group("ops")).await?;
        let role = env.add(IdentityType::role("admin")).await?;
        env.manager
            .add_relationship(&env.ctx, Relationship::group_role(&alice, &group, &role))
            .await?;

        env.manager.remove_identity(&env.ctx, &group).await?;

        let by_group = RelationshipQuery::all().with(
            RelationshipParameter::group(),
            group.id.unwrap_or_default(),
        );
        let left = env.manager.fetch_relationships(&env.ctx, &by_group).await?;
        assert!(left.is_empty(), "{store}");
        // The implied grant survives the group.
        let grants = env
            .manager
            .fetch_relationships(&env.ctx, &RelationshipQuery::of(RelationshipKind::Grant))
            .await?;
        assert_eq!(grants.len(), 1, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn removing_a_parent_group_promotes_children() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let parent = env.add(IdentityType::group("eng")).await?;
        let child = env
            .add(IdentityType::new(Group::new("backend").with_parent(&parent)))
            .await?;
        let grandchild = env
            .add(IdentityType::new(Group::new("storage").with_parent(&child)))
            .await?;
        assert_eq!(
            grandchild.as_group().map(|g| g.path.as_str()),
            Some("/eng/backend/storage"),
            "{store}"
        );

        env.manager.remove_identity(&env.ctx, &parent).await?;

        let promoted = env.manager.get_group(&env.ctx, "/backend").await?;
        assert!(promoted.as_ref().and_then(|g| g.as_group()).is_some_and(|g| g.is_top_level()), "{store}");
        let moved = env.manager.get_group(&env.ctx, "/backend/storage").await?;
        assert_eq!(moved.and_then(|g| g.id), grandchild.id, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn renaming_a_group_repaths_descendants() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let parent = env.add(IdentityType::group("eng")).await?;
        let child = env
            .add(IdentityType::new(Group::new("web").with_parent(&parent)))
            .await?;

        let mut renamed = parent.clone();
        if let Some(group) = renamed.as_group_mut() {
            group.name = "engineering".into();
        }
        env.manager.update_identity(&env.ctx, renamed).await?;

        let found = env.manager.get_group(&env.ctx, "/engineering/web").await?;
        assert_eq!(found.and_then(|g| g.id), child.id, "{store}");
        let child_in = env
            .manager
            .get_group_in(&env.ctx, "web", &parent)
            .await?;
        assert!(child_in.is_some(), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn removing_an_agent_drops_its_credentials() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let bob = env.add(IdentityType::agent("bob")).await?;
        env.manager
            .update_credential(
                &env.ctx,
                &bob,
                &CredentialUpdate::new(CredentialType::Password, "pw"),
                None,
                None,
            )
            .await?;
        let partition = env.ctx.partition_id();
        assert_eq!(env.backend.load(Region::Credentials(partition)).await?.len(), 1, "{store}");

        env.manager.remove_identity(&env.ctx, &bob).await?;

        assert!(env.backend.load(Region::Credentials(partition)).await?.is_empty(), "{store}");
        assert!(env.manager.get_agent(&env.ctx, "bob").await?.is_none(), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn attribute_helpers_round_trip_values() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let role = env.add(IdentityType::role("auditor")).await?;
        let id = role.id.unwrap_or_default();

        env.manager
            .set_attribute(&env.ctx, &role, "scopes", AttributeValue::multi(["read", "list"]))
            .await?;
        let value = env.manager.get_attribute(id, "scopes").await?;
        assert_eq!(value.map(|v| v.values().len()), Some(2), "{store}");

        env.manager.remove_attribute(&env.ctx, &role, "scopes").await?;
        assert!(env.manager.get_attribute(id, "scopes").await?.is_none(), "{store}");

        let by_attribute = IdentityQuery::roles().with(IdentityParameter::attribute("scopes"), "read");
        assert!(env.manager.fetch_identities(&env.ctx, &by_attribute).await?.is_empty(), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn lifecycle_events_are_raised() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        env.events.clear();

        let user = env.add(IdentityType::user("carol")).await?;
        env.manager.update_identity(&env.ctx, user.clone()).await?;
        env.manager.remove_identity(&env.ctx, &user).await?;

        assert_eq!(
            env.events.event_types(),
            [EventType::UserCreated, EventType::UserUpdated, EventType::UserDeleted],
            "{store}"
        );
        let events = env.events.events();
        assert!(events.iter().all(|e| e.entity_id == user.id), "{store}");
    }
    Ok(())
}
