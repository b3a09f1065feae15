//! Grants, group memberships and group roles.

use idm_core::EventType;
use idm_model::{IdentityType, Relationship, RelationshipKind};
use idm_storage::{Page, RelationshipParameter, RelationshipQuery, StorageError};
use uuid::Uuid;

use crate::common::{TestEnv, STORES};

struct Crew {
    alice: IdentityType,
    bob: IdentityType,
    ops: IdentityType,
    admin: IdentityType,
}

async fn crew(env: &TestEnv) -> anyhow::Result<Crew> {
    Ok(Crew {
        alice: env.add(IdentityType::user("alice")).await?,
        bob: env.add(IdentityType::agent("bob")).await?,
        ops: env.add(IdentityType::group("ops")).await?,
        admin: env.add(IdentityType::role("admin")).await?,
    })
}

#[tokio::test]
async fn grants_are_found_by_either_member() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let crew = crew(&env).await?;
        env.manager
            .add_relationship(&env.ctx, Relationship::grant(&crew.alice, &crew.admin))
            .await?;
        env.manager
            .add_relationship(&env.ctx, Relationship::grant(&crew.bob, &crew.admin))
            .await?;

        let by_role = RelationshipQuery::of(RelationshipKind::Grant)
            .with(RelationshipParameter::role(), "admin");
        assert_eq!(env.manager.count_relationships(&env.ctx, &by_role).await?, 2, "{store}");

        let by_identity = RelationshipQuery::all().with(RelationshipParameter::Identity, &crew.bob);
        let found = env.manager.fetch_relationships(&env.ctx, &by_identity).await?;
        assert_eq!(found.len(), 1, "{store}");
        let assignee = found[0].member("assignee").and_then(|m| m.login_name());
        assert_eq!(assignee, Some("bob"), "{store}");

        let paged = by_role.clone().with_page(Page::new(1, 5));
        assert_eq!(env.manager.fetch_relationships(&env.ctx, &paged).await?.len(), 1, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn group_role_implies_grant_and_membership_once() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let crew = crew(&env).await?;
        env.events.clear();

        let group_role = Relationship::group_role(&crew.alice, &crew.ops, &crew.admin);
        env.manager.add_relationship(&env.ctx, group_role.clone()).await?;
        env.manager.add_relationship(&env.ctx, group_role).await?;

        let count = |kind| {
            let env = &env;
            async move {
                env.manager
                    .count_relationships(&env.ctx, &RelationshipQuery::of(kind))
                    .await
            }
        };
        assert_eq!(count(RelationshipKind::GroupRole).await?, 2, "{store}");
        assert_eq!(count(RelationshipKind::Grant).await?, 1, "{store}");
        assert_eq!(count(RelationshipKind::GroupMembership).await?, 1, "{store}");

        let created = env
            .events
            .event_types()
            .into_iter()
            .filter(|t| *t == EventType::RelationshipCreated)
            .count();
        assert_eq!(created, 4, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn removing_a_group_role_keeps_implied_relationships() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let crew = crew(&env).await?;
        let stored = env
            .manager
            .add_relationship(&env.ctx, Relationship::group_role(&crew.alice, &crew.ops, &crew.admin))
            .await?;

        env.manager.remove_relationship(&env.ctx, &stored).await?;

        let all = env
            .manager
            .fetch_relationships(&env.ctx, &RelationshipQuery::all())
            .await?;
        let mut kinds: Vec<_> = all.iter().map(|r| r.kind).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, [RelationshipKind::Grant, RelationshipKind::GroupMembership], "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn removal_by_members_needs_a_single_match() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let crew = crew(&env).await?;
        let grant = Relationship::grant(&crew.alice, &crew.admin);

        let err = env.manager.remove_relationship(&env.ctx, &grant).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFoundByName { .. }), "{store}");

        env.manager.add_relationship(&env.ctx, grant.clone()).await?;
        env.manager.add_relationship(&env.ctx, grant.clone()).await?;
        let err = env.manager.remove_relationship(&env.ctx, &grant).await.unwrap_err();
        assert!(matches!(err, StorageError::AmbiguousRelationship { count: 2, .. }), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn explicit_ids_must_be_unused() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let crew = crew(&env).await?;
        let id = Uuid::now_v7();
        let mut grant = Relationship::grant(&crew.alice, &crew.admin);
        grant.id = Some(id);

        let stored = env.manager.add_relationship(&env.ctx, grant.clone()).await?;
        assert_eq!(stored.id, Some(id), "{store}");

        let err = env.manager.add_relationship(&env.ctx, grant).await.unwrap_err();
        assert!(err.is_already_exists(), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn members_must_be_stored_and_fit_their_slot() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let crew = crew(&env).await?;

        let mut ghost = IdentityType::role("ghost");
        ghost.id = Some(Uuid::now_v7());
        let err = env
            .manager
            .add_relationship(&env.ctx, Relationship::grant(&crew.alice, &ghost))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{store}");

        // A group in the role slot.
        let err = env
            .manager
            .add_relationship(&env.ctx, Relationship::grant(&crew.alice, &crew.ops))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn update_replaces_attributes_only() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let crew = crew(&env).await?;
        let stored = env
            .manager
            .add_relationship(
                &env.ctx,
                Relationship::group_membership(&crew.alice, &crew.ops).with_attribute("since", "2024"),
            )
            .await?;

        let updated = env
            .manager
            .update_relationship(&env.ctx, stored.clone().with_attribute("since", "2025"))
            .await?;
        let since = updated.attributes.get("since").and_then(|v| v.values().first().cloned());
        assert_eq!(since, Some("2025".into()), "{store}");

        let moved = stored.with_member("member", &crew.bob);
        let err = env.manager.update_relationship(&env.ctx, moved).await.unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn relationships_of_removed_identities_disappear() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let crew = crew(&env).await?;
        env.manager
            .add_relationship(&env.ctx, Relationship::grant(&crew.alice, &crew.admin))
            .await?;
        env.manager
            .add_relationship(&env.ctx, Relationship::group_membership(&crew.bob, &crew.ops))
            .await?;

        env.manager.remove_identity(&env.ctx, &crew.admin).await?;

        let left = env
            .manager
            .fetch_relationships(&env.ctx, &RelationshipQuery::all())
            .await?;
        assert_eq!(left.len(), 1, "{store}");
        assert_eq!(left[0].kind, RelationshipKind::GroupMembership, "{store}");
    }
    Ok(())
}
