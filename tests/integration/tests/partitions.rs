//! Partition lifecycle and tier scoping.

use idm_core::EventType;
use idm_model::{IdentityType, Partition};
use idm_storage::StorageError;

use crate::common::{TestEnv, STORES};

#[tokio::test]
async fn default_realm_is_created_lazily_once() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;

        let realm = env.manager.default_realm().await?;
        assert_eq!(realm.name, "default", "{store}");
        assert!(realm.is_realm(), "{store}");
        assert_eq!(env.manager.list_partitions().await?.len(), 1, "{store}");
        assert_eq!(
            env.events
                .event_types()
                .iter()
                .filter(|t| **t == EventType::PartitionCreated)
                .count(),
            1,
            "{store}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn duplicate_partition_names_are_rejected_per_kind() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;

        env.manager.create_partition(Partition::tier("t1")).await?;
        let err = env
            .manager
            .create_partition(Partition::tier("t1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicatePartition { .. }), "{store}");
        assert!(
            env.manager.create_partition(Partition::realm("t1")).await.is_ok(),
            "{store}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn role_resolves_through_tier_parent_chain() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let t1 = env.manager.create_partition(Partition::tier("t1")).await?;
        let t1_ctx = env.manager.context(t1.clone())?;
        let admin = env
            .manager
            .add_identity(&t1_ctx, IdentityType::role("admin"))
            .await?;

        let t2 = env
            .manager
            .create_partition(Partition::tier("t2").with_parent(&t1))
            .await?;
        let t2_ctx = env.manager.context(t2)?;

        let found = env.manager.get_role(&t2_ctx, "admin").await?;
        assert_eq!(found.and_then(|r| r.id), admin.id, "{store}");
        assert!(env.manager.get_role(&t2_ctx, "auditor").await?.is_none(), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn partition_removal_requires_empty_partition() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let realm = env.manager.create_partition(Partition::realm("acme")).await?;
        let ctx = env.manager.context(realm.clone())?;
        let alice = env
            .manager
            .add_identity(&ctx, IdentityType::user("alice"))
            .await?;

        let err = env.manager.remove_partition(&realm).await.unwrap_err();
        assert!(matches!(err, StorageError::PartitionNotEmpty { .. }), "{store}");

        env.manager.remove_identity(&ctx, &alice).await?;
        env.manager.remove_partition(&realm).await?;
        assert!(env.manager.get_realm("acme").await.unwrap_err().is_not_found(), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn removed_default_realm_is_recreated() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let first = env.manager.default_realm().await?;

        env.manager.remove_partition(&first).await?;
        let second = env.manager.default_realm().await?;

        assert_ne!(first.id, second.id, "{store}");
        assert_eq!(second.name, "default", "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn partition_lookups_by_name_and_id() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let tier = env.manager.create_partition(Partition::tier("apps")).await?;

        assert_eq!(env.manager.get_tier("apps").await?, tier, "{store}");
        let id = tier.id.unwrap_or_default();
        assert_eq!(env.manager.get_partition(id).await?, tier, "{store}");
        assert!(env.manager.get_realm("apps").await.unwrap_err().is_not_found(), "{store}");
    }
    Ok(())
}
