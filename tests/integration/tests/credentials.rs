//! Credential history and handler dispatch.

use chrono::{Duration, Utc};
use idm_core::EventType;
use idm_model::{
    CredentialStorage, CredentialType, CredentialUpdate, Credentials, IdentityType,
    ValidationStatus,
};
use idm_storage::StorageError;

use crate::common::{TestEnv, STORES};

#[tokio::test]
async fn newer_credential_supersedes_current_one() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let bob = env.add(IdentityType::agent("bob")).await?;
        let password = CredentialType::Password;

        let c1 = env
            .manager
            .store_credential(&env.ctx, &bob, CredentialStorage::new(password.clone()).with_field("secret", "one"))
            .await?;
        let c2 = env
            .manager
            .store_credential(&env.ctx, &bob, CredentialStorage::new(password.clone()).with_field("secret", "two"))
            .await?;
        let now = Utc::now();

        let current = env
            .manager
            .retrieve_current_credential(&env.ctx, &bob, &password)
            .await?;
        assert_eq!(current.map(|c| c.id), Some(c2.id), "{store}");

        let history = env.manager.retrieve_credentials(&env.ctx, &bob, &password).await?;
        assert_eq!(history.iter().map(|c| c.id).collect::<Vec<_>>(), [c2.id, c1.id], "{store}");
        assert_eq!(history.iter().map(|c| c.revision).collect::<Vec<_>>(), [2, 1], "{store}");
        let expired = history[1].expiry_date;
        assert!(expired.is_some_and(|e| e <= now), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn histories_are_kept_per_type() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let bob = env.add(IdentityType::agent("bob")).await?;

        env.manager
            .store_credential(&env.ctx, &bob, CredentialStorage::new(CredentialType::Password))
            .await?;
        env.manager
            .store_credential(&env.ctx, &bob, CredentialStorage::new(CredentialType::Totp))
            .await?;

        let password = env
            .manager
            .retrieve_current_credential(&env.ctx, &bob, &CredentialType::Password)
            .await?;
        assert!(password.is_some(), "{store}");
        assert_eq!(password.map(|c| c.revision), Some(1), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn explicit_window_is_respected() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let bob = env.add(IdentityType::agent("bob")).await?;
        let token = CredentialType::Token;
        let past = Utc::now() - Duration::days(2);

        env.manager
            .store_credential(
                &env.ctx,
                &bob,
                CredentialStorage::new(token.clone())
                    .with_effective_date(past)
                    .with_expiry_date(past + Duration::days(1)),
            )
            .await?;

        assert!(
            env.manager
                .retrieve_current_credential(&env.ctx, &bob, &token)
                .await?
                .is_none(),
            "{store}"
        );
        let history = env.manager.retrieve_credentials(&env.ctx, &bob, &token).await?;
        assert_eq!(history[0].effective_date, Some(past), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn handler_validates_presented_secret() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let alice = env.add(IdentityType::user("alice")).await?;
        let update = CredentialUpdate::new(CredentialType::Password, "s3cret");
        env.manager
            .update_credential(&env.ctx, &alice, &update, None, None)
            .await?;

        let check = |login: &str, secret: &str| Credentials::new(CredentialType::Password, login, secret);
        let valid = env
            .manager
            .validate_credentials(&env.ctx, &check("alice", "s3cret"))
            .await?;
        assert!(valid.is_valid(), "{store}");
        assert_eq!(valid.agent_id, alice.id, "{store}");

        let wrong = env
            .manager
            .validate_credentials(&env.ctx, &check("alice", "guess"))
            .await?;
        assert_eq!(wrong.status, ValidationStatus::Invalid, "{store}");

        let unknown = env
            .manager
            .validate_credentials(&env.ctx, &check("nobody", "s3cret"))
            .await?;
        assert_eq!(unknown.status, ValidationStatus::Invalid, "{store}");
        assert!(unknown.agent_id.is_none(), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn disabled_agent_is_reported() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let alice = env.add(IdentityType::user("alice")).await?;
        env.manager
            .update_credential(
                &env.ctx,
                &alice,
                &CredentialUpdate::new(CredentialType::Password, "pw"),
                None,
                None,
            )
            .await?;
        env.manager
            .update_identity(&env.ctx, alice.with_enabled(false))
            .await?;

        let result = env
            .manager
            .validate_credentials(&env.ctx, &Credentials::new(CredentialType::Password, "alice", "pw"))
            .await?;
        assert_eq!(result.status, ValidationStatus::AccountDisabled, "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn unknown_credential_type_has_no_handler() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let bob = env.add(IdentityType::agent("bob")).await?;

        let err = env
            .manager
            .update_credential(
                &env.ctx,
                &bob,
                &CredentialUpdate::new(CredentialType::Custom("x509".into()), "cert"),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::HandlerNotFound(_)), "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn removing_credentials_clears_history() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let bob = env.add(IdentityType::agent("bob")).await?;
        for secret in ["a", "b", "c"] {
            env.manager
                .store_credential(
                    &env.ctx,
                    &bob,
                    CredentialStorage::new(CredentialType::Password).with_field("secret", secret),
                )
                .await?;
        }
        env.events.clear();

        let removed = env.manager.remove_credentials(&env.ctx, &bob).await?;

        assert_eq!(removed, 3, "{store}");
        assert!(env
            .manager
            .retrieve_credentials(&env.ctx, &bob, &CredentialType::Password)
            .await?
            .is_empty());
        assert_eq!(env.events.event_types(), [EventType::CredentialsRemoved], "{store}");
    }
    Ok(())
}

#[tokio::test]
async fn credentials_need_a_stored_agent() -> anyhow::Result<()> {
    for store in STORES {
        let env = TestEnv::new(store).await?;
        let mut ghost = IdentityType::agent("ghost");
        ghost.id = Some(uuid::Uuid::now_v7());

        let err = env
            .manager
            .store_credential(&env.ctx, &ghost, CredentialStorage::new(CredentialType::Password))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{store}");
    }
    Ok(())
}
