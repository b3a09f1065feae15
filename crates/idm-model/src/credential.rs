//! Credential domain model.
//!
//! Credential material is kept as an append-only history per agent and
//! credential type. The engine only persists and selects records; hashing
//! and comparison belong to credential handlers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribute::AttributeValue;

/// Credential type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CredentialType {
    /// Password credential.
    Password,
    /// TOTP (Time-based One-Time Password) credential.
    Totp,
    /// HTTP digest credential.
    Digest,
    /// X.509 certificate credential.
    X509,
    /// Opaque token credential.
    Token,
    /// Application-defined credential type.
    Custom(String),
}

impl CredentialType {
    /// Returns the string representation used in storage.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Password => "password",
            Self::Totp => "otp",
            Self::Digest => "digest",
            Self::X509 => "x509",
            Self::Token => "token",
            Self::Custom(name) => name,
        }
    }

    /// Parses a stored name; unknown names become `Custom`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "password" => Self::Password,
            "otp" => Self::Totp,
            "digest" => Self::Digest,
            "x509" => Self::X509,
            "token" => Self::Token,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for CredentialType {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<CredentialType> for String {
    fn from(value: CredentialType) -> Self {
        value.as_str().to_string()
    }
}

/// One record of an agent's credential history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStorage {
    // === Identity ===
    /// Record identifier.
    pub id: Uuid,
    /// Agent owning the history, assigned when stored.
    pub owner_agent_id: Option<Uuid>,
    /// Credential type.
    pub credential_type: CredentialType,

    // === Validity Window ===
    /// When the record becomes current; defaults to the store time.
    pub effective_date: Option<DateTime<Utc>>,
    /// When the record stops being current.
    pub expiry_date: Option<DateTime<Utc>>,
    /// Position in the history, assigned when stored.
    pub revision: i64,

    // === Material ===
    /// Handler-defined credential fields.
    pub fields: BTreeMap<String, AttributeValue>,
}

impl CredentialStorage {
    /// Creates a record of the given type.
    #[must_use]
    pub fn new(credential_type: CredentialType) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner_agent_id: None,
            credential_type,
            effective_date: None,
            expiry_date: None,
            revision: 0,
            fields: BTreeMap::new(),
        }
    }

    /// Sets the effective date.
    #[must_use]
    pub fn with_effective_date(mut self, effective: DateTime<Utc>) -> Self {
        self.effective_date = Some(effective);
        self
    }

    /// Sets the expiry date.
    #[must_use]
    pub fn with_expiry_date(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry);
        self
    }

    /// Sets a credential field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Gets a credential field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&AttributeValue> {
        self.fields.get(name)
    }

    /// Returns whether the record's window contains `at`.
    #[must_use]
    pub fn is_current_at(&self, at: DateTime<Utc>) -> bool {
        let started = self.effective_date.is_some_and(|e| e <= at);
        let not_expired = self.expiry_date.map_or(true, |e| e > at);
        started && not_expired
    }
}

/// New credential material handed to a credential handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialUpdate {
    /// Handler selector.
    pub credential_type: CredentialType,
    /// Raw secret; the handler decides how it is stored.
    pub secret: String,
}

impl CredentialUpdate {
    /// Creates an update.
    #[must_use]
    pub fn new(credential_type: CredentialType, secret: impl Into<String>) -> Self {
        Self {
            credential_type,
            secret: secret.into(),
        }
    }
}

/// Credentials presented for validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Handler selector.
    pub credential_type: CredentialType,
    /// Login name of the presenting agent.
    pub login_name: String,
    /// Presented secret.
    pub secret: String,
}

impl Credentials {
    /// Creates presented credentials.
    #[must_use]
    pub fn new(
        credential_type: CredentialType,
        login_name: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            credential_type,
            login_name: login_name.into(),
            secret: secret.into(),
        }
    }
}

/// Outcome of a credential validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// The secret matched the current credential.
    Valid,
    /// No agent, no current credential, or a mismatch.
    Invalid,
    /// The agent's identity or credential has expired.
    Expired,
    /// The agent is disabled.
    AccountDisabled,
}

/// Validation status plus the agent it was resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationResult {
    /// Validation outcome.
    pub status: ValidationStatus,
    /// Agent whose credentials were checked, when resolved.
    pub agent_id: Option<Uuid>,
}

impl ValidationResult {
    /// Creates a result without a resolved agent.
    #[must_use]
    pub const fn status(status: ValidationStatus) -> Self {
        Self {
            status,
            agent_id: None,
        }
    }

    /// Creates a result for a resolved agent.
    #[must_use]
    pub const fn for_agent(status: ValidationStatus, agent_id: Uuid) -> Self {
        Self {
            status,
            agent_id: Some(agent_id),
        }
    }

    /// Returns whether validation succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self.status, ValidationStatus::Valid)
    }
}
