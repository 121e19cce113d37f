// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data Models
//!
//! Persisted records and the request/response bodies of the primary RPC
//! protocol. All wire types derive `Serialize`, `Deserialize`, and `ToSchema`
//! so the gateway can document them.
//!
//! ## Model Categories
//!
//! - **Accounts**: registered users and their hashed credentials
//! - **Secrets**: typed, owned records with an optional large payload
//! - **Calls**: request and response bodies for each remote call
//!
//! Byte fields (`metadata`, `data`) travel as standard base64 strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// =============================================================================
// Byte Field Encoding
// =============================================================================

/// Serde adapter for `Vec<u8>` fields encoded as base64 strings.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }

    /// Same as the parent module, for optional fields.
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let encoded: Option<String> = Option::deserialize(deserializer)?;
            encoded
                .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

// =============================================================================
// Accounts
// =============================================================================

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    /// Unique, case-sensitive login.
    pub login: String,
    /// Argon2id PHC string. Never leaves the server.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Input for account creation; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub login: String,
    pub password_hash: String,
}

// =============================================================================
// Secrets
// =============================================================================

/// Kind of secret, used by clients to pick a presentation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    #[default]
    Unspecified,
    Credentials,
    Text,
    Binary,
    Card,
}

/// A secret row without its payload.
///
/// This is what the store locks, merges, and rewrites during a conditional
/// update; the payload lives in separate chunk rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub secret_type: SecretType,
    #[serde(with = "base64_bytes")]
    pub metadata: Vec<u8>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A secret with its full payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub record: SecretRecord,
    pub data: Vec<u8>,
}

/// Listing entry: everything except the owner and the payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SecretSummary {
    pub id: Uuid,
    pub name: String,
    pub secret_type: SecretType,
    #[serde(with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub metadata: Vec<u8>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SecretRecord> for SecretSummary {
    fn from(record: SecretRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            secret_type: record.secret_type,
            metadata: record.metadata,
            comment: record.comment,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Input for secret creation; the owner always comes from the caller's identity.
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub owner_id: Uuid,
    pub name: String,
    pub secret_type: SecretType,
    pub metadata: Vec<u8>,
    pub data: Vec<u8>,
    pub comment: String,
}

/// Proposed field changes for a conditional update. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretUpdate {
    pub name: Option<String>,
    pub secret_type: Option<SecretType>,
    pub metadata: Option<Vec<u8>>,
    pub comment: Option<String>,
}

// =============================================================================
// Account Calls
// =============================================================================

/// Body of `RegisterAccount` and `Login`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// Token returned after registration or login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TokenResponse {
    pub token: String,
}

// =============================================================================
// Secret Calls
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CreateSecretRequest {
    pub name: String,
    #[serde(default)]
    pub secret_type: SecretType,
    #[serde(default, with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub metadata: Vec<u8>,
    #[serde(default, with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CreateSecretResponse {
    pub id: Uuid,
}

/// Body of `GetSecret` and `DeleteSecret`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SecretIdRequest {
    pub id: Uuid,
}

/// Full secret as returned by `GetSecret`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SecretView {
    pub id: Uuid,
    pub name: String,
    pub secret_type: SecretType,
    #[serde(with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub metadata: Vec<u8>,
    #[serde(with = "base64_bytes")]
    #[schema(value_type = String, format = Byte)]
    pub data: Vec<u8>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Secret> for SecretView {
    fn from(secret: Secret) -> Self {
        let Secret { record, data } = secret;
        Self {
            id: record.id,
            name: record.name,
            secret_type: record.secret_type,
            metadata: record.metadata,
            data,
            comment: record.comment,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ListSecretsResponse {
    pub secrets: Vec<SecretSummary>,
}

/// Body of `UpdateSecret`. Absent fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UpdateSecretRequest {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<SecretType>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes::option")]
    #[schema(value_type = Option<String>, format = Byte)]
    pub metadata: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl UpdateSecretRequest {
    /// Split into the target id and the proposed changes.
    pub fn into_parts(self) -> (Uuid, SecretUpdate) {
        (
            self.id,
            SecretUpdate {
                name: self.name,
                secret_type: self.secret_type,
                metadata: self.metadata,
                comment: self.comment,
            },
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UpdateSecretResponse {
    /// False when the proposed changes matched the stored secret.
    pub applied: bool,
}

/// Acknowledgement for a streamed payload upload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UpdateSecretDataResponse {
    pub id: Uuid,
    pub bytes_written: u64,
}

/// Empty acknowledgement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_type_uses_snake_case() {
        let json = serde_json::to_string(&SecretType::Credentials).unwrap();
        assert_eq!(json, r#""credentials""#);
        let parsed: SecretType = serde_json::from_str(r#""card""#).unwrap();
        assert_eq!(parsed, SecretType::Card);
    }

    #[test]
    fn create_request_decodes_base64_fields() {
        let request: CreateSecretRequest = serde_json::from_str(
            r#"{"name":"db","secret_type":"text","metadata":"bWV0YQ==","data":"aGVsbG8="}"#,
        )
        .unwrap();
        assert_eq!(request.metadata, b"meta");
        assert_eq!(request.data, b"hello");
        assert_eq!(request.comment, "");
    }

    #[test]
    fn create_request_rejects_invalid_base64() {
        let result: Result<CreateSecretRequest, _> =
            serde_json::from_str(r#"{"name":"db","data":"%%%"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn update_request_keeps_absent_fields_as_none() {
        let id = Uuid::new_v4();
        let request: UpdateSecretRequest =
            serde_json::from_str(&format!(r#"{{"id":"{id}","comment":"rotated"}}"#)).unwrap();
        let (parsed_id, update) = request.into_parts();
        assert_eq!(parsed_id, id);
        assert_eq!(update.comment.as_deref(), Some("rotated"));
        assert!(update.name.is_none());
        assert!(update.metadata.is_none());
    }

    #[test]
    fn summary_json_has_no_data_field() {
        let now = Utc::now();
        let summary = SecretSummary::from(SecretRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "n".into(),
            secret_type: SecretType::Binary,
            metadata: vec![1, 2, 3],
            comment: String::new(),
            created_at: now,
            updated_at: now,
        });
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value.get("data").is_none());
        assert!(value.get("owner_id").is_none());
    }
}
