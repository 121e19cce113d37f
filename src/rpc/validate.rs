// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Structural request checks, run before authentication and dispatch.

use axum::http::HeaderMap;
use uuid::Uuid;

use super::calls::SECRET_ID_HEADER;
use crate::error::ApiError;
use crate::models::{
    CreateSecretRequest, Credentials, Empty, SecretIdRequest, UpdateSecretRequest,
};

/// Longest accepted login, in bytes.
pub const MAX_LOGIN_LEN: usize = 256;

/// Longest accepted secret name, in bytes.
pub const MAX_NAME_LEN: usize = 1024;

/// A request that can reject itself before business logic runs.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

impl Validate for Credentials {
    fn validate(&self) -> Result<(), String> {
        if self.login.trim().is_empty() {
            return Err("login must not be empty".into());
        }
        if self.login.len() > MAX_LOGIN_LEN {
            return Err(format!("login must be at most {MAX_LOGIN_LEN} bytes"));
        }
        if self.password.is_empty() {
            return Err("password must not be empty".into());
        }
        Ok(())
    }
}

impl Validate for CreateSecretRequest {
    fn validate(&self) -> Result<(), String> {
        validate_name(&self.name)
    }
}

impl Validate for SecretIdRequest {
    fn validate(&self) -> Result<(), String> {
        validate_id(self.id)
    }
}

impl Validate for UpdateSecretRequest {
    fn validate(&self) -> Result<(), String> {
        validate_id(self.id)?;
        match &self.name {
            Some(name) => validate_name(name),
            None => Ok(()),
        }
    }
}

impl Validate for Empty {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".into());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("name must be at most {MAX_NAME_LEN} bytes"));
    }
    Ok(())
}

fn validate_id(id: Uuid) -> Result<(), String> {
    if id.is_nil() {
        Err("id must not be nil".into())
    } else {
        Ok(())
    }
}

/// Read the target secret id of a streamed call from its metadata.
pub fn secret_id_header(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let value = headers
        .get(SECRET_ID_HEADER)
        .ok_or_else(|| ApiError::invalid_argument(format!("{SECRET_ID_HEADER} header is required")))?;
    let id = value
        .to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| ApiError::invalid_argument(format!("{SECRET_ID_HEADER} is not a valid id")))?;
    validate_id(id).map_err(ApiError::invalid_argument)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn credentials_need_login_and_password() {
        let ok = Credentials {
            login: "alice".into(),
            password: "pw".into(),
        };
        assert!(ok.validate().is_ok());

        let no_login = Credentials {
            login: " ".into(),
            password: "pw".into(),
        };
        assert!(no_login.validate().is_err());

        let no_password = Credentials {
            login: "alice".into(),
            password: String::new(),
        };
        assert!(no_password.validate().is_err());

        let long_login = Credentials {
            login: "a".repeat(MAX_LOGIN_LEN + 1),
            password: "pw".into(),
        };
        assert!(long_login.validate().is_err());
    }

    #[test]
    fn update_rejects_nil_id_and_empty_name() {
        let nil = UpdateSecretRequest {
            id: Uuid::nil(),
            name: None,
            secret_type: None,
            metadata: None,
            comment: None,
        };
        assert!(nil.validate().is_err());

        let empty_name = UpdateSecretRequest {
            id: Uuid::new_v4(),
            name: Some(String::new()),
            ..nil
        };
        assert!(empty_name.validate().is_err());
    }

    #[test]
    fn secret_id_header_parses_uuid() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(SECRET_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(secret_id_header(&headers).unwrap(), id);

        headers.insert(SECRET_ID_HEADER, HeaderValue::from_static("nope"));
        assert!(secret_id_header(&headers).is_err());

        assert!(secret_id_header(&HeaderMap::new()).is_err());
    }
}
