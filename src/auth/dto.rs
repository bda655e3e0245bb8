use std::fmt;

use serde::{Deserialize, Serialize};

use super::wire;

/// A person known to the auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Assigned by the relational store; absent until created.
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
    #[serde(
        rename = "emailVerified",
        alias = "email_verified_at",
        default,
        with = "wire::rfc3339_option"
    )]
    pub email_verified_at: Option<i64>,
    #[serde(rename = "image", alias = "image_url", default)]
    pub image_url: Option<String>,
}

/// An OAuth provider account linked to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The provider's own id for the account, not a surrogate key.
    #[serde(rename = "providerAccountId", alias = "id")]
    pub id: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub provider: String,
    #[serde(rename = "userId", alias = "user_id", deserialize_with = "wire::user_id")]
    pub user_id: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub session_state: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Login session; lives only in the token store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "sessionToken", alias = "token")]
    pub token: String,
    #[serde(rename = "userId", alias = "user_id", deserialize_with = "wire::user_id")]
    pub user_id: i64,
    #[serde(rename = "expires", alias = "expires_at", with = "wire::rfc3339")]
    pub expires_at: i64,
}

/// Single-use token, e.g. for email sign-in links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationToken {
    pub token: String,
    pub identifier: String,
    #[serde(rename = "expires", alias = "expires_at", with = "wire::rfc3339")]
    pub expires_at: i64,
}

/// Request body for consuming a verification token.
#[derive(Debug, Deserialize)]
pub struct UseVerificationToken {
    pub identifier: String,
    pub token: String,
}

/// Username/password pair. The password is plaintext only while in flight.
#[derive(Clone, Deserialize)]
pub struct Credential {
    #[serde(rename = "userId", alias = "user_id", deserialize_with = "wire::user_id")]
    pub user_id: i64,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Request body for password checks.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
}
