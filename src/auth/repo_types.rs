//! Row shapes of the relational store and their mapping onto entities.
//!
//! | table         | column                          | field                   |
//! |---------------|---------------------------------|-------------------------|
//! | `users`       | `id`                            | `User::id`              |
//! |               | `email_verified_at` timestamptz | `User::email_verified_at` (epoch s) |
//! |               | `image_url`                     | `User::image_url`       |
//! | `accounts`    | `provider_account_id`           | `Account::id`           |
//! |               | `account_type`                  | `Account::account_type` |
//! |               | `id` (surrogate)                | not exposed             |
//! | `credentials` | `password_hash`                 | never leaves the repo   |

use sqlx::FromRow;
use time::OffsetDateTime;

use super::dto::{Account, User};

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub email_verified_at: Option<OffsetDateTime>,
    pub image_url: Option<String>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: Some(r.id),
            name: r.name,
            email: r.email,
            email_verified_at: r.email_verified_at.map(|dt| dt.unix_timestamp()),
            image_url: r.image_url,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub provider_account_id: String,
    pub account_type: String,
    pub provider: String,
    pub user_id: i64,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub expires_at: Option<i64>,
    pub id_token: Option<String>,
    pub scope: Option<String>,
    pub session_state: Option<String>,
    pub token_type: Option<String>,
}

impl From<AccountRow> for Account {
    fn from(r: AccountRow) -> Self {
        Self {
            id: r.provider_account_id,
            account_type: r.account_type,
            provider: r.provider,
            user_id: r.user_id,
            refresh_token: r.refresh_token,
            access_token: r.access_token,
            expires_at: r.expires_at,
            id_token: r.id_token,
            scope: r.scope,
            session_state: r.session_state,
            token_type: r.token_type,
        }
    }
}
