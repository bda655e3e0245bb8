use sqlx::PgPool;
use tracing::{info, instrument, warn};

use super::dto::{Account, Credential, User};
use super::password::{hash_password_blocking, verify_password_blocking};
use super::repo_types::{AccountRow, UserRow};
use super::services::ensure_valid_email;
use super::wire::datetime_from_unix;
use crate::error::{AdapterError, AdapterResult};

/// Users table. Deleting a user cascades to its accounts and credentials.
#[derive(Clone)]
pub struct Users {
    db: PgPool,
}

impl Users {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Insert a user and return it with its assigned id.
    #[instrument(skip_all)]
    pub async fn create(&self, user: &User) -> AdapterResult<User> {
        ensure_valid_email(&user.email)?;
        let verified_at = user.email_verified_at.map(datetime_from_unix).transpose()?;

        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, email, email_verified_at, image_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, email_verified_at, image_url
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(verified_at)
        .bind(&user.image_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match AdapterError::from(e) {
            AdapterError::Conflict(_) => {
                warn!("email already registered");
                AdapterError::Conflict("email already registered".into())
            }
            other => other,
        })?;
        tx.commit().await?;

        info!(user_id = row.id, "user created");
        Ok(row.into())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> AdapterResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, email_verified_at, image_url
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    #[instrument(skip_all)]
    pub async fn get_by_email(&self, email: &str) -> AdapterResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, email_verified_at, image_url
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    /// Owner of the account `provider_account_id` at `provider`.
    #[instrument(skip(self))]
    pub async fn get_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> AdapterResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.name, u.email, u.email_verified_at, u.image_url
            FROM users u
            JOIN accounts a ON a.user_id = u.id
            WHERE a.provider = $1 AND a.provider_account_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(User::from))
    }

    /// Replace every mutable field of an existing user.
    #[instrument(skip_all, fields(user_id = ?user.id))]
    pub async fn update(&self, user: &User) -> AdapterResult<User> {
        let id = user
            .id
            .ok_or_else(|| AdapterError::Validation("user id is required".into()))?;
        ensure_valid_email(&user.email)?;
        let verified_at = user.email_verified_at.map(datetime_from_unix).transpose()?;

        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET name = $2, email = $3, email_verified_at = $4, image_url = $5
            WHERE id = $1
            RETURNING id, name, email, email_verified_at, image_url
            "#,
        )
        .bind(id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(verified_at)
        .bind(&user.image_url)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AdapterError::NotFound(format!("user {}", id)))?;
        tx.commit().await?;

        info!(user_id = id, "user updated");
        Ok(row.into())
    }

    /// Idempotent; owned accounts and credentials go with the user.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> AdapterResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() > 0 {
            info!(user_id = id, "user deleted");
        }
        Ok(())
    }
}

/// OAuth account links. Add and remove only; lookups go through `Users`.
#[derive(Clone)]
pub struct Accounts {
    db: PgPool,
}

impl Accounts {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    #[instrument(skip_all, fields(provider = %account.provider, user_id = account.user_id))]
    pub async fn add(&self, account: &Account) -> AdapterResult<Account> {
        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (
                provider_account_id, account_type, provider, user_id,
                refresh_token, access_token, expires_at, id_token,
                scope, session_state, token_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING provider_account_id, account_type, provider, user_id,
                      refresh_token, access_token, expires_at, id_token,
                      scope, session_state, token_type
            "#,
        )
        .bind(&account.id)
        .bind(&account.account_type)
        .bind(&account.provider)
        .bind(account.user_id)
        .bind(&account.refresh_token)
        .bind(&account.access_token)
        .bind(account.expires_at)
        .bind(&account.id_token)
        .bind(&account.scope)
        .bind(&account.session_state)
        .bind(&account.token_type)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("account linked");
        Ok(row.into())
    }

    /// Idempotent unlink.
    #[instrument(skip(self))]
    pub async fn remove(&self, provider: &str, provider_account_id: &str) -> AdapterResult<()> {
        sqlx::query("DELETE FROM accounts WHERE provider = $1 AND provider_account_id = $2")
            .bind(provider)
            .bind(provider_account_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// Password credentials. Only Argon2 hashes are ever written.
#[derive(Clone)]
pub struct Credentials {
    db: PgPool,
}

impl Credentials {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Store `credential`, replacing the password if the user already owns the
    /// username. A username held by another user is a conflict.
    #[instrument(skip_all, fields(user_id = credential.user_id))]
    pub async fn add(&self, credential: &Credential) -> AdapterResult<()> {
        let hash = hash_password_blocking(credential.password.clone()).await?;

        let mut tx = self.db.begin().await?;
        let stored = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO credentials (user_id, username, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (username) DO UPDATE
                SET password_hash = EXCLUDED.password_hash
                WHERE credentials.user_id = EXCLUDED.user_id
            RETURNING user_id
            "#,
        )
        .bind(credential.user_id)
        .bind(&credential.username)
        .bind(&hash)
        .fetch_optional(&mut *tx)
        .await?;
        if stored.is_none() {
            warn!("username already taken");
            return Err(AdapterError::Conflict("username already taken".into()));
        }
        tx.commit().await?;

        info!("credential stored");
        Ok(())
    }

    /// `false` for an unknown username or a wrong password.
    #[instrument(skip_all)]
    pub async fn verify(&self, username: &str, password: &str) -> AdapterResult<bool> {
        let hash = sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM credentials WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        match hash {
            Some(hash) => verify_password_blocking(password.to_string(), hash).await,
            None => Ok(false),
        }
    }

    #[instrument(skip_all)]
    pub async fn remove(&self, username: &str) -> AdapterResult<()> {
        sqlx::query("DELETE FROM credentials WHERE username = $1")
            .bind(username)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
