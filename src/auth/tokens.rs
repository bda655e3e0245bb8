//! Sessions and verification tokens on top of the expiring token store.
//!
//! A record is `key -> payload` where the key is the opaque token and the
//! payload is the subject (user id or identifier). The store's TTL is the
//! record's expiry; `expires_at` is rebuilt from the remaining TTL on read.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::dto::{Session, VerificationToken};
use super::services::{now_unix, ttl_until};
use crate::error::{AdapterError, AdapterResult};
use crate::store::TokenStore;

/// One namespace of TTL-backed records in the token store.
#[derive(Clone)]
struct Keyspace {
    store: Arc<dyn TokenStore>,
    prefix: String,
}

impl Keyspace {
    fn new(store: Arc<dyn TokenStore>, key_prefix: &str, namespace: &str) -> Self {
        Self {
            store,
            prefix: format!("{}{}:", key_prefix, namespace),
        }
    }

    fn key(&self, token: &str) -> String {
        format!("{}{}", self.prefix, token)
    }

    async fn put(&self, token: &str, payload: &str, expires_at: i64) -> AdapterResult<()> {
        let ttl = ttl_until(expires_at)?;
        self.store.set_ex(&self.key(token), payload, ttl).await
    }

    async fn refresh(&self, token: &str, payload: &str, expires_at: i64) -> AdapterResult<bool> {
        let ttl = ttl_until(expires_at)?;
        self.store.refresh(&self.key(token), payload, ttl).await
    }

    /// Payload and reconstructed expiry of a live record.
    async fn get(&self, token: &str) -> AdapterResult<Option<(String, i64)>> {
        let found = self.store.get_with_ttl(&self.key(token)).await?;
        Ok(found.and_then(alive))
    }

    async fn take_if(&self, token: &str, payload: &str) -> AdapterResult<Option<(String, i64)>> {
        let found = self.store.take_if(&self.key(token), payload).await?;
        Ok(found.and_then(alive))
    }

    async fn delete(&self, token: &str) -> AdapterResult<()> {
        self.store.del(&self.key(token)).await
    }
}

// A remaining TTL of zero means due now; negatives are "gone" (-2) or
// "no expiry" (-1), and neither is a live record.
fn alive((payload, remaining): (String, i64)) -> Option<(String, i64)> {
    (remaining > 0).then(|| (payload, now_unix() + remaining))
}

#[derive(Clone)]
pub struct Sessions {
    keys: Keyspace,
}

impl Sessions {
    pub fn new(store: Arc<dyn TokenStore>, key_prefix: &str) -> Self {
        Self {
            keys: Keyspace::new(store, key_prefix, "session"),
        }
    }

    #[instrument(skip_all, fields(user_id = session.user_id))]
    pub async fn add(&self, session: &Session) -> AdapterResult<Session> {
        self.keys
            .put(&session.token, &session.user_id.to_string(), session.expires_at)
            .await?;
        debug!("session stored");
        Ok(session.clone())
    }

    #[instrument(skip_all)]
    pub async fn get(&self, token: &str) -> AdapterResult<Option<Session>> {
        let Some((payload, expires_at)) = self.keys.get(token).await? else {
            return Ok(None);
        };
        let user_id = payload
            .parse()
            .map_err(|_| AdapterError::Internal(format!("corrupt session payload {:?}", payload)))?;
        Ok(Some(Session {
            token: token.to_string(),
            user_id,
            expires_at,
        }))
    }

    /// Re-arm the expiry of a live session; same observable result as `add`.
    #[instrument(skip_all, fields(user_id = session.user_id))]
    pub async fn update(&self, session: &Session) -> AdapterResult<Session> {
        let updated = self
            .keys
            .refresh(&session.token, &session.user_id.to_string(), session.expires_at)
            .await?;
        if !updated {
            return Err(AdapterError::NotFound("session".into()));
        }
        Ok(session.clone())
    }

    #[instrument(skip_all)]
    pub async fn delete(&self, token: &str) -> AdapterResult<()> {
        self.keys.delete(token).await
    }
}

#[derive(Clone)]
pub struct VerificationTokens {
    keys: Keyspace,
}

impl VerificationTokens {
    pub fn new(store: Arc<dyn TokenStore>, key_prefix: &str) -> Self {
        Self {
            keys: Keyspace::new(store, key_prefix, "verification"),
        }
    }

    #[instrument(skip_all)]
    pub async fn add(&self, token: &VerificationToken) -> AdapterResult<VerificationToken> {
        self.keys
            .put(&token.token, &token.identifier, token.expires_at)
            .await?;
        Ok(token.clone())
    }

    #[instrument(skip_all)]
    pub async fn get(&self, token: &str) -> AdapterResult<Option<VerificationToken>> {
        Ok(self
            .keys
            .get(token)
            .await?
            .map(|(identifier, expires_at)| VerificationToken {
                token: token.to_string(),
                identifier,
                expires_at,
            }))
    }

    #[instrument(skip_all)]
    pub async fn update(&self, token: &VerificationToken) -> AdapterResult<VerificationToken> {
        let updated = self
            .keys
            .refresh(&token.token, &token.identifier, token.expires_at)
            .await?;
        if !updated {
            return Err(AdapterError::NotFound("verification token".into()));
        }
        Ok(token.clone())
    }

    #[instrument(skip_all)]
    pub async fn delete(&self, token: &str) -> AdapterResult<()> {
        self.keys.delete(token).await
    }

    /// Redeem a token issued for `identifier`. Read and delete happen as one
    /// store operation, so of any concurrent redemptions only one sees the record.
    #[instrument(skip_all)]
    pub async fn use_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> AdapterResult<Option<VerificationToken>> {
        let taken = self.keys.take_if(token, identifier).await?;
        if taken.is_some() {
            debug!("verification token consumed");
        }
        Ok(taken.map(|(identifier, expires_at)| VerificationToken {
            token: token.to_string(),
            identifier,
            expires_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryTokenStore;

    fn store() -> Arc<dyn TokenStore> {
        Arc::new(MemoryTokenStore::new())
    }

    fn session(token: &str, in_secs: i64) -> Session {
        Session {
            token: token.into(),
            user_id: 1,
            expires_at: now_unix() + in_secs,
        }
    }

    fn assert_close(a: i64, b: i64) {
        assert!((a - b).abs() <= 1, "{} and {} differ by more than 1s", a, b);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let sessions = Sessions::new(store(), "t:");
        let s = session("123", 3600);
        sessions.add(&s).await.unwrap();

        let got = sessions.get("123").await.unwrap().unwrap();
        assert_eq!(got.token, "123");
        assert_eq!(got.user_id, 1);
        assert_close(got.expires_at, s.expires_at);

        let mut later = s.clone();
        later.expires_at += 5;
        sessions.update(&later).await.unwrap();
        let got = sessions.get("123").await.unwrap().unwrap();
        assert_close(got.expires_at, later.expires_at);

        sessions.delete("123").await.unwrap();
        assert!(sessions.get("123").await.unwrap().is_none());
        sessions.delete("123").await.unwrap();
    }

    #[tokio::test]
    async fn expired_add_is_rejected_without_write() {
        let backing = store();
        let sessions = Sessions::new(backing.clone(), "t:");
        let err = sessions.add(&session("old", -10)).await.unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
        assert!(backing.get_with_ttl("t:session:old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_of_missing_session_is_not_found() {
        let sessions = Sessions::new(store(), "t:");
        let err = sessions.update(&session("ghost", 60)).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotFound(_)));

        sessions.add(&session("s", 60)).await.unwrap();
        let err = sessions.update(&session("s", 0)).await.unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn session_is_absent_after_ttl() {
        let sessions = Sessions::new(store(), "t:");
        sessions.add(&session("short", 30)).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(sessions.get("short").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let backing = store();
        let sessions = Sessions::new(backing.clone(), "t:");
        let tokens = VerificationTokens::new(backing, "t:");
        sessions.add(&session("same", 60)).await.unwrap();
        assert!(tokens.get("same").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verification_token_is_single_use() {
        let tokens = VerificationTokens::new(store(), "t:");
        let vt = VerificationToken {
            token: "abc".into(),
            identifier: "user@example.com".into(),
            expires_at: now_unix() + 600,
        };
        tokens.add(&vt).await.unwrap();
        assert_eq!(
            tokens.get("abc").await.unwrap().map(|t| t.identifier),
            Some(vt.identifier.clone())
        );

        assert!(tokens.use_token("someone@else.com", "abc").await.unwrap().is_none());
        let used = tokens
            .use_token("user@example.com", "abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(used.identifier, vt.identifier);
        assert_close(used.expires_at, vt.expires_at);

        assert!(tokens.use_token("user@example.com", "abc").await.unwrap().is_none());
        assert!(tokens.get("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verification_token_update_rearms_live_token() {
        let backing = store();
        let tokens = VerificationTokens::new(backing.clone(), "t:");
        let mut vt = VerificationToken {
            token: "link".into(),
            identifier: "user@example.com".into(),
            expires_at: now_unix() + 600,
        };

        let err = tokens.update(&vt).await.unwrap_err();
        assert!(matches!(err, AdapterError::NotFound(_)));
        assert!(backing.get_with_ttl("t:verification:link").await.unwrap().is_none());

        tokens.add(&vt).await.unwrap();
        let stale = VerificationToken {
            expires_at: now_unix(),
            ..vt.clone()
        };
        let err = tokens.update(&stale).await.unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
        let kept = tokens.get("link").await.unwrap().unwrap();
        assert_close(kept.expires_at, vt.expires_at);

        vt.expires_at += 3000;
        vt.identifier = "new@example.com".into();
        tokens.update(&vt).await.unwrap();
        let got = tokens.get("link").await.unwrap().unwrap();
        assert_eq!(got.identifier, "new@example.com");
        assert_close(got.expires_at, vt.expires_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redemption_has_one_winner() {
        let tokens = Arc::new(VerificationTokens::new(store(), "t:"));
        tokens
            .add(&VerificationToken {
                token: "race".into(),
                identifier: "id".into(),
                expires_at: now_unix() + 600,
            })
            .await
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tokens = tokens.clone();
                tokio::spawn(async move { tokens.use_token("id", "race").await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
