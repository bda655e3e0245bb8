use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            Account, Credential, LoginRequest, Session, UseVerificationToken, User,
            VerificationToken, VerifyResponse,
        },
        repo::{Accounts, Credentials, Users},
        tokens::{Sessions, VerificationTokens},
    },
    error::{AdapterError, AdapterResult},
    state::AppState,
};

impl FromRef<AppState> for Users {
    fn from_ref(state: &AppState) -> Self {
        Users::new(state.db.clone())
    }
}

impl FromRef<AppState> for Accounts {
    fn from_ref(state: &AppState) -> Self {
        Accounts::new(state.db.clone())
    }
}

impl FromRef<AppState> for Credentials {
    fn from_ref(state: &AppState) -> Self {
        Credentials::new(state.db.clone())
    }
}

impl FromRef<AppState> for Sessions {
    fn from_ref(state: &AppState) -> Self {
        Sessions::new(state.tokens.clone(), &state.config.token_store.key_prefix)
    }
}

impl FromRef<AppState> for VerificationTokens {
    fn from_ref(state: &AppState) -> Self {
        VerificationTokens::new(state.tokens.clone(), &state.config.token_store.key_prefix)
    }
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user).patch(update_user))
        .route("/users/:id", get(get_user).delete(delete_user))
        .route("/users/emails/:email", get(get_user_by_email))
        .route("/users/accounts", post(link_account))
        .route(
            "/users/accounts/:provider/:account_id",
            get(get_user_by_account).delete(unlink_account),
        )
}

pub fn token_routes() -> Router<AppState> {
    Router::new()
        .route("/users/sessions", post(create_session).patch(update_session))
        .route("/users/sessions/:token", get(get_session).delete(delete_session))
        .route(
            "/users/verification",
            post(create_verification_token).patch(update_verification_token),
        )
        .route(
            "/users/verification/use",
            post(use_verification_token).patch(use_verification_token),
        )
        .route(
            "/users/verification/:token",
            get(get_verification_token).delete(delete_verification_token),
        )
}

pub fn credential_routes() -> Router<AppState> {
    Router::new()
        .route("/users/credentials", post(add_credential))
        .route("/users/credentials/verify", post(verify_credential))
        .route("/users/credentials/:username", axum::routing::delete(remove_credential))
}

fn found<T>(value: Option<T>, what: &str) -> AdapterResult<Json<T>> {
    value
        .map(Json)
        .ok_or_else(|| AdapterError::NotFound(what.to_string()))
}

// --- users & accounts ---

#[instrument(skip_all)]
pub async fn create_user(
    State(users): State<Users>,
    Json(user): Json<User>,
) -> AdapterResult<Json<User>> {
    Ok(Json(users.create(&user).await?))
}

#[instrument(skip_all)]
pub async fn update_user(
    State(users): State<Users>,
    Json(user): Json<User>,
) -> AdapterResult<Json<User>> {
    Ok(Json(users.update(&user).await?))
}

#[instrument(skip(users))]
pub async fn get_user(
    State(users): State<Users>,
    Path(id): Path<i64>,
) -> AdapterResult<Json<User>> {
    found(users.get(id).await?, "user")
}

#[instrument(skip(users))]
pub async fn delete_user(
    State(users): State<Users>,
    Path(id): Path<i64>,
) -> AdapterResult<StatusCode> {
    users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
pub async fn get_user_by_email(
    State(users): State<Users>,
    Path(email): Path<String>,
) -> AdapterResult<Json<User>> {
    found(users.get_by_email(&email).await?, "user")
}

#[instrument(skip(users))]
pub async fn get_user_by_account(
    State(users): State<Users>,
    Path((provider, account_id)): Path<(String, String)>,
) -> AdapterResult<Json<User>> {
    found(users.get_by_account(&provider, &account_id).await?, "user")
}

#[instrument(skip_all)]
pub async fn link_account(
    State(accounts): State<Accounts>,
    Json(account): Json<Account>,
) -> AdapterResult<Json<Account>> {
    Ok(Json(accounts.add(&account).await?))
}

#[instrument(skip(accounts))]
pub async fn unlink_account(
    State(accounts): State<Accounts>,
    Path((provider, account_id)): Path<(String, String)>,
) -> AdapterResult<StatusCode> {
    accounts.remove(&provider, &account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- sessions ---

#[instrument(skip_all)]
pub async fn create_session(
    State(sessions): State<Sessions>,
    Json(session): Json<Session>,
) -> AdapterResult<Json<Session>> {
    Ok(Json(sessions.add(&session).await?))
}

#[instrument(skip_all)]
pub async fn update_session(
    State(sessions): State<Sessions>,
    Json(session): Json<Session>,
) -> AdapterResult<Json<Session>> {
    Ok(Json(sessions.update(&session).await?))
}

#[instrument(skip_all)]
pub async fn get_session(
    State(sessions): State<Sessions>,
    Path(token): Path<String>,
) -> AdapterResult<Json<Session>> {
    found(sessions.get(&token).await?, "session")
}

#[instrument(skip_all)]
pub async fn delete_session(
    State(sessions): State<Sessions>,
    Path(token): Path<String>,
) -> AdapterResult<StatusCode> {
    sessions.delete(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- verification tokens ---

#[instrument(skip_all)]
pub async fn create_verification_token(
    State(tokens): State<VerificationTokens>,
    Json(token): Json<VerificationToken>,
) -> AdapterResult<Json<VerificationToken>> {
    Ok(Json(tokens.add(&token).await?))
}

#[instrument(skip_all)]
pub async fn update_verification_token(
    State(tokens): State<VerificationTokens>,
    Json(token): Json<VerificationToken>,
) -> AdapterResult<Json<VerificationToken>> {
    Ok(Json(tokens.update(&token).await?))
}

#[instrument(skip_all)]
pub async fn get_verification_token(
    State(tokens): State<VerificationTokens>,
    Path(token): Path<String>,
) -> AdapterResult<Json<VerificationToken>> {
    found(tokens.get(&token).await?, "verification token")
}

#[instrument(skip_all)]
pub async fn delete_verification_token(
    State(tokens): State<VerificationTokens>,
    Path(token): Path<String>,
) -> AdapterResult<StatusCode> {
    tokens.delete(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
pub async fn use_verification_token(
    State(tokens): State<VerificationTokens>,
    Json(req): Json<UseVerificationToken>,
) -> AdapterResult<Json<VerificationToken>> {
    found(
        tokens.use_token(&req.identifier, &req.token).await?,
        "verification token",
    )
}

// --- credentials ---

#[instrument(skip_all)]
pub async fn add_credential(
    State(credentials): State<Credentials>,
    Json(credential): Json<Credential>,
) -> AdapterResult<StatusCode> {
    credentials.add(&credential).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
pub async fn verify_credential(
    State(credentials): State<Credentials>,
    Json(req): Json<LoginRequest>,
) -> AdapterResult<Json<VerifyResponse>> {
    let valid = credentials.verify(&req.username, &req.password).await?;
    Ok(Json(VerifyResponse { valid }))
}

#[instrument(skip_all)]
pub async fn remove_credential(
    State(credentials): State<Credentials>,
    Path(username): Path<String>,
) -> AdapterResult<StatusCode> {
    credentials.remove(&username).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::app::build_app;
    use crate::auth::extractors::SECRET_HEADER;
    use crate::auth::services::now_unix;

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        secret: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(secret) = secret {
            req = req.header(SECRET_HEADER, secret);
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn unix_of(value: &Value) -> i64 {
        let text = value.as_str().expect("timestamp string");
        time::OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339)
            .unwrap()
            .unix_timestamp()
    }

    #[tokio::test]
    async fn session_add_get_delete() {
        let app = build_app(AppState::fake(None));
        let expires = now_unix() + 3600;

        let (status, body) = send(
            &app,
            "POST",
            "/auth/users/sessions",
            Some(json!({"sessionToken": "123", "userId": 1, "expires": expires})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionToken"], "123");

        let (status, body) = send(&app, "GET", "/auth/users/sessions/123", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionToken"], "123");
        assert_eq!(body["userId"], 1);
        assert!((unix_of(&body["expires"]) - expires).abs() <= 1);

        let (status, _) = send(&app, "DELETE", "/auth/users/sessions/123", None, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, "GET", "/auth/users/sessions/123", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NotFound");
    }

    #[tokio::test]
    async fn expired_session_is_unprocessable() {
        let app = build_app(AppState::fake(None));
        let (status, body) = send(
            &app,
            "POST",
            "/auth/users/sessions",
            Some(json!({"sessionToken": "old", "userId": 1, "expires": "2001-01-01T00:00:00Z"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "ValidationError");

        let (status, _) = send(&app, "GET", "/auth/users/sessions/old", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn out_of_range_expiry_is_rejected_and_not_stored() {
        let app = build_app(AppState::fake(None));
        for expires in [json!(i64::MIN), json!(100_000_000_000_000_i64), json!(i64::MAX)] {
            let (status, body) = send(
                &app,
                "POST",
                "/auth/users/sessions",
                Some(json!({"sessionToken": "far", "userId": 1, "expires": expires})),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "expires {}", expires);
            assert_ne!(body["error"], "InternalServerError");

            let (status, _) = send(&app, "GET", "/auth/users/sessions/far", None, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn patching_unknown_session_is_not_found() {
        let app = build_app(AppState::fake(None));
        let (status, _) = send(
            &app,
            "PATCH",
            "/auth/users/sessions",
            Some(json!({"sessionToken": "nope", "userId": 1, "expires": now_unix() + 60})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn verification_token_redeems_once() {
        let app = build_app(AppState::fake(None));
        let (status, _) = send(
            &app,
            "POST",
            "/auth/users/verification",
            Some(json!({"token": "t1", "identifier": "a@b.io", "expires": now_unix() + 600})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", "/auth/users/verification/t1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["identifier"], "a@b.io");

        let redeem = json!({"identifier": "a@b.io", "token": "t1"});
        let (status, body) = send(
            &app,
            "POST",
            "/auth/users/verification/use",
            Some(redeem.clone()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token"], "t1");
        assert_eq!(body["identifier"], "a@b.io");

        let (status, _) = send(&app, "PATCH", "/auth/users/verification/use", Some(redeem), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_email_is_rejected_before_storage() {
        let app = build_app(AppState::fake(None));
        let (status, body) = send(
            &app,
            "POST",
            "/auth/users",
            Some(json!({"name": "test", "email": "not-an-email"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "ValidationError");
    }

    #[tokio::test]
    async fn shared_secret_is_enforced_when_configured() {
        let app = build_app(AppState::fake(Some("s3cret")));

        let (status, _) = send(&app, "GET", "/auth/users/sessions/x", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/auth/users/sessions/x", None, Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/auth/users/sessions/x", None, Some("s3cret")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
