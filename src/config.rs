use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenStoreConfig {
    pub url: String,
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub db: DbConfig,
    pub token_store: TokenStoreConfig,
    pub request_timeout_secs: u64,
    pub auth_secret: Option<String>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let db = DbConfig {
            url: std::env::var("DATABASE_URL")?,
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", 5),
        };
        let token_store = TokenStoreConfig {
            url: std::env::var("TOKEN_STORE_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".into()),
            key_prefix: std::env::var("TOKEN_KEY_PREFIX").unwrap_or_else(|_| "auth:".into()),
        };
        let auth_secret = std::env::var("AUTH_SECRET")
            .ok()
            .filter(|s| !s.is_empty());
        Ok(Self {
            db,
            token_store,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 10),
            auth_secret,
        })
    }
}
