use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
    pub cookie_ttl_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub reset_token_ttl_minutes: i64,
    pub host: String,
    pub port: u16,
    pub production: bool,
    pub public_url: String,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store_backend = match std::env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("postgres") | Err(_) => StoreBackend::Postgres,
            Ok(other) => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        };
        let database_url = std::env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required for the postgres backend");
        }

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "informes".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "informes-users".into()),
            ttl_days: env_number("JWT_EXPIRE_DAYS", 30),
            cookie_ttl_days: env_number("JWT_COOKIE_EXPIRE_DAYS", 30),
        };

        let port = env_number("APP_PORT", 4000);
        let public_url = std::env::var("PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));

        Ok(Self {
            store_backend,
            database_url,
            jwt,
            reset_token_ttl_minutes: env_number("RESET_TOKEN_TTL_MINUTES", 10),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            production: std::env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
            public_url: public_url.trim_end_matches('/').to_string(),
            mail: MailConfig {
                api_url: std::env::var("MAIL_API_URL").ok(),
                api_key: std::env::var("MAIL_API_KEY").ok(),
                from: std::env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "no-reply@informes.local".into()),
            },
        })
    }

    /// Configuration used by tests and local tooling: in-memory store, short-lived secrets.
    pub fn for_tests() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_days: 1,
                cookie_ttl_days: 1,
            },
            reset_token_ttl_minutes: 10,
            host: "127.0.0.1".into(),
            port: 4000,
            production: false,
            public_url: "http://localhost:4000".into(),
            mail: MailConfig {
                api_url: None,
                api_key: None,
                from: "no-reply@informes.local".into(),
            },
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
