use std::sync::Arc;

use crate::auth::jwt::JwtKeys;
use crate::config::{AppConfig, StoreBackend};
use crate::mail::{self, Mailer};
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtKeys>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let store: Arc<dyn Store> = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config.database_url.as_deref().unwrap_or_default();
                let pg = PgStore::connect(url).await?;
                pg.migrate().await?;
                tracing::info!("postgres store ready");
                Arc::new(pg)
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory store; data is lost on shutdown");
                Arc::new(MemoryStore::new())
            }
        };
        let mailer = mail::from_config(&config.mail);

        Ok(Self::from_parts(store, mailer, Arc::new(config)))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        config: Arc<AppConfig>,
    ) -> Self {
        let jwt = Arc::new(JwtKeys::from_config(&config.jwt));
        Self {
            store,
            mailer,
            config,
            jwt,
        }
    }

    /// In-memory state with the given mailer, for tests.
    pub fn in_memory(mailer: Arc<dyn Mailer>) -> Self {
        Self::from_parts(
            Arc::new(MemoryStore::new()),
            mailer,
            Arc::new(AppConfig::for_tests()),
        )
    }
}
