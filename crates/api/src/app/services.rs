//! Shared service wiring.
//!
//! Every non-gateway binary assembles the same bundle; which store and which
//! snapshot reader back it depends on the environment. With no
//! `DATABASE_URL` the in-memory store serves development and tests; with no
//! `READ_SERVICE_URL` hooks query the Oracle in process instead of over HTTP.

use std::sync::Arc;

use registra_auth::TokenCodec;
use registra_infra::{
    HttpSnapshotReader, MemoryStore, MemoryTokenStore, PgStore, PgTokenStore, RecordStore,
    SessionService, SnapshotService, StoreSnapshotReader, TokenStore,
};
use registra_policy::{PolicyRegistry, SnapshotReader};

use crate::config::Config;

pub struct AppServices {
    pub store: Arc<dyn RecordStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub session: SessionService,
    pub snapshot: Arc<SnapshotService>,
    pub reader: Arc<dyn SnapshotReader>,
    pub registry: PolicyRegistry,
    pub codec: TokenCodec,
}

impl AppServices {
    /// Wire the service bundle over an already-chosen store.
    pub fn assemble(
        store: Arc<dyn RecordStore>,
        tokens: Arc<dyn TokenStore>,
        codec: TokenCodec,
        read_service_url: Option<&str>,
    ) -> anyhow::Result<Arc<Self>> {
        let session = SessionService::new(store.clone(), tokens.clone(), codec.clone());
        let snapshot = Arc::new(SnapshotService::new(store.clone()));
        let reader: Arc<dyn SnapshotReader> = match read_service_url {
            Some(url) => Arc::new(HttpSnapshotReader::new(url, codec.clone())?),
            None => Arc::new(StoreSnapshotReader::new(snapshot.clone())),
        };

        Ok(Arc::new(Self {
            store,
            tokens,
            session,
            snapshot,
            reader,
            registry: PolicyRegistry::default(),
            codec,
        }))
    }

    pub async fn build(config: &Config) -> anyhow::Result<Arc<Self>> {
        let codec = TokenCodec::new(config.jwt_secret.as_bytes());

        let (store, tokens): (Arc<dyn RecordStore>, Arc<dyn TokenStore>) =
            match &config.database_url {
                Some(url) => {
                    let store = PgStore::connect(url).await?;
                    let tokens = PgTokenStore::new(store.pool().clone());
                    (Arc::new(store), Arc::new(tokens))
                }
                None => {
                    tracing::warn!("DATABASE_URL not set; using the in-memory store");
                    (
                        Arc::new(MemoryStore::new()),
                        Arc::new(MemoryTokenStore::new()),
                    )
                }
            };

        Self::assemble(store, tokens, codec, config.read_service_url.as_deref())
    }
}
