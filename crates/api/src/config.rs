//! Environment configuration for the service binaries.

use std::sync::Arc;

use registra_auth::EnvelopeKey;

/// Which role this process plays.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ServiceKind {
    Gateway,
    Auth,
    Read,
    Create,
    Update,
    Delete,
}

impl ServiceKind {
    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "gateway" => Some(Self::Gateway),
            "auth" => Some(Self::Auth),
            "read" => Some(Self::Read),
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Gateway => 8080,
            Self::Auth => 5001,
            Self::Read => 5002,
            Self::Create => 5003,
            Self::Update => 5004,
            Self::Delete => 5005,
        }
    }
}

/// Upstream base URLs the gateway relays to.
#[derive(Debug, Clone)]
pub struct Upstreams {
    pub auth: String,
    pub read: String,
    pub create: String,
    pub update: String,
    pub delete: String,
}

#[derive(Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub port: u16,
    /// Postgres connection string; absent means the in-memory store.
    pub database_url: Option<String>,
    /// Oracle base URL for the write services' hooks; absent means the
    /// in-process snapshot reader (single store, as in tests).
    pub read_service_url: Option<String>,
    pub upstreams: Upstreams,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn load(kind: ServiceKind) -> Self {
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            "dev-secret".to_string()
        });
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(|| kind.default_port());

        Self {
            jwt_secret,
            port,
            database_url: std::env::var("DATABASE_URL").ok(),
            read_service_url: std::env::var("READ_SERVICE_URL").ok(),
            upstreams: Upstreams {
                auth: env_or("AUTH_URL", "http://127.0.0.1:5001"),
                read: env_or("READ_URL", "http://127.0.0.1:5002"),
                create: env_or("CREATE_URL", "http://127.0.0.1:5003"),
                update: env_or("UPDATE_URL", "http://127.0.0.1:5004"),
                delete: env_or("DELETE_URL", "http://127.0.0.1:5005"),
            },
        }
    }

    /// Load the gateway's passphrase-protected envelope key, or generate an
    /// ephemeral one for development.
    pub fn load_envelope_key(&self) -> anyhow::Result<Arc<EnvelopeKey>> {
        let path = std::env::var("ENVELOPE_KEY_FILE").ok();
        let passphrase = std::env::var("ENVELOPE_PASSPHRASE").ok();
        match (path, passphrase) {
            (Some(path), Some(passphrase)) => {
                let sealed = std::fs::read_to_string(&path)?;
                let key = EnvelopeKey::import_sealed(sealed.trim(), &passphrase)?;
                tracing::info!(%path, "envelope key loaded");
                Ok(Arc::new(key))
            }
            _ => {
                tracing::warn!(
                    "ENVELOPE_KEY_FILE/ENVELOPE_PASSPHRASE not set; \
                     generating an ephemeral envelope key"
                );
                Ok(Arc::new(EnvelopeKey::generate()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_kinds_parse_from_argv() {
        assert_eq!(ServiceKind::from_arg("gateway"), Some(ServiceKind::Gateway));
        assert_eq!(ServiceKind::from_arg("delete"), Some(ServiceKind::Delete));
        assert_eq!(ServiceKind::from_arg("bogus"), None);
    }

    #[test]
    fn each_service_has_a_distinct_default_port() {
        let ports = [
            ServiceKind::Gateway,
            ServiceKind::Auth,
            ServiceKind::Read,
            ServiceKind::Create,
            ServiceKind::Update,
            ServiceKind::Delete,
        ]
        .map(ServiceKind::default_port);
        let mut unique = ports.to_vec();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), ports.len());
    }
}
