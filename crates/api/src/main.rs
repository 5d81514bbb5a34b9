//! Service entry point.
//!
//! `registra <gateway|auth|read|create|update|delete>` starts one service;
//! with no argument the gateway is assumed. Each service binds its own port
//! (overridable via `PORT`) so the set can run split across hosts or all on
//! one box.

use std::net::SocketAddr;

use registra_api::app::services::AppServices;
use registra_api::config::{Config, ServiceKind};
use registra_api::{app, gateway};
use registra_infra::{spawn_sweeper, SWEEP_PERIOD};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    registra_observability::init();

    let arg = std::env::args().nth(1).unwrap_or_else(|| "gateway".to_string());
    let kind = ServiceKind::from_arg(&arg).ok_or_else(|| {
        anyhow::anyhow!("unknown service '{arg}' (expected gateway|auth|read|create|update|delete)")
    })?;
    let config = Config::load(kind);

    let router = match kind {
        ServiceKind::Gateway => gateway::build_gateway(&config)?,
        _ => {
            let services = AppServices::build(&config).await?;
            if kind == ServiceKind::Auth {
                spawn_sweeper(services.tokens.clone(), SWEEP_PERIOD);
            }
            app::build_app(kind, services)
        }
    };

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(service = ?kind, port = config.port, "listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
