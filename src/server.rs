use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    api::handler::{
        fund_contract, health_check, initialize_contract, settle_contract, submit_signed, AppState,
    },
    middleware::hmac_auth,
};

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    // Everything except the health check must carry a valid HMAC signature
    let protected = Router::new()
        .route("/contracts/initialize", post(initialize_contract))
        .route("/contracts/:id/fund", post(fund_contract))
        .route("/contracts/:id/settle", post(settle_contract))
        .route("/contracts/:id/submit-signed", post(submit_signed))
        .route_layer(middleware::from_fn_with_state(
            state.signer.clone(),
            hmac_auth,
        ));

    let app = Router::new()
        .nest(
            "/v1",
            protected.route("/health", get(health_check)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server<F>(
    app: Router,
    bind_address: &str,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
