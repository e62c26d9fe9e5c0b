pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use std::future::Future;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route("/api/get-data", get(routes::data::get_data))
        .route("/api/save-data", post(routes::data::save_data))
        .route("/api/delete-data", post(routes::data::delete_data))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::admin_auth,
        ));

    Router::new()
        .merge(admin)
        .route(
            "/api/public/get-debug-flags",
            get(routes::public::get_debug_flags),
        )
        .route("/api/health", get(routes::public::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the storefront API server and stop on Ctrl-C.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Serve on a pre-bound listener until `shutdown` resolves, then wait for
/// background publish work.
///
/// Accepting a bound `TcpListener` lets the caller read the actual port first
/// (useful with `port = 0`). Pending runners are given one debounce window
/// plus an action budget to finish; anything still running after that is
/// abandoned and left to the runner lease TTL.
pub async fn serve_on<F>(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let actual_port = listener.local_addr()?.port();
    let tasks = app_state.scheduler.tasks().clone();
    let settings = app_state.scheduler.settings().clone();
    let app = build_router(app_state);

    tracing::info!("storefront API listening on http://localhost:{actual_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    let pending = tasks.pending();
    if pending > 0 {
        tracing::info!(pending, "waiting for background publish tasks");
    }
    let limit = settings
        .debounce
        .saturating_add(settings.max_single_sleep)
        .saturating_add(settings.action_budget);
    if !tasks.drain_for(limit).await {
        tracing::warn!("background publish tasks still running at shutdown, abandoning them");
    }
    Ok(())
}
