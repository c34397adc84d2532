pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

#[cfg(test)]
mod testing;

use axum::extract::{Request, State};
use axum::http::{header, Method};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracker_core::TrackerError;

pub use error::ApiError;
pub use state::AppState;

fn unauthorized(message: &str) -> Response {
    ApiError(TrackerError::Unauthorized(message.into())).into_response()
}

/// Middleware that resolves a bearer token to an [`auth::Identity`].
///
/// With auth disabled every request passes through unscoped.
async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if !state.config.auth.enabled {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);

    let Some(token) = token else {
        return unauthorized("Invalid or missing bearer token");
    };
    let Some(identity) = state.tokens.verify(&token).await else {
        return unauthorized("Invalid or missing bearer token");
    };

    // The account may have been disabled after the token was issued.
    let users = state.users.clone();
    let user_id = identity.user_id;
    match routes::blocking(move || users.get(user_id)).await {
        Ok(user) if !user.disabled => {}
        Ok(_) | Err(ApiError(TrackerError::NotFound(_))) => {
            state.tokens.revoke_user(identity.user_id).await;
            return unauthorized("Account is disabled");
        }
        Err(e) => return e.into_response(),
    }

    req.extensions_mut().insert(identity);
    next.run(req).await
}

/// Build the axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    // Record and analytics routes, scoped to the caller when auth is on.
    let protected = Router::new()
        .merge(routes::progress_routes())
        .merge(routes::analytics_routes())
        .merge(routes::user_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Public routes (health, login) never require auth.
    let public = Router::new()
        .merge(routes::health_routes())
        .merge(routes::login_routes());

    let mut app = Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state.clone());

    app = app.layer(TraceLayer::new_for_http());

    if config.server.cors {
        let cors = if config.auth.enabled {
            CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .allow_origin(Any)
        } else {
            CorsLayer::permissive()
        };
        app = app.layer(cors);
    }

    app
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    if !state.config.auth.enabled {
        tracing::warn!("Authentication disabled, all records are shared");
    }
    let router = build_router(state);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
