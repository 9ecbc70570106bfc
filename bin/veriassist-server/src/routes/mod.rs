//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - the chat page at `/`
//! - the chat API under `/api`
//! - the health route
//! - optional Swagger UI / OpenAPI document (disable with
//!   `VERIASSIST_ENABLE_SWAGGER=false`)
//! - middleware layers (CORS, per-request trace ID)

mod chat;
pub mod doc;
mod health;
mod page;

use std::sync::Arc;

use axum::{Router, middleware};
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(page::router())
        .merge(health::router())
        .nest("/api", chat::router());

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    // Outermost layer first: every request is traced, CORS included.
    app.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(trace::trace_middleware))
            .layer(cors::cors_layer(&state.config)),
    )
    .with_state(state)
}
