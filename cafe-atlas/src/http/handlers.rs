use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer,
};
use tower_http::services::ServeDir;

use crate::db::CafeRepository;
use crate::uploads::PUBLIC_PREFIX;

use super::error::ApiError;
use super::responses::HealthResponse;
use super::state::AppState;
use super::{api, pages};

pub fn router(state: AppState) -> Router {
    let limits = state.limits.config();
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(limits.global_period_ms.max(1))
            .burst_size(limits.global_burst.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .unwrap_or_else(|| unreachable!("period and burst are clamped to at least 1")),
    );

    let api_routes = Router::new()
        .route("/login", post(api::login))
        .route("/cafes", get(api::list_cafes).post(api::create_cafe))
        .route(
            "/cafes/{id}",
            get(api::get_cafe)
                .put(api::update_cafe)
                .delete(api::delete_cafe),
        );

    Router::new()
        .route("/", get(pages::home))
        .route("/health", get(health))
        .route("/register", get(pages::register_page).post(pages::register))
        .route("/login", get(pages::login_page).post(pages::login))
        .route("/logout", get(pages::logout))
        .route(
            "/add",
            get(pages::add_page)
                .post(pages::add)
                .layer(upload_limit),
        )
        .route(
            "/update/{id}",
            get(pages::update_page)
                .post(pages::update)
                .patch(pages::update)
                .layer(upload_limit),
        )
        .route("/feedback", get(pages::feedback_page))
        .route("/all", get(pages::all_cafes).post(pages::all_cafes))
        .route("/search", get(pages::search_cafes))
        .route(
            "/delete_cafe/{id}",
            get(pages::delete_cafe).post(pages::delete_cafe),
        )
        .nest("/api", api_routes)
        .nest_service(
            &format!("/{PUBLIC_PREFIX}"),
            ServeDir::new(state.uploads.dir()),
        )
        .layer(GovernorLayer::new(governor_conf))
        .layer(tower_http::request_id::SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            tower_http::request_id::MakeRequestUuid::default(),
        ))
        .layer(tower_http::request_id::PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let cafes = CafeRepository::new(&state.pool).count().await?;
    Ok(Json(HealthResponse { status: "ok", cafes }))
}
