//! JSON API under `/api`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::auth::verify_password;
use crate::db::{CafeRepository, UserRepository};
use crate::rate_limit::{Budget, ClientIp};
use crate::user::normalize_email;
use crate::validation::{self, Mode, ValidationReport, MISSING};

use super::auth::{authenticate, ensure_admin};
use super::error::{cafe_conflict, ApiError};
use super::responses::{
    CafeChangedResponse, CafeListResponse, CafeResponse, LoginResponse, MessageResponse,
};
use super::state::AppState;

const LOGIN_NOT_JSON: &str =
    "Check request body. Please provide login credentials in JSON format.";
const LOGIN_EMPTY: &str = "Request body is empty. Please provide login credentials.";
const CAFE_NOT_JSON: &str = "Check request body. Content-Type must be application/json";
const CAFE_EMPTY: &str = "Request body is empty. Please provide data in JSON format.";

pub(super) fn check_budget(state: &AppState, budget: Budget, ClientIp(ip): ClientIp) -> Result<(), ApiError> {
    if state.limits.check(budget, ip) {
        Ok(())
    } else {
        Err(ApiError::RateLimited)
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

/// Decode a JSON object body, answering 415 for other media types and 400 for
/// empty or non-object payloads.
fn json_object(
    headers: &HeaderMap,
    body: &[u8],
    not_json: &'static str,
    empty: &'static str,
) -> Result<Map<String, Value>, ApiError> {
    if !is_json(headers) {
        return Err(ApiError::UnsupportedMediaType(not_json));
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest(empty));
    }
    let value: Value = serde_json::from_slice(body).map_err(|err| {
        debug!(error = %err, "request body is not valid JSON");
        ApiError::BadRequest("Request body is not valid JSON.")
    })?;
    if is_blank(&value) {
        return Err(ApiError::BadRequest(empty));
    }
    match value {
        Value::Object(fields) => Ok(fields),
        _ => Err(ApiError::BadRequest("Request body must be a JSON object.")),
    }
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LoginResponse>, ApiError> {
    check_budget(&state, Budget::Login, client)?;
    let payload = json_object(&headers, &body, LOGIN_NOT_JSON, LOGIN_EMPTY)?;

    let field = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    };
    let (Some(email), Some(password)) = (field("email"), field("password")) else {
        return Err(ApiError::BadRequest("Invalid credentials!"));
    };

    let user = UserRepository::new(&state.pool)
        .find_by_email(&normalize_email(email))
        .await?;
    let user = match user {
        Some(user) if verify_password(password, &user.password_hash)? => user,
        _ => {
            debug!("api login rejected");
            return Err(ApiError::Unauthorized("Invalid email or password."));
        }
    };

    let token = state.tokens.issue(user.id)?;
    info!(user_id = user.id, admin = user.is_admin, "api login");
    if user.is_admin {
        state.limits.reset_client(client.0);
        return Ok(Json(LoginResponse {
            token,
            message: Some("Admin login successful!"),
        }));
    }
    Ok(Json(LoginResponse {
        token,
        message: None,
    }))
}

pub async fn list_cafes(
    State(state): State<AppState>,
    client: ClientIp,
    headers: HeaderMap,
) -> Result<Json<CafeListResponse>, ApiError> {
    authenticate(&state, &headers).await?;
    check_budget(&state, Budget::Read, client)?;

    let cafes = CafeRepository::new(&state.pool).list().await?;
    debug!(cafes = cafes.len(), "cafes listed");
    Ok(Json(CafeListResponse { cafes }))
}

pub async fn get_cafe(
    State(state): State<AppState>,
    client: ClientIp,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<CafeResponse>, ApiError> {
    authenticate(&state, &headers).await?;
    check_budget(&state, Budget::Read, client)?;

    let cafe = CafeRepository::new(&state.pool)
        .get(id)
        .await?
        .ok_or(ApiError::CafeNotFound)?;
    Ok(Json(CafeResponse { cafe }))
}

pub async fn create_cafe(
    State(state): State<AppState>,
    client: ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CafeChangedResponse>), ApiError> {
    let user = authenticate(&state, &headers).await?;
    check_budget(&state, Budget::Write, client)?;
    if user.is_admin {
        state.limits.reset_client(client.0);
    }

    let payload = json_object(&headers, &body, CAFE_NOT_JSON, CAFE_EMPTY)?;
    let fields = validation::validate_cafe(validation::raw_from_json(payload), Mode::Create)
        .map_err(ApiError::Validation)?;
    let new_cafe = fields.into_new_cafe().map_err(|field| {
        let mut report = ValidationReport::default();
        report.add(field, MISSING);
        ApiError::Validation(report)
    })?;

    let cafes = CafeRepository::new(&state.pool);
    if let Some(existing) = cafes.find_by_name(&new_cafe.name).await? {
        return Err(ApiError::Conflict(format!(
            "Cafe '{}' already exists in the database.",
            existing.name
        )));
    }
    let cafe = cafes.create(&new_cafe).await.map_err(cafe_conflict)?;
    info!(cafe_id = cafe.id, name = %cafe.name, user_id = user.id, "cafe added via api");

    Ok((
        StatusCode::CREATED,
        Json(CafeChangedResponse {
            message: String::from("Cafe added successfully!"),
            cafe,
        }),
    ))
}

pub async fn update_cafe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<CafeChangedResponse>, ApiError> {
    let user = authenticate(&state, &headers).await?;
    ensure_admin(&user)?;

    let cafes = CafeRepository::new(&state.pool);
    let mut cafe = cafes.get(id).await?.ok_or(ApiError::CafeNotFound)?;

    let payload = json_object(&headers, &body, CAFE_NOT_JSON, CAFE_EMPTY)?;
    let fields = validation::validate_cafe(validation::raw_from_json(payload), Mode::Partial)
        .map_err(ApiError::Validation)?;
    cafe.apply(fields);

    if !cafes.update(&cafe).await.map_err(cafe_conflict)? {
        return Err(ApiError::CafeNotFound);
    }
    info!(cafe_id = cafe.id, user_id = user.id, "cafe updated via api");

    Ok(Json(CafeChangedResponse {
        message: format!("{} updated successfully!", cafe.name),
        cafe,
    }))
}

pub async fn delete_cafe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = authenticate(&state, &headers).await?;
    ensure_admin(&user)?;

    let cafes = CafeRepository::new(&state.pool);
    let cafe = cafes.get(id).await?.ok_or(ApiError::CafeNotFound)?;
    if !cafes.delete(cafe.id).await? {
        return Err(ApiError::CafeNotFound);
    }
    info!(cafe_id = cafe.id, user_id = user.id, "cafe deleted via api");

    Ok(Json(MessageResponse {
        message: format!("{} deleted successfully!", cafe.name),
    }))
}
