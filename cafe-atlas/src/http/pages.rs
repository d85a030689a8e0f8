//! Server-rendered pages.
//!
//! Pages share the data, validation and auth layers with the JSON API. Form
//! errors are rendered back into the page; admin refusals answer with the
//! same JSON bodies the API uses.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::SignedCookieJar;
use tracing::{debug, info, warn};

use crate::auth::{hash_password, verify_password};
use crate::cafe::Cafe;
use crate::db::{CafeRepository, RepositoryError, UserRepository};
use crate::rate_limit::{Budget, ClientIp};
use crate::search;
use crate::user::{base_username, normalize_email, NewUser};
use crate::validation::{
    self, LoginInput, Mode, RawValue, RegistrationInput, ValidationReport, MISSING,
};

use super::api::check_budget;
use super::auth::{
    end_session, ensure_page_admin, local_redirect, require_login, session_user, start_session,
};
use super::error::{ApiError, PageError};
use super::responses::{FeedbackQuery, HomeQuery, ListQuery, LoginQuery, LogoutQuery, SearchQuery};
use super::state::AppState;
use super::templates::{
    cafe_values, error_lines, CafeFormTemplate, CafeFormView, CafeRow, CafesTemplate,
    FeedbackTemplate, IndexTemplate, LoginTemplate, Nav, RegisterTemplate, CAFE_COLUMNS,
};

/// A submitted cafe form: text fields plus any uploaded image files.
#[derive(Debug, Default)]
struct CafeSubmission {
    values: BTreeMap<String, String>,
    images: Vec<(String, Bytes)>,
}

impl CafeSubmission {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let malformed = |err: axum::extract::multipart::MultipartError| {
            if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
                warn!(error = %err, "multipart body over the upload limit");
                return ApiError::PayloadTooLarge;
            }
            debug!(error = %err, "malformed multipart body");
            ApiError::BadRequest("Malformed form submission.")
        };

        let mut submission = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == "images" {
                let filename = field.file_name().map(str::to_string).unwrap_or_default();
                let data = field.bytes().await.map_err(malformed)?;
                if !filename.is_empty() {
                    submission.images.push((filename, data));
                }
            } else {
                let text = field.text().await.map_err(malformed)?;
                submission.values.insert(name, text);
            }
        }
        Ok(submission)
    }

    fn raw_values(&self) -> BTreeMap<String, RawValue> {
        self.values
            .iter()
            .map(|(key, value)| (key.clone(), RawValue::Text(value.clone())))
            .collect()
    }

    /// Store accepted images. `None` when the form carried no files at all.
    async fn store_images(&self, state: &AppState) -> Result<Option<String>, PageError> {
        if self.images.is_empty() {
            return Ok(None);
        }
        let mut stored = Vec::with_capacity(self.images.len());
        for (filename, data) in &self.images {
            if let Some(path) = state.uploads.save(filename, data).await? {
                stored.push(path);
            }
        }
        Ok(Some(stored.join(",")))
    }
}

fn feedback(action: &str) -> Response {
    Redirect::to(&format!("/feedback?action={action}")).into_response()
}

pub async fn home(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<HomeQuery>,
) -> Result<Response, PageError> {
    let user = session_user(&state, &jar).await?;
    let notice = query
        .logged_out
        .map(|_| String::from("You have been logged out."));
    Ok(IndexTemplate {
        nav: Nav::for_user(user.as_ref()),
        notice,
    }
    .into_response())
}

const ALREADY_REGISTERED: &str = "User already logged in! Please log out first.";

pub async fn register_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<Response, PageError> {
    let user = session_user(&state, &jar).await?;
    Ok(RegisterTemplate {
        notice: user.as_ref().map(|_| String::from(ALREADY_REGISTERED)),
        nav: Nav::for_user(user.as_ref()),
        email: String::new(),
        errors: Vec::new(),
    }
    .into_response())
}

pub async fn register(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(input): Form<RegistrationInput>,
) -> Result<Response, PageError> {
    let current = session_user(&state, &jar).await?;
    if current.is_some() {
        return Ok(RegisterTemplate {
            nav: Nav::for_user(current.as_ref()),
            email: input.email,
            errors: Vec::new(),
            notice: Some(String::from(ALREADY_REGISTERED)),
        }
        .into_response());
    }

    let users = UserRepository::new(&state.pool);
    let email = normalize_email(&input.email);
    let mut report = validation::validate_registration(&input);
    if !report.has("email") && users.find_by_email(&email).await?.is_some() {
        report.add(
            "email",
            "That email is already in use. Please choose a different one.",
        );
    }
    if !report.is_empty() {
        return Ok(RegisterTemplate {
            nav: Nav::default(),
            email: input.email,
            errors: error_lines(&report),
            notice: None,
        }
        .into_response());
    }

    let username = users.available_username(&base_username(&email)).await?;
    let password_hash = hash_password(&input.password)?;
    let user = users
        .create(&NewUser {
            username,
            email,
            password_hash,
        })
        .await?;
    info!(user_id = user.id, username = %user.username, "user registered");

    Ok(Redirect::to("/login?registered=1").into_response())
}

pub async fn login_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<LoginQuery>,
) -> Result<Response, PageError> {
    if session_user(&state, &jar).await?.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    Ok(LoginTemplate {
        nav: Nav::default(),
        email: String::new(),
        next: local_redirect(query.next.as_deref())
            .unwrap_or_default()
            .to_string(),
        errors: Vec::new(),
        notice: query
            .registered
            .map(|_| String::from("Registration successful! Please sign in.")),
    }
    .into_response())
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientIp,
    jar: SignedCookieJar,
    Query(query): Query<LoginQuery>,
    Form(input): Form<LoginInput>,
) -> Result<Response, PageError> {
    check_budget(&state, Budget::Login, client)?;
    if session_user(&state, &jar).await?.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let next = local_redirect(query.next.as_deref())
        .or_else(|| local_redirect(input.next.as_deref()))
        .map(str::to_string);
    let render = |errors: Vec<String>| LoginTemplate {
        nav: Nav::default(),
        email: input.email.clone(),
        next: next.clone().unwrap_or_default(),
        errors,
        notice: None,
    };

    let report = validation::validate_login(&input);
    if !report.is_empty() {
        return Ok(render(error_lines(&report)).into_response());
    }

    let user = UserRepository::new(&state.pool)
        .find_by_email(&normalize_email(&input.email))
        .await?;
    let user = match user {
        Some(user) if verify_password(&input.password, &user.password_hash)? => user,
        _ => {
            debug!("page login rejected");
            let errors = vec![String::from("Invalid email or password. Please try again.")];
            return Ok(render(errors).into_response());
        }
    };

    let remember = input.remember();
    let jar = start_session(&state, jar, user.id, remember);
    info!(user_id = user.id, remember, "session started");

    let target = next.unwrap_or_else(|| String::from("/"));
    Ok((jar, Redirect::to(&target)).into_response())
}

pub async fn logout(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    uri: Uri,
    Query(query): Query<LogoutQuery>,
) -> Result<Response, PageError> {
    let user = require_login(&state, &jar, &uri).await?;
    let jar = end_session(&state, jar);
    info!(user_id = user.id, "session ended");

    let target = local_redirect(query.next_page.as_deref())
        .map_or_else(|| String::from("/?logged_out=1"), str::to_string);
    Ok((jar, Redirect::to(&target)).into_response())
}

fn add_form(nav: Nav, form: CafeFormView, errors: Vec<String>) -> Response {
    CafeFormTemplate {
        nav,
        heading: String::from("Add a cafe"),
        action: String::from("/add"),
        submit_label: "Add Cafe",
        form,
        errors,
    }
    .into_response()
}

fn update_form(nav: Nav, cafe: &Cafe, form: CafeFormView, errors: Vec<String>) -> Response {
    CafeFormTemplate {
        nav,
        heading: format!("Update {}", cafe.name),
        action: format!("/update/{}", cafe.id),
        submit_label: "Update Cafe",
        form,
        errors,
    }
    .into_response()
}

pub async fn add_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    uri: Uri,
) -> Result<Response, PageError> {
    let user = require_login(&state, &jar, &uri).await?;
    Ok(add_form(
        Nav::for_user(Some(&user)),
        CafeFormView::empty(),
        Vec::new(),
    ))
}

pub async fn add(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    uri: Uri,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let user = require_login(&state, &jar, &uri).await?;
    let nav = Nav::for_user(Some(&user));
    let submission = CafeSubmission::read(multipart).await?;

    let fields = match validation::validate_cafe(submission.raw_values(), Mode::Create) {
        Ok(fields) => fields,
        Err(report) => {
            let form = CafeFormView::from_values(&submission.values);
            return Ok(add_form(nav, form, error_lines(&report)));
        }
    };
    let mut new_cafe = match fields.into_new_cafe() {
        Ok(new_cafe) => new_cafe,
        Err(field) => {
            let mut report = ValidationReport::default();
            report.add(field, MISSING);
            let form = CafeFormView::from_values(&submission.values);
            return Ok(add_form(nav, form, error_lines(&report)));
        }
    };

    let cafes = CafeRepository::new(&state.pool);
    if cafes.find_by_name(&new_cafe.name).await?.is_some() {
        let errors = vec![format!("Cafe '{}' already exists.", new_cafe.name)];
        let form = CafeFormView::from_values(&submission.values);
        return Ok(add_form(nav, form, errors));
    }

    new_cafe.images = submission
        .store_images(&state)
        .await?
        .filter(|joined| !joined.is_empty());
    let cafe = match cafes.create(&new_cafe).await {
        Ok(cafe) => cafe,
        Err(err) => {
            if let Some(images) = &new_cafe.images {
                state.uploads.discard(images).await;
            }
            if let RepositoryError::Conflict(name) = &err {
                warn!(name = %name, "add rejected: duplicate name");
                let errors = vec![format!("Cafe '{name}' already exists.")];
                let form = CafeFormView::from_values(&submission.values);
                return Ok(add_form(nav, form, errors));
            }
            return Err(err.into());
        }
    };
    info!(cafe_id = cafe.id, name = %cafe.name, user_id = user.id, "cafe added");

    Ok(feedback("add"))
}

pub async fn update_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let user = require_login(&state, &jar, &uri).await?;
    ensure_page_admin(&user)?;

    let Some(cafe) = CafeRepository::new(&state.pool).get(id).await? else {
        return Ok(feedback("notfound"));
    };
    let form = CafeFormView::from_values(&cafe_values(&cafe));
    Ok(update_form(Nav::for_user(Some(&user)), &cafe, form, Vec::new()))
}

pub async fn update(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    uri: Uri,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let user = require_login(&state, &jar, &uri).await?;
    ensure_page_admin(&user)?;
    let nav = Nav::for_user(Some(&user));

    let cafes = CafeRepository::new(&state.pool);
    let Some(mut cafe) = cafes.get(id).await? else {
        return Ok(feedback("notfound"));
    };
    let submission = CafeSubmission::read(multipart).await?;

    // Re-rendered forms show the stored record overlaid with what was submitted.
    let overlaid = || {
        let mut values = cafe_values(&cafe);
        values.extend(
            submission
                .values
                .iter()
                .filter(|(_, value)| !value.trim().is_empty())
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        CafeFormView::from_values(&values)
    };

    let fields = match validation::validate_cafe(submission.raw_values(), Mode::Partial) {
        Ok(fields) => fields,
        Err(report) => {
            let form = overlaid();
            return Ok(update_form(nav, &cafe, form, error_lines(&report)));
        }
    };

    let original = cafe.clone();
    cafe.apply(fields);
    let uploaded = submission
        .store_images(&state)
        .await?
        .filter(|joined| !joined.is_empty());
    if let Some(images) = &uploaded {
        cafe.images = Some(images.clone());
    }

    let outcome = cafes.update(&cafe).await;
    if !matches!(outcome, Ok(true)) {
        if let Some(images) = &uploaded {
            state.uploads.discard(images).await;
        }
    }
    match outcome {
        Ok(true) => {}
        Ok(false) => return Ok(feedback("notfound")),
        Err(RepositoryError::Conflict(name)) => {
            warn!(cafe_id = id, name = %name, "update rejected: duplicate name");
            let errors = vec![format!("Cafe '{name}' already exists.")];
            let mut values = cafe_values(&original);
            values.extend(submission.values.clone());
            let form = CafeFormView::from_values(&values);
            return Ok(update_form(nav, &original, form, errors));
        }
        Err(other) => return Err(other.into()),
    }
    info!(cafe_id = cafe.id, user_id = user.id, "cafe updated");

    Ok(feedback("update"))
}

pub async fn feedback_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    uri: Uri,
    Query(query): Query<FeedbackQuery>,
) -> Result<Response, PageError> {
    let user = require_login(&state, &jar, &uri).await?;
    Ok(FeedbackTemplate::for_action(Nav::for_user(Some(&user)), query.action.as_deref()).into_response())
}

pub async fn all_cafes(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<ListQuery>,
) -> Result<Response, PageError> {
    let user = session_user(&state, &jar).await?;
    let is_rated = query.is_rated.is_some_and(|v| !v.is_empty());

    let mut cafes = CafeRepository::new(&state.pool).list().await?;
    if is_rated {
        cafes = search::top_rated(cafes);
    }

    Ok(CafesTemplate {
        nav: Nav::for_user(user.as_ref()),
        columns: CAFE_COLUMNS.to_vec(),
        rows: cafes.iter().map(CafeRow::from).collect(),
        notices: Vec::new(),
        is_rated,
        search_mode: false,
        query: String::new(),
        nearby: false,
    }
    .into_response())
}

pub async fn search_cafes(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(query): Query<SearchQuery>,
) -> Result<Response, PageError> {
    let user = session_user(&state, &jar).await?;
    let nearby = query.nearby();

    let mut rows = Vec::new();
    let mut notices = Vec::new();
    match query.term() {
        Some(term) => {
            let cafes = CafeRepository::new(&state.pool).list().await?;
            rows = search::search(&cafes, term, state.search_threshold)
                .into_iter()
                .map(CafeRow::from)
                .collect();
            debug!(query = %term, results = rows.len(), "cafe search");
            if rows.is_empty() {
                notices.push(String::from(
                    "Sorry, no cafes matching your search criteria were found.",
                ));
            }
        }
        None if !nearby => notices.push(String::from("Please enter a search query.")),
        None => {}
    }

    Ok(CafesTemplate {
        nav: Nav::for_user(user.as_ref()),
        columns: CAFE_COLUMNS.to_vec(),
        rows,
        notices,
        is_rated: false,
        search_mode: true,
        query: query.term().unwrap_or_default().to_string(),
        nearby,
    }
    .into_response())
}

pub async fn delete_cafe(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    uri: Uri,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let user = require_login(&state, &jar, &uri).await?;
    ensure_page_admin(&user)?;

    if !CafeRepository::new(&state.pool).delete(id).await? {
        return Ok(feedback("notfound"));
    }
    info!(cafe_id = id, user_id = user.id, "cafe deleted");
    Ok(feedback("delete"))
}
