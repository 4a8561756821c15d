//! HTTP controller.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Redirect to the dashboard or the login page |
//! | `GET`/`POST` | `/login` | Login form / authenticate |
//! | `GET`/`POST` | `/signup` | Signup form / create account |
//! | `GET`/`POST` | `/dashboard` | Upload a file and ask a question (login required) |
//! | `GET`  | `/logout` | End the session |
//! | `GET`  | `/browse_files` | JSON list of the user's uploads (login required) |
//! | `POST` | `/process_query` | JSON analysis of a stored upload (login required) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! HTML routes report failures as flash messages; JSON routes use
//! [`AppError`].

use askama::Template;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tower_sessions::Session;

use crate::analysis::Analyzer;
use crate::auth::{self, AuthError};
use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::migrate;
use crate::models::{Analysis, Document};
use crate::pipeline::{self, PipelineError};
use crate::session;
use crate::upload;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub analyzer: Arc<Analyzer>,
}

impl AppState {
    /// Opens the database, ensures the schema, and builds the analyzer.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        let analyzer = Analyzer::from_config(config)?;
        Ok(Self {
            config: Arc::new(config.clone()),
            pool,
            analyzer: Arc::new(analyzer),
        })
    }
}

pub fn router(state: AppState) -> Router {
    // Multipart framing needs some headroom over the file itself.
    let body_limit = state.config.uploads.max_bytes + 64 * 1024;

    Router::new()
        .route("/", get(handle_index))
        .route("/login", get(login_page).post(login_submit))
        .route("/signup", get(signup_page).post(signup_submit))
        .route("/dashboard", get(dashboard_page).post(dashboard_submit))
        .route("/logout", get(handle_logout))
        .route("/browse_files", get(handle_browse_files))
        .route("/process_query", post(handle_process_query))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(session::layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the web server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Pages ============

#[derive(Template)]
#[template(path = "login.html")]
struct LoginPage {
    flashes: Vec<String>,
}

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupPage {
    flashes: Vec<String>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardPage {
    flashes: Vec<String>,
    username: String,
    accept: String,
    response: Option<String>,
    documents: Vec<Document>,
}

fn render<T: Template>(template: &T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Template render error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Template error: {}", e),
            )
                .into_response()
        }
    }
}

fn to_login() -> Response {
    Redirect::to("/login").into_response()
}

fn to_dashboard() -> Response {
    Redirect::to("/dashboard").into_response()
}

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

// ============ GET / ============

async fn handle_index(session: Session) -> Result<Response, AppError> {
    match session::current_user(&session).await? {
        Some(_) => Ok(to_dashboard()),
        None => Ok(to_login()),
    }
}

// ============ /login ============

async fn login_page(session: Session) -> Result<Response, AppError> {
    let flashes = session::take_flashes(&session).await?;
    Ok(render(&LoginPage { flashes }))
}

async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<Credentials>,
) -> Result<Response, AppError> {
    match auth::login(&state.pool, &form.username, &form.password).await {
        Ok(user) => {
            session::log_in(&session, user.id).await?;
            tracing::info!(user_id = user.id, "login");
            return Ok(to_dashboard());
        }
        Err(AuthError::InvalidCredentials) => {
            session::flash(&session, AuthError::InvalidCredentials.to_string()).await?;
        }
        Err(e) => {
            tracing::warn!("login failed: {}", e);
            session::flash(&session, "Login failed, please try again").await?;
        }
    }
    login_page(session).await
}

// ============ /signup ============

async fn signup_page(session: Session) -> Result<Response, AppError> {
    let flashes = session::take_flashes(&session).await?;
    Ok(render(&SignupPage { flashes }))
}

async fn signup_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<Credentials>,
) -> Result<Response, AppError> {
    match auth::signup(&state.pool, &form.username, &form.password).await {
        Ok(_) => {
            session::flash(&session, "Account created successfully").await?;
            return Ok(to_login());
        }
        Err(e @ (AuthError::DuplicateUsername | AuthError::MissingField)) => {
            session::flash(&session, e.to_string()).await?;
        }
        Err(e) => {
            tracing::warn!("signup failed: {}", e);
            session::flash(&session, "Signup failed, please try again").await?;
        }
    }
    signup_page(session).await
}

// ============ /dashboard ============

async fn render_dashboard(
    state: &AppState,
    session: &Session,
    user_id: i64,
    response: Option<String>,
) -> Result<Response, AppError> {
    let user = match auth::find_user_by_id(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?
    {
        Some(user) => user,
        // Account vanished under a live session.
        None => {
            session::log_out(session).await?;
            return Ok(to_login());
        }
    };
    let documents = upload::list_documents(&state.pool, user_id).await?;
    let flashes = session::take_flashes(session).await?;

    Ok(render(&DashboardPage {
        flashes,
        username: user.username,
        accept: state
            .config
            .uploads
            .allowed_extensions
            .iter()
            .map(|ext| format!(".{}", ext))
            .collect::<Vec<_>>()
            .join(","),
        response,
        documents,
    }))
}

async fn dashboard_page(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let Some(user_id) = session::current_user(&session).await? else {
        return Ok(to_login());
    };
    render_dashboard(&state, &session, user_id, None).await
}

struct UploadedFile {
    filename: String,
    data: Vec<u8>,
}

#[derive(Default)]
struct DashboardForm {
    file: Option<UploadedFile>,
    query: String,
}

async fn read_dashboard_form(
    multipart: &mut Multipart,
) -> Result<DashboardForm, axum::extract::multipart::MultipartError> {
    let mut form = DashboardForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?.to_vec();
                form.file = Some(UploadedFile { filename, data });
            }
            Some("query") => {
                form.query = field.text().await?;
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn dashboard_submit(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let Some(user_id) = session::current_user(&session).await? else {
        return Ok(to_login());
    };

    let form = match read_dashboard_form(&mut multipart).await {
        Ok(form) => form,
        Err(e) => {
            session::flash(&session, format!("Error processing file: {}", e.body_text()))
                .await?;
            return Ok(to_dashboard());
        }
    };

    let Some(file) = form.file else {
        session::flash(&session, "No file uploaded").await?;
        return Ok(to_dashboard());
    };

    let result = pipeline::answer_upload(
        &state.pool,
        &state.config.uploads,
        &state.analyzer,
        user_id,
        &file.filename,
        file.data,
        &form.query,
    )
    .await;

    match result {
        Ok((document, analysis)) => {
            tracing::info!(
                user_id,
                document_id = document.id,
                similarity = analysis.similarity,
                branch = ?analysis.branch,
                "query answered"
            );
            render_dashboard(&state, &session, user_id, Some(analysis.response)).await
        }
        Err(e) if e.is_rejection() => {
            session::flash(&session, e.to_string()).await?;
            Ok(to_dashboard())
        }
        Err(e) => {
            tracing::warn!(user_id, "processing failed: {}", e);
            session::flash(&session, format!("Error processing file: {}", e)).await?;
            render_dashboard(&state, &session, user_id, None).await
        }
    }
}

// ============ GET /logout ============

async fn handle_logout(session: Session) -> Result<Response, AppError> {
    session::log_out(&session).await?;
    Ok(to_login())
}

// ============ GET /browse_files ============

#[derive(Serialize)]
struct BrowseFilesResponse {
    files: Vec<Document>,
}

async fn handle_browse_files(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<BrowseFilesResponse>, AppError> {
    let user_id = session::current_user(&session)
        .await?
        .ok_or_else(AppError::unauthorized)?;
    let files = upload::list_documents(&state.pool, user_id).await?;
    Ok(Json(BrowseFilesResponse { files }))
}

// ============ POST /process_query ============

#[derive(Deserialize)]
struct ProcessQueryRequest {
    document_id: i64,
    query: String,
}

async fn handle_process_query(
    State(state): State<AppState>,
    session: Session,
    payload: Result<Json<ProcessQueryRequest>, JsonRejection>,
) -> Result<Json<Analysis>, AppError> {
    let user_id = session::current_user(&session)
        .await?
        .ok_or_else(AppError::unauthorized)?;
    let Json(req) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;

    let document = upload::get_document(&state.pool, user_id, req.document_id)
        .await?
        .ok_or_else(|| AppError::not_found("Document not found"))?;

    pipeline::answer_stored(&state.analyzer, &document, &req.query)
        .await
        .map(Json)
        .map_err(|e| match e {
            e if e.is_rejection() => AppError::bad_request(e.to_string()),
            PipelineError::Extract(_) => {
                AppError::bad_request(format!("Error processing file: {}", e))
            }
            e => AppError::internal(format!("Error processing file: {}", e)),
        })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
