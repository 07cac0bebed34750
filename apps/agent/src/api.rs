use crate::auth::bearer_token;
use crate::browse::{is_browsable, list_directory, FileNode};
use crate::errors::{AuthError, ErrorCategory, TaskError};
use crate::logging::Redact;
use crate::orchestrator::Confirmation;
use crate::remotes::Rclone;
use crate::state::SharedState;
use crate::task::BackupTaskSpec;
use crate::users::RegisterError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn reject(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody { error: error.to_string(), message: message.into() }),
    )
}

fn internal(message: &str) -> ApiError {
    reject(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    debug!("rejected request body: {}", rejection);
    reject(StatusCode::BAD_REQUEST, "invalid_request", "invalid request body")
}

#[derive(Debug, Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct FilesystemQuery {
    path: Option<String>,
}

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let protected = Router::new()
        .route("/create_backup_task", post(create_backup_task))
        .route("/filesystem", get(filesystem))
        .route("/rclone_config", get(rclone_config))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .merge(protected)
        .with_state(state);

    // The web client talks to the `/api` prefix.
    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(cors)
}

pub async fn serve(state: SharedState, listen_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn require_token(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let claims = bearer_token(header)
        .and_then(|token| state.tokens.verify(token))
        .map_err(|err| {
            debug!("unauthorized request: {}", err);
            let status = StatusCode::UNAUTHORIZED;
            match err {
                AuthError::MissingToken => reject(status, "unauthorized", "missing or malformed token"),
                _ => reject(status, "unauthorized", "invalid token"),
            }
        })?;
    debug!("authorized request user={}", claims.sub);
    Ok(next.run(req).await)
}

async fn register(
    State(state): State<SharedState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = body.map_err(bad_body)?;
    let result = tokio::task::spawn_blocking(move || {
        let mut users = state.users.write().unwrap_or_else(|p| p.into_inner());
        users.register(&req.username, &req.password)
    })
    .await
    .map_err(|_| internal("registration failed"))?;

    match result {
        Ok(()) => {
            info!("register: operator account created");
            Ok(Json(MessageResponse { message: "registration successful".to_string() }))
        }
        Err(RegisterError::Auth(err)) => Err(reject(StatusCode::BAD_REQUEST, "registration", err.to_string())),
        Err(RegisterError::Storage(err)) => {
            error!("register: {}", Redact::new(err));
            Err(internal("registration failed"))
        }
    }
}

async fn login(
    State(state): State<SharedState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = body.map_err(bad_body)?;
    let username = req.username.clone();
    let verify_state = state.clone();
    let authenticated = tokio::task::spawn_blocking(move || {
        let users = verify_state.users.read().unwrap_or_else(|p| p.into_inner());
        users.authenticate(&req.username, &req.password)
    })
    .await
    .map_err(|_| internal("login failed"))?;

    if !authenticated {
        warn!("login: rejected credentials");
        return Err(reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            AuthError::InvalidCredentials.to_string(),
        ));
    }
    Ok(Json(LoginResponse { token: state.tokens.issue(&username) }))
}

async fn create_backup_task(
    State(state): State<SharedState>,
    body: Result<Json<BackupTaskSpec>, JsonRejection>,
) -> Result<Json<Confirmation>, ApiError> {
    let Json(spec) = body.map_err(bad_body)?;
    debug!("create_backup_task: request task={:?} remotes={}", spec.name, spec.remote_targets.len());
    let result = tokio::task::spawn_blocking(move || state.orchestrator.create_backup_task(&spec))
        .await
        .map_err(|_| internal("backup task creation failed"))?;
    result.map(Json).map_err(task_rejection)
}

fn task_rejection(err: TaskError) -> ApiError {
    let (status, error) = match err.category {
        ErrorCategory::MalformedSchedule => (StatusCode::BAD_REQUEST, "malformed_schedule"),
        ErrorCategory::InvalidSchedule => (StatusCode::BAD_REQUEST, "invalid_schedule"),
        ErrorCategory::InvalidSpec => (StatusCode::BAD_REQUEST, "invalid_spec"),
        ErrorCategory::Render => (StatusCode::INTERNAL_SERVER_ERROR, "render"),
        ErrorCategory::Install => (StatusCode::INTERNAL_SERVER_ERROR, "install"),
    };
    reject(status, error, err.message)
}

async fn filesystem(Query(query): Query<FilesystemQuery>) -> Result<Json<Vec<FileNode>>, ApiError> {
    let path = PathBuf::from(query.path.filter(|p| !p.is_empty()).unwrap_or_else(|| "/".to_string()));
    if !is_browsable(&path) {
        return Err(reject(StatusCode::BAD_REQUEST, "invalid_path", "invalid path"));
    }
    tokio::task::spawn_blocking(move || list_directory(&path))
        .await
        .map_err(|_| internal("failed to read directory"))?
        .map(Json)
        .map_err(|err| {
            debug!("filesystem: {}", err);
            internal("failed to read directory")
        })
}

async fn rclone_config(State(state): State<SharedState>) -> Result<Json<Vec<String>>, ApiError> {
    let override_path = state.rclone_path.clone();
    tokio::task::spawn_blocking(move || Rclone::resolve(override_path.as_deref())?.remote_names())
        .await
        .map_err(|_| internal("failed to read rclone config"))?
        .map(Json)
        .map_err(|err| {
            error!("rclone_config: {}", Redact::new(err));
            internal("failed to read rclone config")
        })
}
