//! HTTP handlers for the ao-coverage server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_web::dev::ServiceRequest;
use actix_web::http::header;
use actix_web::middleware::Logger;
use actix_web::{HttpRequest, HttpResponse, Responder, get, post, web};
use aocov_core::{FileSystem, FormatRegistry, StdFileSystem, validate_segment};
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use crate::config::ServerConfig;
use crate::ingest::{IngestError, IngestService, UploadRequest};
use crate::metadata::MetadataStore;
use crate::openapi::ApiDoc;
use crate::retrieval::{Artifact, RetrievalError, RetrievalService};
use crate::token::UploadToken;

/// Body of every internal failure response.
pub const UNKNOWN_ERROR: &str = "Unknown error occurred";

const NOT_FOUND_BODY: &str = "Not found";

#[derive(Clone)]
/// Shared application state for handlers.
pub struct AppState {
    /// Upload workflow.
    pub ingest: IngestService,
    /// Artifact lookup workflow.
    pub retrieval: RetrievalService,
    /// Landing pages and static assets.
    pub site: SiteFiles,
}

impl AppState {
    /// Wire the workflows around a metadata store and the upload token.
    pub fn new(config: &ServerConfig, store: Arc<dyn MetadataStore>, token: UploadToken) -> Self {
        let registry = FormatRegistry::builtin();
        let fs: Arc<dyn FileSystem + Send + Sync> = Arc::new(StdFileSystem::new());
        Self {
            ingest: IngestService::new(registry.clone(), store.clone(), fs.clone(), token, config),
            retrieval: RetrievalService::new(registry, store, fs.clone(), config.host_dir.clone()),
            site: SiteFiles {
                fs,
                host_dir: config.host_dir.clone(),
                public_dir: config.public_dir.clone(),
            },
        }
    }
}

/// Files served outside the `/v1` API.
#[derive(Clone)]
pub struct SiteFiles {
    fs: Arc<dyn FileSystem + Send + Sync>,
    host_dir: PathBuf,
    public_dir: PathBuf,
}

impl SiteFiles {
    fn static_file(&self, file_name: &str) -> PathBuf {
        self.public_dir.join("static").join(file_name)
    }

    async fn read(&self, path: PathBuf) -> Option<Vec<u8>> {
        let fs = self.fs.clone();
        web::block(move || {
            if !fs.is_file(&path) {
                return None;
            }
            fs.read(&path)
                .map_err(|err| log::error!("reading {} failed: {err}", path.display()))
                .ok()
        })
        .await
        .ok()
        .flatten()
    }
}

/// Query parameters of an upload.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    /// Upload token.
    pub token: Option<String>,
    /// Report format identifier (`tarpaulin` or `cobertura`).
    pub format: Option<String>,
}

/// Register every route except the fallback.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(openapi_json)
        .service(upload_report)
        .service(commit_artifact)
        .service(branch_artifact)
        .service(index)
        .service(upload_script)
        .service(favicon)
        .service(static_asset);
}

/// Request logger that keeps upload tokens out of the logs.
pub fn request_logger() -> Logger {
    Logger::new("%a \"%{url}xi\" %s %b %T").custom_request_replace("url", |req: &ServiceRequest| {
        let target = req
            .uri()
            .path_and_query()
            .map(|value| value.as_str())
            .unwrap_or("/");
        format!("{} {}", req.method(), redact_token(target))
    })
}

/// Blank the value of a `token` query parameter.
pub fn redact_token(target: &str) -> String {
    let Some((path, query)) = target.split_once('?') else {
        return target.to_string();
    };
    let query = query
        .split('&')
        .map(|pair| {
            if pair == "token" || pair.starts_with("token=") {
                "token="
            } else {
                pair
            }
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}

/// Split `name.ext` at the last dot; both parts must be non-empty.
fn split_file(file: &str) -> Option<(&str, &str)> {
    file.rsplit_once('.')
        .filter(|(stem, extension)| !stem.is_empty() && !extension.is_empty())
}

fn declared_length(req: &HttpRequest) -> Option<u64> {
    req.headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn file_not_found() -> HttpResponse {
    HttpResponse::NotFound().body(RetrievalError::FileNotFound.to_string())
}

fn ingest_failure(err: IngestError) -> HttpResponse {
    match &err {
        IngestError::InvalidToken => {
            log::info!("rejected upload: {err}");
            HttpResponse::Unauthorized().body(err.to_string())
        }
        IngestError::UnknownFormat => {
            log::info!("rejected upload: {err}");
            HttpResponse::NotAcceptable().body(err.to_string())
        }
        IngestError::TooLarge => {
            log::info!("rejected upload: {err}");
            HttpResponse::PayloadTooLarge().body(err.to_string())
        }
        IngestError::InvalidPath(_)
        | IngestError::InvalidDocument(_)
        | IngestError::Payload(_) => {
            log::debug!("rejected upload: {err}");
            HttpResponse::BadRequest().body(err.to_string())
        }
        IngestError::NotAcknowledged
        | IngestError::Store(_)
        | IngestError::Storage(_)
        | IngestError::Task(_) => {
            log::error!("upload failed: {err}");
            HttpResponse::InternalServerError().body(UNKNOWN_ERROR)
        }
    }
}

fn artifact_response(result: Result<Artifact, RetrievalError>) -> HttpResponse {
    match result {
        Ok(artifact) => HttpResponse::Ok()
            .content_type(artifact.content_type())
            .body(artifact.contents),
        Err(err @ (RetrievalError::FileNotFound | RetrievalError::BranchNotFound)) => {
            log::debug!("artifact lookup: {err}");
            HttpResponse::NotFound().body(err.to_string())
        }
        Err(err) => {
            log::error!("artifact lookup failed: {err}");
            HttpResponse::InternalServerError().body(UNKNOWN_ERROR)
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/health-check",
    responses(
        (status = 200, description = "Service is up")
    ),
    tag = "system"
)]
#[get("/v1/health-check")]
/// Liveness probe.
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().finish()
}

#[utoipa::path(
    get,
    path = "/v1/openapi.json",
    responses(
        (status = 200, description = "OpenAPI document", body = serde_json::Value)
    ),
    tag = "system"
)]
#[get("/v1/openapi.json")]
/// Serve the OpenAPI document.
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

#[utoipa::path(
    post,
    path = "/v1/{org}/{repo}/{branch}/{file}",
    params(
        ("org" = String, Path, description = "Organization"),
        ("repo" = String, Path, description = "Repository"),
        ("branch" = String, Path, description = "Branch"),
        ("file" = String, Path, description = "Commit with report extension, e.g. `abc123.html`"),
        UploadQuery
    ),
    request_body(content = String, description = "Raw coverage report", content_type = "text/html"),
    responses(
        (status = 200, description = "Report stored"),
        (status = 400, description = "Invalid report document", body = String),
        (status = 401, description = "Invalid token", body = String),
        (status = 406, description = "Invalid reporting format", body = String),
        (status = 413, description = "Uploaded file is too large", body = String),
        (status = 500, description = "Unknown error occurred", body = String)
    ),
    tag = "reports"
)]
#[post("/v1/{org}/{repo}/{branch}/{file}")]
/// Upload a coverage report for a commit.
pub async fn upload_report(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, String, String, String)>,
    query: web::Query<UploadQuery>,
    payload: web::Payload,
) -> impl Responder {
    let (organization, repository, branch, file) = path.into_inner();
    let Some((commit, extension)) = split_file(&file) else {
        return file_not_found();
    };
    let is_report = extension != "svg"
        && state.retrieval.file_for_extension(extension).is_some();
    if !is_report {
        return file_not_found();
    }

    let label = format!("{organization}/{repository}/{branch}/{commit}");
    let query = query.into_inner();
    let request = UploadRequest {
        commit: commit.to_string(),
        organization,
        repository,
        branch,
        format: query.format,
        token: query.token,
    };
    match state
        .ingest
        .ingest(request, declared_length(&req), payload)
        .await
    {
        Ok(coverage) => {
            log::info!("stored report {label} ({coverage:.2}%)");
            HttpResponse::Ok().finish()
        }
        Err(err) => ingest_failure(err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/{org}/{repo}/{branch}/{file}",
    params(
        ("org" = String, Path, description = "Organization"),
        ("repo" = String, Path, description = "Repository"),
        ("branch" = String, Path, description = "Branch"),
        ("file" = String, Path, description = "Commit with `.svg`, `.html` or `.xml` extension")
    ),
    responses(
        (status = 200, description = "Badge or report of the commit"),
        (status = 404, description = "File not found", body = String)
    ),
    tag = "reports"
)]
#[get("/v1/{org}/{repo}/{branch}/{file}")]
/// Fetch the badge or report of an exact commit.
pub async fn commit_artifact(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String, String)>,
) -> impl Responder {
    let (organization, repository, branch, file) = path.into_inner();
    let Some((commit, extension)) = split_file(&file) else {
        return file_not_found();
    };
    artifact_response(
        state
            .retrieval
            .commit_artifact(&organization, &repository, &branch, commit, extension)
            .await,
    )
}

#[utoipa::path(
    get,
    path = "/v1/{org}/{repo}/{file}",
    params(
        ("org" = String, Path, description = "Organization"),
        ("repo" = String, Path, description = "Repository"),
        ("file" = String, Path, description = "Branch with `.svg`, `.html` or `.xml` extension")
    ),
    responses(
        (status = 200, description = "Badge or report of the branch head"),
        (status = 404, description = "Branch not found or File not found", body = String),
        (status = 500, description = "Unknown error occurred", body = String)
    ),
    tag = "reports"
)]
#[get("/v1/{org}/{repo}/{file}")]
/// Fetch the badge or report of the latest commit on a branch.
pub async fn branch_artifact(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String)>,
) -> impl Responder {
    let (organization, repository, file) = path.into_inner();
    let Some((branch, extension)) = split_file(&file) else {
        return file_not_found();
    };
    artifact_response(
        state
            .retrieval
            .branch_artifact(&organization, &repository, branch, extension)
            .await,
    )
}

async fn landing_file(state: &AppState, name: &str, content_type: &str) -> HttpResponse {
    match state.site.read(state.site.host_dir.join(name)).await {
        Some(contents) => HttpResponse::Ok().content_type(content_type).body(contents),
        None => not_found_response(state).await,
    }
}

#[get("/")]
/// Landing page rendered at startup.
pub async fn index(state: web::Data<AppState>) -> impl Responder {
    landing_file(&state, "index.html", "text/html; charset=utf-8").await
}

#[get("/sh")]
/// Upload script rendered at startup.
pub async fn upload_script(state: web::Data<AppState>) -> impl Responder {
    landing_file(&state, "sh", "text/plain; charset=utf-8").await
}

#[get("/favicon.ico")]
/// Site icon.
pub async fn favicon(state: web::Data<AppState>) -> impl Responder {
    serve_static(&state, "favicon.ico").await
}

#[get("/static/{file}")]
/// Static assets from the public directory.
pub async fn static_asset(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let file = path.into_inner();
    if validate_segment(&file).is_err() {
        return not_found_response(&state).await;
    }
    serve_static(&state, &file).await
}

async fn serve_static(state: &AppState, file: &str) -> HttpResponse {
    match state.site.read(state.site.static_file(file)).await {
        Some(contents) => HttpResponse::Ok()
            .content_type(
                mime_guess::from_path(Path::new(file))
                    .first_or_octet_stream()
                    .to_string(),
            )
            .body(contents),
        None => not_found_response(state).await,
    }
}

async fn not_found_response(state: &AppState) -> HttpResponse {
    match state.site.read(state.site.static_file("404.html")).await {
        Some(page) => HttpResponse::NotFound()
            .content_type("text/html; charset=utf-8")
            .body(page),
        None => HttpResponse::NotFound().body(NOT_FOUND_BODY),
    }
}

/// Fallback for unmatched requests.
pub async fn not_found_page(state: web::Data<AppState>) -> HttpResponse {
    not_found_response(&state).await
}
