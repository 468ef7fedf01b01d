use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use sage_service::{
	Error, HistoryRequest, HistoryResponse, IngestRequest, IngestResponse, QueryFailure,
	QueryRequest, QueryResponse, RemoveDocumentResponse, SearchRequest, SearchResponse, Stage,
};
use sage_storage::IndexStats;

pub const ROLE_HEADER: &str = "x-sage-role";

#[derive(Debug, Deserialize)]
pub struct AskBody {
	pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
	pub text: String,
	#[serde(default)]
	pub top_k: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	stage: Option<Stage>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	stage: Option<Stage>,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), stage: None }
	}

	fn at_stage(mut self, stage: Stage) -> Self {
		self.stage = Some(stage);

		self
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let status = match &err {
			Error::UnknownRole { .. } => StatusCode::FORBIDDEN,
			Error::InvalidRequest { .. } | Error::InvalidPassage { .. } => StatusCode::BAD_REQUEST,
			Error::EmbeddingUnavailable { .. }
			| Error::IndexUnavailable { .. }
			| Error::GenerationUnavailable { .. }
			| Error::HistoryUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
			Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
			Error::AccessViolation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		};
		let message = match &err {
			// Do not echo which passage leaked.
			Error::AccessViolation { .. } => "Internal error.".to_string(),
			_ => err.to_string(),
		};

		ApiError::new(status, err.code(), message)
	}
}
impl From<QueryFailure> for ApiError {
	fn from(failure: QueryFailure) -> Self {
		let stage = failure.stage;

		ApiError::from(failure.error).at_stage(stage)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, stage: self.stage };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/query/ask", post(ask))
		.route("/v1/query/search", post(search))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/passages", post(ingest))
		.route("/v1/admin/documents/{document_id}", delete(remove_document))
		.route("/v1/admin/stats", get(stats))
		.route("/v1/admin/history", get(history))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn ask(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<AskBody>,
) -> Result<Json<QueryResponse>, ApiError> {
	let role = required_role(&headers)?;
	let response =
		state.service.process_query(QueryRequest { text: payload.text, role }).await?;

	Ok(Json(response))
}

async fn search(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(payload): Json<SearchBody>,
) -> Result<Json<SearchResponse>, ApiError> {
	let role = required_role(&headers)?;
	let response = state
		.service
		.search(SearchRequest { text: payload.text, role, top_k: payload.top_k })
		.await?;

	Ok(Json(response))
}

async fn ingest(
	State(state): State<AppState>,
	Json(payload): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
	let response = state.service.ingest(payload).await?;

	Ok(Json(response))
}

async fn remove_document(
	State(state): State<AppState>,
	Path(document_id): Path<String>,
) -> Result<Json<RemoveDocumentResponse>, ApiError> {
	let response = state.service.remove_document(&document_id).await?;

	Ok(Json(response))
}

async fn stats(State(state): State<AppState>) -> Result<Json<IndexStats>, ApiError> {
	let response = state.service.stats().await?;

	Ok(Json(response))
}

async fn history(
	State(state): State<AppState>,
	Query(params): Query<HistoryRequest>,
) -> Result<Json<HistoryResponse>, ApiError> {
	let response = state.service.history(params).await?;

	Ok(Json(response))
}

fn required_role(headers: &HeaderMap) -> Result<String, ApiError> {
	let value = headers.get(ROLE_HEADER).ok_or_else(|| {
		ApiError::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", "X-Sage-Role header is required.")
	})?;
	let role = value.to_str().map_err(|_| {
		ApiError::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", "X-Sage-Role must be ASCII.")
	})?;

	Ok(role.trim().to_string())
}
