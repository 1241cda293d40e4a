//! HTTP transport for the browser interface.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use promptrun_core::{Artifact, CompletionService, Executor, HistoryStore};
use promptrun_session::{Identity, ManagerError, SessionManager, identity::session_cookie};

use crate::protocol::{
    ErrorResponse, ExecuteRequest, ExecuteResponse, GenerateForm, GenerateResponse,
};

const INDEX_HTML: &str = include_str!("index.html");

/// HTTP handler state.
pub struct HttpState<S, E, C>
where
    S: HistoryStore,
    E: Executor,
    C: CompletionService,
{
    pub manager: Arc<SessionManager<S, E, C>>,
}

impl<S, E, C> Clone for HttpState<S, E, C>
where
    S: HistoryStore,
    E: Executor,
    C: CompletionService,
{
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

/// Request failure rendered as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct HttpError(#[from] ManagerError);

impl HttpError {
    const fn status(&self) -> StatusCode {
        match self.0 {
            ManagerError::Completion(_) => StatusCode::BAD_GATEWAY,
            ManagerError::Storage(_) | ManagerError::Executor(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!(status = status.as_u16(), "Request failed: {self}");
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Create the HTTP router.
///
/// # Example
/// ```ignore
/// let app = create_router(Arc::new(manager))
///     .layer(TraceLayer::new_for_http());
/// ```
#[must_use]
pub fn create_router<S, E, C>(manager: Arc<SessionManager<S, E, C>>) -> Router
where
    S: HistoryStore + 'static,
    E: Executor + 'static,
    C: CompletionService + 'static,
{
    Router::new()
        .route(
            "/",
            get(index_handler::<S, E, C>).post(generate_handler::<S, E, C>),
        )
        .route("/execute", post(execute_handler::<S, E, C>))
        .with_state(HttpState { manager })
}

async fn index_handler<S, E, C>(
    State(state): State<HttpState<S, E, C>>,
    headers: HeaderMap,
) -> Response
where
    S: HistoryStore + 'static,
    E: Executor + 'static,
    C: CompletionService + 'static,
{
    let identity = state.manager.identify(presented_token(&headers));
    let page = Html(INDEX_HTML).into_response();
    if identity.issued {
        with_cookie(page, &identity)
    } else {
        page
    }
}

async fn generate_handler<S, E, C>(
    State(state): State<HttpState<S, E, C>>,
    headers: HeaderMap,
    form: Result<Form<GenerateForm>, FormRejection>,
) -> Response
where
    S: HistoryStore + 'static,
    E: Executor + 'static,
    C: CompletionService + 'static,
{
    let identity = state.manager.identify(presented_token(&headers));

    let response = match form {
        Ok(Form(form)) => match state.manager.generate(&identity.session, &form.prompt).await {
            Ok(generation) => Json(GenerateResponse::from(generation)).into_response(),
            Err(e) => HttpError::from(e).into_response(),
        },
        Err(rejection) => {
            tracing::warn!(session = %identity.session, "Rejected prompt form: {rejection}");
            rejection.into_response()
        }
    };
    with_cookie(response, &identity)
}

async fn execute_handler<S, E, C>(
    State(state): State<HttpState<S, E, C>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, HttpError>
where
    S: HistoryStore + 'static,
    E: Executor + 'static,
    C: CompletionService + 'static,
{
    let result = state
        .manager
        .execute(&Artifact::new(request.code, request.file_type))
        .await?;
    Ok(Json(ExecuteResponse {
        output: result.output,
    }))
}

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(session_cookie)
}

fn with_cookie(mut response: Response, identity: &Identity) -> Response {
    match HeaderValue::from_str(&identity.set_cookie()) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(session = %identity.session, "Unrepresentable cookie: {e}"),
    }
    response
}
