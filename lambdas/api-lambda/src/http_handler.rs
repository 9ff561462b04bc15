use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use onboarding_shared::{
    error::{FormError, InvitationError},
    key_verification::KeyVerificationForm,
    notices::Notice,
    orchestrator::{PageError, PageOrchestrator, PageView},
    token::{FormToken, FORM_TOKEN_PARAM},
    types::Invitee,
    AppState,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

const SESSION_BUSY_MESSAGE: &str = "Another request for this form is still being processed";

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct KeysRequest {
    first_name: Option<String>,
    company_name: Option<String>,
    slack_email: Option<String>,
    use_default_email: Option<bool>,
    open_router_api_key: Option<String>,
    flux_api_key: Option<String>,
}

impl KeysRequest {
    /// Toggle first so a typed email is only taken when the field is shown.
    fn apply(self, form: &mut KeyVerificationForm) -> Result<(), FormError> {
        if let Some(on) = self.use_default_email {
            form.toggle_default_email(on)?;
        }
        if let Some(first_name) = self.first_name {
            form.set_first_name(first_name)?;
        }
        if let Some(company_name) = self.company_name {
            form.set_company_name(company_name)?;
        }
        if let Some(slack_email) = self.slack_email {
            if form.slack_email_editable() {
                form.set_slack_email(slack_email)?;
            }
        }
        if let Some(key) = self.open_router_api_key {
            form.set_open_router_key(key)?;
        }
        if let Some(key) = self.flux_api_key {
            form.set_flux_key(key)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct InvitationsRequest {
    users: Vec<Invitee>,
}

#[derive(Debug, Serialize)]
struct PageResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<T>,
    page: PageView,
    notices: Vec<Notice>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<PageView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    notices: Vec<Notice>,
}

/// Main Lambda handler - routes onboarding page requests to the session
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("Onboarding Lambda invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET,POST,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.first() != Some(&"session") {
        return not_found();
    }

    let Some(token) = resolve_token(&event) else {
        let page = PageOrchestrator::new(None, state.config.diagnostics).view();
        return json_response(
            StatusCode::BAD_REQUEST,
            &ErrorResponse {
                error: "MissingToken".to_string(),
                message: PageError::MissingToken.to_string(),
                page: Some(page),
                notices: Vec::new(),
            },
        );
    };

    match (method, parts.as_slice()) {
        // GET /session - load (or reuse) the page for this token
        (&Method::GET, ["session"]) => get_page(&state, &token).await,
        // POST /session/keys - edit the key form and run one verification attempt
        (&Method::POST, ["session", "keys"]) => verify_keys(&state, &token, event.body()).await,
        // POST /session/invitations - submit the invitation list
        (&Method::POST, ["session", "invitations"]) => {
            invite_users(&state, &token, event.body()).await
        }
        // GET /session/diagnostics - raw page-load response, when enabled
        (&Method::GET, ["session", "diagnostics"]) => get_diagnostics(&state, &token).await,
        (_, ["session"]) | (_, ["session", "keys" | "invitations" | "diagnostics"]) => {
            method_not_allowed()
        }
        _ => not_found(),
    }
}

/// `formToken` from decoded query parameters, falling back to the raw URI
fn resolve_token(event: &Request) -> Option<FormToken> {
    event
        .query_string_parameters_ref()
        .and_then(|params| params.first(FORM_TOKEN_PARAM))
        .and_then(FormToken::new)
        .or_else(|| FormToken::from_parts(event.uri().query(), None))
}

async fn get_page(state: &AppState, token: &FormToken) -> Result<Response<Body>, Error> {
    let session = state.sessions.session(token);
    let mut session = session.lock().await;

    if let Err(e) = session.load().await {
        return page_error(e, Some(session.view()), session.drain_notices());
    }

    json_response(
        StatusCode::OK,
        &PageResponse::<()> {
            result: None,
            page: session.view(),
            notices: session.drain_notices(),
        },
    )
}

async fn verify_keys(
    state: &AppState,
    token: &FormToken,
    body: &Body,
) -> Result<Response<Body>, Error> {
    let request: KeysRequest = match parse_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let session = state.sessions.session(token);
    // Another request for this form still holds the session
    let Ok(mut session) = session.try_lock() else {
        tracing::warn!("Session busy for token {}", token);
        return json_response(
            StatusCode::CONFLICT,
            &ErrorResponse {
                error: "SessionBusy".to_string(),
                message: SESSION_BUSY_MESSAGE.to_string(),
                page: None,
                notices: Vec::new(),
            },
        );
    };

    match session.verify_keys(|form| request.apply(form)).await {
        Ok(outcome) => json_response(
            StatusCode::OK,
            &PageResponse {
                result: Some(outcome),
                page: session.view(),
                notices: session.drain_notices(),
            },
        ),
        Err(e) => page_error(e, Some(session.view()), session.drain_notices()),
    }
}

async fn invite_users(
    state: &AppState,
    token: &FormToken,
    body: &Body,
) -> Result<Response<Body>, Error> {
    let request: InvitationsRequest = match parse_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let session = state.sessions.session(token);
    let mut session = session.lock().await;

    match session.invite(request.users).await {
        Ok(invited) => {
            let response = json_response(
                StatusCode::OK,
                &PageResponse {
                    result: Some(serde_json::json!({ "invited": invited })),
                    page: session.view(),
                    notices: session.drain_notices(),
                },
            );
            if session.is_finished() {
                state.sessions.remove(token);
            }
            response
        }
        Err(e) => page_error(e, Some(session.view()), session.drain_notices()),
    }
}

async fn get_diagnostics(state: &AppState, token: &FormToken) -> Result<Response<Body>, Error> {
    if !state.sessions.diagnostics_enabled() {
        return json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({"error": "Diagnostics disabled"}),
        );
    }

    let session = state.sessions.session(token);
    let mut session = session.lock().await;
    if let Err(e) = session.load().await {
        return page_error(e, None, session.drain_notices());
    }

    json_response(StatusCode::OK, &session.page().diagnostics())
}

fn parse_body<T: DeserializeOwned>(body: &Body) -> Result<T, Result<Response<Body>, Error>> {
    let body_str = match body {
        Body::Text(text) => text.as_str(),
        Body::Binary(bytes) => std::str::from_utf8(bytes).unwrap_or(""),
        Body::Empty => "",
    };

    serde_json::from_str(body_str).map_err(|e| {
        json_response(
            StatusCode::BAD_REQUEST,
            &ErrorResponse {
                error: "InvalidRequest".to_string(),
                message: format!("Invalid request body: {}", e),
                page: None,
                notices: Vec::new(),
            },
        )
    })
}

fn page_error(
    error: PageError,
    page: Option<PageView>,
    notices: Vec<Notice>,
) -> Result<Response<Body>, Error> {
    let (status, code) = match &error {
        PageError::MissingToken => (StatusCode::BAD_REQUEST, "MissingToken"),
        PageError::NotLoaded => (StatusCode::SERVICE_UNAVAILABLE, "NotLoaded"),
        PageError::KeysAlreadySubmitted => (StatusCode::CONFLICT, "KeysAlreadySubmitted"),
        PageError::Form(FormError::AttemptInFlight) => {
            (StatusCode::CONFLICT, "VerificationInProgress")
        }
        PageError::Form(FormError::AlreadyCompleted) => (StatusCode::CONFLICT, "AlreadyCompleted"),
        PageError::Form(_) => (StatusCode::UNPROCESSABLE_ENTITY, "InvalidForm"),
        PageError::Invitation(InvitationError::SubmissionFailed) => {
            (StatusCode::BAD_GATEWAY, "InvitationFailed")
        }
        PageError::Invitation(InvitationError::AlreadySubmitted) => {
            (StatusCode::CONFLICT, "AlreadyInvited")
        }
        PageError::Invitation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "InvalidInvitations"),
    };

    json_response(
        status,
        &ErrorResponse {
            error: code.to_string(),
            message: error.to_string(),
            page,
            notices,
        },
    )
}

fn json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    body: &T,
) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(body)?.into())
        .map_err(Box::new)?)
}

fn method_not_allowed() -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({"error": "Method not allowed"}),
    )
}

fn not_found() -> Result<Response<Body>, Error> {
    json_response(StatusCode::NOT_FOUND, &serde_json::json!({"error": "Not found"}))
}
