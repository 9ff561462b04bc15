//! Page-level sequencing: token → page load → key step → invitation step.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::Backend;
use crate::error::{FormError, InvitationError};
use crate::invitations::InvitationForm;
use crate::key_verification::{
    ApiKey, KeyStatuses, KeyVerificationForm, KeyVerificationRecord, Phase, VerificationOutcome,
};
use crate::token::FormToken;
use crate::types::PageState;

pub const MISSING_TOKEN_MESSAGE: &str = "No form token provided. Please check the URL.";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("No form token provided. Please check the URL.")]
    MissingToken,

    #[error("Form data is still loading")]
    NotLoaded,

    #[error("API keys have already been submitted")]
    KeysAlreadySubmitted,

    #[error(transparent)]
    Form(#[from] FormError),

    #[error(transparent)]
    Invitation(#[from] InvitationError),
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Keys,
    Invitations,
}

/// Development aid: what the page-load call returned for this view.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub form_token: Option<String>,
    pub data_received: bool,
    pub raw_response: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    MissingToken,
    Loading,
    /// Rendering the empty fallback after a failed fetch; the next load retries.
    Degraded,
    Ready,
}

#[derive(Debug, Clone)]
pub struct PageOrchestrator {
    token: Option<FormToken>,
    load_state: LoadState,
    page: PageState,
    keys: Option<KeyVerificationForm>,
    invitations: Option<InvitationForm>,
    keys_completed: bool,
    focus: Section,
    diagnostics: Option<Diagnostics>,
}

impl PageOrchestrator {
    pub fn new(token: Option<FormToken>, diagnostics_enabled: bool) -> Self {
        let diagnostics = diagnostics_enabled.then(|| Diagnostics {
            form_token: token.as_ref().map(|t| t.as_str().to_string()),
            data_received: false,
            raw_response: None,
            received_at: None,
        });
        let load_state = if token.is_some() {
            LoadState::Loading
        } else {
            tracing::warn!("No form token in URL");
            LoadState::MissingToken
        };

        Self {
            token,
            load_state,
            page: PageState::default(),
            keys: None,
            invitations: None,
            keys_completed: false,
            focus: Section::Keys,
            diagnostics,
        }
    }

    pub fn from_url(url: &str, diagnostics_enabled: bool) -> Self {
        Self::new(FormToken::from_url(url), diagnostics_enabled)
    }

    pub fn token(&self) -> Option<&FormToken> {
        self.token.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.load_state, LoadState::Ready | LoadState::Degraded)
    }

    /// Showing fallback data because the last page load failed.
    pub fn is_degraded(&self) -> bool {
        self.load_state == LoadState::Degraded
    }

    pub fn page_state(&self) -> &PageState {
        &self.page
    }

    pub fn keys_completed(&self) -> bool {
        self.keys_completed
    }

    /// Invitations are dimmed until the key step is done.
    pub fn invitations_prominent(&self) -> bool {
        self.keys_completed
    }

    pub fn focus(&self) -> Section {
        self.focus
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.diagnostics.as_ref()
    }

    pub fn key_form(&self) -> Option<&KeyVerificationForm> {
        self.keys.as_ref().filter(|_| !self.keys_completed)
    }

    pub fn invitations(&self) -> Option<&InvitationForm> {
        self.invitations.as_ref()
    }

    /// Fetch page state. A successful fetch is kept for the life of the
    /// page; after a failed one the empty fallback is shown and the next call
    /// fetches again. Without a token nothing is requested.
    pub async fn load(&mut self, backend: &Backend) -> Result<(), PageError> {
        let token = match (&self.token, self.load_state) {
            (None, _) => return Err(PageError::MissingToken),
            (Some(_), LoadState::Ready) => return Ok(()),
            (Some(token), _) => token.clone(),
        };

        match backend.pageload(token.as_str()).await {
            Some(page) => {
                tracing::info!("Form data received for token {}", token);
                self.apply_page_state(token, page, LoadState::Ready);
            }
            None => {
                tracing::warn!("Showing empty form for token {} until a reload succeeds", token);
                self.apply_page_state(token, PageState::default(), LoadState::Degraded);
            }
        }
        Ok(())
    }

    fn apply_page_state(&mut self, token: FormToken, page: PageState, load_state: LoadState) {
        if load_state == LoadState::Ready {
            if let Some(diagnostics) = self.diagnostics.as_mut() {
                diagnostics.data_received = true;
                diagnostics.raw_response = serde_json::to_string_pretty(&page).ok();
                diagnostics.received_at = Some(Utc::now());
            }
        }

        // Progress made while degraded survives a later successful fetch
        if page.is_submitted() || self.keys_completed {
            self.keys = None;
            self.keys_completed = true;
            self.focus = Section::Invitations;
        } else {
            self.keys = Some(KeyVerificationForm::new(token, &page));
        }
        if !self.invitations.as_ref().is_some_and(InvitationForm::is_submitted) {
            self.invitations = Some(InvitationForm::new(&page));
        }
        self.page = page;
        self.load_state = load_state;
    }

    fn ensure_loaded(&self) -> Result<(), PageError> {
        match self.load_state {
            LoadState::MissingToken => Err(PageError::MissingToken),
            LoadState::Loading => Err(PageError::NotLoaded),
            LoadState::Degraded | LoadState::Ready => Ok(()),
        }
    }

    pub fn key_form_mut(&mut self) -> Result<&mut KeyVerificationForm, PageError> {
        self.ensure_loaded()?;
        if self.keys_completed {
            return Err(PageError::KeysAlreadySubmitted);
        }
        self.keys.as_mut().ok_or(PageError::KeysAlreadySubmitted)
    }

    pub fn invitations_mut(&mut self) -> Result<&mut InvitationForm, PageError> {
        self.ensure_loaded()?;
        self.invitations.as_mut().ok_or(PageError::NotLoaded)
    }

    /// Run one verification attempt and move focus to invitations when it
    /// completes.
    pub async fn submit_keys(&mut self, backend: &Backend) -> Result<VerificationOutcome, PageError> {
        let outcome = self.key_form_mut()?.submit(backend).await?;
        if outcome.is_completed() {
            self.keys_completed = true;
            self.focus = Section::Invitations;
        }
        Ok(outcome)
    }

    pub async fn submit_invitations(&mut self, backend: &Backend) -> Result<usize, PageError> {
        let token = self.token.clone().ok_or(PageError::MissingToken)?;
        let invited = self.invitations_mut()?.submit(backend, &token).await?;
        Ok(invited)
    }

    pub fn view(&self) -> PageView {
        match self.load_state {
            LoadState::MissingToken => PageView::MissingToken {
                message: MISSING_TOKEN_MESSAGE.to_string(),
            },
            LoadState::Loading => PageView::Loading {
                message: format!(
                    "Loading form data... (Token: {})",
                    self.token.as_ref().map(FormToken::as_str).unwrap_or("")
                ),
            },
            LoadState::Degraded | LoadState::Ready => PageView::Ready(Box::new(ReadyView {
                greeting: self.page.name.as_ref().map(|name| format!("Hello, {}", name)),
                key_form: self.key_form().map(KeyFormView::from),
                invitations: self.invitations.as_ref().map(|form| InvitationsView {
                    can_add: form.can_add(),
                    form: form.clone(),
                    prominent: self.invitations_prominent(),
                }),
                focus: self.focus,
            })),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum PageView {
    MissingToken { message: String },
    Loading { message: String },
    Ready(Box<ReadyView>),
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReadyView {
    pub greeting: Option<String>,
    pub key_form: Option<KeyFormView>,
    pub invitations: Option<InvitationsView>,
    pub focus: Section,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct KeyFormView {
    pub record: KeyVerificationRecord,
    pub statuses: KeyStatuses,
    pub phase: Phase,
    pub button_label: &'static str,
    pub default_email_label: String,
    pub slack_email_editable: bool,
    pub open_router_error: Option<&'static str>,
    pub flux_error: Option<&'static str>,
    pub error_summary: Vec<&'static str>,
}

impl From<&KeyVerificationForm> for KeyFormView {
    fn from(form: &KeyVerificationForm) -> Self {
        Self {
            record: form.record().clone(),
            statuses: form.statuses(),
            phase: form.phase(),
            button_label: form.button_label(),
            default_email_label: form.default_email_label(),
            slack_email_editable: form.slack_email_editable(),
            open_router_error: form.field_error(ApiKey::OpenRouter),
            flux_error: form.field_error(ApiKey::Flux),
            error_summary: form.error_summary(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InvitationsView {
    #[serde(flatten)]
    pub form: InvitationForm,
    pub can_add: bool,
    pub prominent: bool,
}
