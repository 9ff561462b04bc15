use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::Backend;
use crate::config::DEFAULT_SESSION_IDLE_MINUTES;
use crate::error::FormError;
use crate::key_verification::{KeyVerificationForm, VerificationOutcome};
use crate::notices::{Notice, NoticeLog};
use crate::orchestrator::{PageError, PageOrchestrator, PageView};
use crate::token::FormToken;
use crate::types::Invitee;
use crate::webhook::Webhook;

/// Everything one browser visit owns: the page state machine and the notices
/// it has produced but not yet shown.
pub struct Session {
    page: PageOrchestrator,
    notices: Arc<NoticeLog>,
    backend: Backend,
}

impl Session {
    pub fn new(token: FormToken, webhook: Arc<dyn Webhook>, diagnostics: bool) -> Self {
        let notices = Arc::new(NoticeLog::new());
        Self {
            page: PageOrchestrator::new(Some(token), diagnostics),
            backend: Backend::new(webhook, notices.clone()),
            notices,
        }
    }

    pub fn page(&self) -> &PageOrchestrator {
        &self.page
    }

    pub fn view(&self) -> PageView {
        self.page.view()
    }

    pub fn drain_notices(&self) -> Vec<Notice> {
        self.notices.drain()
    }

    pub async fn load(&mut self) -> Result<(), PageError> {
        self.page.load(&self.backend).await
    }

    /// Invitations went out; nothing is left to do on this page.
    pub fn is_finished(&self) -> bool {
        self.page
            .invitations()
            .is_some_and(|invitations| invitations.is_submitted())
    }

    /// Apply field edits to the key form, then run one verification attempt.
    pub async fn verify_keys(
        &mut self,
        edit: impl FnOnce(&mut KeyVerificationForm) -> Result<(), FormError>,
    ) -> Result<VerificationOutcome, PageError> {
        self.load().await?;
        edit(self.page.key_form_mut()?)?;
        self.page.submit_keys(&self.backend).await
    }

    /// Replace the invitation list and submit it.
    pub async fn invite(&mut self, users: Vec<Invitee>) -> Result<usize, PageError> {
        self.load().await?;
        self.page.invitations_mut()?.replace_entries(users)?;
        self.page.submit_invitations(&self.backend).await
    }
}

/// Live sessions keyed by form token. Held in process memory only; entries
/// idle for longer than the timeout are pruned whenever a session is looked up.
pub struct SessionRegistry {
    webhook: Arc<dyn Webhook>,
    diagnostics: bool,
    idle_timeout: Duration,
    sessions: Mutex<HashMap<FormToken, SessionEntry>>,
}

struct SessionEntry {
    session: Arc<tokio::sync::Mutex<Session>>,
    last_used: DateTime<Utc>,
}

impl SessionEntry {
    /// Only the registry holds it, so no request is using it.
    fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        Arc::strong_count(&self.session) == 1 && now - self.last_used >= timeout
    }
}

impl SessionRegistry {
    pub fn new(webhook: Arc<dyn Webhook>, diagnostics: bool) -> Self {
        Self {
            webhook,
            diagnostics,
            idle_timeout: Duration::minutes(DEFAULT_SESSION_IDLE_MINUTES),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<FormToken, SessionEntry>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn session(&self, token: &FormToken) -> Arc<tokio::sync::Mutex<Session>> {
        let now = Utc::now();
        let mut sessions = self.entries();

        let before = sessions.len();
        sessions.retain(|existing, entry| existing == token || !entry.is_idle(now, self.idle_timeout));
        if sessions.len() < before {
            tracing::info!("Pruned {} idle onboarding session(s)", before - sessions.len());
        }

        let entry = sessions.entry(token.clone()).or_insert_with(|| {
            tracing::info!("New onboarding session for token {}", token);
            SessionEntry {
                session: Arc::new(tokio::sync::Mutex::new(Session::new(
                    token.clone(),
                    self.webhook.clone(),
                    self.diagnostics,
                ))),
                last_used: now,
            }
        });
        entry.last_used = now;
        entry.session.clone()
    }

    /// Forget a session whose workflow has finished. The next visit starts
    /// over from a fresh page load.
    pub fn remove(&self, token: &FormToken) -> bool {
        let removed = self.entries().remove(token).is_some();
        if removed {
            tracing::info!("Closed onboarding session for token {}", token);
        }
        removed
    }

    pub fn contains(&self, token: &FormToken) -> bool {
        self.entries().contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
