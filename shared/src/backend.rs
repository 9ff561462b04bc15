use std::sync::Arc;

use crate::notices::{Notice, Notifier};
use crate::types::{
    Ack, Invitee, KeyVerifyRequest, KeyVerifyResponse, PageLoadRequest, PageState,
    SubmitAnswersRequest, SubmitUsersRequest,
};
use crate::webhook::Webhook;

pub const PAGELOAD_FAILED: &str = "Failed to load form data. Please refresh and try again.";
pub const KEY_VERIFY_FAILED: &str = "Failed to verify API keys. Please try again.";
pub const SUBMIT_ANSWERS_FAILED: &str = "Failed to submit form. Please try again.";
pub const SUBMIT_ANSWERS_OK: &str = "Form submitted successfully!";
pub const SUBMIT_USERS_FAILED: &str = "Failed to invite users. Please try again.";
pub const SUBMIT_USERS_OK: &str = "Users invited successfully!";

/// Webhook access as the workflows see it: every call is attempted once and
/// any failure becomes the operation's fallback value plus an error notice.
#[derive(Clone)]
pub struct Backend {
    webhook: Arc<dyn Webhook>,
    notifier: Arc<dyn Notifier>,
}

impl Backend {
    pub fn new(webhook: Arc<dyn Webhook>, notifier: Arc<dyn Notifier>) -> Self {
        Self { webhook, notifier }
    }

    /// `None` means the fetch failed and the notice has been raised; callers
    /// render [`PageState::default`] and fetch again on the next view.
    pub async fn pageload(&self, form_token: &str) -> Option<PageState> {
        tracing::info!("Fetching form data with token: {}", form_token);
        let request = PageLoadRequest {
            form_token: form_token.to_string(),
        };

        match self.webhook.pageload(request).await {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::error!("Error fetching form data: {}", e);
                self.notifier.notify(Notice::error(PAGELOAD_FAILED));
                None
            }
        }
    }

    pub async fn keyverify(&self, request: KeyVerifyRequest) -> KeyVerifyResponse {
        match self.webhook.keyverify(request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Error verifying API keys: {}", e);
                self.notifier.notify(Notice::error(KEY_VERIFY_FAILED));
                KeyVerifyResponse::both_failed()
            }
        }
    }

    pub async fn submitanswers(&self, request: SubmitAnswersRequest) -> Ack {
        let keys_passed = request.answers.apikeyspassed;

        match self.webhook.submitanswers(request).await {
            Ok(()) => {
                if keys_passed {
                    self.notifier.notify(Notice::success(SUBMIT_ANSWERS_OK));
                }
                Ack::Delivered
            }
            Err(e) => {
                tracing::error!("Error submitting form: {}", e);
                self.notifier.notify(Notice::error(SUBMIT_ANSWERS_FAILED));
                Ack::Failed
            }
        }
    }

    pub async fn submitusers(&self, form_token: &str, users: Vec<Invitee>) -> Ack {
        let request = SubmitUsersRequest {
            form_token: form_token.to_string(),
            users,
        };

        match self.webhook.submitusers(request).await {
            Ok(()) => {
                self.notifier.notify(Notice::success(SUBMIT_USERS_OK));
                Ack::Delivered
            }
            Err(e) => {
                tracing::error!("Error inviting users: {}", e);
                self.notifier.notify(Notice::error(SUBMIT_USERS_FAILED));
                Ack::Failed
            }
        }
    }
}
