//! Recording webhook double shared by the unit tests.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::WebhookError;
use crate::types::{
    KeyCheck, KeyVerifyRequest, KeyVerifyResponse, PageLoadRequest, PageState,
    SubmitAnswersRequest, SubmitUsersRequest,
};
use crate::webhook::{Webhook, KEY_VERIFY, PAGELOAD, SUBMIT_ANSWERS, SUBMIT_USERS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookCall {
    PageLoad(String),
    KeyVerify(KeyVerifyRequest),
    SubmitAnswers(SubmitAnswersRequest),
    SubmitUsers(SubmitUsersRequest),
}

pub struct FakeWebhook {
    online: bool,
    page: PageState,
    verdicts: Mutex<Vec<KeyVerifyResponse>>,
    pageload_failures: Mutex<usize>,
    reject_users: bool,
    calls: Mutex<Vec<WebhookCall>>,
}

impl Default for FakeWebhook {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWebhook {
    /// Reachable backend with an empty page and both keys passing.
    pub fn new() -> Self {
        Self {
            online: true,
            page: PageState::default(),
            verdicts: Mutex::new(Vec::new()),
            pageload_failures: Mutex::new(0),
            reject_users: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails at the transport level.
    pub fn offline() -> Self {
        Self {
            online: false,
            ..Self::new()
        }
    }

    pub fn with_page(mut self, page: PageState) -> Self {
        self.page = page;
        self
    }

    /// Queue verification results, consumed in order. Once exhausted both
    /// keys pass.
    pub fn with_verdicts(self, verdicts: &[(KeyCheck, KeyCheck)]) -> Self {
        *self.verdicts.lock().unwrap() = verdicts
            .iter()
            .rev()
            .map(|&(open_router_pass, flux_pass)| KeyVerifyResponse {
                open_router_pass,
                flux_pass,
            })
            .collect();
        self
    }

    /// The first `count` page loads fail; later ones return the page.
    pub fn failing_pageloads(self, count: usize) -> Self {
        *self.pageload_failures.lock().unwrap() = count;
        self
    }

    pub fn rejecting_users(mut self) -> Self {
        self.reject_users = true;
        self
    }

    pub fn calls(&self) -> Vec<WebhookCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn answer_submissions(&self) -> Vec<SubmitAnswersRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                WebhookCall::SubmitAnswers(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: WebhookCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn reachable(&self, operation: &'static str) -> Result<(), WebhookError> {
        if self.online {
            Ok(())
        } else {
            Err(WebhookError::Status {
                operation,
                status: 503,
            })
        }
    }
}

#[async_trait]
impl Webhook for FakeWebhook {
    async fn pageload(&self, request: PageLoadRequest) -> Result<PageState, WebhookError> {
        self.record(WebhookCall::PageLoad(request.form_token));
        self.reachable(PAGELOAD)?;
        {
            let mut failures = self.pageload_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(WebhookError::Status {
                    operation: PAGELOAD,
                    status: 502,
                });
            }
        }
        Ok(self.page.clone())
    }

    async fn keyverify(
        &self,
        request: KeyVerifyRequest,
    ) -> Result<KeyVerifyResponse, WebhookError> {
        self.record(WebhookCall::KeyVerify(request));
        self.reachable(KEY_VERIFY)?;
        Ok(self.verdicts.lock().unwrap().pop().unwrap_or(KeyVerifyResponse {
            open_router_pass: KeyCheck::Pass,
            flux_pass: KeyCheck::Pass,
        }))
    }

    async fn submitanswers(&self, request: SubmitAnswersRequest) -> Result<(), WebhookError> {
        self.record(WebhookCall::SubmitAnswers(request));
        self.reachable(SUBMIT_ANSWERS)
    }

    async fn submitusers(&self, request: SubmitUsersRequest) -> Result<(), WebhookError> {
        self.record(WebhookCall::SubmitUsers(request));
        self.reachable(SUBMIT_USERS)?;
        if self.reject_users {
            return Err(WebhookError::Status {
                operation: SUBMIT_USERS,
                status: 422,
            });
        }
        Ok(())
    }
}
