//! Identity + API key step of the onboarding page.
//!
//! `Editing → Verifying → Submitting → Completed`, falling back to `Editing`
//! whenever either key is rejected. An attempt always verifies first and then
//! records the answers once, with `apikeyspassed` fixed by the verification
//! result. Completion is reported only when both keys pass.

use serde::Serialize;

use crate::backend::Backend;
use crate::error::FormError;
use crate::token::FormToken;
use crate::types::{
    is_plausible_email, Answers, KeyCheck, KeyVerifyRequest, KeyVerifyResponse, PageState,
    SubmitAnswersRequest,
};

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Unchecked,
    Pass,
    Fail,
}

impl From<KeyCheck> for KeyStatus {
    fn from(check: KeyCheck) -> Self {
        match check {
            KeyCheck::Pass => KeyStatus::Pass,
            KeyCheck::Fail => KeyStatus::Fail,
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ApiKey {
    OpenRouter,
    Flux,
}

impl ApiKey {
    pub fn label(self) -> &'static str {
        match self {
            ApiKey::OpenRouter => "OpenRouter API Key",
            ApiKey::Flux => "Black Forest Labs API Key",
        }
    }

    /// Message shown under the rejected field.
    pub fn inline_error(self) -> &'static str {
        match self {
            ApiKey::OpenRouter => "Invalid OpenRouter API key",
            ApiKey::Flux => "Invalid Black Forest Labs API key",
        }
    }

    /// Entry in the "please correct the following issues" list.
    pub fn summary_error(self) -> &'static str {
        match self {
            ApiKey::OpenRouter => "OpenRouter API key is invalid",
            ApiKey::Flux => "Black Forest Labs API key is invalid",
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatuses {
    pub open_router: KeyStatus,
    pub flux: KeyStatus,
}

impl KeyStatuses {
    pub fn unchecked() -> Self {
        Self {
            open_router: KeyStatus::Unchecked,
            flux: KeyStatus::Unchecked,
        }
    }

    pub fn get(&self, key: ApiKey) -> KeyStatus {
        match key {
            ApiKey::OpenRouter => self.open_router,
            ApiKey::Flux => self.flux,
        }
    }

    pub fn failed(&self) -> Vec<ApiKey> {
        [ApiKey::OpenRouter, ApiKey::Flux]
            .into_iter()
            .filter(|&key| self.get(key) == KeyStatus::Fail)
            .collect()
    }
}

impl From<KeyVerifyResponse> for KeyStatuses {
    fn from(response: KeyVerifyResponse) -> Self {
        Self {
            open_router: response.open_router_pass.into(),
            flux: response.flux_pass.into(),
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Editing,
    Verifying,
    Submitting,
    Completed,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyVerificationRecord {
    pub first_name: String,
    pub company_name: String,
    pub slack_email: String,
    pub use_account_email: bool,
    pub open_router_key: String,
    pub flux_key: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum VerificationOutcome {
    Completed,
    Rejected { failed: Vec<ApiKey> },
}

impl VerificationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, VerificationOutcome::Completed)
    }
}

#[derive(Debug, Clone)]
pub struct KeyVerificationForm {
    form_token: FormToken,
    default_email: Option<String>,
    record: KeyVerificationRecord,
    typed_email: Option<String>, // last typed value, kept while the default is in use
    statuses: KeyStatuses,
    phase: Phase,
}

impl KeyVerificationForm {
    /// Pre-fill from page state: name, and the payment email as the default
    /// Slack address with the toggle on.
    pub fn new(form_token: FormToken, page: &PageState) -> Self {
        let default_email = page.default_email().map(str::to_string);

        Self {
            form_token,
            record: KeyVerificationRecord {
                first_name: page.name.clone().unwrap_or_default(),
                slack_email: default_email.clone().unwrap_or_default(),
                use_account_email: default_email.is_some(),
                ..Default::default()
            },
            default_email,
            typed_email: None,
            statuses: KeyStatuses::unchecked(),
            phase: Phase::Editing,
        }
    }

    pub fn record(&self) -> &KeyVerificationRecord {
        &self.record
    }

    pub fn statuses(&self) -> KeyStatuses {
        self.statuses
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn default_email(&self) -> Option<&str> {
        self.default_email.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.phase == Phase::Completed
    }

    /// The submit button is disabled while an attempt is pending.
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Verifying | Phase::Submitting)
    }

    /// The typed email field is only shown, and required, with the toggle off.
    pub fn slack_email_editable(&self) -> bool {
        !self.record.use_account_email
    }

    pub fn default_email_label(&self) -> String {
        match &self.default_email {
            Some(email) => format!("\"{}\" is fine", email),
            None => "No payment email available".to_string(),
        }
    }

    pub fn button_label(&self) -> &'static str {
        match self.phase {
            Phase::Verifying => "Verifying...",
            Phase::Submitting => "Submitting...",
            Phase::Editing | Phase::Completed => "Verify & Submit",
        }
    }

    pub fn field_error(&self, key: ApiKey) -> Option<&'static str> {
        (self.statuses.get(key) == KeyStatus::Fail).then(|| key.inline_error())
    }

    /// Consolidated list of rejected keys; empty unless an attempt failed.
    pub fn error_summary(&self) -> Vec<&'static str> {
        self.statuses
            .failed()
            .into_iter()
            .map(ApiKey::summary_error)
            .collect()
    }

    fn ensure_editable(&self) -> Result<(), FormError> {
        match self.phase {
            Phase::Editing => Ok(()),
            Phase::Verifying | Phase::Submitting => Err(FormError::AttemptInFlight),
            Phase::Completed => Err(FormError::AlreadyCompleted),
        }
    }

    pub fn set_first_name(&mut self, value: impl Into<String>) -> Result<(), FormError> {
        self.ensure_editable()?;
        self.record.first_name = value.into();
        Ok(())
    }

    pub fn set_company_name(&mut self, value: impl Into<String>) -> Result<(), FormError> {
        self.ensure_editable()?;
        self.record.company_name = value.into();
        Ok(())
    }

    pub fn set_slack_email(&mut self, value: impl Into<String>) -> Result<(), FormError> {
        self.ensure_editable()?;
        if self.record.use_account_email {
            return Err(FormError::EmailLocked);
        }
        self.record.slack_email = value.into();
        Ok(())
    }

    pub fn set_open_router_key(&mut self, value: impl Into<String>) -> Result<(), FormError> {
        self.ensure_editable()?;
        self.record.open_router_key = value.into();
        Ok(())
    }

    pub fn set_flux_key(&mut self, value: impl Into<String>) -> Result<(), FormError> {
        self.ensure_editable()?;
        self.record.flux_key = value.into();
        Ok(())
    }

    /// Switch between the default (payment) email and a typed one.
    pub fn toggle_default_email(&mut self, on: bool) -> Result<(), FormError> {
        self.ensure_editable()?;
        if on == self.record.use_account_email {
            return Ok(());
        }

        if on {
            let default = self.default_email.clone().ok_or(FormError::NoDefaultEmail)?;
            self.typed_email = Some(std::mem::replace(&mut self.record.slack_email, default));
            self.record.use_account_email = true;
        } else {
            self.record.use_account_email = false;
            if let Some(typed) = self.typed_email.take() {
                self.record.slack_email = typed;
            }
        }

        Ok(())
    }

    /// Required-field and email-shape checks done by the input widgets.
    pub fn validate(&self) -> Result<(), FormError> {
        let record = &self.record;
        let required = [
            ("Your Name", &record.first_name),
            ("Company Name", &record.company_name),
            ("Email to invite into Slack", &record.slack_email),
            (ApiKey::OpenRouter.label(), &record.open_router_key),
            (ApiKey::Flux.label(), &record.flux_key),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(FormError::MissingField(field));
            }
        }

        if self.slack_email_editable() && !is_plausible_email(&record.slack_email) {
            return Err(FormError::InvalidEmail);
        }

        Ok(())
    }

    /// Start an attempt: both statuses go back to `Unchecked` before the
    /// verification request is handed out.
    pub fn begin_verification(&mut self) -> Result<KeyVerifyRequest, FormError> {
        self.ensure_editable()?;
        self.validate()?;

        self.statuses = KeyStatuses::unchecked();
        self.phase = Phase::Verifying;

        Ok(KeyVerifyRequest {
            open_router_api_key: self.record.open_router_key.clone(),
            flux_api_key: self.record.flux_key.clone(),
        })
    }

    /// Apply the verification response to both keys at once and build the
    /// answers to record, flagged with whether both keys passed.
    pub fn finish_verification(&mut self, response: KeyVerifyResponse) -> SubmitAnswersRequest {
        self.statuses = response.into();
        self.phase = Phase::Submitting;

        SubmitAnswersRequest {
            answers: Answers {
                company_name: self.record.company_name.clone(),
                first_name: self.record.first_name.clone(),
                open_router_api_key: self.record.open_router_key.clone(),
                flux_api_key: self.record.flux_key.clone(),
                apikeyspassed: response.all_passed(),
                slack_email_is_fine: self.record.use_account_email,
                form_token: self.form_token.as_str().to_string(),
                preferred_email_address_slack: self.record.slack_email.clone(),
            },
        }
    }

    /// Close the attempt once the answers have been sent.
    pub fn finish_submission(&mut self) -> VerificationOutcome {
        let failed = self.statuses.failed();
        if failed.is_empty() {
            self.phase = Phase::Completed;
            VerificationOutcome::Completed
        } else {
            self.phase = Phase::Editing;
            VerificationOutcome::Rejected { failed }
        }
    }

    /// One full attempt: verify, record the answers, report the outcome.
    pub async fn submit(&mut self, backend: &Backend) -> Result<VerificationOutcome, FormError> {
        let request = self.begin_verification()?;

        let response = backend.keyverify(request).await;
        let answers = self.finish_verification(response);
        backend.submitanswers(answers).await;

        let outcome = self.finish_submission();
        match &outcome {
            VerificationOutcome::Completed => {
                tracing::info!("API keys verified for token {}", self.form_token)
            }
            VerificationOutcome::Rejected { failed } => {
                tracing::info!("API keys rejected for token {}: {:?}", self.form_token, failed)
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notices::NoticeLog;
    use crate::testing::{FakeWebhook, WebhookCall};
    use std::sync::Arc;

    fn token() -> FormToken {
        FormToken::new("tok123").unwrap()
    }

    fn dana_page() -> PageState {
        PageState {
            name: Some("Dana".to_string()),
            available_users: Some(5),
            active_users: Some(2),
            payment_email: Some("dana@co.com".to_string()),
            ..Default::default()
        }
    }

    fn filled_form() -> KeyVerificationForm {
        let mut form = KeyVerificationForm::new(token(), &dana_page());
        form.set_company_name("Acme").unwrap();
        form.set_open_router_key("sk-or-123").unwrap();
        form.set_flux_key("bfl-456").unwrap();
        form
    }

    fn backend_for(fake: &Arc<FakeWebhook>) -> Backend {
        Backend::new(fake.clone(), Arc::new(NoticeLog::new()))
    }

    #[test]
    fn test_prefill_from_page_state() {
        let form = KeyVerificationForm::new(token(), &dana_page());

        assert_eq!(form.record().first_name, "Dana");
        assert_eq!(form.record().slack_email, "dana@co.com");
        assert!(form.record().use_account_email);
        assert!(!form.slack_email_editable());
        assert_eq!(form.default_email_label(), "\"dana@co.com\" is fine");
        assert_eq!(form.statuses(), KeyStatuses::unchecked());
        assert_eq!(form.phase(), Phase::Editing);
    }

    #[test]
    fn test_no_default_email() {
        let mut form = KeyVerificationForm::new(token(), &PageState::default());

        assert!(!form.record().use_account_email);
        assert_eq!(form.default_email_label(), "No payment email available");
        assert_eq!(form.toggle_default_email(true), Err(FormError::NoDefaultEmail));
        assert!(form.slack_email_editable());
    }

    #[test]
    fn test_toggle_restores_last_typed_email() {
        let mut form = KeyVerificationForm::new(token(), &dana_page());

        form.toggle_default_email(false).unwrap();
        assert!(form.slack_email_editable());
        // nothing typed yet, the field keeps its current value
        assert_eq!(form.record().slack_email, "dana@co.com");

        form.set_slack_email("dana@slack.dev").unwrap();
        form.toggle_default_email(true).unwrap();
        assert_eq!(form.record().slack_email, "dana@co.com");
        assert_eq!(form.set_slack_email("x@y.z"), Err(FormError::EmailLocked));

        form.toggle_default_email(false).unwrap();
        assert_eq!(form.record().slack_email, "dana@slack.dev");
    }

    #[test]
    fn test_validation_blocks_attempt() {
        let mut form = KeyVerificationForm::new(token(), &dana_page());
        assert_eq!(
            form.begin_verification(),
            Err(FormError::MissingField("Company Name"))
        );
        assert_eq!(form.phase(), Phase::Editing);

        let mut form = filled_form();
        form.toggle_default_email(false).unwrap();
        form.set_slack_email("not-an-email").unwrap();
        assert_eq!(form.begin_verification(), Err(FormError::InvalidEmail));

        form.set_slack_email("   ").unwrap();
        assert_eq!(
            form.begin_verification(),
            Err(FormError::MissingField("Email to invite into Slack"))
        );
    }

    #[test]
    fn test_statuses_reset_before_verification() {
        let mut form = filled_form();
        form.finish_verification(KeyVerifyResponse {
            open_router_pass: KeyCheck::Fail,
            flux_pass: KeyCheck::Pass,
        });
        form.finish_submission();
        assert_eq!(form.statuses().open_router, KeyStatus::Fail);

        let request = form.begin_verification().unwrap();
        assert_eq!(form.statuses(), KeyStatuses::unchecked());
        assert_eq!(form.phase(), Phase::Verifying);
        assert_eq!(form.button_label(), "Verifying...");
        assert_eq!(request.open_router_api_key, "sk-or-123");
        assert_eq!(request.flux_api_key, "bfl-456");

        // a second attempt while one is pending is refused
        assert_eq!(form.begin_verification(), Err(FormError::AttemptInFlight));
        assert_eq!(form.set_flux_key("other"), Err(FormError::AttemptInFlight));
    }

    #[tokio::test]
    async fn test_open_router_failure_keeps_user_on_step() {
        let fake = Arc::new(
            FakeWebhook::new().with_verdicts(&[(KeyCheck::Fail, KeyCheck::Pass)]),
        );
        let backend = backend_for(&fake);
        let mut form = filled_form();

        let outcome = form.submit(&backend).await.unwrap();

        assert_eq!(
            outcome,
            VerificationOutcome::Rejected {
                failed: vec![ApiKey::OpenRouter]
            }
        );
        assert_eq!(form.phase(), Phase::Editing);
        assert_eq!(form.field_error(ApiKey::OpenRouter), Some("Invalid OpenRouter API key"));
        assert_eq!(form.field_error(ApiKey::Flux), None);
        assert_eq!(form.error_summary(), vec!["OpenRouter API key is invalid"]);

        let submissions = fake.answer_submissions();
        assert_eq!(submissions.len(), 1);
        assert!(!submissions[0].answers.apikeyspassed);
    }

    #[tokio::test]
    async fn test_full_pass_verifies_then_submits_then_completes() {
        let fake = Arc::new(FakeWebhook::new());
        let backend = backend_for(&fake);
        let mut form = filled_form();

        let outcome = form.submit(&backend).await.unwrap();

        assert!(outcome.is_completed());
        assert!(form.is_completed());
        assert_eq!(form.statuses().open_router, KeyStatus::Pass);
        assert_eq!(form.statuses().flux, KeyStatus::Pass);
        assert!(form.error_summary().is_empty());

        let calls = fake.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], WebhookCall::KeyVerify(_)));
        match &calls[1] {
            WebhookCall::SubmitAnswers(request) => {
                let answers = &request.answers;
                assert!(answers.apikeyspassed);
                assert!(answers.slack_email_is_fine);
                assert_eq!(answers.form_token, "tok123");
                assert_eq!(answers.first_name, "Dana");
                assert_eq!(answers.company_name, "Acme");
                assert_eq!(answers.preferred_email_address_slack, "dana@co.com");
            }
            other => panic!("unexpected call {:?}", other),
        }

        assert_eq!(form.submit(&backend).await, Err(FormError::AlreadyCompleted));
        assert_eq!(fake.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unlimited_resubmission_after_failure() {
        let fake = Arc::new(FakeWebhook::new().with_verdicts(&[
            (KeyCheck::Fail, KeyCheck::Fail),
            (KeyCheck::Pass, KeyCheck::Fail),
        ]));
        let backend = backend_for(&fake);
        let mut form = filled_form();

        let first = form.submit(&backend).await.unwrap();
        assert_eq!(
            first,
            VerificationOutcome::Rejected {
                failed: vec![ApiKey::OpenRouter, ApiKey::Flux]
            }
        );
        assert_eq!(form.error_summary().len(), 2);

        form.set_flux_key("bfl-fixed").unwrap();
        let second = form.submit(&backend).await.unwrap();
        assert_eq!(
            second,
            VerificationOutcome::Rejected {
                failed: vec![ApiKey::Flux]
            }
        );

        let third = form.submit(&backend).await.unwrap();
        assert!(third.is_completed());

        let flags: Vec<bool> = fake
            .answer_submissions()
            .iter()
            .map(|request| request.answers.apikeyspassed)
            .collect();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_unreachable_backend_counts_as_both_failed() {
        let fake = Arc::new(FakeWebhook::offline());
        let backend = backend_for(&fake);
        let mut form = filled_form();

        let outcome = form.submit(&backend).await.unwrap();

        assert!(!outcome.is_completed());
        assert_eq!(form.statuses().open_router, KeyStatus::Fail);
        assert_eq!(form.statuses().flux, KeyStatus::Fail);
        assert_eq!(fake.answer_submissions().len(), 1);
    }
}
