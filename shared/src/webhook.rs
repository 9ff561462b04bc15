use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::WebhookError;
use crate::types::{
    KeyVerifyRequest, KeyVerifyResponse, PageLoadRequest, PageState, SubmitAnswersRequest,
    SubmitUsersRequest,
};

pub const PAGELOAD: &str = "pageload";
pub const KEY_VERIFY: &str = "keyveriffy"; // path spelling is owned by the backend
pub const SUBMIT_ANSWERS: &str = "submitanswers";
pub const SUBMIT_USERS: &str = "submitusers";

/// The four operations exposed by the onboarding backend. One method per
/// operation so workflows never see transport details and tests can swap in
/// a fake.
#[async_trait]
pub trait Webhook: Send + Sync {
    async fn pageload(&self, request: PageLoadRequest) -> Result<PageState, WebhookError>;
    async fn keyverify(&self, request: KeyVerifyRequest)
        -> Result<KeyVerifyResponse, WebhookError>;
    async fn submitanswers(&self, request: SubmitAnswersRequest) -> Result<(), WebhookError>;
    async fn submitusers(&self, request: SubmitUsersRequest) -> Result<(), WebhookError>;
}

/// JSON-over-POST implementation against `{base_url}/{operation}`.
#[derive(Debug, Clone)]
pub struct HttpWebhook {
    client: Client,
    base_url: String,
}

impl HttpWebhook {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + Sync>(
        &self,
        operation: &'static str,
        body: &B,
    ) -> Result<reqwest::Response, WebhookError> {
        let url = format!("{}/{}", self.base_url, operation);
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|source| WebhookError::Transport { operation, source })?;

        let status = response.status();
        tracing::debug!("{} responded with {}", operation, status);
        if !status.is_success() {
            return Err(WebhookError::Status {
                operation,
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    async fn post_json<B, T>(&self, operation: &'static str, body: &B) -> Result<T, WebhookError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self.post(operation, body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| WebhookError::Transport { operation, source })?;

        serde_json::from_slice(&bytes).map_err(|e| WebhookError::Decode {
            operation,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Webhook for HttpWebhook {
    async fn pageload(&self, request: PageLoadRequest) -> Result<PageState, WebhookError> {
        self.post_json(PAGELOAD, &request).await
    }

    async fn keyverify(
        &self,
        request: KeyVerifyRequest,
    ) -> Result<KeyVerifyResponse, WebhookError> {
        self.post_json(KEY_VERIFY, &request).await
    }

    async fn submitanswers(&self, request: SubmitAnswersRequest) -> Result<(), WebhookError> {
        // Only success matters, but the body must still be JSON.
        let _: serde_json::Value = self.post_json(SUBMIT_ANSWERS, &request).await?;
        Ok(())
    }

    async fn submitusers(&self, request: SubmitUsersRequest) -> Result<(), WebhookError> {
        let _: serde_json::Value = self.post_json(SUBMIT_USERS, &request).await?;
        Ok(())
    }
}
