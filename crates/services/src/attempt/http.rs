use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use quiz_core::Clock;
use quiz_core::model::{AttemptId, AttemptResult, OptionId, QuestionId, StudentSnapshot};

use super::wire::{
    CreateAttemptRequest, CreateAttemptResponse, HistoryResponse, SubmitResponse,
    UpdateAnswerRequest,
};
use super::{AttemptService, CreatedAttempt, HistoryEntry};
use crate::config::AttemptServiceConfig;
use crate::error::AttemptApiError;

/// `AttemptService` over the backend's JSON HTTP API.
///
/// Routes, relative to the configured base URL:
/// - `POST attempts`
/// - `GET attempts/{attempt}/answers`
/// - `PUT attempts/{attempt}/answers/{question}`
/// - `POST attempts/{attempt}/submit`
#[derive(Clone)]
pub struct HttpAttemptService {
    client: Client,
    config: AttemptServiceConfig,
    clock: Clock,
}

impl HttpAttemptService {
    /// # Errors
    ///
    /// Returns `AttemptApiError::Http` if the HTTP client cannot be built.
    pub fn new(config: AttemptServiceConfig) -> Result<Self, AttemptApiError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            clock: Clock::default(),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, AttemptApiError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AttemptApiError::Malformed("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AttemptApiError> {
        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(AttemptApiError::HttpStatus(response.status()));
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AttemptApiError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| AttemptApiError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl AttemptService for HttpAttemptService {
    async fn create_attempt(
        &self,
        student: &StudentSnapshot,
    ) -> Result<CreatedAttempt, AttemptApiError> {
        let url = self.endpoint(&["attempts"])?;
        let response = self
            .send(self.client.post(url).json(&CreateAttemptRequest { student }))
            .await?;
        let body: CreateAttemptResponse = Self::decode(response).await?;
        body.into_created()
    }

    async fn answer_history(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<Vec<HistoryEntry>, AttemptApiError> {
        let url = self.endpoint(&["attempts", attempt_id.as_str(), "answers"])?;
        let response = self.send(self.client.get(url)).await?;
        let body: HistoryResponse = Self::decode(response).await?;
        body.into_entries()
    }

    async fn update_answer(
        &self,
        attempt_id: &AttemptId,
        question_id: &QuestionId,
        option_id: &OptionId,
    ) -> Result<(), AttemptApiError> {
        let url = self.endpoint(&[
            "attempts",
            attempt_id.as_str(),
            "answers",
            question_id.as_str(),
        ])?;
        debug!(%attempt_id, %question_id, %option_id, "PUT answer");
        self.send(self.client.put(url).json(&UpdateAnswerRequest {
            option_id: option_id.as_str(),
        }))
        .await?;
        Ok(())
    }

    async fn submit_attempt(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<AttemptResult, AttemptApiError> {
        let url = self.endpoint(&["attempts", attempt_id.as_str(), "submit"])?;
        let response = self.send(self.client.post(url)).await?;
        let body = response.text().await?;
        let parsed: SubmitResponse = if body.trim().is_empty() {
            SubmitResponse::default()
        } else {
            serde_json::from_str(&body).map_err(|err| AttemptApiError::Malformed(err.to_string()))?
        };
        parsed.into_result(attempt_id, self.clock.now())
    }
}
