//! HTTP clients for the collaborators.
//!
//! Each service accepts a JSON body and answers with JSON (possibly wrapped
//! in markdown by the model behind it). Responses are parsed entry by entry.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cards::generator::json_entries;
use crate::cards::{SuggestionCard, parse_cards};
use crate::conversation::InsightCandidate;
use crate::error::ServiceError;

use super::{
    ExtractionRequest, GenerationRequest, InsightExtractor, RecommendationGenerator,
};

/// A JSON-over-HTTP endpoint with optional bearer auth.
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    service: &'static str,
    url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
    client: reqwest::Client,
}

impl JsonEndpoint {
    pub fn new(
        service: &'static str,
        url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            url: url.into(),
            api_key,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// POST `body` and return the raw response text.
    pub async fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<String, ServiceError> {
        let mut request = self.client.post(&self.url).timeout(self.timeout).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                service = self.service,
                status = status.as_u16(),
                detail = %detail,
                "Collaborator returned an error status"
            );
            return Err(ServiceError::BadStatus {
                service: self.service.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout {
                service: self.service.to_string(),
                timeout: self.timeout,
            }
        } else {
            ServiceError::RequestFailed {
                service: self.service.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Insight extractor reached over HTTP.
pub struct HttpInsightExtractor {
    endpoint: JsonEndpoint,
}

impl HttpInsightExtractor {
    pub fn new(url: impl Into<String>, api_key: Option<SecretString>, timeout: Duration) -> Self {
        Self {
            endpoint: JsonEndpoint::new("insight-extractor", url, api_key, timeout),
        }
    }
}

#[async_trait]
impl InsightExtractor for HttpInsightExtractor {
    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<Vec<InsightCandidate>, ServiceError> {
        debug!(turns = request.turns.len(), "Requesting insight extraction");
        let body = self.endpoint.post(request).await?;
        let candidates = parse_candidates(&body).ok_or_else(|| ServiceError::InvalidResponse {
            service: "insight-extractor".into(),
            reason: "expected a JSON array of insights".into(),
        })?;
        info!(count = candidates.len(), "Received insight candidates");
        Ok(candidates)
    }
}

/// Recommendation generator reached over HTTP.
pub struct HttpRecommendationGenerator {
    endpoint: JsonEndpoint,
}

impl HttpRecommendationGenerator {
    pub fn new(url: impl Into<String>, api_key: Option<SecretString>, timeout: Duration) -> Self {
        Self {
            endpoint: JsonEndpoint::new("recommendation-generator", url, api_key, timeout),
        }
    }
}

#[async_trait]
impl RecommendationGenerator for HttpRecommendationGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<SuggestionCard>, ServiceError> {
        info!(
            mode = ?request.mode,
            phase = %request.phase,
            insights = request.insights.len(),
            "Requesting suggestion cards"
        );
        let body = self.endpoint.post(request).await?;
        Ok(parse_cards(&body, request.max_cards))
    }
}

/// Parse extractor output, dropping entries that are not objects of the
/// expected shape. `None` when the body holds no list at all.
pub fn parse_candidates(text: &str) -> Option<Vec<InsightCandidate>> {
    let entries = json_entries(text, "insights")?;
    Some(
        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<InsightCandidate>(entry) {
                Ok(candidate) => Some(candidate),
                Err(e) => {
                    debug!(error = %e, "Dropping malformed insight entry");
                    None
                }
            })
            .collect(),
    )
}
