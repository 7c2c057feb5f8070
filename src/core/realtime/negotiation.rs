//! Offer/answer exchange with the negotiation endpoint.
//!
//! One POST per connection attempt: the local offer goes out as
//! `application/sdp` with the ephemeral credential as bearer token and the
//! remote answer comes back as text. Failures are never retried, since the
//! offer may already reflect a consumed media line.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::base::{RealtimeError, RealtimeResult};
use super::config::RealtimeModel;
use super::token::EphemeralCredential;
use super::transport::{SdpKind, SessionDescription};

/// Content type of offer and answer bodies.
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Exchanges a local offer for a remote answer.
#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(
        &self,
        offer: &SessionDescription,
        credential: &EphemeralCredential,
        model: RealtimeModel,
    ) -> RealtimeResult<SessionDescription>;
}

/// HTTP negotiation client.
pub struct NegotiationClient {
    url: String,
    client: reqwest::Client,
}

impl NegotiationClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, model: RealtimeModel) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}model={}", self.url, separator, model.as_str())
    }
}

#[async_trait]
impl Negotiator for NegotiationClient {
    async fn negotiate(
        &self,
        offer: &SessionDescription,
        credential: &EphemeralCredential,
        model: RealtimeModel,
    ) -> RealtimeResult<SessionDescription> {
        if offer.kind != SdpKind::Offer {
            return Err(RealtimeError::InvalidConfiguration(
                "Negotiation requires a local offer".to_string(),
            ));
        }

        let endpoint = self.endpoint(model);
        debug!(url = %endpoint, bytes = offer.sdp.len(), "Sending offer");

        let response = self
            .client
            .post(&endpoint)
            .header("Content-Type", SDP_CONTENT_TYPE)
            .bearer_auth(credential.secret())
            .body(offer.sdp.clone())
            .send()
            .await
            .map_err(|e| RealtimeError::NegotiationFailed {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RealtimeError::NegotiationFailed {
            status: Some(status.as_u16()),
            message: format!("Failed to read answer: {e}"),
        })?;

        if !status.is_success() {
            warn!("Negotiation endpoint returned HTTP {}", status.as_u16());
            return Err(RealtimeError::NegotiationFailed {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        parse_answer(body).map_err(|message| RealtimeError::NegotiationFailed {
            status: Some(status.as_u16()),
            message,
        })
    }
}

/// Accept a text answer only if it looks like a session description.
pub fn parse_answer(body: String) -> Result<SessionDescription, String> {
    if body.trim_start().starts_with("v=") {
        Ok(SessionDescription::answer(body))
    } else if body.trim().is_empty() {
        Err("Empty answer".to_string())
    } else {
        Err("Answer is not a session description".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_appends_model() {
        let client = NegotiationClient::new("https://api.openai.com/v1/realtime");
        assert_eq!(
            client.endpoint(RealtimeModel::Gpt4oRealtimePreview20241217),
            "https://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-12-17"
        );

        let client = NegotiationClient::new("http://localhost:9000/rt?region=eu");
        assert!(
            client
                .endpoint(RealtimeModel::Gpt4oMiniRealtimePreview)
                .ends_with("?region=eu&model=gpt-4o-mini-realtime-preview")
        );
    }

    #[test]
    fn test_parse_answer() {
        let answer = parse_answer("v=0\r\no=- 1 2 IN IP4 0.0.0.0\r\n".to_string()).unwrap();
        assert_eq!(answer.kind, SdpKind::Answer);
        assert!(parse_answer(String::new()).is_err());
        assert!(parse_answer("{\"error\":\"nope\"}".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_rejects_answer_as_offer() {
        let client = NegotiationClient::new("http://127.0.0.1:9");
        let result = client
            .negotiate(
                &SessionDescription::answer("v=0"),
                &EphemeralCredential::new("ek", None),
                RealtimeModel::default(),
            )
            .await;
        assert!(matches!(result, Err(RealtimeError::InvalidConfiguration(_))));
    }
}
