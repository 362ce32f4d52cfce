/// SDP offer/answer exchange for media setup
///
/// The media path is negotiated out of band: the client POSTs a local SDP
/// offer to the realtime endpoint, authorized by the session credential,
/// and receives the remote answer back as plain SDP text.

use tracing::{debug, info};

use crate::credential::Credential;
use crate::transport::error::{TransportError, TransportResult};

/// Configuration for the signaling endpoint
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Base HTTPS URL of the realtime endpoint
    pub url: String,

    /// Model to negotiate against, appended as a query parameter
    pub model: Option<String>,
}

impl SignalingConfig {
    /// Create a configuration for the given endpoint URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: None,
        }
    }

    /// Set the model query parameter
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Build the signaling URL with query parameters
    pub fn build_url(&self) -> TransportResult<String> {
        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(TransportError::InvalidConfig(format!(
                "Signaling URL must use http:// or https://: {}",
                self.url
            )));
        }

        let mut url = self.url.clone();
        if let Some(ref model) = self.model {
            let separator = if url.contains('?') { '&' } else { '?' };
            url.push_str(&format!("{}model={}", separator, model));
        }

        Ok(url)
    }
}

/// Client for the SDP offer/answer exchange
#[derive(Debug, Clone)]
pub struct SignalingClient {
    config: SignalingConfig,
    client: reqwest::Client,
}

impl SignalingClient {
    /// Create a client for the given configuration
    pub fn new(config: SignalingConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// POST a local SDP offer and return the remote answer
    pub async fn exchange(
        &self,
        offer_sdp: &str,
        credential: &Credential,
    ) -> TransportResult<String> {
        let url = self.config.build_url()?;
        debug!("Posting SDP offer to {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.value())
            .header("Content-Type", "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(|e| TransportError::Signaling(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(TransportError::AuthenticationFailed);
        }
        if !status.is_success() {
            return Err(TransportError::Signaling(format!(
                "answer request failed with status {}",
                status
            )));
        }

        let answer = response
            .text()
            .await
            .map_err(|e| TransportError::Signaling(e.to_string()))?;

        info!("SDP answer received ({} bytes)", answer.len());
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signaling_config_build_url() {
        let config = SignalingConfig::new("https://api.example.com/v1/realtime");
        assert_eq!(
            config.build_url().unwrap(),
            "https://api.example.com/v1/realtime"
        );

        let config = config.with_model("gpt-realtime");
        assert_eq!(
            config.build_url().unwrap(),
            "https://api.example.com/v1/realtime?model=gpt-realtime"
        );
    }

    #[test]
    fn test_signaling_config_rejects_websocket_url() {
        let config = SignalingConfig::new("wss://api.example.com/v1/realtime");

        assert!(matches!(
            config.build_url(),
            Err(TransportError::InvalidConfig(_))
        ));
    }
}
