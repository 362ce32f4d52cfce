/// Credential issuance and lifecycle
///
/// A credential is a short-lived token authorizing transport
/// establishment: created by the external token issuer, consumed once to
/// open a transport, discarded on refresh or teardown. The issuance
/// request carries the session context so the server can restore the
/// conversation after a refresh.

/// Credential error types
pub mod error;

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::history::MessageRecord;

pub use error::{CredentialError, CredentialResult};

/// Credential lifetime assumed when the issuer does not report one
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(60);

/// Short-lived token authorizing transport establishment
#[derive(Debug, Clone)]
pub struct Credential {
    value: String,
    issued_at: Instant,
    expires_in: Duration,
}

impl Credential {
    /// Create a credential issued at the given instant
    pub fn new(value: impl Into<String>, issued_at: Instant, expires_in: Duration) -> Self {
        Self {
            value: value.into(),
            issued_at,
            expires_in,
        }
    }

    /// The bearer token value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Lifetime granted by the issuer
    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    /// When the credential stops being valid
    pub fn expires_at(&self) -> Instant {
        self.issued_at + self.expires_in
    }

    /// Whether the credential is past its lifetime
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }
}

/// Context sent with a credential request
#[derive(Debug, Clone, Serialize, Default)]
pub struct CredentialRequest {
    /// Session to restore, if one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Conversation to restore, if one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    /// Everything the server has told us so far
    pub conversation_history: Vec<MessageRecord>,
}

/// External token-issuing collaborator
pub trait TokenProvider: Send + 'static {
    /// Fetch a fresh credential for the given session context
    fn fetch(
        &self,
        request: &CredentialRequest,
    ) -> impl Future<Output = CredentialResult<Credential>> + Send;
}

/// Wire shape of the issuer's response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    client_secret: ClientSecret,
    #[serde(default)]
    expires_in_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

/// Issues credentials from the backend's token endpoint
///
/// POSTs the request context as JSON and reads
/// `{"client_secret": {"value": ...}, "expires_in_ms": ...}` back.
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTokenProvider {
    /// Create a provider for the given endpoint URL
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Endpoint URL credentials are requested from
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TokenProvider for HttpTokenProvider {
    fn fetch(
        &self,
        request: &CredentialRequest,
    ) -> impl Future<Output = CredentialResult<Credential>> + Send {
        // Serialize into the builder up front so the returned future owns
        // everything it needs.
        let call = self.client.post(&self.endpoint).json(request).send();

        async move {
            debug!("requesting credential");
            let response = call
                .await
                .map_err(|e| CredentialError::RequestFailed(e.to_string()))?;

            if !response.status().is_success() {
                return Err(CredentialError::IssuerRejected(response.status().as_u16()));
            }

            let body: TokenResponse = response
                .json()
                .await
                .map_err(|e| CredentialError::MalformedResponse(e.to_string()))?;

            let expires_in = body
                .expires_in_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_EXPIRES_IN);

            info!(
                expires_in_ms = expires_in.as_millis() as u64,
                "credential received"
            );

            Ok(Credential::new(
                body.client_secret.value,
                Instant::now(),
                expires_in,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_expiry() {
        let issued = Instant::now();
        let credential = Credential::new("tok-1", issued, Duration::from_secs(60));

        assert_eq!(credential.value(), "tok-1");
        assert!(!credential.is_expired(issued));
        assert!(!credential.is_expired(issued + Duration::from_secs(59)));
        assert!(credential.is_expired(issued + Duration::from_secs(60)));
        assert!(credential.is_expired(issued + Duration::from_secs(120)));
    }

    #[test]
    fn test_request_serialization() {
        let request = CredentialRequest {
            session_id: Some("sess-1".to_string()),
            conversation_id: None,
            conversation_history: Vec::new(),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""session_id":"sess-1""#));
        assert!(!json.contains("conversation_id"));
        assert!(json.contains(r#""conversation_history":[]"#));
    }

    #[test]
    fn test_token_response_decoding() {
        let body: TokenResponse = serde_json::from_str(
            r#"{"client_secret":{"value":"tok-2"},"expires_in_ms":45000}"#,
        )
        .unwrap();
        assert_eq!(body.client_secret.value, "tok-2");
        assert_eq!(body.expires_in_ms, Some(45_000));

        // Lifetime is optional; callers fall back to the default.
        let body: TokenResponse =
            serde_json::from_str(r#"{"client_secret":{"value":"tok-3"}}"#).unwrap();
        assert_eq!(body.expires_in_ms, None);
        assert_eq!(DEFAULT_EXPIRES_IN, Duration::from_secs(60));
    }
}
