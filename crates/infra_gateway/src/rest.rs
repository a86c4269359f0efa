//! REST gateway client

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use core_kernel::Money;
use domain_invoicing::{GatewayClient, GatewayError, GatewayIntent, IntentState, SignatureError};

use crate::signature::WebhookVerifier;

/// Connection settings for the payment gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the gateway API, without trailing slash
    pub base_url: String,
    /// Bearer token for API authentication
    pub api_key: String,
    /// Shared secret for webhook signature verification
    pub webhook_secret: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// `GatewayClient` over the processor's REST API
pub struct RestGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    verifier: WebhookVerifier,
}

#[derive(Serialize)]
struct CreateIntentRequest<'a> {
    amount_minor_units: i64,
    currency: &'a str,
}

#[derive(Deserialize)]
struct IntentResponse {
    intent_id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: IntentState,
}

#[derive(Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl RestGateway {
    /// Builds the client; fails only on invalid TLS or client configuration
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url,
            api_key: config.api_key,
            verifier: WebhookVerifier::new(config.webhook_secret),
        })
    }

    fn map_transport(err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout { timeout_ms: 0 }
        } else {
            GatewayError::Transport(err.to_string())
        }
    }

    /// Turns a non-success HTTP response into the matching gateway error
    async fn error_from_response(
        response: reqwest::Response,
        intent_id: Option<&str>,
    ) -> GatewayError {
        let status = response.status();
        let message = response
            .json::<GatewayErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| format!("http status {status}"));

        match status {
            StatusCode::NOT_FOUND => {
                GatewayError::UnknownIntent(intent_id.unwrap_or("<unknown>").to_string())
            }
            s if s.is_client_error() => GatewayError::Rejected(message),
            // 5xx may succeed on retry
            _ => GatewayError::Transport(message),
        }
    }

    async fn fetch_intent(
        &self,
        method: reqwest::Method,
        path: String,
        intent_id: &str,
    ) -> Result<IntentResponse, GatewayError> {
        let response = self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::map_transport)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, Some(intent_id)).await);
        }
        response
            .json::<IntentResponse>()
            .await
            .map_err(|e| GatewayError::Transport(format!("malformed gateway response: {e}")))
    }
}

#[async_trait]
impl GatewayClient for RestGateway {
    async fn create_intent(
        &self,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<GatewayIntent, GatewayError> {
        let body = CreateIntentRequest {
            amount_minor_units: amount.minor_units(),
            currency: amount.currency().code(),
        };
        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response, None).await);
        }
        let intent = response
            .json::<IntentResponse>()
            .await
            .map_err(|e| GatewayError::Transport(format!("malformed gateway response: {e}")))?;

        tracing::debug!(
            intent_id = %intent.intent_id,
            state = ?intent.status,
            "gateway payment intent created"
        );
        Ok(GatewayIntent {
            client_secret: intent.client_secret.ok_or_else(|| {
                GatewayError::Transport("gateway response missing client_secret".to_string())
            })?,
            intent_id: intent.intent_id,
            state: intent.status,
        })
    }

    async fn confirm_intent(&self, intent_id: &str) -> Result<IntentState, GatewayError> {
        let intent = self
            .fetch_intent(
                reqwest::Method::POST,
                format!("/v1/payment_intents/{intent_id}/confirm"),
                intent_id,
            )
            .await?;
        Ok(intent.status)
    }

    async fn get_intent_status(&self, intent_id: &str) -> Result<IntentState, GatewayError> {
        let intent = self
            .fetch_intent(
                reqwest::Method::GET,
                format!("/v1/payment_intents/{intent_id}"),
                intent_id,
            )
            .await?;
        Ok(intent.status)
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), SignatureError> {
        self.verifier.verify(payload, signature)
    }
}
