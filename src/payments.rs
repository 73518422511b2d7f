// src/payments.rs
//
// Thin pass-through to the third-party payment processor: one call that
// creates a payment intent, nothing more. No retry policy and no stored
// payment state on our side; the client confirms the intent directly with
// the processor using the publishable key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment processing is not configured")]
    NotConfigured,
    #[error("payment api request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("payment api rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        description: &str,
    ) -> Result<PaymentIntent, PaymentError>;
}

pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: String, api_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            api_base,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        description: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        let resp = self
            .http
            .post(format!("{}/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount_cents.to_string()),
                ("currency", currency.to_string()),
                ("description", description.to_string()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected(body));
        }

        Ok(resp.json::<PaymentIntent>().await?)
    }
}

/// Stands in when no PAYMENT_SECRET_KEY is configured; every call fails with
/// a clear error instead of a broken outbound request.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_intent(
        &self,
        _amount_cents: i64,
        _currency: &str,
        _description: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        Err(PaymentError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_gateway_reports_not_configured() {
        let gw = DisabledGateway;
        let err = gw.create_intent(5000, "usd", "session").await.unwrap_err();
        assert!(matches!(err, PaymentError::NotConfigured));
    }

    #[test]
    fn intent_decodes_processor_response() {
        // Shape returned by the processor's /payment_intents endpoint; extra
        // fields are ignored.
        let json = r#"{
            "id": "pi_123",
            "client_secret": "pi_123_secret_abc",
            "amount": 5000,
            "currency": "usd",
            "object": "payment_intent"
        }"#;
        let intent: PaymentIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.amount, 5000);
    }
}
