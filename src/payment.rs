//! Payment provider verification.
//!
//! Marking an order paid requires a server-to-server check against the
//! provider: the transaction must exist, be completed, and report the amount
//! the customer actually paid. Transport failures are surfaced as errors
//! rather than treated as "unverified", since a rejected payment and an
//! unreachable provider are different outcomes.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::AppConfig;

const VERIFY_RETRIES: usize = 2;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider request failed: {0}")]
    Transport(String),

    #[error("payment provider returned status {0}")]
    Provider(u16),

    #[error("payment provider payload malformed: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Outcome of a provider-side transaction check.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedPayment {
    pub verified: bool,
    /// Paid amount in minor units (cents).
    pub amount: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn verify_transaction(&self, transaction_id: &str)
    -> Result<VerifiedPayment, PaymentError>;
}

/// PayPal Orders v2 client using app credentials.
pub struct PayPalClient {
    http: reqwest::Client,
    api_url: String,
    client_id: String,
    app_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutOrder {
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    amount: Amount,
}

#[derive(Debug, Deserialize)]
struct Amount {
    value: String,
}

impl PayPalClient {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.paypal_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_url: config.paypal_api_url.trim_end_matches('/').to_string(),
            client_id: config.paypal_client_id.clone(),
            app_secret: config.paypal_app_secret.clone(),
        })
    }

    async fn access_token(&self) -> Result<String, PaymentError> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.api_url))
            .basic_auth(&self.client_id, Some(&self.app_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PaymentError::Provider(response.status().as_u16()));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn fetch_order(&self, transaction_id: &str) -> Result<VerifiedPayment, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}/v2/checkout/orders/{transaction_id}", self.api_url))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PaymentError::Provider(response.status().as_u16()));
        }

        let order: CheckoutOrder = response
            .json()
            .await
            .map_err(|e| PaymentError::Parse(e.to_string()))?;

        let unit = order
            .purchase_units
            .first()
            .ok_or_else(|| PaymentError::Parse("missing purchase unit".into()))?;
        let amount = parse_amount(&unit.amount.value)?;

        Ok(VerifiedPayment {
            verified: order.status == "COMPLETED",
            amount,
        })
    }
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    async fn verify_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<VerifiedPayment, PaymentError> {
        let mut last_err = None;
        for attempt in 0..=VERIFY_RETRIES {
            match self.fetch_order(transaction_id).await {
                Ok(payment) => return Ok(payment),
                // Only transport failures are worth retrying.
                Err(PaymentError::Transport(msg)) => {
                    tracing::warn!(attempt, error = %msg, "paypal request failed");
                    last_err = Some(PaymentError::Transport(msg));
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| PaymentError::Transport("exhausted retries".into())))
    }
}

/// Parse a provider decimal amount like "54.00" into cents.
pub fn parse_amount(value: &str) -> Result<i64, PaymentError> {
    let malformed = || PaymentError::Parse(format!("bad amount: {value}"));

    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };

    let dollars: i64 = whole.parse().map_err(|_| malformed())?;
    if dollars < 0 {
        return Err(malformed());
    }

    let cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| malformed())? * 10,
        2 => frac.parse().map_err(|_| malformed())?,
        _ => return Err(malformed()),
    };
    if cents < 0 {
        return Err(malformed());
    }

    Ok(dollars * 100 + cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_decimal_amounts() {
        assert_eq!(parse_amount("54.00").unwrap(), 5_400);
        assert_eq!(parse_amount("0.99").unwrap(), 99);
        assert_eq!(parse_amount("1234.56").unwrap(), 123_456);
    }

    #[test]
    fn parses_whole_and_single_decimal_amounts() {
        assert_eq!(parse_amount("12").unwrap(), 1_200);
        assert_eq!(parse_amount("12.5").unwrap(), 1_250);
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount("12.345").is_err());
        assert!(parse_amount("-3.00").is_err());
        assert!(parse_amount("abc").is_err());
    }
}
