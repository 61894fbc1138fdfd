//! Outbound payment provider integration.
//!
//! The provider is reached through [`PaymentProviderClient`] so the payment
//! service can be exercised against a stub. [`PaystackClient`] is the
//! production implementation.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha512;
use tracing::{debug, error, instrument, warn};

use crate::{config::PaystackConfig, entities::order, errors::ServiceError};

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the webhook signature.
pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

/// A checkout session opened with the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub reference: String,
}

#[async_trait]
pub trait PaymentProviderClient: Send + Sync {
    /// Stable provider identifier stored with each transaction.
    fn name(&self) -> &'static str;

    async fn initialize_payment(
        &self,
        order: &order::Model,
        email: &str,
        callback_url: &str,
    ) -> Result<PaymentSession, ServiceError>;

    /// Request header the provider signs webhooks in.
    fn signature_header(&self) -> &'static str {
        PAYSTACK_SIGNATURE_HEADER
    }

    /// Checks `signature` against the raw webhook body in constant time.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool;
}

/// Provider clients a checkout can be opened with, looked up by
/// [`PaymentProviderClient::name`]. The first one registered is the default.
#[derive(Clone)]
pub struct ProviderRegistry {
    default: Arc<dyn PaymentProviderClient>,
    providers: Vec<Arc<dyn PaymentProviderClient>>,
}

impl ProviderRegistry {
    pub fn new(default: Arc<dyn PaymentProviderClient>) -> Self {
        Self {
            providers: vec![default.clone()],
            default,
        }
    }

    pub fn register(mut self, provider: Arc<dyn PaymentProviderClient>) -> Self {
        self.providers.retain(|p| p.name() != provider.name());
        self.providers.push(provider);
        self
    }

    pub fn default_provider(&self) -> &Arc<dyn PaymentProviderClient> {
        &self.default
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn PaymentProviderClient>, ServiceError> {
        let name = name.trim();
        self.providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("Unsupported payment provider: {}", name))
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

/// Converts a two-decimal amount into kobo.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED).round().to_i64()
}

/// `PAY_{order_number}_{8 random alphanumerics}`
pub fn payment_reference(order_number: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("PAY_{}_{}", order_number, suffix.to_uppercase())
}

#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: Option<String>,
    reference: String,
}

#[derive(Clone)]
pub struct PaystackClient {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
    max_attempts: u32,
}

impl PaystackClient {
    pub fn new(config: &PaystackConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_attempts: config.max_attempts.max(1),
        })
    }

    /// Hex HMAC-SHA512 of `payload` under the secret key, as Paystack sends it.
    pub fn compute_signature(&self, payload: &[u8]) -> String {
        sign_payload(&self.secret_key, payload)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ServiceError> {
        let mut attempt = 1;
        loop {
            let result = self
                .http
                .post(url)
                .bearer_auth(&self.secret_key)
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) => return Ok(response),
                Err(err) if (err.is_timeout() || err.is_connect()) && attempt < self.max_attempts => {
                    warn!(attempt, error = %err, "Paystack request failed, retrying");
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempt, error = %err, "Paystack request failed");
                    return Err(ServiceError::ExternalServiceError(format!(
                        "Payment provider unreachable: {}",
                        err
                    )));
                }
            }
        }
    }
}

/// Hex HMAC-SHA512 of `payload` keyed by `secret`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl PaymentProviderClient for PaystackClient {
    fn name(&self) -> &'static str {
        "paystack"
    }

    #[instrument(skip(self, order, email), fields(order_id = %order.id, order_number = %order.order_number))]
    async fn initialize_payment(
        &self,
        order: &order::Model,
        email: &str,
        callback_url: &str,
    ) -> Result<PaymentSession, ServiceError> {
        let amount = to_minor_units(order.total_amount).ok_or_else(|| {
            ServiceError::ValidationError(format!("Amount {} out of range", order.total_amount))
        })?;
        let reference = payment_reference(&order.order_number);

        let body = json!({
            "email": email,
            "amount": amount,
            "currency": order.currency,
            "reference": reference,
            "callback_url": callback_url,
            "metadata": {
                "order_id": order.id,
                "order_number": order.order_number,
            }
        });

        let url = format!("{}/transaction/initialize", self.base_url);
        let response = self.post_with_retry(&url, &body).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %text, "Paystack rejected initialize request");
            return Err(ServiceError::ExternalServiceError(format!(
                "Payment provider returned {}",
                status
            )));
        }

        let envelope: PaystackEnvelope<InitializeData> = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed provider response: {}", e))
        })?;
        let data = match envelope.data {
            Some(data) if envelope.status => data,
            _ => {
                return Err(ServiceError::ExternalServiceError(format!(
                    "Payment initialization failed: {}",
                    envelope.message
                )))
            }
        };

        debug!(reference = %data.reference, "Paystack session opened");
        Ok(PaymentSession {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        // An empty key signs anything anyone can compute.
        if self.secret_key.is_empty() {
            return false;
        }
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha512::new_from_slice(self.secret_key.as_bytes()) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }
}
