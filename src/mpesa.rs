use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config;

/// Synchronous result of a push-payment request; `checkout_request_id` is
/// the correlation id echoed back by the confirmation webhook.
#[derive(Debug, Clone)]
pub struct PushHandle {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
}

/// key: payment-gateway -> provider seam
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn request_push(&self, phone: &str, amount: i64, reference: &str) -> Result<PushHandle>;
}

/// Daraja-style mobile-money client: bearer token via basic-auth
/// client-credentials exchange, then an STK push request.
pub struct DarajaGateway {
    base: String,
    consumer_key: String,
    consumer_secret: String,
    shortcode: String,
    passkey: String,
    callback_url: String,
    client: Client,
}

impl DarajaGateway {
    pub fn from_env() -> Self {
        Self::new(
            config::MPESA_BASE_URL.clone(),
            config::MPESA_CONSUMER_KEY.clone(),
            config::MPESA_CONSUMER_SECRET.clone(),
            config::MPESA_SHORTCODE.clone(),
            config::MPESA_PASSKEY.clone(),
            config::MPESA_CALLBACK_URL.clone(),
        )
    }

    pub fn new(
        base: impl Into<String>,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        shortcode: impl Into<String>,
        passkey: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            shortcode: shortcode.into(),
            passkey: passkey.into(),
            callback_url: callback_url.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("client build"),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let url = format!("{}/oauth/v1/generate?grant_type=client_credentials", self.base);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await?
            .error_for_status()?;
        let body: TokenResponse = response.json().await?;
        Ok(body.access_token)
    }
}

#[async_trait]
impl PaymentGateway for DarajaGateway {
    async fn request_push(&self, phone: &str, amount: i64, reference: &str) -> Result<PushHandle> {
        let token = self.access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = base64::engine::general_purpose::STANDARD
            .encode(format!("{}{}{}", self.shortcode, self.passkey, timestamp));

        let body = json!({
            "BusinessShortCode": self.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount,
            "PartyA": phone,
            "PartyB": self.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.callback_url,
            "AccountReference": reference,
            "TransactionDesc": format!("Hotspot plan {reference}"),
        });

        let response = self
            .client
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let body: PushResponse = response.json().await?;

        if let Some(code) = body.response_code.as_deref() {
            if code != "0" {
                return Err(anyhow!(
                    "payment gateway declined push: {code} {}",
                    body.response_description.unwrap_or_default()
                ));
            }
        }
        Ok(PushHandle {
            merchant_request_id: body.merchant_request_id,
            checkout_request_id: body.checkout_request_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    response_description: Option<String>,
}

/// The gateway's native confirmation envelope, as POSTed to `/callback`.
#[derive(Debug, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub item: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    fn metadata_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .item
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    /// The settled amount, rounded to whole currency units.
    pub fn amount(&self) -> Option<i64> {
        let value = self.metadata_value("Amount")?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|v| v.round() as i64))
    }

    pub fn receipt(&self) -> Option<String> {
        match self.metadata_value("MpesaReceiptNumber")? {
            serde_json::Value::String(receipt) => Some(receipt.clone()),
            other => Some(other.to_string()),
        }
    }
}
