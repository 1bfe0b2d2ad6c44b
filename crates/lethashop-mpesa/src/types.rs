//! Daraja request and response bodies.
//!
//! Daraja uses PascalCase keys with a few irregular acronyms
//! (`CallBackURL`, `MerchantRequestID`), so those fields carry explicit renames.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OAuth
// ---------------------------------------------------------------------------

/// Body of `GET /oauth/v1/generate`. `expires_in` arrives as a string.
#[derive(Debug, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub expires_in: String,
}

/// Error body Daraja returns on 4xx/5xx.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    pub error_code: String,
    pub error_message: String,
}

// ---------------------------------------------------------------------------
// STK Push
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest<'a> {
    pub business_short_code: &'a str,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: &'static str,
    pub amount: i64,
    pub party_a: &'a str,
    pub party_b: &'a str,
    pub phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    pub callback_url: &'a str,
    pub account_reference: &'a str,
    pub transaction_desc: &'a str,
}

/// Synchronous acknowledgement of an STK Push. The payment outcome arrives
/// later through the callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

// ---------------------------------------------------------------------------
// STK Query
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkQueryRequest<'a> {
    pub business_short_code: &'a str,
    pub password: String,
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    /// Daraja sends this as a string (`"0"`, `"1032"`).
    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<String>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
}

impl StkQueryResponse {
    /// The numeric result code, if the transaction has one yet.
    #[must_use]
    pub fn result_code(&self) -> Option<i32> {
        self.result_code.as_deref().and_then(|c| c.trim().parse().ok())
    }
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// Outer shape of the callback: `{"Body": {"stkCallback": {...}}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    /// Present only on successful payments.
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

impl StkCallback {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    fn metadata_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    /// The M-Pesa receipt, e.g. `NLJ7RT61SV`.
    #[must_use]
    pub fn receipt_number(&self) -> Option<String> {
        self.metadata_value("MpesaReceiptNumber")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    }

    #[must_use]
    pub fn amount(&self) -> Option<f64> {
        self.metadata_value("Amount")
            .and_then(serde_json::Value::as_f64)
    }

    /// Paying MSISDN. Daraja sends it as a JSON number.
    #[must_use]
    pub fn phone_number(&self) -> Option<String> {
        self.metadata_value("PhoneNumber").map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}
