//! Client for Safaricom's Daraja API: OAuth tokens, STK Push (Lipa na M-Pesa
//! Online), STK status queries and the callback payload Safaricom posts back.

pub mod client;
pub mod error;
pub(crate) mod retry;
pub mod types;

pub use client::{daraja_timestamp, stk_password, MpesaClient, StkPushParams};
pub use error::MpesaError;
pub use types::{
    CallbackItem, CallbackMetadata, StkCallback, StkCallbackEnvelope, StkPushResponse,
    StkQueryResponse,
};
