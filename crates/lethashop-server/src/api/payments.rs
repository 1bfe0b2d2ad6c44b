//! M-Pesa STK Push initiation and the Safaricom result callback.

use std::str::FromStr;

use axum::{
    body::Bytes,
    extract::{Query, State},
    Extension, Json,
};
use lethashop_core::OrderStatus;
use lethashop_mpesa::{MpesaError, StkCallback, StkCallbackEnvelope, StkPushParams};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::middleware::{CurrentUser, RequestId};

use super::orders::load_visible_order;
use super::{internal_error, map_db_error, ApiError, ApiResponse, AppState};

const TRANSACTION_DESC: &str = "LethaShop";

#[derive(Debug, Deserialize)]
pub(super) struct StkPushRequest {
    pub order_id: i64,
    pub phone_number: String,
}

#[derive(Debug, Serialize)]
pub(super) struct StkPushItem {
    checkout_request_id: String,
    merchant_request_id: String,
    response_code: String,
    customer_message: String,
    status: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct CallbackQuery {
    pub token: Option<String>,
}

/// POST /api/payments/mpesa/stkpush
pub(super) async fn stk_push(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(body): Json<StkPushRequest>,
) -> Result<Json<ApiResponse<StkPushItem>>, ApiError> {
    let rid = &req_id.0;
    let Some(mpesa) = state.mpesa.clone() else {
        return Err(ApiError::new(
            rid,
            "service_unavailable",
            "M-Pesa payments are not configured",
        ));
    };

    let order = load_visible_order(&state, rid, &user, body.order_id).await?;
    if order.user_id != user.id {
        return Err(ApiError::new(
            rid,
            "forbidden",
            "only the customer who placed an order can pay for it",
        ));
    }

    let status = OrderStatus::from_str(&order.status).map_err(|e| internal_error(rid, &e))?;
    if !status.accepts_payment() {
        return Err(ApiError::new(
            rid,
            "conflict",
            format!("order {} is {status} and cannot be paid", order.order_number),
        ));
    }

    let in_progress = lethashop_db::has_pending_payment(&state.pool, order.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if in_progress {
        return Err(ApiError::new(
            rid,
            "conflict",
            format!(
                "a payment for order {} is already awaiting confirmation",
                order.order_number
            ),
        ));
    }

    let phone_number = lethashop_core::normalize_msisdn(&body.phone_number)
        .map_err(|e| ApiError::new(rid, "validation_error", e.to_string()))?;
    let amount = lethashop_core::payable_amount(order.total_amount)
        .map_err(|e| ApiError::new(rid, "bad_request", e.to_string()))?;

    let response = mpesa
        .stk_push(StkPushParams {
            phone_number: &phone_number,
            amount,
            account_reference: &order.order_number,
            transaction_desc: TRANSACTION_DESC,
        })
        .await
        .map_err(|e| map_mpesa_error(rid, &e))?;

    let payment = lethashop_db::record_payment_request(
        &state.pool,
        &lethashop_db::NewPaymentRequest {
            order_id: order.id,
            user_id: user.id,
            phone_number,
            amount,
            merchant_request_id: response.merchant_request_id.clone(),
            checkout_request_id: response.checkout_request_id.clone(),
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(
        order_id = order.id,
        checkout_request_id = %payment.checkout_request_id,
        amount,
        "payment request started"
    );

    Ok(Json(ApiResponse::new(
        StkPushItem {
            checkout_request_id: response.checkout_request_id,
            merchant_request_id: response.merchant_request_id,
            response_code: response.response_code,
            customer_message: response.customer_message,
            status: payment.status,
            amount,
        },
        req_id.0,
    )))
}

fn map_mpesa_error(request_id: &str, error: &MpesaError) -> ApiError {
    match error {
        MpesaError::Rejected { code, message } => {
            tracing::warn!(%code, %message, "stk push rejected");
            ApiError::new(
                request_id,
                "bad_gateway",
                format!("M-Pesa rejected the payment request: {message}"),
            )
        }
        other => {
            tracing::error!(error = %other, "stk push failed");
            ApiError::new(request_id, "bad_gateway", "M-Pesa is unavailable, try again")
        }
    }
}

fn callback_accepted() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ResultCode": 0, "ResultDesc": "Accepted" }))
}

/// POST /api/payments/mpesa/callback
///
/// Safaricom only needs an acknowledgement, so every well-authenticated
/// callback is accepted even when it cannot be applied.
pub(super) async fn mpesa_callback(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CallbackQuery>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let expected = state
        .config
        .mpesa
        .as_ref()
        .and_then(|m| m.callback_token.as_deref());
    if let Some(expected) = expected {
        let provided = query.token.as_deref().unwrap_or_default();
        if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            tracing::warn!("mpesa callback with bad token");
            return Err(ApiError::new(
                req_id.0,
                "unauthorized",
                "invalid callback token",
            ));
        }
    }

    let raw = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "ignoring non-json mpesa callback");
            return Ok(callback_accepted());
        }
    };
    let callback = match serde_json::from_value::<StkCallbackEnvelope>(raw.clone()) {
        Ok(envelope) => envelope.body.stk_callback,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed mpesa callback");
            return Ok(callback_accepted());
        }
    };

    apply_callback(&state, &callback, raw).await;
    Ok(callback_accepted())
}

async fn apply_callback(state: &AppState, callback: &StkCallback, raw: serde_json::Value) {
    let checkout_id = callback.checkout_request_id.as_str();
    let outcome = lethashop_db::CallbackOutcome {
        result_code: callback.result_code,
        result_desc: callback.result_desc.clone(),
        mpesa_receipt_number: callback.receipt_number(),
        raw_callback: Some(raw),
    };

    let applied = if callback.is_success() {
        lethashop_db::complete_payment(&state.pool, checkout_id, &outcome)
            .await
            .map(|completed| completed.map(|done| flag_duplicate_charge(checkout_id, done)))
    } else {
        lethashop_db::fail_payment(&state.pool, checkout_id, &outcome).await
    };

    match applied {
        Ok(Some(row)) => {
            if let Some(paid) = callback.amount() {
                #[allow(clippy::cast_precision_loss)]
                let requested = row.amount as f64;
                if (paid - requested).abs() > f64::EPSILON {
                    tracing::warn!(
                        checkout_request_id = checkout_id,
                        requested = row.amount,
                        paid,
                        "mpesa callback amount differs from request"
                    );
                }
            }
            tracing::info!(
                checkout_request_id = checkout_id,
                order_id = row.order_id,
                status = %row.status,
                result_code = callback.result_code,
                "mpesa callback applied"
            );
        }
        Ok(None) => log_unapplied_callback(state, checkout_id).await,
        Err(e) => {
            tracing::error!(error = %e, checkout_request_id = checkout_id, "failed to apply mpesa callback");
        }
    }
}

fn flag_duplicate_charge(
    checkout_id: &str,
    done: lethashop_db::CompletedPayment,
) -> lethashop_db::PaymentRequestRow {
    if !done.settled_order {
        tracing::warn!(
            checkout_request_id = checkout_id,
            order_id = done.payment.order_id,
            receipt = ?done.payment.mpesa_receipt_number,
            "order was already paid by another request; refund this payment"
        );
    }
    done.payment
}

async fn log_unapplied_callback(state: &AppState, checkout_id: &str) {
    match lethashop_db::get_payment_by_checkout_id(&state.pool, checkout_id).await {
        Ok(Some(existing)) => tracing::warn!(
            checkout_request_id = checkout_id,
            status = %existing.status,
            "ignoring repeated mpesa callback"
        ),
        Ok(None) => tracing::warn!(
            checkout_request_id = checkout_id,
            "ignoring mpesa callback for unknown checkout request"
        ),
        Err(e) => tracing::error!(error = %e, "failed to look up mpesa payment"),
    }
}
