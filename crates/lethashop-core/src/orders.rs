//! Order lifecycle enums and checkout arithmetic.

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::app_config::ShippingPolicy;
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Failed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a new M-Pesa payment may be started for an order in this state.
    #[must_use]
    pub fn accepts_payment(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Failed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::InvalidOrderStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Timeout,
}

impl PaymentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "timeout" => Ok(PaymentStatus::Timeout),
            other => Err(CoreError::InvalidPaymentStatus(other.to_string())),
        }
    }
}

/// A cart or order line with its unit price resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    /// Sum line totals and apply the shipping policy.
    ///
    /// Shipping is free once the subtotal is strictly above the threshold, and
    /// nothing is charged for an empty basket.
    #[must_use]
    pub fn compute(lines: &[PricedLine], policy: &ShippingPolicy) -> Self {
        let subtotal: Decimal = lines
            .iter()
            .map(|line| line.unit_price * Decimal::from(line.quantity))
            .sum();

        let shipping = if lines.is_empty() || subtotal > policy.free_shipping_threshold {
            Decimal::ZERO
        } else {
            policy.flat_fee
        };

        Self {
            subtotal,
            shipping,
            total: subtotal + shipping,
        }
    }
}

/// Whole-shilling amount to request over STK Push.
///
/// M-Pesa only accepts integers; totals are rounded half away from zero and
/// never go below 1.
///
/// # Errors
///
/// Returns [`CoreError::InvalidAmount`] if the total is negative or does not fit in an `i64`.
pub fn payable_amount(total: Decimal) -> Result<i64, CoreError> {
    if total.is_sign_negative() {
        return Err(CoreError::InvalidAmount(total.to_string()));
    }
    total
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .map(|amount| amount.max(1))
        .ok_or_else(|| CoreError::InvalidAmount(total.to_string()))
}

/// Human-facing order reference: `LS` + `YYMMDD` + four random characters.
///
/// Kept within 12 characters so it fits Daraja's `AccountReference` limit.
#[must_use]
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("LS{}{suffix}", now.format("%y%m%d"))
}
