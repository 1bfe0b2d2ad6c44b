//! Kenyan MSISDN normalisation for M-Pesa.

use crate::CoreError;

const COUNTRY_CODE: &str = "254";
const MSISDN_LEN: usize = 12;

/// Normalise a user-entered phone number into the `2547XXXXXXXX` form Daraja expects.
///
/// Accepts `0712345678`, `712345678`, `254712345678` and `+254 712 345 678`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPhoneNumber`] when the digits do not form a
/// 12-digit number starting with `254`.
pub fn normalize_msisdn(raw: &str) -> Result<String, CoreError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    let normalized = if let Some(rest) = digits.strip_prefix('0') {
        format!("{COUNTRY_CODE}{rest}")
    } else if digits.starts_with(COUNTRY_CODE) {
        digits
    } else if digits.len() == 9 {
        format!("{COUNTRY_CODE}{digits}")
    } else {
        digits
    };

    if normalized.len() == MSISDN_LEN && normalized.starts_with(COUNTRY_CODE) {
        Ok(normalized)
    } else {
        Err(CoreError::InvalidPhoneNumber(raw.to_string()))
    }
}
