use chrono::TimeZone;
use lethashop_core::MpesaEnvironment;

use super::*;

fn config(callback_token: Option<&str>) -> MpesaConfig {
    MpesaConfig {
        consumer_key: "key".to_owned(),
        consumer_secret: "secret".to_owned(),
        shortcode: "174379".to_owned(),
        passkey: "passkey".to_owned(),
        callback_url: "https://shop.example.com/api/payments/mpesa/callback".to_owned(),
        environment: MpesaEnvironment::Sandbox,
        base_url: None,
        callback_token: callback_token.map(str::to_owned),
        request_timeout_secs: 30,
        payment_timeout_secs: 300,
    }
}

#[test]
fn timestamp_is_in_nairobi_time() {
    let now = Utc.with_ymd_and_hms(2026, 3, 9, 22, 30, 15).unwrap();
    assert_eq!(daraja_timestamp(now), "20260310013015");
}

#[test]
fn password_is_base64_of_concatenation() {
    let password = stk_password("174379", "passkey", "20260309150000");
    let decoded = STANDARD.decode(password).unwrap();
    assert_eq!(decoded, b"174379passkey20260309150000");
}

#[test]
fn new_client_targets_sandbox_by_default() {
    let client = MpesaClient::new(&config(None)).expect("client");
    assert_eq!(client.base_url.as_str(), "https://sandbox.safaricom.co.ke/");
    assert_eq!(
        client.endpoint("oauth/v1/generate").unwrap().as_str(),
        "https://sandbox.safaricom.co.ke/oauth/v1/generate"
    );
}

#[test]
fn callback_token_is_appended_to_callback_url() {
    let client = MpesaClient::new(&config(Some("s3cret"))).expect("client");
    assert_eq!(
        client.callback_url,
        "https://shop.example.com/api/payments/mpesa/callback?token=s3cret"
    );
}

#[test]
fn invalid_callback_url_is_rejected_with_token() {
    let mut cfg = config(Some("s3cret"));
    cfg.callback_url = "not a url".to_owned();
    let err = MpesaClient::new(&cfg).unwrap_err();
    assert!(matches!(err, MpesaError::InvalidConfig(_)), "got {err:?}");
}

#[test]
fn truncate_respects_char_boundaries() {
    assert_eq!(truncate("LS260309AB12EXTRA", 12), "LS260309AB12");
    assert_eq!(truncate("short", 12), "short");
    assert_eq!(truncate("Duka la Ngozi é", 14), "Duka la Ngozi ");
}
