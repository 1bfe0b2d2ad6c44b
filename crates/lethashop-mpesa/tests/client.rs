//! Integration tests for `MpesaClient` using wiremock HTTP mocks.

use lethashop_core::{MpesaConfig, MpesaEnvironment};
use lethashop_mpesa::{MpesaClient, MpesaError, StkPushParams};
use wiremock::matchers::{basic_auth, bearer_token, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> MpesaConfig {
    MpesaConfig {
        consumer_key: "consumer-key".to_owned(),
        consumer_secret: "consumer-secret".to_owned(),
        shortcode: "174379".to_owned(),
        passkey: "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919".to_owned(),
        callback_url: "https://shop.example.com/api/payments/mpesa/callback".to_owned(),
        environment: MpesaEnvironment::Sandbox,
        base_url: None,
        callback_token: None,
        request_timeout_secs: 5,
        payment_timeout_secs: 300,
    }
}

fn test_client(base_url: &str) -> MpesaClient {
    MpesaClient::with_base_url(&test_config(), base_url)
        .expect("client construction should not fail")
        .with_retry_policy(2, 0)
}

fn push_params() -> StkPushParams<'static> {
    StkPushParams {
        phone_number: "254712345678",
        amount: 135,
        account_reference: "LS260309AB12",
        transaction_desc: "LethaShop",
    }
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .and(query_param("grant_type", "client_credentials"))
        .and(basic_auth("consumer-key", "consumer-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "token-abc",
            "expires_in": "3599"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn accepted_push() -> serde_json::Value {
    serde_json::json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": "ws_CO_191220191020363925",
        "ResponseCode": "0",
        "ResponseDescription": "Success. Request accepted for processing",
        "CustomerMessage": "Success. Request accepted for processing"
    })
}

#[tokio::test]
async fn stk_push_sends_daraja_body_and_returns_ids() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .and(bearer_token("token-abc"))
        .and(body_partial_json(serde_json::json!({
            "BusinessShortCode": "174379",
            "TransactionType": "CustomerPayBillOnline",
            "Amount": 135,
            "PartyA": "254712345678",
            "PartyB": "174379",
            "PhoneNumber": "254712345678",
            "CallBackURL": "https://shop.example.com/api/payments/mpesa/callback",
            "AccountReference": "LS260309AB12"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(accepted_push()))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let response = client.stk_push(push_params()).await.expect("push accepted");

    assert_eq!(response.checkout_request_id, "ws_CO_191220191020363925");
    assert_eq!(response.merchant_request_id, "29115-34620561-1");
    assert_eq!(response.response_code, "0");
}

#[tokio::test]
async fn access_token_is_cached_between_pushes() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(accepted_push()))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    client.stk_push(push_params()).await.expect("first push");
    client.stk_push(push_params()).await.expect("second push");
}

#[tokio::test]
async fn token_request_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_token(&server, 1).await;

    let client = test_client(&server.uri());
    let token = client.access_token().await.expect("token after retry");
    assert_eq!(token, "token-abc");
}

#[tokio::test]
async fn daraja_error_body_becomes_rejection() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "requestId": "11728-2929992-1",
            "errorCode": "400.002.02",
            "errorMessage": "Bad Request - Invalid PhoneNumber"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.stk_push(push_params()).await.unwrap_err();

    match err {
        MpesaError::Rejected { code, message } => {
            assert_eq!(code, "400.002.02");
            assert!(message.contains("Invalid PhoneNumber"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn non_zero_response_code_becomes_rejection() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    let mut body = accepted_push();
    body["ResponseCode"] = serde_json::json!("1");
    body["ResponseDescription"] = serde_json::json!("Rejected");
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.stk_push(push_params()).await.unwrap_err();
    assert!(matches!(err, MpesaError::Rejected { ref code, .. } if code == "1"));
}

#[tokio::test]
async fn stk_push_is_not_retried_on_server_error() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.stk_push(push_params()).await.unwrap_err();
    assert!(matches!(
        err,
        MpesaError::UnexpectedStatus { status: 500, .. }
    ));
}

#[tokio::test]
async fn unauthorized_push_drops_cached_token() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;

    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "requestId": "1",
            "errorCode": "404.001.03",
            "errorMessage": "Invalid Access Token"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(accepted_push()))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    assert!(client.stk_push(push_params()).await.is_err());
    client
        .stk_push(push_params())
        .await
        .expect("second push fetches a fresh token");
}

#[tokio::test]
async fn stk_query_returns_result_code() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/mpesa/stkpushquery/v1/query"))
        .and(body_partial_json(serde_json::json!({
            "BusinessShortCode": "174379",
            "CheckoutRequestID": "ws_CO_191220191020363925"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ResponseCode": "0",
            "ResponseDescription": "The service request has been accepted successsfully",
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResultCode": "0",
            "ResultDesc": "The service request is processed successfully."
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let response = client
        .stk_query("ws_CO_191220191020363925")
        .await
        .expect("query succeeds");
    assert_eq!(response.result_code(), Some(0));
}
