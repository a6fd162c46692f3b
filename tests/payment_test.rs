//! Payment creation tests covering both strategies and both credential modes.

mod common;

use common::{TestApp, PLATFORM_TOKEN};
use payment_broker::services::PaymentStore;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

fn account_money_request() -> serde_json::Value {
    json!({
        "totalAmount": 150.00,
        "description": "Credit for consultations",
        "title": "Consultation credit",
        "payerName": "Luis Fernandez",
        "paymentMethodId": "account_money",
        "paymentTypeId": "account_money",
        "splitPayment": false,
        "payer": {
            "email": "luis.fernandez@example.com",
            "identification": { "type": "DNI", "number": "44556677" }
        },
        "installments": 1,
        "currencyId": "ARS"
    })
}

fn credit_card_request() -> serde_json::Value {
    json!({
        "totalAmount": 1000.00,
        "description": "Annual health plan",
        "title": "Health plan",
        "payerName": "Ana Martinez",
        "paymentMethodId": "visa",
        "paymentTypeId": "credit_card",
        "splitPayment": false,
        "payer": {
            "email": "ana.martinez@example.com",
            "identification": { "type": "DNI", "number": "11223344" }
        },
        "token": "ff8080814c11e237014c1ff593b57b4d",
        "installments": 3,
        "issuerId": "310"
    })
}

#[tokio::test]
async fn account_money_payment_creates_a_pending_preference() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .and(header(
            "Authorization",
            format!("Bearer {}", PLATFORM_TOKEN).as_str(),
        ))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "136522115-9c3a3f6b",
            "operation_type": "regular_payment",
            "date_created": "2024-05-01T12:00:00.000-04:00",
            "init_point": "https://www.mercadopago.com/init/136522115-9c3a3f6b"
        })))
        .expect(1)
        .mount(&app.provider)
        .await;

    let response = app
        .client
        .post(app.url("/payments"))
        .json(&account_money_request())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["id"], "136522115-9c3a3f6b");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["statusDetail"], "pending");
    assert_eq!(body["paymentTypeId"], "regular_payment");
    assert_eq!(body["paymentMethodId"], "account_money");
    assert_eq!(body["transactionAmount"], 150.0);

    // Without a split the full amount passes through.
    let record = app
        .payments
        .find("136522115-9c3a3f6b")
        .await
        .unwrap()
        .expect("Payment was not recorded");
    assert_eq!(record.commission, 0.0);
    assert_eq!(record.net_amount, 150.0);
    assert_eq!(record.currency, "ARS");
    assert_eq!(record.date_created, "2024-05-01T12:00:00.000-04:00");

    // The preference was sent without a marketplace fee.
    let requests = app
        .provider
        .received_requests()
        .await
        .expect("Request recording is enabled");
    let sent = String::from_utf8_lossy(&requests[0].body).to_string();
    assert!(!sent.contains("marketplace_fee"));
}

#[tokio::test]
async fn split_payment_uses_the_tenant_credential_and_withholds_commission() {
    let app = TestApp::spawn().await;
    app.seed_authorized_tenant(42, "Clinic FortyTwo", "APP_USR-tenant-42")
        .await;

    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .and(header("Authorization", "Bearer APP_USR-tenant-42"))
        .and(body_string_contains("\"marketplace_fee\":100.0"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "136522115-split-42",
            "operation_type": "regular_payment",
            "date_created": "2024-05-02T09:30:00.000-04:00"
        })))
        .expect(1)
        .mount(&app.provider)
        .await;

    let mut request = credit_card_request();
    request["splitPayment"] = json!(true);
    request["companyId"] = json!(42);
    request["currencyId"] = json!("ARS");

    let response = app
        .client
        .post(app.url("/payments"))
        .json(&request)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["id"], "136522115-split-42");
    assert_eq!(body["transactionAmount"], 1000.0);

    let record = app
        .payments
        .find("136522115-split-42")
        .await
        .unwrap()
        .expect("Payment was not recorded");
    assert_eq!(record.total_amount, 1000.0);
    assert_eq!(record.commission, 100.0);
    assert_eq!(record.net_amount, 900.0);
}

#[tokio::test]
async fn split_payment_for_an_unauthorized_tenant_conflicts() {
    let app = TestApp::spawn().await;
    app.seed_tenant(42, "Clinic FortyTwo").await;

    let mut request = credit_card_request();
    request["splitPayment"] = json!(true);
    request["companyId"] = json!(42);

    let response = app
        .client
        .post(app.url("/payments"))
        .json(&request)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn direct_card_payment_goes_through_the_orders_api() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .and(header(
            "Authorization",
            format!("Bearer {}", PLATFORM_TOKEN).as_str(),
        ))
        .and(header_exists("X-Idempotency-Key"))
        .and(body_string_contains("\"external_reference\""))
        .and(body_string_contains("\"total_amount\":\"1000.00\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "ORD01HRYFWNYRE1MR1E60MT3KSDYK",
            "total_paid_amount": "1000.00",
            "created_date": "2024-05-03T10:00:00.000-04:00",
            "last_updated_date": "2024-05-03T10:00:05.000-04:00",
            "transactions": {
                "payments": [{
                    "id": 74100962179i64,
                    "status": "approved",
                    "status_detail": "accredited",
                    "payment_method": { "id": "visa", "type": "credit_card" }
                }]
            }
        })))
        .expect(1)
        .mount(&app.provider)
        .await;

    let response = app
        .client
        .post(app.url("/payments"))
        .json(&credit_card_request())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["id"], "ORD01HRYFWNYRE1MR1E60MT3KSDYK");
    assert_eq!(body["status"], "approved");
    assert_eq!(body["statusDetail"], "accredited");
    assert_eq!(body["paymentMethodId"], "visa");
    assert_eq!(body["paymentTypeId"], "credit_card");

    let record = app
        .payments
        .find("ORD01HRYFWNYRE1MR1E60MT3KSDYK")
        .await
        .unwrap()
        .expect("Payment was not recorded");
    assert_eq!(record.total_amount, 1000.0);
    assert_eq!(record.commission, 0.0);
    assert_eq!(record.net_amount, 1000.0);
}

#[tokio::test]
async fn malformed_order_response_is_a_bad_gateway_and_records_nothing() {
    let app = TestApp::spawn().await;

    // Order acknowledged but the payment leg is missing.
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "ORDBROKEN",
            "transactions": { "payments": [] }
        })))
        .mount(&app.provider)
        .await;

    let response = app
        .client
        .post(app.url("/payments"))
        .json(&credit_card_request())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 502);

    assert!(app.payments.find("ORDBROKEN").await.unwrap().is_none());
}

#[tokio::test]
async fn provider_rejection_surfaces_as_bad_gateway() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "invalid access token",
            "error": "bad_request",
            "status": 400
        })))
        .mount(&app.provider)
        .await;

    let response = app
        .client
        .post(app.url("/payments"))
        .json(&account_money_request())
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert!(body["details"]
        .as_str()
        .unwrap_or_default()
        .contains("invalid access token"));
}

#[tokio::test]
async fn request_validation_failures_are_unprocessable() {
    let app = TestApp::spawn().await;

    let mut request = account_money_request();
    request["payer"]["email"] = json!("not-an-email");

    let response = app
        .client
        .post(app.url("/payments"))
        .json(&request)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn split_payment_without_a_company_id_is_rejected() {
    let app = TestApp::spawn().await;

    let mut request = credit_card_request();
    request["splitPayment"] = json!(true);

    let response = app
        .client
        .post(app.url("/payments"))
        .json(&request)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unknown_payment_modality_is_rejected() {
    let app = TestApp::spawn().await;

    let mut request = account_money_request();
    request["paymentTypeId"] = json!("bitcoin");
    request["paymentMethodId"] = json!("bitcoin");

    let response = app
        .client
        .post(app.url("/payments"))
        .json(&request)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn stored_payments_can_be_looked_up() {
    let app = TestApp::spawn().await;

    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "136522115-lookup",
            "operation_type": "regular_payment",
            "date_created": "2024-05-01T12:00:00.000-04:00"
        })))
        .mount(&app.provider)
        .await;

    app.client
        .post(app.url("/payments"))
        .json(&account_money_request())
        .send()
        .await
        .expect("Failed to create payment");

    let response = app
        .client
        .get(app.url("/payments/136522115-lookup"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Invalid body");
    assert_eq!(body["id"], "136522115-lookup");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["totalAmount"], 150.0);
    assert_eq!(body["payerEmail"], "luis.fernandez@example.com");
}

#[tokio::test]
async fn looking_up_an_unknown_payment_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/payments/does-not-exist"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 404);
}
