//! Request-id propagation for the HTTP surface.

use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tag the request with an id and echo it on the response. An id supplied
/// by the caller wins, so one value traces a payment from the storefront
/// through the broker.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = match req.headers().get(REQUEST_ID_HEADER) {
        Some(value) => value.clone(),
        None => {
            let minted = mint_request_id();
            req.headers_mut().insert(REQUEST_ID_HEADER, minted.clone());
            minted
        }
    };

    let mut response = next.run(req).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
    response
}

fn mint_request_id() -> HeaderValue {
    HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("-"))
}
