use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderName;
use subtle::ConstantTimeEq;

use crate::http::AppError;
use crate::AppState;

const PAYMENT_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-payment-token");

/// Caller allowed to finalize donation payments. Open when no webhook token
/// is configured.
#[derive(Debug, Clone)]
pub struct PaymentGateway;

#[axum::async_trait]
impl FromRequestParts<AppState> for PaymentGateway {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.payment_webhook_token.as_deref() else {
            return Ok(PaymentGateway);
        };

        let provided = parts
            .headers
            .get(PAYMENT_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing payment token"))?;

        if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(AppError::unauthorized("invalid payment token"));
        }

        Ok(PaymentGateway)
    }
}
