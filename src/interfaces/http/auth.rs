//! API-key gate for the PSP tool endpoints.

use crate::domain::error::{AppError, Result};
use actix_web::HttpRequest;

pub const PSP_API_KEY_HEADER: &str = "x-psp-api-key";
pub const UNAUTHORIZED_MESSAGE: &str = "Authentication required";

/// Accepts the request only when its `x-psp-api-key` header equals `expected`.
pub fn require_psp_api_key(req: &HttpRequest, expected: &str) -> Result<()> {
    let provided = req
        .headers()
        .get(PSP_API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if !expected.is_empty() && key == expected => Ok(()),
        _ => Err(AppError::Unauthorized(UNAUTHORIZED_MESSAGE.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_matching_key_passes() {
        let req = TestRequest::default()
            .insert_header((PSP_API_KEY_HEADER, "psp-development-key"))
            .to_http_request();
        assert!(require_psp_api_key(&req, "psp-development-key").is_ok());
    }

    #[test]
    fn test_missing_or_wrong_key_is_rejected() {
        let missing = TestRequest::default().to_http_request();
        let err = require_psp_api_key(&missing, "psp-development-key").unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized: Authentication required");

        let wrong = TestRequest::default()
            .insert_header((PSP_API_KEY_HEADER, "guess"))
            .to_http_request();
        assert!(require_psp_api_key(&wrong, "psp-development-key").is_err());
    }
}
