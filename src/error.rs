use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Client-facing failures. Rendered with the content API's error envelope
/// so callers see one shape whether the gateway or the upstream answered.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required to access AI features.")]
    Unauthorized,

    #[error("Rate limit exceeded. Please try again later.")]
    TooManyRequests {
        retry_after: u64,
        limit: u32,
        window_ms: u64,
    },

    #[error("Request body exceeds the gateway limit.")]
    PayloadTooLarge,

    #[error("Upstream content API is unavailable.")]
    BadGateway,

    #[error("Upstream content API timed out.")]
    GatewayTimeout,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub status: u16,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<RetryDetails>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryDetails {
    pub retry_after: u64,
    pub limit: u32,
    pub window_ms: u64,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadGateway => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UnauthorizedError",
            ApiError::TooManyRequests { .. } => "TooManyRequestsError",
            ApiError::PayloadTooLarge => "PayloadTooLargeError",
            ApiError::BadGateway => "BadGatewayError",
            ApiError::GatewayTimeout => "GatewayTimeoutError",
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let details = match self {
            ApiError::TooManyRequests {
                retry_after,
                limit,
                window_ms,
            } => Some(RetryDetails {
                retry_after: *retry_after,
                limit: *limit,
                window_ms: *window_ms,
            }),
            _ => None,
        };

        ErrorEnvelope {
            error: ErrorBody {
                status: self.status().as_u16(),
                name: self.name().to_string(),
                message: self.to_string(),
                details,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.envelope())).into_response();
        if let ApiError::TooManyRequests { retry_after, .. } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn too_many_requests_envelope_shape() {
        let err = ApiError::TooManyRequests {
            retry_after: 59,
            limit: 100,
            window_ms: 60_000,
        };
        let body = serde_json::to_value(err.envelope()).unwrap();
        assert_eq!(
            body,
            json!({
                "error": {
                    "status": 429,
                    "name": "TooManyRequestsError",
                    "message": "Rate limit exceeded. Please try again later.",
                    "details": { "retryAfter": 59, "limit": 100, "windowMs": 60000 }
                }
            })
        );
    }

    #[test]
    fn unauthorized_envelope_has_no_details() {
        let body = serde_json::to_value(ApiError::Unauthorized.envelope()).unwrap();
        assert_eq!(body["error"]["status"], 401);
        assert_eq!(body["error"]["name"], "UnauthorizedError");
        assert_eq!(
            body["error"]["message"],
            "Authentication required to access AI features."
        );
        assert!(body["error"].get("details").is_none());
    }

    #[test]
    fn retry_after_header_is_set() {
        let response = ApiError::TooManyRequests {
            retry_after: 12,
            limit: 10,
            window_ms: 60_000,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");
    }
}
