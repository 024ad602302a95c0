use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::TailorError;

const INTERNAL_MESSAGE: &str = "Failed to process the document";
const UPSTREAM_MESSAGE: &str =
    "Tailoring failed; the text-generation service did not return a usable result";

impl TailorError {
    pub fn status(&self) -> StatusCode {
        match self {
            TailorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TailorError::MalformedPackage(_) | TailorError::NoContentFound => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TailorError::InvalidAiResponse(_) | TailorError::CollaboratorFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            TailorError::StructuralCorruption(_) | TailorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Lets handlers return `Result<T, TailorError>`. Internal and upstream detail is logged,
/// never sent.
impl IntoResponse for TailorError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            TailorError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                INTERNAL_MESSAGE.to_string()
            }
            TailorError::StructuralCorruption(msg) => {
                tracing::error!("Structural corruption escaped the pipeline: {msg}");
                INTERNAL_MESSAGE.to_string()
            }
            TailorError::InvalidAiResponse(msg) | TailorError::CollaboratorFailed(msg) => {
                tracing::warn!(code = self.kind(), "Tailoring failed: {msg}");
                UPSTREAM_MESSAGE.to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.kind(),
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            TailorError::InvalidInput("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TailorError::NoContentFound.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            TailorError::InvalidAiResponse("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            TailorError::Internal(anyhow::anyhow!("secret path /etc/x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    async fn body_of(err: TailorError) -> serde_json::Value {
        let body = axum::body::to_bytes(err.into_response().into_body(), 4096)
            .await
            .expect("body");
        serde_json::from_slice(&body).expect("json")
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let v = body_of(TailorError::Internal(anyhow::anyhow!("secret path /etc/x"))).await;
        assert_eq!(v["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(v["error"]["message"], INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn upstream_detail_is_not_leaked() {
        let failed = TailorError::CollaboratorFailed(
            "API error (status 403): key AIza-secret rejected for \
             https://generativelanguage.googleapis.com/v1beta/models/x:generateContent"
                .to_string(),
        );
        let v = body_of(failed).await;
        assert_eq!(v["error"]["message"], UPSTREAM_MESSAGE);
        assert!(!v.to_string().contains("googleapis"));

        let v = body_of(TailorError::InvalidAiResponse("raw model chatter".to_string())).await;
        assert_eq!(v["error"]["message"], UPSTREAM_MESSAGE);
    }

    #[tokio::test]
    async fn input_errors_keep_their_message() {
        let v = body_of(TailorError::InvalidInput("No file uploaded".to_string())).await;
        assert_eq!(v["error"]["code"], "INVALID_INPUT");
        assert!(v["error"]["message"]
            .as_str()
            .unwrap_or_default()
            .contains("No file uploaded"));
    }
}
