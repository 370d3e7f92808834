use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::CbirError;

/// API错误类型
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn unauthorized() -> Self {
        Self { status: StatusCode::UNAUTHORIZED, error: anyhow::anyhow!("token 无效") }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, format!("Something went wrong: {}", self.error)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        let status = match error.downcast_ref::<CbirError>() {
            Some(CbirError::RecordNotFound(_)) => StatusCode::NOT_FOUND,
            Some(
                CbirError::UnsupportedFeatureType(_)
                | CbirError::FeatureKindMismatch { .. }
                | CbirError::UnreadableImage { .. }
                | CbirError::EmptyDescriptors,
            ) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, error }
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CbirError::RecordNotFound("a".into()), StatusCode::NOT_FOUND),
            (CbirError::UnsupportedFeatureType("X".into()), StatusCode::BAD_REQUEST),
            (CbirError::unreadable("<memory>", "bad"), StatusCode::BAD_REQUEST),
            (CbirError::ExtractorUnavailable, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
        assert_eq!(AppError::unauthorized().status(), StatusCode::UNAUTHORIZED);
    }
}
