use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::core::JunctionError;

pub struct ApiError(pub JunctionError);

impl From<JunctionError> for ApiError {
    fn from(err: JunctionError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            JunctionError::TableNotFound(_)
            | JunctionError::UnknownTable(_)
            | JunctionError::StepNotFound(_) => StatusCode::NOT_FOUND,
            JunctionError::JoinConfigError(_)
            | JunctionError::SelectionError(_)
            | JunctionError::StepReferenceError { .. }
            | JunctionError::StepExecutionError { .. }
            | JunctionError::ExportError(_) => StatusCode::BAD_REQUEST,
            JunctionError::CatalogError { .. } => StatusCode::BAD_GATEWAY,
            JunctionError::IoError(_)
            | JunctionError::ArrowError(_)
            | JunctionError::ConfigParsingError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(JunctionError::UnknownTable("a.b.c".into()), StatusCode::NOT_FOUND)]
    #[case(JunctionError::StepNotFound(3), StatusCode::NOT_FOUND)]
    #[case(JunctionError::JoinConfigError("x".into()), StatusCode::BAD_REQUEST)]
    #[case(JunctionError::SelectionError("x".into()), StatusCode::BAD_REQUEST)]
    #[case(JunctionError::catalog("pg", "down"), StatusCode::BAD_GATEWAY)]
    #[case(JunctionError::IoError("disk".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status_mapping(#[case] err: JunctionError, #[case] status: StatusCode) {
        assert_eq!(ApiError(err).status(), status);
    }
}
