use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use wayfare_core::{DateRange, HandshakeError};
use wayfare_store::wire::ErrorBody;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError {
        message: String,
        conflicts: Vec<DateRange>,
    },
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, conflicts) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::ConflictError { message, conflicts } => (StatusCode::CONFLICT, message, Some(conflicts)),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), None)
            }
        };

        (status, Json(ErrorBody { error, conflicts })).into_response()
    }
}

impl From<HandshakeError> for AppError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Validation(_)
            | HandshakeError::TerminalPayment(_)
            | HandshakeError::InvalidTransition { .. } => AppError::ValidationError(err.to_string()),
            HandshakeError::NotFound(msg) => AppError::NotFoundError(msg),
            HandshakeError::Conflict { ref conflicts, .. } => AppError::ConflictError {
                conflicts: conflicts.clone(),
                message: err.to_string(),
            },
            HandshakeError::Transient(msg) => AppError::InternalServerError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_handshake_errors_map_to_status() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        ).unwrap();
        let cases = [
            (HandshakeError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (HandshakeError::NotFound("hold".into()), StatusCode::NOT_FOUND),
            (HandshakeError::Conflict { unit_id: "R".into(), conflicts: vec![range] }, StatusCode::CONFLICT),
            (HandshakeError::Transient("lock".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
