use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request: {0}")]
    Validation(String),

    #[error("You Are Not Logged In")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Payment Not Verified")]
    PaymentNotVerified,

    #[error("Transaction Has Been Used Before")]
    DuplicateTransaction,

    #[error("Incorrect Amount Paid")]
    AmountMismatch,

    // Provider unreachable or malformed; distinct from an explicit rejection.
    #[error("Payment Verification Failed")]
    PaymentVerificationFailed(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::PaymentNotVerified => StatusCode::PAYMENT_REQUIRED,
            AppError::DuplicateTransaction => StatusCode::CONFLICT,
            AppError::AmountMismatch => StatusCode::PAYMENT_REQUIRED,
            AppError::PaymentVerificationFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Causes stay server-side; clients only see the generic message.
        match &self {
            AppError::PaymentVerificationFailed(detail) => {
                tracing::error!(detail = %detail, "payment verification failed");
            }
            AppError::DbError(err) => tracing::error!(error = %err, "database error"),
            AppError::OrmError(err) => tracing::error!(error = %err, "orm error"),
            AppError::Internal(err) => tracing::error!(error = %err, "internal error"),
            _ => {}
        }

        let message = self.to_string();
        let body = ApiResponse::failure(
            message.clone(),
            ErrorData { error: message },
            Some(Meta::empty()),
        );

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
