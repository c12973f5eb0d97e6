//! Common error types used across LogRaven services

use thiserror::Error;

/// Errors for infrastructure code that sits outside a single service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
