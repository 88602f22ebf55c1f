use std::sync::Arc;

use async_graphql::{ErrorExtensions, Value};
use sea_orm::DbErr;
use thiserror::Error;

type GqlError = async_graphql::Error;

use crate::timesheet::FieldErrors;

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("login required")]
    Unauthenticated,
    #[error("insufficient permissions")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("validation failed")]
    InvalidFields(FieldErrors),
    #[error("internal server error")]
    Internal(Arc<anyhow::Error>),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Validation(_) | ApiError::InvalidFields(_) => "VALIDATION",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        Self::Internal(Arc::new(err))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<DbErr> for ApiError {
    fn from(value: DbErr) -> Self {
        Self::internal(anyhow::Error::new(value).context("database error"))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(value)
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> GqlError {
        GqlError::new(self.to_string()).extend_with(|_err, e| {
            e.set("code", self.code());
            if let ApiError::InvalidFields(fields) = self {
                let map = fields
                    .iter()
                    .map(|(field, message)| {
                        (async_graphql::Name::new(field), Value::from(message.as_str()))
                    })
                    .collect();
                e.set("fields", Value::Object(map));
            }
        })
    }
}
