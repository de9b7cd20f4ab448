//! Catalog errors.

use std::fmt;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Where a catalog operation failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    /// Catalog operation, e.g. `upsert_output`
    pub operation: Option<&'static str>,
    /// Table and key of the row involved, e.g. `outputs/42`
    pub row: Option<String>,
    pub details: Option<String>,
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation: Some(operation),
            ..Default::default()
        }
    }

    pub fn row(mut self, table: &str, key: impl fmt::Display) -> Self {
        self.row = Some(format!("{table}/{key}"));
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("operation", self.operation),
            ("row", self.row.as_deref()),
            ("details", self.details.as_deref()),
        ];
        let mut sep = "";
        f.write_str("[")?;
        for (key, value) in fields {
            if let Some(value) = value {
                write!(f, "{sep}{key}={value}")?;
                sep = ", ";
            }
        }
        if self.retryable {
            write!(f, "{sep}retryable")?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Pool checkout or connection failure; retried by the Postgres catalog.
    #[error("Connection error: {message} {context}")]
    ConnectionError {
        message: String,
        context: ErrorContext,
    },

    /// A statement or transaction failed in the database.
    #[error("Query error: {message} {context}")]
    QueryError {
        message: String,
        context: ErrorContext,
    },

    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// A record broke a catalog constraint, e.g. an output for an unknown exposure.
    #[error("Data validation error: {message} {context}")]
    ValidationError {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message} {context}")]
    ConfigurationError {
        message: String,
        context: ErrorContext,
    },

    /// Undecodable rows, failed migrations and lost worker threads.
    #[error("Internal error: {message} {context}")]
    InternalError {
        message: String,
        context: ErrorContext,
    },
}

impl RepositoryError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Replace the context. A retryable error stays retryable.
    pub fn at(mut self, context: ErrorContext) -> Self {
        let slot = match &mut self {
            Self::ConnectionError { context, .. }
            | Self::QueryError { context, .. }
            | Self::NotFound { context, .. }
            | Self::ValidationError { context, .. }
            | Self::ConfigurationError { context, .. }
            | Self::InternalError { context, .. } => context,
        };
        let retryable = slot.retryable || context.retryable;
        *slot = ErrorContext { retryable, ..context };
        self
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionError { context, .. } | Self::QueryError { context, .. } => {
                context.retryable
            }
            _ => false,
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::result::Error> for RepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::NotFound => Self::not_found("Record not found"),
            Error::DatabaseError(kind, info) => {
                let context = ErrorContext::default().details(format!("{kind:?}"));
                // Postgres expects serialization failures to be replayed
                let context = if matches!(kind, DatabaseErrorKind::SerializationFailure) {
                    context.retryable()
                } else {
                    context
                };
                Self::QueryError {
                    message: info.message().to_string(),
                    context,
                }
            }
            Error::DeserializationError(e) => Self::internal(format!("Undecodable column: {e}")),
            other => Self::QueryError {
                message: other.to_string(),
                context: ErrorContext::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let ctx = ErrorContext::new("upsert_stats")
            .row("stats", "curve.json")
            .retryable();
        assert_eq!(
            ctx.to_string(),
            "[operation=upsert_stats, row=stats/curve.json, retryable]"
        );
        assert_eq!(ErrorContext::default().to_string(), "[]");
    }

    #[test]
    fn test_only_connection_errors_retry_by_default() {
        assert!(RepositoryError::connection("pool exhausted").is_retryable());
        assert!(!RepositoryError::not_found("missing").is_retryable());
        assert!(!RepositoryError::validation("bad").is_retryable());
    }

    #[test]
    fn test_at_keeps_retryable() {
        let err = RepositoryError::connection("reset").at(ErrorContext::new("get_connection"));
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Connection error: reset [operation=get_connection, retryable]"
        );

        let err = RepositoryError::validation("unknown exposure")
            .at(ErrorContext::new("upsert_output").row("outputs", 7));
        assert!(err.to_string().ends_with("[operation=upsert_output, row=outputs/7]"));
    }
}
