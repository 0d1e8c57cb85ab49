use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{}", Labeled("Not found", .0))]
    NotFound(String),
    #[error("{}", Labeled("Invalid input", .0))]
    Validation(String),
    #[error("{}", Labeled("Conflict", .0))]
    Constraint(String),
}

impl AppError {
    /// Short machine-friendly tag, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Io(_) => "io",
            AppError::Db(_) => "db",
            AppError::Json(_) => "json",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Constraint(_) => "constraint",
        }
    }
}

struct Labeled<'a>(&'static str, &'a str);

impl fmt::Display for Labeled<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Labeled(label, message) = self;
        if message.contains('\n') {
            write!(f, "{label}:\n{message}")
        } else {
            write!(f, "{label}: {message}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn display_prefixes_label() {
        let err = AppError::NotFound("goal id 7".to_string());
        assert_eq!(err.to_string(), "Not found: goal id 7");
    }

    #[test]
    fn display_breaks_multiline_messages() {
        let err = AppError::Validation("first\nsecond".to_string());
        assert_eq!(err.to_string(), "Invalid input:\nfirst\nsecond");
    }
}
