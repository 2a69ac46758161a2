//! Storage sentinel errors.
//!
//! Repositories translate backend-specific failures into this set before
//! anything reaches the workflow layer. The workflow decides what a sentinel
//! means in its own business context.

/// Result type returned by every repository method
pub type RepoResult<T> = std::result::Result<T, RepoError>;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    /// The row does not exist, or a conditional update matched nothing
    #[error("record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write
    #[error("record conflicts with an existing one")]
    Conflict,

    /// Anything else the backend reported
    #[error("storage failure: {context}")]
    Internal {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RepoError {
    pub fn internal<S: Into<String>>(context: S) -> Self {
        Self::Internal { context: context.into(), source: None }
    }

    /// Classify a sqlx failure.
    ///
    /// Foreign-key violations surface as `NotFound`: the referenced parent row
    /// is missing.
    pub fn from_sqlx(err: sqlx::Error, context: &str) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => Self::Conflict,
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                Self::NotFound
            }
            other => Self::Internal { context: context.to_string(), source: Some(Box::new(other)) },
        }
    }

    /// Stable label for logs and error metadata.
    pub fn sentinel(&self) -> &'static str {
        match self {
            RepoError::NotFound => "not_found",
            RepoError::Conflict => "conflict",
            RepoError::Internal { .. } => "internal",
        }
    }
}
