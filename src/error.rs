use thiserror::Error;

/// Error kinds surfaced by the detection engine and the user directory.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidArgument,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        AppError::Conflict(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        AppError::InvalidArgument(what.into())
    }
}

/// Maps unique-index rejections to `Conflict` and foreign-key rejections to
/// `NotFound`; everything else is `Internal`.
pub(crate) fn from_sqlx(e: sqlx::Error, action: &'static str) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_foreign_key_violation() {
            return AppError::not_found("referenced user does not exist");
        }
        if db.is_unique_violation() {
            let what = match db.constraint() {
                Some(c) if c.contains("username") => "username already exists",
                Some(c) if c.contains("email") => "email already registered",
                _ => "duplicate value",
            };
            return AppError::conflict(what);
        }
    }
    AppError::Internal(anyhow::Error::new(e).context(action))
}

pub type AppResult<T> = Result<T, AppError>;
