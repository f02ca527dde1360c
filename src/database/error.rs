use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use serde::Serialize;
use sqlx::error::ErrorKind;
use warp::http::StatusCode;

/// Error categories surfaced at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HtmlError {
    Validation,
    Conflict,
    EmptyAggregation,
    Unauthorized,
    InvalidSession,
    Forbidden,
    NotFound,
    InternalServerError,
}

impl HtmlError {
    pub fn status(&self) -> StatusCode {
        match self {
            HtmlError::Validation | HtmlError::Conflict | HtmlError::EmptyAggregation => {
                StatusCode::BAD_REQUEST
            }
            HtmlError::Unauthorized | HtmlError::InvalidSession => StatusCode::UNAUTHORIZED,
            HtmlError::Forbidden => StatusCode::FORBIDDEN,
            HtmlError::NotFound => StatusCode::NOT_FOUND,
            HtmlError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            HtmlError::Validation => "Invalid input",
            HtmlError::Conflict => "Conflicting request",
            HtmlError::EmptyAggregation => "Shopping cart is empty",
            HtmlError::Unauthorized => "Authentication credentials were not provided",
            HtmlError::InvalidSession => "Invalid session",
            HtmlError::Forbidden => "You don't have permission to perform this action",
            HtmlError::NotFound => "Not found",
            HtmlError::InternalServerError => "Internal server error",
        }
    }

    pub fn new(self, info: &str) -> Error {
        Error {
            kind: self,
            info: info.to_owned(),
            fields: FieldErrors::default(),
        }
    }

    pub fn default(self) -> Error {
        self.new(self.message())
    }
}

/// Per-field validation messages, keyed by the offending input field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|messages| messages.as_slice())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// `Ok(())` when nothing was recorded, a validation error otherwise.
    pub fn into_result(self) -> Result<(), Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(self))
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {info}")]
pub struct Error {
    pub kind: HtmlError,
    pub info: String,
    pub fields: FieldErrors,
}

impl Error {
    pub fn validation(fields: FieldErrors) -> Self {
        Self {
            kind: HtmlError::Validation,
            info: HtmlError::Validation.message().to_owned(),
            fields,
        }
    }

    pub fn field(field: &str, message: &str) -> Self {
        let mut fields = FieldErrors::default();
        fields.add(field, message);
        Self::validation(fields)
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl warp::reject::Reject for Error {}

/// Wraps a storage failure before it is exposed to callers.
#[derive(Debug)]
pub struct QueryError {
    kind: HtmlError,
    info: String,
    constraint: Option<String>,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            kind: HtmlError::InternalServerError,
            info,
            constraint: None,
        }
    }

    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    pub fn kind(&self) -> HtmlError {
        self.kind
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => {
                let kind = match e.kind() {
                    ErrorKind::UniqueViolation => HtmlError::Conflict,
                    ErrorKind::ForeignKeyViolation
                    | ErrorKind::CheckViolation
                    | ErrorKind::NotNullViolation => HtmlError::Validation,
                    _ => HtmlError::InternalServerError,
                };
                Self {
                    kind,
                    info: e.message().to_owned(),
                    constraint: e.constraint().map(|c| c.to_owned()),
                }
            }
            sqlx::Error::RowNotFound => Self {
                kind: HtmlError::NotFound,
                info: String::from("RowNotFound"),
                constraint: None,
            },
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(String::from("Worker crashed")),
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        match value.kind {
            HtmlError::InternalServerError => {
                log::error!("Query failed: {}", value.info);
                HtmlError::InternalServerError.default()
            }
            kind => {
                log::debug!("Query rejected ({kind:?}): {}", value.info);
                kind.default()
            }
        }
    }
}

#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl From<TypeError> for Error {
    fn from(value: TypeError) -> Self {
        HtmlError::Validation.new(&value.info)
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}
