//! Error types module
//!
//! All fallible operations in the catalogue core return `AppError`. Each variant
//! self-describes how the routing layer should present it through
//! [`ErrorMetadata`]; the core itself never retries a failed write.

use std::io;

/// Severity an error is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Caller mistakes: bad input, missing records, denied roles
    Debug,
    /// Rejected commits and cross-tenant references
    Warn,
    /// Store or dependency failures
    Error,
}

/// How an error is presented to whoever called the core.
pub trait ErrorMetadata {
    /// Status a routing layer maps the error to
    fn http_status_code(&self) -> u16;

    /// Stable machine code (e.g. "OWNERSHIP_MISMATCH")
    fn error_code(&self) -> &'static str;

    /// True when repeating the same request may succeed
    fn is_recoverable(&self) -> bool;

    /// Hint shown next to the message
    fn suggested_action(&self) -> Option<&'static str>;

    /// Message safe to show outside the service
    fn client_message(&self) -> String;

    /// True when the internal message must not leak to clients
    fn is_sensitive(&self) -> bool;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ownership mismatch: {resolved} of {requested} requested items belong to the organisation and are active")]
    OwnershipMismatch { requested: usize, resolved: usize },

    #[error("Invitation expired: {0}")]
    InvitationExpired(String),

    #[error("Already a member of organisation {org_id}")]
    AlreadyMember { org_id: String },

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Too many operations in one transaction: {count} exceeds the limit of {max}")]
    TooManyOperations { count: usize, max: usize },

    #[error("Upstream dependency failed: {0}")]
    Upstream(String),

    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Database(String),

    #[error("Unexpected failure: {0}")]
    Internal(String),

    #[error("Unexpected failure: {message}")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(source: anyhow::Error) -> Self {
        let message = source.root_cause().to_string();
        AppError::InternalWithSource { message, source }
    }
}

impl From<io::Error> for AppError {
    fn from(e: io::Error) -> Self {
        AppError::Internal(format!("io: {}", e))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("record encoding: {}", e))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Fixed presentation of one error kind.
struct Presentation {
    status: u16,
    code: &'static str,
    recoverable: bool,
    action: Option<&'static str>,
    sensitive: bool,
    level: LogLevel,
}

const RETRY_LATER: Option<&str> = Some("Retry after a short delay");

impl Presentation {
    const fn caller(status: u16, code: &'static str, action: Option<&'static str>) -> Self {
        Self {
            status,
            code,
            recoverable: false,
            action,
            sensitive: false,
            level: LogLevel::Debug,
        }
    }

    const fn failure(status: u16, code: &'static str) -> Self {
        Self {
            status,
            code,
            recoverable: true,
            action: RETRY_LATER,
            sensitive: true,
            level: LogLevel::Error,
        }
    }

    fn of(err: &AppError) -> Self {
        match err {
            AppError::Validation(_) => {
                Self::caller(400, "VALIDATION_ERROR", Some("Correct the request and resend it"))
            }
            AppError::NotFound(_) => {
                Self::caller(404, "NOT_FOUND", Some("Check the identifier and the organisation"))
            }
            AppError::OwnershipMismatch { .. } => Self {
                level: LogLevel::Warn,
                ..Self::caller(
                    403,
                    "OWNERSHIP_MISMATCH",
                    Some("Only reference active items of your organisation"),
                )
            },
            AppError::InvitationExpired(_) => Self::caller(
                400,
                "INVITATION_EXPIRED",
                Some("Ask an organisation admin for a new invitation"),
            ),
            AppError::AlreadyMember { .. } => Self::caller(400, "ALREADY_MEMBER", None),
            AppError::TransactionFailed(_) => Self {
                action: Some("Reload the affected records before retrying"),
                level: LogLevel::Warn,
                ..Self::failure(409, "TRANSACTION_FAILED")
            },
            AppError::TooManyOperations { .. } => Self::caller(
                400,
                "TOO_MANY_OPERATIONS",
                Some("Split the request into smaller batches"),
            ),
            AppError::Upstream(_) => Self::failure(502, "UPSTREAM_DEPENDENCY_FAILURE"),
            AppError::Unauthorized(_) => {
                Self::caller(401, "UNAUTHORIZED", Some("Sign in and resend the request"))
            }
            AppError::Forbidden(_) => Self::caller(
                403,
                "FORBIDDEN",
                Some("Ask an organisation admin for the required role"),
            ),
            AppError::Conflict(_) => Self::caller(409, "CONFLICT", None),
            AppError::Database(_) => Self::failure(500, "DATABASE_ERROR"),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                Self::failure(500, "INTERNAL_ERROR")
            }
        }
    }
}

impl AppError {
    /// Short kind name, as reported next to the code.
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Validation(_) => "ValidationError",
            AppError::NotFound(_) => "NotFoundError",
            AppError::OwnershipMismatch { .. } => "OwnershipMismatchError",
            AppError::InvitationExpired(_) => "ExpiredError",
            AppError::AlreadyMember { .. } => "AlreadyMemberError",
            AppError::TransactionFailed(_) => "TransactionFailure",
            AppError::TooManyOperations { .. } => "TooManyOperationsError",
            AppError::Upstream(_) => "UpstreamDependencyFailure",
            AppError::Unauthorized(_) => "AuthenticationError",
            AppError::Forbidden(_) => "ForbiddenError",
            AppError::Conflict(_) => "ConflictError",
            AppError::Database(_) => "StoreError",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "InternalError",
        }
    }

    /// The message followed by up to five `caused by` lines.
    pub fn detailed_message(&self) -> String {
        let mut out = self.to_string();
        let mut next = std::error::Error::source(self);
        for depth in 0.. {
            let Some(cause) = next else { break };
            if depth == 5 {
                out.push_str("\n  (further causes omitted)");
                break;
            }
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            next = cause.source();
        }
        out
    }

    /// Emit this error at its own level under `context`.
    pub fn report(&self, context: &str) {
        let code = self.error_code();
        match self.log_level() {
            LogLevel::Debug => tracing::debug!(code, error = %self, "{}", context),
            LogLevel::Warn => tracing::warn!(code, error = %self, "{}", context),
            LogLevel::Error => {
                tracing::error!(code, error = %self.detailed_message(), "{}", context)
            }
        }
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        Presentation::of(self).status
    }

    fn error_code(&self) -> &'static str {
        Presentation::of(self).code
    }

    fn is_recoverable(&self) -> bool {
        Presentation::of(self).recoverable
    }

    fn suggested_action(&self) -> Option<&'static str> {
        Presentation::of(self).action
    }

    fn is_sensitive(&self) -> bool {
        Presentation::of(self).sensitive
    }

    fn log_level(&self) -> LogLevel {
        Presentation::of(self).level
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "The catalogue store is unavailable".to_string(),
            AppError::TransactionFailed(_) => {
                "The change could not be applied; no records were modified".to_string()
            }
            AppError::Upstream(_) => "A dependent service failed".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Something went wrong on our side".to_string()
            }
            AppError::OwnershipMismatch {
                requested,
                resolved,
            } => format!(
                "Only {} of {} referenced items could be resolved; nothing was changed",
                resolved, requested
            ),
            AppError::TooManyOperations { count, max } => format!(
                "Operation touches {} records but at most {} can change atomically",
                count, max
            ),
            AppError::AlreadyMember { .. } => "User already in organisation".to_string(),
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::InvitationExpired(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg) => msg.clone(),
        }
    }
}
