use thiserror::Error;

/// Convenience alias for `Result<T, MergeError>`.
pub type MergeResult<T> = Result<T, MergeError>;

/// Error classification for retry/escalation decisions.
///
/// - `UserError`   : malformed statement shape, incompatible values (4xx equivalent)
/// - `Transient`   : shard I/O failure, resource exhaustion; client MAY retry
/// - `InternalBug` : contract violation inside the proxy; triggers alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Transient,
    InternalBug,
}

/// Errors raised while building or iterating a merged result.
#[derive(Error, Debug)]
pub enum MergeError {
    /// Sources empty or disagreeing on column shape, or an item that does
    /// not resolve against the result columns.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    /// Value access without a current row.
    #[error("Premature access: {0}")]
    PrematureAccess(String),

    #[error("Column index out of bounds: {0}")]
    ColumnOutOfBounds(usize),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// Failure reported by a shard's row cursor, surfaced unchanged.
    #[error("Shard {shard} source error: {reason}")]
    Source { shard: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resource exhausted: {reason} (retry after {retry_after_ms}ms)")]
    ResourceExhausted { reason: String, retry_after_ms: u64 },

    /// Always carries a unique `error_code` and `debug_context` for post-mortem.
    #[error("InternalBug [{error_code}]: {message} | context: {debug_context}")]
    InternalBug {
        error_code: &'static str,
        message: String,
        debug_context: String,
    },
}

impl MergeError {
    /// Classify this error for retry/escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::Configuration(_) => ErrorKind::UserError,
            MergeError::TypeMismatch { .. } => ErrorKind::UserError,
            MergeError::UnknownColumn(_) => ErrorKind::UserError,
            MergeError::ColumnOutOfBounds(_) => ErrorKind::UserError,

            MergeError::Source { .. } => ErrorKind::Transient,
            MergeError::Io(_) => ErrorKind::Transient,
            MergeError::ResourceExhausted { .. } => ErrorKind::Transient,

            MergeError::PrematureAccess(_) => ErrorKind::InternalBug,
            MergeError::InternalBug { .. } => ErrorKind::InternalBug,
        }
    }

    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    pub fn is_internal_bug(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalBug)
    }

    /// Map to a SQLSTATE code for the dispatch layer.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            MergeError::Configuration(_) => "42000", // syntax_error_or_access_rule_violation
            MergeError::TypeMismatch { .. } => "42804", // datatype_mismatch
            MergeError::UnknownColumn(_) => "42703", // undefined_column
            MergeError::ColumnOutOfBounds(_) => "42703",
            MergeError::Source { .. } => "08006", // connection_failure
            MergeError::Io(_) => "58030",         // io_error
            MergeError::ResourceExhausted { .. } => "53000", // insufficient_resources
            MergeError::PrematureAccess(_) => "24000", // invalid_cursor_state
            MergeError::InternalBug { .. } => "XX000",
        }
    }

    pub fn shard_failure(shard: usize, reason: impl Into<String>) -> Self {
        MergeError::Source {
            shard,
            reason: reason.into(),
        }
    }

    pub fn resource_exhausted(reason: impl Into<String>, retry_after_ms: u64) -> Self {
        MergeError::ResourceExhausted {
            reason: reason.into(),
            retry_after_ms,
        }
    }

    pub fn internal_bug(
        error_code: &'static str,
        message: impl Into<String>,
        debug_context: impl Into<String>,
    ) -> Self {
        MergeError::InternalBug {
            error_code,
            message: message.into(),
            debug_context: debug_context.into(),
        }
    }

    /// Add context string to an error, **preserving error classification**.
    pub fn with_context(self, ctx: impl Into<String>) -> Self {
        let ctx = ctx.into();
        match self {
            MergeError::Configuration(msg) => MergeError::Configuration(format!("{ctx}: {msg}")),
            MergeError::PrematureAccess(msg) => {
                MergeError::PrematureAccess(format!("{ctx}: {msg}"))
            }
            MergeError::Source { shard, reason } => MergeError::Source {
                shard,
                reason: format!("{ctx}: {reason}"),
            },
            MergeError::ResourceExhausted {
                reason,
                retry_after_ms,
            } => MergeError::ResourceExhausted {
                reason: format!("{ctx}: {reason}"),
                retry_after_ms,
            },
            MergeError::InternalBug {
                error_code,
                message,
                debug_context,
            } => MergeError::InternalBug {
                error_code,
                message: format!("{ctx}: {message}"),
                debug_context,
            },
            // Structured variants carry no free-form text to prefix.
            other => other,
        }
    }

    /// Emit a structured log entry for internal bugs.
    pub fn log_if_fatal(&self) {
        if let MergeError::InternalBug {
            error_code,
            message,
            debug_context,
        } = self
        {
            tracing::error!(
                error_code = error_code,
                sqlstate = self.sqlstate(),
                debug_context = debug_context.as_str(),
                "FATAL [{}]: {} | context: {}",
                error_code,
                message,
                debug_context
            );
        }
    }
}

/// Add context to a Result, preserving error classification.
/// Usage: `source.advance().ctx("stage=prime, shard=2")?`
pub trait ErrorContext<T> {
    fn ctx(self, context: &str) -> MergeResult<T>;
    fn ctx_with(self, f: impl FnOnce() -> String) -> MergeResult<T>;
}

impl<T, E: Into<MergeError>> ErrorContext<T> for Result<T, E> {
    fn ctx(self, context: &str) -> MergeResult<T> {
        self.map_err(|e| e.into().with_context(context))
    }
    fn ctx_with(self, f: impl FnOnce() -> String) -> MergeResult<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}
