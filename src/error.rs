use thiserror::Error;

pub type Result<T, E = VoteError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Voting not currently allowed: {0}")]
    InvalidState(String),

    #[error("Option {id_option} does not belong to event {id_event}")]
    InvalidOption { id_event: i32, id_option: i32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error("Storage unavailable: {0}")]
    Transient(String),

    /// A storage fault that a retry will not fix, such as a row that fails to decode.
    #[error("Storage error: {0}")]
    Internal(String),
}

impl VoteError {
    /// Only storage failures are worth retrying; every other variant is a final answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VoteError::Transient(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VoteError::Forbidden(_) => "Forbidden",
            VoteError::InvalidState(_) => "InvalidState",
            VoteError::InvalidOption { .. } => "InvalidOption",
            VoteError::NotFound(_) => "NotFound",
            VoteError::Invalid(_) => "Invalid",
            VoteError::Transient(_) => "Transient",
            VoteError::Internal(_) => "Internal",
        }
    }
}

impl VoteError {
    /// Classifies a Postgres error by its SQLSTATE code.
    pub fn from_sqlstate(code: &str, message: &str) -> Self {
        let message = message.to_owned();

        match code {
            // foreign_key_violation: the event or option was deleted underneath the write.
            "23503" => VoteError::NotFound(message),
            "23505" => VoteError::InvalidState(message),
            c if c.starts_with("23") => VoteError::Invalid(message),
            // connection, resources, serialization failures and deadlocks.
            c if c.starts_with("08") || c.starts_with("40") || c.starts_with("53") || c.starts_with("57") => {
                VoteError::Transient(message)
            }
            _ => VoteError::Internal(message),
        }
    }
}

impl From<sqlx::Error> for VoteError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => match db.code() {
                Some(code) => VoteError::from_sqlstate(&code, db.message()),
                None => VoteError::Internal(db.message().to_owned()),
            },
            sqlx::Error::RowNotFound => VoteError::NotFound("row".to_owned()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => VoteError::Transient(e.to_string()),
            _ => VoteError::Internal(e.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for VoteError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        VoteError::Transient("storage call timed out".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(VoteError::Transient("io".into()).is_retryable());
        assert!(!VoteError::Forbidden("admin".into()).is_retryable());
        assert!(!VoteError::InvalidOption { id_event: 1, id_option: 2 }.is_retryable());
        assert!(!VoteError::NotFound("event 3".into()).is_retryable());
    }

    #[test]
    fn messages_name_the_mismatch() {
        let e = VoteError::InvalidOption { id_event: 4, id_option: 9 };
        assert_eq!(e.to_string(), "Option 9 does not belong to event 4");
        assert_eq!(e.kind(), "InvalidOption");
    }

    #[test]
    fn constraint_violations_are_final() {
        let e = VoteError::from_sqlstate("23503", "violates foreign key constraint");
        assert!(matches!(e, VoteError::NotFound(_)));
        assert!(!e.is_retryable());

        assert!(matches!(VoteError::from_sqlstate("23505", "duplicate key"), VoteError::InvalidState(_)));
        assert!(matches!(VoteError::from_sqlstate("23514", "check"), VoteError::Invalid(_)));
        assert!(matches!(VoteError::from_sqlstate("42601", "syntax"), VoteError::Internal(_)));
    }

    #[test]
    fn contention_and_connection_loss_are_retryable() {
        assert!(VoteError::from_sqlstate("40001", "serialization failure").is_retryable());
        assert!(VoteError::from_sqlstate("40P01", "deadlock").is_retryable());
        assert!(VoteError::from_sqlstate("08006", "connection failure").is_retryable());
        assert!(VoteError::from(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn decode_failures_are_not_retryable() {
        let bad_id = "abc".parse::<u64>().unwrap_err();

        let e = VoteError::from(sqlx::Error::Decode(Box::new(bad_id)));
        assert_eq!(e.kind(), "Internal");
        assert!(!e.is_retryable());
        assert!(!VoteError::from(sqlx::Error::ColumnNotFound("id_user".into())).is_retryable());
        assert!(matches!(VoteError::from(sqlx::Error::RowNotFound), VoteError::NotFound(_)));
    }
}
