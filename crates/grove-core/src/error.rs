//! Error Types
//!
//! All fallible engine calls return [`StoreError`]. The adapter maps each
//! variant to a stable tagged discriminator; this type itself never crosses
//! the JSON-RPC boundary.

/// Engine error type.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error (data directory creation, backup copy, etc).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// ID did not resolve to an entry or node.
    #[error("not found: {0}")]
    NotFound(String),
    /// ID is syntactically malformed.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// Prefix is not declared in the configuration.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),
    /// Root was marked obsolete with no `[✓ID]` correction reference.
    #[error("missing correction reference on {0}")]
    MissingCorrectionRef(String),
    /// Caller's role is insufficient for the requested operation.
    #[error("role denied: {0}")]
    RoleDenied(String),
    /// The integrity check failed; only reads are permitted.
    #[error("store corrupted: {0}")]
    Corrupted(String),
    /// An obsolete chain loops back on itself.
    #[error("obsolete cycle detected starting at {0}")]
    ObsoleteCycle(String),
    /// Content exceeds the configured length budget for its depth.
    #[error("content too long for depth {depth}: {len} > {max}")]
    ContentTooLong {
        /// Offending depth.
        depth: usize,
        /// Actual length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Write content was empty.
    #[error("content must not be empty")]
    ContentEmpty,
    /// Initialization error (data directory resolution, etc).
    #[error("initialization error: {0}")]
    Init(String),
}

impl StoreError {
    /// Stable discriminator used by the adapter to tag JSON-RPC error payloads.
    ///
    /// This is the only part of `StoreError` that is meant to be observed
    /// outside the engine; the `Display` message is for logs, not wire output.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "database",
            StoreError::Io(_) => "io",
            StoreError::NotFound(_) => "not_found",
            StoreError::InvalidId(_) => "invalid_id",
            StoreError::InvalidPrefix(_) => "invalid_prefix",
            StoreError::MissingCorrectionRef(_) => "missing_correction_ref",
            StoreError::RoleDenied(_) => "role_denied",
            StoreError::Corrupted(_) => "corrupted",
            StoreError::ObsoleteCycle(_) => "obsolete_cycle",
            StoreError::ContentTooLong { .. } => "content_too_long",
            StoreError::ContentEmpty => "content_empty",
            StoreError::Init(_) => "init",
        }
    }
}

/// Engine result type.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_per_variant() {
        assert_eq!(StoreError::NotFound("X0001".into()).kind(), "not_found");
        assert_eq!(
            StoreError::MissingCorrectionRef("E0001".into()).kind(),
            "missing_correction_ref"
        );
        assert_eq!(StoreError::ContentEmpty.kind(), "content_empty");
    }
}
