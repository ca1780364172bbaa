//! Observable events
//!
//! Events are explicit and typed; the logger only ever sees their string form.

use std::fmt;

/// Observable events in the storage service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded
    ConfigLoaded,
    /// HTTP server bound and serving
    Serving,

    // Collections
    /// A collection was instantiated and cached by the registry
    CollectionOpened,
    /// Default collection type changed
    DefaultTypeChanged,

    // Search
    /// Search request received
    SearchBegin,
    /// One join step resolved for one driving record
    JoinResolved,
    /// Search materialized successfully
    SearchComplete,
    /// Search aborted
    SearchFailed,

    // Transactions
    /// Transaction id first used
    TransactionBegin,
    /// Transaction committed
    TransactionCommit,
    /// Transaction rolled back
    TransactionRollback,
    /// Some journaled records could not be restored
    TransactionRollbackFailed,

    // HTTP
    /// Request ended in an error response
    RequestFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::Serving => "STORAGE_SERVING",

            Event::CollectionOpened => "COLLECTION_OPENED",
            Event::DefaultTypeChanged => "DEFAULT_TYPE_CHANGED",

            Event::SearchBegin => "SEARCH_BEGIN",
            Event::JoinResolved => "JOIN_RESOLVED",
            Event::SearchComplete => "SEARCH_COMPLETE",
            Event::SearchFailed => "SEARCH_FAILED",

            Event::TransactionBegin => "TRANSACTION_BEGIN",
            Event::TransactionCommit => "TRANSACTION_COMMIT",
            Event::TransactionRollback => "TRANSACTION_ROLLBACK",
            Event::TransactionRollbackFailed => "TRANSACTION_ROLLBACK_FAILED",

            Event::RequestFailed => "REQUEST_FAILED",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::SearchFailed | Event::TransactionRollbackFailed | Event::RequestFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
