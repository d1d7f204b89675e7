use serde_json::Value as JsonValue;

use crate::results::Row;

/// What an operation's output becomes when the caller asked for its effects to be
/// rolled back instead of committed.
///
/// Write counts describe persisted effects, so they collapse to zero. Rows and
/// routine results describe what the statement produced and are handed back as-is.
pub trait TxOutcome: Sized {
    /// The output reported after a successful statement whose transaction was
    /// rolled back on request.
    #[must_use]
    fn discarded(self) -> Self;
}

impl TxOutcome for u64 {
    fn discarded(self) -> Self {
        0
    }
}

impl TxOutcome for Vec<Row> {
    fn discarded(self) -> Self {
        self
    }
}

impl TxOutcome for JsonValue {
    fn discarded(self) -> Self {
        self
    }
}
