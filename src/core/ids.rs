//! Lineage run identifiers.

use uuid::Uuid;

/// Generate a fresh run id for a step execution.
///
/// UUIDv7: the leading 48 bits hold Unix milliseconds, so ids sort by
/// creation time across processes; the remainder is random.
pub fn make_step_run_id() -> Uuid {
    Uuid::now_v7()
}
