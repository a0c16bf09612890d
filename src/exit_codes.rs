//! Stable exit codes for the taskpilot CLI.

/// Every task completed.
pub const OK: i32 = 0;
/// Setup or runtime error (missing directories, config, LLM, I/O).
pub const ERROR: i32 = 1;
/// The agent reported a failure or an unknown result.
pub const TASK_FAILED: i32 = 2;
/// A confirmation was denied; the run stopped at a subtask and can be resumed.
pub const PARKED: i32 = 3;
/// Interrupted with Ctrl+C.
pub const CANCELLED: i32 = 130;
