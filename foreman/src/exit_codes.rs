//! Stable exit codes for foreman CLI commands.

/// Command succeeded; for decisions, a dispatch or progress report.
pub const OK: i32 = 0;
/// Command failed: corrupt or missing state, bad arguments, internal fault.
pub const INVALID: i32 = 1;
/// The pipeline is complete for the current unit.
pub const COMPLETE: i32 = 2;
/// A human is required: checkpoint pause or exhausted attempts.
pub const HUMAN: i32 = 3;
