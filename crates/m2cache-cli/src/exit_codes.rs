//! Exit codes for CLI operations
//!
//! These exit codes follow Unix conventions where applicable.

/// General error - network, checksum or unexpected failure
pub const ERROR: i32 = 1;

/// Input error - malformed coordinate, unknown repository, bad file name
pub const INPUT_ERROR: i32 = 2;

/// Conflict - the revision or version already exists
pub const CONFLICT: i32 = 3;

/// Not found - the requested archive or metadata does not exist
pub const NOT_FOUND: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
