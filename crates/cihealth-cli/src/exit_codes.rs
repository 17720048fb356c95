//! Process exit codes for the cihealth CLI.
//! Scripts rely on these; keep them stable.

use cihealth_core::HealthError;

pub const SUCCESS: i32 = 0;
pub const INPUT_ERROR: i32 = 1; // Bad flag, time period, regex or configuration
pub const INTERNAL_ERROR: i32 = 2; // Fetch, parse or output failure

/// Exit code for an error that escaped a command.
pub fn from_error(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<HealthError>()
        .map_or(INTERNAL_ERROR, HealthError::exit_code)
}
