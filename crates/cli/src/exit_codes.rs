//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | local files      | Config, snapshot and report files        |
//! | 50-59   | fetch            | CRM source loader and OAuth              |
//! | 60-69   | store            | Lead store loader and writer             |
//! | 70-79   | sync             | Apply outcome                            |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Local files (3-9)
// =============================================================================

/// Cannot read or write a file (report, sync log, env file).
pub const EXIT_IO: u8 = 3;

/// Settings file is malformed or has unknown keys.
pub const EXIT_CONFIG: u8 = 4;

/// Snapshot file is malformed or breaks a loader guarantee.
pub const EXIT_SNAPSHOT: u8 = 5;

// =============================================================================
// Fetch (50-59) - CRM source
// =============================================================================

/// Source credentials missing from the environment.
pub const EXIT_FETCH_NOT_AUTH: u8 = 50;

/// Auth rejected by the source (token refresh failed in every region, 401/403).
pub const EXIT_FETCH_AUTH: u8 = 51;

/// Bad request rejected by the source (400).
pub const EXIT_FETCH_VALIDATION: u8 = 52;

/// Rate limited after retries (429).
pub const EXIT_FETCH_RATE_LIMIT: u8 = 53;

/// Upstream error (5xx), network failure after retries, or malformed body.
pub const EXIT_FETCH_UPSTREAM: u8 = 54;

// =============================================================================
// Store (60-69) - lead store
// =============================================================================

/// Store URL or service key missing from the environment.
pub const EXIT_STORE_NOT_AUTH: u8 = 60;

/// Auth rejected by the store (401/403).
pub const EXIT_STORE_AUTH: u8 = 61;

/// Request rejected by the store (400).
pub const EXIT_STORE_VALIDATION: u8 = 62;

/// Rate limited after retries (429).
pub const EXIT_STORE_RATE_LIMIT: u8 = 63;

/// Upstream error (5xx), network failure after retries, or malformed body.
pub const EXIT_STORE_UPSTREAM: u8 = 64;

// =============================================================================
// Sync (70-79)
// =============================================================================

/// At least one update failed; the rest were applied.
pub const EXIT_SYNC_PARTIAL: u8 = 70;

/// Nothing to sync against: the CRM returned no leads in the window.
pub const EXIT_SYNC_EMPTY: u8 = 71;

// =============================================================================
// HTTP status classification
// =============================================================================

/// Exit codes an HTTP-backed adapter reports, per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpExitCodes {
    pub auth: u8,
    pub validation: u8,
    pub rate_limit: u8,
    pub upstream: u8,
}

pub const FETCH_HTTP: HttpExitCodes = HttpExitCodes {
    auth: EXIT_FETCH_AUTH,
    validation: EXIT_FETCH_VALIDATION,
    rate_limit: EXIT_FETCH_RATE_LIMIT,
    upstream: EXIT_FETCH_UPSTREAM,
};

pub const STORE_HTTP: HttpExitCodes = HttpExitCodes {
    auth: EXIT_STORE_AUTH,
    validation: EXIT_STORE_VALIDATION,
    rate_limit: EXIT_STORE_RATE_LIMIT,
    upstream: EXIT_STORE_UPSTREAM,
};
