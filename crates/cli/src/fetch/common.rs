//! Shared infrastructure for the HTTP-backed adapters (CRM source, lead store).
//!
//! Each adapter reuses:
//! - `FetchClient`: blocking HTTP client with retry / backoff / error classification
//! - `require_env`: read a credential from the environment or fail with the
//!   adapter's not-authenticated exit code
//! - `show_progress`: progress lines only when stderr is a terminal
//!
//! # Retry contract
//!
//! - 401/403 fail immediately with the adapter's `auth` code. Adapters that can
//!   re-authenticate (the source session) match on that code and retry once.
//! - 400 fails immediately with `validation`; other non-429 4xx with `upstream`.
//! - 429 and 5xx retry with exponential backoff (Retry-After respected on 429).
//! - Network errors retry like 5xx.
//! - A 2xx with an empty body yields `Value::Null` (PATCH / 204 No Content).

use std::thread;
use std::time::Duration;

use crate::exit_codes::HttpExitCodes;
use crate::CliError;

// ── Constants ───────────────────────────────────────────────────────

pub(crate) const MAX_RETRIES: u32 = 3;
pub(crate) const USER_AGENT: &str = concat!("leadsync/", env!("CARGO_PKG_VERSION"));

// ── FetchClient ─────────────────────────────────────────────────────

/// Shared HTTP client that handles retry, backoff, and error classification.
///
/// Adapters own their credentials, base URL, and auth headers. They pass a
/// request-building closure to [`FetchClient::request_with_retry`] which
/// runs the retry loop and maps HTTP status codes to the adapter's exit codes.
pub(crate) struct FetchClient {
    pub(crate) http: reqwest::blocking::Client,
    service_name: String,
    error_extractor: fn(&serde_json::Value, u16) -> String,
    codes: HttpExitCodes,
    max_retries: u32,
}

impl FetchClient {
    pub(crate) fn new(
        service_name: &str,
        error_extractor: fn(&serde_json::Value, u16) -> String,
        codes: HttpExitCodes,
        timeout: Duration,
    ) -> Result<Self, CliError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CliError {
                code: codes.upstream,
                message: format!("failed to build HTTP client for {}: {}", service_name, e),
                hint: None,
            })?;

        Ok(Self {
            http,
            service_name: service_name.to_string(),
            error_extractor,
            codes,
            max_retries: MAX_RETRIES,
        })
    }

    /// Cap the number of retries on 429/5xx (tests use 0).
    pub(crate) fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn fail(&self, code: u8, message: String) -> CliError {
        CliError { code, message, hint: None }
    }

    /// Send a request with retry + exponential backoff and parse the JSON body.
    ///
    /// `build_request` is called once per attempt. It receives the
    /// underlying `reqwest::blocking::Client` and must return a fully
    /// configured `RequestBuilder` (method, URL, auth, headers, body).
    pub(crate) fn request_with_retry(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, CliError> {
        let mut backoff_secs = 1u64;
        let mut attempt = 0u32;

        loop {
            let resp = match build_request(&self.http).send() {
                Ok(resp) => resp,
                Err(e) => {
                    // Network/timeout errors: retry
                    if attempt >= self.max_retries {
                        return Err(self.fail(
                            self.codes.upstream,
                            format!(
                                "{} upstream error after {} attempts: {}",
                                self.service_name,
                                attempt + 1,
                                e,
                            ),
                        ));
                    }
                    log::warn!(
                        "{}: retry {}/{} in {}s ({})",
                        self.service_name,
                        attempt + 1,
                        self.max_retries,
                        backoff_secs,
                        e,
                    );
                    thread::sleep(Duration::from_secs(backoff_secs));
                    backoff_secs *= 2;
                    attempt += 1;
                    continue;
                }
            };

            let status = resp.status().as_u16();

            if status == 401 || status == 403 {
                let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
                let msg = (self.error_extractor)(&body, status);
                return Err(self.fail(
                    self.codes.auth,
                    format!("{} auth failed ({}): {}", self.service_name, status, msg),
                ));
            }

            if status == 400 {
                let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
                let msg = (self.error_extractor)(&body, status);
                return Err(self.fail(
                    self.codes.validation,
                    format!("{} request rejected ({}): {}", self.service_name, status, msg),
                ));
            }

            if (400..500).contains(&status) && status != 429 {
                let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
                let msg = (self.error_extractor)(&body, status);
                return Err(self.fail(
                    self.codes.upstream,
                    format!("{} error ({}): {}", self.service_name, status, msg),
                ));
            }

            // Retryable: 429, 5xx
            if status == 429 || status >= 500 {
                if attempt >= self.max_retries {
                    let (code, what) = if status == 429 {
                        (self.codes.rate_limit, "rate limited")
                    } else {
                        (self.codes.upstream, "upstream error")
                    };
                    return Err(self.fail(
                        code,
                        format!(
                            "{} {} after {} attempts ({})",
                            self.service_name,
                            what,
                            attempt + 1,
                            status,
                        ),
                    ));
                }

                let wait = if status == 429 {
                    resp.headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(backoff_secs)
                } else {
                    backoff_secs
                };

                log::warn!(
                    "{}: retry {}/{} in {}s (HTTP {})",
                    self.service_name,
                    attempt + 1,
                    self.max_retries,
                    wait,
                    status,
                );
                thread::sleep(Duration::from_secs(wait));
                backoff_secs *= 2;
                attempt += 1;
                continue;
            }

            // Success: read as text first so empty and BOM-prefixed bodies parse
            let text = resp.text().map_err(|e| {
                self.fail(
                    self.codes.upstream,
                    format!("failed to read {} response body: {}", self.service_name, e),
                )
            })?;
            let trimmed = text.trim_start_matches('\u{feff}').trim();
            if trimmed.is_empty() {
                return Ok(serde_json::Value::Null);
            }
            return serde_json::from_str(trimmed).map_err(|e| {
                self.fail(
                    self.codes.upstream,
                    format!(
                        "failed to parse {} JSON response: {} (body: {})",
                        self.service_name,
                        e,
                        truncate_chars(trimmed, 200),
                    ),
                )
            });
        }
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Read a required credential from the environment.
pub(crate) fn require_env(env_var: &str, service_name: &str, code: u8) -> Result<String, CliError> {
    match std::env::var(env_var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(CliError {
            code,
            message: format!("missing {} credentials ({} is not set)", service_name, env_var),
            hint: Some("set it in .env.local or pass --env-file".to_string()),
        }),
    }
}

/// Progress goes to stderr only when it is a terminal.
pub(crate) fn show_progress(quiet: bool) -> bool {
    !quiet && atty::is(atty::Stream::Stderr)
}

/// First `max` characters of `s` (char-boundary safe).
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
