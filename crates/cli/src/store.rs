//! Lead store adapter (PostgREST): target loader, update applier and the
//! legacy status migration writer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use leadsync_recon::model::check_unique_target_ids;
use leadsync_recon::{
    ApplyError, MigrationIntent, SyncOutcome, TargetRecord, UpdateApplier, UpdateIntent,
};
use serde::Deserialize;

use crate::exit_codes::{self, STORE_HTTP};
use crate::fetch::common::{self, FetchClient};
use crate::settings::TargetTables;
use crate::CliError;

// ── Constants ───────────────────────────────────────────────────────

pub const ENV_URL: &str = "NEXT_PUBLIC_SUPABASE_URL";
pub const ENV_SERVICE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";

const SELECT_FIELDS: &str = "id,name,email,phone,status,created_at,custom_fields";
/// Stable load order: newest first, id breaks ties.
const LOAD_ORDER: &str = "created_at.desc,id.asc";
const PAGE_LIMIT: usize = 1000;

/// Attribute-bag key holding the CRM lead id.
pub const LINK_FIELD: &str = "zoho_id";
/// Attribute-bag key holding the CRM notes.
pub const NOTES_FIELD: &str = "zoho_notes";
const EVENT_SOURCE: &str = "zoho_sync";

// ── Credentials ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreCredentials {
    pub url: String,
    pub service_key: String,
}

impl StoreCredentials {
    pub fn from_env() -> Result<Self, CliError> {
        let url = common::require_env(ENV_URL, "lead store", exit_codes::EXIT_STORE_NOT_AUTH)?;
        let parsed = url::Url::parse(&url).map_err(|e| CliError {
            code: exit_codes::EXIT_STORE_NOT_AUTH,
            message: format!("invalid {}: {}", ENV_URL, e),
            hint: Some("expected the project URL, e.g. https://<project>.supabase.co".to_string()),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CliError {
                code: exit_codes::EXIT_STORE_NOT_AUTH,
                message: format!("invalid {}: unsupported scheme '{}'", ENV_URL, parsed.scheme()),
                hint: None,
            });
        }
        Ok(Self {
            url,
            service_key: common::require_env(
                ENV_SERVICE_KEY,
                "lead store",
                exit_codes::EXIT_STORE_NOT_AUTH,
            )?,
        })
    }
}

fn extract_store_error(body: &serde_json::Value, status: u16) -> String {
    let msg = body["message"]
        .as_str()
        .or_else(|| body["error"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status));
    match body["details"].as_str() {
        Some(details) => format!("{} ({})", msg, details),
        None => msg,
    }
}

// ── Rows ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LeadRow {
    id: serde_json::Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    custom_fields: Option<serde_json::Map<String, serde_json::Value>>,
}

impl LeadRow {
    fn into_record(self) -> TargetRecord {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        let mut record = TargetRecord::new(
            id,
            self.name.unwrap_or_default(),
            self.status.unwrap_or_default(),
            self.created_at.unwrap_or_default(),
        );
        record.email = self.email.filter(|e| !e.trim().is_empty());
        record.phone = self.phone.filter(|p| !p.trim().is_empty());
        record.custom_fields = self.custom_fields.unwrap_or_default();
        record
    }
}

// ── Client ──────────────────────────────────────────────────────────

pub struct StoreClient {
    client: FetchClient,
    base_url: String,
    service_key: String,
    tables: TargetTables,
    page_limit: usize,
}

impl StoreClient {
    pub fn new(
        creds: StoreCredentials,
        tables: TargetTables,
        timeout: Duration,
    ) -> Result<Self, CliError> {
        Ok(Self {
            client: FetchClient::new("lead store", extract_store_error, STORE_HTTP, timeout)?,
            base_url: creds.url.trim_end_matches('/').to_string(),
            service_key: creds.service_key,
            tables,
            page_limit: PAGE_LIMIT,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.client = self.client.with_max_retries(max_retries);
        self
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    pub fn tables(&self) -> &TargetTables {
        &self.tables
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        req.header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Load every live lead in the stable order (`created_at desc, id asc`).
    ///
    /// Pages are keyed on the last row seen, so rows inserted while loading
    /// never shift a page boundary.
    pub fn load_leads(&self, quiet: bool) -> Result<Vec<TargetRecord>, CliError> {
        let show_progress = common::show_progress(quiet);
        let url = self.table_url(&self.tables.leads);
        let mut leads: Vec<TargetRecord> = Vec::new();

        loop {
            let mut params = vec![
                ("select", SELECT_FIELDS.to_string()),
                ("deleted_at", "is.null".to_string()),
                ("order", LOAD_ORDER.to_string()),
                ("limit", self.page_limit.to_string()),
            ];
            if let Some(last) = leads.last() {
                params.push(("or", rows_after(&last.created_at, &last.id)));
            }
            let body = self
                .client
                .request_with_retry(|http| self.authed(http.get(&url)).query(&params))?;

            let rows: Vec<LeadRow> = serde_json::from_value(body).map_err(|e| CliError {
                code: exit_codes::EXIT_STORE_UPSTREAM,
                message: format!("unexpected lead rows from {}: {}", self.tables.leads, e),
                hint: None,
            })?;
            let count = rows.len();
            leads.extend(rows.into_iter().map(LeadRow::into_record));

            if show_progress {
                eprintln!("  {}: {} leads", self.tables.leads, leads.len());
            }
            if count < self.page_limit {
                break;
            }
        }

        check_unique_target_ids(&leads).map_err(|e| CliError {
            code: exit_codes::EXIT_STORE_UPSTREAM,
            message: format!("{}: {}", self.tables.leads, e),
            hint: None,
        })?;

        log::info!("loaded {} leads from {}", leads.len(), self.tables.leads);
        Ok(leads)
    }

    /// Current attribute bag of one lead.
    pub fn fetch_custom_fields(
        &self,
        lead_id: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, CliError> {
        let url = self.table_url(&self.tables.leads);
        let id_filter = format!("eq.{}", lead_id);
        let body = self.client.request_with_retry(|http| {
            self.authed(http.get(&url))
                .query(&[("id", id_filter.as_str()), ("select", "custom_fields")])
        })?;

        let row = body
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| CliError {
                code: exit_codes::EXIT_STORE_UPSTREAM,
                message: "lead not found".to_string(),
                hint: None,
            })?;

        Ok(row["custom_fields"].as_object().cloned().unwrap_or_default())
    }

    pub fn patch_lead(&self, lead_id: &str, patch: &serde_json::Value) -> Result<(), CliError> {
        let url = self.table_url(&self.tables.leads);
        let id_filter = format!("eq.{}", lead_id);
        self.client.request_with_retry(|http| {
            self.authed(http.patch(&url))
                .query(&[("id", id_filter.as_str())])
                .header("Prefer", "return=minimal")
                .json(patch)
        })?;
        Ok(())
    }

    pub fn insert_event(&self, event: &serde_json::Value) -> Result<(), CliError> {
        let url = self.table_url(&self.tables.events);
        self.client.request_with_retry(|http| {
            self.authed(http.post(&url))
                .header("Prefer", "return=minimal")
                .json(event)
        })?;
        Ok(())
    }
}

/// PostgREST `or` filter for rows strictly after (`created_at`, `id`) in
/// `created_at.desc,id.asc` order. Nulls sort first under `desc`.
fn rows_after(created_at: &str, id: &str) -> String {
    if created_at.is_empty() {
        format!("(created_at.not.is.null,and(created_at.is.null,id.gt.{}))", id)
    } else {
        format!(
            "(created_at.lt.{ts},and(created_at.eq.{ts},id.gt.{id}))",
            ts = created_at,
            id = id,
        )
    }
}

// ── Update applier ──────────────────────────────────────────────────

/// Put the link id (and notes, when present) into the attribute bag,
/// leaving every other key as it was.
pub fn merge_link_fields(fields: &mut serde_json::Map<String, serde_json::Value>, intent: &UpdateIntent) {
    fields.insert(LINK_FIELD.to_string(), intent.source_id.clone().into());
    if let Some(notes) = intent.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        fields.insert(NOTES_FIELD.to_string(), notes.into());
    }
}

/// Audit event row for one applied intent.
pub fn audit_event(intent: &UpdateIntent, actor: &str) -> serde_json::Value {
    serde_json::json!({
        "lead_id": intent.target_id,
        "event_type": "status_changed",
        "field_name": "status",
        "old_value": intent.old_status,
        "new_value": intent.resulting_status(),
        "user_email": actor,
        "metadata": {
            "source": EVENT_SOURCE,
            "zoho_id": intent.source_id,
            "match_type": intent.match_type,
            "match_confidence": intent.match_confidence,
        },
    })
}

/// Writes intents to the lead store: merge attributes, set status, record
/// an audit event.
pub struct StoreApplier<'a> {
    store: &'a StoreClient,
    actor: String,
    clock: fn() -> DateTime<Utc>,
    total: usize,
    done: usize,
    show_progress: bool,
}

impl<'a> StoreApplier<'a> {
    pub fn new(store: &'a StoreClient, actor: impl Into<String>, total: usize, quiet: bool) -> Self {
        Self {
            store,
            actor: actor.into(),
            clock: Utc::now,
            total,
            done: 0,
            show_progress: common::show_progress(quiet),
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn write(&self, intent: &UpdateIntent) -> Result<(), CliError> {
        let mut fields = self.store.fetch_custom_fields(&intent.target_id)?;
        merge_link_fields(&mut fields, intent);

        let mut patch = serde_json::Map::new();
        if let Some(status) = intent.new_status {
            patch.insert("status".to_string(), status.as_str().into());
        }
        patch.insert("custom_fields".to_string(), fields.into());
        patch.insert("updated_at".to_string(), (self.clock)().to_rfc3339().into());
        self.store.patch_lead(&intent.target_id, &serde_json::Value::Object(patch))?;

        if let Err(e) = self.store.insert_event(&audit_event(intent, &self.actor)) {
            log::warn!("failed to record audit event for {}: {}", intent.target_id, e.message);
        }
        Ok(())
    }
}

impl UpdateApplier for StoreApplier<'_> {
    fn apply(&mut self, intent: &UpdateIntent) -> Result<(), ApplyError> {
        self.done += 1;
        let result = self.write(intent);
        if self.show_progress {
            match &result {
                Ok(()) => eprintln!(
                    "  [{}/{}] OK: {} ({} -> {})",
                    self.done,
                    self.total,
                    intent.lead_name,
                    intent.old_status,
                    intent.resulting_status(),
                ),
                Err(e) => eprintln!(
                    "  [{}/{}] FAIL: {}: {}",
                    self.done, self.total, intent.lead_name, e.message,
                ),
            }
        }
        result.map_err(|e| ApplyError::new(&intent.target_id, e.message))
    }
}

// ── Status migration ────────────────────────────────────────────────

/// Move each lead off its legacy status, one at a time.
pub fn apply_migrations(store: &StoreClient, intents: &[MigrationIntent], quiet: bool) -> SyncOutcome {
    let show_progress = common::show_progress(quiet);
    let mut outcome = SyncOutcome {
        updates_attempted: intents.len(),
        ..SyncOutcome::default()
    };

    for m in intents {
        let patch = serde_json::json!({ "status": m.new_status.as_str() });
        match store.patch_lead(&m.target_id, &patch) {
            Ok(()) => {
                outcome.updates_succeeded += 1;
                if show_progress {
                    eprintln!("  OK: {} ({} -> {})", m.lead_name, m.old_status, m.new_status);
                }
            }
            Err(e) => {
                outcome.updates_failed += 1;
                log::warn!("failed to migrate {}: {}", m.lead_name, e.message);
                outcome.errors.push(ApplyError::new(&m.target_id, e.message));
            }
        }
    }

    outcome.success = outcome.updates_failed == 0;
    outcome
}

// ── Tests ───────────────────────────────────────────────────────────
