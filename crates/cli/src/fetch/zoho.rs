//! CRM source loader: Zoho OAuth session plus the paged lead fetch.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime};
use leadsync_recon::SourceRecord;

use crate::exit_codes::{self, FETCH_HTTP};
use crate::CliError;

use super::common::{self, FetchClient};

// ── Constants ───────────────────────────────────────────────────────

pub const ENV_CLIENT_ID: &str = "ZOHO_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "ZOHO_CLIENT_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "ZOHO_REFRESH_TOKEN";
pub const ENV_REGION: &str = "ZOHO_REGION";

const DEFAULT_REGION: &str = "us";
const LEAD_FIELDS: &str =
    "First_Name,Last_Name,Email,Phone,Mobile,Lead_Source,Lead_Status,Created_Time,utm_source,Description";

/// (name, accounts server, API server)
const REGIONS: [(&str, &str, &str); 4] = [
    ("us", "https://accounts.zoho.com", "https://www.zohoapis.com"),
    ("eu", "https://accounts.zoho.eu", "https://www.zohoapis.eu"),
    ("in", "https://accounts.zoho.in", "https://www.zohoapis.in"),
    ("au", "https://accounts.zoho.com.au", "https://www.zohoapis.com.au"),
];

// ── Regions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZohoRegion {
    pub name: String,
    pub accounts_url: String,
    pub api_url: String,
}

impl ZohoRegion {
    pub fn new(
        name: impl Into<String>,
        accounts_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            accounts_url: accounts_url.into(),
            api_url: api_url.into(),
        }
    }

    fn known(name: &str) -> Option<Self> {
        REGIONS
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(n, a, d)| Self::new(*n, *a, *d))
    }
}

/// Regions to try, in order.
///
/// `None` means the variable is unset and the default region applies. An
/// empty value means "try every region". An unknown name falls back to the
/// default region's servers under that name.
pub fn candidate_regions(configured: Option<&str>) -> Vec<ZohoRegion> {
    match configured.map(str::trim) {
        None => ZohoRegion::known(DEFAULT_REGION).into_iter().collect(),
        Some("") => REGIONS
            .iter()
            .map(|(n, a, d)| ZohoRegion::new(*n, *a, *d))
            .collect(),
        Some(name) => {
            let name = name.to_lowercase();
            match ZohoRegion::known(&name) {
                Some(r) => vec![r],
                None => {
                    log::warn!("unknown Zoho region '{}', using {} servers", name, DEFAULT_REGION);
                    let (_, a, d) = REGIONS[0];
                    vec![ZohoRegion::new(name, a, d)]
                }
            }
        }
    }
}

// ── Credentials ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ZohoCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl ZohoCredentials {
    pub fn from_env() -> Result<Self, CliError> {
        let get = |var| common::require_env(var, "Zoho", exit_codes::EXIT_FETCH_NOT_AUTH);
        Ok(Self {
            client_id: get(ENV_CLIENT_ID)?,
            client_secret: get(ENV_CLIENT_SECRET)?,
            refresh_token: get(ENV_REFRESH_TOKEN)?,
        })
    }
}

fn extract_zoho_error(body: &serde_json::Value, status: u16) -> String {
    body["message"]
        .as_str()
        .or_else(|| body["code"].as_str())
        .or_else(|| body["error"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

// ── Session ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ZohoAuth {
    access_token: String,
    api_url: String,
    region: String,
}

/// An authenticated connection to the CRM, owned by the caller.
///
/// The access token and the API server of the region that accepted the
/// refresh token are cached here for the life of the session.
pub struct ZohoSession {
    client: FetchClient,
    creds: ZohoCredentials,
    regions: Vec<ZohoRegion>,
    auth: Option<ZohoAuth>,
}

impl ZohoSession {
    pub fn new(
        creds: ZohoCredentials,
        regions: Vec<ZohoRegion>,
        timeout: Duration,
    ) -> Result<Self, CliError> {
        Ok(Self {
            client: FetchClient::new("Zoho", extract_zoho_error, FETCH_HTTP, timeout)?,
            creds,
            regions,
            auth: None,
        })
    }

    /// Seed the session with an access token already issued for `region`.
    pub fn with_access_token(mut self, access_token: impl Into<String>, region: &ZohoRegion) -> Self {
        self.auth = Some(ZohoAuth {
            access_token: access_token.into(),
            api_url: region.api_url.clone(),
            region: region.name.clone(),
        });
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.client = self.client.with_max_retries(max_retries);
        self
    }

    /// Region that issued the current token, if authenticated.
    pub fn region(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.region.as_str())
    }

    /// Exchange the refresh token for an access token, region by region.
    pub fn authenticate(&mut self) -> Result<(), CliError> {
        self.auth = None;

        for region in &self.regions {
            let url = format!("{}/oauth/v2/token", region.accounts_url);
            let resp = self
                .client
                .http
                .post(&url)
                .form(&[
                    ("refresh_token", self.creds.refresh_token.as_str()),
                    ("client_id", self.creds.client_id.as_str()),
                    ("client_secret", self.creds.client_secret.as_str()),
                    ("grant_type", "refresh_token"),
                ])
                .send();

            let body: serde_json::Value = match resp.and_then(|r| r.json()) {
                Ok(body) => body,
                Err(e) => {
                    log::warn!("Zoho region {} token request failed: {}", region.name, e);
                    continue;
                }
            };

            if let Some(err) = body.get("error") {
                log::warn!("Zoho region {} auth failed: {}", region.name, err);
                continue;
            }

            if let Some(token) = body["access_token"].as_str().filter(|t| !t.is_empty()) {
                log::info!("authenticated with Zoho ({} region)", region.name);
                self.auth = Some(ZohoAuth {
                    access_token: token.to_string(),
                    api_url: region.api_url.clone(),
                    region: region.name.clone(),
                });
                return Ok(());
            }

            log::warn!("Zoho region {} token response had no access_token", region.name);
        }

        let tried: Vec<&str> = self.regions.iter().map(|r| r.name.as_str()).collect();
        Err(CliError {
            code: exit_codes::EXIT_FETCH_AUTH,
            message: format!(
                "failed to authenticate with Zoho CRM (tried regions: {})",
                tried.join(", "),
            ),
            hint: Some(format!(
                "check {}, {} and {}; set {} to your data center",
                ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_REFRESH_TOKEN, ENV_REGION,
            )),
        })
    }

    fn current_auth(&mut self) -> Result<ZohoAuth, CliError> {
        if self.auth.is_none() {
            self.authenticate()?;
        }
        self.auth.clone().ok_or_else(|| CliError {
            code: exit_codes::EXIT_FETCH_AUTH,
            message: "Zoho session has no access token".into(),
            hint: None,
        })
    }

    fn get_leads_page(&self, auth: &ZohoAuth, page: u32, per_page: u32) -> Result<serde_json::Value, CliError> {
        let url = format!("{}/crm/v6/Leads", auth.api_url);
        let params = [
            ("fields", LEAD_FIELDS.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
            ("sort_by", "Created_Time".to_string()),
            ("sort_order", "desc".to_string()),
        ];
        let header = format!("Zoho-oauthtoken {}", auth.access_token);
        self.client.request_with_retry(|http| {
            http.get(&url)
                .header("Authorization", &header)
                .query(&params)
        })
    }

    /// Fetch one page of leads, newest first. A rejected token triggers one
    /// re-authentication and a retry of the same page.
    pub fn fetch_leads_page(&mut self, page: u32, per_page: u32) -> Result<serde_json::Value, CliError> {
        let auth = self.current_auth()?;
        match self.get_leads_page(&auth, page, per_page) {
            Ok(body) => Ok(body),
            Err(e) if e.code == exit_codes::EXIT_FETCH_AUTH => {
                log::info!("Zoho token rejected on page {}, re-authenticating", page);
                self.authenticate()?;
                let auth = self.current_auth()?;
                self.get_leads_page(&auth, page, per_page)
            }
            Err(e) => Err(e),
        }
    }
}

// ── Loader ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub page_size: u32,
    pub max_pages: u32,
    /// Records created before this (wall-clock) instant end the load.
    pub cutoff: NaiveDateTime,
    pub quiet: bool,
}

/// Midnight of `now`'s date, `days` days back.
pub fn cutoff_for(days: u32, now: NaiveDateTime) -> NaiveDateTime {
    now.date().and_time(chrono::NaiveTime::MIN) - ChronoDuration::days(i64::from(days))
}

/// Load source leads newer than the cutoff, in the order the CRM returns
/// them (Created_Time descending).
pub fn load_leads(session: &mut ZohoSession, opts: &LoadOptions) -> Result<Vec<SourceRecord>, CliError> {
    let show_progress = common::show_progress(opts.quiet);
    let mut leads = Vec::new();
    let mut page = 1u32;

    while page <= opts.max_pages {
        let body = session.fetch_leads_page(page, opts.page_size)?;

        // 204 No Content: nothing (more) to return
        if body.is_null() {
            break;
        }

        let Some(data) = body["data"].as_array() else {
            if body.get("code").is_some() {
                return Err(CliError {
                    code: exit_codes::EXIT_FETCH_UPSTREAM,
                    message: format!(
                        "Zoho API error: {}",
                        extract_zoho_error(&body, 200),
                    ),
                    hint: None,
                });
            }
            break;
        };
        if data.is_empty() {
            break;
        }

        let mut reached_cutoff = false;
        for lead in data {
            let created = lead["Created_Time"].as_str().unwrap_or("");
            if created_before(created, opts.cutoff) {
                reached_cutoff = true;
                break;
            }
            leads.push(parse_lead(lead));
        }

        if show_progress {
            eprintln!("  page {}: {} leads so far", page, leads.len());
        }

        if reached_cutoff {
            log::info!("reached cutoff {} on page {}", opts.cutoff, page);
            break;
        }
        if !body["info"]["more_records"].as_bool().unwrap_or(false) {
            break;
        }
        page += 1;
    }

    if page > opts.max_pages {
        log::warn!("stopped after {} pages; older leads were not loaded", opts.max_pages);
    }
    log::info!("loaded {} Zoho leads", leads.len());
    Ok(leads)
}

/// Unparseable timestamps never end the load.
fn created_before(created: &str, cutoff: NaiveDateTime) -> bool {
    DateTime::parse_from_rfc3339(created)
        .map(|dt| dt.naive_local() < cutoff)
        .unwrap_or(false)
}

fn non_empty(v: &serde_json::Value) -> Option<String> {
    v.as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Map one CRM lead object to a source record.
pub fn parse_lead(lead: &serde_json::Value) -> SourceRecord {
    let id = match &lead["id"] {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    };

    let first = lead["First_Name"].as_str().unwrap_or("");
    let last = lead["Last_Name"].as_str().unwrap_or("");
    let name = format!("{} {}", first, last).trim().to_string();
    let name = if name.is_empty() { "Unknown".to_string() } else { name };

    let status_raw = lead["Lead_Status"].as_str().unwrap_or("");
    let created_at = lead["Created_Time"].as_str().unwrap_or("");

    let mut record = SourceRecord::new(id, name, status_raw, created_at);
    record.email = non_empty(&lead["Email"]);
    record.phone = non_empty(&lead["Phone"]).or_else(|| non_empty(&lead["Mobile"]));
    record.notes = lead["Description"].as_str().map(str::to_string);
    record
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use httpmock::prelude::*;

    fn creds() -> ZohoCredentials {
        ZohoCredentials {
            client_id: "cid".into(),
            client_secret: "csec".into(),
            refresh_token: "rt".into(),
        }
    }

    fn region(server: &MockServer, name: &str) -> ZohoRegion {
        ZohoRegion::new(
            name,
            server.url(format!("/accounts-{}", name)),
            server.url(format!("/api-{}", name)),
        )
    }

    fn session(regions: Vec<ZohoRegion>) -> ZohoSession {
        ZohoSession::new(creds(), regions, Duration::from_secs(5))
            .unwrap()
            .with_max_retries(0)
    }

    fn opts(cutoff: NaiveDateTime) -> LoadOptions {
        LoadOptions {
            page_size: 2,
            max_pages: 50,
            cutoff,
            quiet: true,
        }
    }

    fn jan(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn lead(id: &str, created: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "First_Name": "Dana",
            "Last_Name": "Levi",
            "Phone": "050-123-4567",
            "Lead_Status": "נוצר קשר",
            "Created_Time": created,
        })
    }

    // ── Regions ────────────────────────────────────────────────────

    #[test]
    fn test_candidate_regions() {
        let names = |rs: Vec<ZohoRegion>| rs.into_iter().map(|r| r.name).collect::<Vec<_>>();
        assert_eq!(names(candidate_regions(None)), ["us"]);
        assert_eq!(names(candidate_regions(Some("EU"))), ["eu"]);
        assert_eq!(names(candidate_regions(Some(""))), ["us", "eu", "in", "au"]);

        let odd = candidate_regions(Some("jp"));
        assert_eq!(odd[0].name, "jp");
        assert_eq!(odd[0].accounts_url, "https://accounts.zoho.com");
    }

    // ── Lead parsing ───────────────────────────────────────────────

    #[test]
    fn test_parse_lead_fields() {
        let r = parse_lead(&serde_json::json!({
            "id": "5725767000001",
            "First_Name": "Dana",
            "Last_Name": " Levi ",
            "Email": "dana@example.com",
            "Phone": null,
            "Mobile": "+972 50 123 4567",
            "Lead_Status": "נקבעה שיחה",
            "Created_Time": "2026-01-12T10:00:00+02:00",
            "Description": "Prefers mornings"
        }));
        assert_eq!(r.id, "5725767000001");
        assert_eq!(r.name, "Dana  Levi");
        assert_eq!(r.email.as_deref(), Some("dana@example.com"));
        assert_eq!(r.phone.as_deref(), Some("+972 50 123 4567"));
        assert_eq!(r.status, "meeting_set");
        assert_eq!(r.notes.as_deref(), Some("Prefers mornings"));
    }

    #[test]
    fn test_parse_lead_defaults() {
        let r = parse_lead(&serde_json::json!({"id": 42, "Phone": "", "Mobile": ""}));
        assert_eq!(r.id, "42");
        assert_eq!(r.name, "Unknown");
        assert_eq!(r.phone, None);
        assert_eq!(r.status, "new");
        assert_eq!(r.status_raw, "");
    }

    #[test]
    fn test_cutoff_for() {
        let now = NaiveDate::from_ymd_opt(2026, 1, 31)
            .unwrap()
            .and_hms_opt(17, 45, 0)
            .unwrap();
        assert_eq!(cutoff_for(30, now), jan(1));
        assert_eq!(cutoff_for(0, now), jan(31));
    }

    #[test]
    fn test_created_before_uses_wall_clock() {
        assert!(created_before("2025-12-31T23:59:00+02:00", jan(1)));
        assert!(!created_before("2026-01-01T00:30:00+02:00", jan(1)));
        assert!(!created_before("garbage", jan(1)));
    }

    // ── OAuth ──────────────────────────────────────────────────────

    #[test]
    fn test_region_fallback() {
        let server = MockServer::start();

        let us_token = server.mock(|when, then| {
            when.method(POST).path("/accounts-us/oauth/v2/token");
            then.status(200)
                .json_body(serde_json::json!({"error": "invalid_client"}));
        });
        let eu_token = server.mock(|when, then| {
            when.method(POST).path("/accounts-eu/oauth/v2/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "eu_token", "expires_in": 3600}));
        });
        let eu_data = server.mock(|when, then| {
            when.method(GET)
                .path("/api-eu/crm/v6/Leads")
                .header("Authorization", "Zoho-oauthtoken eu_token")
                .query_param("page", "1")
                .query_param("sort_order", "desc");
            then.status(200).json_body(serde_json::json!({
                "data": [lead("z1", "2026-01-20T10:00:00+02:00")],
                "info": {"more_records": false}
            }));
        });

        let mut s = session(vec![region(&server, "us"), region(&server, "eu")]);
        let leads = load_leads(&mut s, &opts(jan(1))).unwrap();

        us_token.assert();
        eu_token.assert();
        eu_data.assert();
        assert_eq!(s.region(), Some("eu"));
        assert_eq!(leads.len(), 1);
    }

    #[test]
    fn test_all_regions_fail_exit_51() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path_includes("/oauth/v2/token");
            then.status(400)
                .json_body(serde_json::json!({"error": "invalid_code"}));
        });

        let mut s = session(vec![region(&server, "us"), region(&server, "in")]);
        let err = load_leads(&mut s, &opts(jan(1))).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_AUTH);
        assert!(err.message.contains("us, in"), "{}", err.message);
    }

    #[test]
    fn test_reauth_on_401_retries_page() {
        let server = MockServer::start();
        let us = region(&server, "us");

        let stale = server.mock(|when, then| {
            when.method(GET)
                .path("/api-us/crm/v6/Leads")
                .header("Authorization", "Zoho-oauthtoken stale");
            then.status(401)
                .json_body(serde_json::json!({"code": "INVALID_TOKEN", "message": "invalid oauth token"}));
        });
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/accounts-us/oauth/v2/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "fresh"}));
        });
        let fresh = server.mock(|when, then| {
            when.method(GET)
                .path("/api-us/crm/v6/Leads")
                .header("Authorization", "Zoho-oauthtoken fresh");
            then.status(200).json_body(serde_json::json!({
                "data": [lead("z1", "2026-01-20T10:00:00+02:00")],
                "info": {"more_records": false}
            }));
        });

        let mut s = session(vec![us.clone()]).with_access_token("stale", &us);
        let leads = load_leads(&mut s, &opts(jan(1))).unwrap();

        stale.assert();
        refresh.assert();
        fresh.assert();
        assert_eq!(leads.len(), 1);
    }

    #[test]
    fn test_persistent_401_fails_after_one_reauth() {
        let server = MockServer::start();
        let us = region(&server, "us");

        let data = server.mock(|when, then| {
            when.method(GET).path("/api-us/crm/v6/Leads");
            then.status(401)
                .json_body(serde_json::json!({"code": "INVALID_TOKEN"}));
        });
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/accounts-us/oauth/v2/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "fresh"}));
        });

        let mut s = session(vec![us.clone()]).with_access_token("stale", &us);
        let err = load_leads(&mut s, &opts(jan(1))).unwrap_err();

        data.assert_hits(2);
        refresh.assert_hits(1);
        assert_eq!(err.code, exit_codes::EXIT_FETCH_AUTH);
    }

    // ── Paging ─────────────────────────────────────────────────────

    #[test]
    fn test_pagination_two_pages() {
        let server = MockServer::start();
        let us = region(&server, "us");

        let page1 = server.mock(|when, then| {
            when.method(GET)
                .path("/api-us/crm/v6/Leads")
                .query_param("page", "1")
                .query_param("per_page", "2");
            then.status(200).json_body(serde_json::json!({
                "data": [
                    lead("z1", "2026-01-20T10:00:00+02:00"),
                    lead("z2", "2026-01-19T10:00:00+02:00"),
                ],
                "info": {"more_records": true}
            }));
        });
        let page2 = server.mock(|when, then| {
            when.method(GET)
                .path("/api-us/crm/v6/Leads")
                .query_param("page", "2");
            then.status(200).json_body(serde_json::json!({
                "data": [lead("z3", "2026-01-18T10:00:00+02:00")],
                "info": {"more_records": false}
            }));
        });

        let mut s = session(vec![us.clone()]).with_access_token("tok", &us);
        let leads = load_leads(&mut s, &opts(jan(1))).unwrap();

        page1.assert();
        page2.assert();
        let ids: Vec<_> = leads.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["z1", "z2", "z3"]);
    }

    #[test]
    fn test_cutoff_stops_paging() {
        let server = MockServer::start();
        let us = region(&server, "us");

        server.mock(|when, then| {
            when.method(GET)
                .path("/api-us/crm/v6/Leads")
                .query_param("page", "1");
            then.status(200).json_body(serde_json::json!({
                "data": [
                    lead("z1", "2026-01-20T10:00:00+02:00"),
                    lead("z_old", "2025-12-20T10:00:00+02:00"),
                ],
                "info": {"more_records": true}
            }));
        });
        let page2 = server.mock(|when, then| {
            when.method(GET)
                .path("/api-us/crm/v6/Leads")
                .query_param("page", "2");
            then.status(200).json_body(serde_json::json!({"data": [], "info": {}}));
        });

        let mut s = session(vec![us.clone()]).with_access_token("tok", &us);
        let leads = load_leads(&mut s, &opts(jan(1))).unwrap();

        page2.assert_hits(0);
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].id, "z1");
    }

    #[test]
    fn test_max_pages_limit() {
        let server = MockServer::start();
        let us = region(&server, "us");

        let pages = server.mock(|when, then| {
            when.method(GET).path("/api-us/crm/v6/Leads");
            then.status(200).json_body(serde_json::json!({
                "data": [lead("z", "2026-01-20T10:00:00+02:00")],
                "info": {"more_records": true}
            }));
        });

        let mut s = session(vec![us.clone()]).with_access_token("tok", &us);
        let mut o = opts(jan(1));
        o.max_pages = 3;
        let leads = load_leads(&mut s, &o).unwrap();

        pages.assert_hits(3);
        assert_eq!(leads.len(), 3);
    }

    #[test]
    fn test_no_content_is_empty() {
        let server = MockServer::start();
        let us = region(&server, "us");
        server.mock(|when, then| {
            when.method(GET).path("/api-us/crm/v6/Leads");
            then.status(204);
        });

        let mut s = session(vec![us.clone()]).with_access_token("tok", &us);
        assert!(load_leads(&mut s, &opts(jan(1))).unwrap().is_empty());
    }

    #[test]
    fn test_api_error_body_fails() {
        let server = MockServer::start();
        let us = region(&server, "us");
        server.mock(|when, then| {
            when.method(GET).path("/api-us/crm/v6/Leads");
            then.status(200)
                .json_body(serde_json::json!({"code": "INVALID_DATA", "message": "bad field"}));
        });

        let mut s = session(vec![us.clone()]).with_access_token("tok", &us);
        let err = load_leads(&mut s, &opts(jan(1))).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_UPSTREAM);
        assert!(err.message.contains("bad field"));
    }
}
