//! Gateway mapping records
//!
//! A gateway mapping routes `domain + requestPathPattern` to a set of
//! backend servers, with header, cookie, limiter and error-page settings.
//! These are the documents stored by [`crate::store`] and exchanged as JSON
//! by the record API.

use crate::schema::FormValues;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigStatus {
    Active,
    Inactive,
    #[default]
    Draft,
}

impl ConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigStatus::Active => "active",
            ConfigStatus::Inactive => "inactive",
            ConfigStatus::Draft => "draft",
        }
    }
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(ConfigStatus::Active),
            "inactive" => Ok(ConfigStatus::Inactive),
            "draft" => Ok(ConfigStatus::Draft),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Backend transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    #[serde(rename = "HTTP", alias = "http")]
    Http,
    #[serde(rename = "HTTPS", alias = "https")]
    Https,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(format!("unknown protocol: {}", other)),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_backend_port() -> u16 {
    80
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub hostname: String,
    #[serde(default = "default_backend_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_center: Option<String>,
}

impl Backend {
    pub fn new(hostname: &str, port: u16, protocol: Protocol) -> Self {
        Self {
            hostname: hostname.to_string(),
            port,
            protocol,
            enabled: true,
            region: None,
            data_center: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    #[serde(default)]
    pub value: String,
    /// Replace a header of the same name instead of appending
    #[serde(rename = "override", default)]
    pub override_existing: bool,
}

impl HeaderEntry {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            override_existing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeaderSet {
    #[serde(default)]
    pub request: Vec<HeaderEntry>,
    #[serde(default)]
    pub response: Vec<HeaderEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookieStrategy {
    #[default]
    Passthrough,
    Persist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieException {
    pub cookie_name: String,
    #[serde(default)]
    pub strategy: CookieStrategy,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookiePolicy {
    #[serde(default)]
    pub global_strategy: CookieStrategy,
    #[serde(default)]
    pub exceptions: Vec<CookieException>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpMode {
    #[default]
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRule {
    pub ip_or_cidr: String,
    #[serde(default)]
    pub mode: IpMode,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterSettings {
    #[serde(default)]
    pub ip_rules: Vec<IpRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_minute: Option<u32>,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
}

/// Serve `page_path` in place of upstream responses with `status_code`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPageRewrite {
    pub status_code: u16,
    pub page_path: String,
}

/// A stored gateway mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub id: String,
    pub domain: String,
    pub request_path_pattern: String,
    #[serde(default)]
    pub backend_forward_path: String,
    #[serde(default)]
    pub application: String,
    #[serde(default)]
    pub status: ConfigStatus,
    #[serde(default)]
    pub backends: Vec<Backend>,
    #[serde(default)]
    pub headers: HeaderSet,
    #[serde(default)]
    pub cookies: CookiePolicy,
    #[serde(default)]
    pub limiters: LimiterSettings,
    #[serde(default)]
    pub response_body_decorator: Vec<ErrorPageRewrite>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// `{scheme}://{domain}{requestPathPattern}`, derived on every write
    #[serde(default)]
    pub effective_url: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl GatewayConfig {
    /// Build a new record from a create payload
    pub fn from_draft(id: String, draft: GatewayConfigDraft, actor: &str) -> Self {
        let now = Utc::now();
        let mut config = Self {
            id,
            domain: String::new(),
            request_path_pattern: String::new(),
            backend_forward_path: String::new(),
            application: String::new(),
            status: ConfigStatus::default(),
            backends: Vec::new(),
            headers: HeaderSet::default(),
            cookies: CookiePolicy::default(),
            limiters: LimiterSettings::default(),
            response_body_decorator: Vec::new(),
            tags: Vec::new(),
            effective_url: String::new(),
            created_by: actor.to_string(),
            created_at: now,
            updated_by: actor.to_string(),
            updated_at: now,
        };
        config.apply(draft, actor);
        config.updated_at = now;
        config
    }

    /// Overwrite every field present in `draft` and stamp the update
    pub fn apply(&mut self, draft: GatewayConfigDraft, actor: &str) {
        let GatewayConfigDraft {
            domain,
            request_path_pattern,
            backend_forward_path,
            application,
            status,
            backends,
            headers,
            cookies,
            limiters,
            response_body_decorator,
            tags,
        } = draft;

        if let Some(v) = domain {
            self.domain = v.trim().to_string();
        }
        if let Some(v) = request_path_pattern {
            self.request_path_pattern = v.trim().to_string();
        }
        if let Some(v) = backend_forward_path {
            self.backend_forward_path = v;
        }
        if let Some(v) = application {
            self.application = v;
        }
        if let Some(v) = status {
            self.status = v;
        }
        if let Some(v) = backends {
            self.backends = v;
        }
        if let Some(v) = headers {
            self.headers = v;
        }
        if let Some(v) = cookies {
            self.cookies = v;
        }
        if let Some(v) = limiters {
            self.limiters = v;
        }
        if let Some(v) = response_body_decorator {
            self.response_body_decorator = v;
        }
        if let Some(v) = tags {
            self.tags = v;
        }
        self.touch(actor);
    }

    pub fn set_status(&mut self, status: ConfigStatus, actor: &str) {
        self.status = status;
        self.touch(actor);
    }

    fn touch(&mut self, actor: &str) {
        self.effective_url = effective_url(&self.domain, &self.request_path_pattern, &self.backends);
        self.updated_by = actor.to_string();
        self.updated_at = Utc::now();
    }

    /// Whether this record occupies the `(domain, requestPathPattern)` slot
    pub fn occupies(&self, domain: &str, request_path_pattern: &str) -> bool {
        self.domain == domain && self.request_path_pattern == request_path_pattern
    }
}

/// `https` when any backend speaks HTTPS, `http` otherwise
pub fn effective_url(domain: &str, request_path_pattern: &str, backends: &[Backend]) -> String {
    let scheme = if backends.iter().any(|b| b.protocol == Protocol::Https) {
        Protocol::Https
    } else {
        Protocol::Http
    };
    format!("{}://{}{}", scheme.scheme(), domain, request_path_pattern)
}

/// Create/update payload. Absent fields keep their current value on update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_path_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_forward_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConfigStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backends: Option<Vec<Backend>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CookiePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiters: Option<LimiterSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body_decorator: Option<Vec<ErrorPageRewrite>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl GatewayConfigDraft {
    pub fn new(domain: &str, request_path_pattern: &str) -> Self {
        Self {
            domain: Some(domain.to_string()),
            request_path_pattern: Some(request_path_pattern.to_string()),
            ..Default::default()
        }
    }

    /// Required fields that are absent or blank
    pub fn missing_required(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.domain) {
            missing.push("domain");
        }
        if blank(&self.request_path_pattern) {
            missing.push("requestPathPattern");
        }
        missing
    }

    /// Values of the `basic` form, as the validation engine sees them
    pub fn basic_values(&self) -> FormValues {
        let mut values = FormValues::new();
        let mut put = |key: &str, v: &Option<String>| {
            if let Some(s) = v {
                values.insert(key.to_string(), Value::String(s.trim().to_string()));
            }
        };
        put("domain", &self.domain);
        put("requestPathPattern", &self.request_path_pattern);
        put("backendForwardPath", &self.backend_forward_path);
        put("application", &self.application);
        values
    }

    /// Values of the `headers` form: the request and response header lists
    pub fn header_values(&self) -> FormValues {
        self.section_values(self.headers.as_ref())
    }

    /// Values of the `cookies` form: global strategy and exceptions
    pub fn cookie_values(&self) -> FormValues {
        self.section_values(self.cookies.as_ref())
    }

    fn section_values<T: Serialize>(&self, section: Option<&T>) -> FormValues {
        match section.map(serde_json::to_value) {
            Some(Ok(Value::Object(map))) => map,
            _ => FormValues::new(),
        }
    }
}

/// List filters parsed from `?q=&status=&application=&page=&limit=`
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub q: String,
    /// `None` matches every status
    pub status: Option<String>,
    /// `None` matches every application
    pub application: Option<String>,
    pub page: usize,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            q: String::new(),
            status: None,
            application: None,
            page: 1,
            limit: 10,
        }
    }
}

impl SearchQuery {
    /// Parse a raw query string; unknown keys are ignored, bad numbers fall
    /// back to the defaults, and `all` disables a filter
    pub fn from_query_string(query: Option<&str>) -> Self {
        let mut search = Self::default();
        let Some(query) = query else {
            return search;
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let value = decode_component(raw);
            match key {
                "q" => search.q = value.trim().to_string(),
                "status" => search.status = filter_value(value),
                "application" => search.application = filter_value(value),
                "page" => search.page = value.trim().parse::<usize>().unwrap_or(1).max(1),
                "limit" => search.limit = value.trim().parse::<usize>().unwrap_or(10).max(1),
                _ => {}
            }
        }
        search
    }

    pub fn matches(&self, config: &GatewayConfig) -> bool {
        if let Some(status) = &self.status {
            if !config.status.as_str().eq_ignore_ascii_case(status) {
                return false;
            }
        }
        if let Some(application) = &self.application {
            if &config.application != application {
                return false;
            }
        }
        if self.q.is_empty() {
            return true;
        }

        let needle = self.q.to_lowercase();
        let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);
        contains(&config.domain)
            || contains(&config.request_path_pattern)
            || contains(&config.application)
            || contains(&config.effective_url)
            || config.tags.iter().any(|t| contains(t))
    }
}

fn filter_value(value: String) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(value.to_string())
    }
}

/// Percent-decode one query component, treating `+` as a space
pub fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Slice one page out of `items`; pages past the end are empty
pub fn paginate<T: Clone>(items: &[T], page: usize, limit: usize) -> (Vec<T>, Pagination) {
    let page = page.max(1);
    let limit = limit.max(1);
    let total = items.len();
    let start = (page - 1).saturating_mul(limit);
    let slice = items.iter().skip(start).take(limit).cloned().collect();
    let pagination = Pagination {
        page,
        limit,
        total,
        total_pages: total.div_ceil(limit),
    };
    (slice, pagination)
}

/// Record counts per status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusSummary {
    pub active: usize,
    pub inactive: usize,
    pub draft: usize,
    pub total: usize,
}

impl StatusSummary {
    pub fn from_configs<'a>(configs: impl IntoIterator<Item = &'a GatewayConfig>) -> Self {
        configs.into_iter().fold(Self::default(), |mut acc, config| {
            match config.status {
                ConfigStatus::Active => acc.active += 1,
                ConfigStatus::Inactive => acc.inactive += 1,
                ConfigStatus::Draft => acc.draft += 1,
            }
            acc.total += 1;
            acc
        })
    }
}
