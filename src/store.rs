//! Gateway mapping storage
//!
//! [`Repository`] is the seam between the HTTP layer and persistence. The
//! only implementation is an in-memory store; it enforces the
//! `(domain, requestPathPattern)` uniqueness invariant on every write.

use crate::gateway::{
    Backend, ConfigStatus, CookieException, CookiePolicy, CookieStrategy, GatewayConfig, GatewayConfigDraft,
    HeaderEntry, HeaderSet, IpMode, IpRule, LimiterSettings, Protocol, SearchQuery, StatusSummary,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Domain and path pattern combination already exists")]
    Duplicate,
    #[error("Configuration not found")]
    NotFound,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// CRUD over gateway mappings
pub trait Repository: Send + Sync {
    fn get(&self, id: &str) -> StoreResult<GatewayConfig>;

    /// Records matching `query`, oldest first
    fn list(&self, query: &SearchQuery) -> Vec<GatewayConfig>;

    fn create(&self, draft: GatewayConfigDraft, actor: &str) -> StoreResult<GatewayConfig>;

    /// Apply `draft` to the record with `id`; the uniqueness check ignores
    /// the record itself
    fn update(&self, id: &str, draft: GatewayConfigDraft, actor: &str) -> StoreResult<GatewayConfig>;

    fn delete(&self, id: &str) -> StoreResult<GatewayConfig>;

    fn set_status(&self, id: &str, status: ConfigStatus, actor: &str) -> StoreResult<GatewayConfig>;

    fn summary(&self) -> StatusSummary;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    configs: RwLock<Vec<GatewayConfig>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with three example mappings
    pub fn with_sample_data() -> Self {
        let store = Self::new();
        *store.configs.write() = sample_configs();
        store
    }

    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }
}

fn conflicts(configs: &[GatewayConfig], domain: &str, path: &str, except_id: Option<&str>) -> bool {
    configs
        .iter()
        .any(|c| Some(c.id.as_str()) != except_id && c.occupies(domain, path))
}

impl Repository for InMemoryStore {
    fn get(&self, id: &str) -> StoreResult<GatewayConfig> {
        self.configs
            .read()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn list(&self, query: &SearchQuery) -> Vec<GatewayConfig> {
        let mut matched: Vec<GatewayConfig> = self
            .configs
            .read()
            .iter()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matched
    }

    fn create(&self, draft: GatewayConfigDraft, actor: &str) -> StoreResult<GatewayConfig> {
        let config = GatewayConfig::from_draft(uuid::Uuid::new_v4().to_string(), draft, actor);

        let mut configs = self.configs.write();
        if conflicts(&configs, &config.domain, &config.request_path_pattern, None) {
            return Err(StoreError::Duplicate);
        }
        configs.push(config.clone());

        info!(id = %config.id, domain = %config.domain, path = %config.request_path_pattern, "Gateway config created");
        Ok(config)
    }

    fn update(&self, id: &str, draft: GatewayConfigDraft, actor: &str) -> StoreResult<GatewayConfig> {
        let mut configs = self.configs.write();
        let index = configs.iter().position(|c| c.id == id).ok_or(StoreError::NotFound)?;

        let mut updated = configs[index].clone();
        updated.apply(draft, actor);
        if conflicts(&configs, &updated.domain, &updated.request_path_pattern, Some(id)) {
            return Err(StoreError::Duplicate);
        }
        configs[index] = updated.clone();

        info!(id = %id, domain = %updated.domain, "Gateway config updated");
        Ok(updated)
    }

    fn delete(&self, id: &str) -> StoreResult<GatewayConfig> {
        let mut configs = self.configs.write();
        let index = configs.iter().position(|c| c.id == id).ok_or(StoreError::NotFound)?;
        let removed = configs.remove(index);

        info!(id = %id, domain = %removed.domain, "Gateway config deleted");
        Ok(removed)
    }

    fn set_status(&self, id: &str, status: ConfigStatus, actor: &str) -> StoreResult<GatewayConfig> {
        let mut configs = self.configs.write();
        let config = configs.iter_mut().find(|c| c.id == id).ok_or(StoreError::NotFound)?;
        config.set_status(status, actor);

        info!(id = %id, status = %status, "Gateway config status changed");
        Ok(config.clone())
    }

    fn summary(&self) -> StatusSummary {
        StatusSummary::from_configs(self.configs.read().iter())
    }
}

fn timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

struct Sample {
    id: &'static str,
    domain: &'static str,
    path: &'static str,
    forward: &'static str,
    application: &'static str,
    status: ConfigStatus,
    created: (&'static str, &'static str),
    updated: (&'static str, &'static str),
    backends: Vec<Backend>,
    tags: &'static [&'static str],
}

fn sample_configs() -> Vec<GatewayConfig> {
    let samples = vec![
        Sample {
            id: "1",
            domain: "api.example.com",
            path: "/api/v1/*",
            forward: "/backend/v1",
            application: "User Management System",
            status: ConfigStatus::Active,
            created: ("john.doe@company.com", "2024-01-15T10:30:00Z"),
            updated: ("jane.smith@company.com", "2024-01-20T14:45:00Z"),
            backends: vec![
                Backend::new("backend1.example.com", 8080, Protocol::Http),
                Backend::new("backend2.example.com", 8080, Protocol::Http),
            ],
            tags: &["production", "user-api"],
        },
        Sample {
            id: "2",
            domain: "admin.example.com",
            path: "/admin/*",
            forward: "/admin-panel",
            application: "Admin Dashboard",
            status: ConfigStatus::Active,
            created: ("admin@company.com", "2024-01-10T09:15:00Z"),
            updated: ("admin@company.com", "2024-01-18T16:20:00Z"),
            backends: vec![Backend::new("admin-backend.example.com", 8443, Protocol::Https)],
            tags: &["production", "admin"],
        },
        Sample {
            id: "3",
            domain: "test.example.com",
            path: "/test/*",
            forward: "/test-backend",
            application: "Testing Environment",
            status: ConfigStatus::Draft,
            created: ("dev@company.com", "2024-01-25T11:00:00Z"),
            updated: ("dev@company.com", "2024-01-25T11:00:00Z"),
            backends: vec![Backend {
                enabled: false,
                ..Backend::new("test-backend.example.com", 8080, Protocol::Http)
            }],
            tags: &["testing", "dev"],
        },
    ];

    samples
        .into_iter()
        .map(|s| {
            let draft = GatewayConfigDraft {
                backend_forward_path: Some(s.forward.to_string()),
                application: Some(s.application.to_string()),
                status: Some(s.status),
                backends: Some(s.backends),
                tags: Some(s.tags.iter().map(|t| t.to_string()).collect()),
                ..GatewayConfigDraft::new(s.domain, s.path)
            };
            let mut config = GatewayConfig::from_draft(s.id.to_string(), draft, s.created.0);
            config.created_at = timestamp(s.created.1);
            config.updated_by = s.updated.0.to_string();
            config.updated_at = timestamp(s.updated.1);
            config
        })
        .map(|mut config| {
            match config.id.as_str() {
                "1" => {
                    config.headers = HeaderSet {
                        request: vec![HeaderEntry::new("X-API-Version", "v1"), HeaderEntry::new("X-Request-ID", "${uuid}")],
                        response: vec![],
                    };
                    config.cookies = CookiePolicy {
                        global_strategy: CookieStrategy::Passthrough,
                        exceptions: vec![CookieException {
                            cookie_name: "session_id".to_string(),
                            strategy: CookieStrategy::Persist,
                        }],
                    };
                    config.limiters = LimiterSettings {
                        max_concurrent: Some(50),
                        max_per_minute: Some(1000),
                        ..Default::default()
                    };
                }
                "2" => {
                    config.headers.request.push(HeaderEntry::new("X-Admin-Token", "${admin.token}"));
                    config.limiters = LimiterSettings {
                        ip_rules: vec![IpRule {
                            ip_or_cidr: "10.0.0.0/8".to_string(),
                            mode: IpMode::Allow,
                        }],
                        max_concurrent: Some(10),
                        max_per_minute: Some(100),
                        ..Default::default()
                    };
                }
                _ => {}
            }
            config
        })
        .collect()
}
