//! HTTP API for the gateway-mapping console
//!
//! Serves the localized meta-information document that drives the form
//! renderer, CRUD endpoints for gateway records, and the DNS and TCP
//! diagnostic probes used by the backend editor.

use crate::catalog::MetaCatalog;
use crate::config::Config;
use crate::error::{ApiError, ApiErrorCode, Envelope};
use crate::gateway::{decode_component, paginate, ConfigStatus, GatewayConfigDraft, SearchQuery};
use crate::i18n::Language;
use crate::probe::{self, ConnectionTarget, Resolver, SystemResolver};
use crate::schema::FormValues;
use crate::store::{InMemoryStore, Repository};
use crate::validation::{CustomRuleRegistry, Validator};
use anyhow::Result;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Page whose forms validate gateway records
pub const GATEWAY_PAGE: &str = "gateway-mapping";

/// Header naming the user behind a write
pub const ACTOR_HEADER: &str = "x-console-user";

/// Actor recorded when no user header is sent
pub const DEFAULT_ACTOR: &str = "current-user@company.com";

/// Basic-form fields checked on create and update
const CHECKED_BASIC_FIELDS: [&str; 3] = ["domain", "requestPathPattern", "backendForwardPath"];

/// Success envelope for record routes
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

/// Shared state behind every request
pub struct AppState {
    catalog: MetaCatalog,
    store: Arc<dyn Repository>,
    validator: Validator,
    resolver: Arc<dyn Resolver>,
    connect_timeout: Duration,
}

impl AppState {
    pub fn new(
        catalog: MetaCatalog,
        store: Arc<dyn Repository>,
        resolver: Arc<dyn Resolver>,
        connect_timeout: Duration,
    ) -> Self {
        let validator = Validator::new(catalog.default_language(), CustomRuleRegistry::builtin());
        Self {
            catalog,
            store,
            validator,
            resolver,
            connect_timeout,
        }
    }

    /// Build the state described by a loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog = MetaCatalog::load(config.i18n.language()?)?;
        let store = if config.store.seed {
            InMemoryStore::with_sample_data()
        } else {
            InMemoryStore::new()
        };
        info!(records = store.len(), "Gateway record store initialized");

        Ok(Self::new(
            catalog,
            Arc::new(store),
            Arc::new(SystemResolver),
            config.probes.connect_timeout(),
        ))
    }

    pub fn catalog(&self) -> &MetaCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn Repository> {
        &self.store
    }
}

/// Console HTTP server
pub struct ConsoleServer {
    state: Arc<AppState>,
    listener: TcpListener,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConsoleServer {
    /// Bind the listener; port 0 picks an ephemeral port
    pub async fn bind(
        addr: SocketAddr,
        state: Arc<AppState>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            state,
            listener,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the shutdown signal flips
    pub async fn run(self) -> Result<()> {
        let Self {
            state,
            listener,
            mut shutdown_rx,
        } = self;
        info!(addr = %listener.local_addr()?, "Console API listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let state = Arc::clone(&state);
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(state, stream, addr).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Console API shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn serve_connection<S>(state: Arc<AppState>, stream: S, _addr: SocketAddr) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let state = Arc::clone(&state);
        async move { handle_request(state, req).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

/// Resolved route, before method dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    Health,
    Version,
    MetaInfo,
    Configs,
    ConfigStats,
    Config(&'a str),
    SetStatus(&'a str, ConfigStatus),
    DnsCheck,
    ConnectionTest,
}

impl<'a> Route<'a> {
    fn parse(path: &'a str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let route = match segments[..] {
            ["health"] => Route::Health,
            ["version"] => Route::Version,
            ["api", "meta-info"] => Route::MetaInfo,
            ["api", "gateway-configs"] => Route::Configs,
            ["api", "gateway-configs", "stats"] => Route::ConfigStats,
            ["api", "gateway-configs", id] if !id.is_empty() => Route::Config(id),
            ["api", "gateway-configs", id, "enable"] => Route::SetStatus(id, ConfigStatus::Active),
            ["api", "gateway-configs", id, "disable"] => Route::SetStatus(id, ConfigStatus::Inactive),
            ["api", "dns-check"] => Route::DnsCheck,
            ["api", "connection-test"] => Route::ConnectionTest,
            _ => return None,
        };
        Some(route)
    }

    fn envelope(&self) -> Envelope {
        match self {
            Route::Configs | Route::ConfigStats | Route::Config(_) | Route::SetStatus(..) => Envelope::Record,
            _ => Envelope::Plain,
        }
    }
}

/// Route one request. Handler errors become JSON error responses.
pub async fn handle_request<B>(state: Arc<AppState>, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes> + Send,
    B::Error: std::fmt::Display,
{
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    debug!(%method, %path, "API request");

    let Some(route) = Route::parse(&path) else {
        return Ok(ApiError::NotFound("Not found".to_string()).to_response(Envelope::Plain));
    };
    let envelope = route.envelope();

    let result = match (&method, route) {
        (&Method::GET, Route::Health) => Ok(json_response(StatusCode::OK, r#"{"status":"ok"}"#)),
        (&Method::GET, Route::Version) => {
            let version = serde_json::json!({
                "name": PKG_NAME,
                "version": VERSION,
            });
            Ok(json_response(StatusCode::OK, version.to_string()))
        }
        (&Method::GET, Route::MetaInfo) => meta_info(&state, req.uri().query()),
        (&Method::GET, Route::Configs) => list_configs(&state, req.uri().query()),
        (&Method::POST, Route::Configs) => create_config(&state, req).await,
        (&Method::GET, Route::ConfigStats) => {
            json_ok(StatusCode::OK, &ApiResponse::ok(state.store.summary()))
        }
        (&Method::GET, Route::Config(id)) => state
            .store
            .get(id)
            .map_err(ApiError::from)
            .and_then(|config| json_ok(StatusCode::OK, &ApiResponse::ok(config))),
        (&Method::PUT, Route::Config(id)) => update_config(&state, id, req).await,
        (&Method::DELETE, Route::Config(id)) => delete_config(&state, id, req.headers()),
        (&Method::POST, Route::SetStatus(id, status)) => set_status(&state, id, status, req.headers()),
        (&Method::POST, Route::DnsCheck) => dns_check(&state, req).await,
        (&Method::POST, Route::ConnectionTest) => connection_test(&state, req).await,
        _ => Err(ApiError::MethodNotAllowed(format!("Method {} not allowed", method))),
    };

    Ok(result.unwrap_or_else(|e| {
        match e.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR => error!(%method, %path, error = %e, "Request failed"),
            StatusCode::BAD_REQUEST => warn!(%method, %path, error = %e, "Request rejected"),
            status => debug!(%method, %path, %status, error = %e, "Request not served"),
        }
        e.to_response(envelope)
    }))
}

type HandlerResult = std::result::Result<Response<Full<Bytes>>, ApiError>;

fn meta_info(state: &AppState, query: Option<&str>) -> HandlerResult {
    let language = match query_param(query, "lang") {
        Some(code) => code.parse::<Language>().map_err(|_| ApiError::BadRequest {
            code: ApiErrorCode::InvalidLanguage,
            message: "Invalid language parameter".to_string(),
        })?,
        None => state.catalog.default_language(),
    };

    match query_param(query, "page") {
        Some(page) => {
            let document = state
                .catalog
                .page_document(language, &page)
                .ok_or_else(|| ApiError::NotFound("Page not found".to_string()))?;
            json_ok(StatusCode::OK, &document)
        }
        None => {
            let document = state.catalog.document(language).ok_or_else(|| {
                ApiError::internal("Failed to load meta information", format!("no document for {}", language.code()))
            })?;
            json_ok(StatusCode::OK, &*document)
        }
    }
}

#[derive(Serialize)]
struct ListResponse<T: Serialize> {
    success: bool,
    data: Vec<T>,
    pagination: crate::gateway::Pagination,
}

fn list_configs(state: &AppState, query: Option<&str>) -> HandlerResult {
    let search = SearchQuery::from_query_string(query);
    let matches = state.store.list(&search);
    let (data, pagination) = paginate(&matches, search.page, search.limit);
    json_ok(
        StatusCode::OK,
        &ListResponse {
            success: true,
            data,
            pagination,
        },
    )
}

async fn create_config<B>(state: &AppState, req: Request<B>) -> HandlerResult
where
    B: Body<Data = Bytes> + Send,
    B::Error: std::fmt::Display,
{
    let actor = actor(req.headers());
    let language = request_language(state, req.uri().query());
    let draft: GatewayConfigDraft = read_json(req).await?;

    let missing = draft.missing_required();
    if !missing.is_empty() {
        return Err(ApiError::bad_request(format!("Missing required fields: {}", missing.join(", "))));
    }
    validate_draft(state, &draft, language)?;

    let config = state.store.create(draft, &actor)?;
    json_ok(
        StatusCode::CREATED,
        &ApiResponse::with_message(config, "Configuration created successfully"),
    )
}

async fn update_config<B>(state: &AppState, id: &str, req: Request<B>) -> HandlerResult
where
    B: Body<Data = Bytes> + Send,
    B::Error: std::fmt::Display,
{
    let actor = actor(req.headers());
    let language = request_language(state, req.uri().query());
    let draft: GatewayConfigDraft = read_json(req).await?;

    validate_draft(state, &draft, language)?;

    let config = state.store.update(id, draft, &actor)?;
    json_ok(
        StatusCode::OK,
        &ApiResponse::with_message(config, "Configuration updated successfully"),
    )
}

fn delete_config(state: &AppState, id: &str, headers: &HeaderMap) -> HandlerResult {
    let removed = state.store.delete(id)?;
    info!(id, domain = %removed.domain, actor = %actor(headers), "Gateway record deleted");
    json_ok(
        StatusCode::OK,
        &ApiResponse::<()> {
            success: true,
            data: None,
            message: Some("Configuration deleted successfully".to_string()),
        },
    )
}

fn set_status(state: &AppState, id: &str, status: ConfigStatus, headers: &HeaderMap) -> HandlerResult {
    let config = state.store.set_status(id, status, &actor(headers))?;
    json_ok(
        StatusCode::OK,
        &ApiResponse::with_message(config, format!("Configuration {}", status)),
    )
}

async fn dns_check<B>(state: &AppState, req: Request<B>) -> HandlerResult
where
    B: Body<Data = Bytes> + Send,
    B::Error: std::fmt::Display,
{
    let body: Value = read_json(req).await?;
    let hostname = probe::validate_hostname(body.get("hostname"))?;
    let report = probe::dns_check(state.resolver.as_ref(), &hostname).await?;
    json_ok(StatusCode::OK, &report)
}

async fn connection_test<B>(state: &AppState, req: Request<B>) -> HandlerResult
where
    B: Body<Data = Bytes> + Send,
    B::Error: std::fmt::Display,
{
    let body: Value = read_json(req).await?;
    let target = ConnectionTarget::from_json(&body)?;
    let report = probe::test_connection(&target, state.connect_timeout).await?;
    json_ok(StatusCode::OK, &report)
}

/// Run the basic-form field rules on the fields present in the draft, then
/// the form-level rules of the header and cookie forms
fn validate_draft(state: &AppState, draft: &GatewayConfigDraft, language: Language) -> Result<(), ApiError> {
    let meta = state
        .catalog
        .document(language)
        .ok_or_else(|| ApiError::internal("Failed to load meta information", language.code()))?;

    let mut messages = Vec::new();

    if let Some(form) = meta.get_form(GATEWAY_PAGE, "basic") {
        let values = draft.basic_values();
        for key in CHECKED_BASIC_FIELDS {
            let (Some(field), Some(value)) = (form.field(key), values.get(key)) else {
                continue;
            };
            if let Some(err) = state.validator.validate_field(field, Some(value), language, &values) {
                messages.push(err.message);
            }
        }
    }

    let sections: [(&str, FormValues); 2] = [("headers", draft.header_values()), ("cookies", draft.cookie_values())];
    for (form_key, values) in sections {
        if values.is_empty() {
            continue;
        }
        if let Some(form) = meta.get_form(GATEWAY_PAGE, form_key) {
            messages.extend(
                state
                    .validator
                    .validate_form_rules(form, &values, language)
                    .into_iter()
                    .map(|e| e.message),
            );
        }
    }

    if messages.is_empty() {
        Ok(())
    } else {
        Err(ApiError::BadRequest {
            code: ApiErrorCode::ValidationFailed,
            message: messages.join("; "),
        })
    }
}

async fn read_json<B, T>(req: Request<B>) -> Result<T, ApiError>
where
    B: Body<Data = Bytes> + Send,
    B::Error: std::fmt::Display,
    T: serde::de::DeserializeOwned,
{
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read request body: {}", e)))?
        .to_bytes();
    if body.is_empty() {
        return Err(ApiError::bad_request("Request body is required"));
    }
    serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))
}

/// First value of `key` in a raw query string, percent-decoded.
/// An empty value counts as absent.
fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| decode_component(v))
        .filter(|v| !v.is_empty())
}

/// `?lang=` when valid, otherwise the catalog default
fn request_language(state: &AppState, query: Option<&str>) -> Language {
    query_param(query, "lang")
        .and_then(|code| code.parse().ok())
        .unwrap_or_else(|| state.catalog.default_language())
}

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

fn json_ok<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> HandlerResult {
    let json = serde_json::to_string(body).map_err(|e| ApiError::internal("Failed to encode response", e))?;
    Ok(json_response(status, json))
}

fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(body.into()))
        .expect("valid response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;
    use std::net::IpAddr;

    struct StaticResolver(Vec<IpAddr>);

    #[async_trait]
    impl Resolver for StaticResolver {
        async fn resolve_ipv4(&self, _hostname: &str) -> io::Result<Vec<IpAddr>> {
            Ok(self.0.iter().copied().filter(IpAddr::is_ipv4).collect())
        }

        async fn resolve_ipv6(&self, _hostname: &str) -> io::Result<Vec<IpAddr>> {
            Ok(self.0.iter().copied().filter(IpAddr::is_ipv6).collect())
        }
    }

    fn state_with(addresses: Vec<IpAddr>) -> Arc<AppState> {
        let catalog = MetaCatalog::load(Language::En).unwrap();
        Arc::new(AppState::new(
            catalog,
            Arc::new(InMemoryStore::with_sample_data()),
            Arc::new(StaticResolver(addresses)),
            Duration::from_secs(2),
        ))
    }

    fn state() -> Arc<AppState> {
        state_with(vec!["10.0.0.1".parse().unwrap()])
    }

    fn request(method: Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn call(state: &Arc<AppState>, req: Request<Full<Bytes>>) -> (StatusCode, Value) {
        let response = handle_request(Arc::clone(state), req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[test]
    fn test_route_parse() {
        assert_eq!(Route::parse("/health"), Some(Route::Health));
        assert_eq!(Route::parse("/api/meta-info"), Some(Route::MetaInfo));
        assert_eq!(Route::parse("/api/gateway-configs/"), Some(Route::Configs));
        assert_eq!(Route::parse("/api/gateway-configs/stats"), Some(Route::ConfigStats));
        assert_eq!(Route::parse("/api/gateway-configs/42"), Some(Route::Config("42")));
        assert_eq!(
            Route::parse("/api/gateway-configs/42/disable"),
            Some(Route::SetStatus("42", ConfigStatus::Inactive))
        );
        assert_eq!(Route::parse("/api/unknown"), None);
        assert_eq!(Route::parse("/api/gateway-configs/42/archive"), None);
    }

    #[test]
    fn test_query_param() {
        assert_eq!(query_param(Some("lang=zh&page=gateway-mapping"), "page"), Some("gateway-mapping".to_string()));
        assert_eq!(query_param(Some("q=a%20b"), "q"), Some("a b".to_string()));
        assert_eq!(query_param(Some("lang"), "lang"), None);
        assert_eq!(query_param(Some("lang=&page=x"), "lang"), None);
        assert_eq!(query_param(None, "lang"), None);
    }

    #[test]
    fn test_actor_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor(&headers), DEFAULT_ACTOR);
        headers.insert(ACTOR_HEADER, "ops@company.com".parse().unwrap());
        assert_eq!(actor(&headers), "ops@company.com");
    }

    #[test]
    fn test_api_response() {
        let response = ApiResponse::ok("test");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": "test"}));

        let response = ApiResponse::with_message(1, "done");
        assert_eq!(response.message.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_health_and_version() {
        let state = state();
        let (status, body) = call(&state, request(Method::GET, "/health", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call(&state, request(Method::GET, "/version", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], VERSION);
    }

    #[tokio::test]
    async fn test_meta_info_languages() {
        let state = state();
        let (status, body) = call(&state, request(Method::GET, "/api/meta-info?lang=zh", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["pages"].is_array());

        let (status, body) = call(&state, request(Method::GET, "/api/meta-info?lang=fr", "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid language parameter");
        assert_eq!(body["code"], "INVALID_LANGUAGE");
        assert!(body.get("success").is_none());
    }

    #[tokio::test]
    async fn test_meta_info_empty_params_use_defaults() {
        let state = state();
        let (_, full) = call(&state, request(Method::GET, "/api/meta-info", "")).await;

        let (status, body) = call(&state, request(Method::GET, "/api/meta-info?lang=&page=", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["defaultLanguage"], "en");
        assert_eq!(body["pages"], full["pages"]);
    }

    #[tokio::test]
    async fn test_meta_info_language_codes_are_exact() {
        let state = state();
        for code in ["EN", "Zh", "%20zh"] {
            let uri = format!("/api/meta-info?lang={}", code);
            let (status, body) = call(&state, request(Method::GET, &uri, "")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["code"], "INVALID_LANGUAGE");
        }
    }

    #[tokio::test]
    async fn test_meta_info_page_filter() {
        let state = state();
        let (status, body) = call(&state, request(Method::GET, "/api/meta-info?page=gateway-mapping", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pages"].as_array().unwrap().len(), 1);

        let (status, body) = call(&state, request(Method::GET, "/api/meta-info?page=nope", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Page not found");
    }

    #[tokio::test]
    async fn test_list_with_pagination() {
        let state = state();
        let (status, body) = call(&state, request(Method::GET, "/api/gateway-configs?limit=2", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["pagination"]["total"], 3);
        assert_eq!(body["pagination"]["totalPages"], 2);
    }

    #[tokio::test]
    async fn test_create_then_duplicate() {
        let state = state();
        let payload = r#"{"domain":"new.example.com","requestPathPattern":"/v1/*","backendForwardPath":"/"}"#;

        let (status, body) = call(&state, request(Method::POST, "/api/gateway-configs", payload)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["domain"], "new.example.com");
        assert_eq!(body["data"]["createdBy"], DEFAULT_ACTOR);

        let (status, body) = call(&state, request(Method::POST, "/api/gateway-configs", payload)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Domain and path pattern combination already exists");
    }

    #[tokio::test]
    async fn test_create_missing_required() {
        let state = state();
        let (status, body) = call(&state, request(Method::POST, "/api/gateway-configs", r#"{"domain":"a.com"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("requestPathPattern"));
    }

    #[tokio::test]
    async fn test_create_runs_form_rules() {
        let state = state();
        let payload = r#"{"domain":"bad domain!","requestPathPattern":"v1"}"#;
        let (status, body) = call(&state, request(Method::POST, "/api/gateway-configs", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert_eq!(body["error"], "Invalid domain format; Path must start with /");

        let payload = r#"{"domain":"a.com","requestPathPattern":"/x","headers":{"request":[
            {"name":"X-A","value":"1"},{"name":"X-A","value":"2"}]}}"#;
        let (status, body) = call(&state, request(Method::POST, "/api/gateway-configs", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Header names must be unique");
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let state = state();
        let (status, body) = call(&state, request(Method::POST, "/api/gateway-configs", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON"));
    }

    #[tokio::test]
    async fn test_get_update_delete() {
        let state = state();
        let (status, body) = call(&state, request(Method::GET, "/api/gateway-configs/1", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], "1");

        let mut req = request(Method::PUT, "/api/gateway-configs/1", r#"{"application":"b"}"#);
        req.headers_mut().insert(ACTOR_HEADER, "editor@company.com".parse().unwrap());
        let (status, body) = call(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["application"], "b");
        assert_eq!(body["data"]["updatedBy"], "editor@company.com");

        let (status, _) = call(&state, request(Method::DELETE, "/api/gateway-configs/1", "")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&state, request(Method::GET, "/api/gateway-configs/1", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Configuration not found");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_enable_disable_and_stats() {
        let state = state();
        let (status, body) = call(&state, request(Method::POST, "/api/gateway-configs/3/enable", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "active");

        let (status, body) = call(&state, request(Method::GET, "/api/gateway-configs/stats", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 3);
    }

    #[tokio::test]
    async fn test_method_not_allowed_and_unknown_route() {
        let state = state();
        let (status, _) = call(&state, request(Method::DELETE, "/api/gateway-configs", "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = call(&state, request(Method::GET, "/api/nothing", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dns_check() {
        let state = state();
        let (status, body) = call(&state, request(Method::POST, "/api/dns-check", r#"{"hostname":"svc.internal"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["ipAddresses"][0], "10.0.0.1");

        let (status, body) = call(&state, request(Method::POST, "/api/dns-check", r#"{"hostname":"bad host"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid hostname format");

        let empty = state_with(Vec::new());
        let (status, body) = call(&empty, request(Method::POST, "/api/dns-check", r#"{"hostname":"svc.internal"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "DNS resolution failed");
        assert_eq!(body["hostname"], "svc.internal");
    }

    #[tokio::test]
    async fn test_connection_test_rejects_bad_input() {
        let state = state();
        let (status, body) = call(
            &state,
            request(Method::POST, "/api/connection-test", r#"{"hostname":"localhost","port":70000,"protocol":"HTTP"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid port number. Port must be between 1 and 65535");

        let (status, _) = call(
            &state,
            request(Method::POST, "/api/connection-test", r#"{"hostname":"localhost","port":80,"protocol":"ftp"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_connection_test_success() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = state();
        let payload = format!(r#"{{"hostname":"127.0.0.1","port":{},"protocol":"https"}}"#, port);
        let (status, body) = call(&state, request(Method::POST, "/api/connection-test", &payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["protocol"], "https");
    }
}
