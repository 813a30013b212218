//! Backend reachability probes
//!
//! Two diagnostics used while editing backend servers: a DNS lookup that
//! reports every A and AAAA address of a hostname, and a raw TCP connect
//! with a deadline. Neither speaks HTTP; `protocol` is only validated and
//! echoed back.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, warn};

static HOSTNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("valid hostname regex")
});

/// Default connect deadline
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("Invalid hostname")]
    MissingHostname,
    #[error("Invalid hostname format")]
    InvalidHostname,
    #[error("Invalid port number. Port must be between 1 and 65535")]
    InvalidPort,
    #[error("Invalid protocol. Must be HTTP or HTTPS")]
    InvalidProtocol,
    #[error("DNS resolution failed")]
    NoAddresses { hostname: String, elapsed_ms: u64 },
    #[error("Connection refused - the server may not be running or the port is closed")]
    Refused { detail: String, elapsed_ms: u64 },
    #[error("Hostname not found - DNS resolution failed")]
    HostNotFound { detail: String, elapsed_ms: u64 },
    #[error("Host unreachable - network routing problem")]
    Unreachable { detail: String, elapsed_ms: u64 },
    #[error("Connection timed out")]
    Timeout { detail: String, elapsed_ms: u64 },
    #[error("{detail}")]
    Io { detail: String, elapsed_ms: u64 },
}

impl ProbeError {
    /// Whether the request itself was malformed (as opposed to the target)
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            ProbeError::MissingHostname | ProbeError::InvalidHostname | ProbeError::InvalidPort | ProbeError::InvalidProtocol
        )
    }

    /// Underlying cause, for diagnostics
    pub fn details(&self) -> Option<String> {
        match self {
            ProbeError::NoAddresses { .. } => Some("No IP addresses found for this hostname".to_string()),
            ProbeError::Refused { detail, .. }
            | ProbeError::HostNotFound { detail, .. }
            | ProbeError::Unreachable { detail, .. }
            | ProbeError::Timeout { detail, .. }
            | ProbeError::Io { detail, .. } => Some(detail.clone()),
            _ => None,
        }
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        match self {
            ProbeError::NoAddresses { elapsed_ms, .. }
            | ProbeError::Refused { elapsed_ms, .. }
            | ProbeError::HostNotFound { elapsed_ms, .. }
            | ProbeError::Unreachable { elapsed_ms, .. }
            | ProbeError::Timeout { elapsed_ms, .. }
            | ProbeError::Io { elapsed_ms, .. } => Some(*elapsed_ms),
            _ => None,
        }
    }

    /// Map a connect-stage I/O error onto a probe outcome
    pub fn from_connect_error(err: &io::Error, elapsed_ms: u64) -> Self {
        let detail = err.to_string();
        if err.kind() == io::ErrorKind::ConnectionRefused {
            return ProbeError::Refused { detail, elapsed_ms };
        }
        if err.kind() == io::ErrorKind::TimedOut {
            return ProbeError::Timeout { detail, elapsed_ms };
        }
        if is_unreachable(err) {
            return ProbeError::Unreachable { detail, elapsed_ms };
        }
        ProbeError::Io { detail, elapsed_ms }
    }
}

#[cfg(unix)]
fn is_unreachable(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::EHOSTUNREACH || code == libc::ENETUNREACH)
}

#[cfg(not(unix))]
fn is_unreachable(_err: &io::Error) -> bool {
    false
}

fn millis(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Name resolution, one address family at a time
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve_ipv4(&self, hostname: &str) -> io::Result<Vec<IpAddr>>;
    async fn resolve_ipv6(&self, hostname: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    async fn resolve_family(hostname: &str, want_v4: bool) -> io::Result<Vec<IpAddr>> {
        let addrs: Vec<IpAddr> = lookup_host((hostname, 0))
            .await?
            .map(|addr| addr.ip())
            .filter(|ip| ip.is_ipv4() == want_v4)
            .collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} records", if want_v4 { "A" } else { "AAAA" }),
            ));
        }
        Ok(addrs)
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve_ipv4(&self, hostname: &str) -> io::Result<Vec<IpAddr>> {
        Self::resolve_family(hostname, true).await
    }

    async fn resolve_ipv6(&self, hostname: &str) -> io::Result<Vec<IpAddr>> {
        Self::resolve_family(hostname, false).await
    }
}

/// Trim and check a hostname from a request body
pub fn validate_hostname(raw: Option<&Value>) -> Result<String, ProbeError> {
    let hostname = raw
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(ProbeError::MissingHostname)?;
    if !HOSTNAME_REGEX.is_match(hostname) {
        return Err(ProbeError::InvalidHostname);
    }
    Ok(hostname.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsReport {
    pub success: bool,
    pub hostname: String,
    pub ip_addresses: Vec<String>,
    pub response_time: u64,
    pub message: String,
}

/// Resolve A then AAAA records. A failure of either family alone is logged
/// and ignored; no addresses at all is [`ProbeError::NoAddresses`].
pub async fn dns_check(resolver: &dyn Resolver, hostname: &str) -> Result<DnsReport, ProbeError> {
    let start = Instant::now();
    let mut addresses = Vec::new();

    match resolver.resolve_ipv4(hostname).await {
        Ok(found) => addresses.extend(found),
        Err(e) => debug!(hostname, error = %e, "IPv4 resolution failed"),
    }
    match resolver.resolve_ipv6(hostname).await {
        Ok(found) => addresses.extend(found),
        Err(e) => debug!(hostname, error = %e, "IPv6 resolution failed"),
    }

    let elapsed_ms = millis(start);
    if addresses.is_empty() {
        warn!(hostname, "DNS resolution found no addresses");
        return Err(ProbeError::NoAddresses {
            hostname: hostname.to_string(),
            elapsed_ms,
        });
    }

    debug!(hostname, count = addresses.len(), elapsed_ms, "DNS resolution succeeded");
    Ok(DnsReport {
        success: true,
        hostname: hostname.to_string(),
        message: format!("Resolved {} IP address(es)", addresses.len()),
        ip_addresses: addresses.iter().map(IpAddr::to_string).collect(),
        response_time: elapsed_ms,
    })
}

/// A validated connection-test request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub hostname: String,
    pub port: u16,
    /// Lowercased `http` or `https`
    pub protocol: String,
}

impl ConnectionTarget {
    /// Validate `{hostname, port, protocol}`. `port` must be a JSON integer.
    pub fn from_json(body: &Value) -> Result<Self, ProbeError> {
        let hostname = body
            .get("hostname")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(ProbeError::MissingHostname)?;

        let port = body
            .get("port")
            .and_then(Value::as_u64)
            .filter(|p| (1..=65535).contains(p))
            .ok_or(ProbeError::InvalidPort)? as u16;

        let protocol = body
            .get("protocol")
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase)
            .filter(|p| p == "http" || p == "https")
            .ok_or(ProbeError::InvalidProtocol)?;

        Ok(Self {
            hostname: hostname.to_string(),
            port,
            protocol,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub success: bool,
    pub hostname: String,
    pub port: u16,
    pub protocol: String,
    /// Time spent in the TCP handshake
    pub response_time: u64,
    /// Lookup plus handshake
    pub total_time: u64,
    pub message: String,
}

enum Stage {
    Lookup(io::Error),
    Connect(io::Error),
}

/// Open and immediately close a TCP connection to the target
pub async fn test_connection(target: &ConnectionTarget, timeout: Duration) -> Result<ConnectionReport, ProbeError> {
    let start = Instant::now();

    let attempt = async {
        let addrs: Vec<SocketAddr> = lookup_host((target.hostname.as_str(), target.port))
            .await
            .map_err(Stage::Lookup)?
            .collect();
        if addrs.is_empty() {
            return Err(Stage::Lookup(io::Error::new(io::ErrorKind::NotFound, "no addresses")));
        }
        let connect_start = Instant::now();
        let stream = TcpStream::connect(&addrs[..]).await.map_err(Stage::Connect)?;
        drop(stream);
        Ok::<_, Stage>(millis(connect_start))
    };

    let outcome = tokio::time::timeout(timeout, attempt).await;
    let total_time = millis(start);

    let error = match outcome {
        Ok(Ok(response_time)) => {
            debug!(
                hostname = %target.hostname,
                port = target.port,
                protocol = %target.protocol,
                response_time,
                "Connection test succeeded"
            );
            return Ok(ConnectionReport {
                success: true,
                hostname: target.hostname.clone(),
                port: target.port,
                protocol: target.protocol.clone(),
                response_time,
                total_time,
                message: format!(
                    "Connected to {}:{} ({})",
                    target.hostname,
                    target.port,
                    target.protocol.to_ascii_uppercase()
                ),
            });
        }
        Ok(Err(Stage::Lookup(e))) => ProbeError::HostNotFound {
            detail: e.to_string(),
            elapsed_ms: total_time,
        },
        Ok(Err(Stage::Connect(e))) => ProbeError::from_connect_error(&e, total_time),
        Err(_) => ProbeError::Timeout {
            detail: format!("no response within {} ms", timeout.as_millis()),
            elapsed_ms: total_time,
        },
    };

    warn!(
        hostname = %target.hostname,
        port = target.port,
        error = %error,
        "Connection test failed"
    );
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::{Ipv4Addr, Ipv6Addr};
    use tokio::net::TcpListener;

    struct FixedResolver {
        v4: Option<Vec<IpAddr>>,
        v6: Option<Vec<IpAddr>>,
    }

    #[async_trait]
    impl Resolver for FixedResolver {
        async fn resolve_ipv4(&self, _hostname: &str) -> io::Result<Vec<IpAddr>> {
            self.v4
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no A records"))
        }

        async fn resolve_ipv6(&self, _hostname: &str) -> io::Result<Vec<IpAddr>> {
            self.v6
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no AAAA records"))
        }
    }

    #[test]
    fn test_validate_hostname() {
        assert_eq!(validate_hostname(Some(&json!(" example.com "))).unwrap(), "example.com");
        assert_eq!(validate_hostname(Some(&json!("localhost"))).unwrap(), "localhost");
        assert_eq!(validate_hostname(None).unwrap_err(), ProbeError::MissingHostname);
        assert_eq!(validate_hostname(Some(&json!("   "))).unwrap_err(), ProbeError::MissingHostname);
        assert_eq!(validate_hostname(Some(&json!(42))).unwrap_err(), ProbeError::MissingHostname);
        for bad in ["-bad.com", "bad..com", "under_score.com", "a b"] {
            assert_eq!(
                validate_hostname(Some(&json!(bad))).unwrap_err(),
                ProbeError::InvalidHostname,
                "{}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_dns_check_merges_families() {
        let resolver = FixedResolver {
            v4: Some(vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))]),
            v6: Some(vec![IpAddr::V6(Ipv6Addr::LOCALHOST)]),
        };
        let report = dns_check(&resolver, "example.com").await.unwrap();
        assert!(report.success);
        assert_eq!(report.ip_addresses, vec!["10.0.0.1".to_string(), "::1".to_string()]);
    }

    #[tokio::test]
    async fn test_dns_check_tolerates_one_family_failing() {
        let resolver = FixedResolver {
            v4: None,
            v6: Some(vec![IpAddr::V6(Ipv6Addr::LOCALHOST)]),
        };
        let report = dns_check(&resolver, "v6only.example").await.unwrap();
        assert_eq!(report.ip_addresses.len(), 1);
    }

    #[tokio::test]
    async fn test_dns_check_no_addresses() {
        let resolver = FixedResolver { v4: None, v6: Some(vec![]) };
        let err = dns_check(&resolver, "nothing.example").await.unwrap_err();
        match &err {
            ProbeError::NoAddresses { hostname, .. } => assert_eq!(hostname, "nothing.example"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.details().is_some());
        assert!(err.elapsed_ms().is_some());
    }

    #[test]
    fn test_connection_target_validation() {
        let ok = ConnectionTarget::from_json(&json!({"hostname": "localhost", "port": 8080, "protocol": "HTTPS"})).unwrap();
        assert_eq!(ok.port, 8080);
        assert_eq!(ok.protocol, "https");

        let err = |body: Value| ConnectionTarget::from_json(&body).unwrap_err();
        assert_eq!(err(json!({"port": 80, "protocol": "http"})), ProbeError::MissingHostname);
        assert_eq!(err(json!({"hostname": "h", "port": 0, "protocol": "http"})), ProbeError::InvalidPort);
        assert_eq!(err(json!({"hostname": "h", "port": 65536, "protocol": "http"})), ProbeError::InvalidPort);
        assert_eq!(err(json!({"hostname": "h", "port": "80", "protocol": "http"})), ProbeError::InvalidPort);
        assert_eq!(err(json!({"hostname": "h", "port": 80.5, "protocol": "http"})), ProbeError::InvalidPort);
        assert_eq!(err(json!({"hostname": "h", "port": 80, "protocol": "ftp"})), ProbeError::InvalidProtocol);
        assert_eq!(err(json!({"hostname": "h", "port": 80})), ProbeError::InvalidProtocol);
        assert!(err(json!({"hostname": "h", "port": 80})).is_invalid_input());
    }

    #[test]
    fn test_connect_error_classification() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(matches!(ProbeError::from_connect_error(&refused, 3), ProbeError::Refused { elapsed_ms: 3, .. }));

        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert!(matches!(ProbeError::from_connect_error(&timed_out, 0), ProbeError::Timeout { .. }));

        #[cfg(unix)]
        {
            let unreachable = io::Error::from_raw_os_error(libc::EHOSTUNREACH);
            assert!(matches!(
                ProbeError::from_connect_error(&unreachable, 0),
                ProbeError::Unreachable { .. }
            ));
        }

        let other = io::Error::new(io::ErrorKind::Other, "boom");
        let err = ProbeError::from_connect_error(&other, 0);
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_refused_message_mentions_refused() {
        let err = ProbeError::Refused { detail: String::new(), elapsed_ms: 0 };
        assert!(err.to_string().to_lowercase().contains("refused"));
    }

    #[tokio::test]
    async fn test_connection_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = ConnectionTarget {
            hostname: "127.0.0.1".to_string(),
            port,
            protocol: "http".to_string(),
        };
        let report = test_connection(&target, Duration::from_secs(5)).await.unwrap();
        assert!(report.success);
        assert_eq!(report.port, port);
        assert!(report.message.contains("HTTP"));
    }

    #[tokio::test]
    async fn test_connection_refused_on_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = ConnectionTarget {
            hostname: "127.0.0.1".to_string(),
            port,
            protocol: "http".to_string(),
        };
        let err = test_connection(&target, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Refused { .. }), "{:?}", err);
    }
}
