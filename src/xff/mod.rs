//! Client address resolution behind reverse proxies
//!
//! When the immediate peer is an internal or trusted proxy, the
//! `X-Forwarded-For` chain is walked from right to left. Internal proxies are
//! skipped, trusted proxies are skipped and recorded in the proxies header,
//! and the first address that is neither is the client. If every entry is a
//! proxy, the leftmost one is used. Requests from any other peer keep the peer
//! address.
//!
//! Proxy patterns are regular expressions matched against the whole textual
//! address.
//!
//! ```
//! use authgate::auth::AuthRequest;
//! use authgate::xff::{resolve, XffConfig};
//!
//! let mut request = AuthRequest::default();
//! request.headers.insert("x-forwarded-for".into(), "203.0.113.9, 10.0.0.2".into());
//!
//! let peer = "10.0.0.1:4711".parse().unwrap();
//! let resolved = resolve(&XffConfig::default(), peer, &request).unwrap();
//! assert_eq!(resolved.to_string(), "203.0.113.9:4711");
//! ```

use crate::auth::AuthRequest;
use crate::repository::{ConfigurationChangeListener, ListenerError, Settings};
use arc_swap::ArcSwap;
use lazy_static::lazy_static;
use regex_lite::Regex;
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace};

/// RFC 1918, link-local and loopback addresses
pub const DEFAULT_INTERNAL_PROXIES: &str = r"10\.\d{1,3}\.\d{1,3}\.\d{1,3}|192\.168\.\d{1,3}\.\d{1,3}|169\.254\.\d{1,3}\.\d{1,3}|127\.\d{1,3}\.\d{1,3}\.\d{1,3}|172\.1[6-9]\.\d{1,3}\.\d{1,3}|172\.2[0-9]\.\d{1,3}\.\d{1,3}|172\.3[0-1]\.\d{1,3}\.\d{1,3}|0:0:0:0:0:0:0:1|::1";

pub const DEFAULT_REMOTE_IP_HEADER: &str = "x-forwarded-for";
pub const DEFAULT_PROXIES_HEADER: &str = "x-forwarded-by";

const XFF_KEY: &str = "dynamic.http.xff";

lazy_static! {
    static ref DEFAULT_INTERNAL_PATTERN: Regex = full_match(DEFAULT_INTERNAL_PROXIES).unwrap();
}

#[derive(Error, Debug)]
pub enum XffError {
    #[error("Cannot resolve address '{0}'")]
    AddressUnresolvable(String),

    #[error("Invalid proxy pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Resolver settings
#[derive(Debug, Clone)]
pub struct XffConfig {
    pub enabled: bool,
    internal_proxies: Regex,
    trusted_proxies: Option<Regex>,
    pub proxies_header: String,
    pub remote_ip_header: String,
}

impl XffConfig {
    /// Enabled with custom proxy patterns
    pub fn new(internal_proxies: &str, trusted_proxies: Option<&str>) -> Result<Self, XffError> {
        Ok(Self {
            enabled: true,
            internal_proxies: full_match(internal_proxies)?,
            trusted_proxies: trusted_proxies
                .filter(|p| !p.trim().is_empty())
                .map(full_match)
                .transpose()?,
            proxies_header: DEFAULT_PROXIES_HEADER.to_string(),
            remote_ip_header: DEFAULT_REMOTE_IP_HEADER.to_string(),
        })
    }

    /// Resolution switched off; the peer address is always used
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Read `dynamic.http.xff.*` from a `config` document.
    ///
    /// `enabled` defaults to true.
    pub fn from_settings(config: &Settings) -> Result<Self, XffError> {
        let key = |name: &str| format!("{}.{}", XFF_KEY, name);
        if !config.get_bool(&key("enabled"), true) {
            return Ok(Self::disabled());
        }

        let mut resolved = match proxy_pattern(config, &key("internalProxies")) {
            Some(internal) => {
                let trusted = proxy_pattern(config, &key("trustedProxies"));
                Self::new(&internal, trusted.as_deref())?
            }
            None => Self {
                trusted_proxies: proxy_pattern(config, &key("trustedProxies"))
                    .filter(|p| !p.trim().is_empty())
                    .map(|p| full_match(&p))
                    .transpose()?,
                ..Self::default()
            },
        };
        if let Some(header) = config.get_str(&key("proxiesHeader")) {
            resolved.proxies_header = header.to_ascii_lowercase();
        }
        if let Some(header) = config.get_str(&key("remoteIpHeader")) {
            resolved.remote_ip_header = header.to_ascii_lowercase();
        }
        Ok(resolved)
    }

    fn is_internal(&self, address: &str) -> bool {
        self.internal_proxies.is_match(address)
    }

    fn is_trusted(&self, address: &str) -> bool {
        self.trusted_proxies
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(address))
    }
}

impl Default for XffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            internal_proxies: DEFAULT_INTERNAL_PATTERN.clone(),
            trusted_proxies: None,
            proxies_header: DEFAULT_PROXIES_HEADER.to_string(),
            remote_ip_header: DEFAULT_REMOTE_IP_HEADER.to_string(),
        }
    }
}

/// A proxy pattern given as one regex string or as a list of alternatives
fn proxy_pattern(config: &Settings, path: &str) -> Option<String> {
    match config.get(path) {
        Some(Value::Array(_)) => {
            let alternatives: Vec<String> = config
                .get_str_list(path)
                .iter()
                .map(|p| format!("(?:{})", p))
                .collect();
            (!alternatives.is_empty()).then(|| alternatives.join("|"))
        }
        _ => config.get_str(path),
    }
}

fn full_match(pattern: &str) -> Result<Regex, XffError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| XffError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Outcome of walking the forwarded chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub client: SocketAddr,
    /// Trusted proxies passed on the way in, leftmost first
    pub trusted_proxies: Vec<String>,
    /// Chain entries left of the client
    pub remaining: Vec<String>,
}

/// Resolve the client address of a request received from `peer`.
///
/// The resolved address keeps the peer's port.
pub fn resolve(
    config: &XffConfig,
    peer: SocketAddr,
    request: &AuthRequest,
) -> Result<SocketAddr, XffError> {
    walk(config, peer, request).map(|resolution| resolution.client)
}

/// Resolve and rewrite `request` the way a proxy-aware server sees it.
///
/// Sets `remote_addr`, replaces the remote-IP header with the entries left of
/// the client and lists the trusted proxies in the proxies header.
pub fn resolve_request(
    config: &XffConfig,
    peer: SocketAddr,
    request: &mut AuthRequest,
) -> Result<SocketAddr, XffError> {
    let resolution = walk(config, peer, request)?;

    if resolution.client != peer {
        let remote_ip_header = config.remote_ip_header.to_ascii_lowercase();
        if resolution.remaining.is_empty() {
            request.headers.remove(&remote_ip_header);
        } else {
            request
                .headers
                .insert(remote_ip_header, resolution.remaining.join(", "));
        }

        let proxies_header = config.proxies_header.to_ascii_lowercase();
        if resolution.trusted_proxies.is_empty() {
            request.headers.remove(&proxies_header);
        } else {
            request
                .headers
                .insert(proxies_header, resolution.trusted_proxies.join(", "));
        }
    }

    request.remote_addr = Some(resolution.client);
    Ok(resolution.client)
}

fn walk(config: &XffConfig, peer: SocketAddr, request: &AuthRequest) -> Result<Resolution, XffError> {
    let unchanged = Resolution {
        client: peer,
        trusted_proxies: Vec::new(),
        remaining: Vec::new(),
    };

    if !config.enabled {
        return Ok(unchanged);
    }

    let peer_ip = peer.ip().to_string();
    if !config.is_internal(&peer_ip) && !config.is_trusted(&peer_ip) {
        trace!(peer = %peer, "Peer is not a known proxy");
        return Ok(unchanged);
    }

    let chain: Vec<&str> = request
        .header(&config.remote_ip_header)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut client = None;
    let mut trusted_proxies = Vec::new();
    let mut index = chain.len();
    while index > 0 {
        index -= 1;
        let hop = chain[index];
        client = Some(hop);
        if config.is_internal(hop) {
            continue;
        }
        if config.is_trusted(hop) {
            trusted_proxies.insert(0, hop.to_string());
            continue;
        }
        break;
    }

    let Some(client) = client else {
        return Ok(unchanged);
    };

    let ip = parse_address(client)?;
    let resolved = SocketAddr::new(ip, peer.port());
    debug!(peer = %peer, client = %resolved, "Resolved forwarded client address");

    Ok(Resolution {
        client: resolved,
        trusted_proxies,
        remaining: chain[..index].iter().map(|s| s.to_string()).collect(),
    })
}

/// Parse a forwarded entry: bare IP, `[v6]`, or `ip:port`
fn parse_address(entry: &str) -> Result<IpAddr, XffError> {
    if let Ok(ip) = entry.parse::<IpAddr>() {
        return Ok(ip);
    }
    if let Ok(addr) = entry.parse::<SocketAddr>() {
        return Ok(addr.ip());
    }
    entry
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|inner| inner.parse::<IpAddr>().ok())
        .ok_or_else(|| XffError::AddressUnresolvable(entry.to_string()))
}

/// Holds the current [`XffConfig`] and follows `config` changes
pub struct XffResolver {
    config: ArcSwap<XffConfig>,
}

impl XffResolver {
    /// Disabled until the first configuration arrives
    pub fn new() -> Self {
        Self {
            config: ArcSwap::from_pointee(XffConfig::disabled()),
        }
    }

    pub fn resolve(&self, peer: SocketAddr, request: &AuthRequest) -> Result<SocketAddr, XffError> {
        resolve(&self.config.load(), peer, request)
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<XffConfig> {
        self.config.load_full()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.load().enabled
    }
}

impl Default for XffResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationChangeListener for XffResolver {
    fn on_change(&self, config: &Settings) -> Result<(), ListenerError> {
        let resolved = XffConfig::from_settings(config)?;
        info!(enabled = resolved.enabled, "Proxy address resolution configured");
        self.config.store(Arc::new(resolved));
        Ok(())
    }
}
