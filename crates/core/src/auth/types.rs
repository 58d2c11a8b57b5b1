use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

impl AuthRequest {
    /// Value of the named cookie from the `Cookie` header, if present.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get("cookie")
            .and_then(|header| cookie_value(header, name))
    }
}

/// Find a cookie in a `Cookie` header value.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then(|| value.trim())
    })
}

/// Resolve the client address for rate limiting and logging.
///
/// Forwarding headers are only believed when the socket peer is one of
/// `trusted_proxies`, or unknown (in-process callers). Then the address is
/// the right-most `X-Forwarded-For` entry that is not itself a trusted
/// proxy, else `X-Real-IP`. Otherwise it is the peer. Unparseable header
/// values are skipped and loopback is the last resort.
pub fn resolve_client_ip(
    headers: &HashMap<String, String>,
    peer: Option<IpAddr>,
    trusted_proxies: &[IpAddr],
) -> IpAddr {
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    match peer {
        Some(peer) if !trusted_proxies.contains(&peer) => return peer,
        _ => {}
    }

    let forwarded = headers.get("x-forwarded-for").and_then(|v| {
        v.split(',')
            .rev()
            .filter_map(|entry| entry.trim().parse::<IpAddr>().ok())
            .find(|ip| !trusted_proxies.contains(ip))
    });
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.trim().parse().ok())
    };

    forwarded.or_else(real_ip).or(peer).unwrap_or(loopback)
}

/// Authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub method: String,
    #[serde(default)]
    pub email: Option<String>,
    pub claims: HashMap<String, serde_json::Value>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            method: "none".to_string(),
            email: None,
            claims: HashMap::new(),
        }
    }
}
