//! Origin policy for WebSocket upgrades.
//!
//! Evaluated by the connection adapter before a connection ever reaches the
//! [`Hub`](crate::hub::Hub). The policy is a plain value carried in
//! [`HubConfig`](crate::hub::HubConfig), so different hubs in one process can
//! run with different policies.

use url::{Host, Url};

/// Which browser origins may open a signaling connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Accept every origin.
    AllowAll,
    /// Accept only origins exactly equal to one of these strings.
    ///
    /// Requests without an `Origin` header fall back to the loopback host
    /// check, so local non-browser tools keep working.
    AllowList(Vec<String>),
    /// Accept only loopback origins, or loopback hosts when no origin is sent.
    #[default]
    Loopback,
}

impl OriginPolicy {
    /// Parses the `WS_ALLOWED_ORIGINS` format.
    ///
    /// `*` allows everything, a comma-separated list becomes an allow-list,
    /// and an empty value selects the loopback default.
    #[must_use]
    pub fn from_setting(value: &str) -> Self {
        let value = value.trim();
        if value == "*" {
            return Self::AllowAll;
        }
        let allowed: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if allowed.is_empty() {
            Self::Loopback
        } else {
            Self::AllowList(allowed)
        }
    }

    /// Decides whether a request with these `Origin` and `Host` headers may
    /// upgrade. An empty header counts as absent.
    #[must_use]
    pub fn allows(&self, origin: Option<&str>, host: Option<&str>) -> bool {
        let origin = origin.filter(|o| !o.is_empty());
        match (self, origin) {
            (Self::AllowAll, _) => true,
            (Self::AllowList(_) | Self::Loopback, None) => host.is_some_and(authority_is_loopback),
            (Self::AllowList(allowed), Some(origin)) => allowed.iter().any(|a| a == origin),
            (Self::Loopback, Some(origin)) => origin_is_loopback(origin),
        }
    }
}

impl std::fmt::Display for OriginPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllowAll => write!(f, "allow-all"),
            Self::AllowList(allowed) => write!(f, "allow-list({})", allowed.join(",")),
            Self::Loopback => write!(f, "loopback"),
        }
    }
}

fn origin_is_loopback(origin: &str) -> bool {
    Url::parse(origin)
        .ok()
        .is_some_and(|url| url.host().is_some_and(|h| is_loopback(&h)))
}

/// `Host` headers are bare authorities (`name[:port]`), so borrow the URL
/// parser by giving them a scheme.
fn authority_is_loopback(authority: &str) -> bool {
    origin_is_loopback(&format!("http://{authority}"))
}

fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => name.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => ip.is_loopback(),
        Host::Ipv6(ip) => ip.is_loopback(),
    }
}
