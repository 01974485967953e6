//! Network-origin trust assessment for attendance claims.
//!
//! Two independent signals come out of [`assess`]:
//! - membership of the operator-configured allow-list (hard signal; the
//!   decision engine rejects on failure), and
//! - a proxy/VPN suspicion verdict built as a union of heuristics, each of
//!   which keeps its human-readable reason so nothing is lost for audit.
//!
//! The heuristic tables (ports, VPN hostname markers, ranges) are injected
//! through [`NetworkPolicy`] so tests can supply deterministic fixtures.

use std::collections::HashMap;
use std::net::IpAddr;

use util::config::AppConfig;

/// Forwarding-related headers whose mere presence marks a request as proxied.
pub const FORWARD_HEADERS: [&str; 5] = [
    "via",
    "x-forwarded-for",
    "forwarded",
    "x-real-ip",
    "proxy-connection",
];

/// An inclusive dotted-octet range `a.b.c.d-e.f.g.h`.
///
/// Membership is tested octet-wise: all four octets must fall within the
/// corresponding bounds. This is the matching rule the campus allow-lists
/// are written against; it is deliberately not CIDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    lo: [u8; 4],
    hi: [u8; 4],
}

impl IpRange {
    pub fn new(lo: [u8; 4], hi: [u8; 4]) -> Self {
        Self { lo, hi }
    }

    /// Parses `a.b.c.d-e.f.g.h`. Returns `None` on any malformed part.
    pub fn parse(spec: &str) -> Option<Self> {
        let (lo_txt, hi_txt) = spec.split_once('-')?;
        Some(Self {
            lo: parse_octets(lo_txt.trim())?,
            hi: parse_octets(hi_txt.trim())?,
        })
    }

    pub fn contains(&self, ip: [u8; 4]) -> bool {
        ip.iter()
            .zip(self.lo.iter().zip(self.hi.iter()))
            .all(|(octet, (lo, hi))| octet >= lo && octet <= hi)
    }
}

fn parse_octets(txt: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = txt.split('.');
    for slot in octets.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

/// RFC1918 private ranges plus loopback; the fallback when no allow-list is
/// configured.
pub fn private_network_ranges() -> Vec<IpRange> {
    vec![
        IpRange::new([10, 0, 0, 0], [10, 255, 255, 255]),
        IpRange::new([172, 16, 0, 0], [172, 31, 255, 255]),
        IpRange::new([192, 168, 0, 0], [192, 168, 255, 255]),
        IpRange::new([127, 0, 0, 0], [127, 255, 255, 255]),
    ]
}

/// Injected heuristic tables for [`assess`].
#[derive(Debug, Clone)]
pub struct NetworkPolicy {
    pub allowed_ranges: Vec<IpRange>,
    pub proxy_ports: Vec<u16>,
    pub vpn_hostname_markers: Vec<String>,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            allowed_ranges: private_network_ranges(),
            proxy_ports: vec![8080, 3128, 1080, 9050, 8888],
            vpn_hostname_markers: ["vpn", "proxy", "tor", "exit", "relay"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl NetworkPolicy {
    /// Builds the policy from the global configuration, falling back to the
    /// built-in defaults for any unset field.
    pub fn from_config() -> Self {
        let cfg = AppConfig::global();
        let mut policy = Self::default();

        let ranges: Vec<IpRange> = cfg
            .allowed_ip_ranges
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(IpRange::parse)
            .collect();
        if !ranges.is_empty() {
            policy.allowed_ranges = ranges;
        }

        let ports: Vec<u16> = cfg
            .proxy_ports
            .split(',')
            .filter_map(|p| p.trim().parse().ok())
            .collect();
        if !ports.is_empty() {
            policy.proxy_ports = ports;
        }

        let markers: Vec<String> = cfg
            .vpn_hostname_markers
            .split(',')
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        if !markers.is_empty() {
            policy.vpn_hostname_markers = markers;
        }

        policy
    }
}

/// Raw request metadata the assessor inspects. Header names must be
/// lowercased by the caller (axum already provides them that way).
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<IpAddr>,
    pub remote_port: Option<u16>,
    pub headers: HashMap<String, String>,
    pub hostname: Option<String>,
    /// Client-declared UTC offset in whole hours (`x-client-utc-offset`).
    pub declared_utc_offset: Option<i32>,
    /// Longitude of the claimed location, for the timezone heuristic.
    pub longitude: Option<f64>,
    pub user_agent: Option<String>,
}

/// Parsed user-agent summary. Advisory only: logged with the assessment,
/// never used as a hard signal.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ClientFingerprint {
    pub browser: String,
    pub os: String,
    pub device: String,
}

impl ClientFingerprint {
    pub fn from_user_agent(ua: Option<&str>) -> Self {
        let ua = ua.unwrap_or_default().to_lowercase();

        let browser = if ua.contains("edg/") {
            "edge"
        } else if ua.contains("opr/") || ua.contains("opera") {
            "opera"
        } else if ua.contains("chrome") {
            "chrome"
        } else if ua.contains("safari") {
            "safari"
        } else if ua.contains("firefox") {
            "firefox"
        } else {
            "unknown"
        };

        let os = if ua.contains("android") {
            "android"
        } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
            "ios"
        } else if ua.contains("windows") {
            "windows"
        } else if ua.contains("mac os") || ua.contains("macintosh") {
            "macos"
        } else if ua.contains("linux") {
            "linux"
        } else {
            "unknown"
        };

        let device = if ua.contains("mobile") || ua.contains("iphone") || ua.contains("android") {
            "mobile"
        } else if ua.contains("ipad") || ua.contains("tablet") {
            "tablet"
        } else if ua.is_empty() {
            "unknown"
        } else {
            "desktop"
        };

        Self {
            browser: browser.into(),
            os: os.into(),
            device: device.into(),
        }
    }
}

/// The assessor's verdict. `factors` keeps every triggered reason in order;
/// none are dropped.
#[derive(Debug, Clone)]
pub struct TrustAssessment {
    pub ip: Option<IpAddr>,
    pub on_allowed_network: bool,
    pub proxy_suspected: bool,
    pub factors: Vec<String>,
    pub fingerprint: ClientFingerprint,
}

/// Pure inspection of request metadata against the policy. Callers decide
/// rejection; this function only reports.
pub fn assess(policy: &NetworkPolicy, meta: &RequestMeta) -> TrustAssessment {
    let on_allowed_network = match client_octets(meta.ip) {
        Some(octets) => policy.allowed_ranges.iter().any(|r| r.contains(octets)),
        None => false,
    };

    let mut factors = Vec::new();

    if let Some(port) = meta.remote_port {
        if policy.proxy_ports.contains(&port) {
            factors.push(format!("remote port {port} is a known proxy port"));
        }
    }

    for header in FORWARD_HEADERS {
        if meta.headers.contains_key(header) {
            factors.push(format!("forwarding header '{header}' present"));
        }
    }

    if let (Some(declared), Some(lon)) = (meta.declared_utc_offset, meta.longitude) {
        let estimated = (lon / 15.0).round() as i32;
        if declared != estimated {
            factors.push(format!(
                "declared timezone offset {declared} disagrees with location estimate {estimated}"
            ));
        }
    }

    if let Some(hostname) = &meta.hostname {
        let lowered = hostname.to_lowercase();
        for marker in &policy.vpn_hostname_markers {
            if lowered.contains(marker) {
                factors.push(format!("hostname contains VPN marker '{marker}'"));
            }
        }
    }

    TrustAssessment {
        ip: meta.ip,
        on_allowed_network,
        proxy_suspected: !factors.is_empty(),
        factors,
        fingerprint: ClientFingerprint::from_user_agent(meta.user_agent.as_deref()),
    }
}

fn client_octets(ip: Option<IpAddr>) -> Option<[u8; 4]> {
    match ip? {
        IpAddr::V4(v4) => Some(v4.octets()),
        // v4-mapped v6 addresses still count; anything else is off-network
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(|v4| v4.octets()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn meta_from(ip: [u8; 4]) -> RequestMeta {
        RequestMeta {
            ip: Some(IpAddr::V4(Ipv4Addr::from(ip))),
            ..Default::default()
        }
    }

    #[test]
    fn range_parse_and_octetwise_membership() {
        let r = IpRange::parse("10.0.0.0-10.255.255.255").unwrap();
        assert!(r.contains([10, 0, 0, 1]));
        assert!(r.contains([10, 255, 255, 255]));
        assert!(!r.contains([11, 0, 0, 1]));

        // octet-wise: every octet must sit inside its own bounds
        let narrow = IpRange::parse("192.168.1.10-192.168.1.50").unwrap();
        assert!(narrow.contains([192, 168, 1, 30]));
        assert!(!narrow.contains([192, 168, 1, 51]));
        assert!(!narrow.contains([192, 168, 2, 30]));
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert!(IpRange::parse("10.0.0.0").is_none());
        assert!(IpRange::parse("10.0.0-10.0.0.5").is_none());
        assert!(IpRange::parse("300.0.0.0-10.0.0.5").is_none());
        assert!(IpRange::parse("a.b.c.d-e.f.g.h").is_none());
    }

    #[test]
    fn default_policy_admits_private_and_loopback_only() {
        let policy = NetworkPolicy::default();

        for ip in [[10, 1, 2, 3], [172, 20, 0, 9], [192, 168, 4, 4], [127, 0, 0, 1]] {
            let verdict = assess(&policy, &meta_from(ip));
            assert!(verdict.on_allowed_network, "{ip:?} should be on-network");
        }

        let verdict = assess(&policy, &meta_from([41, 13, 9, 2]));
        assert!(!verdict.on_allowed_network);
    }

    #[test]
    fn missing_ip_is_off_network() {
        let verdict = assess(&NetworkPolicy::default(), &RequestMeta::default());
        assert!(!verdict.on_allowed_network);
    }

    #[test]
    fn proxy_port_triggers_suspicion() {
        let mut meta = meta_from([10, 0, 0, 2]);
        meta.remote_port = Some(3128);
        let verdict = assess(&NetworkPolicy::default(), &meta);
        assert!(verdict.proxy_suspected);
        assert_eq!(verdict.factors.len(), 1);
        assert!(verdict.factors[0].contains("3128"));
    }

    #[test]
    fn each_forwarding_header_triggers_independently() {
        for header in FORWARD_HEADERS {
            let mut meta = meta_from([10, 0, 0, 2]);
            meta.headers.insert(header.into(), "1".into());
            let verdict = assess(&NetworkPolicy::default(), &meta);
            assert!(verdict.proxy_suspected, "header {header} not flagged");
            assert!(verdict.factors[0].contains(header));
        }
    }

    #[test]
    fn timezone_disagreement_is_flagged() {
        let mut meta = meta_from([10, 0, 0, 2]);
        // Pune: lon 73.86 -> round(73.86 / 15) = +5
        meta.longitude = Some(73.86);
        meta.declared_utc_offset = Some(5);
        assert!(!assess(&NetworkPolicy::default(), &meta).proxy_suspected);

        meta.declared_utc_offset = Some(-3);
        let verdict = assess(&NetworkPolicy::default(), &meta);
        assert!(verdict.proxy_suspected);
        assert!(verdict.factors[0].contains("timezone"));
    }

    #[test]
    fn vpn_hostname_marker_is_flagged() {
        let mut meta = meta_from([10, 0, 0, 2]);
        meta.hostname = Some("eu-vpn-exit-12.example.net".into());
        let verdict = assess(&NetworkPolicy::default(), &meta);
        assert!(verdict.proxy_suspected);
        // "vpn" and "exit" both match; both reasons are retained
        assert_eq!(verdict.factors.len(), 2);
    }

    #[test]
    fn all_triggered_factors_accumulate() {
        let mut meta = meta_from([10, 0, 0, 2]);
        meta.remote_port = Some(8080);
        meta.headers.insert("via".into(), "proxy-a".into());
        meta.hostname = Some("campus-vpn.example".into());
        let verdict = assess(&NetworkPolicy::default(), &meta);
        assert_eq!(verdict.factors.len(), 3);
    }

    #[test]
    fn fingerprint_is_parsed_but_advisory() {
        let mut meta = meta_from([41, 13, 9, 2]); // off-network
        meta.user_agent =
            Some("Mozilla/5.0 (Linux; Android 14) Chrome/120.0 Mobile Safari/537.36".into());
        let verdict = assess(&NetworkPolicy::default(), &meta);
        assert_eq!(verdict.fingerprint.browser, "chrome");
        assert_eq!(verdict.fingerprint.os, "android");
        assert_eq!(verdict.fingerprint.device, "mobile");
        // fingerprint never contributes a factor
        assert!(verdict.factors.is_empty());
    }
}
