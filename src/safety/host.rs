//! Host and IP classification for the SSRF guard.
//!
//! Classification is purely lexical: a literal address is checked against a
//! fixed table of reserved ranges and a name is checked against the
//! localhost names. No DNS lookup happens, so a public-looking name that
//! resolves to a private address is classified `Public`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::Serialize;

/// Network class of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostClass {
    Public,
    Private,
    Loopback,
    LinkLocal,
    /// `0.0.0.0/8` or `::`.
    Unspecified,
    /// Empty or not a syntactically valid host name.
    Invalid,
}

impl HostClass {
    pub fn is_public(&self) -> bool {
        matches!(self, HostClass::Public)
    }
}

/// Names that always refer to the local machine.
const LOCALHOST_NAMES: &[&str] = &["localhost", "localhost.localdomain", "ip6-localhost"];

/// Reserved IPv4 ranges as (network, prefix length, class).
const RESERVED_V4: &[([u8; 4], u8, HostClass)] = &[
    ([10, 0, 0, 0], 8, HostClass::Private),
    ([172, 16, 0, 0], 12, HostClass::Private),
    ([192, 168, 0, 0], 16, HostClass::Private),
    ([127, 0, 0, 0], 8, HostClass::Loopback),
    ([169, 254, 0, 0], 16, HostClass::LinkLocal),
    ([0, 0, 0, 0], 8, HostClass::Unspecified),
];

/// Classify a hostname or literal IP address.
///
/// IPv6 literals may be given with or without brackets.
pub fn classify(hostname: &str) -> HostClass {
    let host = hostname.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host.parse::<IpAddr>() {
        return classify_ip(ip);
    }

    let name = host.trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() || !is_valid_hostname(&name) {
        return HostClass::Invalid;
    }

    if LOCALHOST_NAMES.contains(&name.as_str()) || name.ends_with(".localhost") {
        return HostClass::Loopback;
    }

    HostClass::Public
}

/// Classify a literal address against the reserved range table.
pub fn classify_ip(ip: IpAddr) -> HostClass {
    match ip {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

fn classify_v4(ip: Ipv4Addr) -> HostClass {
    let addr = u32::from(ip);
    RESERVED_V4
        .iter()
        .find(|(network, prefix, _)| {
            let mask = u32::MAX << (32 - u32::from(*prefix));
            addr & mask == u32::from(Ipv4Addr::from(*network)) & mask
        })
        .map(|(_, _, class)| *class)
        .unwrap_or(HostClass::Public)
}

fn classify_v6(ip: Ipv6Addr) -> HostClass {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return classify_v4(v4);
    }
    if ip.is_loopback() {
        return HostClass::Loopback;
    }
    if ip.is_unspecified() {
        return HostClass::Unspecified;
    }
    let first = ip.segments()[0];
    if first & 0xfe00 == 0xfc00 {
        return HostClass::Private;
    }
    if first & 0xffc0 == 0xfe80 {
        return HostClass::LinkLocal;
    }
    HostClass::Public
}

/// Letters, digits, hyphens and underscores in dot-separated labels of at
/// most 63 bytes.
fn is_valid_hostname(name: &str) -> bool {
    name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}
