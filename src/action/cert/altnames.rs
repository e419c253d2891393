//! Subject alternative names for generated certificates

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::warn;

/// DNS and IP subject alternative names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AltNames {
    pub dns_names: Vec<String>,
    pub ips: Vec<IpAddr>,
}

impl AltNames {
    /// `localhost`, `127.0.0.1` and `::1`, present on every certificate
    pub fn with_defaults() -> Self {
        Self {
            dns_names: vec!["localhost".to_string()],
            ips: vec![IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)],
        }
    }

    /// Classify each SAN as an IP, DNS name or wildcard; drop anything else
    pub fn append_sans(&mut self, sans: &[String], cert_name: &str) {
        for san in sans {
            if let Ok(ip) = san.parse::<IpAddr>() {
                self.ips.push(ip);
            } else if is_dns1123_subdomain(san) || is_wildcard_dns1123_subdomain(san) {
                self.dns_names.push(san.clone());
            } else {
                warn!(
                    "'{}' was not added to the {} SAN, because it is not a valid IP or RFC-1123 compliant DNS entry",
                    san, cert_name
                );
            }
        }
    }

    /// Collapse repeated entries
    ///
    /// DNS names become a sorted set. IPs keep their first occurrence,
    /// compared by textual form.
    pub fn remove_duplicates(&mut self) {
        let dns: BTreeSet<String> = self.dns_names.drain(..).collect();
        self.dns_names = dns.into_iter().collect();

        let mut seen = BTreeSet::new();
        self.ips.retain(|ip| seen.insert(ip.to_string()));
    }
}

fn is_dns1123_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes[0] != b'-'
        && bytes[bytes.len() - 1] != b'-'
}

/// Lowercase RFC-1123 subdomain: dot-separated labels, at most 253 bytes
pub fn is_dns1123_subdomain(value: &str) -> bool {
    value.len() <= 253 && value.split('.').all(is_dns1123_label)
}

/// `*.` followed by an RFC-1123 subdomain
pub fn is_wildcard_dns1123_subdomain(value: &str) -> bool {
    value.len() <= 253
        && value
            .strip_prefix("*.")
            .is_some_and(is_dns1123_subdomain)
}
