//! Origin normalization and cross-origin admission.
//!
//! Browsers send the page origin in the `Origin` header; configuration
//! may list origins with schemes, ports, or trailing paths. Both sides
//! are reduced to a bare lowercase hostname before comparison, so the
//! admission check is a plain domain/subdomain match.

/// Reduces a raw `Origin` header value (or configured origin entry) to a
/// bare lowercase hostname.
///
/// Stripping order is scheme, path, query, fragment, port, each applied
/// to the progressively shortened string. Malformed input never fails;
/// the worst case is a hostname that matches nothing.
pub fn normalize_origin(origin: Option<&str>) -> String {
    let Some(raw) = origin else {
        return String::new();
    };

    let lower = raw.trim().to_ascii_lowercase();
    let mut host: &str = &lower;

    if let Some(rest) = host.strip_prefix("http://") {
        host = rest;
    } else if let Some(rest) = host.strip_prefix("https://") {
        host = rest;
    }

    for sep in ['/', '?', '#', ':'] {
        if let Some((head, _)) = host.split_once(sep) {
            host = head;
        }
    }

    host.to_string()
}

/// Decides whether a request origin may post beacons cross-origin.
///
/// Built once from configuration; extra entries are normalized at
/// construction so per-request checks are pure string comparisons.
#[derive(Clone, Debug)]
pub struct AdmissionPolicy {
    root_domain: String,
    extra_hosts: Vec<String>,
}

impl AdmissionPolicy {
    pub fn new(root_domain: &str, extra_origins: &[String]) -> Self {
        let extra_hosts = extra_origins
            .iter()
            .map(|entry| normalize_origin(Some(entry)))
            .filter(|host| !host.is_empty())
            .collect();

        Self {
            root_domain: normalize_origin(Some(root_domain)),
            extra_hosts,
        }
    }

    /// Admission rule: absent origins are always admitted (same-origin
    /// page loads and non-browser callers); present origins must be the
    /// root domain, a subdomain of it, or match an extra entry.
    pub fn admits(&self, origin: Option<&str>) -> bool {
        let Some(raw) = origin else {
            return true;
        };
        if raw.trim().is_empty() {
            return true;
        }

        let hostname = normalize_origin(Some(raw));

        matches_domain(&hostname, &self.root_domain)
            || self
                .extra_hosts
                .iter()
                .any(|extra| matches_domain(&hostname, extra))
    }
}

/// Exact domain or exact-subdomain match. A `.` boundary is required so
/// `evilnotexample.com` never matches the domain `example.com`.
fn matches_domain(hostname: &str, domain: &str) -> bool {
    if hostname.is_empty() || domain.is_empty() {
        return false;
    }
    hostname == domain || hostname.ends_with(&format!(".{domain}"))
}
