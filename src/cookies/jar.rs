use crate::cookies::HeaderStore;
use crate::http::Headers;
use dashmap::DashMap;
use time::OffsetDateTime;
use url::Url;

/// Maximum cookies kept per domain.
const MAX_COOKIES_PER_DOMAIN: usize = 50;

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub creation_time: OffsetDateTime,
    pub expiration_time: Option<OffsetDateTime>,
    pub secure: bool,
    pub host_only: bool,
}

impl StoredCookie {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expiration_time.is_some_and(|expiry| expiry <= now)
    }
}

/// In-memory RFC 6265 cookie jar keyed by domain.
#[derive(Default)]
pub struct CookieJar {
    store: DashMap<String, Vec<StoredCookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cookie(&self, cookie: StoredCookie) {
        let mut entry = self.store.entry(cookie.domain.clone()).or_default();

        // Replace a cookie with the same name and path
        entry.retain(|c| c.name != cookie.name || c.path != cookie.path);

        if cookie.is_expired(OffsetDateTime::now_utc()) {
            // An already expired Set-Cookie deletes the stored one
            return;
        }

        while entry.len() >= MAX_COOKIES_PER_DOMAIN {
            let Some(oldest) = entry
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| c.creation_time)
                .map(|(i, _)| i)
            else {
                break;
            };
            entry.remove(oldest);
        }

        entry.push(cookie);
    }

    /// Parse a `Set-Cookie` line received from `url` and store it.
    /// Returns false when the line is rejected.
    pub fn parse_and_save(&self, url: &Url, line: &str) -> bool {
        let parsed = match cookie::Cookie::parse(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unparseable Set-Cookie");
                return false;
            }
        };
        let host = url.host_str().unwrap_or("").to_lowercase();
        let now = OffsetDateTime::now_utc();

        let (domain, host_only) = match parsed.domain() {
            Some(d) => {
                let d = d.trim_start_matches('.').to_lowercase();
                if !domain_matches(&d, &host, false) {
                    tracing::debug!(domain = %d, host = %host, "Rejecting cookie for foreign domain");
                    return false;
                }
                (d, false)
            }
            None => (host, true),
        };

        let path = match parsed.path() {
            Some(p) if p.starts_with('/') => p.to_string(),
            _ => default_path(url.path()),
        };

        // Max-Age takes precedence over Expires
        let expiration_time = match parsed.max_age() {
            Some(max_age) => Some(now + max_age),
            None => parsed.expires_datetime(),
        };

        self.set_cookie(StoredCookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            creation_time: now,
            expiration_time,
            secure: parsed.secure().unwrap_or(false),
            host_only,
        });
        true
    }

    /// Cookies to send to `url`, longest path first.
    pub fn cookies_for_url(&self, url: &Url) -> Vec<StoredCookie> {
        let host = url.host_str().unwrap_or("").to_lowercase();
        let now = OffsetDateTime::now_utc();
        let mut result = Vec::new();

        for domain in matching_domains(&host) {
            if let Some(entry) = self.store.get(&domain) {
                result.extend(
                    entry
                        .iter()
                        .filter(|c| domain_matches(&c.domain, &host, c.host_only))
                        .filter(|c| path_matches(&c.path, url.path()))
                        .filter(|c| !c.secure || url.scheme() == "https")
                        .filter(|c| !c.is_expired(now))
                        .cloned(),
                );
            }
        }

        result.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.creation_time.cmp(&b.creation_time))
        });
        result
    }

    pub fn total_cookie_count(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

impl HeaderStore for CookieJar {
    fn load_for_request(&self, url: &str) -> Headers {
        let mut headers = Headers::new();
        let Ok(url) = Url::parse(url) else {
            return headers;
        };
        let cookies = self.cookies_for_url(&url);
        if cookies.is_empty() {
            return headers;
        }
        let line = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        if let Err(e) = headers.insert("Cookie", &line) {
            tracing::debug!(error = %e, "Dropping unsendable cookies");
        }
        headers
    }

    fn save_from_response(&self, url: &str, headers: &Headers) {
        let Ok(url) = Url::parse(url) else {
            return;
        };
        for value in headers.get_all("Set-Cookie") {
            if let Ok(line) = value.to_str() {
                self.parse_and_save(&url, line);
            }
        }
    }
}

/// RFC 6265 domain matching.
fn domain_matches(cookie_domain: &str, request_host: &str, host_only: bool) -> bool {
    if host_only {
        return cookie_domain.eq_ignore_ascii_case(request_host);
    }
    let cookie_domain = cookie_domain.trim_start_matches('.');
    if request_host.eq_ignore_ascii_case(cookie_domain) {
        return true;
    }
    request_host.len() > cookie_domain.len()
        && request_host
            .get(request_host.len() - cookie_domain.len()..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(cookie_domain))
        && request_host.as_bytes()[request_host.len() - cookie_domain.len() - 1] == b'.'
}

/// RFC 6265 path matching.
fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    if let Some(rest) = request_path.strip_prefix(cookie_path) {
        return cookie_path.ends_with('/') || rest.starts_with('/');
    }
    false
}

/// The directory of the request path, per RFC 6265 section 5.1.4.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => request_path[..i].to_string(),
    }
}

/// The host and its parent domains.
fn matching_domains(host: &str) -> Vec<String> {
    let mut domains = vec![host.to_string()];
    let parts: Vec<&str> = host.split('.').collect();
    for i in 1..parts.len().saturating_sub(1) {
        domains.push(parts[i..].join("."));
    }
    domains
}
