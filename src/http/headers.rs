use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderMap;
use std::str::FromStr;

/// An insertion-ordered header multimap.
///
/// Names compare case-insensitively (they are stored lowercased by
/// `HeaderName`). A name may appear several times; `insert` replaces every
/// occurrence while `append` adds another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Headers {
    headers: Vec<(HeaderName, HeaderValue)>,
}

fn parse_name(name: &str) -> Result<HeaderName, NetError> {
    HeaderName::from_str(name).map_err(|_| NetError::InvalidHeader(name.to_string()))
}

fn parse_value(name: &str, value: &str) -> Result<HeaderValue, NetError> {
    HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader(format!("{}: {}", name, value)))
}

impl Headers {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Set a header, replacing any existing values for the name.
    ///
    /// The first occurrence is updated in place so the header keeps its
    /// position; later duplicates are dropped.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let name_header = parse_name(name)?;
        let value_header = parse_value(name, value)?;
        self.set(name_header, value_header);
        Ok(())
    }

    pub(crate) fn set(&mut self, name: HeaderName, value: HeaderValue) {
        let mut value = Some(value);
        self.headers.retain_mut(|(n, v)| {
            if *n != name {
                return true;
            }
            match value.take() {
                Some(new) => {
                    *v = new;
                    true
                }
                None => false,
            }
        });
        if let Some(value) = value {
            self.headers.push((name, value));
        }
    }

    /// Add a value without touching existing ones.
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let name_header = parse_name(name)?;
        let value_header = parse_value(name, value)?;
        self.headers.push((name_header, value_header));
        Ok(())
    }

    /// Set the header only when the name is not present yet.
    /// Returns whether the header was added.
    pub fn insert_if_absent(&mut self, name: &str, value: &str) -> Result<bool, NetError> {
        if self.contains(name) {
            return Ok(false);
        }
        self.append(name, value)?;
        Ok(true)
    }

    /// Set the header only when the name is already present.
    /// Returns whether the header was replaced.
    pub fn replace_if_exists(&mut self, name: &str, value: &str) -> Result<bool, NetError> {
        if !self.contains(name) {
            return Ok(false);
        }
        self.insert(name, value)?;
        Ok(true)
    }

    pub fn remove(&mut self, name: &str) {
        if let Ok(target) = HeaderName::from_str(name) {
            self.headers.retain(|(n, _)| *n != target);
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        let target = HeaderName::from_str(name).ok()?;
        self.headers
            .iter()
            .find(|(n, _)| *n == target)
            .map(|(_, v)| v)
    }

    /// The first value for `name`, if it is visible ASCII.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a HeaderValue> + 'a {
        let target = HeaderName::from_str(name).ok();
        self.headers
            .iter()
            .filter(move |(n, _)| Some(n) == target.as_ref())
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// The media type of `Content-Type`, without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim())
            .filter(|v| !v.is_empty())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.value(CONTENT_LENGTH.as_str())
            .and_then(|v| v.trim().parse().ok())
    }

    /// The `charset` parameter of `Content-Type`.
    pub fn charset(&self) -> Option<&str> {
        let content_type = self.value(CONTENT_TYPE.as_str())?;
        content_type.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if key.trim().eq_ignore_ascii_case("charset") {
                Some(value.trim().trim_matches('"'))
            } else {
                None
            }
        })
    }

    /// Convert to a standard `http::HeaderMap`.
    /// Note: http::HeaderMap preserves insertion order per name.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            map.append(name.clone(), value.clone());
        }
        map
    }

    pub fn from_header_map(map: &HeaderMap) -> Self {
        Self {
            headers: map
                .iter()
                .map(|(n, v)| (n.clone(), v.clone()))
                .collect(),
        }
    }

    /// Serialize as newline separated `Name: Value` lines.
    pub fn to_multiline(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.headers {
            out.push_str(name.as_str());
            out.push_str(": ");
            out.push_str(&String::from_utf8_lossy(value.as_bytes()));
            out.push('\n');
        }
        out
    }

    /// Parse newline separated `Name: Value` lines.
    ///
    /// Each line is split at its first colon and both halves trimmed.
    /// Lines without a colon or with an invalid name or value are skipped.
    pub fn parse_multiline(text: &str) -> Self {
        let mut headers = Headers::new();
        for line in text.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if headers.append(name, value.trim()).is_err() {
                tracing::debug!(line = %line, "Skipping malformed header line");
            }
        }
        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a (HeaderName, HeaderValue);
    type IntoIter = std::slice::Iter<'a, (HeaderName, HeaderValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}
