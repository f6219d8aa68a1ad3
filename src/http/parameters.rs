//! Ordered request parameters and their query/form serialization.

use std::borrow::Cow;
use url::form_urlencoded;

/// Ordered name/value pairs. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Parameters {
    pairs: Vec<(String, String)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with a single one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.pairs.push((name, value.into()));
    }

    pub fn add_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.pairs.push((name, value.into()));
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.pairs.retain(|(n, _)| n != name);
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pairs.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `name=value` pairs joined by `&`, each side smart-encoded.
    /// `None` when there are no parameters.
    pub fn to_query(&self) -> Option<String> {
        if self.pairs.is_empty() {
            return None;
        }
        let mut out = String::new();
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            out.push_str(&smart_encode(name));
            out.push('=');
            out.push_str(&smart_encode(value));
        }
        Some(out)
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }
}

/// Form-url-encode `value` unless it already looks encoded.
///
/// A value that decodes to something different from itself is taken to be
/// encoded already and is returned verbatim.
pub fn smart_encode(value: &str) -> Cow<'_, str> {
    if let Some(decoded) = form_decode(value) {
        if decoded != value {
            return Cow::Borrowed(value);
        }
    }
    Cow::Owned(form_urlencoded::byte_serialize(value.as_bytes()).collect())
}

/// Decode `+` and `%XX` escapes. `None` for malformed escapes or non UTF-8
/// output.
fn form_decode(value: &str) -> Option<Cow<'_, str>> {
    if !value.contains(['%', '+']) {
        return Some(Cow::Borrowed(value));
    }
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                let hex = std::str::from_utf8(hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).ok().map(Cow::Owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_duplicates() {
        let mut params = Parameters::new();
        params.add("b", "2");
        params.add("a", "1");
        params.add("b", "3");
        let names: Vec<_> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
        assert_eq!(params.get_all("b").collect::<Vec<_>>(), vec!["2", "3"]);
    }

    #[test]
    fn test_set_replaces() {
        let mut params = Parameters::new();
        params.add("k", "1");
        params.add("k", "2");
        params.set("k", "3");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("k"), Some("3"));
    }

    #[test]
    fn test_smart_encode_plain_value() {
        assert_eq!(smart_encode("hello world"), "hello+world");
        assert_eq!(smart_encode("a&b=c"), "a%26b%3Dc");
        assert_eq!(smart_encode("abc"), "abc");
    }

    #[test]
    fn test_smart_encode_keeps_encoded_value() {
        assert_eq!(smart_encode("hello%20world"), "hello%20world");
        assert_eq!(smart_encode("a+b"), "a+b");
    }

    #[test]
    fn test_smart_encode_malformed_escape_is_encoded() {
        assert_eq!(smart_encode("100%"), "100%25");
    }

    #[test]
    fn test_to_query() {
        let params: Parameters = vec![("q", "rust lang"), ("page", "2")].into_iter().collect();
        assert_eq!(params.to_query().as_deref(), Some("q=rust+lang&page=2"));
        assert_eq!(Parameters::new().to_query(), None);
    }
}
