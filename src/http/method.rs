use std::fmt;
use std::str::FromStr;

/// The request methods a call can carry.
///
/// Methods are split into two classes: those that never send a request
/// body and those that must.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Trace,
    Options,
    Delete,
    Post,
    Put,
    Patch,
}

impl Method {
    /// True for methods whose request must carry a body.
    pub fn has_body(self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Trace => "TRACE",
            Method::Options => "OPTIONS",
            Method::Delete => "DELETE",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
        }
    }

    pub(crate) fn to_http(self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Head => http::Method::HEAD,
            Method::Trace => http::Method::TRACE,
            Method::Options => http::Method::OPTIONS,
            Method::Delete => http::Method::DELETE,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Patch => http::Method::PATCH,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "TRACE" => Ok(Method::Trace),
            "OPTIONS" => Ok(Method::Options),
            "DELETE" => Ok(Method::Delete),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            other => Err(format!("unsupported method: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_classification() {
        for m in [
            Method::Get,
            Method::Head,
            Method::Trace,
            Method::Options,
            Method::Delete,
        ] {
            assert!(!m.has_body(), "{} should not carry a body", m);
        }
        for m in [Method::Post, Method::Put, Method::Patch] {
            assert!(m.has_body(), "{} should carry a body", m);
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert!("CONNECT".parse::<Method>().is_err());
    }

    #[test]
    fn test_to_http() {
        assert_eq!(Method::Patch.to_http(), http::Method::PATCH);
    }
}
