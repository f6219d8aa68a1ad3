//! Request body for POST/PUT/PATCH operations.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::http::multipart::MultipartEncoder;
use crate::http::parameters::{smart_encode, Parameters};
use crate::http::request::FileBody;
use bytes::Bytes;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// An encoded request body and its media type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestBody {
    content_type: String,
    data: Bytes,
}

impl RequestBody {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// `name=value&...` with each side smart-encoded.
    pub fn form(params: &Parameters) -> Self {
        let mut out = String::new();
        for (i, (name, value)) in params.iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            out.push_str(&smart_encode(name));
            out.push('=');
            out.push_str(&smart_encode(value));
        }
        Self::new(FORM_URLENCODED, out)
    }

    /// Build the body a request describes.
    ///
    /// No parameters and no files give no body. A lone file is sent as is.
    /// Parameters alone are form-url-encoded. Anything else is
    /// multipart/form-data delimited by `boundary`.
    pub(crate) async fn build(
        params: &Parameters,
        files: &[FileBody],
        boundary: &str,
    ) -> Result<Option<Self>, NetError> {
        match (params.is_empty(), files) {
            (true, []) => Ok(None),
            (true, [file]) => {
                let data = tokio::fs::read(&file.path).await.file_context(&file.path)?;
                Ok(Some(Self::new(file.content_type.clone(), data)))
            }
            (false, []) => Ok(Some(Self::form(params))),
            _ => {
                let mut encoder = MultipartEncoder::new(boundary);
                for (name, value) in params.iter() {
                    encoder.field(name, value);
                }
                for file in files {
                    let data = tokio::fs::read(&file.path).await.file_context(&file.path)?;
                    let file_name = file.path.file_name().map(|n| n.to_string_lossy());
                    encoder.file(&file.name, file_name.as_deref(), &file.content_type, &data);
                }
                let content_type = encoder.content_type();
                Ok(Some(Self::new(content_type, encoder.finish())))
            }
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content_length(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_form_body() {
        let params: Parameters = vec![("name", "a b"), ("x", "1%2B1")].into_iter().collect();
        let body = RequestBody::form(&params);
        assert_eq!(body.content_type(), FORM_URLENCODED);
        assert_eq!(body.data(), &Bytes::from("name=a+b&x=1%2B1"));
        assert_eq!(body.content_length(), 16);
    }

    #[tokio::test]
    async fn test_no_params_no_files_is_none() {
        let body = RequestBody::build(&Parameters::new(), &[], "b").await.unwrap();
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_single_file_is_sent_raw() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"raw file").unwrap();
        let files = vec![FileBody::new("upload", "text/plain", file.path())];

        let body = RequestBody::build(&Parameters::new(), &files, "b")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body.content_type(), "text/plain");
        assert_eq!(body.data(), &Bytes::from("raw file"));
    }

    #[tokio::test]
    async fn test_params_and_file_are_multipart() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"payload").unwrap();
        let files = vec![FileBody::new("upload", "application/octet-stream", file.path())];
        let params: Parameters = vec![("k", "v")].into_iter().collect();

        let body = RequestBody::build(&params, &files, "BOUND")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body.content_type(), "multipart/form-data; boundary=BOUND");
        let text = String::from_utf8_lossy(body.data());
        assert!(text.contains("name=\"k\""));
        assert!(text.contains("name=\"upload\""));
        assert!(text.contains("payload"));
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let files = vec![FileBody::new("f", "text/plain", "/nonexistent/netpipe/file")];
        let err = RequestBody::build(&Parameters::new(), &files, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::FileRead { .. }));
    }
}
