//! multipart/form-data encoding.
//!
//! Sections are appended in order to one buffer, each opened by the
//! request's boundary token, so the same request always encodes to the same
//! bytes.

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};

/// Appends form sections delimited by a single boundary.
#[derive(Debug)]
pub struct MultipartEncoder {
    boundary: String,
    buf: BytesMut,
    sections: usize,
}

impl MultipartEncoder {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            buf: BytesMut::new(),
            sections: 0,
        }
    }

    /// `Content-Type` value announcing the boundary.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// A plain field. It carries no per-section content type.
    pub fn field(&mut self, name: &str, value: &str) {
        self.section(name, None, None, value.as_bytes());
    }

    /// A file section.
    pub fn file(&mut self, name: &str, file_name: Option<&str>, content_type: &str, data: &[u8]) {
        self.section(name, file_name, Some(content_type), data);
    }

    /// Close the body. A form without sections encodes to nothing.
    pub fn finish(mut self) -> Bytes {
        if self.sections == 0 {
            return Bytes::new();
        }
        self.delimiter();
        self.buf.put_slice(b"--\r\n");
        self.buf.freeze()
    }

    fn delimiter(&mut self) {
        self.buf.put_slice(b"--");
        self.buf.put_slice(self.boundary.as_bytes());
    }

    fn section(
        &mut self,
        name: &str,
        file_name: Option<&str>,
        content_type: Option<&str>,
        data: &[u8],
    ) {
        self.delimiter();
        self.buf.put_slice(b"\r\nContent-Disposition: form-data; name=\"");
        self.buf.put_slice(quoted(name).as_bytes());
        self.buf.put_u8(b'"');
        if let Some(file_name) = file_name {
            self.buf.put_slice(b"; filename=\"");
            self.buf.put_slice(quoted(file_name).as_bytes());
            self.buf.put_u8(b'"');
        }
        if let Some(content_type) = content_type {
            self.buf.put_slice(b"\r\nContent-Type: ");
            self.buf.put_slice(content_type.as_bytes());
        }
        self.buf.put_slice(b"\r\n\r\n");
        self.buf.put_slice(data);
        self.buf.put_slice(b"\r\n");
        self.sections += 1;
    }
}

/// Percent-encode the characters that would end a quoted disposition
/// parameter or the header line.
fn quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("%22"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            c => out.push(c),
        }
    }
    out
}

static BOUNDARY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a boundary token that is unique within the process.
pub(crate) fn generate_boundary() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let seq = BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed);

    format!("----netpipe-{:016x}{:08x}", nanos ^ seq.rotate_left(32), seq)
}
