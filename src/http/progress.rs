//! Download progress reporting.

use crate::http::responsebody::{BodyStream, ResponseBody};
use futures::StreamExt;
use std::sync::Arc;

/// Receives download progress for a response body.
///
/// `percent` is in `0..=100` and is only reported when it grows.
pub trait DownloadListener: Send + Sync {
    fn on_progress(&self, finished: u64, total: u64, percent: u8);
}

impl<F> DownloadListener for F
where
    F: Fn(u64, u64, u8) + Send + Sync,
{
    fn on_progress(&self, finished: u64, total: u64, percent: u8) {
        self(finished, total, percent)
    }
}

/// Tracks bytes read against a known total.
struct Progress {
    finished: u64,
    total: u64,
    last_percent: u8,
}

impl Progress {
    /// Returns the new percent when it increased.
    fn advance(&mut self, read: usize) -> Option<u8> {
        self.finished += read as u64;
        let percent = (self.finished.saturating_mul(100) / self.total).min(100) as u8;
        if percent > self.last_percent {
            self.last_percent = percent;
            Some(percent)
        } else {
            None
        }
    }
}

fn progress_stream(stream: BodyStream, total: u64, listener: Arc<dyn DownloadListener>) -> BodyStream {
    let mut progress = Progress {
        finished: 0,
        total,
        last_percent: 0,
    };
    stream
        .inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                if let Some(percent) = progress.advance(bytes.len()) {
                    listener.on_progress(progress.finished, progress.total, percent);
                }
            }
        })
        .boxed()
}

/// Wrap `body` so reads report progress to `listener`.
///
/// Bodies without a positive declared length are returned unchanged.
pub fn with_progress(body: ResponseBody, listener: Arc<dyn DownloadListener>) -> ResponseBody {
    let total = match body.content_length() {
        Some(total) if total > 0 => total,
        _ => return body,
    };
    let (stream, content_type, content_length, charset) = body.into_parts();
    ResponseBody::from_stream(
        progress_stream(stream, total, listener),
        content_type,
        content_length,
        charset,
    )
}
