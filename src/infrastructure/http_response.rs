// HTTP response utilities for streaming a generated PDF
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use bytes::{Bytes, BytesMut};
use futures::stream::Stream;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// Runs the wrapped closure once, when dropped
struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Stream `file` in chunks and call `on_complete` once the stream is finished or dropped.
pub fn file_stream<F>(mut file: File, on_complete: F) -> impl Stream<Item = Result<Bytes, std::io::Error>>
where
    F: FnOnce() + Send + 'static,
{
    // Built outside the generator so an unpolled stream still runs it on drop
    let complete = OnDrop(Some(on_complete));
    async_stream::try_stream! {
        let _complete = complete;
        loop {
            let mut buffer = BytesMut::with_capacity(CHUNK_SIZE);
            if file.read_buf(&mut buffer).await? == 0 {
                break;
            }
            yield buffer.freeze();
        }
    }
}

/// Filename for `Content-Disposition`, restricted to printable ASCII without quotes
pub fn attachment_name(title: &str) -> String {
    let name: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    if name.is_empty() {
        "report.pdf".to_string()
    } else {
        format!("{}.pdf", name)
    }
}

/// Inline PDF response whose body is read from `file`
pub fn pdf_response<F>(file: File, title: &str, on_complete: F) -> Result<Response<Body>, StatusCode>
where
    F: FnOnce() + Send + 'static,
{
    let disposition = format!("inline; filename=\"{}\"", attachment_name(title));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(file_stream(file, on_complete)))
        .map_err(|e| {
            tracing::error!("Response build error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
