//! Per-transfer driver
//!
//! One task per HTTP transfer, running on the reactor's runtime: send the
//! request, police the response status, interpret the response headers,
//! then pump body chunks into the stream's buffer queue.  The pump honours
//! the pause protocol (a chunk rejected at the high-water mark is
//! redelivered after the resume) and the cancellation token that `close`
//! and `seek` trigger through the reactor.

use reqwest::header::{HeaderMap, RANGE};
use reqwest::{Client, Response, Url};
use tokio_util::sync::CancellationToken;

use crate::error::{InputError, Result};
use crate::metadata::StreamTag;
use crate::reactor::StreamId;
use crate::stream::{StreamShared, WriteOutcome};

pub(crate) async fn run_transfer(
    client: Client,
    url: Url,
    offset: u64,
    shared: std::sync::Arc<StreamShared>,
    cancel: CancellationToken,
    id: StreamId,
) {
    match drive(&client, url, offset, &shared, &cancel, id).await {
        Ok(()) => shared.finish(None),
        Err(error) => {
            tracing::debug!(id, %error, "transfer failed");
            shared.finish(Some(error));
        }
    }
}

async fn drive(
    client: &Client,
    url: Url,
    offset: u64,
    shared: &StreamShared,
    cancel: &CancellationToken,
    id: StreamId,
) -> Result<()> {
    let mut request = client.get(url).header("Icy-MetaData", "1");
    if offset > 0 {
        request = request.header(RANGE, format!("bytes={offset}-"));
    }

    let mut response = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        response = request.send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(InputError::HttpStatus(status.as_u16()));
    }

    apply_headers(&response, offset, shared);

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            chunk = response.chunk() => chunk?,
        };
        let Some(data) = chunk else {
            // end of body
            return Ok(());
        };
        if data.is_empty() {
            continue;
        }

        loop {
            match shared.push_chunk(&data) {
                WriteOutcome::Stored => break,
                WriteOutcome::Closed => return Ok(()),
                WriteOutcome::Paused => {
                    tracing::debug!(id, len = data.len(), "transfer paused");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = shared.resume.notified() => {}
                    }
                }
            }
        }
    }
}

/// Interpret the response headers and mark the stream ready.
///
/// Header names are matched case-insensitively by the header map.  Runs
/// before the first body chunk is delivered.
fn apply_headers(response: &Response, request_offset: u64, shared: &StreamShared) {
    let headers = response.headers();

    let mut guard = shared.state.lock();
    let st = &mut *guard;

    if let Some(mime) = header_str(headers, "content-type") {
        st.mime = Some(mime.to_string());
    }

    if let Some(length) = header_str(headers, "content-length").and_then(|v| v.parse::<u64>().ok())
    {
        st.size = Some(request_offset + length);
    }

    for name in ["icy-name", "ice-name", "x-audiocast-name"] {
        if let Some(value) = header_str(headers, name) {
            st.meta_name = Some(value.to_string());
            // replace any pending tag with a fresh one naming the station
            st.tag = Some(StreamTag::from_station_name(value));
            break;
        }
    }

    if let Some(metaint) = header_str(headers, "icy-metaint").and_then(|v| v.parse::<usize>().ok())
    {
        if metaint > 0 && !st.icy.is_active() {
            tracing::debug!(metaint, "inline metadata enabled");
            st.icy.start(metaint);
            // a stream with inline metadata is not seekable
            st.seekable = false;
        }
    }

    if headers.contains_key("accept-ranges") && !st.icy.is_active() {
        st.seekable = true;
    }

    st.ready = true;
    shared.wake.notify_all();
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
