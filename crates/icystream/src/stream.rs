//! Stream state and the blocking consumer surface
//!
//! [`HttpInput`] is the handle a decoder pulls bytes from.  Bytes arrive on
//! the I/O thread, which appends them to the stream's buffer queue under
//! the stream lock and signals the condition variable; the consumer drains
//! the queue under the same lock, feeding everything through the ICY
//! demultiplexer.  Control flow in the other direction (open, seek, close,
//! resume) is shipped to the I/O thread as reactor commands.

use std::io::{self, SeekFrom};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use reqwest::Url;
use tokio::sync::Notify;

use crate::buffer::BufferQueue;
use crate::config::buffer::{MAX_BUFFERED, RESUME_AT};
use crate::error::{InputError, Result};
use crate::icy::IcyMetaParser;
use crate::metadata::StreamTag;
use crate::reactor::{ReactorHandle, StreamId};

/// Everything the consumer and the transfer driver share about one stream.
/// All fields are guarded by the stream lock.
pub(crate) struct StreamState {
    pub buffers: BufferQueue,
    pub icy: IcyMetaParser,
    /// Stream name latched from the `icy-name` family of response headers.
    pub meta_name: Option<String>,
    /// Tag ready to be claimed via [`HttpInput::tag`]; replaced, never
    /// accumulated.
    pub tag: Option<StreamTag>,
    /// Latched failure, surfaced and cleared by the next consumer call.
    pub error: Option<InputError>,
    /// True once response headers have been processed or an error has been
    /// recorded; gates the consumer's first seek.
    pub ready: bool,
    /// True while the transfer has been asked to stop delivering bytes.
    pub paused: bool,
    /// True while a transfer is registered and has not finished.
    pub live: bool,
    pub seekable: bool,
    pub size: Option<u64>,
    pub mime: Option<String>,
    /// Bytes the consumer has observed, metadata excluded.
    pub offset: u64,
}

/// Outcome of handing one chunk to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Stored,
    /// The high-water mark would be reached; the chunk was not stored and
    /// the transfer must wait for a resume before retrying it.
    Paused,
    /// The stream was closed; the transfer should stop.
    Closed,
}

pub(crate) struct StreamShared {
    pub state: Mutex<StreamState>,
    pub wake: Condvar,
    /// Wakes the transfer driver after a pause has been cleared.
    pub resume: Notify,
}

impl StreamShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(StreamState {
                buffers: BufferQueue::new(),
                icy: IcyMetaParser::new(),
                meta_name: None,
                tag: None,
                error: None,
                ready: false,
                paused: false,
                live: false,
                seekable: false,
                size: None,
                mime: None,
                offset: 0,
            }),
            wake: Condvar::new(),
            resume: Notify::new(),
        }
    }

    /// Append one chunk, enforcing the high-water mark.
    ///
    /// Called by the transfer driver.  On [`WriteOutcome::Paused`] the
    /// chunk was not stored; the driver must retry the same chunk once the
    /// pause has been cleared.
    pub(crate) fn push_chunk(&self, data: &Bytes) -> WriteOutcome {
        let mut st = self.state.lock();

        if !st.live {
            return WriteOutcome::Closed;
        }

        if st.buffers.total_size() + data.len() >= MAX_BUFFERED {
            st.paused = true;
            return WriteOutcome::Paused;
        }

        st.buffers.push(data.clone());
        st.ready = true;
        self.wake.notify_all();
        WriteOutcome::Stored
    }

    /// Record the end of the transfer, latching `error` if one occurred,
    /// and wake the consumer.
    pub(crate) fn finish(&self, error: Option<InputError>) {
        let mut st = self.state.lock();
        if let Some(error) = error {
            if st.error.is_none() {
                st.error = Some(error);
            }
        }
        st.live = false;
        st.ready = true;
        self.wake.notify_all();
    }

    /// Abort a stream during reactor teardown.  No-op when the transfer
    /// has already finished.
    pub(crate) fn abort(&self, error: InputError) {
        let mut st = self.state.lock();
        if st.live {
            st.live = false;
            st.ready = true;
            if st.error.is_none() {
                st.error = Some(error);
            }
            self.wake.notify_all();
        }
    }

    /// Clear the pause flag.  Returns true when it was set; the caller
    /// then wakes the driver.  Only the reactor thread calls this.
    pub(crate) fn try_resume(&self) -> bool {
        let mut st = self.state.lock();
        if st.paused {
            st.paused = false;
            true
        } else {
            false
        }
    }
}

/// One HTTP stream, pulled by a decoder.
///
/// Dropping the handle closes the stream and unregisters its transfer.
/// Also implements [`std::io::Read`] and [`std::io::Seek`] so it can be
/// handed to a decoder directly.
pub struct HttpInput {
    shared: Arc<StreamShared>,
    reactor: ReactorHandle,
    id: StreamId,
    url: Url,
    uri: String,
    closed: bool,
}

impl HttpInput {
    /// Open `uri` as an HTTP stream on the given reactor.
    ///
    /// Returns `Ok(None)` when the URI does not begin with `http://`, so
    /// another input implementation can claim it.  The returned stream is
    /// not ready yet; the first read or seek blocks until the response
    /// headers have been processed.
    pub fn open(reactor: &ReactorHandle, uri: &str) -> Result<Option<Self>> {
        if !uri.starts_with("http://") {
            return Ok(None);
        }

        let url =
            Url::parse(uri).map_err(|e| InputError::Setup(format!("invalid URL {uri}: {e}")))?;

        let shared = Arc::new(StreamShared::new());
        shared.state.lock().live = true;

        let id = reactor.next_id();
        reactor.add_transfer(id, shared.clone(), url.clone(), 0)?;

        Ok(Some(Self {
            shared,
            reactor: reactor.clone(),
            id,
            url,
            uri: uri.to_string(),
            closed: false,
        }))
    }

    /// Read up to `dest.len()` bytes, blocking while the transfer is live
    /// and no data is buffered.
    ///
    /// Returns the number of audio bytes copied; metadata bytes are
    /// stripped and never counted.  Returns `Ok(0)` on end of stream and
    /// surfaces (and clears) a latched error.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<usize> {
        if dest.is_empty() {
            return Ok(0);
        }

        let mut nbytes = 0;
        let mut guard = self.shared.state.lock();

        loop {
            while guard.live && guard.buffers.is_empty() {
                self.shared.wake.wait(&mut guard);
            }

            if let Some(error) = guard.error.take() {
                return Err(error);
            }

            if guard.buffers.is_empty() {
                // transfer over and fully drained
                return Ok(0);
            }

            let st = &mut *guard;
            while nbytes < dest.len() && !st.buffers.is_empty() {
                nbytes += drain_front(st, &mut dest[nbytes..]);
            }

            // a buffer holding only metadata produces no audio bytes;
            // keep going until we have something to hand out
            if nbytes > 0 {
                break;
            }
        }

        let st = &mut *guard;
        if st.icy.is_active() {
            if let Some(mut tag) = st.icy.take_tag() {
                if tag.name.is_none() {
                    tag.name = st.meta_name.clone();
                }
                st.tag = Some(tag);
            }
        }

        st.offset += nbytes as u64;

        if st.paused && st.buffers.total_size() < RESUME_AT {
            drop(guard);
            self.reactor.resume(self.id);
        }

        Ok(nbytes)
    }

    /// Reposition the stream.
    ///
    /// Seeking to the current position is always accepted.  Forward seeks
    /// within the buffered region fast-forward in place; anything else
    /// aborts the transfer and starts a new one with a range request,
    /// blocking until the response headers have been processed.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let mut guard = self.shared.state.lock();

        if !guard.ready {
            return Err(InputError::Seek("stream is not ready".to_string()));
        }

        // a no-op seek is accepted even on streams that are otherwise not
        // seekable
        if pos == SeekFrom::Start(guard.offset) {
            return Ok(guard.offset);
        }

        if !guard.seekable {
            return Err(InputError::Seek("stream is not seekable".to_string()));
        }

        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(d) => guard.offset as i64 + d,
            SeekFrom::End(d) => match guard.size {
                Some(size) => size as i64 + d,
                None => return Err(InputError::Seek("stream size is not known".to_string())),
            },
        };
        if target < 0 {
            return Err(InputError::Seek("seek to a negative position".to_string()));
        }
        let target = target as u64;

        // fast-forward through data that is already buffered; cheaper than
        // a new request
        {
            let st = &mut *guard;
            while target > st.offset {
                let Some(front) = st.buffers.front_mut() else {
                    break;
                };
                let step = (target - st.offset).min(front.available() as u64) as usize;
                let emptied = !front.consume(step);
                if emptied {
                    st.buffers.pop_front();
                }
                st.offset += step as u64;
            }
        }

        if target == guard.offset {
            return Ok(target);
        }

        // abort the current transfer and start over at the target position
        drop(guard);
        self.reactor.remove_transfer(self.id)?;

        let mut guard = self.shared.state.lock();
        guard.buffers.clear();
        guard.error = None;
        guard.paused = false;
        guard.offset = target;

        if guard.size == Some(target) {
            // seeking to the end: simulate an empty result instead of
            // provoking a "416 Requested Range Not Satisfiable" response
            guard.live = false;
            return Ok(target);
        }

        guard.ready = false;
        guard.live = true;
        drop(guard);

        if let Err(error) =
            self.reactor
                .add_transfer(self.id, self.shared.clone(), self.url.clone(), target)
        {
            let mut guard = self.shared.state.lock();
            guard.live = false;
            guard.ready = true;
            return Err(error);
        }

        let mut guard = self.shared.state.lock();
        while !guard.ready {
            self.shared.wake.wait(&mut guard);
        }
        if let Some(error) = guard.error.take() {
            return Err(error);
        }
        Ok(target)
    }

    /// Close the stream and unregister its transfer.  Idempotent; also run
    /// on drop.  Buffered data remains readable; once drained, reads
    /// return end of stream.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // mark the stream dead first so a paused transfer can never append
        // after teardown
        {
            let mut guard = self.shared.state.lock();
            guard.live = false;
            self.shared.wake.notify_all();
        }

        let _ = self.reactor.remove_transfer(self.id);
    }

    /// True when a read would not block: an error is pending, the transfer
    /// has ended, or data is buffered.
    pub fn available(&self) -> bool {
        let st = self.shared.state.lock();
        st.error.is_some() || !st.live || !st.buffers.is_empty()
    }

    /// True when the transfer has ended and all buffered data has been
    /// consumed.
    pub fn eof(&self) -> bool {
        let st = self.shared.state.lock();
        !st.live && st.buffers.is_empty()
    }

    /// Claim the pending tag, if any.  A subsequent call returns `None`
    /// until the next tag is produced.
    pub fn tag(&mut self) -> Option<StreamTag> {
        self.shared.state.lock().tag.take()
    }

    /// Surface and clear a latched error.
    pub fn check(&mut self) -> Result<()> {
        match self.shared.state.lock().error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// The URI this stream was opened with.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Total bytes observed by the consumer, metadata excluded.
    pub fn offset(&self) -> u64 {
        self.shared.state.lock().offset
    }

    /// Content length advertised by the server, if any.
    pub fn size(&self) -> Option<u64> {
        self.shared.state.lock().size
    }

    /// Content type advertised by the server, if any.
    pub fn mime(&self) -> Option<String> {
        self.shared.state.lock().mime.clone()
    }

    /// True when the server advertised byte-range support and the stream
    /// carries no inline metadata.
    pub fn is_seekable(&self) -> bool {
        self.shared.state.lock().seekable
    }

    /// True once response headers have been processed or an error has been
    /// recorded.
    pub fn is_ready(&self) -> bool {
        self.shared.state.lock().ready
    }
}

impl Drop for HttpInput {
    fn drop(&mut self) {
        self.close();
    }
}

impl io::Read for HttpInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        HttpInput::read(self, buf).map_err(io::Error::other)
    }
}

impl io::Seek for HttpInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        HttpInput::seek(self, pos).map_err(io::Error::other)
    }
}

/// Drain bytes from the front chunk through the metadata parser.
///
/// Returns the number of audio bytes copied into `dest`; metadata bytes
/// are consumed but not counted.  Pops the front chunk when it empties.
fn drain_front(st: &mut StreamState, dest: &mut [u8]) -> usize {
    let Some(front) = st.buffers.front_mut() else {
        return 0;
    };

    let mut limit = dest.len().min(front.available());
    let mut copied = 0;
    let mut emptied = false;

    loop {
        let n = st.icy.data(limit);
        if n > 0 {
            dest[copied..copied + n].copy_from_slice(&front.remaining()[..n]);
            emptied = !front.consume(n);
            copied += n;
            limit -= n;
            if emptied || limit == 0 {
                break;
            }
        }

        let n = st.icy.meta(&front.remaining()[..limit]);
        if n > 0 {
            emptied = !front.consume(n);
            limit -= n;
            if emptied || limit == 0 {
                break;
            }
        }
    }

    if emptied {
        st.buffers.pop_front();
    }
    copied
}
