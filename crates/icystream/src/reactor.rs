//! The I/O thread that owns the HTTP client and drives all transfers
//!
//! The reactor is the only place that starts, stops or resumes transfer
//! tasks.  Consumer threads talk to it through [`ReactorHandle`], which
//! ships explicit command variants over a bounded channel and blocks on a
//! reply slot where an answer is needed — the cross-thread call-and-wait
//! pattern.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{redirect, Client, Url};
use tokio::runtime;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::network::{CONNECT_TIMEOUT_SECS, MAX_REDIRECTS, USER_AGENT};
use crate::config::reactor::COMMAND_QUEUE_DEPTH;
use crate::config::ProxyConfig;
use crate::error::{InputError, Result};
use crate::stream::StreamShared;
use crate::transfer;

pub(crate) type StreamId = u64;

enum Command {
    Add {
        id: StreamId,
        shared: Arc<StreamShared>,
        url: Url,
        offset: u64,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        id: StreamId,
        reply: oneshot::Sender<()>,
    },
    Resume {
        id: StreamId,
    },
    Shutdown,
}

struct Transfer {
    shared: Arc<StreamShared>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

/// Owner of the I/O thread, the shared HTTP client and the set of live
/// transfers.  Create one per process (or per player); it outlives all of
/// its streams.
///
/// Dropping the reactor aborts every transfer that is still running and
/// latches an error on its stream.
pub struct Reactor {
    handle: ReactorHandle,
    thread: Option<std::thread::JoinHandle<()>>,
}

/// Cheap cloneable handle used to open streams and to send commands to the
/// I/O thread.  The blocking calls must not be made from the I/O thread
/// itself or from inside an async runtime.
#[derive(Clone)]
pub struct ReactorHandle {
    cmd: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
}

impl Reactor {
    /// Start a reactor without a proxy.
    pub fn new() -> Result<Self> {
        Self::with_proxy(None)
    }

    /// Start a reactor, routing all transfers through `proxy` when given.
    ///
    /// The HTTP client is built once and shared by every transfer: user
    /// agent, redirect cap and connect timeout apply uniformly.
    pub fn with_proxy(proxy: Option<&ProxyConfig>) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS));
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy.to_proxy()?);
        }
        let client = builder
            .build()
            .map_err(|e| InputError::Setup(format!("HTTP client: {e}")))?;

        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| InputError::Setup(format!("I/O runtime: {e}")))?;

        let (cmd, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let thread = std::thread::Builder::new()
            .name("icystream-io".to_string())
            .spawn(move || runtime.block_on(reactor_loop(client, rx)))
            .map_err(|e| InputError::Setup(format!("I/O thread: {e}")))?;

        Ok(Self {
            handle: ReactorHandle {
                cmd,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    /// Stop the I/O thread.  Transfers still running are aborted and their
    /// streams get a latched error.  Also runs on drop.
    pub fn shutdown(mut self) {
        self.shutdown_impl();
    }

    fn shutdown_impl(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.handle.cmd.blocking_send(Command::Shutdown);
            let _ = thread.join();
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown_impl();
    }
}

impl ReactorHandle {
    pub(crate) fn next_id(&self) -> StreamId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a transfer and wait until the I/O thread has started its
    /// driver.
    pub(crate) fn add_transfer(
        &self,
        id: StreamId,
        shared: Arc<StreamShared>,
        url: Url,
        offset: u64,
    ) -> Result<()> {
        let (reply, answer) = oneshot::channel();
        self.cmd
            .blocking_send(Command::Add {
                id,
                shared,
                url,
                offset,
                reply,
            })
            .map_err(|_| InputError::ReactorClosed)?;
        answer.blocking_recv().map_err(|_| InputError::ReactorClosed)?
    }

    /// Cancel a transfer and wait until its driver has stopped.
    pub(crate) fn remove_transfer(&self, id: StreamId) -> Result<()> {
        let (reply, answer) = oneshot::channel();
        self.cmd
            .blocking_send(Command::Remove { id, reply })
            .map_err(|_| InputError::ReactorClosed)?;
        answer.blocking_recv().map_err(|_| InputError::ReactorClosed)
    }

    /// Ask the I/O thread to resume a paused transfer.  Fire and forget;
    /// a resume for a transfer that has already finished is dropped.
    pub(crate) fn resume(&self, id: StreamId) {
        let _ = self.cmd.blocking_send(Command::Resume { id });
    }
}

async fn reactor_loop(client: Client, mut rx: mpsc::Receiver<Command>) {
    let mut live: HashMap<StreamId, Transfer> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Add {
                id,
                shared,
                url,
                offset,
                reply,
            } => {
                tracing::debug!(id, %url, offset, "transfer added");
                let cancel = CancellationToken::new();
                let task = tokio::spawn(transfer::run_transfer(
                    client.clone(),
                    url,
                    offset,
                    shared.clone(),
                    cancel.clone(),
                    id,
                ));
                live.insert(
                    id,
                    Transfer {
                        shared,
                        cancel,
                        task,
                    },
                );
                let _ = reply.send(Ok(()));
            }
            Command::Remove { id, reply } => {
                if let Some(transfer) = live.remove(&id) {
                    tracing::debug!(id, "transfer removed");
                    transfer.cancel.cancel();
                    let _ = transfer.task.await;
                }
                let _ = reply.send(());
            }
            Command::Resume { id } => {
                if let Some(transfer) = live.get(&id) {
                    if transfer.shared.try_resume() {
                        tracing::debug!(id, "transfer resumed");
                        transfer.shared.resume.notify_one();
                    }
                }
            }
            Command::Shutdown => break,
        }
    }

    // the one abort-all path: tear down whatever is still registered and
    // make sure no consumer stays blocked
    for (id, transfer) in live.drain() {
        tracing::debug!(id, "transfer aborted");
        transfer.shared.abort(InputError::ReactorClosed);
        transfer.cancel.cancel();
        let _ = transfer.task.await;
    }
}
