//! # Agent request transport
use futures_executor::block_on;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use webtrace::{wt_debug, wt_warn};
use webtrace_http::{Bytes, HttpClient, Request, ResponseExt};

/// Default number of requests waiting for the upload thread.
pub(crate) const DEFAULT_MAX_QUEUED_REQUESTS: usize = 64;

/// Hands finished export requests to the network.
///
/// `send` is called on the host event loop and must not block. Delivery is
/// fire-and-forget: failures are logged, never retried or reported back.
pub trait Transport: Send + Sync + Debug {
    /// Queue `request` for sending.
    fn send(&self, request: Request<Bytes>);
}

/// Sends requests from a dedicated thread through an [`HttpClient`].
///
/// Requests are queued on a bounded channel; when the queue is full the
/// request is dropped.
#[derive(Debug)]
pub struct DedicatedThreadTransport {
    sender: SyncSender<Request<Bytes>>,
    dropped_requests: AtomicUsize,
}

impl DedicatedThreadTransport {
    /// Starts the upload thread with the default queue length.
    pub fn new(client: Arc<dyn HttpClient>) -> std::io::Result<Self> {
        Self::with_capacity(client, DEFAULT_MAX_QUEUED_REQUESTS)
    }

    /// Starts the upload thread with room for `capacity` queued requests.
    pub fn with_capacity(client: Arc<dyn HttpClient>, capacity: usize) -> std::io::Result<Self> {
        let (sender, receiver) = sync_channel::<Request<Bytes>>(capacity);
        thread::Builder::new()
            .name("WebtraceAgentUploader".to_string())
            .spawn(move || {
                while let Ok(request) = receiver.recv() {
                    let uri = request.uri().to_string();
                    let sent = panic::catch_unwind(AssertUnwindSafe(|| {
                        block_on(client.send_bytes(request))
                    }));
                    match sent {
                        Ok(Ok(response)) => match response.error_for_status() {
                            Ok(_) => {
                                wt_debug!(name: "AgentExporter.RequestSent", uri = uri.as_str());
                            }
                            Err(err) => {
                                wt_warn!(
                                    name: "AgentExporter.RequestFailed",
                                    uri = uri.as_str(),
                                    error = format!("{}", err)
                                );
                            }
                        },
                        Ok(Err(err)) => {
                            wt_warn!(
                                name: "AgentExporter.RequestFailed",
                                uri = uri.as_str(),
                                error = format!("{}", err)
                            );
                        }
                        // A client that needs an async runtime panics when polled here.
                        Err(_) => {
                            wt_warn!(
                                name: "AgentExporter.RequestFailed",
                                uri = uri.as_str(),
                                error = "http client panicked"
                            );
                        }
                    }
                }
                wt_debug!(name: "AgentExporter.UploaderStopped");
            })?;
        Ok(DedicatedThreadTransport {
            sender,
            dropped_requests: AtomicUsize::new(0),
        })
    }
}

impl Transport for DedicatedThreadTransport {
    fn send(&self, request: Request<Bytes>) {
        match self.sender.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped_requests.fetch_add(1, Ordering::Relaxed) + 1;
                wt_warn!(
                    name: "AgentExporter.RequestDropped",
                    reason = "upload queue full",
                    dropped_requests = dropped
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                wt_warn!(
                    name: "AgentExporter.RequestDropped",
                    reason = "upload thread stopped"
                );
            }
        }
    }
}
