mod env;
pub(crate) mod model;
pub(crate) mod uploader;

use http::header::CONTENT_TYPE;
use http::Uri;
use model::{adapt_root_span, node::Node, ExportRequest};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use uploader::{DedicatedThreadTransport, Transport};
use webtrace::runtime::{TimerId, Timers};
use webtrace::trace::{ExportResult, RootSpanData, SpanExporter};
use webtrace::{wt_debug, wt_warn, ExportError};
use webtrace_http::{Bytes, HttpClient, Request};

/// Exporter buffering finished traces and posting them as JSON to a
/// collector agent.
///
/// Traces are sent once `buffer_size` of them are waiting, or
/// `buffer_timeout` after the first one was buffered, whichever comes first.
/// The flush timer runs on the host's [`Timers`]; without timers only the
/// size threshold triggers a send.
///
/// Cloning the exporter shares its buffer.
#[derive(Clone, Debug)]
pub struct AgentExporter {
    inner: Arc<ExporterInner>,
}

#[derive(Debug)]
struct ExporterInner {
    node: Node,
    endpoint: Uri,
    buffer_size: usize,
    buffer_timeout: Duration,
    transport: Arc<dyn Transport>,
    timers: Option<Weak<dyn Timers>>,
    buffer: Mutex<Buffer>,
}

#[derive(Debug, Default)]
struct Buffer {
    roots: Vec<RootSpanData>,
    timer: Option<TimerId>,
}

impl AgentExporter {
    /// Create a new agent exporter builder.
    pub fn builder() -> AgentExporterBuilder {
        AgentExporterBuilder::default()
    }

    /// The URI requests are posted to.
    pub fn endpoint(&self) -> &Uri {
        &self.inner.endpoint
    }

    /// Number of traces waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.inner
            .buffer
            .lock()
            .map(|buffer| buffer.roots.len())
            .unwrap_or_default()
    }
}

impl ExporterInner {
    fn timers(&self) -> Option<Arc<dyn Timers>> {
        self.timers.as_ref().and_then(Weak::upgrade)
    }

    fn flush_timer_fired(&self) {
        let roots = match self.buffer.lock() {
            Ok(mut buffer) => {
                buffer.timer = None;
                std::mem::take(&mut buffer.roots)
            }
            Err(_) => return,
        };
        wt_debug!(
            name: "AgentExporter.BufferTimeout",
            traces = roots.len()
        );
        self.send_logged(roots);
    }

    fn send_logged(&self, roots: Vec<RootSpanData>) {
        if let Err(err) = self.send(roots) {
            wt_warn!(
                name: "AgentExporter.ExportFailed",
                error = format!("{}", err)
            );
        }
    }

    fn send(&self, roots: Vec<RootSpanData>) -> Result<(), Error> {
        if roots.is_empty() {
            return Ok(());
        }
        let body = ExportRequest {
            node: &self.node,
            spans: roots.iter().flat_map(adapt_root_span).collect(),
        };
        let spans = body.spans.len();
        let body = serde_json::to_vec(&body)?;
        let request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body))?;
        wt_debug!(
            name: "AgentExporter.Send",
            traces = roots.len(),
            spans = spans
        );
        self.transport.send(request);
        Ok(())
    }
}

impl SpanExporter for AgentExporter {
    fn on_end_span(&self, root: RootSpanData) {
        let inner = &self.inner;
        let Ok(mut buffer) = inner.buffer.lock() else {
            wt_warn!(
                name: "AgentExporter.TraceDropped",
                reason = "buffer lock poisoned"
            );
            return;
        };
        buffer.roots.push(root);

        if buffer.roots.len() >= inner.buffer_size {
            let roots = std::mem::take(&mut buffer.roots);
            let timer = buffer.timer.take();
            drop(buffer);
            if let (Some(timer), Some(timers)) = (timer, inner.timers()) {
                timers.clear_timeout(timer);
            }
            inner.send_logged(roots);
            return;
        }

        if buffer.timer.is_none() {
            if let Some(timers) = inner.timers() {
                let weak = Arc::downgrade(inner);
                buffer.timer = Some(timers.set_timeout(
                    inner.buffer_timeout,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.flush_timer_fired();
                        }
                    }),
                ));
            }
        }
    }

    fn publish(&self, roots: Vec<RootSpanData>) -> ExportResult {
        self.inner.send(roots)?;
        Ok(())
    }
}

/// Builder for [`AgentExporter`].
///
/// Values not set explicitly are read from the environment:
/// `WEBTRACE_AGENT_ENDPOINT`, `WEBTRACE_AGENT_BUFFER_SIZE`,
/// `WEBTRACE_AGENT_BUFFER_TIMEOUT` (milliseconds) and
/// `WEBTRACE_SERVICE_NAME`.
#[derive(Clone, Debug, Default)]
pub struct AgentExporterBuilder {
    agent_endpoint: Option<String>,
    buffer_size: Option<usize>,
    buffer_timeout: Option<Duration>,
    service_name: Option<String>,
    host_name: Option<String>,
    attributes: BTreeMap<String, String>,
    transport: Option<Arc<dyn Transport>>,
    client: Option<Arc<dyn HttpClient>>,
    timers: Option<Arc<dyn Timers>>,
}

impl AgentExporterBuilder {
    /// Full URL of the agent's trace endpoint, e.g.
    /// `http://localhost:55678/v1/trace`.
    pub fn with_agent_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.agent_endpoint = Some(endpoint.into());
        self
    }

    /// The endpoint that will be used: the one set explicitly, else the one
    /// from the environment.
    pub fn agent_endpoint(&self) -> Option<String> {
        self.agent_endpoint.clone().or_else(env::get_endpoint)
    }

    /// Number of traces to collect before sending. Zero is treated as one.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Longest time a trace waits in the buffer.
    pub fn with_buffer_timeout(mut self, buffer_timeout: Duration) -> Self {
        self.buffer_timeout = Some(buffer_timeout);
        self
    }

    /// Service name reported to the agent.
    pub fn with_service_name<T: Into<String>>(mut self, name: T) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Host name reported to the agent, usually the page's host.
    pub fn with_host_name<T: Into<String>>(mut self, host_name: T) -> Self {
        self.host_name = Some(host_name.into());
        self
    }

    /// The host name set so far.
    pub fn host_name(&self) -> Option<&str> {
        self.host_name.as_deref()
    }

    /// Extra attributes describing the sender, sent with every request.
    pub fn with_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes = attributes
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self
    }

    /// Transport to hand requests to. Takes precedence over
    /// [`with_http_client`](Self::with_http_client).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// HTTP client used from a [`DedicatedThreadTransport`].
    pub fn with_http_client<T: HttpClient + 'static>(mut self, client: T) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    /// Host timers driving the buffer timeout. The exporter keeps a weak
    /// handle only.
    pub fn with_timers(mut self, timers: Arc<dyn Timers>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Build the exporter.
    pub fn build(self) -> Result<AgentExporter, Error> {
        let endpoint: Uri = self
            .agent_endpoint()
            .ok_or(Error::MissingEndpoint)?
            .parse()?;

        let transport: Arc<dyn Transport> = match (self.transport, self.client) {
            (Some(transport), _) => transport,
            (None, Some(client)) => Arc::new(
                DedicatedThreadTransport::new(client).map_err(|err| Error::Other(err.to_string()))?,
            ),
            (None, None) => default_transport()?,
        };

        if self.timers.is_none() {
            wt_warn!(
                name: "AgentExporter.NoTimers",
                message = "buffer timeout disabled, traces are sent only when the buffer is full"
            );
        }

        let node = Node::builder()
            .identifier(self.host_name.unwrap_or_default())
            .service_info(self.service_name.unwrap_or_else(env::get_service_name))
            .attributes(self.attributes)
            .build();

        Ok(AgentExporter {
            inner: Arc::new(ExporterInner {
                node,
                endpoint,
                buffer_size: self
                    .buffer_size
                    .unwrap_or_else(env::get_buffer_size)
                    .max(1),
                buffer_timeout: self.buffer_timeout.unwrap_or_else(env::get_buffer_timeout),
                transport,
                timers: self.timers.as_ref().map(Arc::downgrade),
                buffer: Mutex::new(Buffer::default()),
            }),
        })
    }
}

#[cfg(feature = "reqwest-blocking-client")]
fn default_transport() -> Result<Arc<dyn Transport>, Error> {
    let transport = DedicatedThreadTransport::new(Arc::new(reqwest::blocking::Client::new()))
        .map_err(|err| Error::Other(err.to_string()))?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "reqwest-blocking-client"))]
fn default_transport() -> Result<Arc<dyn Transport>, Error> {
    Err(Error::NoHttpClient)
}

/// Wrap type for errors from the agent exporter
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No agent endpoint was configured.
    #[error("agent endpoint must be set, either on the builder or through WEBTRACE_AGENT_ENDPOINT")]
    MissingEndpoint,

    /// No http client implementation found. User should provide one or enable features.
    #[error("http client must be set, users can enable the reqwest-blocking-client feature to use the http client implementation within the crate")]
    NoHttpClient,

    /// The uri provided is invalid
    #[error("invalid uri")]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// Http requests failed
    #[error("http request failed with {0}")]
    RequestFailed(#[from] http::Error),

    /// The request body could not be encoded
    #[error("serialization failed with {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("export error: {0}")]
    Other(String),
}

impl ExportError for Error {
    fn exporter_name(&self) -> &'static str {
        "agent"
    }
}
