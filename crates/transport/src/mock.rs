//! Scripted Transport
//!
//! In-memory [`StreamTransport`] for tests. Each call to `open` consumes the
//! next scripted connection; opening past the end of the script fails with a
//! network error.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use plan_pipeline_core::{Envelope, GenerationRequest};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::{EnvelopeStream, StreamTransport};

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum ScriptedItem {
    Envelope(Envelope),
    Error(TransportError),
    Delay(Duration),
}

/// Outcome of one scripted `open` call.
#[derive(Debug, Clone)]
pub struct ScriptedConnection {
    open_delay: Duration,
    outcome: Result<Vec<ScriptedItem>, TransportError>,
    hold_open: bool,
    honor_cancel: bool,
}

impl ScriptedConnection {
    /// The open itself fails.
    pub fn fail(error: TransportError) -> Self {
        Self {
            open_delay: Duration::ZERO,
            outcome: Err(error),
            hold_open: false,
            honor_cancel: true,
        }
    }

    /// The open succeeds and the stream yields `items`, then ends.
    pub fn stream(items: Vec<ScriptedItem>) -> Self {
        Self {
            open_delay: Duration::ZERO,
            outcome: Ok(items),
            hold_open: false,
            honor_cancel: true,
        }
    }

    /// Stream of envelopes only.
    pub fn envelopes(envelopes: Vec<Envelope>) -> Self {
        Self::stream(envelopes.into_iter().map(ScriptedItem::Envelope).collect())
    }

    /// Keep the stream open after the scripted items instead of ending it.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Wait before resolving the open.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Keep delivering after cancellation, like a slow-to-close socket.
    pub fn ignore_cancel(mut self) -> Self {
        self.honor_cancel = false;
        self
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedConnection>>,
    requests: Mutex<Vec<GenerationRequest>>,
    opens: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = ScriptedConnection>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
        }
    }

    /// Number of `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Requests passed to `open`, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_connection(&self) -> Option<ScriptedConnection> {
        self.script.lock().ok().and_then(|mut script| script.pop_front())
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<EnvelopeStream, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let connection = self
            .next_connection()
            .ok_or_else(|| TransportError::Network("script exhausted".to_string()))?;

        if !connection.open_delay.is_zero() {
            if connection.honor_cancel {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                    _ = tokio::time::sleep(connection.open_delay) => {}
                }
            } else {
                tokio::time::sleep(connection.open_delay).await;
            }
        }

        let items = connection.outcome?;
        let scripted = futures_util::stream::unfold(items.into_iter(), |mut items| async move {
            loop {
                match items.next()? {
                    ScriptedItem::Delay(delay) => tokio::time::sleep(delay).await,
                    ScriptedItem::Envelope(envelope) => return Some((Ok(envelope), items)),
                    ScriptedItem::Error(error) => return Some((Err(error), items)),
                }
            }
        });

        let stream: EnvelopeStream = if connection.hold_open {
            Box::pin(scripted.chain(futures_util::stream::pending()))
        } else {
            Box::pin(scripted)
        };

        if connection.honor_cancel {
            Ok(Box::pin(stream.take_until(cancel.cancelled_owned())))
        } else {
            Ok(stream)
        }
    }
}
