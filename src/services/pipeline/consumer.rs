//! Pipeline Consumer
//!
//! Owns the live [`RunState`] and the single in-flight connection.
//!
//! Each `start` spawns a reader task for the new generation. The reader
//! opens the transport, applies the retry policy, and pushes tagged messages
//! onto one channel. A single reducer loop drains that channel and folds each
//! message into the state, so envelopes are never applied concurrently. The
//! generation check happens while the state is locked for writing: once a
//! newer generation has begun, nothing tagged with an older one lands.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use plan_pipeline_core::{Envelope, GenerationRequest, PipelineEvent, RunState};
use plan_pipeline_transport::{
    EnvelopeStream, RetryDecision, RetryPolicy, StreamTransport, TransportError,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::generation::GenerationGuard;
use super::selector::Selector;
use crate::utils::error::AppResult;

/// What a reader task reports for its generation.
#[derive(Debug)]
enum RunMessage {
    Envelope(Envelope),
    Failed(String),
}

#[derive(Debug)]
struct Tagged {
    generation: u64,
    message: RunMessage,
}

struct Shared {
    guard: GenerationGuard,
    state: watch::Sender<RunState>,
}

impl Shared {
    /// Apply one message if its generation is still current.
    /// Returns whether the snapshot changed.
    fn handle(&self, tagged: Tagged) -> bool {
        let Tagged {
            generation,
            message,
        } = tagged;
        let guard = &self.guard;

        self.state.send_if_modified(|state| {
            if !guard.is_current(generation) {
                debug!(generation, "discarding message from superseded run");
                return false;
            }

            match message {
                RunMessage::Envelope(envelope) => {
                    if let Some(last) = state.last_seq {
                        if envelope.seq < last {
                            debug!(
                                generation,
                                seq = envelope.seq,
                                last_seq = last,
                                "sequence went backwards"
                            );
                        }
                    }
                    if envelope.is_terminal() {
                        info!(
                            generation,
                            run_id = %envelope.run_id,
                            event = envelope.event_type(),
                            "run reached terminal event"
                        );
                    }
                    let heartbeat = matches!(envelope.event, PipelineEvent::Heartbeat);
                    state.apply(&envelope);
                    !heartbeat
                }
                RunMessage::Failed(error) => {
                    state.set_error(error);
                    true
                }
            }
        })
    }
}

struct ActiveRun {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveRun {
    fn stop(self) {
        self.token.cancel();
        debug!(generation = self.generation, "stopping reader");
        // Cooperative: the reader notices the token at its next await.
        drop(self.handle);
    }
}

/// The consumer-facing API: start, cancel, and reactive snapshots.
pub struct PipelineConsumer {
    transport: Arc<dyn StreamTransport>,
    policy: RetryPolicy,
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<Tagged>,
    active: Mutex<Option<ActiveRun>>,
    reducer: JoinHandle<()>,
}

impl PipelineConsumer {
    /// Create a consumer. Must be called from within a Tokio runtime.
    pub fn new(transport: Arc<dyn StreamTransport>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(RunState::new());
        let shared = Arc::new(Shared {
            guard: GenerationGuard::new(),
            state,
        });

        let (tx, mut rx) = mpsc::unbounded_channel::<Tagged>();
        let loop_shared = shared.clone();
        let reducer = tokio::spawn(async move {
            while let Some(tagged) = rx.recv().await {
                loop_shared.handle(tagged);
            }
        });

        Self {
            transport,
            policy,
            shared,
            tx,
            active: Mutex::new(None),
            reducer,
        }
    }

    /// Start a run, cancelling any run in flight. Returns the new generation id.
    pub fn start(&self, request: GenerationRequest) -> AppResult<u64> {
        request.validate()?;

        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            previous.stop();
        }

        // Bump before resetting: the old generation can no longer write once
        // the fresh state is visible.
        let generation = self.shared.guard.next_generation();
        self.shared.state.send_modify(|state| state.start_run(None));

        info!(
            generation,
            transport = self.transport.name(),
            subject = %request.subject,
            grade = %request.grade,
            "starting generation run"
        );

        let token = CancellationToken::new();
        let reader = Reader {
            transport: self.transport.clone(),
            policy: self.policy.clone(),
            generation,
            token: token.clone(),
            tx: self.tx.clone(),
        };
        let handle = tokio::spawn(reader.run(request));

        *active = Some(ActiveRun {
            generation,
            token,
            handle,
        });
        Ok(generation)
    }

    /// Cancel the run in flight. Partial state is kept and the error reads
    /// "Generation cancelled". Does nothing to a run that already ended.
    pub fn cancel(&self) {
        let mut active = self.lock_active();
        self.shared.guard.retire();
        if let Some(run) = active.take() {
            run.stop();
        }
        let cancelled = self.shared.state.send_if_modified(|state| state.cancel());
        if cancelled {
            warn!("generation run cancelled");
        }
    }

    /// Stop the run in flight and record `message` as its error.
    pub fn set_error(&self, message: impl Into<String>) {
        let mut active = self.lock_active();
        self.shared.guard.retire();
        if let Some(run) = active.take() {
            run.stop();
        }
        let message = message.into();
        self.shared
            .state
            .send_modify(|state| state.set_error(message));
    }

    /// Clone of the current snapshot
    pub fn snapshot(&self) -> RunState {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every snapshot change
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.shared.state.subscribe()
    }

    /// Watch one slice of the snapshot
    pub fn select<T, F>(&self, select: F) -> Selector<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&RunState) -> T + Send + 'static,
    {
        Selector::spawn(self.subscribe(), select)
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.borrow().is_running
    }

    /// Id of the most recent generation
    pub fn generation(&self) -> u64 {
        self.shared.guard.current()
    }

    /// Wait until no run is in progress and return the final snapshot.
    pub async fn wait_until_idle(&self) -> RunState {
        let mut rx = self.subscribe();
        let idle = rx.wait_for(|state| !state.is_running).await;
        match idle {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PipelineConsumer {
    fn drop(&mut self) {
        self.shared.guard.retire();
        if let Some(run) = self.lock_active().take() {
            run.token.cancel();
            run.handle.abort();
        }
        self.reducer.abort();
    }
}

/// Drives one generation: open, read, and reconnect per the retry policy.
struct Reader {
    transport: Arc<dyn StreamTransport>,
    policy: RetryPolicy,
    generation: u64,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<Tagged>,
}

impl Reader {
    async fn run(self, request: GenerationRequest) {
        let mut failures: u32 = 0;

        loop {
            let result = match self.transport.open(&request, self.token.clone()).await {
                Ok(stream) => {
                    failures = 0;
                    self.read(stream).await
                }
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(()) => return,
                Err(e) => e,
            };
            if self.token.is_cancelled() {
                return;
            }

            failures += 1;
            match self.policy.decide(error.kind(), failures) {
                RetryDecision::Retry => {
                    warn!(
                        generation = self.generation,
                        attempt = failures,
                        max_retries = self.policy.max_retries,
                        error = %error,
                        "event stream failed, reconnecting"
                    );
                    if !self.policy.delay.is_zero() {
                        tokio::select! {
                            _ = self.token.cancelled() => return,
                            _ = tokio::time::sleep(self.policy.delay) => {}
                        }
                    }
                }
                RetryDecision::Abort => {
                    warn!(
                        generation = self.generation,
                        failures,
                        error = %error,
                        "event stream failed, aborting run"
                    );
                    self.send(RunMessage::Failed(error.to_string()));
                    return;
                }
            }
        }
    }

    /// Forward envelopes until a terminal one. `Ok` means the reader is done.
    async fn read(&self, mut stream: EnvelopeStream) -> Result<(), TransportError> {
        info!(generation = self.generation, "event stream open");

        while let Some(item) = stream.next().await {
            if self.token.is_cancelled() {
                return Ok(());
            }
            let envelope = item?;
            let terminal = envelope.is_terminal();
            if !self.send(RunMessage::Envelope(envelope)) || terminal {
                return Ok(());
            }
        }

        if self.token.is_cancelled() {
            Ok(())
        } else {
            Err(TransportError::StreamEnded)
        }
    }

    /// Returns false once the consumer is gone.
    fn send(&self, message: RunMessage) -> bool {
        self.tx
            .send(Tagged {
                generation: self.generation,
                message,
            })
            .is_ok()
    }
}
