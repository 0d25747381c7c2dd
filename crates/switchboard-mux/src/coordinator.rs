//! The coordinating loop.
//!
//! One [`Coordinator`] task owns the [`SessionRegistry`] and performs every
//! registry mutation and every write. Reads are the only concurrent work: each
//! live session has at most one spawned read task, whose result comes back
//! over a channel and is applied on the coordinator's next tick.
//!
//! Each tick runs in a fixed order:
//! 1. apply control commands from [`MuxHandle`]s
//! 2. admit queued connections, up to `max_sessions`
//! 3. apply finished reads (route, queue replies)
//! 4. scan live sessions: reap those closing, issue reads, flush replies,
//!    send heartbeats

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use switchboard_core::{
    Connection, ConnectionId, Inbound, MessageReader, MessageRouter, TransportError,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::admission::{admission_channel, AdmissionReceiver, AdmissionSender};
use crate::events::SessionEvent;
use crate::metrics as names;
use crate::registry::{SessionRegistry, SlotId, Visit};
use crate::session::{CloseReason, ReadOutcome, Session};

/// Tuning knobs for the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuxConfig {
    /// Upper bound on the wait between ticks when nothing happens.
    pub tick_interval: Duration,
    /// Connections that may wait for admission before acceptors block.
    pub admission_capacity: usize,
    /// Live sessions the registry will hold.
    pub max_sessions: usize,
    /// Unsent replies a session may accumulate before it is closed.
    pub outbound_capacity: usize,
    /// Deadline for a single read. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Deadline for a single write or ping.
    pub write_timeout: Duration,
    /// Interval between liveness probes. `None` disables them.
    pub heartbeat_interval: Option<Duration>,
    /// Buffered events per subscriber.
    pub event_capacity: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            admission_capacity: 10,
            max_sessions: 256,
            outbound_capacity: 64,
            read_timeout: Some(Duration::from_secs(60)),
            write_timeout: Duration::from_secs(5),
            heartbeat_interval: Some(Duration::from_secs(30)),
            event_capacity: 256,
        }
    }
}

/// Counters shared between the coordinator and its handles.
#[derive(Debug, Default)]
pub struct MuxStats {
    live: AtomicUsize,
    admitted: AtomicU64,
    closed: AtomicU64,
    messages_received: AtomicU64,
    replies_written: AtomicU64,
}

impl MuxStats {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn replies_written(&self) -> u64 {
        self.replies_written.load(Ordering::Relaxed)
    }
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub admitted: usize,
    pub completions: usize,
    pub reads_issued: usize,
    pub replies_written: usize,
    pub closed: usize,
}

#[derive(Debug)]
enum ControlCommand {
    Close(ConnectionId),
    CloseAll,
    Send { id: ConnectionId, text: String },
}

/// Cloneable handle for talking to a running coordinator.
#[derive(Clone, Debug)]
pub struct MuxHandle {
    control: mpsc::UnboundedSender<ControlCommand>,
    stats: Arc<MuxStats>,
    events: broadcast::Sender<SessionEvent>,
}

impl MuxHandle {
    /// Request an administrative close of one session. Returns `false` if the
    /// coordinator is gone.
    pub fn close(&self, id: ConnectionId) -> bool {
        self.control.send(ControlCommand::Close(id)).is_ok()
    }

    pub fn close_all(&self) -> bool {
        self.control.send(ControlCommand::CloseAll).is_ok()
    }

    /// Queue an unsolicited message for one session.
    pub fn send(&self, id: ConnectionId, text: impl Into<String>) -> bool {
        self.control
            .send(ControlCommand::Send {
                id,
                text: text.into(),
            })
            .is_ok()
    }

    pub fn stats(&self) -> &MuxStats {
        &self.stats
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

struct ReadCompletion {
    slot: SlotId,
    id: ConnectionId,
    reader: Box<dyn MessageReader>,
    result: Result<Inbound, TransportError>,
}

pub struct Coordinator {
    config: MuxConfig,
    router: MessageRouter,
    registry: SessionRegistry,
    admissions: AdmissionReceiver,
    admissions_open: bool,
    staged: VecDeque<Connection>,
    completions_tx: mpsc::UnboundedSender<ReadCompletion>,
    completions_rx: mpsc::UnboundedReceiver<ReadCompletion>,
    completed: Vec<ReadCompletion>,
    control_tx: mpsc::UnboundedSender<ControlCommand>,
    control_rx: mpsc::UnboundedReceiver<ControlCommand>,
    commands: Vec<ControlCommand>,
    events: broadcast::Sender<SessionEvent>,
    stats: Arc<MuxStats>,
}

impl Coordinator {
    /// Build a coordinator and the sender acceptors use to hand it connections.
    pub fn new(config: MuxConfig, router: MessageRouter) -> (Self, AdmissionSender) {
        let (admission_tx, admissions) = admission_channel(config.admission_capacity);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let coordinator = Self {
            config,
            router,
            registry: SessionRegistry::new(),
            admissions,
            admissions_open: true,
            staged: VecDeque::new(),
            completions_tx,
            completions_rx,
            completed: Vec::new(),
            control_tx,
            control_rx,
            commands: Vec::new(),
            events,
            stats: Arc::new(MuxStats::default()),
        };
        (coordinator, admission_tx)
    }

    pub fn handle(&self) -> MuxHandle {
        MuxHandle {
            control: self.control_tx.clone(),
            stats: Arc::clone(&self.stats),
            events: self.events.clone(),
        }
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Drive the loop until `cancel` fires, then close everything.
    pub async fn run(mut self, cancel: CancellationToken) {
        let period = self.config.tick_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            tick_ms = period.as_millis() as u64,
            max_sessions = self.config.max_sessions,
            admission_capacity = self.admissions.capacity(),
            "coordinator started"
        );

        loop {
            let room = self.registry.len() + self.staged.len() < self.config.max_sessions;
            let can_stage = self.admissions_open && room;
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                Some(completion) = self.completions_rx.recv() => self.completed.push(completion),
                Some(command) = self.control_rx.recv() => self.commands.push(command),
                conn = self.admissions.recv(), if can_stage => match conn {
                    Some(conn) => self.staged.push_back(conn),
                    None => {
                        debug!("admission queue closed by all acceptors");
                        self.admissions_open = false;
                    }
                },
            }
            let _ = self.tick().await;
        }

        self.shutdown().await;
    }

    /// Run one full coordinator iteration.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        self.apply_commands();
        report.admitted = self.admit_pending();
        report.completions = self.apply_completions();
        self.scan(&mut report).await;
        if report != TickReport::default() {
            trace!(?report, live = self.registry.len(), "tick");
        }
        report
    }

    /// Close every live session and every connection still waiting for
    /// admission.
    pub async fn shutdown(&mut self) {
        info!(live = self.registry.len(), "coordinator shutting down");
        self.admissions.close();

        let mut sessions = 0usize;
        for (slot, mut session) in self.registry.drain() {
            let _ = session.request_close(CloseReason::Shutdown);
            self.finish_session(slot, session).await;
            sessions += 1;
        }

        let mut queued: Vec<Connection> = self.staged.drain(..).collect();
        while let Some(conn) = self.admissions.try_recv() {
            queued.push(conn);
        }
        let discarded = queued.len();
        for conn in queued {
            let (id, remote_addr, _reader, mut writer) = conn.into_parts();
            if let Ok(Err(err)) = timeout(self.config.write_timeout, writer.close()).await {
                debug!(conn_id = %id, remote_addr, error = %err, "error closing queued connection");
            }
        }
        info!(sessions, discarded, "coordinator stopped");
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.control_rx.try_recv() {
            self.commands.push(command);
        }
        for command in std::mem::take(&mut self.commands) {
            match command {
                ControlCommand::Close(id) => {
                    let session = self
                        .registry
                        .slot_of(&id)
                        .and_then(|slot| self.registry.get_mut(slot));
                    match session {
                        Some(session) => {
                            if session.request_close(CloseReason::Administrative) {
                                info!(conn_id = %id, "administrative close requested");
                            }
                        }
                        None => debug!(conn_id = %id, "close requested for unknown session"),
                    }
                }
                ControlCommand::CloseAll => {
                    let mut requested = 0usize;
                    let _ = self.registry.for_each_live(|_, session| {
                        if session.request_close(CloseReason::Administrative) {
                            requested += 1;
                        }
                        Visit::Keep
                    });
                    info!(requested, "administrative close of all sessions");
                }
                ControlCommand::Send { id, text } => {
                    let Some(session) = self
                        .registry
                        .slot_of(&id)
                        .and_then(|slot| self.registry.get_mut(slot))
                    else {
                        debug!(conn_id = %id, "send to unknown session dropped");
                        continue;
                    };
                    if let Err(err) = session.queue(text) {
                        warn!(conn_id = %id, error = %err, "outbound queue full, closing session");
                    }
                }
            }
        }
    }

    fn admit_pending(&mut self) -> usize {
        let room = self
            .config
            .max_sessions
            .saturating_sub(self.registry.len());
        let mut admitted = 0;
        while admitted < room {
            let Some(conn) = self.staged.pop_front() else {
                break;
            };
            self.admit(conn);
            admitted += 1;
        }
        let limit = (room - admitted).min(self.admissions.capacity());
        for conn in self.admissions.drain(limit) {
            self.admit(conn);
            admitted += 1;
        }
        admitted
    }

    fn admit(&mut self, conn: Connection) {
        let session = Session::new(conn, self.config.outbound_capacity);
        let conn_id = session.id().clone();
        let remote_addr = session.remote_addr().to_owned();
        let slot = self.registry.admit(session);
        let live = self.registry.len();

        let _ = self.stats.admitted.fetch_add(1, Ordering::Relaxed);
        self.stats.live.store(live, Ordering::Relaxed);
        counter!(names::SESSIONS_ADMITTED_TOTAL).increment(1);
        gauge!(names::SESSIONS_LIVE).set(live as f64);
        info!(conn_id = %conn_id, remote_addr, slot = %slot, live, "session admitted");
        self.emit(SessionEvent::Admitted {
            slot,
            conn_id,
            remote_addr,
        });
    }

    fn apply_completions(&mut self) -> usize {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.completed.push(completion);
        }
        let completed = std::mem::take(&mut self.completed);
        let count = completed.len();
        for completion in completed {
            self.apply_completion(completion);
        }
        count
    }

    fn apply_completion(&mut self, completion: ReadCompletion) {
        let ReadCompletion {
            slot,
            id,
            reader,
            result,
        } = completion;
        let Some(session) = self
            .registry
            .get_mut(slot)
            .filter(|session| session.id() == &id)
        else {
            debug!(slot = %slot, conn_id = %id, "dropping stale read completion");
            return;
        };
        let remote_addr = session.remote_addr().to_owned();
        let outcome = session.complete_read(reader, result, &self.router);
        let idle = session.idle_for();
        self.report_read(&id, &remote_addr, idle, outcome);
    }

    fn report_read(
        &self,
        conn_id: &ConnectionId,
        remote_addr: &str,
        idle: Duration,
        outcome: ReadOutcome,
    ) {
        match outcome {
            ReadOutcome::Replied { message, reply } => {
                self.record_message(conn_id, remote_addr, &message, true);
                debug!(conn_id = %conn_id, reply, "reply queued");
                self.emit(SessionEvent::ReplyQueued {
                    conn_id: conn_id.clone(),
                    reply,
                });
            }
            ReadOutcome::Unrecognized { message } => {
                self.record_message(conn_id, remote_addr, &message, false);
                info!(conn_id = %conn_id, remote_addr, message, "unrecognized message");
                self.emit(SessionEvent::Unrecognized {
                    conn_id: conn_id.clone(),
                    message,
                });
            }
            ReadOutcome::Overflow { message } => {
                self.record_message(conn_id, remote_addr, &message, true);
                warn!(conn_id = %conn_id, remote_addr, "outbound queue full, closing session");
            }
            ReadOutcome::Heartbeat => {
                trace!(conn_id = %conn_id, "heartbeat received");
            }
            ReadOutcome::Unsupported { kind } => {
                warn!(conn_id = %conn_id, remote_addr, kind, "ignoring unsupported frame");
            }
            ReadOutcome::Failed(err) => {
                let error_kind = err.error_kind();
                if err.is_clean_close() {
                    info!(conn_id = %conn_id, remote_addr, error = %err, "peer closed connection");
                } else {
                    warn!(
                        conn_id = %conn_id,
                        remote_addr,
                        error_kind,
                        idle_ms = idle.as_millis() as u64,
                        error = %err,
                        "read failed"
                    );
                }
                counter!(names::READ_FAILURES_TOTAL, "error_kind" => error_kind).increment(1);
                self.emit(SessionEvent::ReadFailed {
                    conn_id: conn_id.clone(),
                    error_kind,
                    error: err.to_string(),
                });
            }
            ReadOutcome::Discarded => {
                debug!(conn_id = %conn_id, "read result discarded for closing session");
            }
        }
    }

    fn record_message(&self, conn_id: &ConnectionId, remote_addr: &str, message: &str, recognized: bool) {
        let _ = self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
        counter!(
            names::MESSAGES_RECEIVED_TOTAL,
            "recognized" => if recognized { "true" } else { "false" }
        )
        .increment(1);
        info!(conn_id = %conn_id, remote_addr, message, "message received");
        self.emit(SessionEvent::MessageReceived {
            conn_id: conn_id.clone(),
            message: message.to_owned(),
        });
    }

    async fn scan(&mut self, report: &mut TickReport) {
        for slot in self.registry.begin_scan() {
            let closing = match self.registry.get(slot) {
                Some(session) => session.is_close_requested(),
                None => continue,
            };
            if closing {
                if let Some(session) = self.registry.remove(slot) {
                    self.finish_session(slot, session).await;
                    report.closed += 1;
                }
                continue;
            }

            let Some(session) = self.registry.get_mut(slot) else {
                continue;
            };
            let conn_id = session.id().clone();
            if spawn_read(session, slot, &self.completions_tx, self.config.read_timeout) {
                report.reads_issued += 1;
            }
            let flush = session.flush(self.config.write_timeout).await;
            let heartbeat = match self.config.heartbeat_interval {
                Some(interval) if flush.error.is_none() => {
                    session
                        .heartbeat_if_due(interval, self.config.write_timeout)
                        .await
                }
                _ => Ok(false),
            };

            report.replies_written += flush.written.len();
            for reply in flush.written {
                let _ = self.stats.replies_written.fetch_add(1, Ordering::Relaxed);
                counter!(names::REPLIES_WRITTEN_TOTAL).increment(1);
                debug!(conn_id = %conn_id, reply, "reply written");
                self.emit(SessionEvent::ReplyWritten {
                    conn_id: conn_id.clone(),
                    reply,
                });
            }
            match (flush.error, heartbeat) {
                (Some(err), _) | (None, Err(err)) => self.report_write_failure(&conn_id, &err),
                (None, Ok(true)) => trace!(conn_id = %conn_id, "heartbeat sent"),
                (None, Ok(false)) => {}
            }
        }
        self.registry.finish_scan();
    }

    fn report_write_failure(&self, conn_id: &ConnectionId, err: &TransportError) {
        let error_kind = err.error_kind();
        warn!(conn_id = %conn_id, error_kind, error = %err, "write failed");
        counter!(names::WRITE_FAILURES_TOTAL, "error_kind" => error_kind).increment(1);
        self.emit(SessionEvent::WriteFailed {
            conn_id: conn_id.clone(),
            error_kind,
            error: err.to_string(),
        });
    }

    async fn finish_session(&mut self, slot: SlotId, mut session: Session) {
        let _ = session.close().await;
        let reason = session.close_reason().unwrap_or(CloseReason::Administrative);
        let duration = session.age();
        let live = self.registry.len();

        let _ = self.stats.closed.fetch_add(1, Ordering::Relaxed);
        self.stats.live.store(live, Ordering::Relaxed);
        counter!(names::SESSIONS_CLOSED_TOTAL, "reason" => reason.as_str()).increment(1);
        gauge!(names::SESSIONS_LIVE).set(live as f64);
        histogram!(names::SESSION_DURATION_SECONDS).record(duration.as_secs_f64());
        info!(
            conn_id = %session.id(),
            remote_addr = session.remote_addr(),
            slot = %slot,
            reason = %reason,
            duration_ms = duration.as_millis() as u64,
            live,
            "session closed"
        );
        self.emit(SessionEvent::Closed {
            slot,
            conn_id: session.id().clone(),
            reason,
        });
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("staged", &self.staged.len())
            .finish_non_exhaustive()
    }
}

/// Start one read for `session` if it can take one.
fn spawn_read(
    session: &mut Session,
    slot: SlotId,
    completions: &mpsc::UnboundedSender<ReadCompletion>,
    read_timeout: Option<Duration>,
) -> bool {
    let Some(mut reader) = session.begin_read() else {
        return false;
    };
    let id = session.id().clone();
    let completions = completions.clone();
    let task = tokio::spawn(async move {
        let result = match read_timeout {
            Some(limit) => match timeout(limit, reader.read()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Stalled(limit)),
            },
            None => reader.read().await,
        };
        let _ = completions.send(ReadCompletion {
            slot,
            id,
            reader,
            result,
        });
    });
    session.attach_read_task(task.abort_handle());
    true
}
