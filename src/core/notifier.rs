//! Session lifecycle events.
//!
//! The notifier stamps each payload with the session id, agent and a
//! strictly increasing timestamp, hands it to an [`EventSink`], and keeps
//! the most recent events in a local log whether or not delivery worked.
//! Delivery errors stop here.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::schema::agent::AgentId;
use crate::schema::event::{AnalyticsEvent, EventPayload};
use crate::schema::scene::SceneId;

/// Events kept in the local fallback log.
pub const LOCAL_LOG_CAPACITY: usize = 100;

/// Source of wall-clock milliseconds since the Unix epoch.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        jiff::Timestamp::now().as_millisecond()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("event receiver disconnected")]
    Disconnected,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where events go. Implementations may fail; the notifier never retries.
pub trait EventSink {
    fn deliver(&mut self, event: &AnalyticsEvent) -> Result<(), DeliveryError>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn deliver(&mut self, _event: &AnalyticsEvent) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Sends events over a channel to whoever drains the receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<AnalyticsEvent>,
}

impl ChannelSink {
    pub fn new() -> (ChannelSink, mpsc::Receiver<AnalyticsEvent>) {
        let (tx, rx) = mpsc::channel();
        (ChannelSink { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&mut self, event: &AnalyticsEvent) -> Result<(), DeliveryError> {
        self.tx
            .send(event.clone())
            .map_err(|_| DeliveryError::Disconnected)
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn deliver(&mut self, event: &AnalyticsEvent) -> Result<(), DeliveryError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Stamps and delivers lifecycle events for one session.
pub struct Notifier {
    session_id: Uuid,
    agent_id: AgentId,
    clock: Box<dyn Clock>,
    sink: Box<dyn EventSink>,
    session_start_ms: i64,
    last_timestamp_ms: Option<i64>,
    /// Scene currently on screen and when it was entered.
    scene_entered: Option<(SceneId, i64)>,
    local_log: VecDeque<AnalyticsEvent>,
    delivery_failures: u32,
}

impl Notifier {
    pub fn new(agent_id: AgentId, clock: Box<dyn Clock>, sink: Box<dyn EventSink>) -> Self {
        let session_start_ms = clock.now_ms();
        Self {
            session_id: Uuid::new_v4(),
            agent_id,
            clock,
            sink,
            session_start_ms,
            last_timestamp_ms: None,
            scene_entered: None,
            local_log: VecDeque::with_capacity(LOCAL_LOG_CAPACITY),
            delivery_failures: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Later events are attributed to `agent_id`.
    pub fn set_agent(&mut self, agent_id: AgentId) {
        self.agent_id = agent_id;
    }

    /// Milliseconds since the session started, by the clock.
    pub fn session_elapsed_ms(&self) -> i64 {
        self.clock.now_ms() - self.session_start_ms
    }

    pub fn delivery_failures(&self) -> u32 {
        self.delivery_failures
    }

    /// The most recent events, oldest first.
    pub fn local_log(&self) -> impl Iterator<Item = &AnalyticsEvent> {
        self.local_log.iter()
    }

    pub fn clear_local_log(&mut self) {
        self.local_log.clear();
    }

    fn next_timestamp(&mut self) -> i64 {
        let now = self.clock.now_ms();
        let ts = match self.last_timestamp_ms {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_timestamp_ms = Some(ts);
        ts
    }

    /// Stamp and deliver one event. Never fails.
    pub fn emit(&mut self, payload: EventPayload) {
        let timestamp_ms = self.next_timestamp();
        let event = AnalyticsEvent {
            session_id: self.session_id,
            timestamp_ms,
            session_duration_ms: timestamp_ms - self.session_start_ms,
            agent_id: self.agent_id.clone(),
            payload,
        };

        match self.sink.deliver(&event) {
            Ok(()) => debug!(event = event.payload.name(), "event delivered"),
            Err(err) => {
                self.delivery_failures += 1;
                warn!(event = event.payload.name(), error = %err, "event delivery failed");
            }
        }

        if self.local_log.len() == LOCAL_LOG_CAPACITY {
            self.local_log.pop_front();
        }
        self.local_log.push_back(event);
    }

    /// Record entry into `scene_id`, first closing out the time spent in
    /// the previous scene with a `scene_time` event.
    pub fn scene_view(
        &mut self,
        scene_id: &SceneId,
        is_ending: bool,
        has_choices: bool,
        has_puzzle: bool,
    ) {
        let now = self.clock.now_ms();
        if let Some((previous, entered)) = self.scene_entered.take() {
            self.emit(EventPayload::SceneTime {
                scene_id: previous,
                duration_ms: (now - entered).max(0),
            });
        }
        self.emit(EventPayload::SceneView {
            scene_id: scene_id.clone(),
            is_ending,
            has_choices,
            has_puzzle,
        });
        self.scene_entered = Some((scene_id.clone(), now));
    }
}
