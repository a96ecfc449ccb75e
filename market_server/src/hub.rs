//! Fan-out of price snapshots to every live subscriber.
//!
//! The hub owns the subscriber set and a `LivenessMonitor`. A broadcast
//! serializes the snapshot once, copies the current sink list out of the lock,
//! and writes to each sink outside it, so a slow subscriber never holds up the
//! price producers. Any write failure (including a write deadline) drops that
//! subscriber on the spot; nothing is retried.
//!
//! Sinks serialize their own writes, so the continuous process and any number
//! of shock threads may broadcast concurrently without interleaving frames.

use crate::model::liveness::{LivenessMonitor, SubscriberId};
use log::{debug, info, warn};
use market_common::net::PING;
use market_common::payload::Snapshot;
use market_common::{MarketError, Result};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One subscriber connection as seen by the hub.
pub trait SubscriberSink: Send + Sync {
    /// Write one complete frame, honouring the sink's write deadline.
    fn send(&self, frame: &[u8]) -> io::Result<()>;

    /// Release the underlying connection. Must tolerate repeated calls.
    fn close(&self);

    /// Human readable peer description for logs.
    fn describe(&self) -> String;
}

/// Outcome of one heartbeat round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// Subscribers that received a probe.
    pub probed: usize,
    /// Subscribers removed for silence or a failed probe.
    pub dropped: usize,
}

struct HubState {
    sinks: HashMap<SubscriberId, Arc<dyn SubscriberSink>>,
    liveness: LivenessMonitor,
}

/// Subscriber registry and broadcaster.
pub struct BroadcastHub {
    state: Mutex<HubState>,
    next_id: AtomicU64,
}

/// Encode a payload as one newline-terminated JSON frame.
pub fn encode_frame(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let mut frame = serde_json::to_vec(snapshot)?;
    frame.push(b'\n');
    Ok(frame)
}

impl BroadcastHub {
    /// Create an empty hub that expires subscribers silent for `read_deadline`.
    pub fn new(read_deadline: Duration) -> Self {
        Self {
            state: Mutex::new(HubState {
                sinks: HashMap::new(),
                liveness: LivenessMonitor::new(read_deadline),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.sinks.len()).unwrap_or(0)
    }

    /// True when nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a sink after sending it `initial` as its first frame.
    ///
    /// A sink that cannot take the initial snapshot is closed and never added.
    pub fn subscribe(&self, sink: Arc<dyn SubscriberSink>, initial: &Snapshot) -> Result<SubscriberId> {
        let frame = encode_frame(initial)?;
        if let Err(e) = sink.send(&frame) {
            sink.close();
            return Err(MarketError::SubscriberWrite(format!(
                "{}: {}",
                sink.describe(),
                e
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let peer = sink.describe();
        let total = {
            let mut state = self.state.lock()?;
            state.sinks.insert(id, sink);
            state.liveness.touch(id);
            state.sinks.len()
        };
        info!("Subscriber {} ({}) joined. Total subscribers: {}", id, peer, total);
        Ok(id)
    }

    /// Remove a subscriber and close its sink. Safe to call more than once.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = match self.state.lock() {
            Ok(mut state) => {
                state.liveness.forget(id);
                state.sinks.remove(&id)
            }
            Err(e) => {
                warn!("Hub lock poisoned while removing {}: {}", id, e);
                None
            }
        };
        match removed {
            Some(sink) => {
                sink.close();
                info!("Subscriber {} ({}) removed", id, sink.describe());
                true
            }
            None => false,
        }
    }

    /// Record inbound activity from a subscriber.
    pub fn touch(&self, id: SubscriberId) {
        if let Ok(mut state) = self.state.lock() {
            if state.sinks.contains_key(&id) {
                state.liveness.touch(id);
            }
        }
    }

    fn targets(&self) -> Result<Vec<(SubscriberId, Arc<dyn SubscriberSink>)>> {
        let state = self.state.lock()?;
        Ok(state
            .sinks
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect())
    }

    fn send_all(&self, frame: &[u8]) -> Result<(usize, usize)> {
        let targets = self.targets()?;
        let mut failed = Vec::new();
        for (id, sink) in &targets {
            if let Err(e) = sink.send(frame) {
                warn!("Write to subscriber {} ({}) failed, dropping: {}", id, sink.describe(), e);
                failed.push(*id);
            }
        }
        for id in &failed {
            self.unsubscribe(*id);
        }
        Ok((targets.len() - failed.len(), failed.len()))
    }

    /// Push `snapshot` to every subscriber; returns how many writes succeeded.
    pub fn broadcast(&self, snapshot: &Snapshot) -> usize {
        let frame = match encode_frame(snapshot) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to serialize snapshot: {}", e);
                return 0;
            }
        };
        match self.send_all(&frame) {
            Ok((delivered, _)) => delivered,
            Err(e) => {
                warn!("Broadcast skipped: {}", e);
                0
            }
        }
    }

    /// Expire silent subscribers, then probe the rest with a `PING` line.
    pub fn heartbeat(&self) -> HeartbeatReport {
        self.heartbeat_at(Instant::now())
    }

    /// Heartbeat round evaluated at `now`.
    pub fn heartbeat_at(&self, now: Instant) -> HeartbeatReport {
        let expired = match self.state.lock() {
            Ok(mut state) => state.liveness.check_timeouts_at(now),
            Err(e) => {
                warn!("Heartbeat skipped: {}", e);
                return HeartbeatReport::default();
            }
        };
        for id in &expired {
            debug!("Subscriber {} silent past the read deadline", id);
            self.unsubscribe(*id);
        }
        let frame = format!("{}\n", PING);
        let (probed, failed) = self.send_all(frame.as_bytes()).unwrap_or((0, 0));
        HeartbeatReport {
            probed,
            dropped: expired.len() + failed,
        }
    }
}
