//! Delivery of frames and faults to subscribers.
//!
//! Each subscriber gets its own delivery lane: an unbounded channel drained
//! by a blocking worker. Sessions only enqueue, so a slow or blocking
//! consumer never stalls a read loop, and events reach one subscriber in
//! submission order. Callbacks run under `catch_unwind`; a panicking
//! consumer is logged and counted, and keeps receiving later events.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::frame::{StreamFault, StreamFrame};
use crate::ports::StreamListener;

/// One event queued for a subscriber.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A frame.
    Frame(StreamFrame),
    /// A fault.
    Fault(StreamFault),
}

/// Snapshot of delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Frames handed to listener callbacks.
    pub frames_delivered: u64,
    /// Faults handed to listener callbacks.
    pub faults_delivered: u64,
    /// Callbacks that panicked.
    pub listener_panics: u64,
    /// Events dropped because the lane was already closed.
    pub dropped: u64,
    /// Lanes currently open, one per subscriber being delivered to.
    pub open_lanes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    frames_delivered: AtomicU64,
    faults_delivered: AtomicU64,
    listener_panics: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            faults_delivered: self.faults_delivered.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            open_lanes: 0,
        }
    }
}

struct Lane {
    listener: Arc<dyn StreamListener>,
    sender: mpsc::UnboundedSender<Delivery>,
}

/// Per-subscriber delivery lanes.
pub struct Dispatcher {
    runtime: Handle,
    lanes: Mutex<Vec<Lane>>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Create a dispatcher whose workers run on `runtime`'s blocking pool.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            lanes: Mutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Queue `delivery` for `listener`, opening its lane if needed.
    pub fn deliver(&self, listener: &Arc<dyn StreamListener>, delivery: Delivery) {
        let mut lanes = self.lanes.lock();
        if let Some(lane) = lanes.iter().find(|l| Arc::ptr_eq(&l.listener, listener)) {
            if lane.sender.send(delivery).is_err() {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        if sender.send(delivery).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.spawn_worker(Arc::clone(listener), receiver);
        lanes.push(Lane {
            listener: Arc::clone(listener),
            sender,
        });
        debug!(lanes = lanes.len(), "Delivery lane opened");
    }

    /// Close the lane of `listener`.
    ///
    /// Events already queued are still delivered; later ones open a new lane.
    pub fn close(&self, listener: &Arc<dyn StreamListener>) {
        let mut lanes = self.lanes.lock();
        let before = lanes.len();
        lanes.retain(|l| !Arc::ptr_eq(&l.listener, listener));
        if lanes.len() != before {
            debug!(lanes = lanes.len(), "Delivery lane closed");
        }
    }

    /// Close every lane.
    pub fn close_all(&self) {
        self.lanes.lock().clear();
    }

    /// Number of open lanes.
    #[must_use]
    pub fn lane_count(&self) -> usize {
        self.lanes.lock().len()
    }

    /// Current delivery counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            open_lanes: self.lane_count(),
            ..self.counters.snapshot()
        }
    }

    fn spawn_worker(
        &self,
        listener: Arc<dyn StreamListener>,
        mut receiver: mpsc::UnboundedReceiver<Delivery>,
    ) {
        let counters = Arc::clone(&self.counters);
        // The join handle is not needed: the worker ends when its lane closes.
        drop(self.runtime.spawn_blocking(move || {
            while let Some(delivery) = receiver.blocking_recv() {
                run_callback(listener.as_ref(), &delivery, &counters);
            }
        }));
    }
}

fn run_callback(listener: &dyn StreamListener, delivery: &Delivery, counters: &Counters) {
    let outcome = catch_unwind(AssertUnwindSafe(|| match delivery {
        Delivery::Frame(frame) => listener.on_data(frame),
        Delivery::Fault(fault) => listener.on_error(fault),
    }));
    match delivery {
        Delivery::Frame(_) => counters.frames_delivered.fetch_add(1, Ordering::Relaxed),
        Delivery::Fault(_) => counters.faults_delivered.fetch_add(1, Ordering::Relaxed),
    };
    if outcome.is_err() {
        counters.listener_panics.fetch_add(1, Ordering::Relaxed);
        warn!("Stream listener panicked; delivery continues");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("lanes", &self.lane_count())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
