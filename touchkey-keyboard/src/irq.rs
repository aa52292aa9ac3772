//! Interrupt line, masking and the dispatch worker
//!
//! [`IrqLine::fire`] is the only thing that runs in interrupt context. It
//! reads the mask and enqueues; decoding, bus I/O and LED work all happen
//! on the worker task. Masking nests and waits for the dispatch in flight.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::decoder::KeyDecoder;
use crate::notification::NotificationController;

/// Pending interrupts beyond this are dropped
const IRQ_QUEUE_DEPTH: usize = 16;

pub struct IrqGate {
    depth: AtomicU32,
    dispatch: tokio::sync::Mutex<()>,
}

impl Default for IrqGate {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGate {
    pub fn new() -> Self {
        Self {
            depth: AtomicU32::new(0),
            dispatch: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_masked(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    /// Mask the line and wait until no dispatch is in flight
    pub async fn mask(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        let _inflight = self.dispatch.lock().await;
    }

    pub fn unmask(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
    }
}

/// Interrupt-context handle
#[derive(Clone)]
pub struct IrqLine {
    tx: mpsc::Sender<()>,
    gate: Arc<IrqGate>,
}

impl IrqLine {
    /// Signal a falling edge. Returns whether the interrupt was queued.
    pub fn fire(&self) -> bool {
        if self.gate.is_masked() {
            return false;
        }
        self.tx.try_send(()).is_ok()
    }
}

/// Spawn the dispatch worker. It stops once every [`IrqLine`] is dropped.
pub fn spawn_worker(
    gate: Arc<IrqGate>,
    decoder: Arc<KeyDecoder>,
    controller: NotificationController,
) -> (IrqLine, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(IRQ_QUEUE_DEPTH);
    let line = IrqLine {
        tx,
        gate: gate.clone(),
    };

    let handle = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let _inflight = gate.dispatch.lock().await;
            // Masked after the edge was queued
            if gate.is_masked() {
                debug!("Discarding interrupt queued before mask");
                continue;
            }
            let outcome = decoder.handle_interrupt().await;
            if outcome.is_key_activity() {
                controller.on_key_activity().await;
            }
        }
        debug!("Touchkey interrupt worker stopped");
    });

    (line, handle)
}
