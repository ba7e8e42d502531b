//! Background identification.
//!
//! Spawns a thread that owns the matcher, receives frames through a bounded
//! channel and publishes one identification outcome when the phase ends.
//! The control side never blocks: `push` drops frames when the queue is full.
//!
//! Each `IdentifierThread` spawns exactly one thread, shut down and joined
//! when the handle is dropped.
use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use vehid_traits::CanFrame;
use vehid_traits::clock::Clock;

use crate::config::IdentifyCfg;
use crate::error::VehidError;
use crate::fingerprint::FingerprintDatabase;
use crate::matcher::Identifier;
use crate::runner::{Identification, conclude};

/// Frames buffered between the bus reader and the matcher thread.
pub const QUEUE_DEPTH: usize = 1024;

pub type Outcome = Result<Identification, VehidError>;

pub struct IdentifierThread {
    tx: Option<xch::Sender<CanFrame>>,
    rx: xch::Receiver<Outcome>,
    outcome: Option<Outcome>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl IdentifierThread {
    pub fn spawn<C: Clock + Send + 'static>(
        db: Arc<FingerprintDatabase>,
        cfg: IdentifyCfg,
        clock: C,
    ) -> Self {
        let (tx, frames) = xch::bounded::<CanFrame>(QUEUE_DEPTH);
        let (out, rx) = xch::bounded::<Outcome>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let poll = Duration::from_millis(cfg.read_timeout_ms.max(1));

        let join_handle = std::thread::spawn(move || {
            let epoch = clock.now();
            let mut ident = Identifier::new(&db, cfg.matcher.clone());
            let mut deadline = false;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("identifier thread received shutdown signal");
                    return;
                }
                if ident.is_done() || ident.frames_seen() >= u64::from(cfg.max_frames) {
                    break;
                }
                if clock.ms_since(epoch) >= cfg.timeout_ms {
                    deadline = true;
                    break;
                }
                match frames.recv_timeout(poll) {
                    Ok(frame) => ident.observe(&frame),
                    Err(xch::RecvTimeoutError::Timeout) => continue,
                    // Producer finished: conclude with what was seen.
                    Err(xch::RecvTimeoutError::Disconnected) => break,
                }
            }
            let outcome = conclude(ident, &cfg, deadline);
            if out.send(outcome).is_err() {
                tracing::debug!("identifier consumer gone before outcome was read");
            }
            tracing::trace!("identifier thread exiting cleanly");
        });

        Self {
            tx: Some(tx),
            rx,
            outcome: None,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Queue a frame without blocking. Returns false if it was dropped.
    pub fn push(&self, frame: CanFrame) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.try_send(frame).is_ok())
    }

    /// Outcome, once the thread has concluded. Kept for later calls and for
    /// `finish`.
    pub fn try_result(&mut self) -> Option<Outcome> {
        if self.outcome.is_none() {
            self.outcome = self.rx.try_recv().ok();
        }
        self.outcome.clone()
    }

    /// Signal end of input and wait for the outcome.
    pub fn finish(mut self) -> Outcome {
        self.tx = None;
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        self.rx.recv().unwrap_or(Err(VehidError::Source(
            "identifier thread exited without an outcome".into(),
        )))
    }
}

impl Drop for IdentifierThread {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.tx = None;

        // The thread exits at its next poll (at most `read_timeout_ms`).
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("identifier thread joined successfully"),
                Err(e) => tracing::warn!(?e, "identifier thread panicked during shutdown"),
            }
        }
    }
}
