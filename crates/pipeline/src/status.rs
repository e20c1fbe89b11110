//! Live run status
//!
//! The orchestrator publishes an immutable, versioned [`RunSnapshot`] on every
//! state transition. Readers either poll [`StatusBoard::latest`] or
//! subscribe to a channel that receives each new snapshot.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Loaded,
    Detecting,
    Running,
    Assembling,
    Reported,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Gridding,
    Interpolating,
    Encoding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveJob {
    pub key: String,
    pub phase: JobPhase,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSnapshot {
    /// Incremented on every publish
    pub version: u64,
    pub phase: RunPhase,
    pub jobs_total: usize,
    pub jobs_done: usize,
    pub jobs_failed: usize,
    /// In-flight jobs, by key
    pub active: Vec<ActiveJob>,
}

#[derive(Debug, Default)]
struct Board {
    current: Arc<RunSnapshot>,
    subscribers: Vec<Sender<Arc<RunSnapshot>>>,
}

/// Publisher of run snapshots, shared between the orchestrator and workers
#[derive(Debug, Default)]
pub struct StatusBoard {
    board: Mutex<Board>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent snapshot
    pub fn latest(&self) -> Arc<RunSnapshot> {
        Arc::clone(&self.board.lock().unwrap_or_else(PoisonError::into_inner).current)
    }

    /// Channel of snapshots, starting with the current one
    pub fn subscribe(&self) -> Receiver<Arc<RunSnapshot>> {
        let (tx, rx) = unbounded();
        let mut board = self.board.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = tx.send(Arc::clone(&board.current));
        board.subscribers.push(tx);
        rx
    }

    /// Derive the next snapshot from the current one and publish it
    pub fn update<F: FnOnce(&mut RunSnapshot)>(&self, change: F) -> Arc<RunSnapshot> {
        let mut board = self.board.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = (*board.current).clone();
        change(&mut next);
        next.version = board.current.version + 1;

        let next = Arc::new(next);
        board.current = Arc::clone(&next);
        // Dropped receivers fall off the list
        board
            .subscribers
            .retain(|tx| tx.send(Arc::clone(&next)).is_ok());
        next
    }

    pub fn set_phase(&self, phase: RunPhase) {
        self.update(|s| s.phase = phase);
    }

    pub fn job_phase(&self, key: &str, phase: JobPhase) {
        self.update(|s| match s.active.iter_mut().find(|a| a.key == key) {
            Some(active) => active.phase = phase,
            None => s.active.push(ActiveJob {
                key: key.to_string(),
                phase,
            }),
        });
    }

    pub fn job_finished(&self, key: &str, failed: bool) {
        self.update(|s| {
            s.active.retain(|a| a.key != key);
            s.jobs_done += 1;
            if failed {
                s.jobs_failed += 1;
            }
        });
    }
}
