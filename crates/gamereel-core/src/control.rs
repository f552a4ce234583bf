//! Queue-level cancellation and the control-socket line protocol.
//!
//! Cancelling a job stops the dispatcher from admitting any more of its
//! angles; angles already running finish on their own. The registry is shared
//! between the scheduler and whoever issues cancels (the façade, or the
//! control socket while `gamereel run` is active).

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    Job(String),
    All,
}

impl fmt::Display for CancelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelTarget::Job(id) => write!(f, "cancel {}", id),
            CancelTarget::All => write!(f, "cancel all"),
        }
    }
}

impl CancelTarget {
    /// Parse one control-socket line: `cancel <game_id>` or `cancel all`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        if parts.next()? != "cancel" {
            return None;
        }
        let target = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(if target == "all" {
            CancelTarget::All
        } else {
            CancelTarget::Job(target.to_string())
        })
    }
}

#[derive(Debug, Default)]
pub struct CancelRegistry {
    all: AtomicBool,
    jobs: RwLock<HashSet<String>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, target: &CancelTarget) {
        match target {
            CancelTarget::All => self.all.store(true, Ordering::SeqCst),
            CancelTarget::Job(id) => {
                self.jobs
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id.clone());
            }
        }
        tracing::info!(%target, "cancel requested");
    }

    pub fn is_cancelled(&self, game_id: &str) -> bool {
        self.all.load(Ordering::SeqCst)
            || self
                .jobs
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(game_id)
    }

    /// Clear all requests; called when a run finishes.
    pub fn reset(&self) {
        self.all.store(false, Ordering::SeqCst);
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// `~/.local/state/gamereel/control.sock`.
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("gamereel")?.get_state_home();
    Ok(dir.join("control.sock"))
}
