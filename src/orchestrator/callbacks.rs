// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lifecycle callbacks for hosts that render sync progress.
//!
//! Callbacks run on the cycle's task, so they must be quick and must not
//! block. A panicking callback is treated like any other panic in the cycle.

use super::types::SyncCycleReport;
use std::sync::Arc;

type StartedFn = Arc<dyn Fn() + Send + Sync>;
type FinishedFn = Arc<dyn Fn(&SyncCycleReport) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&str) + Send + Sync>;
type ProgressFn = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// Optional hooks fired during a cycle.
///
/// ```rust
/// use sync_reconciler::orchestrator::SyncCallbacks;
///
/// let callbacks = SyncCallbacks::new()
///     .on_progress(|message, percent| println!("{percent:>3}% {message}"))
///     .on_error(|message| eprintln!("sync failed: {message}"));
/// ```
#[derive(Clone, Default)]
pub struct SyncCallbacks {
    started: Option<StartedFn>,
    finished: Option<FinishedFn>,
    error: Option<ErrorFn>,
    progress: Option<ProgressFn>,
}

impl SyncCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_started(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.started = Some(Arc::new(f));
        self
    }

    pub fn on_finished(mut self, f: impl Fn(&SyncCycleReport) + Send + Sync + 'static) -> Self {
        self.finished = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }

    /// `percent` runs from 0 to 100.
    pub fn on_progress(mut self, f: impl Fn(&str, u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    pub(crate) fn started(&self) {
        if let Some(f) = &self.started {
            f();
        }
    }

    pub(crate) fn finished(&self, report: &SyncCycleReport) {
        if let Some(f) = &self.finished {
            f(report);
        }
    }

    pub(crate) fn error(&self, message: &str) {
        if let Some(f) = &self.error {
            f(message);
        }
    }

    pub(crate) fn progress(&self, message: &str, percent: u8) {
        if let Some(f) = &self.progress {
            f(message, percent);
        }
    }
}

impl std::fmt::Debug for SyncCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCallbacks")
            .field("started", &self.started.is_some())
            .field("finished", &self.finished.is_some())
            .field("error", &self.error.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
