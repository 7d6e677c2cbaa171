//! Per-run bookkeeping shared by the sync phases.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::models::{Item, ItemId, ItemType};
use crate::state::SyncState;
use crate::util::unix_ms_now;

use super::report::{ProgressListener, ReportedError, SyncAction, SyncReport};

/// State owned by one in-flight `start()` call.
pub(crate) struct Session {
    pub(crate) report: SyncReport,
    listener: Option<Arc<dyn ProgressListener>>,
    cancellation: CancellationToken,
    pub(crate) sync_target: u32,
}

impl Session {
    pub(crate) fn new(
        listener: Option<Arc<dyn ProgressListener>>,
        cancellation: CancellationToken,
        sync_target: u32,
    ) -> Self {
        Self {
            report: SyncReport {
                state: SyncState::InProgress,
                started_time: unix_ms_now(),
                ..SyncReport::default()
            },
            listener,
            cancellation,
            sync_target,
        }
    }

    /// Poll for cancellation. The first positive poll is logged.
    pub(crate) fn is_cancelled(&mut self) -> bool {
        if !self.cancellation.is_cancelled() {
            return false;
        }
        if !self.report.cancelling {
            self.report.cancelling = true;
            self.log_operation(SyncAction::Cancelling, "", None, None, None);
        }
        true
    }

    #[cfg_attr(not(any(test, feature = "fault-injection")), allow(dead_code))]
    pub(crate) fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Log an operation, count it and notify the listener.
    pub(crate) fn log_operation(
        &mut self,
        action: SyncAction,
        reason: &str,
        item_type: Option<ItemType>,
        local: Option<&Item>,
        remote_path: Option<&str>,
    ) {
        let mut line = vec!["Sync".to_string(), action.name().to_string()];
        if !reason.is_empty() {
            line.push(reason.to_string());
        }
        if let Some(item_type) = item_type.or_else(|| local.map(Item::item_type)) {
            line.push(item_type.name().to_string());
        }
        if let Some(local) = local {
            line.push(format!("(Local {}, \"{}\")", local.id(), local.title()));
        }
        if let Some(path) = remote_path {
            line.push(format!("(Remote {path})"));
        }
        tracing::debug!("{}", line.join(": "));

        self.report.record(action);
        self.notify();
    }

    pub(crate) fn record_error(&mut self, item_id: Option<ItemId>, path: Option<&str>, error: &Error) {
        match path {
            Some(path) => tracing::warn!("Sync error on {path}: {error}"),
            None => tracing::warn!("Sync error: {error}"),
        }
        self.report
            .errors
            .push(ReportedError::new(item_id, path, error));
    }

    pub(crate) fn notify(&self) {
        if let Some(listener) = &self.listener {
            listener.on_progress(&self.report);
        }
    }
}
