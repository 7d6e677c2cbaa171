//! Progress reporting.

use std::fmt;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::Error;
use crate::models::ItemId;
use crate::state::SyncState;
use crate::util::compact_text;

/// Operations logged during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncAction {
    Starting,
    CreateRemote,
    UpdateRemote,
    DeleteRemote,
    NoteConflict,
    ItemConflict,
    CreateLocal,
    UpdateLocal,
    DeleteLocal,
    Cancelling,
    Finished,
}

impl SyncAction {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::CreateRemote => "createRemote",
            Self::UpdateRemote => "updateRemote",
            Self::DeleteRemote => "deleteRemote",
            Self::NoteConflict => "noteConflict",
            Self::ItemConflict => "itemConflict",
            Self::CreateLocal => "createLocal",
            Self::UpdateLocal => "updateLocal",
            Self::DeleteLocal => "deleteLocal",
            Self::Cancelling => "cancelling",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An error recorded during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub item_id: Option<ItemId>,
    pub path: Option<String>,
    pub message: String,
}

impl ReportedError {
    pub fn new(item_id: Option<ItemId>, path: Option<&str>, error: &Error) -> Self {
        Self {
            item_id,
            path: path.map(str::to_string),
            message: compact_text(&error.to_string()),
        }
    }
}

impl fmt::Display for ReportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, &self.item_id) {
            (Some(path), _) => write!(f, "{path}: {}", self.message),
            (None, Some(id)) => write!(f, "{id}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Counters and status of a sync session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub create_local: usize,
    pub update_local: usize,
    pub create_remote: usize,
    pub update_remote: usize,
    pub delete_local: usize,
    pub delete_remote: usize,
    pub note_conflict: usize,
    pub item_conflict: usize,
    pub state: SyncState,
    pub cancelling: bool,
    pub started_time: i64,
    pub completed_time: Option<i64>,
    pub errors: Vec<ReportedError>,
}

impl SyncReport {
    pub(crate) fn record(&mut self, action: SyncAction) {
        let counter = match action {
            SyncAction::CreateLocal => &mut self.create_local,
            SyncAction::UpdateLocal => &mut self.update_local,
            SyncAction::CreateRemote => &mut self.create_remote,
            SyncAction::UpdateRemote => &mut self.update_remote,
            SyncAction::DeleteLocal => &mut self.delete_local,
            SyncAction::DeleteRemote => &mut self.delete_remote,
            SyncAction::NoteConflict => &mut self.note_conflict,
            SyncAction::ItemConflict => &mut self.item_conflict,
            SyncAction::Starting | SyncAction::Cancelling | SyncAction::Finished => return,
        };
        *counter += 1;
    }

    /// Whether any item was created, updated, deleted or conflicted.
    pub const fn has_changes(&self) -> bool {
        self.create_local
            + self.update_local
            + self.create_remote
            + self.update_remote
            + self.delete_local
            + self.delete_remote
            + self.note_conflict
            + self.item_conflict
            > 0
    }

    /// Human readable summary.
    pub fn to_lines(&self) -> Vec<String> {
        let counters = [
            ("Created local items", self.create_local),
            ("Updated local items", self.update_local),
            ("Created remote items", self.create_remote),
            ("Updated remote items", self.update_remote),
            ("Deleted local items", self.delete_local),
            ("Deleted remote items", self.delete_remote),
            ("Note conflicts", self.note_conflict),
            ("Item conflicts", self.item_conflict),
        ];
        let mut lines: Vec<String> = counters
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(label, count)| format!("{label}: {count}."))
            .collect();

        if !self.errors.is_empty() {
            lines.push(format!("Errors: {}.", self.errors.len()));
        }
        match self.completed_time {
            Some(completed) => {
                let completed = Local
                    .timestamp_millis_opt(completed)
                    .single()
                    .map_or_else(|| completed.to_string(), |time| {
                        time.format("%Y-%m-%d %H:%M:%S").to_string()
                    });
                lines.push(format!("Completed: {completed}"));
            }
            None => {
                let state = serde_json::to_value(self.state)
                    .ok()
                    .and_then(|value| value.as_str().map(str::to_string))
                    .unwrap_or_default();
                lines.push(format!("State: \"{state}\"."));
                if self.cancelling {
                    lines.push("Cancelling...".to_string());
                }
            }
        }
        lines
    }
}

/// Receives a snapshot of the report after every logged operation.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, report: &SyncReport);
}

impl<F> ProgressListener for F
where
    F: Fn(&SyncReport) + Send + Sync,
{
    fn on_progress(&self, report: &SyncReport) {
        self(report);
    }
}

/// Forwards reports to a channel; a closed receiver is ignored.
pub struct ChannelListener(UnboundedSender<SyncReport>);

impl ChannelListener {
    pub const fn new(sender: UnboundedSender<SyncReport>) -> Self {
        Self(sender)
    }
}

impl From<UnboundedSender<SyncReport>> for ChannelListener {
    fn from(sender: UnboundedSender<SyncReport>) -> Self {
        Self(sender)
    }
}

impl ProgressListener for ChannelListener {
    fn on_progress(&self, report: &SyncReport) {
        let _ = self.0.send(report.clone());
    }
}
