//! Synchronizer: reconciles the local store with a sync target.
//!
//! A run has three phases:
//!
//! 1. push: upload local changes, resolving conflicts with the remote copy
//! 2. deletions: propagate tracked local deletions
//! 3. pull: apply remote changes reported by a [`RemoteChangeSource`]
//!
//! Only one run may be in progress per synchronizer. Cancellation is
//! cooperative and checked between items; the returned [`SyncContext`] lets
//! the next run resume the pull where this one stopped.

mod context;
mod deletions;
mod delta;
#[cfg(any(test, feature = "fault-injection"))]
pub mod faults;
mod pull;
mod push;
mod report;
mod session;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::db::{ItemRepository, SqliteItemRepository};
use crate::encryption::EncryptionService;
use crate::error::{Error, Result};
use crate::file_api::FileApi;
use crate::services::DatabaseService;
use crate::state::SyncState;
use crate::util::unix_ms_now;

pub use context::SyncContext;
pub use delta::{BasicDelta, NativeDelta, RemoteChangeSource};
pub use report::{ChannelListener, ProgressListener, ReportedError, SyncAction, SyncReport};

use session::Session;

#[cfg(any(test, feature = "fault-injection"))]
use faults::{FaultAction, FaultInjector, FaultPoint};

/// Options for one sync run.
#[derive(Default)]
pub struct SyncOptions {
    pub listener: Option<Arc<dyn ProgressListener>>,
    /// Context returned by the previous run
    pub context: SyncContext,
    /// Token the caller can use to cancel the run
    pub cancellation: Option<CancellationToken>,
}

impl SyncOptions {
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: SyncContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }
}

/// Result of a sync run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Context to persist and pass to the next run
    pub context: SyncContext,
    pub report: SyncReport,
    /// Items stored encrypted, waiting for the decryption worker
    pub items_to_decrypt: usize,
}

#[derive(Default)]
struct SessionSlot {
    state: SyncState,
    cancellation: Option<CancellationToken>,
}

/// Returns the synchronizer to idle however the run ends.
struct SessionGuard<'a> {
    slot: &'a Mutex<SessionSlot>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.state = SyncState::Idle;
        slot.cancellation = None;
    }
}

/// Synchronizes one local store with one sync target.
pub struct Synchronizer {
    db: DatabaseService,
    api: Arc<dyn FileApi>,
    encryption: Option<Arc<dyn EncryptionService>>,
    config: SyncConfig,
    slot: Mutex<SessionSlot>,
    #[cfg(any(test, feature = "fault-injection"))]
    faults: Option<Arc<dyn FaultInjector>>,
}

impl Synchronizer {
    pub fn new(db: DatabaseService, api: Arc<dyn FileApi>, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            db,
            api,
            encryption: None,
            config,
            slot: Mutex::new(SessionSlot::default()),
            #[cfg(any(test, feature = "fault-injection"))]
            faults: None,
        })
    }

    /// Encrypt outgoing items with `service` when it is enabled.
    #[must_use]
    pub fn with_encryption(mut self, service: Arc<dyn EncryptionService>) -> Self {
        self.encryption = Some(service);
        self
    }

    #[cfg(any(test, feature = "fault-injection"))]
    #[must_use]
    pub fn with_fault_injector(mut self, faults: Arc<dyn FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> SyncState {
        self.slot().state
    }

    /// Request cancellation of the running session.
    ///
    /// Does nothing when idle or when already cancelling.
    pub fn cancel(&self) {
        let slot = self.slot();
        if slot.state == SyncState::Idle {
            return;
        }
        if let Some(token) = &slot.cancellation {
            if !token.is_cancelled() {
                tracing::info!("Cancelling synchronisation");
                token.cancel();
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, cancellation: CancellationToken) -> Result<SessionGuard<'_>> {
        let mut slot = self.slot();
        if slot.state != SyncState::Idle {
            return Err(Error::AlreadyInProgress);
        }
        slot.state = SyncState::InProgress;
        slot.cancellation = Some(cancellation);
        Ok(SessionGuard { slot: &self.slot })
    }

    /// Run a full synchronisation.
    ///
    /// Fails only with [`Error::AlreadyInProgress`]. Every other error ends
    /// up in the report, and the returned context is always safe to persist.
    pub async fn start(&self, options: SyncOptions) -> Result<SyncOutcome> {
        let cancellation = options.cancellation.unwrap_or_default();
        let _guard = self.begin(cancellation.clone())?;

        let sync_target = self.config.sync_target;
        let run_id = unix_ms_now();
        let mut session = Session::new(options.listener, cancellation, sync_target);
        let mut context = options.context;

        tracing::info!("Starting synchronisation to target {sync_target} [{run_id}]");
        session.log_operation(
            SyncAction::Starting,
            &format!("Starting synchronisation to target {sync_target}... [{run_id}]"),
            None,
            None,
            None,
        );

        if let Err(error) = self.run(&mut session, &mut context).await {
            tracing::error!("Synchronisation failed: {error}");
            session.record_error(None, None, &error);
        }

        if session.is_cancelled() {
            tracing::info!("Synchronisation was cancelled.");
        }

        session.report.completed_time = Some(unix_ms_now());
        session.log_operation(
            SyncAction::Finished,
            &format!("Synchronisation finished [{run_id}]"),
            None,
            None,
            None,
        );

        let items_to_decrypt = match self
            .db
            .with_connection(|conn| SqliteItemRepository::new(conn).encrypted_count())
            .await
        {
            Ok(count) => count,
            Err(error) => {
                session.record_error(None, None, &error);
                0
            }
        };

        self.log_summary(&session.report, items_to_decrypt);

        session.report.state = SyncState::Idle;
        session.notify();

        Ok(SyncOutcome {
            context,
            report: session.report,
            items_to_decrypt,
        })
    }

    async fn run(&self, session: &mut Session, context: &mut SyncContext) -> Result<()> {
        self.push(session).await?;
        self.delete_remote_items(session).await?;
        self.pull(session, context).await
    }

    fn log_summary(&self, report: &SyncReport, items_to_decrypt: usize) {
        tracing::info!(
            create_local = report.create_local,
            update_local = report.update_local,
            create_remote = report.create_remote,
            update_remote = report.update_remote,
            delete_local = report.delete_local,
            delete_remote = report.delete_remote,
            note_conflict = report.note_conflict,
            item_conflict = report.item_conflict,
            items_to_decrypt,
            "Operations completed on target {}",
            self.config.sync_target
        );
        if !report.errors.is_empty() {
            tracing::warn!("There were {} sync errors:", report.errors.len());
            for error in &report.errors {
                tracing::warn!("{error}");
            }
        }
    }

    fn encryption(&self) -> Option<&dyn EncryptionService> {
        self.encryption.as_deref()
    }

    /// Consult the fault injector at `point`.
    #[cfg(any(test, feature = "fault-injection"))]
    fn inject(&self, session: &Session, point: FaultPoint, path: &str) -> Result<()> {
        let Some(faults) = &self.faults else {
            return Ok(());
        };
        match faults.check(point, path) {
            FaultAction::Proceed => Ok(()),
            FaultAction::Cancel => {
                session.cancel();
                Ok(())
            }
            FaultAction::Fail if point == FaultPoint::RejectItemPush => Err(Error::CannotSync(
                format!("injected rejection of {path}"),
            )),
            FaultAction::Fail => Err(Error::Storage(format!(
                "injected failure at {point:?} for {path}"
            ))),
        }
    }

    /// Whether the dirty page just processed must be handed out again.
    #[cfg(any(test, feature = "fault-injection"))]
    fn replay_dirty_page(&self) -> bool {
        self.faults.as_ref().is_some_and(|faults| {
            faults.check(FaultPoint::ReplayDirtyPage, "") == FaultAction::Fail
        })
    }
}

/// Fault points compile away outside tests.
#[cfg(not(any(test, feature = "fault-injection")))]
#[derive(Debug, Clone, Copy)]
enum FaultPoint {
    BeforeRemotePut,
    BeforeMarkSynced,
    RejectItemPush,
    DeltaItem,
    DeleteRemote,
}

#[cfg(not(any(test, feature = "fault-injection")))]
impl Synchronizer {
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    #[inline]
    const fn inject(&self, _session: &Session, _point: FaultPoint, _path: &str) -> Result<()> {
        Ok(())
    }

    #[allow(clippy::unused_self)]
    #[inline]
    const fn replay_dirty_page(&self) -> bool {
        false
    }
}
