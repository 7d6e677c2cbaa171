//! Fault injection hooks.
//!
//! Compiled only for tests and with the `fault-injection` feature. The
//! synchronizer consults the injector at fixed points so tests can force a
//! failure or a cancellation at an exact step.

use std::sync::Mutex;

/// Steps at which a fault can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Before uploading an item's metadata
    BeforeRemotePut,
    /// After the remote write, before `sync_time` is recorded
    BeforeMarkSynced,
    /// The target refuses the item permanently
    RejectItemPush,
    /// The dirty-item page is handed out again instead of advancing
    ReplayDirtyPage,
    /// Before applying one remote change locally
    DeltaItem,
    /// Before deleting a remote item from the ledger
    DeleteRemote,
}

/// What to do when a fault point is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    Proceed,
    Fail,
    Cancel,
}

/// Strategy consulted by the synchronizer at every [`FaultPoint`].
pub trait FaultInjector: Send + Sync {
    fn check(&self, point: FaultPoint, path: &str) -> FaultAction;
}

#[derive(Debug)]
struct Rule {
    point: FaultPoint,
    path: Option<String>,
    action: FaultAction,
    skip: usize,
    remaining: usize,
}

/// Fires preconfigured actions at matching fault points.
#[derive(Debug, Default)]
pub struct ScriptedFaults {
    rules: Mutex<Vec<Rule>>,
}

impl ScriptedFaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `action` the next `times` times `point` is reached.
    #[must_use]
    pub fn on(self, point: FaultPoint, action: FaultAction, times: usize) -> Self {
        self.push(Rule {
            point,
            path: None,
            action,
            skip: 0,
            remaining: times,
        })
    }

    /// Fire `action` once, after `point` has been passed `skip` times.
    #[must_use]
    pub fn on_nth(self, point: FaultPoint, action: FaultAction, skip: usize) -> Self {
        self.push(Rule {
            point,
            path: None,
            action,
            skip,
            remaining: 1,
        })
    }

    /// Fire `action` every time `point` is reached for `path`.
    #[must_use]
    pub fn on_path(self, point: FaultPoint, path: impl Into<String>, action: FaultAction) -> Self {
        self.push(Rule {
            point,
            path: Some(path.into()),
            action,
            skip: 0,
            remaining: usize::MAX,
        })
    }

    /// Stop firing every rule.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(self, rule: Rule) -> Self {
        self.lock().push(rule);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Rule>> {
        self.rules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl FaultInjector for ScriptedFaults {
    fn check(&self, point: FaultPoint, path: &str) -> FaultAction {
        let mut rules = self.lock();
        for rule in rules.iter_mut() {
            if rule.point != point || rule.remaining == 0 {
                continue;
            }
            if rule.path.as_deref().is_some_and(|expected| expected != path) {
                continue;
            }
            if rule.skip > 0 {
                rule.skip -= 1;
                continue;
            }
            rule.remaining -= 1;
            return rule.action;
        }
        FaultAction::Proceed
    }
}
