//! End-to-end synchronizer scenarios against the in-memory File API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use super::faults::{FaultAction, FaultPoint, ScriptedFaults};
use super::*;
use crate::db::{ItemRepository, SqliteItemRepository};
use crate::encryption::testing::XorEncryption;
use crate::encryption::DecryptionWorker;
use crate::file_api::{
    resource_path, system_path, DeltaPage, FileApi, MemoryFileApi, RemoteStat, SYNC_DIR,
};
use crate::models::{Folder, Item, ItemId, ItemType, Note, Resource};

/// One replica: a local store and its synchronizer.
struct Client {
    db: DatabaseService,
    synchronizer: Synchronizer,
    context: SyncContext,
}

impl Client {
    fn new(api: &Arc<MemoryFileApi>) -> Self {
        Self::build(api, SyncConfig::default(), |synchronizer| synchronizer)
    }

    fn with_faults(api: &Arc<MemoryFileApi>, faults: &Arc<ScriptedFaults>) -> Self {
        let faults = faults.clone();
        Self::build(api, SyncConfig::default(), move |synchronizer| {
            synchronizer.with_fault_injector(faults)
        })
    }

    fn build(
        api: &Arc<MemoryFileApi>,
        config: SyncConfig,
        configure: impl FnOnce(Synchronizer) -> Synchronizer,
    ) -> Self {
        init_tracing();
        let db = DatabaseService::open_in_memory().unwrap();
        let synchronizer = Synchronizer::new(db.clone(), api.clone(), config).unwrap();
        Self {
            db,
            synchronizer: configure(synchronizer),
            context: SyncContext::default(),
        }
    }

    async fn sync(&mut self) -> SyncOutcome {
        self.sync_with(SyncOptions::default()).await
    }

    async fn sync_with(&mut self, options: SyncOptions) -> SyncOutcome {
        let outcome = self
            .synchronizer
            .start(options.with_context(self.context.clone()))
            .await
            .unwrap();
        self.context = outcome.context.clone();
        outcome
    }

    async fn notes(&self) -> Vec<Note> {
        self.db
            .list_items(ItemType::Note)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|item| match item {
                Item::Note(note) => Some(note),
                _ => None,
            })
            .collect()
    }

    async fn note(&self, id: &ItemId) -> Option<Note> {
        match self.db.load_item(id).await.unwrap() {
            Some(Item::Note(note)) => Some(note),
            _ => None,
        }
    }

    async fn folder(&self, id: &ItemId) -> Option<Folder> {
        match self.db.load_item(id).await.unwrap() {
            Some(Item::Folder(folder)) => Some(folder),
            _ => None,
        }
    }

    async fn edit_note(&self, id: &ItemId, body: &str) {
        let mut note = self.note(id).await.unwrap();
        note.body = body.to_string();
        self.db.update_item(note.into()).await.unwrap();
    }

    async fn rename_folder(&self, id: &ItemId, title: &str) {
        let mut folder = self.folder(id).await.unwrap();
        folder.title = title.to_string();
        self.db.update_item(folder.into()).await.unwrap();
    }
}

/// A memory target whose first `stat` calls fail, as a flaky network would.
struct FlakyStat {
    inner: Arc<MemoryFileApi>,
    failures: AtomicUsize,
}

impl FlakyStat {
    fn new(inner: Arc<MemoryFileApi>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl FileApi for FlakyStat {
    async fn mkdir(&self, path: &str) -> crate::Result<()> {
        self.inner.mkdir(path).await
    }

    async fn stat(&self, path: &str) -> crate::Result<Option<RemoteStat>> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Storage(format!("connection reset while reading {path}")));
        }
        self.inner.stat(path).await
    }

    async fn get(&self, path: &str) -> crate::Result<Option<Vec<u8>>> {
        self.inner.get(path).await
    }

    async fn put(&self, path: &str, content: &[u8]) -> crate::Result<()> {
        self.inner.put(path, content).await
    }

    async fn delete(&self, path: &str) -> crate::Result<()> {
        self.inner.delete(path).await
    }

    async fn set_timestamp(&self, path: &str, timestamp_ms: i64) -> crate::Result<()> {
        self.inner.set_timestamp(path, timestamp_ms).await
    }

    async fn move_item(&self, old_path: &str, new_path: &str) -> crate::Result<()> {
        self.inner.move_item(old_path, new_path).await
    }

    async fn list(&self, path: &str) -> crate::Result<Vec<RemoteStat>> {
        self.inner.list(path).await
    }

    async fn delta(
        &self,
        path: &str,
        context: Option<&serde_json::Value>,
    ) -> crate::Result<DeltaPage> {
        self.inner.delta(path, context).await
    }

    fn supports_delta(&self) -> bool {
        self.inner.supports_delta()
    }
}

/// Every local item, ordered by type then id.
async fn local_items(client: &Client) -> Vec<Item> {
    let mut items = Vec::new();
    for item_type in ItemType::SYNC_ORDER {
        items.extend(client.db.list_items(item_type).await.unwrap());
    }
    items
}

fn small_pages(basic_delta_page_size: usize) -> SyncConfig {
    SyncConfig {
        basic_delta_page_size,
        ..SyncConfig::default()
    }
}

/// Leave room between runs so edits get a later millisecond than sync times.
async fn pause() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn remote_paths(api: &MemoryFileApi) -> Vec<String> {
    let mut paths: Vec<String> = api
        .list(SYNC_DIR)
        .await
        .unwrap()
        .into_iter()
        .map(|stat| stat.path)
        .collect();
    paths.sort();
    paths
}

/// Sync logs show up with `RUST_LOG=quill_core=debug cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn memory_api() -> Arc<MemoryFileApi> {
    Arc::new(MemoryFileApi::new())
}

#[tokio::test]
async fn test_first_sync_uploads_and_second_sync_is_a_no_op() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let folder = a.db.create_folder("Inbox").await.unwrap();
    let note = a.db.create_note(Some(folder.id), "un", "deux").await.unwrap();

    let outcome = a.sync().await;
    assert_eq!(outcome.report.create_remote, 2);
    assert!(outcome.report.errors.is_empty());
    assert_eq!(outcome.report.state, SyncState::Idle);
    assert!(outcome.report.completed_time.is_some());

    let mut expected = vec![format!("{}.md", folder.id), format!("{}.md", note.id)];
    expected.sort();
    assert_eq!(remote_paths(&api).await, expected);

    let again = a.sync().await;
    assert!(!again.report.has_changes());
    assert!(again.report.errors.is_empty());
    assert_eq!(a.synchronizer.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_round_trip_between_replicas() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let mut b = Client::new(&api);
    let folder = a.db.create_folder("Inbox").await.unwrap();
    let note = a.db.create_note(Some(folder.id), "un", "deux").await.unwrap();
    a.sync().await;

    let pulled = b.sync().await;
    assert_eq!(pulled.report.create_local, 2);
    assert_eq!(b.note(&note.id).await, Some(note.clone()));

    pause().await;
    b.edit_note(&note.id, "trois").await;
    let pushed = b.sync().await;
    assert_eq!(pushed.report.update_remote, 1);

    let updated = a.sync().await;
    assert_eq!(updated.report.update_local, 1);
    assert_eq!(a.note(&note.id).await.unwrap().body, "trois");

    assert!(!a.sync().await.report.has_changes());
    assert!(!b.sync().await.report.has_changes());
}

#[tokio::test]
async fn test_concurrent_note_edits_create_conflict_copy() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let mut b = Client::new(&api);
    let note = a.db.create_note(None, "shared", "original").await.unwrap();
    a.sync().await;
    b.sync().await;

    pause().await;
    a.edit_note(&note.id, "edited on a").await;
    a.sync().await;

    pause().await;
    b.edit_note(&note.id, "edited on b").await;
    let outcome = b.sync().await;
    assert_eq!(outcome.report.note_conflict, 1);

    let notes = b.notes().await;
    assert_eq!(notes.len(), 2);
    let canonical = notes.iter().find(|n| n.id == note.id).unwrap();
    assert_eq!(canonical.body, "edited on a");
    assert!(!canonical.is_conflict);
    let copy = notes.iter().find(|n| n.id != note.id).unwrap();
    assert_eq!(copy.body, "edited on b");
    assert!(copy.is_conflict);

    // The conflict copy stays local.
    assert!(!b.sync().await.report.has_changes());
    assert_eq!(remote_paths(&api).await.len(), 1);
    assert_eq!(a.notes().await.len(), 1);
}

#[tokio::test]
async fn test_identical_concurrent_edits_need_no_copy() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let mut b = Client::new(&api);
    let note = a.db.create_note(None, "shared", "original").await.unwrap();
    a.sync().await;
    b.sync().await;

    pause().await;
    a.edit_note(&note.id, "same").await;
    a.sync().await;
    pause().await;
    b.edit_note(&note.id, "same").await;

    let outcome = b.sync().await;
    assert_eq!(outcome.report.note_conflict, 1);
    assert_eq!(b.notes().await.len(), 1);
}

#[tokio::test]
async fn test_local_changes_to_remotely_deleted_note_are_kept_as_conflict() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let mut b = Client::new(&api);
    let note = a.db.create_note(None, "doomed", "v1").await.unwrap();
    a.sync().await;
    b.sync().await;

    b.db.delete_item(&note.id).await.unwrap();
    assert_eq!(b.sync().await.report.delete_remote, 1);

    pause().await;
    a.edit_note(&note.id, "v2").await;
    let outcome = a.sync().await;
    assert_eq!(outcome.report.note_conflict, 1);

    let notes = a.notes().await;
    assert_eq!(notes.len(), 1);
    assert!(notes[0].is_conflict);
    assert_eq!(notes[0].body, "v2");
    assert!(a.db.deleted_items(1).await.unwrap().is_empty());
    assert!(remote_paths(&api).await.is_empty());
}

#[tokio::test]
async fn test_non_note_conflict_is_won_by_remote() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let mut b = Client::new(&api);
    let folder = a.db.create_folder("Projects").await.unwrap();
    a.sync().await;
    b.sync().await;

    pause().await;
    a.rename_folder(&folder.id, "Work").await;
    a.sync().await;
    pause().await;
    b.rename_folder(&folder.id, "Personal").await;

    let outcome = b.sync().await;
    assert_eq!(outcome.report.item_conflict, 1);
    assert_eq!(b.folder(&folder.id).await.unwrap().title, "Work");
    assert_eq!(b.db.list_items(ItemType::Folder).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_local_deletion_reaches_other_replica() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let mut b = Client::new(&api);
    let note = a.db.create_note(None, "short lived", "").await.unwrap();
    a.sync().await;
    b.sync().await;

    a.db.delete_item(&note.id).await.unwrap();
    assert_eq!(a.db.deleted_items(1).await.unwrap().len(), 1);

    let outcome = a.sync().await;
    assert_eq!(outcome.report.delete_remote, 1);
    assert!(a.db.deleted_items(1).await.unwrap().is_empty());
    assert!(remote_paths(&api).await.is_empty());

    let outcome = b.sync().await;
    assert_eq!(outcome.report.delete_local, 1);
    assert!(b.notes().await.is_empty());
    assert!(b.db.deleted_items(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_remote_delete_keeps_ledger_and_blocks_restore() {
    let api = memory_api();
    let note = Note::new(None, "to delete", "v1");
    let path = system_path(&note.id);
    let faults = Arc::new(ScriptedFaults::new().on_path(
        FaultPoint::DeleteRemote,
        path.clone(),
        FaultAction::Fail,
    ));
    let mut a = Client::with_faults(&api, &faults);
    let mut b = Client::new(&api);
    a.db.save_item(&note.clone().into()).await.unwrap();
    a.sync().await;
    b.sync().await;

    // A remote change to the note shows up in a's next pull.
    pause().await;
    b.edit_note(&note.id, "v2").await;
    b.sync().await;

    a.db.delete_item(&note.id).await.unwrap();

    let outcome = a.sync().await;
    assert_eq!(outcome.report.errors.len(), 1);
    assert_eq!(outcome.report.errors[0].path.as_deref(), Some(path.as_str()));
    assert_eq!(outcome.report.create_local, 0);
    assert!(a.notes().await.is_empty());
    assert_eq!(a.db.deleted_items(1).await.unwrap().len(), 1);
    assert_eq!(remote_paths(&api).await.len(), 1);

    faults.clear();
    let outcome = a.sync().await;
    assert_eq!(outcome.report.delete_remote, 1);
    assert!(outcome.report.errors.is_empty());
    assert!(a.db.deleted_items(1).await.unwrap().is_empty());
    assert!(remote_paths(&api).await.is_empty());
    assert!(a.notes().await.is_empty());
}

#[tokio::test]
async fn test_remotely_deleted_folder_with_notes_is_kept() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let mut b = Client::new(&api);
    let kept = a.db.create_folder("Full").await.unwrap();
    let note = a.db.create_note(Some(kept.id), "inside", "").await.unwrap();
    let empty = a.db.create_folder("Empty").await.unwrap();
    a.sync().await;
    b.sync().await;

    // Delete only the folders on b, leaving the note behind.
    b.db.with_connection(|conn| {
        let items = SqliteItemRepository::new(conn);
        items.delete(ItemType::Folder, &kept.id, true)?;
        items.delete(ItemType::Folder, &empty.id, true)
    })
    .await
    .unwrap();
    assert_eq!(b.sync().await.report.delete_remote, 2);

    let outcome = a.sync().await;
    assert_eq!(outcome.report.delete_local, 2);
    assert!(outcome.report.errors.is_empty());
    assert!(a.folder(&empty.id).await.is_none());
    assert!(a.folder(&kept.id).await.is_some());
    let note = a.note(&note.id).await.unwrap();
    assert!(note.is_conflict);
    assert_eq!(note.parent_id, Some(kept.id));

    assert!(!a.sync().await.report.has_changes());
}

#[tokio::test]
async fn test_cancelled_pull_resumes_from_returned_context() {
    let api = Arc::new(MemoryFileApi::new().with_delta_page_size(2));
    let mut a = Client::new(&api);
    for index in 0..5 {
        a.db.create_note(None, &format!("note {index}"), "").await.unwrap();
    }
    a.sync().await;

    let faults = Arc::new(ScriptedFaults::new().on_nth(FaultPoint::DeltaItem, FaultAction::Cancel, 3));
    let mut b = Client::with_faults(&api, &faults);

    let cancelled = b.sync().await;
    assert!(cancelled.report.cancelling);
    assert_eq!(cancelled.report.create_local, 3);
    assert!(cancelled.context.delta.is_some());
    assert_eq!(b.synchronizer.state(), SyncState::Idle);

    let resumed = b.sync().await;
    assert!(!resumed.report.cancelling);
    assert_eq!(resumed.report.create_local, 2);
    assert_eq!(b.notes().await.len(), 5);
}

#[tokio::test]
async fn test_cancelled_token_stops_before_any_work() {
    let api = memory_api();
    let mut a = Client::new(&api);
    a.db.create_note(None, "waiting", "").await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let outcome = a.sync_with(SyncOptions::default().with_cancellation(token)).await;
    assert!(outcome.report.cancelling);
    assert_eq!(outcome.report.create_remote, 0);
    assert!(remote_paths(&api).await.is_empty());

    let outcome = a.sync().await;
    assert_eq!(outcome.report.create_remote, 1);
}

#[tokio::test]
async fn test_start_is_rejected_while_in_progress() {
    let api = memory_api();
    let a = Client::new(&api);

    // Idle cancel is a no-op.
    a.synchronizer.cancel();
    assert_eq!(a.synchronizer.state(), SyncState::Idle);

    let guard = a.synchronizer.begin(CancellationToken::new()).unwrap();
    assert_eq!(a.synchronizer.state(), SyncState::InProgress);
    let result = a.synchronizer.start(SyncOptions::default()).await;
    assert!(matches!(result, Err(Error::AlreadyInProgress)));

    drop(guard);
    assert_eq!(a.synchronizer.state(), SyncState::Idle);
    assert!(a.synchronizer.start(SyncOptions::default()).await.is_ok());
}

#[tokio::test]
async fn test_cancel_signals_running_session() {
    let api = memory_api();
    let a = Client::new(&api);
    let token = CancellationToken::new();
    let guard = a.synchronizer.begin(token.clone()).unwrap();

    a.synchronizer.cancel();
    a.synchronizer.cancel();
    assert!(token.is_cancelled());
    drop(guard);
}

#[tokio::test]
async fn test_refused_item_is_skipped_until_enabled() {
    let api = memory_api();
    let note = Note::new(None, "too big", "");
    let note_id = note.id;
    let faults = Arc::new(ScriptedFaults::new().on_path(
        FaultPoint::RejectItemPush,
        system_path(&note_id),
        FaultAction::Fail,
    ));
    let mut a = Client::with_faults(&api, &faults);
    a.db.save_item(&note.into()).await.unwrap();

    let outcome = a.sync().await;
    assert!(outcome.report.errors.is_empty());
    let disabled = a.db.sync_disabled_items(1).await.unwrap();
    assert_eq!(disabled.len(), 1);
    assert_eq!(disabled[0].item_id, note_id);
    assert!(remote_paths(&api).await.is_empty());

    faults.clear();
    let outcome = a.sync().await;
    assert_eq!(outcome.report.create_remote, 0);
    assert!(remote_paths(&api).await.is_empty());

    a.db.enable_sync(1, &note_id).await.unwrap();
    let outcome = a.sync().await;
    assert_eq!(outcome.report.create_remote, 1);
    assert!(a.db.sync_disabled_items(1).await.unwrap().is_empty());
    assert_eq!(remote_paths(&api).await, vec![format!("{note_id}.md")]);
}

#[tokio::test]
async fn test_wipe_out_fail_safe_protects_local_data() {
    let api = Arc::new(MemoryFileApi::new().without_delta());
    let mut a = Client::new(&api);
    a.db.create_note(None, "precious", "").await.unwrap();
    a.sync().await;

    for path in remote_paths(&api).await {
        api.delete(&format!("{SYNC_DIR}/{path}")).await.unwrap();
    }

    let outcome = a.sync().await;
    assert_eq!(outcome.report.errors.len(), 1);
    assert!(outcome.report.errors[0].message.starts_with("Fail-safe"));
    assert_eq!(outcome.report.delete_local, 0);
    assert_eq!(a.notes().await.len(), 1);

    let config = SyncConfig {
        wipe_out_fail_safe: false,
        ..SyncConfig::default()
    };
    let mut unsafe_client = Client {
        synchronizer: Synchronizer::new(a.db.clone(), api.clone(), config).unwrap(),
        db: a.db.clone(),
        context: a.context.clone(),
    };
    let outcome = unsafe_client.sync().await;
    assert_eq!(outcome.report.delete_local, 1);
    assert!(unsafe_client.notes().await.is_empty());
}

#[tokio::test]
async fn test_replayed_dirty_page_aborts_the_run() {
    let api = memory_api();
    let faults = Arc::new(ScriptedFaults::new().on(FaultPoint::ReplayDirtyPage, FaultAction::Fail, 1));
    let mut a = Client::with_faults(&api, &faults);
    a.db.create_note(None, "once", "").await.unwrap();

    let outcome = a.sync().await;
    assert_eq!(outcome.report.create_remote, 1);
    assert_eq!(outcome.report.errors.len(), 1);
    assert!(outcome.report.errors[0]
        .message
        .starts_with("Processing a path that has already been done"));
    assert_eq!(outcome.report.state, SyncState::Idle);
    assert_eq!(a.synchronizer.state(), SyncState::Idle);

    let outcome = a.sync().await;
    assert!(outcome.report.errors.is_empty());
    assert!(!outcome.report.has_changes());
}

#[tokio::test]
async fn test_failure_before_mark_synced_converges() {
    let api = memory_api();
    let faults = Arc::new(ScriptedFaults::new().on(FaultPoint::BeforeMarkSynced, FaultAction::Fail, 1));
    let mut a = Client::with_faults(&api, &faults);
    a.db.create_note(None, "half done", "body").await.unwrap();

    let outcome = a.sync().await;
    assert_eq!(outcome.report.errors.len(), 1);
    assert_eq!(remote_paths(&api).await.len(), 1);

    // The upload landed, so the retry sees the same content remotely.
    let outcome = a.sync().await;
    assert!(outcome.report.errors.is_empty());
    assert_eq!(a.notes().await.len(), 1);

    assert!(!a.sync().await.report.has_changes());
}

#[tokio::test]
async fn test_failed_put_is_retried_next_run() {
    let api = memory_api();
    let faults = Arc::new(ScriptedFaults::new().on(FaultPoint::BeforeRemotePut, FaultAction::Fail, 1));
    let mut a = Client::with_faults(&api, &faults);
    a.db.create_note(None, "first", "").await.unwrap();
    a.db.create_note(None, "second", "").await.unwrap();

    let outcome = a.sync().await;
    assert_eq!(outcome.report.errors.len(), 1);
    assert_eq!(remote_paths(&api).await.len(), 1);

    let outcome = a.sync().await;
    assert!(outcome.report.errors.is_empty());
    assert_eq!(outcome.report.create_remote, 1);
    assert_eq!(remote_paths(&api).await.len(), 2);
}

#[tokio::test]
async fn test_encrypted_items_are_unreadable_until_decrypted() {
    let api = memory_api();
    let service = Arc::new(XorEncryption::locked());
    let master_key = service.generate_master_key("123456");

    let mut a = Client::build(&api, SyncConfig::default(), {
        let service = service.clone();
        move |synchronizer| synchronizer.with_encryption(service)
    });
    a.db.save_item(&master_key.clone().into()).await.unwrap();
    let folder = a.db.create_folder("Secret").await.unwrap();
    let note = a
        .db
        .create_note(Some(folder.id), "un", "to be encrypted")
        .await
        .unwrap();
    a.sync().await;

    let remote = api.get(&system_path(&note.id)).await.unwrap().unwrap();
    let remote = String::from_utf8(remote).unwrap();
    assert!(!remote.contains("to be encrypted"));
    assert!(remote.contains("encryption_applied: 1"));

    let mut b = Client::new(&api);
    let outcome = b.sync().await;
    assert_eq!(outcome.report.create_local, 3);
    assert_eq!(outcome.items_to_decrypt, 2);
    let locked = b.note(&note.id).await.unwrap();
    assert!(locked.encryption_applied);
    assert_eq!(locked.title, "");

    let Some(Item::MasterKey(key)) = b.db.load_item(&master_key.id).await.unwrap() else {
        panic!("master key should have been pulled");
    };
    let receiver = Arc::new(XorEncryption::locked());
    assert!(receiver.load_master_key(&key, "wrong").is_err());
    receiver.load_master_key(&key, "123456").unwrap();

    let report = DecryptionWorker::new(b.db.clone(), receiver).run().await.unwrap();
    assert_eq!(report.decrypted, 2);
    let unlocked = b.note(&note.id).await.unwrap();
    assert_eq!(unlocked.title, "un");
    assert_eq!(unlocked.body, "to be encrypted");
    assert_eq!(unlocked.updated_time, note.updated_time);

    let outcome = b.sync().await;
    assert!(!outcome.report.has_changes());
    assert_eq!(outcome.items_to_decrypt, 0);
}

#[tokio::test]
async fn test_resource_blob_travels_with_metadata() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let mut b = Client::new(&api);
    let resource = Resource::new("photo.png", "image/png", 4).unwrap();
    a.db.save_item(&resource.clone().into()).await.unwrap();
    a.db.set_resource_blob(&resource.id, b"\x89PNG").await.unwrap();

    let outcome = a.sync().await;
    assert_eq!(outcome.report.create_remote, 1);
    assert_eq!(
        api.get(&resource_path(&resource.id)).await.unwrap(),
        Some(b"\x89PNG".to_vec())
    );

    b.sync().await;
    assert_eq!(
        b.db.resource_blob(&resource.id).await.unwrap(),
        Some(b"\x89PNG".to_vec())
    );

    a.db.delete_item(&resource.id).await.unwrap();
    a.sync().await;
    assert_eq!(api.get(&resource_path(&resource.id)).await.unwrap(), None);
}

#[tokio::test]
async fn test_resource_without_blob_is_reported() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let resource = Resource::new("missing.bin", "application/octet-stream", 1).unwrap();
    a.db.save_item(&resource.clone().into()).await.unwrap();
    a.db.create_note(None, "fine", "").await.unwrap();

    let outcome = a.sync().await;
    assert_eq!(outcome.report.errors.len(), 1);
    assert_eq!(outcome.report.errors[0].item_id, Some(resource.id));
    assert_eq!(remote_paths(&api).await.len(), 1);
}

#[tokio::test]
async fn test_listing_backend_round_trip() {
    let api = Arc::new(MemoryFileApi::new().without_delta());
    let mut a = Client::new(&api);
    let mut b = Client::new(&api);
    let note = a.db.create_note(None, "listed", "v1").await.unwrap();
    let other = a.db.create_note(None, "stays", "").await.unwrap();
    a.sync().await;

    assert_eq!(b.sync().await.report.create_local, 2);
    pause().await;
    b.edit_note(&note.id, "v2").await;
    b.sync().await;

    assert_eq!(a.sync().await.report.update_local, 1);
    assert_eq!(a.note(&note.id).await.unwrap().body, "v2");

    b.db.delete_item(&note.id).await.unwrap();
    b.sync().await;
    assert_eq!(a.sync().await.report.delete_local, 1);
    let remaining: Vec<ItemId> = a.notes().await.into_iter().map(|n| n.id).collect();
    assert_eq!(remaining, vec![other.id]);
    assert!(!a.sync().await.report.has_changes());
}

#[tokio::test]
async fn test_listener_sees_progress_and_final_report() {
    let api = memory_api();
    let mut a = Client::new(&api);
    a.db.create_note(None, "observed", "").await.unwrap();

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    let listener: Arc<dyn ProgressListener> = Arc::new(move |report: &SyncReport| {
        sink.lock().unwrap().push(report.clone());
    });
    a.sync_with(SyncOptions::default().with_listener(listener)).await;

    let reports = reports.lock().unwrap();
    assert!(reports.len() >= 3);
    assert_eq!(reports[0].state, SyncState::InProgress);
    assert!(reports.iter().any(|report| report.create_remote == 1));
    let last = reports.last().unwrap();
    assert_eq!(last.state, SyncState::Idle);
    assert!(last.completed_time.is_some());
}

#[tokio::test]
async fn test_cancelled_listing_pull_matches_uninterrupted_run() {
    let api = Arc::new(MemoryFileApi::new().without_delta());
    let mut a = Client::build(&api, small_pages(2), |synchronizer| synchronizer);
    let folder = a.db.create_folder("Projects").await.unwrap();
    for index in 0..4 {
        a.db.create_note(Some(folder.id), &format!("note {index}"), "body")
            .await
            .unwrap();
    }
    a.sync().await;

    let faults = Arc::new(ScriptedFaults::new().on_nth(FaultPoint::DeltaItem, FaultAction::Cancel, 3));
    let injected = faults.clone();
    let mut b = Client::build(&api, small_pages(2), move |synchronizer| {
        synchronizer.with_fault_injector(injected)
    });

    let cancelled = b.sync().await;
    assert!(cancelled.report.cancelling);
    assert_eq!(cancelled.report.create_local, 3);
    assert!(cancelled.context.delta.is_some());

    let resumed = b.sync().await;
    assert!(!resumed.report.cancelling);
    assert!(resumed.report.errors.is_empty());
    assert_eq!(resumed.report.create_local, 2);

    let mut c = Client::build(&api, small_pages(2), |synchronizer| synchronizer);
    assert_eq!(c.sync().await.report.create_local, 5);

    assert_eq!(local_items(&b).await, local_items(&c).await);
    assert!(!b.sync().await.report.has_changes());
}

#[tokio::test]
async fn test_refused_item_survives_listing_backend() {
    let api = Arc::new(MemoryFileApi::new().without_delta());
    let refused = Note::new(None, "too big", "keep me");
    let refused_id = refused.id;
    let faults = Arc::new(ScriptedFaults::new().on_path(
        FaultPoint::RejectItemPush,
        system_path(&refused_id),
        FaultAction::Fail,
    ));
    let mut a = Client::with_faults(&api, &faults);
    a.db.save_item(&refused.into()).await.unwrap();
    a.db.create_note(None, "accepted", "").await.unwrap();

    let outcome = a.sync().await;
    assert!(outcome.report.errors.is_empty());
    assert_eq!(outcome.report.create_remote, 1);
    assert_eq!(outcome.report.delete_local, 0);
    assert_eq!(a.note(&refused_id).await.unwrap().body, "keep me");

    let outcome = a.sync().await;
    assert_eq!(outcome.report.delete_local, 0);
    assert!(a.note(&refused_id).await.is_some());
    assert_eq!(a.db.sync_disabled_items(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreadable_remote_file_does_not_hide_later_changes() {
    let api = Arc::new(MemoryFileApi::new().without_delta());
    let mut a = Client::build(&api, small_pages(1), |synchronizer| synchronizer);
    a.db.create_note(None, "first", "").await.unwrap();
    a.db.create_note(None, "second", "").await.unwrap();
    a.sync().await;

    pause().await;
    api.put(&system_path(&ItemId::new()), b"not an item").await.unwrap();

    let mut b = Client::build(&api, small_pages(1), |synchronizer| synchronizer);
    let outcome = b.sync().await;
    assert_eq!(outcome.report.create_local, 2);
    assert_eq!(outcome.report.errors.len(), 1);

    pause().await;
    let late = a.db.create_note(None, "late", "").await.unwrap();
    a.sync().await;

    let outcome = b.sync().await;
    assert_eq!(outcome.report.errors.len(), 1);
    assert_eq!(outcome.report.create_local, 1);
    assert_eq!(b.note(&late.id).await.unwrap().title, "late");

    let outcome = b.sync().await;
    assert_eq!(outcome.report.errors.len(), 1);
    assert_eq!(outcome.report.create_local, 0);
}

#[tokio::test]
async fn test_unpushed_edit_is_not_overwritten_by_pull() {
    let api = memory_api();
    let mut a = Client::new(&api);
    let mut b = Client::new(&api);
    let note = a.db.create_note(None, "shared", "original").await.unwrap();
    a.sync().await;
    b.sync().await;

    pause().await;
    a.edit_note(&note.id, "local edit").await;
    pause().await;
    b.edit_note(&note.id, "remote edit").await;
    b.sync().await;

    let flaky = Arc::new(FlakyStat::new(api.clone(), 1));
    let mut a = Client {
        synchronizer: Synchronizer::new(a.db.clone(), flaky, SyncConfig::default()).unwrap(),
        db: a.db.clone(),
        context: a.context.clone(),
    };
    let outcome = a.sync().await;
    assert_eq!(outcome.report.errors.len(), 1);
    assert_eq!(outcome.report.update_local, 0);
    assert_eq!(a.note(&note.id).await.unwrap().body, "local edit");

    let outcome = a.sync().await;
    assert!(outcome.report.errors.is_empty());
    assert_eq!(outcome.report.note_conflict, 1);
    assert_eq!(a.note(&note.id).await.unwrap().body, "remote edit");
    let conflicts: Vec<String> = a
        .notes()
        .await
        .into_iter()
        .filter(|n| n.is_conflict)
        .map(|n| n.body)
        .collect();
    assert_eq!(conflicts, vec!["local edit".to_string()]);
}
