//! services/api/src/session.rs
//!
//! The session-scoped data layer. `UserData` is the stateless half: CRUD,
//! streak bookkeeping, and the chunked bulk operations, all keyed to one
//! user and driven entirely through the store (write-then-observe, no local
//! mutation). `SessionService` wraps it with the five live collection
//! subscriptions, constructed at login and torn down at logout.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use studydesk_core::backup::Backup;
use studydesk_core::domain::{
    Assignment, ClassSession, Item, ItemDraft, ItemKind, ItemPatch, Note, Quiz, StudyStreak,
    Task, TaskPatch,
};
use studydesk_core::error::{DataError, DataResult};
use studydesk_core::ports::{BatchOp, DocumentStore, Snapshot, WriteBatch, MAX_BATCH_OPS};
use studydesk_core::streak;

use crate::retry::with_retry;

//=========================================================================================
// UserData: per-user operations against the store
//=========================================================================================

/// All write paths for one user. Cheap to construct, so the HTTP layer makes
/// one per authenticated request; `SessionService` holds one for its
/// lifetime.
#[derive(Clone)]
pub struct UserData {
    store: Arc<dyn DocumentStore>,
    user: Uuid,
}

impl UserData {
    pub fn new(store: Arc<dyn DocumentStore>, user: Uuid) -> Self {
        Self { store, user }
    }

    pub fn user(&self) -> Uuid {
        self.user
    }

    /// Validates the draft and creates the record under this user. The store
    /// assigns the id and creation timestamp.
    pub async fn add(&self, draft: ItemDraft) -> DataResult<Uuid> {
        draft.validate()?;
        with_retry("insert", || self.store.insert(self.user, draft.clone())).await
    }

    /// Applies a partial update to an owned record. A record belonging to
    /// another user is reported as missing, never as forbidden.
    pub async fn update(&self, id: Uuid, patch: ItemPatch) -> DataResult<()> {
        let kind = patch.kind();
        self.fetch_owned(kind, id).await?;
        with_retry("patch", || self.store.patch(kind, id, patch.clone())).await
    }

    /// Deletes an owned record. Idempotent: a missing id (or one owned by
    /// someone else) is treated as already gone.
    pub async fn remove(&self, kind: ItemKind, id: Uuid) -> DataResult<()> {
        match self.fetch_owned(kind, id).await {
            Ok(_) => {}
            Err(DataError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        }
        match with_retry("delete", || self.store.delete(kind, id)).await {
            Ok(()) | Err(DataError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Flips a task's completed flag by fetching the latest stored state.
    /// Returns the new flag and the (possibly advanced) streak.
    pub async fn toggle_task(&self, id: Uuid) -> DataResult<(bool, StudyStreak)> {
        let item = self.fetch_owned(ItemKind::Task, id).await?;
        let Item::Task(task) = item else {
            return Err(DataError::NotFound(format!("tasks document {id}")));
        };
        let completed = !task.fields.completed;
        self.set_task_completed(id, completed).await?;

        let mut stats = with_retry("fetch stats", || self.store.fetch_stats(self.user)).await?;
        if completed {
            stats = self.record_completion(&stats, Utc::now().date_naive()).await?;
        }
        Ok((completed, stats))
    }

    pub(crate) async fn set_task_completed(&self, id: Uuid, completed: bool) -> DataResult<()> {
        let patch = ItemPatch::Task(TaskPatch {
            completed: Some(completed),
            ..Default::default()
        });
        with_retry("patch", || self.store.patch(ItemKind::Task, id, patch.clone())).await
    }

    /// Advances the streak for a completion on `today` and persists it if it
    /// moved. A second completion on the same day writes nothing.
    pub(crate) async fn record_completion(
        &self,
        current: &StudyStreak,
        today: NaiveDate,
    ) -> DataResult<StudyStreak> {
        let next = streak::advance(current, today);
        if next != *current {
            with_retry("merge stats", || self.store.merge_stats(self.user, next.clone())).await?;
        }
        Ok(next)
    }

    /// Reads every collection from the store and assembles a backup
    /// document. The store-read counterpart of `SessionService::export_all`.
    pub async fn export_backup(&self) -> DataResult<Backup> {
        let mut backup = Backup::default();
        for kind in ItemKind::ALL {
            let items = with_retry("list", || self.store.list_owned(kind, self.user)).await?;
            for item in &items {
                backup.push(item);
            }
        }
        Ok(backup)
    }

    /// Re-creates every record in `backup` under this user, in atomic chunks
    /// of at most [`MAX_BATCH_OPS`]. Chunks committed before a failure stay
    /// committed; the error reports how many. Returns the number of records
    /// written.
    pub async fn import_all(&self, backup: &Backup) -> DataResult<usize> {
        let drafts = backup.drafts()?;
        let total = drafts.len();
        let ops: Vec<BatchOp> = drafts
            .into_iter()
            .map(|draft| BatchOp::Insert { owner: self.user, draft })
            .collect();
        self.commit_chunked(ops).await?;
        info!("imported {total} records for user {}", self.user);
        Ok(total)
    }

    /// Enumerates and deletes every record of every kind owned by this user,
    /// chunked like imports, then resets the streak record. Not atomic
    /// across chunks.
    pub async fn clear_all(&self) -> DataResult<usize> {
        let mut ops = Vec::new();
        for kind in ItemKind::ALL {
            let items = with_retry("list", || self.store.list_owned(kind, self.user)).await?;
            ops.extend(items.into_iter().map(|item| BatchOp::Delete { kind, id: item.id() }));
        }
        let removed = ops.len();
        self.commit_chunked(ops).await?;
        with_retry("merge stats", || {
            self.store.merge_stats(self.user, StudyStreak::default())
        })
        .await?;
        info!("cleared {removed} records for user {}", self.user);
        Ok(removed)
    }

    /// Commits `ops` in order as full chunks plus a final partial one.
    /// Returns the number of chunks committed.
    pub(crate) async fn commit_chunked(&self, ops: Vec<BatchOp>) -> DataResult<usize> {
        let mut committed = 0usize;
        for chunk in ops.chunks(MAX_BATCH_OPS) {
            let batch = WriteBatch { ops: chunk.to_vec() };
            with_retry("commit batch", || self.store.commit(batch.clone()))
                .await
                .map_err(|e| DataError::Batch {
                    committed,
                    source: Box::new(e),
                })?;
            committed += 1;
        }
        Ok(committed)
    }

    /// Point read restricted to this user's records. Foreign ownership is
    /// indistinguishable from absence.
    async fn fetch_owned(&self, kind: ItemKind, id: Uuid) -> DataResult<Item> {
        let item = with_retry("fetch", || self.store.fetch(kind, id)).await?;
        if item.owner() != self.user {
            return Err(DataError::NotFound(format!("{kind} document {id}")));
        }
        Ok(item)
    }
}

//=========================================================================================
// SessionService: the live mirror
//=========================================================================================

/// One signed-in user's live view of their data: five owner-scoped
/// collection subscriptions plus the streak record, each replaced wholesale
/// on every store notification. Closing the session detaches all listeners
/// and empties every collection so no data lingers for the next user.
pub struct SessionService {
    data: UserData,
    classes: watch::Receiver<Snapshot>,
    tasks: watch::Receiver<Snapshot>,
    quizzes: watch::Receiver<Snapshot>,
    assignments: watch::Receiver<Snapshot>,
    notes: watch::Receiver<Snapshot>,
    stats: watch::Receiver<StudyStreak>,
    cancel: CancellationToken,
}

impl SessionService {
    pub async fn open(store: Arc<dyn DocumentStore>, user: Uuid) -> DataResult<Self> {
        let classes = store.subscribe(ItemKind::Class, user).await?;
        let tasks = store.subscribe(ItemKind::Task, user).await?;
        let quizzes = store.subscribe(ItemKind::Quiz, user).await?;
        let assignments = store.subscribe(ItemKind::Assignment, user).await?;
        let notes = store.subscribe(ItemKind::Note, user).await?;
        let stats = store.subscribe_stats(user).await?;
        info!("session opened for user {user}");
        Ok(Self {
            data: UserData::new(store, user),
            classes,
            tasks,
            quizzes,
            assignments,
            notes,
            stats,
            cancel: CancellationToken::new(),
        })
    }

    pub fn user(&self) -> Uuid {
        self.data.user()
    }

    /// Cancelled when the session closes; the scheduler and other background
    /// consumers tie their lifetime to it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tears the session down: all five listeners stop being consulted and
    /// every collection reads as empty from here on.
    pub fn close(&self) {
        info!("session closed for user {}", self.user());
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn snapshot(&self, rx: &watch::Receiver<Snapshot>) -> Snapshot {
        if self.is_closed() {
            return Vec::new();
        }
        rx.borrow().clone()
    }

    pub fn classes(&self) -> Vec<ClassSession> {
        self.snapshot(&self.classes)
            .into_iter()
            .filter_map(|item| match item {
                Item::Class(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.snapshot(&self.tasks)
            .into_iter()
            .filter_map(|item| match item {
                Item::Task(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn quizzes(&self) -> Vec<Quiz> {
        self.snapshot(&self.quizzes)
            .into_iter()
            .filter_map(|item| match item {
                Item::Quiz(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn assignments(&self) -> Vec<Assignment> {
        self.snapshot(&self.assignments)
            .into_iter()
            .filter_map(|item| match item {
                Item::Assignment(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn notes(&self) -> Vec<Note> {
        self.snapshot(&self.notes)
            .into_iter()
            .filter_map(|item| match item {
                Item::Note(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn streak(&self) -> StudyStreak {
        if self.is_closed() {
            return StudyStreak::default();
        }
        self.stats.borrow().clone()
    }

    pub async fn add(&self, draft: ItemDraft) -> DataResult<Uuid> {
        self.data.add(draft).await
    }

    pub async fn update(&self, id: Uuid, patch: ItemPatch) -> DataResult<()> {
        self.data.update(id, patch).await
    }

    pub async fn remove(&self, kind: ItemKind, id: Uuid) -> DataResult<()> {
        self.data.remove(kind, id).await
    }

    /// Read-modify-write against the latest local snapshot. Two rapid
    /// toggles of the same task race under last-write-wins store semantics;
    /// that is an accepted limitation, not a guarantee.
    pub async fn toggle_task(&self, id: Uuid) -> DataResult<bool> {
        let task = self
            .tasks()
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| DataError::NotFound(format!("tasks document {id}")))?;
        let completed = !task.fields.completed;
        self.data.set_task_completed(id, completed).await?;
        if completed {
            let current = self.streak();
            self.data
                .record_completion(&current, Utc::now().date_naive())
                .await?;
        }
        Ok(completed)
    }

    /// Serializes the five live collections into one backup document. Pure
    /// and synchronous: no store access.
    pub fn export_all(&self) -> Backup {
        let mut backup = Backup::default();
        for snapshot in [
            self.snapshot(&self.classes),
            self.snapshot(&self.tasks),
            self.snapshot(&self.quizzes),
            self.snapshot(&self.assignments),
            self.snapshot(&self.notes),
        ] {
            for item in &snapshot {
                backup.push(item);
            }
        }
        backup
    }

    pub async fn import_all(&self, backup: &Backup) -> DataResult<usize> {
        self.data.import_all(backup).await
    }

    pub async fn clear_all(&self) -> DataResult<usize> {
        self.data.clear_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use serde_json::json;
    use studydesk_core::backup::sanitize;
    use studydesk_core::domain::{
        AssignmentFields, ClassDay, ClassFields, NoteFields, Priority, QuizFields,
        SubmissionStatus, TaskFields,
    };

    fn task_draft(title: &str) -> ItemDraft {
        ItemDraft::Task(TaskFields {
            title: title.to_string(),
            priority: Priority::High,
            completed: false,
            due_date: "2026-03-20T09:00:00Z".parse().unwrap(),
        })
    }

    fn class_draft(subject: &str) -> ItemDraft {
        ItemDraft::Class(ClassFields {
            subject: subject.to_string(),
            time: "09:00 AM".into(),
            day: ClassDay::Sunday,
            instructor: "Dr. Hartley".into(),
            color: "indigo".into(),
        })
    }

    fn note_draft(title: &str, public: bool) -> ItemDraft {
        ItemDraft::Note(NoteFields {
            subject: "physics".into(),
            title: title.to_string(),
            content: "<p>waves</p>".into(),
            last_updated: "2026-03-15T12:00:00Z".parse().unwrap(),
            public,
        })
    }

    async fn open_session(store: &Arc<MemoryStore>, user: Uuid) -> SessionService {
        SessionService::open(store.clone() as Arc<dyn DocumentStore>, user)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn session_mirrors_adds_and_clears_on_close() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let session = open_session(&store, user).await;

        session.add(task_draft("first")).await.unwrap();
        session.add(class_draft("algebra")).await.unwrap();
        assert_eq!(session.tasks().len(), 1);
        assert_eq!(session.classes().len(), 1);

        session.close();
        assert!(session.tasks().is_empty());
        assert!(session.classes().is_empty());
        assert_eq!(session.streak(), StudyStreak::default());
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_the_store() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let session = open_session(&store, user).await;

        let err = session.add(task_draft("   ")).await.unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
        assert!(session.tasks().is_empty());
    }

    #[tokio::test]
    async fn double_toggle_restores_completed_and_keeps_streak() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let session = open_session(&store, user).await;
        let id = session.add(task_draft("revise notes")).await.unwrap();

        assert!(session.toggle_task(id).await.unwrap());
        assert_eq!(session.tasks()[0].fields.completed, true);
        let after_completion = session.streak();
        assert_eq!(after_completion.streak, 1);

        // Un-completing leaves the streak untouched.
        assert!(!session.toggle_task(id).await.unwrap());
        assert_eq!(session.tasks()[0].fields.completed, false);
        assert_eq!(session.streak(), after_completion);
    }

    #[tokio::test]
    async fn second_completion_today_does_not_grow_the_streak() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let session = open_session(&store, user).await;
        let a = session.add(task_draft("one")).await.unwrap();
        let b = session.add(task_draft("two")).await.unwrap();

        session.toggle_task(a).await.unwrap();
        session.toggle_task(b).await.unwrap();
        assert_eq!(session.streak().streak, 1);
    }

    #[tokio::test]
    async fn update_excludes_foreign_records() {
        let store = Arc::new(MemoryStore::new());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let alice_data = UserData::new(store.clone() as Arc<dyn DocumentStore>, alice);
        let bob_data = UserData::new(store.clone() as Arc<dyn DocumentStore>, bob);

        let id = alice_data.add(task_draft("alice's task")).await.unwrap();

        let patch = ItemPatch::from_value(ItemKind::Task, json!({ "title": "stolen" })).unwrap();
        let err = bob_data.update(id, patch).await.unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));

        // Removing someone else's record reads as already-gone and leaves it.
        bob_data.remove(ItemKind::Task, id).await.unwrap();
        assert_eq!(store.list_owned(ItemKind::Task, alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn import_of_an_export_reproduces_the_records() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let session = open_session(&store, user).await;

        session.add(class_draft("calculus")).await.unwrap();
        session.add(task_draft("problem set 3")).await.unwrap();
        session
            .add(ItemDraft::Quiz(QuizFields {
                subject: "history".into(),
                date: "2026-04-02".parse().unwrap(),
                materials_url: Some("https://example.edu/review.pdf".into()),
            }))
            .await
            .unwrap();
        session
            .add(ItemDraft::Assignment(AssignmentFields {
                subject: "chemistry".into(),
                title: "lab report".into(),
                description: "titration write-up".into(),
                status: SubmissionStatus::NotSubmitted,
                due_date: "2026-04-10T23:59:00Z".parse().unwrap(),
            }))
            .await
            .unwrap();
        session.add(note_draft("lecture 7", false)).await.unwrap();

        let exported = session.export_all();
        assert_eq!(exported.records(), 5);

        let other = Uuid::new_v4();
        let other_session = open_session(&store, other).await;
        let imported = other_session.import_all(&exported).await.unwrap();
        assert_eq!(imported, 5);

        // Field-for-field equality modulo ids, owners, and creation stamps.
        let mut original: Vec<_> = exported
            .tasks
            .iter()
            .chain(&exported.classes)
            .chain(&exported.quizzes)
            .chain(&exported.assignments)
            .chain(&exported.notes)
            .map(sanitize)
            .map(|v| v.to_string())
            .collect();
        let reexported = other_session.export_all();
        let mut copied: Vec<_> = reexported
            .tasks
            .iter()
            .chain(&reexported.classes)
            .chain(&reexported.quizzes)
            .chain(&reexported.assignments)
            .chain(&reexported.notes)
            .map(sanitize)
            .map(|v| v.to_string())
            .collect();
        original.sort();
        copied.sort();
        assert_eq!(original, copied);
    }

    #[tokio::test]
    async fn bulk_imports_commit_in_capped_chunks() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let data = UserData::new(store.clone() as Arc<dyn DocumentStore>, user);

        let mut backup = Backup::default();
        for i in 0..1000 {
            backup.tasks.push(json!({
                "title": format!("task {i}"),
                "priority": "Low",
                "completed": false,
                "due_date": "2026-05-01T10:00:00Z",
            }));
        }
        let imported = data.import_all(&backup).await.unwrap();
        assert_eq!(imported, 1000);
        // ceil(1000 / 450) == 3 commits, none above the cap.
        assert_eq!(store.commit_log(), vec![450, 450, 100]);
    }

    #[tokio::test]
    async fn a_failed_chunk_reports_the_partially_committed_state() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let data = UserData::new(store.clone() as Arc<dyn DocumentStore>, user);
        store.fail_commits_after(1);

        let mut backup = Backup::default();
        for i in 0..900 {
            backup.tasks.push(json!({
                "title": format!("task {i}"),
                "priority": "Medium",
                "completed": false,
                "due_date": "2026-05-01T10:00:00Z",
            }));
        }
        let err = data.import_all(&backup).await.unwrap_err();
        let DataError::Batch { committed, source } = err else {
            panic!("expected a batch error");
        };
        assert_eq!(committed, 1);
        assert!(matches!(*source, DataError::RetryExhausted { .. }));
        // The first chunk stays committed.
        assert_eq!(store.list_owned(ItemKind::Task, user).await.unwrap().len(), 450);
    }

    #[tokio::test]
    async fn clear_all_removes_every_kind_and_resets_the_streak() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let session = open_session(&store, user).await;

        let id = session.add(task_draft("done today")).await.unwrap();
        session.add(class_draft("biology")).await.unwrap();
        session.add(note_draft("summary", true)).await.unwrap();
        session.toggle_task(id).await.unwrap();
        assert_eq!(session.streak().streak, 1);

        let removed = session.clear_all().await.unwrap();
        assert_eq!(removed, 3);
        for kind in ItemKind::ALL {
            assert!(store.list_owned(kind, user).await.unwrap().is_empty());
        }
        assert_eq!(store.fetch_stats(user).await.unwrap(), StudyStreak::default());
    }
}
