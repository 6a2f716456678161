//! services/api/src/adapters/memory.rs
//!
//! A volatile, in-process implementation of the `DocumentStore` port with
//! the same snapshot fan-out semantics as the Postgres adapter. Backs the
//! `memory` store backend and the test suite.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use studydesk_core::domain::{Item, ItemDraft, ItemKind, ItemPatch, StudyStreak};
use studydesk_core::ports::{
    BatchOp, DocumentStore, Snapshot, StoreError, StoreResult, WriteBatch, MAX_BATCH_OPS,
};

struct StoredDoc {
    id: Uuid,
    owner: Uuid,
    created_at: DateTime<Utc>,
    payload: Value,
    /// Insertion sequence, used for a stable snapshot order.
    seq: u64,
}

#[derive(Default)]
struct Inner {
    docs: HashMap<ItemKind, Vec<StoredDoc>>,
    stats: HashMap<Uuid, StudyStreak>,
    watchers: HashMap<(ItemKind, Uuid), watch::Sender<Snapshot>>,
    stats_watchers: HashMap<Uuid, watch::Sender<StudyStreak>>,
    next_seq: u64,
    /// Sizes of every committed batch, in commit order.
    commit_log: Vec<usize>,
    /// When set, commits fail once this many have already succeeded.
    fail_commits_after: Option<usize>,
}

/// HashMap-backed document store. All state is process-lifetime only.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sizes of every batch committed so far, in order. Test support.
    pub fn commit_log(&self) -> Vec<usize> {
        self.lock().commit_log.clone()
    }

    /// Makes every commit after the first `n` fail with a transient error.
    /// Test support for the partial-batch failure path.
    pub fn fail_commits_after(&self, n: usize) {
        self.lock().fail_commits_after = Some(n);
    }

    /// How many collection watchers are currently registered. Test support.
    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }
}

/// Drops senders whose receivers have all gone away, so closed sessions do
/// not accumulate in the watcher maps.
fn prune_watchers(inner: &mut Inner) {
    inner.watchers.retain(|_, tx| tx.receiver_count() > 0);
    inner.stats_watchers.retain(|_, tx| tx.receiver_count() > 0);
}

fn snapshot_of(inner: &Inner, kind: ItemKind, owner: Uuid) -> StoreResult<Snapshot> {
    let mut docs: Vec<&StoredDoc> = inner
        .docs
        .get(&kind)
        .map(|bucket| bucket.iter().filter(|d| d.owner == owner).collect())
        .unwrap_or_default();
    docs.sort_by_key(|d| d.seq);
    docs.into_iter()
        .map(|d| {
            Item::from_parts(kind, d.id, d.owner, d.created_at, d.payload.clone())
                .map_err(|e| StoreError::Unavailable(e.to_string()))
        })
        .collect()
}

fn notify(inner: &Inner, kind: ItemKind, owner: Uuid) {
    if let Some(tx) = inner.watchers.get(&(kind, owner)) {
        if let Ok(snapshot) = snapshot_of(inner, kind, owner) {
            tx.send_replace(snapshot);
        }
    }
}

fn notify_stats(inner: &Inner, owner: Uuid) {
    if let Some(tx) = inner.stats_watchers.get(&owner) {
        tx.send_replace(inner.stats.get(&owner).cloned().unwrap_or_default());
    }
}

/// Applies one batch operation. Missing delete targets are skipped: the ids
/// were enumerated before the batch was built and may have raced away.
fn apply(inner: &mut Inner, op: BatchOp, touched: &mut HashSet<(ItemKind, Uuid)>) {
    match op {
        BatchOp::Insert { owner, draft } => {
            let kind = draft.kind();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.docs.entry(kind).or_default().push(StoredDoc {
                id: Uuid::new_v4(),
                owner,
                created_at: Utc::now(),
                payload: draft.payload(),
                seq,
            });
            touched.insert((kind, owner));
        }
        BatchOp::Delete { kind, id } => {
            if let Some(bucket) = inner.docs.get_mut(&kind) {
                if let Some(pos) = bucket.iter().position(|d| d.id == id) {
                    let doc = bucket.remove(pos);
                    touched.insert((kind, doc.owner));
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, owner: Uuid, draft: ItemDraft) -> StoreResult<Uuid> {
        let mut inner = self.lock();
        let kind = draft.kind();
        let id = Uuid::new_v4();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.docs.entry(kind).or_default().push(StoredDoc {
            id,
            owner,
            created_at: Utc::now(),
            payload: draft.payload(),
            seq,
        });
        notify(&inner, kind, owner);
        Ok(id)
    }

    async fn fetch(&self, kind: ItemKind, id: Uuid) -> StoreResult<Item> {
        let inner = self.lock();
        let doc = inner
            .docs
            .get(&kind)
            .and_then(|bucket| bucket.iter().find(|d| d.id == id))
            .ok_or_else(|| StoreError::NotFound(format!("{kind} document {id}")))?;
        Item::from_parts(kind, doc.id, doc.owner, doc.created_at, doc.payload.clone())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn patch(&self, kind: ItemKind, id: Uuid, patch: ItemPatch) -> StoreResult<()> {
        let mut inner = self.lock();
        let bucket = inner.docs.entry(kind).or_default();
        let doc = bucket
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("{kind} document {id}")))?;
        let owner = doc.owner;
        if let (Some(body), Some(merge)) = (doc.payload.as_object_mut(), patch.to_value().as_object())
        {
            for (key, value) in merge {
                body.insert(key.clone(), value.clone());
            }
        }
        notify(&inner, kind, owner);
        Ok(())
    }

    async fn delete(&self, kind: ItemKind, id: Uuid) -> StoreResult<()> {
        let mut inner = self.lock();
        let bucket = inner.docs.entry(kind).or_default();
        let pos = bucket
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("{kind} document {id}")))?;
        let doc = bucket.remove(pos);
        notify(&inner, kind, doc.owner);
        Ok(())
    }

    async fn list_owned(&self, kind: ItemKind, owner: Uuid) -> StoreResult<Snapshot> {
        snapshot_of(&self.lock(), kind, owner)
    }

    async fn subscribe(
        &self,
        kind: ItemKind,
        owner: Uuid,
    ) -> StoreResult<watch::Receiver<Snapshot>> {
        let mut inner = self.lock();
        prune_watchers(&mut inner);
        let initial = snapshot_of(&inner, kind, owner)?;
        let rx = match inner.watchers.get(&(kind, owner)) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(initial);
                inner.watchers.insert((kind, owner), tx);
                rx
            }
        };
        Ok(rx)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut inner = self.lock();
        if batch.len() > MAX_BATCH_OPS {
            return Err(StoreError::BatchTooLarge(batch.len()));
        }
        if let Some(limit) = inner.fail_commits_after {
            if inner.commit_log.len() >= limit {
                return Err(StoreError::Unavailable("injected commit failure".to_string()));
            }
        }
        inner.commit_log.push(batch.len());
        let mut touched = HashSet::new();
        for op in batch.ops {
            apply(&mut inner, op, &mut touched);
        }
        for (kind, owner) in touched {
            notify(&inner, kind, owner);
        }
        Ok(())
    }

    async fn fetch_stats(&self, owner: Uuid) -> StoreResult<StudyStreak> {
        Ok(self.lock().stats.get(&owner).cloned().unwrap_or_default())
    }

    async fn merge_stats(&self, owner: Uuid, stats: StudyStreak) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.stats.insert(owner, stats);
        notify_stats(&inner, owner);
        Ok(())
    }

    async fn subscribe_stats(&self, owner: Uuid) -> StoreResult<watch::Receiver<StudyStreak>> {
        let mut inner = self.lock();
        prune_watchers(&mut inner);
        let initial = inner.stats.get(&owner).cloned().unwrap_or_default();
        let rx = match inner.stats_watchers.get(&owner) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = watch::channel(initial);
                inner.stats_watchers.insert(owner, tx);
                rx
            }
        };
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studydesk_core::domain::{Priority, TaskFields};

    fn task(title: &str) -> ItemDraft {
        ItemDraft::Task(TaskFields {
            title: title.to_string(),
            priority: Priority::Low,
            completed: false,
            due_date: "2026-03-01T10:00:00Z".parse().unwrap(),
        })
    }

    #[tokio::test]
    async fn subscriptions_deliver_full_snapshots() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let rx = store.subscribe(ItemKind::Task, owner).await.unwrap();
        assert!(rx.borrow().is_empty());

        store.insert(owner, task("one")).await.unwrap();
        store.insert(owner, task("two")).await.unwrap();
        assert_eq!(rx.borrow().len(), 2);
    }

    #[tokio::test]
    async fn snapshots_are_owner_scoped() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.insert(alice, task("alice's task")).await.unwrap();

        let rx = store.subscribe(ItemKind::Task, bob).await.unwrap();
        assert!(rx.borrow().is_empty());
        assert!(store.list_owned(ItemKind::Task, bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_batches_are_rejected() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut batch = WriteBatch::default();
        for _ in 0..(MAX_BATCH_OPS + 1) {
            batch.push(BatchOp::Insert { owner, draft: task("x") });
        }
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::BatchTooLarge(_)));
        assert!(store.commit_log().is_empty());
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned_on_the_next_subscribe() {
        let store = MemoryStore::new();
        let gone = Uuid::new_v4();
        let rx = store.subscribe(ItemKind::Task, gone).await.unwrap();
        assert_eq!(store.watcher_count(), 1);
        drop(rx);

        let _rx = store.subscribe(ItemKind::Note, Uuid::new_v4()).await.unwrap();
        assert_eq!(store.watcher_count(), 1);
    }

    #[tokio::test]
    async fn a_null_patch_clears_the_quiz_materials_link() {
        use studydesk_core::domain::QuizFields;

        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let id = store
            .insert(
                owner,
                ItemDraft::Quiz(QuizFields {
                    subject: "geology".into(),
                    date: "2026-04-20".parse().unwrap(),
                    materials_url: Some("https://example.edu/rocks.pdf".into()),
                }),
            )
            .await
            .unwrap();

        let patch =
            ItemPatch::from_value(ItemKind::Quiz, serde_json::json!({ "materials_url": null }))
                .unwrap();
        store.patch(ItemKind::Quiz, id, patch).await.unwrap();

        let Item::Quiz(quiz) = store.fetch(ItemKind::Quiz, id).await.unwrap() else {
            panic!("wrong kind");
        };
        assert_eq!(quiz.fields.materials_url, None);
    }

    #[tokio::test]
    async fn deleting_a_missing_id_is_reported() {
        let store = MemoryStore::new();
        let err = store.delete(ItemKind::Task, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
