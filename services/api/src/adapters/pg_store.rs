//! services/api/src/adapters/pg_store.rs
//!
//! The Postgres-backed implementation of the `DocumentStore` port. Documents
//! live in a single `documents` table as `jsonb` payloads keyed by
//! collection and owner; the per-user streak lives in `user_stats`.
//!
//! Snapshot fan-out: after every committed write the adapter re-queries the
//! affected `(kind, owner)` scope and broadcasts the full result set on a
//! `watch` channel, so subscribers always observe whole snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio::sync::watch;
use tracing::warn;
use uuid::Uuid;

use studydesk_core::domain::{Item, ItemDraft, ItemKind, ItemPatch, StudyStreak};
use studydesk_core::ports::{
    BatchOp, DocumentStore, Snapshot, StoreError, StoreResult, WriteBatch, MAX_BATCH_OPS,
};

type Watchers = HashMap<(ItemKind, Uuid), watch::Sender<Snapshot>>;
type StatsWatchers = HashMap<Uuid, watch::Sender<StudyStreak>>;

/// A document store adapter backed by Postgres.
pub struct PgStore {
    pool: PgPool,
    watchers: Mutex<Watchers>,
    stats_watchers: Mutex<StatsWatchers>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            watchers: Mutex::new(HashMap::new()),
            stats_watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Runs database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    fn watchers(&self) -> MutexGuard<'_, Watchers> {
        self.watchers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stats_watchers(&self) -> MutexGuard<'_, StatsWatchers> {
        self.stats_watchers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn query_snapshot(&self, kind: ItemKind, owner: Uuid) -> StoreResult<Snapshot> {
        let rows = sqlx::query(
            "SELECT id, owner_id, created_at, payload FROM documents \
             WHERE collection = $1 AND owner_id = $2 ORDER BY created_at, id",
        )
        .bind(kind.collection())
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(|row| row_to_item(kind, &row)).collect()
    }

    /// Re-queries an owner-scoped collection and pushes the fresh snapshot
    /// to its subscribers, if any. Fan-out failure after a committed write
    /// is logged, not surfaced: the write itself succeeded. Senders whose
    /// receivers have all gone away are dropped here instead of refreshed.
    async fn refresh(&self, kind: ItemKind, owner: Uuid) {
        {
            let mut watchers = self.watchers();
            match watchers.get(&(kind, owner)) {
                Some(tx) if tx.receiver_count() == 0 => {
                    watchers.remove(&(kind, owner));
                    return;
                }
                Some(_) => {}
                None => return,
            }
        }
        match self.query_snapshot(kind, owner).await {
            Ok(snapshot) => {
                if let Some(tx) = self.watchers().get(&(kind, owner)) {
                    tx.send_replace(snapshot);
                }
            }
            Err(e) => warn!("snapshot refresh for {kind}/{owner} failed: {e}"),
        }
    }

    async fn refresh_stats(&self, owner: Uuid) {
        {
            let mut watchers = self.stats_watchers();
            match watchers.get(&owner) {
                Some(tx) if tx.receiver_count() == 0 => {
                    watchers.remove(&owner);
                    return;
                }
                Some(_) => {}
                None => return,
            }
        }
        match self.query_stats(owner).await {
            Ok(stats) => {
                if let Some(tx) = self.stats_watchers().get(&owner) {
                    tx.send_replace(stats);
                }
            }
            Err(e) => warn!("stats refresh for {owner} failed: {e}"),
        }
    }

    async fn query_stats(&self, owner: Uuid) -> StoreResult<StudyStreak> {
        let row = sqlx::query("SELECT streak, last_study_date FROM user_stats WHERE owner_id = $1")
            .bind(owner)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => {
                let streak: i32 = row.try_get("streak").map_err(store_err)?;
                let last_study_date: Option<NaiveDate> =
                    row.try_get("last_study_date").map_err(store_err)?;
                Ok(StudyStreak {
                    streak: streak.max(0) as u32,
                    last_study_date,
                })
            }
            None => Ok(StudyStreak::default()),
        }
    }
}

fn store_err(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn row_to_item(kind: ItemKind, row: &sqlx::postgres::PgRow) -> StoreResult<Item> {
    let id: Uuid = row.try_get("id").map_err(store_err)?;
    let owner: Uuid = row.try_get("owner_id").map_err(store_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(store_err)?;
    let payload: Value = row.try_get("payload").map_err(store_err)?;
    Item::from_parts(kind, id, owner, created_at, payload)
        .map_err(|e| StoreError::Unavailable(e.to_string()))
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(&self, owner: Uuid, draft: ItemDraft) -> StoreResult<Uuid> {
        let kind = draft.kind();
        let row = sqlx::query(
            "INSERT INTO documents (owner_id, collection, payload) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(owner)
        .bind(kind.collection())
        .bind(draft.payload())
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        let id: Uuid = row.try_get("id").map_err(store_err)?;

        self.refresh(kind, owner).await;
        Ok(id)
    }

    async fn fetch(&self, kind: ItemKind, id: Uuid) -> StoreResult<Item> {
        let row = sqlx::query(
            "SELECT id, owner_id, created_at, payload FROM documents \
             WHERE collection = $1 AND id = $2",
        )
        .bind(kind.collection())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?
        .ok_or_else(|| StoreError::NotFound(format!("{kind} document {id}")))?;

        row_to_item(kind, &row)
    }

    async fn patch(&self, kind: ItemKind, id: Uuid, patch: ItemPatch) -> StoreResult<()> {
        let row = sqlx::query(
            "UPDATE documents SET payload = payload || $3::jsonb \
             WHERE collection = $1 AND id = $2 RETURNING owner_id",
        )
        .bind(kind.collection())
        .bind(id)
        .bind(patch.to_value())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?
        .ok_or_else(|| StoreError::NotFound(format!("{kind} document {id}")))?;
        let owner: Uuid = row.try_get("owner_id").map_err(store_err)?;

        self.refresh(kind, owner).await;
        Ok(())
    }

    async fn delete(&self, kind: ItemKind, id: Uuid) -> StoreResult<()> {
        let row = sqlx::query(
            "DELETE FROM documents WHERE collection = $1 AND id = $2 RETURNING owner_id",
        )
        .bind(kind.collection())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?
        .ok_or_else(|| StoreError::NotFound(format!("{kind} document {id}")))?;
        let owner: Uuid = row.try_get("owner_id").map_err(store_err)?;

        self.refresh(kind, owner).await;
        Ok(())
    }

    async fn list_owned(&self, kind: ItemKind, owner: Uuid) -> StoreResult<Snapshot> {
        self.query_snapshot(kind, owner).await
    }

    async fn subscribe(
        &self,
        kind: ItemKind,
        owner: Uuid,
    ) -> StoreResult<watch::Receiver<Snapshot>> {
        // Register the sender before querying: a write that commits in
        // between finds the watcher and refreshes it, so the later of the
        // two snapshots is the one the subscriber ends up holding.
        let rx = {
            let mut watchers = self.watchers();
            watchers.retain(|_, tx| tx.receiver_count() > 0);
            match watchers.get(&(kind, owner)) {
                Some(tx) => tx.subscribe(),
                None => {
                    let (tx, rx) = watch::channel(Vec::new());
                    watchers.insert((kind, owner), tx);
                    rx
                }
            }
        };
        let snapshot = self.query_snapshot(kind, owner).await?;
        if let Some(tx) = self.watchers().get(&(kind, owner)) {
            tx.send_replace(snapshot);
        }
        Ok(rx)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.len() > MAX_BATCH_OPS {
            return Err(StoreError::BatchTooLarge(batch.len()));
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut touched: HashSet<(ItemKind, Uuid)> = HashSet::new();
        for op in batch.ops {
            match op {
                BatchOp::Insert { owner, draft } => {
                    let kind = draft.kind();
                    sqlx::query(
                        "INSERT INTO documents (owner_id, collection, payload) VALUES ($1, $2, $3)",
                    )
                    .bind(owner)
                    .bind(kind.collection())
                    .bind(draft.payload())
                    .execute(&mut *tx)
                    .await
                    .map_err(store_err)?;
                    touched.insert((kind, owner));
                }
                BatchOp::Delete { kind, id } => {
                    // Ids were enumerated before the batch was built; one
                    // that raced away is not a batch failure.
                    let row = sqlx::query(
                        "DELETE FROM documents WHERE collection = $1 AND id = $2 \
                         RETURNING owner_id",
                    )
                    .bind(kind.collection())
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(store_err)?;
                    if let Some(row) = row {
                        let owner: Uuid = row.try_get("owner_id").map_err(store_err)?;
                        touched.insert((kind, owner));
                    }
                }
            }
        }
        tx.commit().await.map_err(store_err)?;

        for (kind, owner) in touched {
            self.refresh(kind, owner).await;
        }
        Ok(())
    }

    async fn fetch_stats(&self, owner: Uuid) -> StoreResult<StudyStreak> {
        self.query_stats(owner).await
    }

    async fn merge_stats(&self, owner: Uuid, stats: StudyStreak) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO user_stats (owner_id, streak, last_study_date) VALUES ($1, $2, $3) \
             ON CONFLICT (owner_id) DO UPDATE \
             SET streak = EXCLUDED.streak, last_study_date = EXCLUDED.last_study_date",
        )
        .bind(owner)
        .bind(stats.streak as i32)
        .bind(stats.last_study_date)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        self.refresh_stats(owner).await;
        Ok(())
    }

    async fn subscribe_stats(&self, owner: Uuid) -> StoreResult<watch::Receiver<StudyStreak>> {
        // Same register-then-query ordering as `subscribe`.
        let rx = {
            let mut watchers = self.stats_watchers();
            watchers.retain(|_, tx| tx.receiver_count() > 0);
            match watchers.get(&owner) {
                Some(tx) => tx.subscribe(),
                None => {
                    let (tx, rx) = watch::channel(StudyStreak::default());
                    watchers.insert(owner, tx);
                    rx
                }
            }
        };
        let stats = self.query_stats(owner).await?;
        if let Some(tx) = self.stats_watchers().get(&owner) {
            tx.send_replace(stats);
        }
        Ok(rx)
    }
}
