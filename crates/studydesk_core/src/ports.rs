//! crates/studydesk_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of the concrete document store, identity provider,
//! and notification delivery mechanism.

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::{Item, ItemDraft, ItemKind, ItemPatch, StudyStreak};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The store's per-transaction operation limit. Bulk imports and deletes are
/// split into atomic chunks no larger than this.
pub const MAX_BATCH_OPS: usize = 450;

/// Errors reported by the external collaborators behind the ports.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("batch of {0} operations exceeds the per-transaction limit")]
    BatchTooLarge(usize),
}

pub type StoreResult<T> = Result<T, StoreError>;

//=========================================================================================
// Batched Writes
//=========================================================================================

#[derive(Debug, Clone)]
pub enum BatchOp {
    Insert { owner: Uuid, draft: ItemDraft },
    Delete { kind: ItemKind, id: Uuid },
}

/// A set of writes committed atomically by the store. The caller is
/// responsible for keeping batches within [`MAX_BATCH_OPS`]; stores reject
/// oversized batches outright.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn push(&mut self, op: BatchOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The full current result set of one owner-scoped collection. Every change
/// notification carries the whole snapshot, not a diff.
pub type Snapshot = Vec<Item>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The backing document store: five owner-scoped collections plus the
/// per-user `user_stats` record.
///
/// Subscriptions are snapshot-driven: the returned receiver always holds the
/// latest full result set for `(kind, owner)`, starting with the state at
/// subscribe time. Snapshot order is only guaranteed within one collection;
/// callers must not assume cross-collection consistency at a single instant.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a document. The store assigns the id and creation timestamp.
    async fn insert(&self, owner: Uuid, draft: ItemDraft) -> StoreResult<Uuid>;

    /// Point read by id.
    async fn fetch(&self, kind: ItemKind, id: Uuid) -> StoreResult<Item>;

    /// Partial merge write. Fails with `NotFound` for a missing id.
    async fn patch(&self, kind: ItemKind, id: Uuid, patch: ItemPatch) -> StoreResult<()>;

    /// Deletes by id. The store reports a missing id as `NotFound`; callers
    /// that want idempotent semantics ignore that case.
    async fn delete(&self, kind: ItemKind, id: Uuid) -> StoreResult<()>;

    /// All documents of one kind owned by `owner`.
    async fn list_owned(&self, kind: ItemKind, owner: Uuid) -> StoreResult<Snapshot>;

    /// Live query over `(kind, owner)` with full-snapshot delivery.
    async fn subscribe(&self, kind: ItemKind, owner: Uuid)
        -> StoreResult<watch::Receiver<Snapshot>>;

    /// Commits every operation in `batch` atomically, or none of them.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

    /// The user's streak record; a default record if none exists yet.
    async fn fetch_stats(&self, owner: Uuid) -> StoreResult<StudyStreak>;

    /// Merge-writes the user's streak record.
    async fn merge_stats(&self, owner: Uuid, stats: StudyStreak) -> StoreResult<()>;

    /// Live view of the user's streak record.
    async fn subscribe_stats(&self, owner: Uuid) -> StoreResult<watch::Receiver<StudyStreak>>;
}

/// The profile an identity provider resolves a credential to.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
}

/// The external identity provider. Sign-in and sign-out flows live entirely
/// on the provider's side; this port only resolves an opaque token to a
/// stable user identifier.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> StoreResult<UserProfile>;
}

/// Permission-gated notification delivery. Emission is best-effort: denied
/// permission is a silent no-op, never an error.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn push(&self, owner: Uuid, title: &str, body: &str);
}
