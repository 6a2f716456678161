//! services/api/src/sharing.rs
//!
//! The unauthenticated sharing surface: public note lookup, public weekly
//! schedules, and importing a shared schedule into one's own account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use studydesk_core::domain::{ClassFields, ItemDraft, ItemKind, Note};
use studydesk_core::error::{DataError, DataResult};
use studydesk_core::ports::{BatchOp, DocumentStore, StoreError};

use crate::session::UserData;

/// What a share link exposes of a note. Owner identity never leaves the
/// service; a note that is private looks exactly like one that does not
/// exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedNote {
    pub id: Uuid,
    pub subject: String,
    pub title: String,
    pub content: String,
    pub last_updated: DateTime<Utc>,
}

impl From<Note> for SharedNote {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            subject: note.fields.subject,
            title: note.fields.title,
            content: note.fields.content,
            last_updated: note.fields.last_updated,
        }
    }
}

/// Resolves a share link for a single note. Missing, foreign-kind, and
/// private all collapse to `NotFound`.
pub async fn public_note(store: &dyn DocumentStore, note_id: Uuid) -> DataResult<SharedNote> {
    let hidden = || DataError::NotFound(format!("notes document {note_id}"));
    match store.fetch(ItemKind::Note, note_id).await {
        Ok(item) => match item.into_note() {
            Some(note) if note.fields.public => Ok(note.into()),
            _ => Err(hidden()),
        },
        Err(StoreError::NotFound(_)) => Err(hidden()),
        Err(e) => Err(e.into()),
    }
}

/// A user's weekly class schedule as exposed by a schedule share link.
/// Record ids and timestamps are stripped; only the timetable itself is
/// public.
pub async fn public_schedule(
    store: &dyn DocumentStore,
    owner: Uuid,
) -> DataResult<Vec<ClassFields>> {
    let items = store.list_owned(ItemKind::Class, owner).await?;
    Ok(items
        .into_iter()
        .filter_map(|item| item.into_class())
        .map(|class| class.fields)
        .collect())
}

/// Copies a shared schedule into the importer's own account. Every session
/// is validated before anything is written; the copies are fresh records
/// owned by the importer.
pub async fn import_schedule(data: &UserData, sessions: Vec<ClassFields>) -> DataResult<usize> {
    let mut ops = Vec::with_capacity(sessions.len());
    for fields in sessions {
        let draft = ItemDraft::Class(fields);
        draft.validate()?;
        ops.push(BatchOp::Insert { owner: data.user(), draft });
    }
    let count = ops.len();
    data.commit_chunked(ops).await?;
    info!("imported a shared schedule of {count} sessions for user {}", data.user());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;
    use studydesk_core::domain::{ClassDay, ItemPatch, NoteFields};

    fn note_draft(title: &str, public: bool) -> ItemDraft {
        ItemDraft::Note(NoteFields {
            subject: "literature".into(),
            title: title.to_string(),
            content: "<p>annotations</p>".into(),
            last_updated: "2026-02-10T08:00:00Z".parse().unwrap(),
            public,
        })
    }

    fn class_fields(subject: &str, day: ClassDay) -> ClassFields {
        ClassFields {
            subject: subject.to_string(),
            time: "10:30 AM".into(),
            day,
            instructor: "Prof. Okafor".into(),
            color: "teal".into(),
        }
    }

    #[tokio::test]
    async fn private_notes_are_indistinguishable_from_missing_ones() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        let private_id = store.insert(owner, note_draft("draft thoughts", false)).await.unwrap();

        let for_private = public_note(store.as_ref(), private_id).await.unwrap_err();
        let for_missing = public_note(store.as_ref(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(for_private, DataError::NotFound(_)));
        assert!(matches!(for_missing, DataError::NotFound(_)));
    }

    #[tokio::test]
    async fn publishing_a_note_makes_its_content_visible() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        let id = store.insert(owner, note_draft("wave mechanics", false)).await.unwrap();

        let patch = ItemPatch::from_value(ItemKind::Note, json!({ "public": true })).unwrap();
        store.patch(ItemKind::Note, id, patch).await.unwrap();

        let shared = public_note(store.as_ref(), id).await.unwrap();
        assert_eq!(shared.title, "wave mechanics");
        assert_eq!(shared.content, "<p>annotations</p>");
    }

    #[tokio::test]
    async fn a_shared_schedule_imports_as_the_importers_own_records() {
        let store = Arc::new(MemoryStore::new());
        let sharer = Uuid::new_v4();
        for (subject, day) in [("algebra", ClassDay::Sunday), ("physics", ClassDay::Tuesday)] {
            store
                .insert(sharer, ItemDraft::Class(class_fields(subject, day)))
                .await
                .unwrap();
        }

        let schedule = public_schedule(store.as_ref(), sharer).await.unwrap();
        assert_eq!(schedule.len(), 2);

        let importer = Uuid::new_v4();
        let data = UserData::new(store.clone() as Arc<dyn DocumentStore>, importer);
        let imported = import_schedule(&data, schedule).await.unwrap();
        assert_eq!(imported, 2);

        let copies = store.list_owned(ItemKind::Class, importer).await.unwrap();
        assert_eq!(copies.len(), 2);
        // The sharer's records are untouched.
        assert_eq!(store.list_owned(ItemKind::Class, sharer).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn an_invalid_session_rejects_the_whole_import() {
        let store = Arc::new(MemoryStore::new());
        let importer = Uuid::new_v4();
        let data = UserData::new(store.clone() as Arc<dyn DocumentStore>, importer);

        let schedule = vec![
            class_fields("chemistry", ClassDay::Monday),
            class_fields("   ", ClassDay::Wednesday),
        ];
        let err = import_schedule(&data, schedule).await.unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
        assert!(store.list_owned(ItemKind::Class, importer).await.unwrap().is_empty());
    }
}
