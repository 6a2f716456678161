//! crates/studydesk_core/src/backup.rs
//!
//! The export/import document format: one JSON object with a top-level
//! array per entity kind, plus the sanitization applied when records are
//! re-created under a new owner.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Item, ItemDraft, ItemKind};
use crate::error::{DataError, DataResult};

/// A full export of a user's data. Elements are plain objects so that
/// backups produced by other versions (with extra fields) still import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    #[serde(default)]
    pub classes: Vec<Value>,
    #[serde(default)]
    pub tasks: Vec<Value>,
    #[serde(default)]
    pub quizzes: Vec<Value>,
    #[serde(default)]
    pub assignments: Vec<Value>,
    #[serde(default)]
    pub notes: Vec<Value>,
}

impl Backup {
    /// Appends a record's plain-object representation to the matching array.
    pub fn push(&mut self, item: &Item) {
        let bucket = match item.kind() {
            ItemKind::Class => &mut self.classes,
            ItemKind::Task => &mut self.tasks,
            ItemKind::Quiz => &mut self.quizzes,
            ItemKind::Assignment => &mut self.assignments,
            ItemKind::Note => &mut self.notes,
        };
        bucket.push(item.to_export());
    }

    pub fn records(&self) -> usize {
        self.classes.len()
            + self.tasks.len()
            + self.quizzes.len()
            + self.assignments.len()
            + self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records() == 0
    }

    /// Converts every element into a validated draft, ready to be re-created
    /// under the importing user. Foreign `id`/`owner`/`created_at` fields and
    /// null-valued fields are stripped first; a single invalid element fails
    /// the whole conversion before any write is attempted.
    pub fn drafts(&self) -> DataResult<Vec<ItemDraft>> {
        let mut drafts = Vec::with_capacity(self.records());
        for kind in ItemKind::ALL {
            let bucket = match kind {
                ItemKind::Class => &self.classes,
                ItemKind::Task => &self.tasks,
                ItemKind::Quiz => &self.quizzes,
                ItemKind::Assignment => &self.assignments,
                ItemKind::Note => &self.notes,
            };
            for element in bucket {
                let draft = draft_from_element(kind, element)?;
                draft.validate()?;
                drafts.push(draft);
            }
        }
        Ok(drafts)
    }
}

/// Strips the fields that must not survive an import: the foreign record
/// key and owner, the foreign creation timestamp, and null-valued fields
/// (the store rejects explicit nulls).
pub fn sanitize(element: &Value) -> Value {
    match element.as_object() {
        Some(map) => Value::Object(
            map.iter()
                .filter(|(key, value)| {
                    !matches!(key.as_str(), "id" | "owner" | "created_at") && !value.is_null()
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        None => element.clone(),
    }
}

fn draft_from_element(kind: ItemKind, element: &Value) -> DataResult<ItemDraft> {
    let body = sanitize(element);
    let invalid = |e: serde_json::Error| {
        DataError::Validation(format!("invalid {kind} element in backup: {e}"))
    };
    let draft = match kind {
        ItemKind::Class => ItemDraft::Class(serde_json::from_value(body).map_err(invalid)?),
        ItemKind::Task => ItemDraft::Task(serde_json::from_value(body).map_err(invalid)?),
        ItemKind::Quiz => ItemDraft::Quiz(serde_json::from_value(body).map_err(invalid)?),
        ItemKind::Assignment => {
            ItemDraft::Assignment(serde_json::from_value(body).map_err(invalid)?)
        }
        ItemKind::Note => ItemDraft::Note(serde_json::from_value(body).map_err(invalid)?),
    };
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_strips_key_owner_and_nulls() {
        let element = json!({
            "id": "someone-elses-id",
            "owner": "someone-else",
            "created_at": "2025-01-01T00:00:00Z",
            "title": "borrowed task",
            "materials_url": null,
        });
        assert_eq!(sanitize(&element), json!({ "title": "borrowed task" }));
    }

    #[test]
    fn drafts_strip_foreign_ownership_and_validate() {
        let backup = Backup {
            tasks: vec![json!({
                "id": "abc",
                "owner": "def",
                "title": "catch up on lectures",
                "priority": "High",
                "completed": false,
                "due_date": "2026-03-01T10:00:00Z",
            })],
            ..Default::default()
        };
        let drafts = backup.drafts().unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind(), ItemKind::Task);
        let payload = drafts[0].payload();
        assert!(payload.get("id").is_none());
        assert!(payload.get("owner").is_none());
    }

    #[test]
    fn an_invalid_element_fails_the_whole_conversion() {
        let backup = Backup {
            tasks: vec![json!({
                "title": "",
                "priority": "Low",
                "due_date": "2026-03-01T10:00:00Z",
            })],
            ..Default::default()
        };
        assert!(matches!(backup.drafts(), Err(DataError::Validation(_))));
    }

    #[test]
    fn empty_arrays_may_be_omitted_entirely() {
        let backup: Backup = serde_json::from_value(json!({ "notes": [] })).unwrap();
        assert!(backup.is_empty());
    }
}
