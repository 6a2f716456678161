//! crates/studydesk_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format
//! beyond the plain JSON shape used for document payloads and backups.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DataError;

//=========================================================================================
// Entity Kinds
//=========================================================================================

/// The five record kinds the service manages. Every stored document belongs
/// to exactly one kind and exactly one owning user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Class,
    Task,
    Quiz,
    Assignment,
    Note,
}

impl ItemKind {
    /// Every kind, in the order collections appear in the backup format.
    pub const ALL: [ItemKind; 5] = [
        ItemKind::Class,
        ItemKind::Task,
        ItemKind::Quiz,
        ItemKind::Assignment,
        ItemKind::Note,
    ];

    /// The logical collection name a kind is stored under.
    pub fn collection(&self) -> &'static str {
        match self {
            ItemKind::Class => "classes",
            ItemKind::Task => "tasks",
            ItemKind::Quiz => "quizzes",
            ItemKind::Assignment => "assignments",
            ItemKind::Note => "notes",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection())
    }
}

//=========================================================================================
// Field Enums
//=========================================================================================

/// Weekday of a recurring class slot. The teaching week runs Sunday through
/// Thursday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassDay {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Submitted,
    #[serde(rename = "Not Submitted")]
    NotSubmitted,
}

//=========================================================================================
// Payload Structs (the stored document body, no id / owner / created_at)
//=========================================================================================

/// A recurring weekly class slot, not a dated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassFields {
    pub subject: String,
    /// Display time in "hh:mm AM/PM" form; treated as an opaque label.
    pub time: String,
    pub day: ClassDay,
    pub instructor: String,
    /// A theme color token, not validated here.
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFields {
    pub title: String,
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizFields {
    pub subject: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentFields {
    pub subject: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: SubmissionStatus,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteFields {
    pub subject: String,
    pub title: String,
    /// Opaque rich-text HTML; no structural validation is performed.
    #[serde(default)]
    pub content: String,
    pub last_updated: DateTime<Utc>,
    /// Opt-in flag for the read-only public sharing projection.
    #[serde(default)]
    pub public: bool,
}

//=========================================================================================
// Full Records (store-assigned metadata plus the payload)
//=========================================================================================

macro_rules! record {
    ($(#[$doc:meta])* $name:ident, $fields:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            /// Assigned by the store at creation; immutable afterwards.
            pub id: Uuid,
            /// The owning user. Records only ever appear in their owner's
            /// view, except through the explicit public sharing paths.
            pub owner: Uuid,
            pub created_at: DateTime<Utc>,
            #[serde(flatten)]
            pub fields: $fields,
        }
    };
}

record!(ClassSession, ClassFields);
record!(Task, TaskFields);
record!(Quiz, QuizFields);
record!(Assignment, AssignmentFields);
record!(Note, NoteFields);

/// A stored record of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Class(ClassSession),
    Task(Task),
    Quiz(Quiz),
    Assignment(Assignment),
    Note(Note),
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Class(_) => ItemKind::Class,
            Item::Task(_) => ItemKind::Task,
            Item::Quiz(_) => ItemKind::Quiz,
            Item::Assignment(_) => ItemKind::Assignment,
            Item::Note(_) => ItemKind::Note,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Item::Class(r) => r.id,
            Item::Task(r) => r.id,
            Item::Quiz(r) => r.id,
            Item::Assignment(r) => r.id,
            Item::Note(r) => r.id,
        }
    }

    pub fn owner(&self) -> Uuid {
        match self {
            Item::Class(r) => r.owner,
            Item::Task(r) => r.owner,
            Item::Quiz(r) => r.owner,
            Item::Assignment(r) => r.owner,
            Item::Note(r) => r.owner,
        }
    }

    pub fn into_class(self) -> Option<ClassSession> {
        match self {
            Item::Class(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_note(self) -> Option<Note> {
        match self {
            Item::Note(r) => Some(r),
            _ => None,
        }
    }

    /// Reassembles a record from the pieces a store adapter holds: metadata
    /// columns plus the JSON payload body.
    pub fn from_parts(
        kind: ItemKind,
        id: Uuid,
        owner: Uuid,
        created_at: DateTime<Utc>,
        payload: Value,
    ) -> Result<Item, DataError> {
        let mut body = match payload {
            Value::Object(map) => map,
            other => {
                return Err(DataError::Store(format!(
                    "{kind} document {id} has a non-object payload: {other}"
                )))
            }
        };
        body.insert("id".into(), serde_json::to_value(id).unwrap_or(Value::Null));
        body.insert("owner".into(), serde_json::to_value(owner).unwrap_or(Value::Null));
        body.insert(
            "created_at".into(),
            serde_json::to_value(created_at).unwrap_or(Value::Null),
        );
        let value = Value::Object(body);
        let item = match kind {
            ItemKind::Class => Item::Class(decode(kind, id, value)?),
            ItemKind::Task => Item::Task(decode(kind, id, value)?),
            ItemKind::Quiz => Item::Quiz(decode(kind, id, value)?),
            ItemKind::Assignment => Item::Assignment(decode(kind, id, value)?),
            ItemKind::Note => Item::Note(decode(kind, id, value)?),
        };
        Ok(item)
    }

    /// The plain-object representation used by the backup format: payload
    /// fields plus `id`, `owner`, and `created_at`.
    pub fn to_export(&self) -> Value {
        let value = match self {
            Item::Class(r) => serde_json::to_value(r),
            Item::Task(r) => serde_json::to_value(r),
            Item::Quiz(r) => serde_json::to_value(r),
            Item::Assignment(r) => serde_json::to_value(r),
            Item::Note(r) => serde_json::to_value(r),
        };
        value.unwrap_or(Value::Null)
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: ItemKind,
    id: Uuid,
    value: Value,
) -> Result<T, DataError> {
    serde_json::from_value(value)
        .map_err(|e| DataError::Store(format!("malformed {kind} document {id}: {e}")))
}

//=========================================================================================
// Drafts (what `add` and batched imports accept)
//=========================================================================================

/// A not-yet-stored record of one of the five kinds. The store assigns the
/// id and creation timestamp; the caller supplies only the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum ItemDraft {
    Class(ClassFields),
    Task(TaskFields),
    Quiz(QuizFields),
    Assignment(AssignmentFields),
    Note(NoteFields),
}

impl ItemDraft {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemDraft::Class(_) => ItemKind::Class,
            ItemDraft::Task(_) => ItemKind::Task,
            ItemDraft::Quiz(_) => ItemKind::Quiz,
            ItemDraft::Assignment(_) => ItemKind::Assignment,
            ItemDraft::Note(_) => ItemKind::Note,
        }
    }

    /// Checks the per-kind required fields. A failed draft is rejected before
    /// any write is attempted.
    pub fn validate(&self) -> Result<(), DataError> {
        let missing = |field: &str| {
            DataError::Validation(format!("{} requires a non-empty {field}", self.kind()))
        };
        match self {
            ItemDraft::Class(f) if f.subject.trim().is_empty() => Err(missing("subject")),
            ItemDraft::Task(f) if f.title.trim().is_empty() => Err(missing("title")),
            ItemDraft::Quiz(f) if f.subject.trim().is_empty() => Err(missing("subject")),
            ItemDraft::Assignment(f) if f.subject.trim().is_empty() => Err(missing("subject")),
            ItemDraft::Assignment(f) if f.title.trim().is_empty() => Err(missing("title")),
            ItemDraft::Note(f) if f.title.trim().is_empty() => Err(missing("title")),
            _ => Ok(()),
        }
    }

    /// The JSON document body to store. Never contains `id` or `owner`.
    pub fn payload(&self) -> Value {
        let value = match self {
            ItemDraft::Class(f) => serde_json::to_value(f),
            ItemDraft::Task(f) => serde_json::to_value(f),
            ItemDraft::Quiz(f) => serde_json::to_value(f),
            ItemDraft::Assignment(f) => serde_json::to_value(f),
            ItemDraft::Note(f) => serde_json::to_value(f),
        };
        value.unwrap_or(Value::Null)
    }
}

//=========================================================================================
// Patches (partial-field updates)
//=========================================================================================

macro_rules! patch {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        /// A partial update. `None` fields are left untouched. There is no
        /// `id` or `owner` field on purpose: the record key and ownership are
        /// immutable.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct $name {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }
    };
}

patch!(ClassPatch { subject: String, time: String, day: ClassDay, instructor: String, color: String });
patch!(TaskPatch { title: String, priority: Priority, completed: bool, due_date: DateTime<Utc> });
patch!(AssignmentPatch { subject: String, title: String, description: String, status: SubmissionStatus, due_date: DateTime<Utc> });
patch!(NotePatch { subject: String, title: String, content: String, last_updated: DateTime<Utc>, public: bool });

/// A partial update for quizzes, written out by hand because
/// `materials_url` needs three states: absent (leave unchanged), a string
/// (replace), and an explicit `null` (clear the link).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuizPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub materials_url: Option<Option<String>>,
}

/// Maps a present-but-null field to `Some(None)` so it survives into the
/// merge object instead of reading as "unchanged".
fn double_option<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(de).map(Some)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemPatch {
    Class(ClassPatch),
    Task(TaskPatch),
    Quiz(QuizPatch),
    Assignment(AssignmentPatch),
    Note(NotePatch),
}

impl ItemPatch {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemPatch::Class(_) => ItemKind::Class,
            ItemPatch::Task(_) => ItemKind::Task,
            ItemPatch::Quiz(_) => ItemKind::Quiz,
            ItemPatch::Assignment(_) => ItemKind::Assignment,
            ItemPatch::Note(_) => ItemKind::Note,
        }
    }

    /// Parses an untyped patch object for `kind`, rejecting attempts to
    /// rewrite the record key or ownership.
    pub fn from_value(kind: ItemKind, value: Value) -> Result<ItemPatch, DataError> {
        if let Some(map) = value.as_object() {
            for key in ["id", "owner", "created_at"] {
                if map.contains_key(key) {
                    return Err(DataError::Validation(format!(
                        "patch may not modify the {key} field"
                    )));
                }
            }
        }
        let invalid =
            |e: serde_json::Error| DataError::Validation(format!("invalid {kind} patch: {e}"));
        let patch = match kind {
            ItemKind::Class => ItemPatch::Class(serde_json::from_value(value).map_err(invalid)?),
            ItemKind::Task => ItemPatch::Task(serde_json::from_value(value).map_err(invalid)?),
            ItemKind::Quiz => ItemPatch::Quiz(serde_json::from_value(value).map_err(invalid)?),
            ItemKind::Assignment => {
                ItemPatch::Assignment(serde_json::from_value(value).map_err(invalid)?)
            }
            ItemKind::Note => ItemPatch::Note(serde_json::from_value(value).map_err(invalid)?),
        };
        Ok(patch)
    }

    /// The JSON merge object applied to the stored payload. `None` fields
    /// are absent, so they never clobber stored values.
    pub fn to_value(&self) -> Value {
        let value = match self {
            ItemPatch::Class(p) => serde_json::to_value(p),
            ItemPatch::Task(p) => serde_json::to_value(p),
            ItemPatch::Quiz(p) => serde_json::to_value(p),
            ItemPatch::Assignment(p) => serde_json::to_value(p),
            ItemPatch::Note(p) => serde_json::to_value(p),
        };
        value.unwrap_or(Value::Null)
    }
}

//=========================================================================================
// Study Streak
//=========================================================================================

/// The per-user derived counter of consecutive calendar days with at least
/// one task completion, persisted in the `user_stats` record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyStreak {
    pub streak: u32,
    pub last_study_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task_fields(title: &str) -> TaskFields {
        TaskFields {
            title: title.to_string(),
            priority: Priority::Medium,
            completed: false,
            due_date: "2026-03-01T10:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn draft_validation_rejects_missing_required_fields() {
        assert!(ItemDraft::Task(task_fields("read chapter 4")).validate().is_ok());
        let err = ItemDraft::Task(task_fields("   ")).validate().unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));

        let note = NoteFields {
            subject: "math".into(),
            title: "".into(),
            content: "<p>hi</p>".into(),
            last_updated: "2026-03-01T10:00:00Z".parse().unwrap(),
            public: false,
        };
        assert!(ItemDraft::Note(note).validate().is_err());
    }

    #[test]
    fn item_round_trips_through_parts() {
        let id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let created_at: DateTime<Utc> = "2026-02-01T08:00:00Z".parse().unwrap();
        let payload = ItemDraft::Task(task_fields("essay draft")).payload();

        let item = Item::from_parts(ItemKind::Task, id, owner, created_at, payload).unwrap();
        assert_eq!(item.id(), id);
        assert_eq!(item.owner(), owner);
        let Item::Task(task) = &item else { panic!("wrong kind") };
        assert_eq!(task.fields.title, "essay draft");
        assert_eq!(task.created_at, created_at);
    }

    #[test]
    fn patch_from_value_rejects_id_rewrites() {
        let err = ItemPatch::from_value(ItemKind::Task, json!({ "id": "abc" })).unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));

        let err =
            ItemPatch::from_value(ItemKind::Task, json!({ "no_such_field": 1 })).unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));

        let patch = ItemPatch::from_value(ItemKind::Task, json!({ "completed": true })).unwrap();
        assert_eq!(patch.to_value(), json!({ "completed": true }));
    }

    #[test]
    fn quiz_patch_distinguishes_absent_from_null_materials_url() {
        // Absent: the link is left alone.
        let patch = ItemPatch::from_value(ItemKind::Quiz, json!({ "subject": "biology" })).unwrap();
        assert_eq!(patch.to_value(), json!({ "subject": "biology" }));

        // Explicit null: the link is cleared by the merge.
        let patch =
            ItemPatch::from_value(ItemKind::Quiz, json!({ "materials_url": null })).unwrap();
        assert_eq!(patch.to_value(), json!({ "materials_url": null }));

        let patch = ItemPatch::from_value(
            ItemKind::Quiz,
            json!({ "materials_url": "https://example.edu/notes.pdf" }),
        )
        .unwrap();
        assert_eq!(
            patch.to_value(),
            json!({ "materials_url": "https://example.edu/notes.pdf" })
        );
    }

    #[test]
    fn patch_serialization_skips_unset_fields() {
        let patch = ItemPatch::Note(NotePatch {
            title: Some("renamed".into()),
            ..Default::default()
        });
        assert_eq!(patch.to_value(), json!({ "title": "renamed" }));
    }
}
