pub mod backup;
pub mod domain;
pub mod error;
pub mod ports;
pub mod streak;

pub use backup::Backup;
pub use domain::{
    Assignment, AssignmentFields, AssignmentPatch, ClassDay, ClassFields, ClassPatch,
    ClassSession, Item, ItemDraft, ItemKind, ItemPatch, Note, NoteFields, NotePatch, Priority,
    Quiz, QuizFields, QuizPatch, StudyStreak, SubmissionStatus, Task, TaskFields, TaskPatch,
};
pub use error::{DataError, DataResult};
pub use ports::{
    BatchOp, DocumentStore, IdentityProvider, NotificationSink, Snapshot, StoreError,
    StoreResult, UserProfile, WriteBatch, MAX_BATCH_OPS,
};
