//! services/api/src/scheduler.rs
//!
//! The due-item notification scheduler: a periodic scan over the three
//! date-bearing collections that emits one notification per item entering
//! the lookahead window.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use tracing::info;
use uuid::Uuid;

use studydesk_core::domain::SubmissionStatus;
use studydesk_core::error::DataResult;
use studydesk_core::ports::{DocumentStore, NotificationSink};

use crate::session::SessionService;

/// Opens a session per user and spawns a scheduler over each, all feeding
/// the same sink. Returns the session handles; closing a session stops its
/// scheduler.
pub async fn spawn_due_scans(
    store: Arc<dyn DocumentStore>,
    users: Vec<Uuid>,
    sink: Arc<dyn NotificationSink>,
    scan_interval: Duration,
    lookahead: Duration,
) -> DataResult<Vec<Arc<SessionService>>> {
    let mut sessions = Vec::with_capacity(users.len());
    for user in users {
        let session = Arc::new(SessionService::open(store.clone(), user).await?);
        let scheduler =
            DueItemScheduler::new(session.clone(), sink.clone(), scan_interval, lookahead);
        tokio::spawn(scheduler.run());
        sessions.push(session);
    }
    Ok(sessions)
}

/// Scans one session's tasks, quizzes, and assignments on a fixed interval
/// (and once immediately on activation). The notified set lives in process
/// memory only: after a restart, items still inside the window notify
/// again. That volatility is deliberate for a best-effort reminder.
pub struct DueItemScheduler {
    session: Arc<SessionService>,
    sink: Arc<dyn NotificationSink>,
    scan_interval: Duration,
    lookahead: chrono::Duration,
    notified: HashSet<Uuid>,
}

impl DueItemScheduler {
    pub fn new(
        session: Arc<SessionService>,
        sink: Arc<dyn NotificationSink>,
        scan_interval: Duration,
        lookahead: Duration,
    ) -> Self {
        let lookahead =
            chrono::Duration::from_std(lookahead).unwrap_or_else(|_| chrono::Duration::hours(1));
        Self {
            session,
            sink,
            scan_interval,
            lookahead,
            notified: HashSet::new(),
        }
    }

    /// Runs until the owning session closes. The first tick fires
    /// immediately.
    pub async fn run(mut self) {
        let cancel = self.session.cancel_token();
        let mut ticker = tokio::time::interval(self.scan_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("due-item scheduler stopped for user {}", self.session.user());
                    break;
                }
                _ = ticker.tick() => {
                    self.scan(Utc::now()).await;
                }
            }
        }
    }

    /// One pass over the snapshots. Returns how many notifications were
    /// emitted, which is at most one per item per process lifetime.
    pub async fn scan(&mut self, now: DateTime<Utc>) -> usize {
        let deadline = now + self.lookahead;
        let due = |moment: DateTime<Utc>| moment > now && moment <= deadline;
        let user = self.session.user();
        let mut emitted = 0usize;

        for task in self.session.tasks() {
            if !task.fields.completed && due(task.fields.due_date) && self.notified.insert(task.id)
            {
                self.sink
                    .push(user, "Upcoming task", &format!("{} is due soon", task.fields.title))
                    .await;
                emitted += 1;
            }
        }
        for quiz in self.session.quizzes() {
            let moment = quiz.fields.date.and_time(NaiveTime::MIN).and_utc();
            if due(moment) && self.notified.insert(quiz.id) {
                self.sink
                    .push(user, "Upcoming quiz", &format!("{} quiz is coming up", quiz.fields.subject))
                    .await;
                emitted += 1;
            }
        }
        for assignment in self.session.assignments() {
            if assignment.fields.status != SubmissionStatus::Submitted
                && due(assignment.fields.due_date)
                && self.notified.insert(assignment.id)
            {
                self.sink
                    .push(
                        user,
                        "Upcoming assignment",
                        &format!("{} is due soon", assignment.fields.title),
                    )
                    .await;
                emitted += 1;
            }
        }
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use studydesk_core::domain::{AssignmentFields, ItemDraft, Priority, TaskFields};
    use studydesk_core::ports::DocumentStore;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn push(&self, _owner: Uuid, title: &str, body: &str) {
            self.sent.lock().unwrap().push(format!("{title}: {body}"));
        }
    }

    fn task_due_in(minutes: i64, title: &str, completed: bool) -> ItemDraft {
        ItemDraft::Task(TaskFields {
            title: title.to_string(),
            priority: Priority::High,
            completed,
            due_date: Utc::now() + chrono::Duration::minutes(minutes),
        })
    }

    async fn scheduler_over(
        store: Arc<MemoryStore>,
        user: Uuid,
        sink: Arc<RecordingSink>,
    ) -> DueItemScheduler {
        let session = SessionService::open(store as Arc<dyn DocumentStore>, user)
            .await
            .unwrap();
        DueItemScheduler::new(
            Arc::new(session),
            sink,
            Duration::from_secs(300),
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn items_in_the_window_notify_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.insert(user, task_due_in(30, "soon", false)).await.unwrap();
        store.insert(user, task_due_in(30, "already done", true)).await.unwrap();
        store.insert(user, task_due_in(240, "much later", false)).await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler_over(store, user, sink.clone()).await;

        assert_eq!(scheduler.scan(Utc::now()).await, 1);
        // The item is still inside the window on the next pass.
        assert_eq!(scheduler.scan(Utc::now()).await, 0);
        assert_eq!(sink.sent.lock().unwrap().as_slice(), ["Upcoming task: soon is due soon"]);
    }

    #[tokio::test]
    async fn submitted_assignments_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        for status in [SubmissionStatus::Submitted, SubmissionStatus::NotSubmitted] {
            store
                .insert(
                    user,
                    ItemDraft::Assignment(AssignmentFields {
                        subject: "math".into(),
                        title: format!("{status:?}"),
                        description: String::new(),
                        status,
                        due_date: Utc::now() + chrono::Duration::minutes(45),
                    }),
                )
                .await
                .unwrap();
        }

        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler_over(store, user, sink.clone()).await;
        assert_eq!(scheduler.scan(Utc::now()).await, 1);
        assert!(sink.sent.lock().unwrap()[0].starts_with("Upcoming assignment"));
    }

    #[tokio::test]
    async fn startup_scans_cover_every_known_user() {
        let store = Arc::new(MemoryStore::new());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.insert(alice, task_due_in(30, "alice soon", false)).await.unwrap();
        store.insert(bob, task_due_in(30, "bob soon", false)).await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let sessions = spawn_due_scans(
            store.clone() as Arc<dyn DocumentStore>,
            vec![alice, bob],
            sink.clone() as Arc<dyn NotificationSink>,
            Duration::from_millis(10),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();
        assert_eq!(sessions.len(), 2);

        // The first tick fires immediately; the interval is short enough
        // for several more passes, which must not re-notify.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut sent = sink.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(
            sent,
            vec![
                "Upcoming task: alice soon is due soon",
                "Upcoming task: bob soon is due soon",
            ]
        );

        for session in &sessions {
            session.close();
        }
    }

    #[tokio::test]
    async fn items_past_due_do_not_notify() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        store.insert(user, task_due_in(-10, "overdue", false)).await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = scheduler_over(store, user, sink.clone()).await;
        assert_eq!(scheduler.scan(Utc::now()).await, 0);
    }
}
