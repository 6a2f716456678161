//! crates/studydesk_core/src/streak.rs
//!
//! The study-streak advance rule: consecutive calendar days with at least
//! one task completion.

use chrono::NaiveDate;

use crate::domain::StudyStreak;

/// Computes the streak after a task completion on `today`.
///
/// Unchanged if the user already completed something today; incremented if
/// the last completion was exactly yesterday; otherwise reset to 1. Only
/// completions move the streak — un-completing a task never rolls it back.
pub fn advance(current: &StudyStreak, today: NaiveDate) -> StudyStreak {
    match current.last_study_date {
        Some(last) if last == today => current.clone(),
        Some(last) if last.succ_opt() == Some(today) => StudyStreak {
            streak: current.streak + 1,
            last_study_date: Some(today),
        },
        _ => StudyStreak {
            streak: 1,
            last_study_date: Some(today),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn completion_after_yesterday_increments() {
        let current = StudyStreak {
            streak: 4,
            last_study_date: Some(date("2026-03-09")),
        };
        let next = advance(&current, date("2026-03-10"));
        assert_eq!(next.streak, 5);
        assert_eq!(next.last_study_date, Some(date("2026-03-10")));
    }

    #[test]
    fn completion_after_a_gap_resets_to_one() {
        let current = StudyStreak {
            streak: 9,
            last_study_date: Some(date("2026-03-07")),
        };
        let next = advance(&current, date("2026-03-10"));
        assert_eq!(next.streak, 1);
        assert_eq!(next.last_study_date, Some(date("2026-03-10")));
    }

    #[test]
    fn second_completion_on_the_same_day_is_a_no_op() {
        let current = StudyStreak {
            streak: 3,
            last_study_date: Some(date("2026-03-10")),
        };
        assert_eq!(advance(&current, date("2026-03-10")), current);
    }

    #[test]
    fn first_ever_completion_starts_at_one() {
        let next = advance(&StudyStreak::default(), date("2026-03-10"));
        assert_eq!(next.streak, 1);
    }

    #[test]
    fn month_boundary_still_counts_as_consecutive() {
        let current = StudyStreak {
            streak: 2,
            last_study_date: Some(date("2026-02-28")),
        };
        let next = advance(&current, date("2026-03-01"));
        assert_eq!(next.streak, 3);
    }
}
