//! Board ordering.
//!
//! The store supplies unsorted [`BoardEntry`] rows; this module owns the
//! comparator and the archival cutoff so the ordering rules live in one
//! place and stay trivially testable.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};

use crate::db::{BoardEntry, Task, TaskStatus};

/// Finished tasks drop off the board after this long.
pub fn archive_after() -> Duration {
    Duration::hours(48)
}

/// A task is archived once it is done and its completion sits past the
/// cutoff. The store clears `completed_at` whenever a task leaves done,
/// so a missing timestamp means the task is still on the board.
pub fn is_archived(task: &Task, now: DateTime<Utc>) -> bool {
    task.status == TaskStatus::Done
        && task
            .completed_at
            .is_some_and(|done| now - done > archive_after())
}

/// Board order:
/// 1. startable tasks (no unmet predecessors) before blocked ones
/// 2. more dependents first (unblocks the most work)
/// 3. fewer predecessors first (closer to the graph's roots)
/// 4. priority, urgent first
/// 5. newer first
/// 6. id, as a stable tiebreak
pub fn compare(a: &BoardEntry, b: &BoardEntry) -> Ordering {
    (a.remaining_predecessors > 0)
        .cmp(&(b.remaining_predecessors > 0))
        .then_with(|| b.dependent_count.cmp(&a.dependent_count))
        .then_with(|| a.predecessor_count.cmp(&b.predecessor_count))
        .then_with(|| a.task.priority.rank().cmp(&b.task.priority.rank()))
        .then_with(|| b.task.created_at.cmp(&a.task.created_at))
        .then_with(|| a.task.id.cmp(&b.task.id))
}

/// Split raw entries into the sorted active board and the archived tail.
pub fn organize(mut entries: Vec<BoardEntry>, now: DateTime<Utc>) -> (Vec<BoardEntry>, Vec<BoardEntry>) {
    let archived: Vec<BoardEntry> = entries
        .iter()
        .filter(|e| is_archived(&e.task, now))
        .cloned()
        .collect();
    entries.retain(|e| !is_archived(&e.task, now));
    entries.sort_by(compare);
    (entries, archived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Priority;

    fn entry(id: i64, remaining: i64, dependents: i64, predecessors: i64) -> BoardEntry {
        let now = Utc::now();
        BoardEntry {
            task: Task {
                id,
                project_id: 1,
                parent_id: None,
                epic_id: None,
                title: format!("t{}", id),
                description: String::new(),
                status: TaskStatus::Todo,
                priority: Priority::Medium,
                assignee_id: None,
                due_date: None,
                completed_at: None,
                created_by: 0,
                updated_by: None,
                created_at: now,
                updated_at: now,
            },
            remaining_predecessors: remaining,
            dependent_count: dependents,
            predecessor_count: predecessors,
        }
    }

    #[test]
    fn startable_before_blocked() {
        let mut entries = vec![entry(1, 2, 9, 2), entry(2, 0, 0, 0)];
        entries.sort_by(compare);
        assert_eq!(entries[0].task.id, 2);
    }

    #[test]
    fn dependents_break_startable_ties() {
        let mut entries = vec![entry(1, 0, 1, 0), entry(2, 0, 5, 0)];
        entries.sort_by(compare);
        assert_eq!(entries[0].task.id, 2);
    }

    #[test]
    fn fewer_predecessors_win_next() {
        let mut entries = vec![entry(1, 0, 3, 4), entry(2, 0, 3, 1)];
        entries.sort_by(compare);
        assert_eq!(entries[0].task.id, 2);
    }

    #[test]
    fn priority_then_recency_then_id() {
        let mut a = entry(1, 0, 0, 0);
        let mut b = entry(2, 0, 0, 0);
        a.task.priority = Priority::Low;
        b.task.priority = Priority::Urgent;
        let mut entries = vec![a, b];
        entries.sort_by(compare);
        assert_eq!(entries[0].task.id, 2);

        let older = Utc::now() - Duration::hours(1);
        let mut a = entry(1, 0, 0, 0);
        a.task.created_at = older;
        let b = entry(2, 0, 0, 0);
        let mut entries = vec![a, b];
        entries.sort_by(compare);
        assert_eq!(entries[0].task.id, 2);

        let shared = Utc::now();
        let mut a = entry(2, 0, 0, 0);
        let mut b = entry(1, 0, 0, 0);
        a.task.created_at = shared;
        b.task.created_at = shared;
        let mut entries = vec![a, b];
        entries.sort_by(compare);
        assert_eq!(entries[0].task.id, 1);
    }

    #[test]
    fn finished_tasks_age_off_the_board() {
        let now = Utc::now();
        let mut fresh = entry(1, 0, 0, 0);
        fresh.task.status = TaskStatus::Done;
        fresh.task.created_at = now;
        fresh.task.completed_at = Some(now - Duration::hours(1));

        let mut stale = entry(2, 0, 0, 0);
        stale.task.status = TaskStatus::Done;
        stale.task.completed_at = Some(now - Duration::hours(72));

        // Cancelled tasks leave the board by other means, never archival.
        let mut stale_cancelled = entry(3, 0, 0, 0);
        stale_cancelled.task.status = TaskStatus::Cancelled;
        stale_cancelled.task.created_at = now;
        stale_cancelled.task.updated_at = now - Duration::hours(72);

        let (board, archived) = organize(vec![fresh, stale, stale_cancelled], now);
        let board_ids: Vec<i64> = board.iter().map(|e| e.task.id).collect();
        let archived_ids: Vec<i64> = archived.iter().map(|e| e.task.id).collect();
        assert_eq!(board_ids, vec![1, 3]);
        assert_eq!(archived_ids, vec![2]);
    }

    #[test]
    fn open_tasks_never_archive() {
        let now = Utc::now();
        let mut old = entry(1, 0, 0, 0);
        old.task.updated_at = now - Duration::days(30);
        assert!(!is_archived(&old.task, now));
    }
}
