//! Backlog ordering: which task the queue starts next.
//!
//! Order: priority weight descending, then creation time ascending (FIFO
//! within a priority band). Tasks whose creation time cannot be interpreted
//! sort after every dated task of the same priority.

use std::cmp::Ordering;

use crate::domain::Task;

pub fn compare_for_dispatch(a: &Task, b: &Task) -> Ordering {
    b.priority_weight()
        .cmp(&a.priority_weight())
        .then_with(|| a.created_at.sort_key().total_cmp(&b.created_at.sort_key()))
}

/// Backlog tasks in dispatch order. The sort is stable, so ties keep store order.
pub fn ordered_backlog(tasks: &[Task]) -> Vec<&Task> {
    let mut backlog: Vec<&Task> = tasks.iter().filter(|t| t.is_backlog()).collect();
    backlog.sort_by(|a, b| compare_for_dispatch(a, b));
    backlog
}

/// The backlog task to start next, if any.
pub fn next_backlog_task(tasks: &[Task]) -> Option<&Task> {
    let backlog = ordered_backlog(tasks);
    for task in backlog.iter().filter(|t| !t.created_at.is_valid()) {
        tracing::warn!(
            task_id = %task.id,
            created_at = ?task.created_at,
            "backlog task has an unreadable creation time; ordering it last in its priority band"
        );
    }
    backlog.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CreatedAt, ProjectId, TaskPriority, TaskStatus};
    use chrono::{TimeDelta, TimeZone, Utc};

    fn at(minutes: i64) -> CreatedAt {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        CreatedAt::At(base + TimeDelta::minutes(minutes))
    }

    fn task(id: &str, priority: Option<TaskPriority>, created: CreatedAt) -> Task {
        let task = Task::new(id, ProjectId::new("P1"), created);
        match priority {
            Some(p) => task.with_priority(p),
            None => task,
        }
    }

    fn ids(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.id.to_string()).collect()
    }

    #[test]
    fn urgent_first_then_oldest() {
        let tasks = vec![
            task("low", Some(TaskPriority::Low), at(0)),
            task("urgent-new", Some(TaskPriority::Urgent), at(5)),
            task("medium", Some(TaskPriority::Medium), at(1)),
            task("urgent-old", Some(TaskPriority::Urgent), at(3)),
        ];

        let ordered = ordered_backlog(&tasks);
        assert_eq!(ids(&ordered), ["urgent-old", "urgent-new", "medium", "low"]);
        assert_eq!(next_backlog_task(&tasks).unwrap().id.as_str(), "urgent-old");
    }

    #[test]
    fn missing_priority_runs_after_low() {
        let tasks = vec![
            task("none", None, at(0)),
            task("low", Some(TaskPriority::Low), at(10)),
        ];
        assert_eq!(next_backlog_task(&tasks).unwrap().id.as_str(), "low");
    }

    #[test]
    fn unreadable_dates_lose_within_their_band_only() {
        let tasks = vec![
            task("broken-high", Some(TaskPriority::High), CreatedAt::Text("invalid-date".into())),
            task("valid-high", Some(TaskPriority::High), at(60)),
            task("valid-low", Some(TaskPriority::Low), at(0)),
        ];
        let ordered = ordered_backlog(&tasks);
        assert_eq!(ids(&ordered), ["valid-high", "broken-high", "valid-low"]);
    }

    #[test]
    fn mixed_date_representations_compare_numerically() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let tasks = vec![
            task("iso", None, CreatedAt::Text("2024-01-01T00:02:00Z".into())),
            task("epoch", None, CreatedAt::EpochMillis(base.timestamp_millis() + 60_000)),
            task("date", None, CreatedAt::At(base + TimeDelta::minutes(3))),
        ];
        assert_eq!(ids(&ordered_backlog(&tasks)), ["epoch", "iso", "date"]);
    }

    #[test]
    fn only_backlog_tasks_are_candidates() {
        let tasks = vec![
            task("running", Some(TaskPriority::Urgent), at(0)).with_status(TaskStatus::InProgress),
            task("review", Some(TaskPriority::Urgent), at(0)).with_status(TaskStatus::HumanReview),
            task("waiting", Some(TaskPriority::Low), at(9)),
        ];
        assert_eq!(next_backlog_task(&tasks).unwrap().id.as_str(), "waiting");

        let none: Vec<Task> = vec![task("done", None, at(0)).with_status(TaskStatus::Completed)];
        assert!(next_backlog_task(&none).is_none());
    }
}
