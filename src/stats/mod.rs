pub mod types;

pub use types::*;

use std::collections::BTreeMap;

use chrono::{DateTime, Days, Utc};

use crate::date_util::day_key;
use crate::model::{Identity, TaskRecord, TaskStatus};
use crate::week::Week;

/// Longest daily-completion window, in days.
pub const MAX_DAYS: u32 = 366;

/// Longest weekly timeline, in weeks.
pub const MAX_WEEKS: u32 = 260;

/// Compute summary counts and current-week deltas over a task snapshot.
///
/// Single pass, no I/O, never fails. Each record lands in exactly one of
/// `completed`, `in_progress` or `unclassified`; overdue-ness is derived
/// from the due date independently of the stored status.
pub fn compute_stats(tasks: &[TaskRecord], now: DateTime<Utc>) -> StatsSummary {
    compute_week_stats(tasks, now, Week::containing(now))
}

/// [`compute_stats`] with the weekly deltas taken over `week` instead of the
/// week containing `now`. Overdue-ness is still judged at `now`.
pub fn compute_week_stats(tasks: &[TaskRecord], now: DateTime<Utc>, week: Week) -> StatsSummary {
    let mut stats = StatsSummary::default();

    for task in tasks {
        stats.total += 1;

        let created_this_week = week.contains(task.created_at);
        if created_this_week {
            stats.assigned_this_week += 1;
        }

        match task.status {
            Some(TaskStatus::Completed) => {
                stats.completed += 1;
                if created_this_week {
                    stats.completed_this_week += 1;
                }
            }
            Some(TaskStatus::Pending) | Some(TaskStatus::InProgress) => {
                stats.in_progress += 1;
                if created_this_week {
                    stats.new_in_progress_this_week += 1;
                }
            }
            None => stats.unclassified += 1,
        }

        if task.is_overdue(now) {
            stats.overdue += 1;
            if week.contains(task.due_at) {
                stats.overdue_this_week += 1;
            }
        }
    }

    stats
}

/// [`compute_stats`] against the wall clock.
pub fn compute_stats_now(tasks: &[TaskRecord]) -> StatsSummary {
    compute_stats(tasks, Utc::now())
}

/// Per-status counts. Pending and in-progress stay separate here; overdue
/// tasks are counted in their status slice as well.
pub fn status_breakdown(tasks: &[TaskRecord], now: DateTime<Utc>) -> StatusBreakdown {
    let mut b = StatusBreakdown::default();
    for task in tasks {
        match task.status {
            Some(TaskStatus::Pending) => b.pending += 1,
            Some(TaskStatus::InProgress) => b.in_progress += 1,
            Some(TaskStatus::Completed) => b.completed += 1,
            None => {}
        }
        if task.is_overdue(now) {
            b.overdue += 1;
        }
    }
    b
}

/// Open tasks not yet due, soonest first.
pub fn upcoming_deadlines(tasks: &[TaskRecord], now: DateTime<Utc>, limit: usize) -> Vec<TaskRecord> {
    let mut upcoming: Vec<TaskRecord> = tasks
        .iter()
        .filter(|t| !t.is_completed() && t.due_at >= now)
        .cloned()
        .collect();
    upcoming.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.id.cmp(&b.id)));
    upcoming.truncate(limit);
    upcoming
}

/// Completed tasks per day (by creation day) for the last `days` days
/// ending today, oldest first. Days with no completions are included.
/// The window is capped at [`MAX_DAYS`] and at the start of the calendar.
pub fn daily_completions(tasks: &[TaskRecord], now: DateTime<Utc>, days: u32) -> Vec<DailyCount> {
    let mut buckets: BTreeMap<String, u64> = (0..days.min(MAX_DAYS) as u64)
        .map_while(|i| now.checked_sub_days(Days::new(i)))
        .map(|day| (day_key(&day), 0))
        .collect();

    for task in tasks.iter().filter(|t| t.is_completed()) {
        if let Some(count) = buckets.get_mut(&day_key(&task.created_at)) {
            *count += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

/// Assigned (by creation week) vs. completed (by the week of the last
/// update) for the `weeks` weeks ending with `current`, oldest first.
/// Capped at [`MAX_WEEKS`] and at the start of the calendar.
pub fn weekly_timeline(tasks: &[TaskRecord], current: Week, weeks: u32) -> Vec<WeekPoint> {
    let mut buckets: BTreeMap<Week, (u64, u64)> = BTreeMap::new();
    let mut week = Some(current);
    for _ in 0..weeks.min(MAX_WEEKS) {
        let Some(w) = week else { break };
        buckets.insert(w, (0, 0));
        week = w.previous();
    }

    for task in tasks {
        if let Some((assigned, _)) = buckets.get_mut(&Week::containing(task.created_at)) {
            *assigned += 1;
        }
        if task.is_completed() {
            if let Some((_, completed)) = buckets.get_mut(&Week::containing(task.updated_at)) {
                *completed += 1;
            }
        }
    }

    buckets
        .into_iter()
        .map(|(week, (assigned, completed))| WeekPoint {
            week: week.to_key(),
            assigned,
            completed,
        })
        .collect()
}

/// Completion rate per assignee, sorted by assignee id. Unassigned tasks
/// are skipped.
pub fn completion_rates(tasks: &[TaskRecord]) -> Vec<CompletionRate> {
    let mut by_assignee: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for task in tasks.iter().filter(|t| !t.assignee_id.is_empty()) {
        let entry = by_assignee.entry(task.assignee_id.as_str()).or_default();
        entry.1 += 1;
        if task.is_completed() {
            entry.0 += 1;
        }
    }

    by_assignee
        .into_iter()
        .map(|(assignee_id, (completed, total))| CompletionRate {
            assignee_id: assignee_id.to_string(),
            completed,
            total,
            rate_pct: rate_pct(completed, total),
        })
        .collect()
}

/// Completion rate per category, sorted by category name.
pub fn completion_rates_by_category(tasks: &[TaskRecord]) -> Vec<CategoryRate> {
    let mut by_category: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for task in tasks {
        let entry = by_category.entry(task.category.as_str()).or_default();
        entry.1 += 1;
        if task.is_completed() {
            entry.0 += 1;
        }
    }

    by_category
        .into_iter()
        .map(|(category, (completed, total))| CategoryRate {
            category: category.to_string(),
            completed,
            total,
            rate_pct: rate_pct(completed, total),
        })
        .collect()
}

fn rate_pct(completed: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (completed as f64 / total as f64 * 100.0).round() as u32
}

/// Window sizes for [`build_dashboard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardOptions {
    pub upcoming_limit: usize,
    pub days: u32,
    pub weeks: u32,
    /// Week for the weekly deltas and the end of the timeline. Defaults to
    /// the week containing `now`.
    pub week: Option<Week>,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            upcoming_limit: 5,
            days: 7,
            weeks: 6,
            week: None,
        }
    }
}

/// Assemble a dashboard for `identity` from a snapshot of its task list.
pub fn build_dashboard(
    identity: &Identity,
    tasks: &[TaskRecord],
    now: DateTime<Utc>,
    options: &DashboardOptions,
) -> Dashboard {
    let week = options.week.unwrap_or_else(|| Week::containing(now));
    Dashboard {
        employee_id: identity.employee_id.clone(),
        role: identity.role,
        week: week.to_key(),
        summary: compute_week_stats(tasks, now, week),
        breakdown: status_breakdown(tasks, now),
        upcoming: upcoming_deadlines(tasks, now, options.upcoming_limit),
        daily_completions: daily_completions(tasks, now, options.days),
        timeline: weekly_timeline(tasks, week, options.weeks),
        completion_rates: if identity.is_lead() {
            completion_rates(tasks)
        } else {
            Vec::new()
        },
        category_rates: completion_rates_by_category(tasks),
    }
}
