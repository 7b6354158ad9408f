use serde::Serialize;

use crate::model::TaskRecord;

/// Summary counts for one person's task list, plus deltas for the current week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSummary {
    pub total: u64,
    pub completed: u64,
    /// Pending and in-progress tasks together.
    pub in_progress: u64,
    /// Tasks whose stored status was not recognized.
    pub unclassified: u64,
    /// Due before `now` and not completed.
    pub overdue: u64,
    pub assigned_this_week: u64,
    pub completed_this_week: u64,
    pub new_in_progress_this_week: u64,
    pub overdue_this_week: u64,
}

/// Per-status slice counts for the status pie chart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub overdue: u64,
}

/// Completed tasks on a single calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    /// `YYYY-MM-DD`
    pub date: String,
    pub count: u64,
}

/// Assigned vs. completed counts for one week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekPoint {
    /// ISO week key, e.g. `2025-W05`.
    pub week: String,
    pub assigned: u64,
    pub completed: u64,
}

/// Completion rate for one assignee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRate {
    pub assignee_id: String,
    pub completed: u64,
    pub total: u64,
    /// Rounded whole percent; 0 when `total` is 0.
    pub rate_pct: u32,
}

/// Completion rate for one task category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRate {
    pub category: String,
    pub completed: u64,
    pub total: u64,
    pub rate_pct: u32,
}

/// Everything a dashboard page renders for one identity.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub employee_id: String,
    pub role: crate::model::Role,
    pub week: String,
    pub summary: StatsSummary,
    pub breakdown: StatusBreakdown,
    pub upcoming: Vec<TaskRecord>,
    pub daily_completions: Vec<DailyCount>,
    pub timeline: Vec<WeekPoint>,
    /// Per assignee; only populated for leads.
    pub completion_rates: Vec<CompletionRate>,
    pub category_rates: Vec<CategoryRate>,
}
