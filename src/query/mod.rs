use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::date_util::format_instant;
use crate::error::{Error, Result};
use crate::model::{TaskRecord, TaskStatus};
use crate::storage::repository::{raw_task_from_row, TASK_COLUMNS};
use crate::storage::Database;

/// A task as listed in a task view, with its derived overdue flag.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
    #[serde(flatten)]
    pub task: TaskRecord,
    pub is_overdue: bool,
}

/// Columns a query may be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderBy {
    #[default]
    DueAt,
    CreatedAt,
    UpdatedAt,
    Title,
}

impl OrderBy {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "due" | "due_at" => Ok(OrderBy::DueAt),
            "created" | "created_at" => Ok(OrderBy::CreatedAt),
            "updated" | "updated_at" => Ok(OrderBy::UpdatedAt),
            "title" => Ok(OrderBy::Title),
            other => Err(Error::Validation(format!(
                "cannot order by '{other}' (expected: due, created, updated, title)"
            ))),
        }
    }
}

/// Builder for task list queries, mirroring the dashboard's search box and
/// filter menus.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    assignee_id: Option<String>,
    assigner_id: Option<String>,
    status: Option<TaskStatus>,
    category: Option<String>,
    search: Option<String>,
    overdue_at: Option<DateTime<Utc>>,
    due_after: Option<DateTime<Utc>>,
    due_before: Option<DateTime<Utc>>,
    limit: Option<u32>,
    order_by: OrderBy,
    order_desc: bool,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assignee(mut self, employee_id: &str) -> Self {
        self.assignee_id = Some(employee_id.to_string());
        self
    }

    pub fn assigner(mut self, employee_id: &str) -> Self {
        self.assigner_id = Some(employee_id.to_string());
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Exact category match. "All" (any case) clears the filter.
    pub fn category(mut self, category: &str) -> Self {
        self.category = if category.eq_ignore_ascii_case("all") {
            None
        } else {
            Some(category.to_string())
        };
        self
    }

    /// Case-insensitive substring match on title, task id or assignee id.
    pub fn search(mut self, text: &str) -> Self {
        let text = text.trim();
        self.search = if text.is_empty() {
            None
        } else {
            Some(text.to_lowercase())
        };
        self
    }

    /// Only tasks overdue as of `now`: due before it and not completed.
    pub fn overdue_at(mut self, now: DateTime<Utc>) -> Self {
        self.overdue_at = Some(now);
        self
    }

    pub fn due_after(mut self, at: DateTime<Utc>) -> Self {
        self.due_after = Some(at);
        self
    }

    pub fn due_before(mut self, at: DateTime<Utc>) -> Self {
        self.due_before = Some(at);
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn order_by(mut self, field: OrderBy) -> Self {
        self.order_by = field;
        self
    }

    pub fn descending(mut self) -> Self {
        self.order_desc = true;
        self
    }

    /// Run the query. Rows are normalized against `now` before the status,
    /// overdue and due-window filters apply, so listings agree with the
    /// dashboard counts whatever form the stored values take.
    pub async fn tasks(self, db: &Database, now: DateTime<Utc>) -> Result<Vec<TaskRow>> {
        let prefilter = self.clone();
        let raw = db
            .reader()
            .call(move |conn| {
                let (sql, params) = prefilter.build_sql();
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(param_refs.as_slice(), raw_task_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut rows: Vec<TaskRow> = raw
            .into_iter()
            .map(|r| r.normalize(now))
            .filter(|task| self.matches(task))
            .map(|task| {
                let is_overdue = task.is_overdue(now);
                TaskRow { task, is_overdue }
            })
            .collect();

        rows.sort_by(|a, b| self.compare(&a.task, &b.task));
        if let Some(limit) = self.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    /// Count matching tasks, limit included.
    pub async fn count(self, db: &Database, now: DateTime<Utc>) -> Result<u64> {
        Ok(self.tasks(db, now).await?.len() as u64)
    }

    pub async fn to_json(self, db: &Database, now: DateTime<Utc>) -> Result<String> {
        let rows = self.tasks(db, now).await?;
        serde_json::to_string_pretty(&rows).map_err(|e| Error::Other(e.to_string()))
    }

    pub async fn to_csv(self, db: &Database, now: DateTime<Utc>) -> Result<String> {
        let rows = self.tasks(db, now).await?;
        let mut out = String::new();
        out.push_str("task_id,title,category,status,assignee_id,assigner_id,due_at,created_at,updated_at,is_overdue\n");
        for row in &rows {
            let t = &row.task;
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{}\n",
                csv_escape(&t.id),
                csv_escape(&t.title),
                csv_escape(&t.category),
                t.status_label(),
                csv_escape(&t.assignee_id),
                csv_escape(&t.assigner_id),
                format_instant(&t.due_at),
                format_instant(&t.created_at),
                format_instant(&t.updated_at),
                row.is_overdue,
            ));
        }
        Ok(out)
    }

    /// Filters evaluated on normalized records.
    fn matches(&self, task: &TaskRecord) -> bool {
        if self.status.is_some_and(|s| task.status != Some(s)) {
            return false;
        }
        if self.overdue_at.is_some_and(|at| !task.is_overdue(at)) {
            return false;
        }
        if self.due_after.is_some_and(|at| task.due_at < at) {
            return false;
        }
        if self.due_before.is_some_and(|at| task.due_at > at) {
            return false;
        }
        true
    }

    fn compare(&self, a: &TaskRecord, b: &TaskRecord) -> Ordering {
        let primary = match self.order_by {
            OrderBy::DueAt => a.due_at.cmp(&b.due_at),
            OrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
            OrderBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            OrderBy::Title => a.title.cmp(&b.title),
        };
        let primary = if self.order_desc { primary.reverse() } else { primary };
        primary.then_with(|| a.id.cmp(&b.id))
    }

    /// SQL for the filters that match stored text exactly. Everything that
    /// depends on parsed instants or classified statuses runs afterwards in
    /// [`TaskQuery::matches`].
    fn build_sql(&self) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut wheres = Vec::new();
        let mut param_idx = 1;

        if let Some(ref id) = self.assignee_id {
            wheres.push(format!("assignee_id = ?{param_idx}"));
            params.push(Box::new(id.clone()));
            param_idx += 1;
        }

        if let Some(ref id) = self.assigner_id {
            wheres.push(format!("assigner_id = ?{param_idx}"));
            params.push(Box::new(id.clone()));
            param_idx += 1;
        }

        if let Some(ref category) = self.category {
            wheres.push(format!("category = ?{param_idx}"));
            params.push(Box::new(category.clone()));
            param_idx += 1;
        }

        if let Some(ref text) = self.search {
            wheres.push(format!(
                "(INSTR(LOWER(COALESCE(title, '')), ?{param_idx}) > 0 \
                 OR INSTR(LOWER(task_id), ?{param_idx}) > 0 \
                 OR INSTR(LOWER(COALESCE(assignee_id, '')), ?{param_idx}) > 0)"
            ));
            params.push(Box::new(text.clone()));
        }

        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks");
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }

        (sql, params)
    }
}

/// Distinct non-empty categories, for filter menus.
pub async fn categories(db: &Database) -> Result<Vec<String>> {
    db.reader()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT category FROM tasks
                 WHERE category IS NOT NULL AND category != ''
                 ORDER BY category",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<std::result::Result<Vec<String>, _>>()
        })
        .await
        .map_err(|e| Error::Database(e.to_string()))
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 9, 12, 0, 0).unwrap()
    }

    fn record(id: &str, title: &str, category: &str, status: TaskStatus, due_in_days: i64) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            category: category.to_string(),
            status: Some(status),
            due_at: now() + Duration::days(due_in_days),
            created_at: now() - Duration::days(10),
            updated_at: now() - Duration::days(10),
            assignee_id: "emp-001".to_string(),
            assigner_id: "lead-001".to_string(),
        }
    }

    async fn seeded() -> Database {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::insert_task(conn, &record("t1", "Design landing page", "Design", TaskStatus::Pending, -2))?;
                repository::insert_task(conn, &record("t2", "Fix login bug", "Development", TaskStatus::InProgress, 3))?;
                repository::insert_task(conn, &record("t3", "Draft contract", "Legal", TaskStatus::Completed, -5))?;
                let mut other = record("t4", "Logo refresh", "Design", TaskStatus::Pending, 1);
                other.assignee_id = "emp-002".into();
                repository::insert_task(conn, &other)?;
                conn.execute(
                    "INSERT INTO tasks (task_id, title, status, assignee_id, assigner_id, due_at)
                     VALUES ('t5', 'Legacy', 'Overdue', 'emp-001', 'lead-001', '2025-01-01T00:00:00Z')",
                    [],
                )?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        db
    }

    fn ids(rows: &[TaskRow]) -> Vec<&str> {
        rows.iter().map(|r| r.task.id.as_str()).collect()
    }

    #[test]
    fn test_build_sql_default() {
        let (sql, params) = TaskQuery::new().build_sql();
        assert!(sql.contains("FROM tasks"));
        assert!(!sql.contains("WHERE"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_sql_only_prefilters_exact_text() {
        let (sql, params) = TaskQuery::new()
            .assignee("emp-001")
            .category("Design")
            .status(TaskStatus::Completed)
            .overdue_at(now())
            .limit(10)
            .build_sql();
        assert!(sql.contains("assignee_id = ?1"));
        assert!(sql.contains("category = ?2"));
        assert!(!sql.contains("status"));
        assert!(!sql.contains("due_at <"));
        assert!(!sql.contains("LIMIT"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_category_all_and_blank_search_clear_filters() {
        let (sql, params) = TaskQuery::new().category("All").search("   ").build_sql();
        assert!(!sql.contains("WHERE"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_order_by_parse() {
        assert_eq!(OrderBy::parse("due").unwrap(), OrderBy::DueAt);
        assert_eq!(OrderBy::parse("Created").unwrap(), OrderBy::CreatedAt);
        assert!(OrderBy::parse("priority; DROP TABLE tasks").is_err());
    }

    #[tokio::test]
    async fn test_filter_by_assignee_and_category() {
        let db = seeded().await;
        let rows = TaskQuery::new()
            .assignee("emp-001")
            .category("Design")
            .tasks(&db, now())
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec!["t1"]);
        assert!(rows[0].is_overdue);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let db = seeded().await;
        let rows = TaskQuery::new().search("LOG").tasks(&db, now()).await.unwrap();
        assert_eq!(ids(&rows), vec!["t4", "t2"]);

        let by_assignee = TaskQuery::new().search("emp-002").count(&db, now()).await.unwrap();
        assert_eq!(by_assignee, 1);
    }

    #[tokio::test]
    async fn test_overdue_filter_excludes_completed() {
        let db = seeded().await;
        let rows = TaskQuery::new().overdue_at(now()).tasks(&db, now()).await.unwrap();
        // t3 is past due but completed; t5 carries the legacy status
        assert_eq!(ids(&rows), vec!["t5", "t1"]);
        assert!(rows.iter().all(|r| r.is_overdue));
    }

    #[tokio::test]
    async fn test_status_filter() {
        let db = seeded().await;
        let pending = TaskQuery::new()
            .status(TaskStatus::Pending)
            .count(&db, now())
            .await
            .unwrap();
        assert_eq!(pending, 2);
        let done = TaskQuery::new()
            .status(TaskStatus::Completed)
            .tasks(&db, now())
            .await
            .unwrap();
        assert_eq!(ids(&done), vec!["t3"]);
    }

    #[tokio::test]
    async fn test_due_window_and_limit() {
        let db = seeded().await;
        let rows = TaskQuery::new()
            .due_after(now())
            .due_before(now() + Duration::days(7))
            .tasks(&db, now())
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec!["t4", "t2"]);

        let first = TaskQuery::new().limit(1).tasks(&db, now()).await.unwrap();
        assert_eq!(ids(&first), vec!["t5"]);
    }

    async fn seeded_irregular() -> Database {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                conn.execute_batch(
                    "INSERT INTO tasks (task_id, title, status, assignee_id, assigner_id, due_at) VALUES
                        ('naive-future', 'Naive', 'Pending', 'emp-001', 'lead-001', '2025-01-09 13:00:00'),
                        ('millis-future', 'Millis', 'pending', 'emp-001', 'lead-001', '1800000000000'),
                        ('done-past', 'Done', 'done', 'emp-001', 'lead-001', '2025-01-02T00:00:00Z'),
                        ('late', 'Late', ' In Progress ', 'emp-001', 'lead-001', '2025-01-09 11:59:59');",
                )
            })
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_overdue_filter_uses_parsed_due_dates() {
        let db = seeded_irregular().await;
        let rows = TaskQuery::new().overdue_at(now()).tasks(&db, now()).await.unwrap();
        assert_eq!(ids(&rows), vec!["late"]);
        assert!(rows.iter().all(|r| r.is_overdue));
        assert_eq!(
            TaskQuery::new().overdue_at(now()).count(&db, now()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_status_filter_uses_classified_status() {
        let db = seeded_irregular().await;
        let done = TaskQuery::new()
            .status(TaskStatus::Completed)
            .tasks(&db, now())
            .await
            .unwrap();
        assert_eq!(ids(&done), vec!["done-past"]);

        let in_progress = TaskQuery::new()
            .status(TaskStatus::InProgress)
            .count(&db, now())
            .await
            .unwrap();
        assert_eq!(in_progress, 1);
    }

    #[tokio::test]
    async fn test_due_order_and_limit_use_parsed_instants() {
        let db = seeded_irregular().await;
        let upcoming = TaskQuery::new().due_after(now()).tasks(&db, now()).await.unwrap();
        assert_eq!(ids(&upcoming), vec!["naive-future", "millis-future"]);

        // The limit applies after filtering
        let first = TaskQuery::new()
            .overdue_at(now())
            .limit(1)
            .tasks(&db, now())
            .await
            .unwrap();
        assert_eq!(ids(&first), vec!["late"]);

        let newest_first = TaskQuery::new().descending().tasks(&db, now()).await.unwrap();
        assert_eq!(newest_first[0].task.id, "millis-future");
    }

    #[tokio::test]
    async fn test_csv_and_json_output() {
        let db = seeded().await;
        let csv = TaskQuery::new().assignee("emp-002").to_csv(&db, now()).await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("t4,Logo refresh,Design,Pending,emp-002"));

        let json = TaskQuery::new().assignee("emp-002").to_json(&db, now()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["id"], "t4");
        assert_eq!(parsed[0]["is_overdue"], false);
    }

    #[tokio::test]
    async fn test_categories() {
        let db = seeded().await;
        assert_eq!(
            categories(&db).await.unwrap(),
            vec!["Design", "Development", "Legal"]
        );
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("hello"), "hello");
        assert_eq!(csv_escape("hello,world"), "\"hello,world\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
