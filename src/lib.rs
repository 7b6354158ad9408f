pub mod auth;
pub mod date_util;
pub mod error;
pub mod model;
pub mod query;
pub mod stats;
pub mod storage;
pub mod week;

pub use auth::{authorize, home_route, route_guard, Action, RouteDecision};
pub use error::{Error, Result};
pub use model::{
    is_overdue, Identity, NewTask, NewUser, RawTask, Role, TaskRecord, TaskStatus, TaskUpdate,
    User,
};
pub use query::{OrderBy, TaskQuery, TaskRow};
pub use stats::{
    compute_stats, compute_stats_now, compute_week_stats, Dashboard, DashboardOptions,
    StatsSummary, StatusBreakdown,
};
pub use storage::Database;
pub use week::{end_of_week, start_of_week, Week};

use chrono::{DateTime, Utc};

use storage::repository::{self, TaskField};

/// Config key holding the uid the CLI acts as by default.
pub const CURRENT_UID_KEY: &str = "current_uid";

/// Counts for `taskdash status`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoreSummary {
    pub users: u64,
    pub leads: u64,
    pub tasks: u64,
    /// Tasks whose stored status does not classify, as the dashboards see it.
    pub unclassified: u64,
    pub categories: Vec<String>,
}

/// Main entry point for the task dashboard.
///
/// Every task operation takes the acting [`Identity`] explicitly.
pub struct TaskDash {
    db: Database,
}

impl TaskDash {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Users ──────────────────────────────────────────────────────

    pub async fn register_user(&self, user: NewUser) -> Result<User> {
        if user.uid.trim().is_empty() {
            return Err(Error::Validation("uid must not be empty".into()));
        }
        if user.employee_id.trim().is_empty() {
            return Err(Error::Validation("employee ID must not be empty".into()));
        }

        let uid = user.uid.clone();
        let stored = self
            .db
            .writer()
            .call(move |conn| {
                if let Some(existing) = repository::get_user_by_employee_id(conn, &user.employee_id)? {
                    if existing.uid != user.uid {
                        return Ok(Err(Error::Validation(format!(
                            "employee ID {} already belongs to {}",
                            user.employee_id, existing.uid
                        ))));
                    }
                }
                repository::upsert_user(conn, &user)?;
                Ok::<_, rusqlite::Error>(Ok(repository::get_user(conn, &user.uid)?))
            })
            .await??;

        log::info!("Registered user {uid}");
        stored.ok_or_else(|| Error::NotFound(format!("user {uid}")))
    }

    pub async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        self.db
            .reader()
            .call(move |conn| repository::list_users(conn, role))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Look up `uid` and resolve it into an explicit identity.
    pub async fn resolve_identity(&self, uid: &str) -> Result<Identity> {
        let user = self
            .db
            .reader()
            .call({
                let uid = uid.to_string();
                move |conn| repository::get_user(conn, &uid)
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {uid}")))?;
        Identity::try_from(user)
    }

    // ── Tasks ──────────────────────────────────────────────────────

    /// Create a task assigned by `identity` (a lead) to a registered employee.
    pub async fn create_task(
        &self,
        identity: &Identity,
        task: NewTask,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord> {
        authorize(identity, Action::CreateTask, None)?;
        if task.title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".into()));
        }
        self.ensure_employee_exists(&task.assignee_id).await?;

        let record = TaskRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: task.title.trim().to_string(),
            description: task.description,
            category: task.category,
            status: Some(task.status),
            due_at: task.due_at,
            created_at: now,
            updated_at: now,
            assignee_id: task.assignee_id,
            assigner_id: identity.employee_id.clone(),
        };

        self.db
            .writer()
            .call({
                let record = record.clone();
                move |conn| repository::insert_task(conn, &record)
            })
            .await?;

        log::info!(
            "{} created task {} for {}",
            identity.employee_id,
            record.id,
            record.assignee_id
        );
        Ok(record)
    }

    /// Fetch a task the identity is involved in.
    pub async fn task(&self, identity: &Identity, task_id: &str, now: DateTime<Utc>) -> Result<TaskRecord> {
        let task = self.load_task(task_id, now).await?;
        authorize(identity, Action::ViewTask, Some(&task))?;
        Ok(task)
    }

    /// Apply a lead's edit to a task they assigned.
    pub async fn edit_task(
        &self,
        identity: &Identity,
        task_id: &str,
        update: TaskUpdate,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord> {
        let mut task = self.load_task(task_id, now).await?;
        authorize(identity, Action::EditTask, Some(&task))?;

        if update.is_empty() {
            return Ok(task);
        }
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(Error::Validation("title must not be empty".into()));
        }
        if let Some(ref assignee) = update.assignee_id {
            self.ensure_employee_exists(assignee).await?;
        }

        update.apply(&mut task);
        task.updated_at = now;

        let updated = self
            .db
            .writer()
            .call({
                let task = task.clone();
                move |conn| repository::update_task(conn, &task)
            })
            .await?;
        if !updated {
            return Err(Error::NotFound(format!("task {task_id}")));
        }
        Ok(task)
    }

    /// Change the status of a task. Open to its assignee and assigning lead.
    pub async fn set_status(
        &self,
        identity: &Identity,
        task_id: &str,
        status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord> {
        let mut task = self.load_task(task_id, now).await?;
        authorize(identity, Action::UpdateStatus, Some(&task))?;

        let updated = self
            .db
            .writer()
            .call({
                let task_id = task_id.to_string();
                let stamp = date_util::format_instant(&now);
                move |conn| repository::update_task_status(conn, &task_id, status, &stamp)
            })
            .await?;
        if !updated {
            return Err(Error::NotFound(format!("task {task_id}")));
        }

        log::debug!("{} set task {} to {}", identity.employee_id, task_id, status);
        task.status = Some(status);
        task.updated_at = now;
        Ok(task)
    }

    pub async fn delete_task(&self, identity: &Identity, task_id: &str, now: DateTime<Utc>) -> Result<()> {
        let task = self.load_task(task_id, now).await?;
        authorize(identity, Action::DeleteTask, Some(&task))?;

        let deleted = self
            .db
            .writer()
            .call({
                let task_id = task_id.to_string();
                move |conn| repository::delete_task(conn, &task_id)
            })
            .await?;
        if !deleted {
            return Err(Error::NotFound(format!("task {task_id}")));
        }
        log::info!("{} deleted task {}", identity.employee_id, task_id);
        Ok(())
    }

    /// The identity's task list: tasks assigned to an employee, or tasks a
    /// lead assigned. Soonest due first.
    pub async fn tasks_for(&self, identity: &Identity, now: DateTime<Utc>) -> Result<Vec<TaskRecord>> {
        let field = match identity.role {
            Role::Employee => TaskField::Assignee,
            Role::Lead => TaskField::Assigner,
        };
        let raw = self
            .db
            .reader()
            .call({
                let id = identity.employee_id.clone();
                move |conn| repository::fetch_tasks_where(conn, field, &id)
            })
            .await?;
        Ok(raw.into_iter().map(|r| r.normalize(now)).collect())
    }

    /// A [`TaskQuery`] pre-scoped to the identity's task list.
    pub fn query_for(&self, identity: &Identity) -> TaskQuery {
        match identity.role {
            Role::Employee => TaskQuery::new().assignee(&identity.employee_id),
            Role::Lead => TaskQuery::new().assigner(&identity.employee_id),
        }
    }

    // ── Dashboards ─────────────────────────────────────────────────

    pub async fn stats(&self, identity: &Identity, now: DateTime<Utc>) -> Result<StatsSummary> {
        let tasks = self.tasks_for(identity, now).await?;
        Ok(compute_stats(&tasks, now))
    }

    /// Stats with the weekly deltas taken over `week`.
    pub async fn week_stats(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
        week: Week,
    ) -> Result<StatsSummary> {
        let tasks = self.tasks_for(identity, now).await?;
        Ok(compute_week_stats(&tasks, now, week))
    }

    pub async fn dashboard(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
        options: &DashboardOptions,
    ) -> Result<Dashboard> {
        let tasks = self.tasks_for(identity, now).await?;
        Ok(stats::build_dashboard(identity, &tasks, now, options))
    }

    pub async fn upcoming_deadlines(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TaskRecord>> {
        let tasks = self.tasks_for(identity, now).await?;
        Ok(stats::upcoming_deadlines(&tasks, now, limit))
    }

    /// Whole-store counts. Task statuses go through the same normalization
    /// as every dashboard figure.
    pub async fn store_summary(&self, now: DateTime<Utc>) -> Result<StoreSummary> {
        let (users, leads) = self
            .db
            .reader()
            .call(|conn| {
                let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
                let leads: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE role = 'lead'",
                    [],
                    |row| row.get(0),
                )?;
                Ok::<_, rusqlite::Error>((users as u64, leads as u64))
            })
            .await?;

        let tasks = TaskQuery::new().tasks(&self.db, now).await?;
        let unclassified = tasks.iter().filter(|row| row.task.status.is_none()).count() as u64;

        Ok(StoreSummary {
            users,
            leads,
            tasks: tasks.len() as u64,
            unclassified,
            categories: query::categories(&self.db).await?,
        })
    }

    // ── Config ─────────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Internal ───────────────────────────────────────────────────

    async fn load_task(&self, task_id: &str, now: DateTime<Utc>) -> Result<TaskRecord> {
        let raw = self
            .db
            .reader()
            .call({
                let task_id = task_id.to_string();
                move |conn| repository::get_task(conn, &task_id)
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        Ok(raw.normalize(now))
    }

    async fn ensure_employee_exists(&self, employee_id: &str) -> Result<()> {
        let user = self
            .db
            .reader()
            .call({
                let employee_id = employee_id.to_string();
                move |conn| repository::get_user_by_employee_id(conn, &employee_id)
            })
            .await?;
        match user {
            Some(u) if u.role == Role::Employee => Ok(()),
            Some(_) => Err(Error::Validation(format!(
                "{employee_id} is not an employee"
            ))),
            None => Err(Error::NotFound(format!("employee {employee_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 9, 12, 0, 0).unwrap()
    }

    fn new_user(uid: &str, role: Role, employee_id: &str) -> NewUser {
        NewUser {
            uid: uid.to_string(),
            email: format!("{uid}@example.com"),
            name: format!("User {uid}"),
            role,
            employee_id: employee_id.to_string(),
        }
    }

    fn new_task(title: &str, assignee: &str, due_in_days: i64) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: String::new(),
            category: "Development".to_string(),
            assignee_id: assignee.to_string(),
            due_at: now() + Duration::days(due_in_days),
            status: TaskStatus::Pending,
        }
    }

    async fn setup() -> (TaskDash, Identity, Identity) {
        let dw = TaskDash::new(Database::open_memory().await.unwrap());
        dw.register_user(new_user("u-lead", Role::Lead, "lead-001")).await.unwrap();
        dw.register_user(new_user("u-emp", Role::Employee, "emp-001")).await.unwrap();
        dw.register_user(new_user("u-emp2", Role::Employee, "emp-002")).await.unwrap();
        let lead = dw.resolve_identity("u-lead").await.unwrap();
        let emp = dw.resolve_identity("u-emp").await.unwrap();
        (dw, lead, emp)
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_employee_id() {
        let (dw, _, _) = setup().await;
        let err = dw
            .register_user(new_user("u-other", Role::Employee, "emp-001"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(dw.list_users(Some(Role::Employee)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_unknown_user() {
        let (dw, _, _) = setup().await;
        assert!(matches!(
            dw.resolve_identity("ghost").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_task_flow() {
        let (dw, lead, emp) = setup().await;

        let created = dw
            .create_task(&lead, new_task("  Ship it ", "emp-001", 3), now())
            .await
            .unwrap();
        assert_eq!(created.title, "Ship it");
        assert_eq!(created.assigner_id, "lead-001");
        assert_eq!(created.created_at, now());

        let fetched = dw.task(&emp, &created.id, now()).await.unwrap();
        assert_eq!(fetched, created);

        assert_eq!(dw.tasks_for(&emp, now()).await.unwrap().len(), 1);
        assert_eq!(dw.tasks_for(&lead, now()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_task_validation() {
        let (dw, lead, emp) = setup().await;

        assert!(matches!(
            dw.create_task(&emp, new_task("Nope", "emp-002", 1), now()).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            dw.create_task(&lead, new_task("   ", "emp-001", 1), now()).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            dw.create_task(&lead, new_task("Ghost", "emp-404", 1), now()).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            dw.create_task(&lead, new_task("Self", "lead-001", 1), now()).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_employee_updates_own_status_only() {
        let (dw, lead, emp) = setup().await;
        let mine = dw.create_task(&lead, new_task("Mine", "emp-001", 2), now()).await.unwrap();
        let theirs = dw.create_task(&lead, new_task("Theirs", "emp-002", 2), now()).await.unwrap();

        let later = now() + Duration::hours(1);
        let updated = dw
            .set_status(&emp, &mine.id, TaskStatus::Completed, later)
            .await
            .unwrap();
        assert!(updated.is_completed());
        assert_eq!(updated.updated_at, later);

        let stored = dw.task(&lead, &mine.id, later).await.unwrap();
        assert_eq!(stored.status, Some(TaskStatus::Completed));

        assert!(matches!(
            dw.set_status(&emp, &theirs.id, TaskStatus::Completed, later).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            dw.task(&emp, &theirs.id, later).await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_and_delete() {
        let (dw, lead, emp) = setup().await;
        let t = dw.create_task(&lead, new_task("Draft", "emp-001", 2), now()).await.unwrap();

        let update = TaskUpdate {
            title: Some("Final".into()),
            assignee_id: Some("emp-002".into()),
            ..Default::default()
        };
        assert!(matches!(
            dw.edit_task(&emp, &t.id, update.clone(), now()).await,
            Err(Error::Forbidden(_))
        ));
        let edited = dw.edit_task(&lead, &t.id, update, now()).await.unwrap();
        assert_eq!(edited.title, "Final");
        assert_eq!(edited.assignee_id, "emp-002");
        // Reassigned away from emp-001
        assert!(dw.tasks_for(&emp, now()).await.unwrap().is_empty());

        assert!(matches!(
            dw.delete_task(&emp, &t.id, now()).await,
            Err(Error::Forbidden(_))
        ));
        dw.delete_task(&lead, &t.id, now()).await.unwrap();
        assert!(matches!(
            dw.task(&lead, &t.id, now()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_and_dashboard() {
        let (dw, lead, emp) = setup().await;
        let a = dw.create_task(&lead, new_task("A", "emp-001", -1), now() - Duration::days(20)).await.unwrap();
        dw.create_task(&lead, new_task("B", "emp-001", 1), now() - Duration::days(20)).await.unwrap();
        let c = dw.create_task(&lead, new_task("C", "emp-001", -1), now() - Duration::days(20)).await.unwrap();
        dw.create_task(&lead, new_task("D", "emp-002", 5), now()).await.unwrap();
        dw.set_status(&emp, &a.id, TaskStatus::Completed, now()).await.unwrap();
        dw.set_status(&emp, &c.id, TaskStatus::InProgress, now()).await.unwrap();

        let s = dw.stats(&emp, now()).await.unwrap();
        assert_eq!((s.total, s.completed, s.in_progress, s.overdue), (3, 1, 2, 1));

        let lead_stats = dw.stats(&lead, now()).await.unwrap();
        assert_eq!(lead_stats.total, 4);
        assert_eq!(lead_stats.assigned_this_week, 1);

        let three_weeks_ago = Week::parse("2024-W51", now()).unwrap();
        let earlier = dw.week_stats(&lead, now(), three_weeks_ago).await.unwrap();
        assert_eq!(earlier.total, 4);
        assert_eq!(earlier.assigned_this_week, 3);

        let d = dw.dashboard(&lead, now(), &DashboardOptions::default()).await.unwrap();
        assert_eq!(d.completion_rates.len(), 2);
        assert_eq!(d.upcoming.len(), 2);

        let upcoming = dw.upcoming_deadlines(&emp, now(), 5).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].title, "B");
    }

    #[tokio::test]
    async fn test_query_for_scopes_by_role() {
        let (dw, lead, emp) = setup().await;
        dw.create_task(&lead, new_task("Mine", "emp-001", 2), now()).await.unwrap();
        dw.create_task(&lead, new_task("Theirs", "emp-002", 2), now()).await.unwrap();

        assert_eq!(dw.query_for(&emp).count(dw.db(), now()).await.unwrap(), 1);
        assert_eq!(dw.query_for(&lead).count(dw.db(), now()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_store_summary_classifies_like_stats() {
        let (dw, lead, _) = setup().await;
        dw.create_task(&lead, new_task("Ship", "emp-001", 2), now()).await.unwrap();
        dw.db()
            .writer()
            .call(|conn| {
                conn.execute_batch(
                    "INSERT INTO tasks (task_id, status, assignee_id, assigner_id) VALUES
                        ('x1', ' done ', 'emp-001', 'lead-001'),
                        ('x2', 'in-progress', 'emp-001', 'lead-001'),
                        ('x3', 'InProgress', 'emp-001', 'lead-001'),
                        ('x4', 'Overdue', 'emp-001', 'lead-001');",
                )
            })
            .await
            .unwrap();

        let summary = dw.store_summary(now()).await.unwrap();
        assert_eq!((summary.users, summary.leads), (3, 1));
        assert_eq!(summary.tasks, 5);
        assert_eq!(summary.categories, vec!["Development".to_string()]);

        let stats = dw.stats(&lead, now()).await.unwrap();
        assert_eq!(summary.unclassified, stats.unclassified);
        assert_eq!(summary.unclassified, 1);
    }

    #[tokio::test]
    async fn test_config() {
        let (dw, _, _) = setup().await;
        assert_eq!(dw.config_get(CURRENT_UID_KEY).await.unwrap(), None);
        dw.config_set(CURRENT_UID_KEY, "u-emp").await.unwrap();
        assert_eq!(
            dw.config_get(CURRENT_UID_KEY).await.unwrap(),
            Some("u-emp".to_string())
        );
        assert_eq!(dw.config_list().await.unwrap().len(), 1);
    }
}
