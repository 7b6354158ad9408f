use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::date_util::format_instant;
use crate::model::{NewUser, RawTask, Role, TaskRecord, TaskStatus, User};

// ── Users ──────────────────────────────────────────────────────────

pub fn upsert_user(conn: &Connection, user: &NewUser) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO users (uid, email, name, role, employee_id)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(uid) DO UPDATE SET
            email=excluded.email, name=excluded.name,
            role=excluded.role, employee_id=excluded.employee_id",
        params![
            user.uid,
            user.email,
            user.name,
            user.role.as_str(),
            user.employee_id,
        ],
    )?;
    Ok(())
}

const USER_COLUMNS: &str = "uid, email, name, role, employee_id, created_at";

fn user_from_row(row: &Row<'_>) -> Result<User, rusqlite::Error> {
    let role: Option<String> = row.get(3)?;
    Ok(User {
        uid: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: Role::from_stored(role.as_deref()),
        employee_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn get_user(conn: &Connection, uid: &str) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ?1"),
        params![uid],
        user_from_row,
    )
    .optional()
}

pub fn get_user_by_employee_id(
    conn: &Connection,
    employee_id: &str,
) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE employee_id = ?1"),
        params![employee_id],
        user_from_row,
    )
    .optional()
}

/// List users, optionally restricted to one role, ordered by name.
pub fn list_users(conn: &Connection, role: Option<Role>) -> Result<Vec<User>, rusqlite::Error> {
    let (sql, role_param) = match role {
        Some(r) => (
            format!("SELECT {USER_COLUMNS} FROM users WHERE role = ?1 ORDER BY name"),
            Some(r.as_str()),
        ),
        None => (format!("SELECT {USER_COLUMNS} FROM users ORDER BY name"), None),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = match role_param {
        Some(r) => stmt.query_map(params![r], user_from_row)?,
        None => stmt.query_map([], user_from_row)?,
    };
    rows.collect()
}

// ── Tasks ──────────────────────────────────────────────────────────

/// Which person column a task lookup matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
    Assignee,
    Assigner,
}

impl TaskField {
    pub fn column(&self) -> &'static str {
        match self {
            TaskField::Assignee => "assignee_id",
            TaskField::Assigner => "assigner_id",
        }
    }
}

pub(crate) const TASK_COLUMNS: &str = "task_id, title, description, category, status, \
     assignee_id, assigner_id, due_at, created_at, updated_at";

pub(crate) fn raw_task_from_row(row: &Row<'_>) -> Result<RawTask, rusqlite::Error> {
    Ok(RawTask {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        status: row.get(4)?,
        assignee_id: row.get(5)?,
        assigner_id: row.get(6)?,
        due_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn insert_task(conn: &Connection, task: &TaskRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO tasks (
            task_id, title, description, category, status,
            assignee_id, assigner_id, due_at, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            task.id,
            task.title,
            task.description,
            task.category,
            task.status.map(|s| s.as_str()),
            task.assignee_id,
            task.assigner_id,
            format_instant(&task.due_at),
            format_instant(&task.created_at),
            format_instant(&task.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_task(conn: &Connection, task_id: &str) -> Result<Option<RawTask>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"),
        params![task_id],
        raw_task_from_row,
    )
    .optional()
}

/// Overwrite every mutable column of an existing task. Returns false if
/// the task does not exist.
pub fn update_task(conn: &Connection, task: &TaskRecord) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "UPDATE tasks SET
            title = ?2, description = ?3, category = ?4, status = ?5,
            assignee_id = ?6, due_at = ?7, updated_at = ?8
         WHERE task_id = ?1",
        params![
            task.id,
            task.title,
            task.description,
            task.category,
            task.status.map(|s| s.as_str()),
            task.assignee_id,
            format_instant(&task.due_at),
            format_instant(&task.updated_at),
        ],
    )?;
    Ok(n > 0)
}

pub fn update_task_status(
    conn: &Connection,
    task_id: &str,
    status: TaskStatus,
    updated_at: &str,
) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE task_id = ?1",
        params![task_id, status.as_str(), updated_at],
    )?;
    Ok(n > 0)
}

pub fn delete_task(conn: &Connection, task_id: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM tasks WHERE task_id = ?1", params![task_id])?;
    Ok(n > 0)
}

/// All tasks where `field` equals `id`, soonest due first.
pub fn fetch_tasks_where(
    conn: &Connection,
    field: TaskField,
    id: &str,
) -> Result<Vec<RawTask>, rusqlite::Error> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE {} = ?1 ORDER BY due_at ASC, task_id ASC",
        field.column()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![id], raw_task_from_row)?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO app_config (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}
