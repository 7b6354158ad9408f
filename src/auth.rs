//! Role gating for task operations and dashboard routes.
//!
//! Everything here is a pure function of the identity passed in; there is no
//! ambient "current user".

use crate::error::{Error, Result};
use crate::model::{Identity, Role, TaskRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateTask,
    EditTask,
    DeleteTask,
    UpdateStatus,
    ViewTask,
}

impl Action {
    fn describe(&self) -> &'static str {
        match self {
            Action::CreateTask => "create tasks",
            Action::EditTask => "edit this task",
            Action::DeleteTask => "delete this task",
            Action::UpdateStatus => "update the status of this task",
            Action::ViewTask => "view this task",
        }
    }
}

/// Check whether `identity` may perform `action`, optionally on `task`.
///
/// - Creating tasks is lead-only.
/// - Editing and deleting is limited to the lead who assigned the task.
/// - Status updates are open to the assignee and the assigning lead.
/// - Viewing is open to the assignee and the assigner.
pub fn authorize(identity: &Identity, action: Action, task: Option<&TaskRecord>) -> Result<()> {
    let is_assignee = task.is_some_and(|t| t.assignee_id == identity.employee_id);
    let is_assigner = task.is_some_and(|t| t.assigner_id == identity.employee_id);

    let allowed = match action {
        Action::CreateTask => identity.is_lead(),
        Action::EditTask | Action::DeleteTask => identity.is_lead() && is_assigner,
        Action::UpdateStatus => is_assignee || (identity.is_lead() && is_assigner),
        Action::ViewTask => is_assignee || is_assigner,
    };

    if allowed {
        Ok(())
    } else {
        log::warn!(
            "{} ({}) denied: {}{}",
            identity.employee_id,
            identity.role,
            action.describe(),
            task.map(|t| format!(" [{}]", t.id)).unwrap_or_default()
        );
        Err(Error::Forbidden(format!(
            "{} {} may not {}",
            identity.role,
            identity.employee_id,
            action.describe()
        )))
    }
}

/// Landing page for a role.
pub fn home_route(role: Role) -> &'static str {
    match role {
        Role::Lead => "/lead/dashboard",
        Role::Employee => "/employee/dashboard",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect(String),
}

const PUBLIC_ROUTES: [&str; 3] = ["/", "/login", "/signup"];

fn is_under(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

/// Decide whether `identity` may open `path`.
///
/// Public pages are open to everyone. Anyone else unauthenticated goes to
/// `/`. Leads are kept under `/lead`, employees under `/employee`.
pub fn route_guard(identity: Option<&Identity>, path: &str) -> RouteDecision {
    let is_public = PUBLIC_ROUTES
        .iter()
        .any(|p| path == *p || (*p != "/" && is_under(path, p)));
    if is_public {
        return RouteDecision::Allow;
    }

    let Some(identity) = identity else {
        return RouteDecision::Redirect("/".to_string());
    };

    let area = match identity.role {
        Role::Lead => "/lead",
        Role::Employee => "/employee",
    };
    if is_under(path, area) {
        RouteDecision::Allow
    } else {
        RouteDecision::Redirect(home_route(identity.role).to_string())
    }
}
