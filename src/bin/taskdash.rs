use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use taskdash::date_util::{format_instant, parse_instant};
use taskdash::{
    DashboardOptions, Database, Identity, NewTask, NewUser, OrderBy, Role, TaskDash, TaskRecord,
    TaskStatus, TaskUpdate, Week, CURRENT_UID_KEY,
};

#[derive(Parser)]
#[command(name = "taskdash", about = "Task assignment dashboard CLI")]
struct Cli {
    /// Database path (default: ~/.taskdash/taskdash.db)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Act as this user uid (default: the logged-in user)
    #[arg(long = "as", value_name = "UID", global = true)]
    as_uid: Option<String>,

    /// Evaluate dates against this instant instead of the clock (RFC 3339)
    #[arg(long, global = true)]
    now: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Set the default user for subsequent commands
    Login {
        uid: String,
    },
    /// Show the current identity
    Whoami,
    /// Create, list and update tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Summary counts and this week's deltas
    Stats {
        /// Week for the deltas: YYYY-Www, this, or last
        #[arg(long, default_value = "this")]
        week: String,
        #[arg(long)]
        json: bool,
    },
    /// Full dashboard: summary, status breakdown, deadlines and trends
    Dashboard {
        /// Week for the deltas and the end of the timeline: YYYY-Www, this, or last
        #[arg(long, default_value = "this")]
        week: String,
        /// Weeks of assigned/completed history
        #[arg(long, default_value = "6", value_parser = clap::value_parser!(u32).range(1..=taskdash::stats::MAX_WEEKS as i64))]
        weeks: u32,
        /// Days of completion history
        #[arg(long, default_value = "7", value_parser = clap::value_parser!(u32).range(1..=taskdash::stats::MAX_DAYS as i64))]
        days: u32,
        /// Number of upcoming deadlines
        #[arg(long, default_value = "5")]
        upcoming: usize,
        #[arg(long)]
        json: bool,
    },
    /// Upcoming deadlines, soonest first
    Deadlines {
        #[arg(long, default_value = "5")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show database status
    Status,
}

#[derive(Subcommand)]
enum UserAction {
    /// Register or update a user
    Add {
        uid: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// employee or lead
        #[arg(long, default_value = "employee")]
        role: String,
        #[arg(long)]
        employee_id: String,
    },
    /// List users
    List {
        /// Filter by role: employee or lead
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Assign a new task (leads only)
    Create {
        #[arg(long)]
        title: String,
        /// Assignee employee ID
        #[arg(long)]
        assignee: String,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "Pending")]
        status: String,
        #[arg(long)]
        json: bool,
    },
    /// List your tasks
    List {
        /// Pending, In Progress or Completed
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Match title, task ID or assignee ID
        #[arg(long)]
        search: Option<String>,
        /// Overdue tasks only
        #[arg(long)]
        overdue: bool,
        /// Sort by: due, created, updated, title
        #[arg(long, default_value = "due")]
        sort: String,
        #[arg(long)]
        desc: bool,
        #[arg(long, default_value = "100")]
        limit: u32,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        csv: bool,
        /// Count only (no output rows)
        #[arg(long)]
        count: bool,
    },
    /// Show one task
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Update a task's status
    Status { id: String, status: String },
    /// Edit a task you assigned (leads only)
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Delete a task you assigned (leads only)
    Delete { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn parse_date_arg(name: &str, value: &str) -> anyhow::Result<DateTime<Utc>> {
    parse_instant(value).ok_or_else(|| anyhow::anyhow!("invalid {name}: '{value}'"))
}

/// Resolve who we are acting as: `--as` first, then the logged-in uid.
async fn current_identity(dash: &TaskDash, as_uid: Option<&str>) -> anyhow::Result<Identity> {
    let uid = match as_uid {
        Some(uid) => uid.to_string(),
        None => dash
            .config_get(CURRENT_UID_KEY)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Not logged in. Run 'taskdash login <uid>' or pass --as."))?,
    };
    Ok(dash.resolve_identity(&uid).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let now = match cli.now.as_deref() {
        Some(s) => parse_date_arg("--now", s)?,
        None => Utc::now(),
    };

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };
    let dash = TaskDash::new(db);
    let as_uid = cli.as_uid.as_deref();

    match cli.command {
        Commands::Status => print_status(&dash, now).await?,
        Commands::Config { action } => handle_config(&dash, action).await?,
        Commands::User { action } => handle_user(&dash, action).await?,
        Commands::Login { uid } => {
            let identity = dash.resolve_identity(&uid).await?;
            dash.config_set(CURRENT_UID_KEY, &uid).await?;
            println!(
                "Logged in as {} ({} {})",
                identity.name, identity.role, identity.employee_id
            );
            println!("Home: {}", taskdash::home_route(identity.role));
        }
        Commands::Whoami => {
            let identity = current_identity(&dash, as_uid).await?;
            println!("{} <{}>", identity.name, identity.uid);
            println!("  Role:        {}", identity.role);
            println!("  Employee ID: {}", identity.employee_id);
        }
        Commands::Task { action } => {
            let identity = current_identity(&dash, as_uid).await?;
            handle_task(&dash, &identity, action, now).await?;
        }
        Commands::Stats { week, json } => {
            let identity = current_identity(&dash, as_uid).await?;
            let week = Week::parse(&week, now)?;
            let stats = dash.week_stats(&identity, now, week).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Stats for {} ({week})", identity.employee_id);
                print_summary(&stats);
            }
        }
        Commands::Dashboard {
            week,
            weeks,
            days,
            upcoming,
            json,
        } => {
            let identity = current_identity(&dash, as_uid).await?;
            let options = DashboardOptions {
                upcoming_limit: upcoming,
                days,
                weeks,
                week: Some(Week::parse(&week, now)?),
            };
            let d = dash.dashboard(&identity, now, &options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&d)?);
            } else {
                print_dashboard(&d, now);
            }
        }
        Commands::Deadlines { limit, json } => {
            let identity = current_identity(&dash, as_uid).await?;
            let tasks = dash.upcoming_deadlines(&identity, now, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No upcoming deadlines.");
            } else {
                for t in &tasks {
                    print_task_line(t, now);
                }
            }
        }
    }

    Ok(())
}

async fn print_status(dash: &TaskDash, now: DateTime<Utc>) -> anyhow::Result<()> {
    let summary = dash.store_summary(now).await?;
    println!("Database Status");
    println!("  Users:        {} ({} leads)", summary.users, summary.leads);
    println!("  Tasks:        {}", summary.tasks);
    println!("  Unclassified: {}", summary.unclassified);
    if !summary.categories.is_empty() {
        println!("  Categories:   {}", summary.categories.join(", "));
    }
    Ok(())
}

async fn handle_config(dash: &TaskDash, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match dash.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            dash.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = dash.config_list().await?;
            if items.is_empty() {
                println!("No config values set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn handle_user(dash: &TaskDash, action: UserAction) -> anyhow::Result<()> {
    match action {
        UserAction::Add {
            uid,
            email,
            name,
            role,
            employee_id,
        } => {
            let user = dash
                .register_user(NewUser {
                    uid,
                    email,
                    name,
                    role: Role::parse(&role)?,
                    employee_id,
                })
                .await?;
            println!("Registered {} ({}) as {}", user.name, user.uid, user.role);
        }
        UserAction::List { role, json } => {
            let role = role.as_deref().map(Role::parse).transpose()?;
            let users = dash.list_users(role).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else if users.is_empty() {
                println!("No users registered.");
            } else {
                for u in &users {
                    println!(
                        "{:<10} {:<12} {} <{}> [{}]",
                        u.role,
                        u.employee_id.as_deref().unwrap_or("-"),
                        u.name,
                        u.email,
                        u.uid
                    );
                }
            }
        }
    }
    Ok(())
}

async fn handle_task(
    dash: &TaskDash,
    identity: &Identity,
    action: TaskAction,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    match action {
        TaskAction::Create {
            title,
            assignee,
            due,
            description,
            category,
            status,
            json,
        } => {
            let task = NewTask {
                title,
                description,
                category,
                assignee_id: assignee,
                due_at: parse_date_arg("--due", &due)?,
                status: TaskStatus::parse(&status)?,
            };
            let created = dash.create_task(identity, task, now).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&created)?);
            } else {
                println!("Created task {}", created.id);
            }
        }
        TaskAction::List {
            status,
            category,
            search,
            overdue,
            sort,
            desc,
            limit,
            json,
            csv,
            count,
        } => {
            let mut query = dash
                .query_for(identity)
                .limit(limit)
                .order_by(OrderBy::parse(&sort)?);
            if desc {
                query = query.descending();
            }
            if let Some(s) = status {
                query = query.status(TaskStatus::parse(&s)?);
            }
            if let Some(c) = category {
                query = query.category(&c);
            }
            if let Some(s) = search {
                query = query.search(&s);
            }
            if overdue {
                query = query.overdue_at(now);
            }

            if count {
                println!("{}", query.count(dash.db(), now).await?);
            } else if json {
                println!("{}", query.to_json(dash.db(), now).await?);
            } else if csv {
                print!("{}", query.to_csv(dash.db(), now).await?);
            } else {
                let rows = query.tasks(dash.db(), now).await?;
                if rows.is_empty() {
                    println!("No tasks found.");
                } else {
                    for row in &rows {
                        print_task_line(&row.task, now);
                    }
                    println!("\n{} tasks", rows.len());
                }
            }
        }
        TaskAction::Show { id, json } => {
            let task = dash.task(identity, &id, now).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                print_task_detail(&task, now);
            }
        }
        TaskAction::Status { id, status } => {
            let status = TaskStatus::parse(&status)?;
            let task = dash.set_status(identity, &id, status, now).await?;
            println!("{} is now {}", task.id, task.status_label());
        }
        TaskAction::Edit {
            id,
            title,
            description,
            category,
            assignee,
            due,
            status,
        } => {
            let update = TaskUpdate {
                title,
                description,
                category,
                assignee_id: assignee,
                due_at: due.as_deref().map(|d| parse_date_arg("--due", d)).transpose()?,
                status: status.as_deref().map(TaskStatus::parse).transpose()?,
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to change. Pass at least one field to edit.");
            }
            let task = dash.edit_task(identity, &id, update, now).await?;
            print_task_detail(&task, now);
        }
        TaskAction::Delete { id } => {
            dash.delete_task(identity, &id, now).await?;
            println!("Deleted task {id}");
        }
    }
    Ok(())
}

fn print_task_line(t: &TaskRecord, now: DateTime<Utc>) {
    let flag = if t.is_overdue(now) { " OVERDUE" } else { "" };
    println!(
        "[{}{flag}] {} ({}) - {} | {} | due: {}",
        t.status_label(),
        t.title,
        t.id,
        t.assignee_id,
        t.category,
        t.due_at.format("%Y-%m-%d")
    );
}

fn print_task_detail(t: &TaskRecord, now: DateTime<Utc>) {
    println!("{}", t.title);
    println!("  ID:          {}", t.id);
    println!("  Status:      {}", t.status_label());
    if t.is_overdue(now) {
        println!("  Overdue:     yes");
    }
    println!("  Category:    {}", t.category);
    println!("  Assignee:    {}", t.assignee_id);
    println!("  Assigner:    {}", t.assigner_id);
    println!("  Due:         {}", format_instant(&t.due_at));
    println!("  Created:     {}", format_instant(&t.created_at));
    println!("  Updated:     {}", format_instant(&t.updated_at));
    if !t.description.is_empty() {
        println!("\n{}", t.description);
    }
}

fn print_summary(s: &taskdash::StatsSummary) {
    println!("  Total:        {}", s.total);
    println!(
        "  Completed:    {} (+{} this week)",
        s.completed, s.completed_this_week
    );
    println!(
        "  In progress:  {} (+{} this week)",
        s.in_progress, s.new_in_progress_this_week
    );
    println!(
        "  Overdue:      {} ({} due this week)",
        s.overdue, s.overdue_this_week
    );
    println!("  Assigned this week: {}", s.assigned_this_week);
    if s.unclassified > 0 {
        println!("  Unclassified: {}", s.unclassified);
    }
}

fn print_dashboard(d: &taskdash::Dashboard, now: DateTime<Utc>) {
    println!("Dashboard for {} ({}), week {}", d.employee_id, d.role, d.week);
    println!();
    print_summary(&d.summary);

    let b = &d.breakdown;
    println!();
    println!("Status");
    println!("  Pending:      {}", b.pending);
    println!("  In progress:  {}", b.in_progress);
    println!("  Completed:    {}", b.completed);
    println!("  Overdue:      {}", b.overdue);

    println!();
    println!("Upcoming deadlines");
    if d.upcoming.is_empty() {
        println!("  none");
    }
    for t in &d.upcoming {
        print!("  ");
        print_task_line(t, now);
    }

    println!();
    println!("Completed per day");
    for day in &d.daily_completions {
        println!("  {} {:>3} {}", day.date, day.count, "#".repeat(day.count as usize));
    }

    println!();
    println!("Assigned vs. completed per week");
    for w in &d.timeline {
        println!("  {}  assigned {:>3}  completed {:>3}", w.week, w.assigned, w.completed);
    }

    if !d.category_rates.is_empty() {
        println!();
        println!("Completion rate by category");
        for r in &d.category_rates {
            let name = if r.category.is_empty() { "(none)" } else { r.category.as_str() };
            println!("  {:<16} {:>3}% ({}/{})", name, r.rate_pct, r.completed, r.total);
        }
    }

    if !d.completion_rates.is_empty() {
        println!();
        println!("Completion rate by assignee");
        for r in &d.completion_rates {
            println!(
                "  {:<12} {:>3}% ({}/{})",
                r.assignee_id, r.rate_pct, r.completed, r.total
            );
        }
    }
}
