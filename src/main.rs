use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;
use jiff::{Timestamp, Zoned};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::{
    backend::{Backend, BackendError},
    config::{Overrides, Settings, SettingsError},
    models::{
        problem::ProblemCategory,
        role::{Department, Role},
        store::Store,
        task::{DisplayStatus, Priority, TransitionError},
        user::User,
    },
    policy::{DashboardAction, TaskScope},
    services::{
        announcements::{
            DeleteAnnouncementError, DeleteAnnouncementParameters, PostAnnouncementError,
            PostAnnouncementParameters, check_delete_announcement, delete_announcement,
            post_announcement,
        },
        auth::{LoginError, LoginParameters, login},
        problems::{
            DeleteProblemError, DeleteProblemParameters, ReportProblemError,
            ReportProblemParameters, check_delete_problem, delete_problem, report_problem,
        },
        tasks::{
            AdvanceTaskError, AdvanceTaskParameters, AssignTaskError, AssignTaskParameters,
            DeleteTaskError, DeleteTaskParameters, assign_task, check_delete_task, complete_task,
            delete_task, find_user, start_task,
        },
        uploads::{UploadTaskFileError, UploadTaskFileParameters, upload_task_file},
        users::{
            AddUserError, AddUserParameters, DeleteUserError, DeleteUserParameters,
            add_user, check_delete_user, delete_user, sorted_users,
        },
    },
    session::{BusyGuard, Confirmation, SessionError, SessionStore},
    views::{TaskFilter, UnknownMonth},
};

mod backend;
mod config;
mod models;
mod policy;
mod reports;
mod services;
mod session;
mod ui;
mod views;

#[derive(Parser)]
#[command(
    name = "msmart",
    about = "Task assignment and tracking for school staff, from the terminal"
)]
struct Cli {
    /// Web app URL, or file:<path> for a local sheet
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Directory for the session and lock files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log more (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and remember the user for later commands
    Login {
        username: String,

        #[arg(short, long, env = "MSMART_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the logged-in user
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Show the menu, notifications and latest announcements
    Dashboard,

    /// Work with tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// List who you can assign tasks to in a department
    Assignees { department: Department },

    /// Show department workload, or one person's tasks
    Track {
        /// Only this department
        #[arg(short, long)]
        department: Option<Department>,

        /// Drill down into one user's tasks (id or username)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show deadlines on a month calendar
    Calendar {
        /// YYYY-MM, prev, next or today
        month: Option<String>,
    },

    /// Show completion statistics
    Report,

    /// Read and post announcements
    #[command(subcommand)]
    Announce(AnnounceCommands),

    /// Report problems to the administration
    #[command(subcommand)]
    Problem(ProblemCommands),

    /// Manage user accounts (admin only)
    #[command(subcommand)]
    User(UserCommands),
}

#[derive(Debug, Subcommand)]
enum TaskCommands {
    /// Assign a new task
    Assign {
        /// Task title
        title: String,

        /// Assignee id or username
        #[arg(short, long)]
        to: String,

        /// Due date (e.g., 2025-03-01)
        #[arg(short, long)]
        deadline: String,

        /// high, medium or low
        #[arg(short, long, default_value = "medium")]
        priority: Priority,

        /// Department the task is for; defaults to the assignee's
        #[arg(long)]
        department: Option<Department>,

        /// Instructions
        #[arg(short, long, default_value = "")]
        notes: String,
    },
    /// List the tasks you can see
    List {
        /// pending, in_progress, completed or overdue
        #[arg(short, long)]
        status: Option<DisplayStatus>,

        /// Only tasks of this department's staff
        #[arg(short, long)]
        department: Option<Department>,
    },
    /// List tasks assigned to you
    Mine,
    /// Show one task
    Show { id: String },
    /// Start working on a pending task
    Start { id: String },
    /// Mark an in-progress task as completed
    Complete { id: String },
    /// Delete a task (run twice to confirm)
    Delete { id: String },
    /// Attach a PDF of your work to a task
    Upload { id: String, file: PathBuf },
}

#[derive(Debug, Subcommand)]
enum AnnounceCommands {
    /// List all announcements
    List,
    /// Post an announcement
    Post {
        title: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Delete an announcement (run twice to confirm)
    Delete { id: String },
}

#[derive(Debug, Subcommand)]
enum ProblemCommands {
    /// List problem reports you can see
    List,
    /// Report a problem (system, work, equipment or other)
    Report {
        category: ProblemCategory,
        message: String,
    },
    /// Delete a problem report (run twice to confirm)
    Delete { id: String },
}

#[derive(Debug, Subcommand)]
enum UserCommands {
    /// List all users
    List,
    /// Add a user
    Add {
        username: String,
        full_name: String,
        /// admin, director, head_<department> or teacher_<department>
        role: Role,
        #[arg(short, long, env = "MSMART_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Delete a user (run twice to confirm)
    Delete {
        /// User id or username
        user: String,
    },
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    AssignTask(#[from] AssignTaskError),
    #[error(transparent)]
    AdvanceTask(#[from] AdvanceTaskError),
    #[error(transparent)]
    DeleteTask(#[from] DeleteTaskError),
    #[error(transparent)]
    Upload(#[from] UploadTaskFileError),
    #[error(transparent)]
    PostAnnouncement(#[from] PostAnnouncementError),
    #[error(transparent)]
    DeleteAnnouncement(#[from] DeleteAnnouncementError),
    #[error(transparent)]
    ReportProblem(#[from] ReportProblemError),
    #[error(transparent)]
    DeleteProblem(#[from] DeleteProblemError),
    #[error(transparent)]
    AddUser(#[from] AddUserError),
    #[error(transparent)]
    DeleteUser(#[from] DeleteUserError),
    #[error(transparent)]
    Month(#[from] UnknownMonth),
    #[error("Failed to lay out the calendar: {0}")]
    Calendar(#[from] jiff::Error),
    #[error("Your role cannot open '{0}'")]
    NotAllowed(&'static str),
    #[error("Task '{0}' not found")]
    TaskNotFound(String),
    #[error("User '{0}' not found")]
    UserNotFound(String),
}

/// Settings, local session and the endpoint for one command.
struct App {
    settings: Settings,
    session: SessionStore,
}

impl App {
    fn backend(&self) -> Result<Box<dyn Backend>, AppError> {
        Ok(backend::open(
            self.settings.endpoint()?,
            self.settings.request_timeout(),
        )?)
    }

    fn load_store(&self, backend: &dyn Backend) -> Result<Store, AppError> {
        Ok(Store::from_rows(backend.get_all()?))
    }

    fn require(&self, user: &User, action: DashboardAction) -> Result<(), AppError> {
        if policy::is_action_allowed(&user.role, action) {
            Ok(())
        } else {
            Err(AppError::NotAllowed(action.title()))
        }
    }

    /// First call arms the delete, a second one within the window runs it
    /// while holding the returned busy guard.
    fn confirm(&self, key: String, what: &str) -> Result<Option<BusyGuard>, AppError> {
        let window = self.settings.confirm_window();
        match self
            .session
            .confirm_delete(&key, Timestamp::now(), window)?
        {
            (busy, Confirmation::Confirmed) => Ok(Some(busy)),
            (_, Confirmation::Armed) => {
                println!(
                    "{} Run the same command again within {}s to delete {}",
                    "?".yellow().bold(),
                    window.as_secs(),
                    what.bold()
                );
                Ok(None)
            }
        }
    }
}

fn init_tracing(verbose: u8, configured: &str) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("MSMART_LOG").unwrap_or_else(|_| EnvFilter::new(configured)),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let settings = match Settings::load(Overrides {
        endpoint: cli.endpoint.clone(),
        data_dir: cli.data_dir.clone(),
    }) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_tracing(cli.verbose, &settings.log_level);
    match settings.time_zone() {
        Ok(Some(tz)) => models::set_sheet_time_zone(tz),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let app = App {
        session: SessionStore::new(settings.data_dir.clone()),
        settings,
    };

    match run(&app, cli.command.unwrap_or(Commands::Dashboard)) {
        Ok(()) => {}
        Err(AppError::Settings(SettingsError::MissingEndpoint(path))) => {
            eprintln!("Error: No endpoint configured");
            eprintln!("\nPass --endpoint, set MSMART_ENDPOINT or add it to {}:", path);
            eprintln!("  endpoint = \"https://script.google.com/macros/s/<id>/exec\"");
            eprintln!("\nFor a local sheet use: endpoint = \"file:/path/to/sheet.json\"");
            std::process::exit(1);
        }
        Err(AppError::Session(SessionError::NotLoggedIn)) => {
            eprintln!("Error: Not logged in");
            eprintln!("\nExample: msmart login somchai --password 1234");
            std::process::exit(1);
        }
        Err(AppError::AdvanceTask(AdvanceTaskError::Transition(TransitionError::OutOfOrder {
            title,
            from,
            to,
        }))) => {
            eprintln!("Error: Task '{}' is {} and cannot move to {}", title, from, to);
            eprintln!("\nTasks go pending → in_progress → completed, one step at a time.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(app: &App, command: Commands) -> Result<(), AppError> {
    let today = Zoned::now().date();

    match command {
        Commands::Login { username, password } => {
            let backend = app.backend()?;
            let mut store = Store::default();
            let _busy = app.session.acquire_busy()?;
            let user = login(
                &mut store,
                &*backend,
                &app.settings.seed_accounts,
                LoginParameters { username, password },
            )?;
            app.session.save(&user)?;
            println!(
                "✓ Logged in as {} ({})",
                user.full_name.bold(),
                user.role.display_name()
            );
        }
        Commands::Logout => {
            if app.session.clear()? {
                println!("✓ Logged out");
            } else {
                println!("Nobody is logged in");
            }
        }
        Commands::Whoami => {
            let user = app.session.current_user()?;
            println!("{} {}", user.full_name.bold(), format!("@{}", user.username).dimmed());
            println!("  {}", user.role.display_name());
            if let Some(department) = user.department().department() {
                println!("  {}", department.display_name().dimmed());
            }
        }
        Commands::Dashboard => {
            let user = app.session.current_user()?;
            let backend = app.backend()?;
            let store = app.load_store(&*backend)?;
            let actions = policy::dashboard_actions(&user.role);
            ui::render_dashboard(
                &app.settings.system_title,
                &app.settings.school_name,
                &user,
                &actions,
                views::badge(&store, &user, today),
                &views::latest_announcements(&store, 5),
                &store,
            );
            ui::render_upcoming(&views::upcoming_week(&store, &user, today), today);
            println!();
        }
        Commands::Task(command) => run_task_command(app, command, today)?,
        Commands::Assignees { department } => {
            let user = app.session.current_user()?;
            app.require(&user, DashboardAction::Assign)?;
            let backend = app.backend()?;
            let store = app.load_store(&*backend)?;
            let assignable = views::assignable_users(&store, &user, department);
            ui::render_users(&assignable);
        }
        Commands::Track { department, user: drill_down } => {
            let user = app.session.current_user()?;
            app.require(&user, DashboardAction::Track)?;
            let backend = app.backend()?;
            let store = app.load_store(&*backend)?;

            if let Some(key) = drill_down {
                let target = find_user(&store, &key).ok_or(AppError::UserNotFound(key))?;
                let tasks: Vec<_> = views::visible_tasks(&store, &user)
                    .into_iter()
                    .filter(|task| task.assigned_to == target.id)
                    .collect();
                ui::render_task_list(&target.full_name, &tasks, &store, today);
                return Ok(());
            }

            let departments = match (department, policy::task_scope(&user.role)) {
                (_, TaskScope::AssignedToSelf) => vec![],
                (Some(department), _) => vec![department],
                (None, TaskScope::Department(own)) => vec![own],
                (None, TaskScope::All) => Department::ALL.to_vec(),
            };
            if departments.is_empty() {
                ui::render_task_list("My tasks", &views::my_tasks(&store, &user), &store, today);
            }
            for department in departments {
                let rows = views::department_workload(&store, &user, department);
                ui::render_workload(department.display_name(), &rows);
            }
            ui::render_upcoming(&views::upcoming_week(&store, &user, today), today);
            println!();
        }
        Commands::Calendar { month } => {
            let user = app.session.current_user()?;
            app.require(&user, DashboardAction::Calendar)?;
            let month = views::resolve_month(month.as_deref(), today)?;
            let backend = app.backend()?;
            let store = app.load_store(&*backend)?;
            let grid = views::month_grid(&store, &user, month, today)?;
            ui::render_calendar(&grid);
        }
        Commands::Report => {
            let user = app.session.current_user()?;
            app.require(&user, DashboardAction::Reports)?;
            let backend = app.backend()?;
            let store = app.load_store(&*backend)?;
            let report = reports::build(&store, &user, &Zoned::now())?;
            ui::render_report(&report);
        }
        Commands::Announce(command) => run_announce_command(app, command)?,
        Commands::Problem(command) => run_problem_command(app, command)?,
        Commands::User(command) => run_user_command(app, command)?,
    }
    Ok(())
}

fn run_task_command(
    app: &App,
    command: TaskCommands,
    today: jiff::civil::Date,
) -> Result<(), AppError> {
    let user = app.session.current_user()?;
    let backend = app.backend()?;
    let mut store = app.load_store(&*backend)?;

    match command {
        TaskCommands::Assign {
            title,
            to,
            deadline,
            priority,
            department,
            notes,
        } => {
            let _busy = app.session.acquire_busy()?;
            let params = AssignTaskParameters {
                title,
                description: notes,
                deadline,
                priority,
                department,
                assignee: to,
            };
            let task = assign_task(&mut store, &*backend, &user, params)?;
            println!("✓ Task assigned: {}", task.title);
            println!("  #{}", task.id);
            println!(
                "  {} · due {}",
                store.user_name(&task.assigned_to),
                ui::format_deadline(task.deadline, today)
            );
        }
        TaskCommands::List { status, department } => {
            app.require(&user, DashboardAction::Track)?;
            let tasks = views::filter_tasks(
                &store,
                views::visible_tasks(&store, &user),
                TaskFilter { status, department },
                today,
            );
            ui::render_task_list("Tasks", &tasks, &store, today);
        }
        TaskCommands::Mine => {
            ui::render_task_list("My tasks", &views::my_tasks(&store, &user), &store, today);
        }
        TaskCommands::Show { id } => {
            let task = views::visible_tasks(&store, &user)
                .into_iter()
                .find(|task| task.id.as_str() == id.trim())
                .ok_or(AppError::TaskNotFound(id))?;
            ui::render_task_detail(task, &store, today);
        }
        TaskCommands::Start { id } => {
            let _busy = app.session.acquire_busy()?;
            let params = AdvanceTaskParameters { task_id: id };
            let task = start_task(&mut store, &*backend, &user, params)?;
            println!("✓ Task started: {}", task.title);
        }
        TaskCommands::Complete { id } => {
            let _busy = app.session.acquire_busy()?;
            let params = AdvanceTaskParameters { task_id: id };
            let task = complete_task(&mut store, &*backend, &user, params)?;
            println!("✓ Task completed: {}", task.title);
        }
        TaskCommands::Delete { id } => {
            let task = check_delete_task(&store, &user, &id)?;
            let key = format!("task:{}", task.id);
            let Some(_busy) = app.confirm(key, &format!("task '{}'", task.title))? else {
                return Ok(());
            };
            let params = DeleteTaskParameters { task_id: id };
            let task = delete_task(&mut store, &*backend, &user, params)?;
            println!("✓ Task deleted: {}", task.title);
        }
        TaskCommands::Upload { id, file } => {
            let _busy = app.session.acquire_busy()?;
            let task = upload_task_file(
                &mut store,
                &*backend,
                &user,
                UploadTaskFileParameters { task_id: id, path: file },
            )?;
            println!("✓ File uploaded for: {}", task.title);
            if let Some(link) = &task.file_link {
                println!("  {}", link.blue());
            }
        }
    }
    Ok(())
}

fn run_announce_command(app: &App, command: AnnounceCommands) -> Result<(), AppError> {
    let user = app.session.current_user()?;
    let backend = app.backend()?;
    let mut store = app.load_store(&*backend)?;

    match command {
        AnnounceCommands::List => {
            let announcements = views::latest_announcements(&store, usize::MAX);
            ui::render_announcements(&announcements, &store);
        }
        AnnounceCommands::Post { title, message } => {
            let _busy = app.session.acquire_busy()?;
            let announcement = post_announcement(
                &mut store,
                &*backend,
                &user,
                PostAnnouncementParameters { title, message },
            )?;
            println!("✓ Announcement posted: {}", announcement.title);
        }
        AnnounceCommands::Delete { id } => {
            let announcement = check_delete_announcement(&store, &user, &id)?;
            let Some(_busy) = app.confirm(
                format!("announcement:{}", announcement.id),
                &format!("announcement '{}'", announcement.title),
            )?
            else {
                return Ok(());
            };
            let announcement = delete_announcement(
                &mut store,
                &*backend,
                &user,
                DeleteAnnouncementParameters { announcement_id: id },
            )?;
            println!("✓ Announcement deleted: {}", announcement.title);
        }
    }
    Ok(())
}

fn run_problem_command(app: &App, command: ProblemCommands) -> Result<(), AppError> {
    let user = app.session.current_user()?;
    app.require(&user, DashboardAction::Problems)?;
    let backend = app.backend()?;
    let mut store = app.load_store(&*backend)?;

    match command {
        ProblemCommands::List => {
            let mut problems = views::visible_problems(&store, &user);
            problems.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            ui::render_problems(&problems, &store);
        }
        ProblemCommands::Report { category, message } => {
            let _busy = app.session.acquire_busy()?;
            let problem = report_problem(
                &mut store,
                &*backend,
                &user,
                ReportProblemParameters { category, message },
            )?;
            println!("✓ Problem reported ({})", problem.category.display_name());
        }
        ProblemCommands::Delete { id } => {
            let problem = check_delete_problem(&store, &user, &id)?;
            let Some(_busy) = app.confirm(
                format!("problem:{}", problem.id),
                &format!("problem report #{}", problem.id),
            )?
            else {
                return Ok(());
            };
            let problem = delete_problem(
                &mut store,
                &*backend,
                &user,
                DeleteProblemParameters { problem_id: id },
            )?;
            println!("✓ Problem report deleted: #{}", problem.id);
        }
    }
    Ok(())
}

fn run_user_command(app: &App, command: UserCommands) -> Result<(), AppError> {
    let user = app.session.current_user()?;
    app.require(&user, DashboardAction::Users)?;
    let backend = app.backend()?;
    let mut store = app.load_store(&*backend)?;

    match command {
        UserCommands::List => {
            ui::render_users(&sorted_users(&store));
        }
        UserCommands::Add {
            username,
            full_name,
            role,
            password,
        } => {
            let _busy = app.session.acquire_busy()?;
            let added = add_user(
                &mut store,
                &*backend,
                &user,
                AddUserParameters {
                    username,
                    password,
                    full_name,
                    role,
                },
            )?;
            println!(
                "✓ User added: {} ({})",
                added.full_name,
                added.role.display_name()
            );
        }
        UserCommands::Delete { user: key } => {
            let target = check_delete_user(&store, &user, &key)?;
            let Some(_busy) = app.confirm(
                format!("user:{}", target.id),
                &format!("user '{}'", target.full_name),
            )?
            else {
                return Ok(());
            };
            let deleted = delete_user(
                &mut store,
                &*backend,
                &user,
                DeleteUserParameters { user: key },
            )?;
            println!("✓ User deleted: {}", deleted.full_name);
        }
    }
    Ok(())
}
