use colored::*;
use jiff::civil::Date;

use crate::{
    models::{
        announcement::Announcement,
        problem::Problem,
        store::Store,
        task::{DisplayStatus, Priority, Task},
        user::User,
    },
    policy::DashboardAction,
    reports::Report,
    views::{Badge, MonthGrid, OverdueTask, UpcomingTask, WorkloadRow},
};

/// Get the terminal width, defaulting to 80 if unavailable
fn get_terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

pub fn get_status_glyph(status: DisplayStatus) -> ColoredString {
    match status {
        DisplayStatus::Completed => "✓".dimmed(),
        DisplayStatus::Overdue => "●".red(),
        DisplayStatus::InProgress => "◐".yellow(),
        DisplayStatus::Pending => "○".normal(),
    }
}

pub fn status_label(status: DisplayStatus) -> ColoredString {
    match status {
        DisplayStatus::Completed => status.label().green(),
        DisplayStatus::Overdue => status.label().red().bold(),
        DisplayStatus::InProgress => status.label().yellow(),
        DisplayStatus::Pending => status.label().normal(),
    }
}

pub fn priority_label(priority: Priority) -> ColoredString {
    match priority {
        Priority::High => "high".red(),
        Priority::Medium => "medium".yellow(),
        Priority::Low => "low".dimmed(),
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 { one } else { many }
}

/// Render a view header with title and count
pub fn render_view_header(title: &str, count: usize, noun: (&str, &str)) {
    println!(
        "\n  {} ({} {})\n",
        title.cyan().bold(),
        count,
        plural(count, noun.0, noun.1)
    );
}

/// Render a section header (e.g., "Overdue", "Budget")
pub fn render_section_header(title: &str) {
    println!("\n  ─── {} ───\n", title.bold());
}

/// Format a deadline relative to today (e.g., "Today", "Tomorrow", "Mar 14")
pub fn format_deadline(date: Date, today: Date) -> String {
    if date == today {
        "Today".to_string()
    } else if today.tomorrow().is_ok_and(|tomorrow| tomorrow == date) {
        "Tomorrow".to_string()
    } else if today.yesterday().is_ok_and(|yesterday| yesterday == date) {
        "Yesterday".to_string()
    } else if date.year() == today.year() {
        date.strftime("%b %d").to_string()
    } else {
        date.strftime("%b %d, %Y").to_string()
    }
}

pub fn format_days_left(days: i32) -> String {
    match days {
        0 => "due today".to_string(),
        1 => "due tomorrow".to_string(),
        n => format!("{n} days left"),
    }
}

fn format_timestamp(timestamp: jiff::Timestamp) -> String {
    let zoned = jiff::Zoned::new(timestamp, jiff::tz::TimeZone::system());
    zoned.strftime("%b %d, %Y %H:%M").to_string()
}

/// One task per line: id, glyph, title, then assignee and deadline on the right.
pub fn render_task_line(task: &Task, store: &Store, today: Date) {
    let terminal_width = get_terminal_width();
    let status = task.display_status(today);

    let id_str = format!("{:>13}", task.id.as_str());
    let left_visible_len = format!("  {}  {}  {}", id_str, " ", task.title)
        .chars()
        .count();
    let left_section = format!("  {}  {}  {}", id_str.dimmed(), get_status_glyph(status), task.title);
    let styled_left = match status {
        DisplayStatus::Completed => left_section.dimmed(),
        _ => left_section.bold(),
    };

    let right_section = format!(
        "{}  ·  {}",
        store.user_name(&task.assigned_to),
        format_deadline(task.deadline, today)
    );
    let right_visible_len = right_section.chars().count();
    let total_content = left_visible_len + right_visible_len;

    if total_content + 4 < terminal_width {
        let padding = terminal_width - total_content - 2;
        let right = if status == DisplayStatus::Overdue {
            right_section.red()
        } else {
            right_section.dimmed()
        };
        println!("{}{}{}", styled_left, " ".repeat(padding), right);
    } else {
        // Not enough space for right alignment, just print normally
        println!("{}", styled_left);
        println!("      {}", right_section.dimmed());
    }
}

pub fn render_task_list(title: &str, tasks: &[&Task], store: &Store, today: Date) {
    if tasks.is_empty() {
        println!("No tasks");
        return;
    }
    render_view_header(title, tasks.len(), ("task", "tasks"));
    for task in tasks {
        render_task_line(task, store, today);
    }
}

pub fn render_task_detail(task: &Task, store: &Store, today: Date) {
    let status = task.display_status(today);
    println!("\n  {} {}", get_status_glyph(status), task.title.bold());
    println!("  {}\n", format!("#{}", task.id).dimmed());

    let field = |name: &str, value: String| println!("  {}{}", format!("{:<13}", name).dimmed(), value);
    field("Status", status_label(status).to_string());
    field("Priority", priority_label(task.priority).to_string());
    field("Deadline", task.deadline.strftime("%A, %b %d, %Y").to_string());
    field("Assigned to", store.user_name(&task.assigned_to).to_string());
    field("Assigned by", store.user_name(&task.assigned_by).to_string());
    field("Created", format_timestamp(task.created_at));
    if let Some(completed_at) = task.completed_at {
        field("Completed", format_timestamp(completed_at));
    }
    if let Some(link) = &task.file_link {
        field("File", link.blue().underline().to_string());
    }
    if !task.description.is_empty() {
        println!();
        for line in task.description.lines() {
            println!("  {}", line);
        }
    }
    println!();
}

pub fn render_dashboard(
    system_title: &str,
    school_name: &str,
    user: &User,
    actions: &[DashboardAction],
    badge: Badge,
    announcements: &[&Announcement],
    store: &Store,
) {
    println!("\n  {}  {}", system_title.cyan().bold(), school_name.dimmed());
    println!(
        "  {} {}  {}",
        format!("({})", user.initial()).bold(),
        user.full_name.bold(),
        user.role.display_name().dimmed()
    );

    render_section_header("Menu");
    for action in actions {
        let mut line = format!("  {} {:<18}", "•".green(), action.title());
        if *action == DashboardAction::Track && !badge.is_empty() {
            let mut counters = vec![];
            if badge.pending > 0 {
                counters.push(format!("{} pending", badge.pending).yellow().to_string());
            }
            if badge.overdue > 0 {
                counters.push(format!("{} overdue", badge.overdue).red().to_string());
            }
            line.push_str(&counters.join(" "));
            line.push(' ');
        }
        println!("{} {}", line, action.command().dimmed());
    }

    render_section_header("Announcements");
    if announcements.is_empty() {
        println!("  {}", "No announcements".dimmed());
    }
    for announcement in announcements {
        render_announcement(announcement, store);
    }
    println!();
}

pub fn render_announcement(announcement: &Announcement, store: &Store) {
    println!(
        "  {} {}",
        "▸".cyan(),
        announcement.title.bold()
    );
    if !announcement.message.is_empty() {
        println!("    {}", announcement.message);
    }
    println!(
        "    {}",
        format!(
            "{} · {} · #{}",
            store.user_name(&announcement.author),
            format_timestamp(announcement.created_at),
            announcement.id
        )
        .dimmed()
    );
}

pub fn render_announcements(announcements: &[&Announcement], store: &Store) {
    if announcements.is_empty() {
        println!("No announcements");
        return;
    }
    render_view_header(
        "Announcements",
        announcements.len(),
        ("announcement", "announcements"),
    );
    for announcement in announcements {
        render_announcement(announcement, store);
        println!();
    }
}

pub fn render_problems(problems: &[&Problem], store: &Store) {
    if problems.is_empty() {
        println!("No problem reports");
        return;
    }
    render_view_header("Problem reports", problems.len(), ("report", "reports"));
    for problem in problems {
        println!(
            "  {} {}  {}",
            "!".yellow().bold(),
            problem.category.display_name().bold(),
            format!("#{}", problem.id).dimmed()
        );
        println!("    {}", problem.message);
        println!(
            "    {}",
            format!(
                "{} · {}",
                store.user_name(&problem.reporter),
                format_timestamp(problem.created_at)
            )
            .dimmed()
        );
        println!();
    }
}

pub fn render_users(users: &[&User]) {
    if users.is_empty() {
        println!("No users");
        return;
    }
    render_view_header("Users", users.len(), ("user", "users"));
    for user in users {
        println!(
            "  {} {} {:<16} {}",
            "•".green(),
            format!("{:<24}", user.full_name).bold(),
            user.username,
            user.role.display_name().dimmed()
        );
        println!("    {}", format!("#{}", user.id).dimmed());
    }
    println!();
}

pub fn render_workload(title: &str, rows: &[WorkloadRow]) {
    if rows.is_empty() {
        println!("Nobody works in {}", title);
        return;
    }
    render_view_header(title, rows.len(), ("person", "people"));
    for row in rows {
        let open = if row.open > 0 {
            format!("{} open", row.open).yellow()
        } else {
            "0 open".dimmed()
        };
        println!(
            "  {} {} {} {} {} {}",
            "•".green(),
            format!("{:<24}", row.user.full_name).bold(),
            format!("{:<22}", row.user.role.display_name()).dimmed(),
            open,
            "•".dimmed(),
            format!("{} {}", row.total, plural(row.total, "task", "tasks")).dimmed()
        );
    }
    println!(
        "\n  {}",
        "Run 'msmart track --user <id>' to see one person's tasks".dimmed()
    );
}

pub fn render_upcoming(upcoming: &[UpcomingTask], today: Date) {
    render_section_header("Due this week");
    if upcoming.is_empty() {
        println!("  {}", "Nothing due in the next 7 days".dimmed());
        return;
    }
    for item in upcoming {
        let assignee = item
            .assignee
            .map(|user| user.full_name.as_str())
            .unwrap_or("Unknown");
        let days = format_days_left(item.days_left);
        let days = if item.days_left <= 1 {
            days.red()
        } else {
            days.yellow()
        };
        println!(
            "  {} {}  {}  {}",
            format_deadline(item.task.deadline, today).bold(),
            item.task.title,
            assignee.dimmed(),
            days
        );
    }
}

fn render_overdue(overdue: &[OverdueTask]) {
    render_section_header("Overdue");
    if overdue.is_empty() {
        println!("  {}", "No overdue tasks".dimmed());
        return;
    }
    for item in overdue {
        let assignee = item
            .assignee
            .map(|user| user.full_name.as_str())
            .unwrap_or("Unknown");
        println!(
            "  {} {}  {}  {}",
            "●".red(),
            item.task.title.bold(),
            assignee.dimmed(),
            format!(
                "{} {} late",
                item.days_overdue,
                plural(item.days_overdue as usize, "day", "days")
            )
            .red()
        );
    }
}

fn render_bar(rate: u32, width: usize) -> String {
    let filled = (rate as usize * width).div_ceil(100).min(width);
    format!("{}{}", "█".repeat(filled).green(), "░".repeat(width - filled).dimmed())
}

pub fn render_report(report: &Report) {
    let totals = report.totals;
    render_view_header("Report", totals.total, ("task", "tasks"));
    println!(
        "  {} pending  {} in progress  {} completed  {} overdue",
        totals.pending.to_string().bold(),
        totals.in_progress.to_string().yellow(),
        totals.completed.to_string().green(),
        totals.overdue.to_string().red()
    );

    render_section_header("Completion by department");
    for rate in &report.departments {
        println!(
            "  {:<26} {} {:>3}%  {}",
            rate.department.display_name(),
            render_bar(rate.rate, 20),
            rate.rate,
            format!("{}/{}", rate.completed, rate.total).dimmed()
        );
    }

    render_section_header("This month");
    println!(
        "  {} created, {} completed ({}%)",
        report.this_month.created, report.this_month.completed, report.this_month.rate
    );
    println!(
        "  Average completion time: {} {}",
        report.average_completion_days,
        plural(report.average_completion_days as usize, "day", "days")
    );

    render_overdue(&report.overdue);
    println!();
}

pub fn render_calendar(grid: &MonthGrid) {
    println!("\n  {}\n", grid.first.strftime("%B %Y").to_string().cyan().bold());
    println!(
        "  {}",
        ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"]
            .map(|day| format!("{:<6}", day))
            .join("")
            .dimmed()
    );
    for week in &grid.weeks {
        let mut line = String::from("  ");
        for day in week {
            let number = format!("{:>2}", day.date.day());
            let number = if !day.in_month {
                number.dimmed()
            } else if day.is_today {
                number.reversed().bold()
            } else {
                number.normal()
            };
            let overdue = day.markers.iter().filter(|flag| **flag).count();
            let marker = match (day.markers.len(), overdue) {
                (0, _) => "   ".normal(),
                (n, 0) => format!("•{:<2}", n).green(),
                (n, _) => format!("•{:<2}", n).red(),
            };
            line.push_str(&format!("{}{} ", number, marker));
        }
        println!("{}", line);
    }
    println!(
        "\n  {} {}  {} {}\n",
        "•".green(),
        "due".dimmed(),
        "•".red(),
        "overdue".dimmed()
    );
}
