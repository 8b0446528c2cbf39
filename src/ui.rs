use colored::Colorize;
use nodekit::RoleStatus;
use std::time::Duration;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print one role's status line
pub fn role_status(role: &str, node: &str, status: &RoleStatus) {
    let symbol = match status {
        RoleStatus::Succeeded => "✓".green(),
        RoleStatus::Failed(_) => "✗".red(),
        RoleStatus::NotAttempted => "-".dimmed(),
    };
    let detail = match status {
        RoleStatus::Failed(cause) => format!(" ({cause})"),
        _ => String::new(),
    };
    println!(
        "  {symbol} {:<6} {:<32} {}{}",
        role,
        node,
        status.label(),
        detail.dimmed()
    );
}

/// Format a duration as `1m 05s` or `12.3s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
