//! Progress indicators for the stackup CLI.

use crate::ui;
use indicatif::{ProgressBar, ProgressStyle};
use nodekit::{ConfigureProgress, ProvisionedNode, Role, RoleStatus};
use std::time::Duration;

/// Create a spinner with a message.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Finish a spinner with a success line.
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    ui::success(msg);
}

/// Finish a spinner with an error line.
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    ui::error(msg);
}

/// Spinner showing which roles are being configured.
pub struct RoleProgress {
    bar: Option<ProgressBar>,
    running: Vec<(Role, String)>,
}

impl RoleProgress {
    /// Create a progress display; `quiet` disables the spinner.
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: (!quiet).then(|| spinner("Configuring roles")),
            running: Vec::new(),
        }
    }

    fn refresh(&self) {
        if let Some(bar) = &self.bar {
            let roles: Vec<&str> = self.running.iter().map(|(role, _)| role.label()).collect();
            bar.set_message(format!("Configuring {}", roles.join(", ")));
        }
    }

    /// Clear the spinner.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl ConfigureProgress for RoleProgress {
    fn on_role_start(&mut self, role: Role, node: &ProvisionedNode) {
        self.running.push((role, node.name.clone()));
        self.refresh();
    }

    fn on_role_complete(&mut self, role: Role, status: &RoleStatus) {
        let node = self
            .running
            .iter()
            .position(|(r, _)| *r == role)
            .map(|index| self.running.remove(index).1)
            .unwrap_or_default();

        match &self.bar {
            Some(bar) => bar.suspend(|| ui::role_status(role.label(), &node, status)),
            None => ui::role_status(role.label(), &node, status),
        }
        self.refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_progress_tracks_running_roles() {
        let mut progress = RoleProgress::new(true);
        let db = ProvisionedNode::new("1", "mcw-db");
        let web = ProvisionedNode::new("2", "mcw-webserver-01");

        progress.on_role_start(Role::Database, &db);
        progress.on_role_start(Role::WebServer1, &web);
        assert_eq!(progress.running.len(), 2);

        progress.on_role_complete(Role::Database, &RoleStatus::Succeeded);
        assert_eq!(progress.running, vec![(Role::WebServer1, "mcw-webserver-01".to_string())]);
        progress.finish();
    }
}
