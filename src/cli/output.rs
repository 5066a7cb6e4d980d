use console::style;
use std::fmt::Display;

/// Centralized output formatting for consistent CLI presentation
pub struct Output;

impl Output {
    pub fn success<T: Display>(message: T) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error<T: Display>(message: T) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning<T: Display>(message: T) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info<T: Display>(message: T) {
        println!("{} {}", style("ℹ").cyan(), message);
    }

    /// Print a sub-item with arrow prefix
    pub fn sub_item<T: Display>(message: T) {
        println!("  {} {}", style("→").dim(), message);
    }

    pub fn bullet<T: Display>(message: T) {
        println!("  {} {}", style("•").dim(), message);
    }

    pub fn section<T: Display>(title: T) {
        println!("\n{}", style(title).bold().underlined());
    }

    pub fn tip<T: Display>(message: T) {
        println!("{} {}", style("TIP:").cyan(), style(message).dim());
    }

    /// Branch name as it appears in messages
    pub fn branch(name: &str) -> String {
        style(name).cyan().to_string()
    }

    /// "<branch> on top of <parent>" phrasing shared by create and track
    pub fn on_top_of(branch: &str, parent: &str) -> String {
        format!("{} on top of {}", Self::branch(branch), Self::branch(parent))
    }

    pub fn restacked(branch: &str) {
        Self::sub_item(format!("Restacked {}", Self::branch(branch)));
    }

    /// Headline for a rebase that stopped on conflicts
    pub fn conflict(branch: &str, parent: &str) {
        Self::error(format!(
            "Hit a conflict rebasing {} onto {}",
            Self::branch(branch),
            Self::branch(parent)
        ));
    }

    pub fn conflicted_file(path: &str) {
        Self::bullet(style(path).red());
    }

    /// A saved step that runs on `bst continue`
    pub fn pending_step<T: Display>(step: T) {
        println!("  {} {}", style("○").yellow(), step);
    }

    pub fn next_steps(steps: &[&str]) {
        println!();
        Self::tip("Next steps:");
        for step in steps {
            Self::bullet(step);
        }
    }
}
