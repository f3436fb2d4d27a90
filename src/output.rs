//! Terminal output formatting.
//!
//! Consistent colored output for the CLI: error/warning/info messages,
//! per-unit results and the end-of-batch summary.

use crate::pipeline::{UnitReport, UnitStage};

/// ANSI color codes for terminal output.
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const RED: &str = "\x1b[31m";
    pub const GRAY: &str = "\x1b[90m";
}

pub use colors::*;

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{RED}{BOLD}Error:{RESET} {}", msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    println!("{YELLOW}Warning:{RESET} {}", msg);
}

/// Print an info message.
pub fn print_info(msg: &str) {
    println!("{CYAN}Info:{RESET} {}", msg);
}

/// Print the created PRs for one unit (either side may be absent when its
/// repository had no diff).
pub fn print_pr_pair(infra_url: Option<&str>, main_url: Option<&str>) {
    println!("{GREEN}Created PRs:{RESET}");
    if let Some(url) = infra_url {
        println!("  Infra: {}", url);
    }
    if let Some(url) = main_url {
        println!("  Main:  {}", url);
    }
}

/// One line per finished unit.
pub fn print_unit_result(report: &UnitReport) {
    let (mark, color, label) = match &report.stage {
        UnitStage::PrsOpened { .. } => ("\u{2714}", GREEN, "published".to_string()),
        UnitStage::AlreadyPresent => ("\u{2714}", CYAN, "already present".to_string()),
        UnitStage::Committed => ("\u{2714}", YELLOW, "committed locally (not published)".to_string()),
        UnitStage::Failed { stage, reason } => {
            ("\u{2718}", RED, format!("failed at {}: {}", stage, reason))
        }
        other => ("\u{2718}", YELLOW, format!("stopped at {:?}", other)),
    };
    println!(
        "{color}{mark}{RESET} {BOLD}{}{RESET} {DIM}({}s){RESET} {}",
        report.display_name, report.duration_secs, label
    );
}

/// End-of-batch summary. Returns the count of failed units so the caller
/// can derive an exit code.
pub fn print_batch_summary(reports: &[UnitReport]) -> usize {
    let published = reports
        .iter()
        .filter(|r| matches!(r.stage, UnitStage::PrsOpened { .. }))
        .count();
    let present = reports
        .iter()
        .filter(|r| matches!(r.stage, UnitStage::AlreadyPresent))
        .count();
    let failed = reports
        .iter()
        .filter(|r| matches!(r.stage, UnitStage::Failed { .. }))
        .count();

    println!();
    println!("{GRAY}{}{RESET}", "-".repeat(57));
    println!(
        "{BOLD}{}{RESET} unit(s): {GREEN}{} published{RESET}, {CYAN}{} already present{RESET}, {RED}{} failed{RESET}",
        reports.len(),
        published,
        present,
        failed
    );
    println!("{GRAY}{}{RESET}", "-".repeat(57));

    for report in reports {
        print_unit_result(report);
        if let UnitStage::PrsOpened { main_url, infra_url } = &report.stage {
            if let Some(url) = infra_url {
                println!("    {DIM}infra{RESET} {}", url);
            }
            if let Some(url) = main_url {
                println!("    {DIM}main{RESET}  {}", url);
            }
        }
    }
    println!();

    failed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(stage: UnitStage) -> UnitReport {
        UnitReport {
            display_name: "serde 1.0.195".into(),
            stage,
            duration_secs: 3,
        }
    }

    #[test]
    fn test_batch_summary_counts_failures() {
        let reports = vec![
            report(UnitStage::PrsOpened {
                main_url: Some("https://example/m/1".into()),
                infra_url: Some("https://example/i/1".into()),
            }),
            report(UnitStage::AlreadyPresent),
            report(UnitStage::Failed {
                stage: "versions".into(),
                reason: "not found".into(),
            }),
        ];
        assert_eq!(print_batch_summary(&reports), 1);
    }

    #[test]
    fn test_unit_result_smoke() {
        print_unit_result(&report(UnitStage::AlreadyPresent));
        print_unit_result(&report(UnitStage::Failed {
            stage: "tool".into(),
            reason: "exit 2".into(),
        }));
    }
}
