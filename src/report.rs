//! Console summary of a run.

use std::path::Path;

use crate::orchestrator::RunReport;
use crate::validate::{MismatchSide, StageStatus};

const RULE: &str = "--------------------------------------------------------------------------------";
const LABEL_WIDTH: usize = 55;

fn heading(title: &str) -> String {
    let fill = RULE.len().saturating_sub(title.len());
    let left = fill / 2;
    format!("{}{}{}", &RULE[..left], title, &RULE[..fill - left])
}

/// The PASS/FAIL table, one row per stage that ran.
pub fn render_table(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&heading("Summary").replace('-', "="));
    out.push_str("\n\n");
    for result in &report.stages {
        let label = format!("{}. {}", result.stage, result.label);
        out.push_str(&format!("{label:<LABEL_WIDTH$}: {}\n", result.status));
    }
    out
}

/// Full summary printed at the end of a run.
pub fn render_summary(report: &RunReport, request_file: &Path, log_file: &Path) -> String {
    let mut out = render_table(report);

    if let (Some(stage), Some(failure)) = (report.failed_stage, report.failure.as_deref()) {
        out.push_str(&format!("\nStage {stage} failed: {failure}\n"));
        push_cleanup(&mut out, report);
        out.push_str(&format!(
            "\nRefer {} for detailed information.\n",
            log_file.display()
        ));
        return out;
    }

    out.push('\n');
    out.push_str(&heading("Yang Models"));
    out.push('\n');
    for model in &report.yang_models {
        out.push_str(model);
        out.push('\n');
    }

    if report.mismatches.is_empty() {
        out.push_str("\nCLI and NETCONF configurations match.\n");
    } else {
        out.push('\n');
        out.push_str(&heading("Mismatched Configurations"));
        out.push('\n');
        for mismatch in &report.mismatches {
            let side = match mismatch.side {
                MismatchSide::OnlyInCli => "cli",
                MismatchSide::OnlyInNetconf => "netconf",
            };
            out.push_str(&format!("[{side}] {}\n", mismatch.line));
        }
    }
    push_cleanup(&mut out, report);

    out.push('\n');
    out.push_str(RULE);
    out.push_str(&format!(
        "\nRefer to {} for request XML and {} for detailed information.\n",
        request_file.display(),
        log_file.display()
    ));
    out
}

fn push_cleanup(out: &mut String, report: &RunReport) {
    let cleanup = &report.cleanup;
    if !cleanup.attempted {
        return;
    }
    let status = if cleanup.succeeded {
        StageStatus::Pass
    } else {
        StageStatus::Fail
    };
    out.push_str(&format!("\nCleanup: {status}\n"));
    for action in &cleanup.actions {
        out.push_str(&format!("  {action}\n"));
    }
    for error in &cleanup.errors {
        out.push_str(&format!("  error: {error}\n"));
    }
}
