pub mod json;
pub mod quiet;
pub mod text;

use std::io::Write;

use crate::scenario::ScenarioReport;

pub trait Formatter {
    fn format_to(&self, reports: &[ScenarioReport], out: &mut dyn Write);

    fn print(&self, reports: &[ScenarioReport]) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        self.format_to(reports, &mut lock);
    }
}

pub fn create_formatter(format: &str) -> Box<dyn Formatter> {
    match format {
        "json" => Box::new(json::JsonFormatter),
        "quiet" => Box::new(quiet::QuietFormatter),
        // "text" and any unknown value
        _ => Box::new(text::TextFormatter),
    }
}

/// `3 scenarios replayed, 1 failure`
pub(crate) fn summary_line(reports: &[ScenarioReport]) -> String {
    let failed = reports.iter().filter(|r| !r.passed()).count();
    let scenario_word = if reports.len() == 1 {
        "scenario"
    } else {
        "scenarios"
    };
    let failure_word = if failed == 1 { "failure" } else { "failures" };
    format!("{} {scenario_word} replayed, {failed} {failure_word}", reports.len())
}

/// Failed steps of one report, one indented line each.
pub(crate) fn write_failures(report: &ScenarioReport, out: &mut dyn Write) {
    for step in report.failures() {
        if let crate::scenario::StepOutcome::Failed(message) = &step.outcome {
            let _ = writeln!(out, "  {}", step.description);
            for line in message.lines() {
                let _ = writeln!(out, "    {line}");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::PathBuf;

    use crate::scenario::{ScenarioReport, StepKind, StepOutcome, StepResult};

    pub fn report(name: &str, failures: &[&str]) -> ScenarioReport {
        let mut steps = vec![StepResult {
            kind: StepKind::Arrange,
            description: "arrange calc.add(<any>, <any>)".to_string(),
            outcome: StepOutcome::Passed,
        }];
        steps.extend(failures.iter().map(|msg| StepResult {
            kind: StepKind::Assert,
            description: "assert calc.add(1, 2)".to_string(),
            outcome: StepOutcome::Failed(msg.to_string()),
        }));
        ScenarioReport {
            name: name.to_string(),
            path: PathBuf::from(format!("{name}.scenario.yml")),
            steps,
            dump: None,
        }
    }
}
