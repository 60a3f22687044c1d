use std::io::Write;

use serde::Serialize;

use crate::formatter::Formatter;
use crate::scenario::ScenarioReport;

pub struct JsonFormatter;

#[derive(Serialize)]
struct JsonOutput<'a> {
    metadata: Metadata,
    scenarios: &'a [ScenarioReport],
}

#[derive(Serialize)]
struct Metadata {
    scenario_count: usize,
    failed_count: usize,
    failed_step_count: usize,
}

impl Formatter for JsonFormatter {
    fn format_to(&self, reports: &[ScenarioReport], out: &mut dyn Write) {
        let output = JsonOutput {
            metadata: Metadata {
                scenario_count: reports.len(),
                failed_count: reports.iter().filter(|r| !r.passed()).count(),
                failed_step_count: reports.iter().map(|r| r.failures().count()).sum(),
            },
            scenarios: reports,
        };
        match serde_json::to_string_pretty(&output) {
            Ok(json) => {
                let _ = writeln!(out, "{json}");
            }
            Err(e) => tracing::error!("failed to serialize report: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::fixtures::report;

    fn render(reports: &[ScenarioReport]) -> serde_json::Value {
        let mut buf = Vec::new();
        JsonFormatter.format_to(reports, &mut buf);
        serde_json::from_slice(&buf).unwrap()
    }

    #[test]
    fn empty_produces_valid_json() {
        let parsed = render(&[]);
        assert_eq!(parsed["metadata"]["scenario_count"], 0);
        assert_eq!(parsed["scenarios"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn steps_carry_status_and_message() {
        let parsed = render(&[report("a", &[]), report("b", &["too few calls", "out of order"])]);
        assert_eq!(parsed["metadata"]["failed_count"], 1);
        assert_eq!(parsed["metadata"]["failed_step_count"], 2);
        let steps = &parsed["scenarios"][1]["steps"];
        assert_eq!(steps[0]["outcome"]["status"], "passed");
        assert_eq!(steps[1]["kind"], "assert");
        assert_eq!(steps[1]["outcome"]["status"], "failed");
        assert_eq!(steps[1]["outcome"]["message"], "too few calls");
        assert_eq!(parsed["scenarios"][0]["path"], "a.scenario.yml");
        assert!(parsed["scenarios"][0].get("dump").is_none());
    }
}
