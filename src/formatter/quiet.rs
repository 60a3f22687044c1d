use std::io::Write;

use crate::formatter::{Formatter, summary_line, write_failures};
use crate::scenario::ScenarioReport;

/// Prints nothing unless some scenario failed, then only the failures.
pub struct QuietFormatter;

impl Formatter for QuietFormatter {
    fn format_to(&self, reports: &[ScenarioReport], out: &mut dyn Write) {
        if reports.iter().all(ScenarioReport::passed) {
            return;
        }
        for report in reports.iter().filter(|r| !r.passed()) {
            let _ = writeln!(out, "FAIL {} ({})", report.name, report.path.display());
            write_failures(report, out);
        }
        let _ = writeln!(out, "\n{}", summary_line(reports));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::fixtures::report;

    fn render(reports: &[ScenarioReport]) -> String {
        let mut buf = Vec::new();
        QuietFormatter.format_to(reports, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn all_passing_produces_no_output() {
        assert_eq!(render(&[report("a", &[]), report("b", &[])]), "");
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn failures_only() {
        let out = render(&[report("a", &[]), report("b", &["too many calls"])]);
        assert!(!out.contains("FAIL a"));
        assert!(out.contains("FAIL b (b.scenario.yml)"));
        assert!(out.contains("    too many calls"));
        assert!(out.contains("2 scenarios replayed, 1 failure"));
    }
}
