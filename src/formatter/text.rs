use std::io::Write;

use crate::formatter::{Formatter, summary_line, write_failures};
use crate::scenario::ScenarioReport;

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_to(&self, reports: &[ScenarioReport], out: &mut dyn Write) {
        for report in reports {
            let status = if report.passed() { "PASS" } else { "FAIL" };
            let _ = writeln!(out, "{status} {} ({})", report.name, report.path.display());
            write_failures(report, out);
            if let Some(dump) = &report.dump {
                for line in dump.to_string().lines() {
                    let _ = writeln!(out, "  | {line}");
                }
            }
        }
        let _ = writeln!(out, "\n{}", summary_line(reports));
    }
}
