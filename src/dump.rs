//! Debug snapshot of a repository: every arrangement with the debug view of
//! its assertable behaviors, and every recorded call shape with its count.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DebugDump {
    pub repository: u64,
    pub arrangements: Vec<ArrangementDump>,
    pub invocations: Vec<InvocationDump>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArrangementDump {
    pub id: u64,
    pub expression: String,
    pub sequential: bool,
    pub used: bool,
    pub times_called: usize,
    pub behaviors: Vec<String>,
    pub assertions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvocationDump {
    /// Type declaring the method the call was recorded under.
    pub declared_on: String,
    pub call: String,
    pub count: usize,
    pub arrangements: Vec<u64>,
}

impl fmt::Display for DebugDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Repository #{}", self.repository)?;
        writeln!(f, "Arrangements ({}):", self.arrangements.len())?;
        for a in &self.arrangements {
            let mut flags = Vec::new();
            if a.sequential {
                flags.push("sequential");
            }
            if a.used {
                flags.push("used");
            }
            write!(f, "  #{} {}", a.id, a.expression)?;
            if !flags.is_empty() {
                write!(f, " [{}]", flags.join(", "))?;
            }
            writeln!(f)?;
            writeln!(f, "    behaviors: {}", a.behaviors.join(", "))?;
            for view in &a.assertions {
                writeln!(f, "    {view}")?;
            }
        }
        writeln!(f, "Invocations ({}):", self.invocations.len())?;
        for inv in &self.invocations {
            write!(f, "  [{}] {} x{}", inv.declared_on, inv.call, inv.count)?;
            if !inv.arrangements.is_empty() {
                let ids: Vec<String> = inv.arrangements.iter().map(|id| format!("#{id}")).collect();
                write!(f, " -> {}", ids.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_rendering() {
        let dump = DebugDump {
            repository: 7,
            arrangements: vec![ArrangementDump {
                id: 1,
                expression: "calc.add(<any>, <any>)".into(),
                sequential: true,
                used: false,
                times_called: 0,
                behaviors: vec!["occurrence".into(), "returns".into()],
                assertions: vec!["Occurrences: 0 call(s), no expectation".into()],
            }],
            invocations: vec![InvocationDump {
                declared_on: "ICalc".into(),
                call: "calc.add(1, 2)".into(),
                count: 2,
                arrangements: vec![1],
            }],
        };
        let text = dump.to_string();
        assert!(text.contains("#1 calc.add(<any>, <any>) [sequential]"));
        assert!(text.contains("behaviors: occurrence, returns"));
        assert!(text.contains("[ICalc] calc.add(1, 2) x2 -> #1"));
        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["invocations"][0]["count"], 2);
    }
}
