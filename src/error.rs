//! Error types.
//!
//! `ConfigurationError`s are programmer mistakes caught at arrangement time.
//! `AssertionFailure`s are the "test failed" signal; host runners should
//! report them as failures, not crashes (see [`MockError::is_assertion`]).

use std::fmt::Write;

use thiserror::Error;

use crate::behavior::occurrence::Occurs;

#[derive(Debug, Clone, Error)]
pub enum MockError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
}

impl MockError {
    pub fn is_assertion(&self) -> bool {
        matches!(self, MockError::Assertion(_))
    }

    pub fn as_assertion(&self) -> Option<&AssertionFailure> {
        match self {
            MockError::Assertion(failure) => Some(failure),
            MockError::Configuration(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("cannot arrange {method}: {reason}")]
    IncompatibleMethod { method: String, reason: String },
    #[error("{method} takes {expected} argument(s) but the call pattern has {actual}")]
    ArgumentCountMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },
    #[error("matcher {matcher} is not supported in {position} of {method}")]
    UnsupportedMatcherPosition {
        method: String,
        position: String,
        matcher: String,
    },
    #[error("repository has been retired")]
    RetiredRepository,
    #[error("cannot {operation} while the repository is resolving a call on this thread")]
    Busy { operation: &'static str },
}

#[derive(Debug, Clone, Error)]
pub enum AssertionFailure {
    #[error("{}", occurrence_message("too few calls", .expected, .actual, .expression, .calls))]
    TooFewCalls {
        expected: Occurs,
        actual: usize,
        expression: Option<String>,
        calls: Vec<String>,
    },
    #[error("{}", occurrence_message("too many calls", .expected, .actual, .expression, .calls))]
    TooManyCalls {
        expected: Occurs,
        actual: usize,
        expression: Option<String>,
        calls: Vec<String>,
    },
    #[error("{expression}: called out of order; a later arrangement (#{last_executed}) already ran")]
    OutOfOrder {
        expression: String,
        last_executed: u64,
    },
    #[error("{expression}: expected to be called in order but was never called")]
    NeverCalledInOrder { expression: String },
    #[error("strict mock {mock}: unarranged call to {call}")]
    StrictViolation { mock: String, call: String },
    #[error("{}", aggregate_message(.0))]
    Aggregate(Vec<AssertionFailure>),
}

impl AssertionFailure {
    /// Collapse a list of failures into one: `None` when empty, the failure
    /// itself when single, otherwise a flattened `Aggregate`.
    pub fn aggregate(failures: Vec<AssertionFailure>) -> Option<AssertionFailure> {
        let mut flat = Vec::new();
        for failure in failures {
            match failure {
                AssertionFailure::Aggregate(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(AssertionFailure::Aggregate(flat)),
        }
    }

    /// Number of individual failures this value stands for.
    pub fn count(&self) -> usize {
        match self {
            AssertionFailure::Aggregate(inner) => inner.iter().map(Self::count).sum(),
            _ => 1,
        }
    }
}

fn occurrence_message(
    kind: &str,
    expected: &Occurs,
    actual: &usize,
    expression: &Option<String>,
    calls: &[String],
) -> String {
    let mut msg = String::new();
    if let Some(expr) = expression {
        let _ = write!(msg, "{expr}: ");
    }
    let _ = write!(
        msg,
        "occurrence expectation failed ({kind}). Expected {expected}, actual: {actual}."
    );
    if !calls.is_empty() {
        msg.push_str("\nCalls so far:");
        for (i, call) in calls.iter().enumerate() {
            let _ = write!(msg, "\n  {}. {call}", i + 1);
        }
    }
    msg
}

fn aggregate_message(failures: &[AssertionFailure]) -> String {
    let mut msg = format!("{} assertion failures:", failures.len());
    for (i, failure) in failures.iter().enumerate() {
        let _ = write!(msg, "\n{}) {failure}", i + 1);
    }
    msg
}
