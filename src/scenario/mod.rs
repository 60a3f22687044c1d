//! Scripted scenarios: YAML descriptions of types, mocks, arrangements, calls
//! and assertions, replayed against a fresh repository.

pub mod model;
pub mod runner;

pub use model::Scenario;
pub use runner::{
    ReplayOptions, ScenarioReport, StepKind, StepOutcome, StepResult, load_scenario, replay,
    replay_file,
};
