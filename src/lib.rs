//! Call-arrangement and dispatch engine for a mocking framework.
//!
//! A [`Repository`] holds arrangements (call patterns with behaviors) and
//! recorded invocations, both indexed by a [`tree::MatcherTree`]. An
//! interception source hands every intercepted call to
//! [`Repository::dispatch`], which picks the winning arrangement, records the
//! call and runs the behavior pipeline. The `mockwire` binary replays YAML
//! scenarios through the same engine.

pub mod arrangement;
pub mod behavior;
pub mod call_pattern;
pub mod cli;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod dump;
pub mod error;
pub mod formatter;
pub mod fs;
pub mod invocation;
pub mod logging;
pub mod matcher;
pub mod method;
pub mod mixin;
pub mod occurrence;
pub mod repository;
pub mod scenario;
pub mod tree;
pub mod value;

#[cfg(test)]
pub mod testutil;

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use rayon::prelude::*;

pub use arrangement::{ArrangementHandle, ArrangementId};
pub use behavior::{Behavior, Occurs};
pub use call_pattern::{ArgFilter, CallPattern};
pub use config::EngineConfig;
pub use context::CallContext;
pub use dispatch::Resolution;
pub use error::{AssertionFailure, ConfigurationError, MockError};
pub use invocation::Invocation;
pub use matcher::{Matcher, Predicate};
pub use method::{MethodInfo, MethodRole};
pub use mixin::MockBehavior;
pub use repository::Repository;
pub use value::{ObjectRef, TypeDesc, Value};

use cli::Args;
use config::load_config;
use formatter::create_formatter;
use fs::discover_scenarios;
use logging::{LOG_ENV, filter_directive, init_logging};
use scenario::{ReplayOptions, ScenarioReport, replay_file};

/// Replay scenarios. Returns the exit code: 0 = all passed, 1 = failures.
pub fn run(args: Args) -> Result<i32> {
    let env_filter = std::env::var(LOG_ENV).ok();
    init_logging(&filter_directive(
        args.log_level,
        args.debug,
        env_filter.as_deref(),
    ));

    let config_start = std::time::Instant::now();
    let config = load_config(args.config.as_deref())?;
    let config_elapsed = config_start.elapsed();

    if args.debug {
        eprintln!("debug: config loading total: {config_elapsed:.0?}");
        if let Some(dir) = config.config_dir() {
            eprintln!("debug: config loaded from: {}", dir.display());
        } else {
            eprintln!("debug: no config file found");
        }
        eprintln!("debug: engine config: {:?}", config.engine());
        eprintln!("debug: global excludes: {:?}", config.global_excludes());
    }

    let files = discover_scenarios(&args.paths, &config)?;

    // --list-target-files: print discovered scenarios and exit
    if args.list_target_files {
        for file in &files {
            println!("{}", file.display());
        }
        return Ok(0);
    }

    if args.debug {
        eprintln!("debug: {} scenarios to replay", files.len());
    }

    let options = ReplayOptions {
        engine: config.engine().clone(),
        dump: args.dump,
    };
    let replay_start = std::time::Instant::now();
    let failed = AtomicBool::new(false);
    let reports: Vec<ScenarioReport> = files
        .par_iter()
        .filter_map(|path| {
            // --fail-fast: skip remaining scenarios once one has failed
            if args.fail_fast && failed.load(Ordering::Relaxed) {
                return None;
            }
            let report = replay_file(path, &options);
            if !report.passed() {
                failed.store(true, Ordering::Relaxed);
            }
            Some(report)
        })
        .collect();

    if args.debug {
        eprintln!("debug: replay wall clock: {:.0?}", replay_start.elapsed());
    }

    create_formatter(&args.format).print(&reports);

    if reports.iter().all(ScenarioReport::passed) {
        Ok(0)
    } else {
        Ok(1)
    }
}
