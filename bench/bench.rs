//! Dispatch throughput benchmark.
//!
//! Usage:
//!   cargo run --release --bin bench_mockwire                  # all modes
//!   cargo run --release --bin bench_mockwire -- dispatch      # single repository
//!   cargo run --release --bin bench_mockwire -- parallel      # one repository per thread
//!   cargo run --release --bin bench_mockwire -- assert        # pattern assertions

use std::fmt::Write;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use rayon::prelude::*;

use mockwire::{
    CallContext, CallPattern, EngineConfig, Invocation, Matcher, MethodInfo, Occurs, Repository,
    TypeDesc, Value,
};

// --- CLI ---

#[derive(Parser)]
#[command(about = "Measure mockwire dispatch throughput.")]
struct Args {
    /// Mode: dispatch, parallel, assert, or omit for all
    #[arg(default_value = "all")]
    mode: String,

    /// Number of value-keyed arrangements registered before timing
    #[arg(long, default_value_t = 1000)]
    arrangements: usize,

    /// Number of dispatched calls per run
    #[arg(long, default_value_t = 100_000)]
    calls: usize,

    /// Write a markdown summary to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

struct Fixture {
    repo: Arc<Repository>,
    ctx: CallContext,
    add: Arc<MethodInfo>,
    mock: Value,
}

/// `ICalc.add(int, int)` with one catch-all arrangement followed by
/// `arrangements` arrangements keyed on the first argument.
fn fixture(arrangements: usize) -> Fixture {
    let iface = TypeDesc::interface("ICalc", vec![]);
    let add = MethodInfo::builder(&iface, "add")
        .param("a", TypeDesc::int())
        .param("b", TypeDesc::int())
        .returns(TypeDesc::int())
        .build();
    let repo = Repository::new(EngineConfig::default());
    let ctx = CallContext::new();
    let mock = match repo.create_named_mock(&iface, "calc", None) {
        Ok(object) => Value::Object(object),
        Err(e) => panic!("failed to create mock: {e}"),
    };
    let arrange = |instance: Matcher, first: Matcher, value: i64| {
        let pattern = CallPattern::new(add.clone(), instance, vec![first, Matcher::Any])
            .unwrap_or_else(|e| panic!("bad pattern: {e}"));
        repo.arrange(&ctx, pattern)
            .unwrap_or_else(|e| panic!("arrange failed: {e}"))
            .returns(value);
    };
    arrange(Matcher::Any, Matcher::of_type(TypeDesc::int()), -1);
    for i in 0..arrangements {
        arrange(Matcher::Reference(mock.clone()), Matcher::value(i as i64), i as i64);
    }
    Fixture {
        repo,
        ctx,
        add,
        mock,
    }
}

fn dispatch_calls(fx: &Fixture, calls: usize, spread: usize) -> i64 {
    let mut checksum = 0;
    for i in 0..calls {
        let first = (i % spread.max(1)) as i64;
        let mut invocation = Invocation::new(
            fx.add.clone(),
            Some(fx.mock.clone()),
            vec![Value::Int(first), Value::Int(1)],
        );
        if let Err(e) = fx.repo.dispatch(&fx.ctx, &mut invocation) {
            panic!("dispatch failed: {e}");
        }
        if let Some(Value::Int(v)) = invocation.outcome.return_value() {
            checksum += v;
        }
    }
    checksum
}

fn format_rate(calls: usize, seconds: f64) -> String {
    let rate = calls as f64 / seconds.max(f64::EPSILON);
    if rate >= 1_000_000.0 {
        format!("{:.2}M calls/s", rate / 1_000_000.0)
    } else {
        format!("{:.1}k calls/s", rate / 1_000.0)
    }
}

fn bench_dispatch(args: &Args) -> (String, String) {
    let fx = fixture(args.arrangements);
    let start = Instant::now();
    let checksum = dispatch_calls(&fx, args.calls, args.arrangements);
    let secs = start.elapsed().as_secs_f64();
    eprintln!("dispatch: {:.3}s (checksum {checksum})", secs);
    ("dispatch".to_string(), format_rate(args.calls, secs))
}

fn bench_parallel(args: &Args) -> (String, String) {
    let threads = rayon::current_num_threads();
    let per_thread = args.calls / threads.max(1);
    let start = Instant::now();
    let checksum: i64 = (0..threads)
        .into_par_iter()
        .map(|_| {
            let fx = fixture(args.arrangements);
            dispatch_calls(&fx, per_thread, args.arrangements)
        })
        .sum();
    let secs = start.elapsed().as_secs_f64();
    eprintln!("parallel ({threads} threads): {:.3}s (checksum {checksum})", secs);
    (
        format!("parallel x{threads} (incl. setup)"),
        format_rate(per_thread * threads, secs),
    )
}

fn bench_assert(args: &Args) -> (String, String) {
    let fx = fixture(args.arrangements);
    dispatch_calls(&fx, args.calls, args.arrangements);
    let rounds = 100;
    let start = Instant::now();
    for i in 0..rounds {
        let pattern = CallPattern::new(
            fx.add.clone(),
            Matcher::Reference(fx.mock.clone()),
            vec![Matcher::value(i as i64), Matcher::Any],
        )
        .unwrap_or_else(|e| panic!("bad pattern: {e}"));
        if let Err(e) = fx.repo.assert_pattern(&fx.ctx, &pattern, Some(Occurs::at_least_once())) {
            panic!("assertion failed: {e}");
        }
    }
    let secs = start.elapsed().as_secs_f64();
    eprintln!("assert: {:.3}s for {rounds} assertions", secs);
    (
        "assert_pattern".to_string(),
        format!("{:.1} us/assertion", secs * 1_000_000.0 / rounds as f64),
    )
}

fn main() {
    let args = Args::parse();
    let mut rows = Vec::new();
    match args.mode.as_str() {
        "dispatch" => rows.push(bench_dispatch(&args)),
        "parallel" => rows.push(bench_parallel(&args)),
        "assert" => rows.push(bench_assert(&args)),
        "all" => {
            rows.push(bench_dispatch(&args));
            rows.push(bench_parallel(&args));
            rows.push(bench_assert(&args));
        }
        other => {
            eprintln!("unknown mode: {other}");
            std::process::exit(2);
        }
    }

    let mut md = String::new();
    let _ = writeln!(
        md,
        "# mockwire bench\n\n{} arrangements, {} calls\n",
        args.arrangements, args.calls
    );
    let _ = writeln!(md, "| Benchmark | Result |");
    let _ = writeln!(md, "|-----------|--------|");
    for (name, result) in &rows {
        let _ = writeln!(md, "| {name} | {result} |");
    }
    print!("{md}");

    if let Some(output) = &args.output {
        if let Err(e) = fs::write(output, &md) {
            eprintln!("error: failed to write {}: {e}", output.display());
            std::process::exit(3);
        }
    }
}
