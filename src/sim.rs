//! Demo, single-run, and stress-sweep runners for the CLI.

use std::thread;
use std::time::Duration;

use tracing::info;

use crate::config::{DequeueMode, PipelineConfig, Schedule, Strategy};
use crate::error::Result;
use crate::pipeline::{Pipeline, RunReport};
use crate::types::TaskId;

// Demo timing knobs (small for quick CLI feedback).
const DEMO_TASKS: usize = 10;
const DEMO_WORK_MS: u64 = 100;
const DEMO_HEAD_START_MS: u64 = 20;
// Default per-task work for `run` and `stress`.
const DEFAULT_WORK_MS: u64 = 50;

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    use libc::{RUSAGE_SELF, getrusage, rusage};
    // SAFETY: rusage is plain old data; all-zero is a valid value.
    let mut usage: rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { getrusage(RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

fn available_cpus() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Options for a single `run` invocation; `None` keeps the default.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub tasks: Option<usize>,
    pub work_ms: Option<u64>,
    pub strategy: Option<Strategy>,
    pub sequential: bool,
    pub dequeue: Option<DequeueMode>,
    pub fail: bool,
    pub seed: Option<u64>,
}

impl RunOptions {
    fn into_config(self) -> Result<PipelineConfig> {
        let tasks = self.tasks.unwrap_or(DEMO_TASKS);
        let work = Duration::from_millis(self.work_ms.unwrap_or(DEFAULT_WORK_MS));
        let schedule = if self.sequential {
            Schedule::Sequential
        } else {
            Schedule::default()
        };
        let mut builder = PipelineConfig::builder()
            .tasks(tasks)
            .work(work)
            .strategy(self.strategy.unwrap_or(Strategy::AsyncPerTask))
            .schedule(schedule)
            .dequeue(self.dequeue.unwrap_or_default())
            .seed(self.seed.unwrap_or(0));
        // Fault the middle task to show per-index isolation.
        if self.fail && tasks > 0 {
            builder = builder.fault((tasks / 2) as TaskId);
        }
        builder.build()
    }
}

fn print_report(report: &RunReport) {
    println!(
        "strategy={} tasks={} dispatched={} shortfall={} failures={} complete={} elapsed_ms={}",
        report.strategy,
        report.expected,
        report.results.len(),
        report.shortfall,
        report.results.failures().len(),
        report.is_complete(),
        report.elapsed.as_millis()
    );
    for (index, line) in report.render_slots().iter().enumerate() {
        println!("slot[{index}]={line}");
    }
}

/// Run the default demo: concurrent producer/dispatcher with per-task threads.
pub fn run_demo() -> Result<()> {
    info!("demo start");
    let config = PipelineConfig::builder()
        .tasks(DEMO_TASKS)
        .work(Duration::from_millis(DEMO_WORK_MS))
        .strategy(Strategy::AsyncPerTask)
        .schedule(Schedule::Concurrent {
            head_start: Duration::from_millis(DEMO_HEAD_START_MS),
        })
        .seed(rand::random())
        .build()?;
    let report = Pipeline::new(config)?.run()?;

    println!("DEMO SUMMARY");
    println!("available_cpus={}", available_cpus());
    println!("strategy={} tasks={}", report.strategy, report.expected);
    if report.results.is_empty() {
        println!("results=[]");
    } else {
        println!("results={:?}", report.render_slots());
    }
    println!("shortfall={}", report.shortfall);
    println!("failures={}", report.results.failures().len());
    Ok(())
}

/// Run once with the given overrides and print every slot.
pub fn run_once(options: RunOptions) -> Result<()> {
    let config = options.into_config()?;
    let report = Pipeline::new(config)?.run()?;
    print_report(&report);
    Ok(())
}

/// Sweep task counts and strategies, printing one CSV row per run.
pub fn run_stress(
    task_sets: Option<Vec<usize>>,
    strategy_sets: Option<Vec<Strategy>>,
    work_ms: Option<u64>,
) -> Result<()> {
    let task_sets = task_sets.unwrap_or_else(|| vec![1, 10, 50]);
    let strategy_sets = strategy_sets.unwrap_or_else(|| {
        vec![
            Strategy::Inline,
            Strategy::AsyncPerTask,
            Strategy::Pool {
                workers: available_cpus(),
            },
        ]
    });
    let work = Duration::from_millis(work_ms.unwrap_or(DEFAULT_WORK_MS));

    // Validate the whole sweep before running any of it.
    let mut configs = Vec::new();
    for tasks in task_sets.iter().copied() {
        for strategy in strategy_sets.iter().copied() {
            configs.push(
                PipelineConfig::builder()
                    .tasks(tasks)
                    .work(work)
                    .strategy(strategy)
                    .schedule(Schedule::Sequential)
                    .build()?,
            );
        }
    }

    println!("tasks,strategy,dispatched,shortfall,failures,elapsed_ms,cpu_user_s,cpu_sys_s");
    for config in configs {
        let cpu_start = cpu_times_seconds();
        let report = Pipeline::new(config)?.run()?;
        let (cpu_user, cpu_sys) = match (cpu_start, cpu_times_seconds()) {
            (Some((user_start, sys_start)), Some((user_end, sys_end))) => (
                format!("{:.4}", user_end - user_start),
                format!("{:.4}", sys_end - sys_start),
            ),
            _ => ("NA".to_string(), "NA".to_string()),
        };
        println!(
            "{},{},{},{},{},{},{},{}",
            report.expected,
            report.strategy,
            report.results.len(),
            report.shortfall,
            report.results.failures().len(),
            report.elapsed.as_millis(),
            cpu_user,
            cpu_sys
        );
        if report.shortfall > 0 {
            eprintln!("# warning,shortfall,{}", report.shortfall);
        }
    }
    Ok(())
}
