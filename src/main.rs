mod collector;
mod config;
mod dispatcher;
mod error;
mod logging;
mod pipeline;
mod producer;
mod sim;
mod task_queue;
mod types;

use config::{DequeueMode, Strategy, parse_task_count};
use error::PipelineError;
use sim::RunOptions;

fn parse_usize_list(arg: &str) -> Option<Vec<usize>> {
    if arg == "-" {
        return None;
    }
    let mut values = Vec::new();
    for part in arg.split(',') {
        if part.trim().is_empty() {
            return None;
        }
        let value = part.trim().parse::<usize>().ok()?;
        values.push(value);
    }
    Some(values)
}

fn parse_strategy_list(arg: &str) -> Result<Vec<Strategy>, PipelineError> {
    arg.split(',').map(|part| part.trim().parse()).collect()
}

fn print_usage(program: &str) {
    println!("Task Pipeline CLI");
    println!("Usage:");
    println!("  {program} (run demo)");
    println!("  {program} run [tasks] [work_ms] [strategy] [sequential] [wait] [dequeue=MODE] [fail] [seed=N]");
    println!("  {program} stress [task_sets] [strategy_sets] [work_ms]");
    println!("  {program} --help");
    println!();
    println!("Strategies: inline, async-per-task (or async), pool:<workers>.");
    println!("Sets are comma-separated lists (e.g., 1,10,50 or inline,pool:4). Use \"-\" to keep defaults.");
    println!("Defaults:");
    println!("  run    tasks=10 work_ms=50 strategy=async-per-task, concurrent with head start");
    println!("  stress tasks=1,10,50 strategies=inline,async-per-task,pool:<cpus> work_ms=50");
    println!("Flags:");
    println!("  sequential  run the producer to completion before dispatching");
    println!("  wait        dispatcher waits for tasks instead of skipping empty polls");
    println!("  dequeue=M   dequeue mode: skip (default) or wait");
    println!("  fail        make the middle task terminate abnormally");
    println!("Set RUST_LOG to control log output (stderr).");
}

fn exit_with_usage(program: &str, message: &str) -> ! {
    eprintln!("{message}");
    print_usage(program);
    std::process::exit(2);
}

fn parse_run_args(program: &str, args: impl Iterator<Item = String>) -> RunOptions {
    let mut options = RunOptions::default();
    for arg in args {
        match arg.as_str() {
            "sequential" => options.sequential = true,
            "wait" => options.dequeue = Some(DequeueMode::Wait),
            "fail" => options.fail = true,
            _ => {
                if let Some(mode) = arg.strip_prefix("dequeue=") {
                    match mode.parse::<DequeueMode>() {
                        Ok(mode) => options.dequeue = Some(mode),
                        Err(e) => exit_with_usage(program, &format!("run: {e}")),
                    }
                } else if let Some(seed) = arg.strip_prefix("seed=") {
                    match seed.parse::<u64>() {
                        Ok(seed) => options.seed = Some(seed),
                        Err(_) => exit_with_usage(program, &format!("run: invalid seed: {seed}")),
                    }
                } else if options.tasks.is_none() {
                    match parse_task_count(&arg) {
                        Ok(tasks) => options.tasks = Some(tasks),
                        Err(e) => exit_with_usage(program, &format!("run: {e}")),
                    }
                } else if options.work_ms.is_none() {
                    match arg.parse::<u64>() {
                        Ok(ms) => options.work_ms = Some(ms),
                        Err(_) => {
                            exit_with_usage(program, &format!("run: invalid work_ms value: {arg}"))
                        }
                    }
                } else if options.strategy.is_none() {
                    match arg.parse::<Strategy>() {
                        Ok(strategy) => options.strategy = Some(strategy),
                        Err(e) => exit_with_usage(program, &format!("run: {e}")),
                    }
                } else {
                    exit_with_usage(program, &format!("run: unexpected argument: {arg}"));
                }
            }
        }
    }
    options
}

fn main() {
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "task_pipeline".to_string());
    if let Err(e) = logging::init(&logging::LogConfig::default()) {
        eprintln!("logging disabled: {e}");
    }

    let mut args = std::env::args().skip(1);
    let outcome = match args.next().as_deref() {
        Some("run") => sim::run_once(parse_run_args(&program, args)),
        Some("stress") => {
            let task_sets = match args.next() {
                Some(arg) if arg != "-" => match parse_usize_list(&arg) {
                    Some(values) => Some(values),
                    None => exit_with_usage(&program, &format!("stress: invalid task_sets value: {arg}")),
                },
                _ => None,
            };
            let strategy_sets = match args.next() {
                Some(arg) if arg != "-" => match parse_strategy_list(&arg) {
                    Ok(values) => Some(values),
                    Err(e) => exit_with_usage(&program, &format!("stress: {e}")),
                },
                _ => None,
            };
            let work_ms = match args.next() {
                Some(arg) => match arg.parse::<u64>() {
                    Ok(ms) => Some(ms),
                    Err(_) => exit_with_usage(&program, &format!("stress: invalid work_ms value: {arg}")),
                },
                None => None,
            };
            if let Some(extra) = args.next() {
                exit_with_usage(&program, &format!("stress: unexpected argument: {extra}"));
            }
            sim::run_stress(task_sets, strategy_sets, work_ms)
        }
        Some("--help") | Some("-h") | Some("help") => {
            print_usage(&program);
            Ok(())
        }
        Some(other) => exit_with_usage(&program, &format!("unknown command: {other}")),
        None => sim::run_demo(),
    };

    if let Err(e) = outcome {
        exit_with_usage(&program, &e.to_string());
    }
}
