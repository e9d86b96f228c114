//! FuncPlay CLI
//!
//! ```bash
//! funcplay run --language lisp solution.scm
//! funcplay test --problem problems/square.json solution.scm
//! funcplay grade --problems problems/ --id square solution.scm --json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use funcplay::platform::{InMemoryProblemRepository, MemorySubmissionSink};
use funcplay::{Engine, EngineConfig, ExecutionResult, Grader, Language, OutputLine, Problem};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "funcplay")]
#[command(version)]
#[command(about = "Run, test and grade FuncPlay submissions", long_about = None)]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(short, long, global = true, env = "FUNCPLAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the structured result as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file
    Run {
        #[arg(short, long)]
        language: Language,
        file: PathBuf,
    },

    /// Run a problem's test cases against a source file
    Test {
        /// Problem definition (JSON)
        #[arg(short, long, value_name = "PROBLEM")]
        problem: PathBuf,
        file: PathBuf,
    },

    /// Execute, test and grade a source file against a problem
    Grade {
        /// Directory of problem definitions
        #[arg(long, value_name = "DIR")]
        problems: PathBuf,
        #[arg(long)]
        id: String,
        file: PathBuf,
    },
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_lines(lines: &[OutputLine]) {
    for line in lines {
        println!("[{}] {}", line.kind, line.content);
    }
}

fn report(result: &ExecutionResult, json: bool) -> anyhow::Result<bool> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print_lines(&result.output);
        println!(
            "{} in {} ms",
            if result.success { "succeeded" } else { "failed" },
            result.elapsed_time_ms
        );
    }
    Ok(result.success)
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let engine = Arc::new(Engine::new(config));

    match cli.command {
        Commands::Run { language, file } => {
            let code = read_source(&file)?;
            let result = engine.execute(language, &code).await;
            report(&result, cli.json)
        }
        Commands::Test { problem, file } => {
            let problem = Problem::from_json_file(&problem)?;
            let code = read_source(&file)?;
            let result = engine
                .run_tests(
                    problem.language,
                    &code,
                    &problem.test_cases,
                    problem.entry_point.as_deref(),
                )
                .await;
            report(&result, cli.json)
        }
        Commands::Grade { problems, id, file } => {
            let repository = InMemoryProblemRepository::from_dir(&problems)?;
            info!(problems = repository.len(), "problem set loaded");
            let code = read_source(&file)?;
            let grader = Grader::new(
                engine,
                Arc::new(repository),
                Arc::new(MemorySubmissionSink::new()),
            );
            let grade = grader.run_and_grade(&id, &code).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&grade)?);
            } else {
                print_lines(&grade.output);
                match &grade.receipt {
                    Some(receipt) => println!("submitted: {}", receipt.0),
                    None => println!("not submitted"),
                }
            }
            Ok(grade.success)
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FUNCPLAY_LOG")
                .unwrap_or_else(|_| EnvFilter::new("funcplay=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}
