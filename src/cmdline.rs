use crate::backends::registered;
use crate::bench::DEFAULT_PRESET;
use crate::*;
use clap::ValueHint::FilePath;
use clap::{Args, Parser, Subcommand};
use log::{debug, error};
use std::fs::read_to_string;

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(short = 'c')]
    #[arg(value_hint = FilePath)]
    #[arg(help = "Path to the benchmark's TOML config file (default: built-in preset)")]
    config: Option<String>,
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the benchmark against every configured backend")]
    Run(RunArgs),
    #[command(about = "List all registered backends")]
    List,
}

fn run_cli(args: &RunArgs) -> Result<()> {
    let opt = match args.config.as_ref() {
        Some(path) => read_to_string(path)?,
        None => DEFAULT_PRESET.to_string(),
    };
    let (benchmark, mut backends) = crate::bench::init(&opt)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let res = crate::bench::run(&benchmark, &mut backends).await;
        // tear down connections whether the run succeeded or not
        let closed = crate::bench::shutdown(&mut backends).await;
        res.and(closed)
    })
}

fn list_cli() {
    for name in registered() {
        println!("Registered backend: {}", name);
    }
}

/// The default command line interface.
///
/// ## Usage
///
/// To get the usage of the command line interface, users can run:
///
/// ```bash
/// lookupbench -h
/// ```
///
/// The interface supports two modes, `run` and `list`.
///
/// ### Run Mode
///
/// Usage:
///
/// ```bash
/// lookupbench run [-c <CONFIG>]
/// ```
///
/// Where `CONFIG` is the path to a benchmark configuration file. For its format, refer to the
/// documentation of [`crate::bench`]. Without `-c`, the built-in preset is used: production
/// sizes against `redis` at `redis:6379`, then `postgres` at `postgres`.
///
/// The process exits with code 0 once every backend has been shut down, or with code 1 if any
/// phase failed.
///
/// ### List Mode
///
/// Usage:
/// ``` bash
/// lookupbench list
/// ```
///
/// This command lists all registered backends' names.
pub fn cmdline() {
    env_logger::init();
    let cli = Cli::parse();
    debug!("Starting lookupbench with args: {:?}", cli);
    match cli.command {
        Commands::Run(args) => {
            if let Err(e) = run_cli(&args) {
                error!("Benchmark failed: {}", e);
                std::process::exit(1);
            }
            // background connection tasks must not keep the process alive
            std::process::exit(0);
        }
        Commands::List => list_cli(),
    }
}
