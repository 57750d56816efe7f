//! CLI entry point (spec.md §6): loads the configuration document, wires
//! every configured bird's outputs onto the reactor's timers, then runs
//! the reactor until stopped.

use clap::Parser;
use log::{error, info, LevelFilter};

use woodpecker_reactor::config::Config;
use woodpecker_reactor::controller::PeckScheduler;
use woodpecker_reactor::Reactor;

#[derive(Parser, Debug)]
#[command(
    name = "woodpecker",
    version,
    about = "Randomized output-peck scheduler over a single-threaded reactor",
    disable_version_flag = true
)]
struct Cli {
    /// Path to the YAML configuration document.
    #[arg(short, long)]
    config: String,

    /// Enable debug-level logging.
    #[arg(short, long)]
    debug: bool,

    /// Print version information and exit (spec.md §6: `-v/--version`).
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: (),
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(err) = run(cli) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&cli.config)?;
    info!(
        "loaded {} output(s), {} bird(s) from {}",
        config.outputs.len(),
        config.birds.len(),
        cli.config
    );

    let mut reactor: Reactor<PeckScheduler> = Reactor::create()?;
    PeckScheduler::register_from_config(&mut reactor, &config)?;

    reactor.run()?;
    Ok(())
}
