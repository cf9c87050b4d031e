use anyhow::Result;
use clap::Parser;

use njtrees::pipeline::{self, Config};

mod cli;
use cli::Cli;

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    env_logger::Builder::new()
        .filter_level(cli.log.into())
        .init();

    let config = Config {
        input_dir: cli.input_dir,
        output_dir: cli.output_dir,
        bootstrap: cli.bootstrap,
        seed: cli.seed,
    };
    let summary = pipeline::run(&config)?;
    println!("{summary}");
    Ok(())
}
