//! coresim: interactive multi-core CPU scheduling emulator.

mod console;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "coresim",
    version,
    about = "Interactive multi-core CPU scheduling emulator",
    long_about = "coresim emulates a multi-core CPU running synthetic processes under a\n\
                  pluggable scheduling policy (FCFS or Round-Robin). Configure the machine\n\
                  in a config file, then drive it from the interactive console."
)]
struct Cli {
    /// Path to the machine configuration file
    #[arg(long, default_value = "config.txt")]
    config: PathBuf,

    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut console = console::Console::new(cli.config, !cli.no_color);
    match console.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Fatal error: {err}");
            ExitCode::FAILURE
        }
    }
}
