use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use log::LevelFilter;

/// Compiles a Pascal-subset source file into a stack-machine listing.
#[derive(ClapParser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the source file to compile.
    file: PathBuf,

    /// Write the listing here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .expect("logger can only be initialized once");

    let source = match std::fs::read_to_string(&cli.file) {
        Ok(s) => s,
        Err(e) => {
            log::error!("could not read '{}': {e}", cli.file.display());
            return ExitCode::FAILURE;
        }
    };

    match pascalc::compile(&source) {
        Ok(listing) => {
            if let Some(path) = cli.output {
                if let Err(e) = std::fs::write(&path, listing) {
                    log::error!("could not write '{}': {e}", path.display());
                    return ExitCode::FAILURE;
                }
            } else {
                print!("{listing}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
