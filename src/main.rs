use clap::Parser;
use colored::Colorize;
use fern::colors::{Color, ColoredLevelConfig};

use birdtag::cli::{run, Cli};

fn setup_logging(verbose: bool) -> Result<(), fern::InitError> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::BrightBlack);
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {} {}",
                chrono::Local::now().format("%H:%M:%S"),
                colors.color(record.level()),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = setup_logging(cli.verbose) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(1);
    }
}
