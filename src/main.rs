mod business;
mod cli;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let level = match args.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    if let Err(e) = business::handle_command(args.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
