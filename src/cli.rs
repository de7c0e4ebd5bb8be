use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tablesmith", version, about = "Cross-database table copy tool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy the rows of every shared table between two connections
    CopyTables {
        /// Source connection name from the config file
        #[arg(long, default_value = "source")]
        from: String,

        /// Destination connection name from the config file
        #[arg(long, default_value = "destination")]
        to: String,

        /// Rows fetched per page
        #[arg(long, default_value_t = 1000, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        batch: usize,

        /// Skip tables missing at the destination instead of aborting
        #[arg(long)]
        ignore_missing_tables: bool,

        /// Empty each destination table right before copying into it
        #[arg(long)]
        truncate_before_insert: bool,

        /// Run the whole copy, then roll back instead of committing
        #[arg(long)]
        dry_run: bool,

        /// Suppress the progress bar
        #[arg(short, long)]
        quiet: bool,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run the configured structure commands against one connection
    CreateStructure {
        /// Connection name handed to the commands via TABLESMITH_CONNECTION
        #[arg(long, default_value = "destination")]
        name: String,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
