use crate::cli::Commands;
use std::time::Instant;
use tablesmith::config::load_config;
use tablesmith::core::{CopyError, RunParams};
use tablesmith::{drivers, ops};

pub async fn handle_command(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::CopyTables {
            from,
            to,
            batch,
            ignore_missing_tables,
            truncate_before_insert,
            dry_run,
            quiet,
            config,
        } => {
            let config = load_config(config)?;
            let source_url = config.connection_url(&from)?;
            let destination_url = config.connection_url(&to)?;

            let source = drivers::create_driver(source_url).await?;
            let destination = drivers::create_driver(destination_url).await?;

            let params = RunParams {
                batch_size: batch,
                ignore_missing_tables,
                truncate_before_insert,
                dry_run,
                quiet,
            };

            let started = Instant::now();
            let outcome = ops::copy_tables(
                source.as_ref(),
                destination.as_ref(),
                &config.ignore_tables,
                &params,
            )
            .await?;

            for (table, rows) in &outcome.rows_copied {
                println!("{table}: {rows} rows");
            }
            let terminal = if outcome.committed {
                "committed"
            } else {
                "rolled back (dry run)"
            };
            println!(
                "Copied {} rows across {} tables in {:.2?}, {terminal}.",
                outcome.total_rows,
                outcome.rows_copied.len(),
                started.elapsed()
            );
            Ok(())
        }

        Commands::CreateStructure { name, config } => {
            let config = load_config(config)?;
            let url = config.connection_url(&name)?;

            let commands = config
                .structure
                .as_ref()
                .map(|structure| structure.commands.as_slice())
                .unwrap_or_default();
            if commands.is_empty() {
                println!("No structure commands configured.");
                return Ok(());
            }

            for step in commands {
                println!("Running {}...", step.name);
                let started = Instant::now();

                // the command decides what to do with the connection URL
                let status = tokio::process::Command::new("sh")
                    .arg("-c")
                    .arg(&step.command)
                    .env("TABLESMITH_CONNECTION", url)
                    .status()
                    .await?;

                if !status.success() {
                    return Err(CopyError::StructureCommand {
                        name: step.name.clone(),
                        status: status.to_string(),
                    }
                    .into());
                }
                println!("{} finished in {:.2?}.", step.name, started.elapsed());
            }
            Ok(())
        }
    }
}
