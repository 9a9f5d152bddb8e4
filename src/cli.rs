//! CLI argument definitions and command execution.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use doifetch_core::acquire::{RunOptions, run};
use doifetch_core::metadata::{MemberId, build_metadata_sources};
use doifetch_core::status::{StatusRow, StatusSummary, write_csv};
use doifetch_core::{Settings, Work, build_default_registry, data, form_dois_from_input};

/// Download metadata and full-text for articles given their DOIs.
#[derive(Debug, Parser)]
#[command(name = "doifetch", version, about)]
pub struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download the metadata and full-text for the DOIs.
    Acquire {
        /// Only acquire metadata, not full-text.
        #[arg(long)]
        only_metadata: bool,

        /// 1-based item number to resume the batch from.
        #[arg(long, default_value_t = 1)]
        start_from: usize,

        /// Restrict processing to these member IDs (applied after the
        /// metadata fetch). Repeatable.
        #[arg(long = "member-id")]
        member_ids: Vec<String>,

        /// Disable the progress bar.
        #[arg(long)]
        no_progress: bool,

        /// Either a sequence of DOIs or the path to a file containing DOIs.
        #[arg(required = true)]
        dois: Vec<String>,
    },

    /// Show the status of the data directory.
    Status {
        /// Path to write per-work rows as CSV.
        #[arg(long)]
        output_path: Option<PathBuf>,

        /// Either a sequence of DOIs or the path to a file containing DOIs;
        /// when omitted, the whole data directory is inspected.
        dois: Vec<String>,
    },

    /// Show configuration settings.
    ShowConfig,
}

/// Executes the parsed command.
///
/// # Errors
///
/// Returns an error for operator-level failures (bad configuration,
/// unreadable data directory); per-item acquisition failures are logged
/// and reflected in the summary instead.
pub async fn execute(cli: Cli) -> Result<()> {
    let settings = Settings::from_env().context("could not load settings")?;

    match cli.command {
        Command::Acquire {
            only_metadata,
            start_from,
            member_ids,
            no_progress,
            dois,
        } => {
            let dois = form_dois_from_input(&dois, true);
            if dois.is_empty() {
                info!("no valid DOIs in input; nothing to do");
                return Ok(());
            }

            let only_member_ids = parse_member_ids(&member_ids)?;

            let registry = build_default_registry(&settings);
            let metadata_sources = build_metadata_sources(&settings)
                .await
                .context("could not initialise metadata sources")?;

            let options = RunOptions {
                only_metadata,
                start_from,
                only_member_ids,
                show_progress: !no_progress,
            };

            let summary = run(&dois, &registry, &metadata_sources, &settings, &options).await;

            println!(
                "processed {} of {} (metadata ok {}, failed {}; full-text ok {}, failed {})",
                summary.n_processed,
                dois.len(),
                summary.n_metadata_ok,
                summary.n_metadata_failed,
                summary.n_fulltext_ok,
                summary.n_fulltext_failed,
            );

            Ok(())
        }

        Command::Status { output_path, dois } => {
            let works: Vec<Work> = if dois.is_empty() {
                data::collect_works(&settings).context("could not read the data directory")?
            } else {
                form_dois_from_input(&dois, true)
                    .iter()
                    .map(|doi| Work::new(doi, &settings))
                    .collect()
            };

            let rows: Vec<StatusRow> = works.iter().map(StatusRow::from_work).collect();

            if let Some(output_path) = output_path {
                write_csv(&rows, &output_path)
                    .with_context(|| format!("could not write {}", output_path.display()))?;
                info!(path = %output_path.display(), "wrote status CSV");
            }

            println!("{}", StatusSummary::from_rows(&rows).render());

            Ok(())
        }

        Command::ShowConfig => {
            print_settings(&settings);
            Ok(())
        }
    }
}

fn parse_member_ids(raw: &[String]) -> Result<Option<HashSet<MemberId>>> {
    if raw.is_empty() {
        return Ok(None);
    }

    let ids = raw
        .iter()
        .map(|value| {
            value
                .parse::<MemberId>()
                .with_context(|| format!("invalid member ID {value:?}"))
        })
        .collect::<Result<HashSet<_>>>()?;

    Ok(Some(ids))
}

fn print_settings(settings: &Settings) {
    println!("data_dir: {}", settings.data_dir.display());
    println!(
        "data_dir_n_groups: {}",
        settings
            .data_dir_n_groups
            .map_or_else(|| "none".to_string(), |n| n.to_string())
    );
    println!(
        "email_address: {}",
        settings.email_address.as_deref().unwrap_or("none")
    );
    println!(
        "encryption_passphrase: {}",
        if settings.encryption_passphrase.is_some() {
            "<set>"
        } else {
            "none"
        }
    );
    println!(
        "snapshot_path: {}",
        settings
            .snapshot_path
            .as_ref()
            .map_or_else(|| "none".to_string(), |path| path.display().to_string())
    );
    let order: Vec<String> = settings
        .format_preference_order
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("format_preference_order: {}", order.join(","));
    println!("skip_remaining_formats: {}", settings.skip_remaining_formats);
    println!(
        "metadata_compression_level: {}",
        settings.metadata_compression_level
    );
    println!("hostname: {}", settings.hostname);
}
