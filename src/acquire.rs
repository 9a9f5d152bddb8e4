//! Sequential batch driver: metadata then full-text, one DOI at a time.

use std::collections::HashSet;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::Settings;
use crate::doi::Doi;
use crate::metadata::{MemberId, MetadataSource};
use crate::publisher::PublisherRegistry;
use crate::work::Work;

/// Options for one batch run.
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Fetch metadata only; skip full-text acquisition.
    pub only_metadata: bool,
    /// 1-based position to resume from; earlier items are skipped.
    pub start_from: usize,
    /// When set, only works whose metadata member ID is in this set are
    /// processed (decided after the metadata fetch).
    pub only_member_ids: Option<HashSet<MemberId>>,
    /// Whether to render a progress bar.
    pub show_progress: bool,
}

/// Outcome counts for one batch run. Individual failures are visible in
/// the logs; these totals are the primary user-facing feedback.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Items processed (not skipped by `start_from` or the member filter).
    pub n_processed: usize,
    /// Items skipped by the member-ID filter.
    pub n_filtered: usize,
    /// Items whose metadata is present (pre-existing or just fetched).
    pub n_metadata_ok: usize,
    /// Items whose metadata could not be acquired.
    pub n_metadata_failed: usize,
    /// Items with at least one full-text format available after the run.
    pub n_fulltext_ok: usize,
    /// Items where no full-text format could be acquired.
    pub n_fulltext_failed: usize,
}

/// Runs the batch over the given DOIs in order.
///
/// Each item goes through: ensure metadata exists (fetch if not), apply
/// the member-ID filter, then acquire full-text. One item's failure never
/// aborts the rest of the batch.
pub async fn run(
    dois: &[Doi],
    registry: &PublisherRegistry,
    metadata_sources: &[MetadataSource],
    settings: &Settings,
    options: &RunOptions,
) -> RunSummary {
    let n_dois = dois.len();

    let progress_bar = if options.show_progress && n_dois > 1 {
        let bar = ProgressBar::new(n_dois as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
        {
            bar.set_style(style);
        }
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut summary = RunSummary::default();

    for (doi_num, doi) in dois.iter().enumerate() {
        if doi_num + 1 < options.start_from {
            progress_bar.inc(1);
            continue;
        }

        progress_bar.set_message(doi.to_string());

        process_doi(
            doi,
            registry,
            metadata_sources,
            settings,
            options,
            &mut summary,
        )
        .await;

        progress_bar.inc(1);
    }

    progress_bar.finish_and_clear();

    info!(
        processed = summary.n_processed,
        filtered = summary.n_filtered,
        metadata_ok = summary.n_metadata_ok,
        metadata_failed = summary.n_metadata_failed,
        fulltext_ok = summary.n_fulltext_ok,
        fulltext_failed = summary.n_fulltext_failed,
        "batch run finished"
    );

    summary
}

async fn process_doi(
    doi: &Doi,
    registry: &PublisherRegistry,
    metadata_sources: &[MetadataSource],
    settings: &Settings,
    options: &RunOptions,
    summary: &mut RunSummary,
) {
    let mut work = Work::new(doi, settings);

    if !work.metadata.exists() {
        if let Err(error) = work.metadata.acquire(metadata_sources).await {
            warn!(doi = %doi, error = %error, "metadata acquisition failed; skipping work");
            summary.n_processed += 1;
            summary.n_metadata_failed += 1;
            return;
        }
    }

    if let Some(only_member_ids) = &options.only_member_ids {
        match work.metadata.member_id() {
            Ok(member_id) if only_member_ids.contains(&member_id) => {}
            Ok(_) => {
                summary.n_filtered += 1;
                return;
            }
            Err(error) => {
                warn!(doi = %doi, error = %error, "could not read member ID for filtering");
                summary.n_filtered += 1;
                return;
            }
        }
    }

    summary.n_processed += 1;
    summary.n_metadata_ok += 1;

    if options.only_metadata {
        return;
    }

    if work.fulltext.acquire(registry, settings).await {
        summary.n_fulltext_ok += 1;
    } else {
        summary.n_fulltext_failed += 1;
    }
}
