use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::config::PartitionConfig;
use crate::dataset::Feature;
use crate::error::{Error, Result};
use crate::io;
use crate::layout::OutputLayout;
use crate::partitioner::{self, PartitionResult};
use crate::report::{
    DetailLedger, DetailRow, InitialStatus, ProcessingStatus, SummaryLedger, SummaryRow,
};
use crate::trace;

/// Reported after each dataset finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub dataset: String,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.completed * 100 / self.total) as u8
    }
}

pub type ProgressFn<'a> = &'a (dyn Fn(&Progress) + Sync);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub summary: Vec<SummaryRow>,
    pub details: Vec<DetailRow>,
}

struct DatasetOutcome {
    summary: SummaryRow,
    details: Vec<DetailRow>,
}

impl DatasetOutcome {
    fn skipped(row: SummaryRow) -> Self {
        Self {
            summary: row,
            details: Vec::new(),
        }
    }
}

pub struct BatchRunner {
    layout: OutputLayout,
    config: PartitionConfig,
}

impl BatchRunner {
    pub fn new(layout: OutputLayout, config: PartitionConfig) -> Self {
        Self { layout, config }
    }

    /// Validates and partitions every input file, then writes both ledgers.
    ///
    /// A dataset that cannot be read, or is not in WGS84, becomes a summary
    /// row; it never stops the batch. Rows from earlier runs for datasets
    /// processed again are replaced.
    ///
    /// Stores are named after the file stem, so only the first input with a
    /// given stem is processed. Later ones are skipped as `DUPLICATE_NAME`.
    pub fn run(&self, inputs: &[PathBuf], progress: Option<ProgressFn<'_>>) -> Result<BatchReport> {
        self.layout.create_dirs()?;

        let (datasets, unsupported): (Vec<&PathBuf>, Vec<&PathBuf>) =
            inputs.iter().partition(|p| io::is_dataset_path(p));
        info!(
            datasets = datasets.len(),
            unsupported = unsupported.len(),
            "starting batch"
        );

        let mut first_by_stem: HashMap<String, usize> = HashMap::new();
        let jobs: Vec<(&Path, Option<&Path>)> = datasets
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let first = *first_by_stem.entry(io::dataset_stem(path)).or_insert(i);
                (path.as_path(), (first != i).then(|| datasets[first].as_path()))
            })
            .collect();

        let completed = AtomicUsize::new(0);
        let outcomes: Vec<DatasetOutcome> = jobs
            .par_iter()
            .map(|&(path, taken_by)| {
                let outcome = match taken_by {
                    Some(first) => reject_duplicate(path, first),
                    None => self.process_dataset(path),
                };
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(report) = progress {
                    report(&Progress {
                        completed: done,
                        total: datasets.len(),
                        dataset: outcome.summary.dataset.clone(),
                    });
                }
                outcome
            })
            .collect();

        let mut report = BatchReport::default();
        for outcome in outcomes {
            report.summary.push(outcome.summary);
            report.details.extend(outcome.details);
        }
        for path in unsupported {
            report.summary.push(self.set_aside_unsupported(path));
        }

        self.write_ledgers(&report)?;
        info!(
            datasets = report.summary.len(),
            features = report.details.len(),
            "batch finished"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn process_dataset(&self, path: &Path) -> DatasetOutcome {
        let file_name = file_name(path);

        let mut dataset = match io::load_dataset(path) {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!(error = %e, "dataset could not be read");
                return DatasetOutcome::skipped(SummaryRow::skipped(
                    file_name,
                    InitialStatus::Unreadable,
                    format!("Could not open dataset: {e}"),
                ));
            }
        };

        if let Err(rejection) = partitioner::gate(&dataset) {
            warn!(crs = %dataset.crs, "{rejection}, setting dataset aside");
            if let Err(e) = copy_into(path, &self.layout.invalid_global_dir()) {
                warn!(error = %e, "failed to copy rejected dataset");
            }
            return DatasetOutcome::skipped(SummaryRow::skipped(
                file_name,
                InitialStatus::WrongEpsg,
                rejection.to_string(),
            ));
        }

        trace::inject_ids(&mut dataset);
        let dataset = trace::explode_multipart(dataset);

        match partitioner::partition_into(&dataset, &self.layout, &self.config) {
            Ok(result) => DatasetOutcome {
                summary: summary_row(file_name, &result),
                details: result.rows,
            },
            Err(e) => {
                warn!(error = %e, "failed to write partitioned stores");
                DatasetOutcome::skipped(SummaryRow::skipped(
                    file_name,
                    InitialStatus::PassedPrecheck,
                    format!("Could not write outputs: {e}"),
                ))
            }
        }
    }

    fn set_aside_unsupported(&self, path: &Path) -> SummaryRow {
        warn!(path = %path.display(), "not a dataset file");
        if let Err(e) = copy_into(path, &self.layout.unsupported_dir()) {
            warn!(error = %e, "failed to copy unsupported file");
        }
        SummaryRow::skipped(
            file_name(path),
            InitialStatus::Unsupported,
            "Not a trigger GIS file",
        )
    }

    fn write_ledgers(&self, report: &BatchReport) -> Result<()> {
        let rerun: HashSet<&str> = report.summary.iter().map(|r| r.dataset.as_str()).collect();

        let summary_path = self.layout.summary_ledger();
        let mut summary = SummaryLedger::load(&summary_path)?;
        summary.rows.retain(|r| !rerun.contains(r.dataset.as_str()));
        summary.rows.extend(report.summary.iter().cloned());
        summary.save(&summary_path)?;

        let stems: HashSet<&str> = report.details.iter().map(|r| r.dataset.as_str()).collect();
        let detail_path = self.layout.detail_ledger();
        let mut details = DetailLedger::load(&detail_path)?;
        details.rows.retain(|r| !stems.contains(r.dataset.as_str()));
        details.rows.extend(report.details.iter().cloned());
        details.save(&detail_path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn reject_duplicate(path: &Path, first: &Path) -> DatasetOutcome {
    let stem = io::dataset_stem(path);
    warn!(path = %path.display(), first = %first.display(), "dataset name already used in this batch");
    DatasetOutcome::skipped(SummaryRow::skipped(
        file_name(path),
        InitialStatus::DuplicateName,
        format!("Dataset name '{stem}' already used by {}", first.display()),
    ))
}

fn copy_into(path: &Path, dir: &Path) -> Result<()> {
    let target = dir.join(file_name(path));
    fs::copy(path, &target).map_err(|e| Error::io(&target, e))?;
    Ok(())
}

fn summary_row(dataset: String, result: &PartitionResult) -> SummaryRow {
    let stats = result.stats;
    let mut notes = Vec::new();
    if stats.review > 0 {
        notes.push(format!("{} features for review", stats.review));
    }
    if stats.candidates > 0 {
        notes.push(format!("{} small polygons found", stats.candidates));
    }

    SummaryRow {
        dataset,
        initial_status: InitialStatus::PassedPrecheck,
        processing_status: if stats.has_issues() {
            ProcessingStatus::ProcessedWithIssues
        } else {
            ProcessingStatus::ProcessedClean
        },
        stats: Some(stats),
        attribute_summary: result.attribute_summary.to_string(),
        notes: if notes.is_empty() {
            "All features are valid.".to_string()
        } else {
            notes.join(" ")
        },
    }
}

/// Merges every valid store into one collection. Returns `None` when there
/// is nothing to merge.
pub fn consolidate_valid(layout: &OutputLayout) -> Result<Option<PathBuf>> {
    let dir = layout.valid_dir();
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(&dir, e)),
    };

    let mut stores: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("geojson"))
        .collect();
    stores.sort();

    let mut features: Vec<Feature> = Vec::new();
    for store in &stores {
        match io::read_features(store) {
            Ok(found) => features.extend(found),
            Err(e) => warn!(error = %e, "skipping unreadable valid store"),
        }
    }
    if features.is_empty() {
        return Ok(None);
    }

    let path = layout.consolidated();
    io::write_collection(&path, "consolidated_valid_features", &features)?;
    info!(features = features.len(), path = %path.display(), "consolidated valid features");
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::PartitionStats;

    #[test]
    fn progress_percent() {
        let progress = Progress {
            completed: 1,
            total: 3,
            dataset: "a.geojson".into(),
        };
        assert_eq!(progress.percent(), 33);
        let done = Progress {
            completed: 0,
            total: 0,
            dataset: String::new(),
        };
        assert_eq!(done.percent(), 100);
    }

    #[test]
    fn summary_notes_follow_counts() {
        let mut result = PartitionResult {
            stats: PartitionStats {
                total: 3,
                valid_large: 3,
                ..Default::default()
            },
            rows: Vec::new(),
            attribute_summary: "N/A",
        };
        let row = summary_row("plots.geojson".into(), &result);
        assert_eq!(row.processing_status, ProcessingStatus::ProcessedClean);
        assert_eq!(row.notes, "All features are valid.");

        result.stats.review = 2;
        result.stats.candidates = 1;
        let row = summary_row("plots.geojson".into(), &result);
        assert_eq!(row.processing_status, ProcessingStatus::ProcessedWithIssues);
        assert_eq!(row.notes, "2 features for review 1 small polygons found");
    }

    #[test]
    fn nothing_to_consolidate() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        assert_eq!(consolidate_valid(&layout).unwrap(), None);
        layout.create_dirs().unwrap();
        assert_eq!(consolidate_valid(&layout).unwrap(), None);
    }
}
