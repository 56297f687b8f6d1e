//! Core sorting logic for geosort.
//!
//! This module drives a run over a set of media files:
//! - Reading capture time and GPS position for every file
//! - Resolving every position to a place name through the `LocationResolver`
//! - Moving each file into its `<date> <place>` folder, or only printing the
//!   plan on a dry run
//!
//! All place names are resolved before the first file is moved, so a fatal
//! resolution error (bad API key, unwritable cache) leaves the files where
//! they were. The `Sorter` struct orchestrates the run while `SortResult`
//! tracks what happened to each file.

use log::{debug, info, warn};
use std::path::PathBuf;

use crate::cache::LocationCache;
use crate::error::ResolveError;
use crate::geocode::GeocodingService;
use crate::metadata::{MediaFileRecord, MetadataReader};
use crate::organize::{MoveResult, PlannedMove, execute_move, filesystem_date, plan_move};
use crate::resolver::{LocationResolver, ResolveStats};

/// Result of sorting one file
#[derive(Debug)]
pub enum SortResult {
    /// File was moved to its folder
    Moved(PlannedMove),
    /// Dry run: file would have been moved
    Planned(PlannedMove),
    /// Destination already existed, file left in place
    Skipped(PlannedMove),
    /// File could not be sorted
    Failed(PathBuf, String), // (path, error message)
}

/// Totals for a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortSummary {
    pub moved: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SortSummary {
    pub fn from_results(results: &[SortResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result {
                SortResult::Moved(_) => summary.moved += 1,
                SortResult::Planned(_) => summary.planned += 1,
                SortResult::Skipped(_) => summary.skipped += 1,
                SortResult::Failed(..) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Responsible for sorting media files into dated, place-named folders
pub struct Sorter<G, C> {
    resolver: LocationResolver<G, C>,
    dry_run: bool,
}

impl<G: GeocodingService, C: LocationCache> Sorter<G, C> {
    pub fn new(resolver: LocationResolver<G, C>, dry_run: bool) -> Self {
        Self { resolver, dry_run }
    }

    pub fn stats(&self) -> ResolveStats {
        self.resolver.stats()
    }

    /// Reads metadata for `files`, then plans and performs their moves
    pub async fn sort_files(
        &mut self,
        reader: &MetadataReader,
        files: &[PathBuf],
    ) -> Result<Vec<SortResult>, ResolveError> {
        info!("Reading metadata from {} files", files.len());
        let records = reader.read_all(files).await;
        self.sort_records(records).await
    }

    /// Plans and performs moves for already-read records
    pub async fn sort_records(
        &mut self,
        records: Vec<MediaFileRecord>,
    ) -> Result<Vec<SortResult>, ResolveError> {
        let mut plans = Vec::with_capacity(records.len());
        let mut results = Vec::new();

        for record in records {
            match self.plan(record).await? {
                Ok(plan) => plans.push(plan),
                Err(failed) => results.push(failed),
            }
        }

        for plan in plans {
            results.push(self.apply(plan));
        }

        Ok(results)
    }

    /// Works out the destination of one file. The outer error is fatal to
    /// the run; the inner one only to this file.
    async fn plan(
        &mut self,
        record: MediaFileRecord,
    ) -> Result<Result<PlannedMove, SortResult>, ResolveError> {
        let date = match record.captured_at {
            Some(captured_at) => captured_at.date(),
            None => match filesystem_date(&record.path) {
                Some(date) => {
                    debug!(
                        "No capture date in {}, using file system date {}",
                        record.path.display(),
                        date
                    );
                    date
                }
                None => {
                    let message = format!("No date available for {}", record.path.display());
                    warn!("{message}");
                    return Ok(Err(SortResult::Failed(record.path, message)));
                }
            },
        };

        let place = self.resolver.resolve(record.coordinate).await?;
        debug!("{} -> {} {}", record.path.display(), date, place);

        Ok(Ok(plan_move(&record.path, date, &place)))
    }

    fn apply(&self, planned: PlannedMove) -> SortResult {
        if self.dry_run {
            return SortResult::Planned(planned);
        }

        match execute_move(planned) {
            MoveResult::Moved(planned) => {
                info!(
                    "Moved {} -> {}",
                    planned.source.display(),
                    planned.destination.display()
                );
                SortResult::Moved(planned)
            }
            MoveResult::Skipped(planned) => SortResult::Skipped(planned),
            MoveResult::Failed(planned, message) => {
                warn!("{message}");
                SortResult::Failed(planned.source, message)
            }
        }
    }
}
