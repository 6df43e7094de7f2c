//! Dataset Store: loading and lookup
//!
//! Holds every sailing's guest-response rows and the per-sailing summaries.
//! Populated once at start-up from CSV files (read with Polars), read-only
//! afterwards, so it can be shared across request handlers behind an `Arc`.
//!
//! File layouts:
//!   - plain:  `<data_dir>/<Ship> - <anything>.csv`, text from the review column
//!   - paired: `<data_dir>/ratings_<suffix>.csv` + `<data_dir>/reasons_<suffix>.csv`
//!
//! The ship name comes from the file name (first `-` segment, trimmed). The
//! sailing number is always "1": files do not encode it.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{DataConfig, DataLayout};
use crate::sailing::{SailingIdentifier, SailingRecord, SailingRecords, SailingSummary, TextSource};
use crate::utils::normalize_key;

/// Sailing number assumed for files that do not encode one
pub const DEFAULT_SAILING_NUMBER: &str = "1";

const RATINGS_PREFIX: &str = "ratings_";
const REASONS_PREFIX: &str = "reasons_";

/// Summary columns that identify a sailing rather than score it
const SUMMARY_ID_COLUMNS: [&str; 5] = ["Ship Name", "Sailing Number", "Start Date", "End Date", "Fleet"];

pub struct DatasetStore {
    /// Normalized `"{ship}_{sailing}"` -> rows
    sailings: FxHashMap<String, SailingRecords>,
    summaries: Vec<SailingSummary>,
}

impl DatasetStore {
    /// Build a store from already-loaded records
    ///
    /// A later table for the same sailing replaces the earlier one.
    pub fn new(records: Vec<SailingRecords>, summaries: Vec<SailingSummary>) -> Self {
        let mut sailings = FxHashMap::default();
        for table in records {
            let key = table.identifier.key();
            if let Some(previous) = sailings.insert(key.clone(), table) {
                tracing::warn!(
                    "Duplicate data for sailing '{}' ({} rows replaced)",
                    key,
                    previous.len()
                );
            }
        }

        DatasetStore { sailings, summaries }
    }

    /// Load row tables and summaries as configured
    ///
    /// Individual unreadable files are logged and skipped. Fails only when
    /// nothing at all could be loaded.
    pub fn load(config: &DataConfig) -> Result<Self> {
        tracing::info!("Loading sailing data from {:?} ({:?} layout)", config.data_dir, config.layout);

        let records = match config.layout {
            DataLayout::Plain => load_plain_dir(&config.data_dir, &config.review_column),
            DataLayout::Paired => {
                load_paired_dir(&config.data_dir, &config.review_column, &config.reason_column)
            }
        };

        let summaries = match load_summaries(&config.summary_file) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Skipping summaries: {:#}", e);
                Vec::new()
            }
        };

        let store = Self::new(records, summaries);

        tracing::info!("  Sailings with responses: {}", store.sailing_count());
        tracing::info!("  Sailing summaries: {}", store.summaries.len());

        if store.sailings.is_empty() && store.summaries.is_empty() {
            anyhow::bail!(
                "No sailing data loaded from {:?} or {:?}",
                config.data_dir,
                config.summary_file
            );
        }

        Ok(store)
    }

    /// Rows for a sailing; `None` is an ordinary "no data" outcome
    pub fn resolve(&self, identifier: &SailingIdentifier) -> Option<&SailingRecords> {
        self.sailings.get(&identifier.key())
    }

    pub fn summaries(&self) -> &[SailingSummary] {
        &self.summaries
    }

    pub fn summary(&self, identifier: &SailingIdentifier) -> Option<&SailingSummary> {
        self.summaries.iter().find(|s| &s.identifier() == identifier)
    }

    /// Distinct ship names across row tables and summaries, sorted by normalized name
    pub fn ship_names(&self) -> Vec<String> {
        let mut names: BTreeMap<String, String> = BTreeMap::new();

        let summary_ships = self.summaries.iter().map(|s| s.ship_name.as_str());
        let mut table_ships: Vec<&str> = self
            .sailings
            .values()
            .map(|t| t.identifier.ship_name())
            .collect();
        // FxHashMap order is arbitrary; keep display-form choice deterministic
        table_ships.sort_unstable();

        for ship in summary_ships.chain(table_ships) {
            names
                .entry(normalize_key(ship))
                .or_insert_with(|| ship.trim().to_string());
        }

        names.into_values().collect()
    }

    pub fn sailing_count(&self) -> usize {
        self.sailings.len()
    }
}

// ============================================================================
// File naming
// ============================================================================

/// `"Explorer 2 - Mar 2024"` -> `"Explorer 2"`
pub fn ship_name_from_stem(stem: &str) -> String {
    stem.split('-').next().unwrap_or(stem).trim().to_string()
}

/// CSV files in `dir`, sorted by file name
fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read data directory: {:?}", dir))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext == "csv"))
        .collect();
    files.sort();
    Ok(files)
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

// ============================================================================
// Plain layout
// ============================================================================

fn load_plain_dir(dir: &Path, review_column: &str) -> Vec<SailingRecords> {
    let files = match list_csv_files(dir) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("{:#}", e);
            return Vec::new();
        }
    };

    let mut records = Vec::new();
    for path in files {
        let Some(stem) = file_stem(&path) else {
            tracing::warn!("Skipping {:?}: file name is not valid UTF-8", path);
            continue;
        };
        let ship = ship_name_from_stem(stem);
        if ship.is_empty() {
            tracing::warn!("Skipping {:?}: no ship name in file name", path);
            continue;
        }

        match load_rating_table(&path, review_column) {
            Ok((metric_columns, rows)) => {
                tracing::info!(
                    "Loaded data for {} {} with {} records",
                    ship,
                    DEFAULT_SAILING_NUMBER,
                    rows.len()
                );
                records.push(SailingRecords {
                    identifier: SailingIdentifier::new(ship, DEFAULT_SAILING_NUMBER),
                    metric_columns,
                    rows,
                    text_source: TextSource::Review,
                });
            }
            Err(e) => tracing::warn!("Error loading {:?}: {:#}", path, e),
        }
    }

    records
}

// ============================================================================
// Paired layout
// ============================================================================

#[derive(Default)]
struct FilePair {
    ratings: Option<PathBuf>,
    reasons: Option<PathBuf>,
}

fn load_paired_dir(dir: &Path, review_column: &str, reason_column: &str) -> Vec<SailingRecords> {
    let files = match list_csv_files(dir) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("{:#}", e);
            return Vec::new();
        }
    };

    // Suffix -> (ratings file, reasons file)
    let mut pairs: BTreeMap<String, FilePair> = BTreeMap::new();
    for path in files {
        let Some(stem) = file_stem(&path) else { continue };
        if let Some(suffix) = stem.strip_prefix(RATINGS_PREFIX) {
            pairs.entry(suffix.to_string()).or_default().ratings = Some(path.clone());
        } else if let Some(suffix) = stem.strip_prefix(REASONS_PREFIX) {
            pairs.entry(suffix.to_string()).or_default().reasons = Some(path.clone());
        } else {
            tracing::debug!("Ignoring {:?}: neither a ratings nor a reasons file", path);
        }
    }

    let mut records = Vec::new();
    for (suffix, pair) in pairs {
        let (ratings, reasons) = match (pair.ratings, pair.reasons) {
            (Some(r), Some(s)) => (r, s),
            (Some(r), None) => {
                tracing::warn!("Skipping {:?}: no matching {}{}.csv", r, REASONS_PREFIX, suffix);
                continue;
            }
            (None, Some(s)) => {
                tracing::warn!("Skipping {:?}: no matching {}{}.csv", s, RATINGS_PREFIX, suffix);
                continue;
            }
            (None, None) => continue,
        };

        let ship = ship_name_from_stem(&suffix);
        if ship.is_empty() {
            tracing::warn!("Skipping pair '{}': no ship name in file name", suffix);
            continue;
        }

        match load_pair(&ratings, &reasons, review_column, reason_column) {
            Ok((metric_columns, rows)) => {
                tracing::info!(
                    "Loaded paired data for {} {} with {} records",
                    ship,
                    DEFAULT_SAILING_NUMBER,
                    rows.len()
                );
                records.push(SailingRecords {
                    identifier: SailingIdentifier::new(ship, DEFAULT_SAILING_NUMBER),
                    metric_columns,
                    rows,
                    text_source: TextSource::Reason,
                });
            }
            Err(e) => tracing::warn!("Error loading pair '{}': {:#}", suffix, e),
        }
    }

    records
}

fn load_pair(
    ratings: &Path,
    reasons: &Path,
    review_column: &str,
    reason_column: &str,
) -> Result<(Vec<String>, Vec<SailingRecord>)> {
    let (metric_columns, mut rows) = load_rating_table(ratings, review_column)?;

    let reason_df = read_csv(reasons)?;
    let reason_texts = text_column(&reason_df, reason_column)
        .with_context(|| format!("Reasons file {:?} has no usable '{}' column", reasons, reason_column))?;

    if reason_texts.len() != rows.len() {
        tracing::warn!(
            "{:?} has {} rows but {:?} has {}; unmatched reasons are left empty",
            ratings,
            rows.len(),
            reasons,
            reason_texts.len()
        );
    }

    for (row, reason) in rows.iter_mut().zip(reason_texts) {
        row.reason = reason;
    }

    Ok((metric_columns, rows))
}

// ============================================================================
// CSV -> typed rows
// ============================================================================

fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
        .finish()
        .with_context(|| format!("Failed to load CSV: {:?}", path))
}

/// Every column except the review text is a metric column
fn load_rating_table(path: &Path, review_column: &str) -> Result<(Vec<String>, Vec<SailingRecord>)> {
    let df = read_csv(path)?;
    frame_to_records(&df, review_column)
}

fn frame_to_records(df: &DataFrame, review_column: &str) -> Result<(Vec<String>, Vec<SailingRecord>)> {
    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let metric_columns: Vec<String> = column_names
        .iter()
        .filter(|name| name.as_str() != review_column)
        .cloned()
        .collect();

    let metric_values: Vec<Vec<Option<f64>>> = metric_columns
        .iter()
        .map(|name| numeric_column(df, name))
        .collect::<Result<_>>()?;

    let reviews = if column_names.iter().any(|c| c == review_column) {
        text_column(df, review_column)?
    } else {
        tracing::debug!("No '{}' column; reviews left empty", review_column);
        vec![None; df.height()]
    };

    let rows = reviews
        .into_iter()
        .enumerate()
        .map(|(i, review)| SailingRecord {
            scores: metric_values.iter().map(|values| values[i]).collect(),
            review,
            reason: None,
        })
        .collect();

    Ok((metric_columns, rows))
}

/// Coerce a column to numbers; anything unparseable (or NaN) becomes `None`
fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{}' cannot be read as numbers", name))?;
    let values = column.f64()?;
    Ok(values
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

fn text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    let values = column.str()?;
    Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
}

// ============================================================================
// Summaries
// ============================================================================

/// Load the per-sailing summary table
///
/// Expected columns: `Ship Name`, `Sailing Number`, optional `Start Date`,
/// `End Date` (YYYY-MM-DD) and `Fleet`, then one numeric column per score.
pub fn load_summaries(path: &Path) -> Result<Vec<SailingSummary>> {
    let df = read_csv(path)?;
    let summaries = frame_to_summaries(&df)
        .with_context(|| format!("Malformed summary file: {:?}", path))?;
    tracing::info!("Loaded {} sailing summaries from {:?}", summaries.len(), path);
    Ok(summaries)
}

fn frame_to_summaries(df: &DataFrame) -> Result<Vec<SailingSummary>> {
    let column_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    let has = |name: &str| column_names.iter().any(|c| c == name);

    let ships = text_column(df, "Ship Name")?;
    let numbers = text_column(df, "Sailing Number")?;
    let starts = optional_dates(df, "Start Date", has("Start Date"))?;
    let ends = optional_dates(df, "End Date", has("End Date"))?;
    let fleets = if has("Fleet") {
        text_column(df, "Fleet")?
    } else {
        vec![None; df.height()]
    };

    let score_columns: Vec<&String> = column_names
        .iter()
        .filter(|c| !SUMMARY_ID_COLUMNS.contains(&c.as_str()))
        .collect();
    let score_values: Vec<Vec<Option<f64>>> = score_columns
        .iter()
        .map(|name| numeric_column(df, name))
        .collect::<Result<_>>()?;

    let mut summaries = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(ship), Some(number)) = (&ships[i], &numbers[i]) else {
            tracing::warn!("Skipping summary row {}: missing ship name or sailing number", i + 1);
            continue;
        };

        summaries.push(SailingSummary {
            ship_name: ship.trim().to_string(),
            sailing_number: number.trim().to_string(),
            start_date: starts[i],
            end_date: ends[i],
            fleet: fleets[i].clone(),
            scores: score_columns
                .iter()
                .zip(&score_values)
                .map(|(name, values)| (name.to_string(), values[i]))
                .collect(),
        });
    }

    Ok(summaries)
}

fn optional_dates(df: &DataFrame, name: &str, present: bool) -> Result<Vec<Option<NaiveDate>>> {
    if !present {
        return Ok(vec![None; df.height()]);
    }

    Ok(text_column(df, name)?
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let raw = raw?;
            match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
                Ok(d) => Some(d),
                Err(_) => {
                    tracing::warn!("Row {}: unparseable {} '{}'", i + 1, name, raw);
                    None
                }
            }
        })
        .collect())
}
