//! Batch ingest and validation.
//!
//! Two inputs are accepted:
//!
//! - a JSON batch file (`BatchFile`): default metadata plus one record per grid
//!   position with approach and optional retract samples
//! - a long-format CSV with columns `row,col,segment,position,deflection`
//!   (`row`, `col` and `segment` optional), metadata supplied by the caller
//!
//! Design goals:
//! - **Strict schema** for required fields (clear errors + exit code 2)
//! - **Record-level validation** (skip bad curves, but report what happened)
//! - **Deterministic behavior**: items come out in row-major grid order

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use csv::StringRecord;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::domain::{BatchItem, CurveMetadata, GridPosition, RawCurve, Segment};
use crate::error::{AppError, EXIT_INPUT, EXIT_NO_DATA};

/// Samples of one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub position: Vec<f64>,
    pub deflection: Vec<f64>,
}

/// One grid position in a batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveRecord {
    pub row: usize,
    pub col: usize,
    /// Overrides the batch-level metadata for this curve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CurveMetadata>,
    pub approach: SegmentRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retract: Option<SegmentRecord>,
}

/// On-disk batch schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFile {
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: Option<CurveMetadata>,
    pub curves: Vec<CurveRecord>,
}

impl BatchFile {
    /// Batch file holding `items`, each with its own metadata.
    pub fn from_items(items: &[BatchItem], source: impl Into<String>) -> Self {
        let curves = items
            .iter()
            .map(|item| CurveRecord {
                row: item.position.row,
                col: item.position.col,
                metadata: Some(item.approach.metadata().clone()),
                approach: segment_record(&item.approach),
                retract: item.retract.as_ref().map(segment_record),
            })
            .collect();
        Self {
            generated_at: Some(Utc::now()),
            source: Some(source.into()),
            metadata: None,
            curves,
        }
    }
}

fn segment_record(curve: &RawCurve) -> SegmentRecord {
    SegmentRecord {
        position: curve.position().to_vec(),
        deflection: curve.deflection().to_vec(),
    }
}

/// A record-level problem encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordError {
    /// Zero-based record index (JSON) or 1-based line number (CSV).
    pub index: usize,
    pub position: Option<GridPosition>,
    pub message: String,
}

/// Ingest output: validated items in grid order + skipped records.
#[derive(Debug, Clone)]
pub struct IngestedBatch {
    pub items: Vec<BatchItem>,
    pub record_errors: Vec<RecordError>,
    pub records_read: usize,
}

/// Load a JSON batch file.
pub fn load_batch_json(path: &Path) -> Result<IngestedBatch, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to open batch '{}': {e}", path.display())))?;
    let batch: BatchFile = serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Invalid batch JSON: {e}")))?;
    batch_from_file(batch)
}

/// Validate a parsed batch into items.
pub fn batch_from_file(batch: BatchFile) -> Result<IngestedBatch, AppError> {
    let records_read = batch.curves.len();
    let mut items: BTreeMap<GridPosition, BatchItem> = BTreeMap::new();
    let mut record_errors = Vec::new();

    for (index, record) in batch.curves.into_iter().enumerate() {
        let position = GridPosition::new(record.row, record.col);
        let Some(metadata) = record.metadata.or_else(|| batch.metadata.clone()) else {
            return Err(AppError::config(format!(
                "Curve {index} at {position} has no metadata and the batch has no default."
            )));
        };

        match build_item(position, metadata, record.approach, record.retract) {
            Ok(item) => {
                if items.contains_key(&position) {
                    record_errors.push(RecordError {
                        index,
                        position: Some(position),
                        message: "Duplicate grid position.".to_string(),
                    });
                } else {
                    items.insert(position, item);
                }
            }
            Err(e) => record_errors.push(RecordError {
                index,
                position: Some(position),
                message: e.message().to_string(),
            }),
        }
    }

    finish(items, record_errors, records_read)
}

fn build_item(
    position: GridPosition,
    metadata: CurveMetadata,
    approach: SegmentRecord,
    retract: Option<SegmentRecord>,
) -> Result<BatchItem, AppError> {
    let retract = retract
        .map(|r| RawCurve::new(Segment::Retract, r.position, r.deflection, metadata.clone()))
        .transpose()?;
    let approach = RawCurve::new(Segment::Approach, approach.position, approach.deflection, metadata)?;
    Ok(BatchItem {
        position,
        approach,
        retract,
    })
}

fn finish(
    items: BTreeMap<GridPosition, BatchItem>,
    record_errors: Vec<RecordError>,
    records_read: usize,
) -> Result<IngestedBatch, AppError> {
    for e in &record_errors {
        let at = e.position.map(|p| p.to_string()).unwrap_or_default();
        warn!("skipping record {} {at}: {}", e.index, e.message);
    }
    if items.is_empty() {
        return Err(AppError::new(EXIT_NO_DATA, "No valid curves remain after validation."));
    }
    Ok(IngestedBatch {
        items: items.into_values().collect(),
        record_errors,
        records_read,
    })
}

/// Load a long-format CSV force volume.
pub fn load_batch_csv(path: &Path, metadata: &CurveMetadata) -> Result<IngestedBatch, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_batch_csv(file, metadata)
}

pub fn read_batch_csv(reader: impl std::io::Read, metadata: &CurveMetadata) -> Result<IngestedBatch, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for column in ["position", "deflection"] {
        if !header_map.contains_key(column) {
            return Err(AppError::new(EXIT_INPUT, format!("Missing required column: `{column}`")));
        }
    }

    type Samples = (Vec<f64>, Vec<f64>);
    let mut grouped: BTreeMap<GridPosition, (Samples, Samples)> = BTreeMap::new();
    let mut record_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header, lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                record_errors.push(RecordError {
                    index: line,
                    position: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &header_map) {
            Ok((position, segment, x, d)) => {
                let (approach, retract) = grouped.entry(position).or_default();
                let target = match segment {
                    Segment::Approach => approach,
                    Segment::Retract => retract,
                };
                target.0.push(x);
                target.1.push(d);
            }
            Err(message) => record_errors.push(RecordError {
                index: line,
                position: None,
                message,
            }),
        }
    }

    let mut items = BTreeMap::new();
    for (position, ((ax, ad), (rx, rd))) in grouped {
        let retract = (!rx.is_empty()).then_some(SegmentRecord {
            position: rx,
            deflection: rd,
        });
        let approach = SegmentRecord {
            position: ax,
            deflection: ad,
        };
        match build_item(position, metadata.clone(), approach, retract) {
            Ok(item) => {
                items.insert(position, item);
            }
            Err(e) => record_errors.push(RecordError {
                index: 0,
                position: Some(position),
                message: e.message().to_string(),
            }),
        }
    }

    finish(items, record_errors, rows_read)
}

fn parse_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> Result<(GridPosition, Segment, f64, f64), String> {
    let x = parse_f64(get_required(record, header_map, "position")?, "position")?;
    let d = parse_f64(get_required(record, header_map, "deflection")?, "deflection")?;
    let row = parse_opt_usize(get_optional(record, header_map, "row"), "row")?.unwrap_or(0);
    let col = parse_opt_usize(get_optional(record, header_map, "col"), "col")?.unwrap_or(0);
    let segment = match get_optional(record, header_map, "segment").map(str::to_ascii_lowercase) {
        None => Segment::Approach,
        Some(s) if s == "approach" || s == "extend" => Segment::Approach,
        Some(s) if s == "retract" => Segment::Retract,
        Some(s) => return Err(format!("Unknown segment `{s}`.")),
    };
    Ok((GridPosition::new(row, col), segment, x, d))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes carry a UTF-8 BOM on the first header.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    get_optional(record, header_map, name).ok_or_else(|| format!("Missing `{name}` value."))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = *header_map.get(name)?;
    record.get(idx).filter(|s| !s.is_empty())
}

fn parse_f64(s: &str, name: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("Invalid `{name}` value `{s}`."))
}

fn parse_opt_usize(s: Option<&str>, name: &str) -> Result<Option<usize>, String> {
    s.map(|v| v.parse::<usize>().map_err(|_| format!("Invalid `{name}` value `{v}`.")))
        .transpose()
}
