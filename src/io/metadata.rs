use crate::types::{FillError, FillResult, Timestamp};
use chrono::{Datelike, TimeZone, Utc};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Column holding the scene identifier
pub const ID_COLUMN: &str = "system:index";

/// Column holding the acquisition time in milliseconds since the epoch
pub const TIME_COLUMN: &str = "system:time_start";

/// One row of the scene metadata table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneEntry {
    pub id: String,
    pub timestamp: Timestamp,
}

/// Scene identifier -> acquisition time table exported alongside the rasters
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    entries: Vec<SceneEntry>,
    by_id: HashMap<String, Timestamp>,
}

impl MetadataTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> FillResult<Self> {
        log::info!("Reading scene metadata from {}", path.as_ref().display());
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    /// Parse a CSV table with `system:index` and `system:time_start` columns;
    /// other columns are ignored.
    pub fn from_reader<R: Read>(reader: R) -> FillResult<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| FillError::Metadata(format!("failed to read header: {}", e)))?
            .clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| FillError::Metadata(format!("missing column '{}'", name)))
        };
        let id_col = column(ID_COLUMN)?;
        let time_col = column(TIME_COLUMN)?;

        let mut entries = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record
                .map_err(|e| FillError::Metadata(format!("row {}: {}", line + 1, e)))?;
            let id = record
                .get(id_col)
                .ok_or_else(|| FillError::Metadata(format!("row {}: missing id", line + 1)))?
                .trim()
                .to_string();
            let raw_time = record
                .get(time_col)
                .ok_or_else(|| FillError::Metadata(format!("row {}: missing time", line + 1)))?;
            let timestamp = parse_timestamp(raw_time)
                .ok_or_else(|| FillError::Metadata(format!("row {}: bad time '{}'", line + 1, raw_time)))?;
            entries.push(SceneEntry { id, timestamp });
        }

        log::debug!("Read {} scene metadata rows", entries.len());
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: Vec<SceneEntry>) -> Self {
        let by_id = entries
            .iter()
            .map(|e| (e.id.clone(), e.timestamp))
            .collect();
        Self { entries, by_id }
    }

    pub fn entries(&self) -> &[SceneEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn timestamp_of(&self, id: &str) -> Option<Timestamp> {
        self.by_id.get(id).copied()
    }

    /// Acquisition times in ascending order
    pub fn timestamps(&self) -> Vec<Timestamp> {
        let mut times: Vec<Timestamp> = self.entries.iter().map(|e| e.timestamp).collect();
        times.sort_unstable();
        times
    }

    /// Acquisition times moved back one calendar year, ascending.
    ///
    /// Used to interpolate last year's observations at this year's dates.
    pub fn shifted_targets(&self) -> FillResult<Vec<Timestamp>> {
        let mut targets = self
            .entries
            .iter()
            .map(|e| shift_back_one_year(e.timestamp))
            .collect::<FillResult<Vec<_>>>()?;
        targets.sort_unstable();
        Ok(targets)
    }
}

/// Integer milliseconds, also accepting float notation such as `1.3967424E12`
fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.round() as i64)
    })
}

/// Same instant one calendar year earlier (UTC); Feb 29 maps to Feb 28
pub fn shift_back_one_year(timestamp: Timestamp) -> FillResult<Timestamp> {
    let dt = Utc
        .timestamp_millis_opt(timestamp)
        .single()
        .ok_or_else(|| FillError::Metadata(format!("timestamp {} out of range", timestamp)))?;
    let year = dt.year() - 1;
    let shifted = dt
        .with_year(year)
        .or_else(|| dt.with_day(28).and_then(|d| d.with_year(year)))
        .ok_or_else(|| FillError::Metadata(format!("cannot shift {} back a year", dt)))?;
    Ok(shifted.timestamp_millis())
}
