use crate::record::CompetitorRecord;
use anyhow::{Context, Result};
use std::path::Path;

/// Column order of freshly created aggregate files.
pub const COLUMNS: [&str; 9] = [
    "name",
    "pricing_model",
    "key_features",
    "market_position",
    "target_audience",
    "revenue",
    "market_share",
    "pricing_tiers",
    "data_sources",
];

/// Whole-file view of the aggregate. Header-driven: the column set is
/// whatever the file was created with, so files written by older runs still
/// load; short rows read back as empty cells.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// All values of a named column, or None when the column is absent.
    pub fn column_values(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column(name)?;
        Some(self.rows.iter().map(|r| r.get(idx).map(String::as_str).unwrap_or("")).collect())
    }
}

fn row_for(record: &CompetitorRecord, headers: &[String]) -> Result<Vec<String>> {
    // The serde view of the record keys cells by column name, so a file with
    // extra or reordered columns still gets each value in the right place.
    let value = serde_json::to_value(record).context("Failed to serialize record")?;
    Ok(headers
        .iter()
        .map(|h| match value.get(h) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        })
        .collect())
}

/// Appends one record via read-modify-write of the whole file, creating it
/// with a header row when absent.
///
/// There is no locking here: two concurrent appends to the same path lose
/// rows. The server serializes analysis runs for exactly this reason; do not
/// call this from parallel tasks.
pub fn append(path: &Path, record: &CompetitorRecord) -> Result<()> {
    let (headers, mut rows) = if path.exists() {
        let table = load(path)?;
        (table.headers, table.rows)
    } else {
        (COLUMNS.iter().map(|c| c.to_string()).collect(), Vec::new())
    };

    rows.push(row_for(record, &headers)?);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;
    writer.write_record(&headers)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    crate::progress::log_with(
        crate::progress::Kind::Data,
        format!("Saved data for {} ({} rows total)", record.name, rows.len()),
    );
    Ok(())
}

/// Reads the whole aggregate into memory. Callers must handle an empty table
/// and a missing `name` column; both are normal failure modes here.
pub fn load(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        // Pad ragged rows so cell access stays in bounds.
        while row.len() < headers.len() {
            row.push(String::new());
        }
        rows.push(row);
    }

    Ok(Table { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_csv(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("marketscout-tests");
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join(format!("{}-{}.csv", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn sample(name: &str) -> CompetitorRecord {
        let mut record = CompetitorRecord::fallback(name);
        record.revenue = "$2.3 billion".to_string();
        record.market_share = "18%".to_string();
        record.data_sources = 3;
        record
    }

    #[test]
    fn test_append_creates_file_with_n_rows() {
        let path = temp_csv("creates");

        for name in ["Alpha", "Beta", "Gamma"] {
            append(&path, &sample(name)).unwrap();
        }

        let table = load(&path).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.headers, COLUMNS.to_vec());
        let names = table.column_values("name").unwrap();
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn test_append_does_not_dedup() {
        let path = temp_csv("dedup");

        append(&path, &sample("Alpha")).unwrap();
        append(&path, &sample("Alpha")).unwrap();

        let table = load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], table.rows[1]);
    }

    #[test]
    fn test_append_preserves_existing_column_order() {
        let path = temp_csv("order");
        std::fs::write(&path, "revenue,name\n$1B,Old Corp\n").unwrap();

        append(&path, &sample("New Corp")).unwrap();

        let table = load(&path).unwrap();
        assert_eq!(table.headers, vec!["revenue", "name"]);
        assert_eq!(table.cell(1, 0), "$2.3 billion");
        assert_eq!(table.cell(1, 1), "New Corp");
    }

    #[test]
    fn test_load_pads_ragged_rows() {
        let path = temp_csv("ragged");
        std::fs::write(&path, "name,revenue,market_share\nAcme\nBeta,$1B,9%\n").unwrap();

        let table = load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 1), "");
        assert_eq!(table.cell(1, 2), "9%");
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let path = temp_csv("missing");
        assert!(load(&path).is_err());
    }

    #[test]
    fn test_record_round_trips_through_file() {
        let path = temp_csv("roundtrip");
        append(&path, &sample("Acme")).unwrap();

        let table = load(&path).unwrap();
        let revenue_col = table.column("revenue").unwrap();
        let sources_col = table.column("data_sources").unwrap();
        assert_eq!(table.cell(0, revenue_col), "$2.3 billion");
        assert_eq!(table.cell(0, sources_col), "3");
    }
}
