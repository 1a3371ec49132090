use anyhow::Result;
use csv::Writer;
use serde_json::Value;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::transform::{LedgerRow, LEDGER_COLUMNS};

/// Appends ledger rows to the local audit CSV, writing the header when the
/// file is first created.
pub fn append(csv_path: &str, rows: &[LedgerRow], ensure_directories: bool) -> Result<()> {
    if rows.is_empty() {
        debug!("No rows to mirror, skipping");
        return Ok(());
    }

    let path = Path::new(csv_path);
    info!("Mirroring {} rows to {}", rows.len(), csv_path);

    if ensure_directories {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let needs_header = !path.exists();

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = Writer::from_writer(file);

    if needs_header {
        writer.write_record(LEDGER_COLUMNS)?;
    }

    for row in rows {
        writer.write_record(row.iter().map(cell_to_field))?;
    }

    writer.flush()?;
    Ok(())
}

fn cell_to_field(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
