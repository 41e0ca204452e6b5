//! show command - print one blob's metadata and leading values

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use warp_tensor::{BlobRecord, DbBackend, TensorConfig};

use super::{format_bytes, format_shape};

/// Read and decode the record stored under `name`
pub fn read_record(
    db: &Path,
    name: &str,
    backend: DbBackend,
    config: &TensorConfig,
) -> Result<BlobRecord> {
    let mut reader = warp_blobdb::open_for_read(db, backend)
        .with_context(|| format!("Failed to open {} database {}", backend, db.display()))?;
    let bytes = reader
        .get(name)
        .with_context(|| format!("Blob {} not found in {}", name, db.display()))?;
    reader.close();

    BlobRecord::from_bytes_with(bytes, config.verify_checksums)
        .with_context(|| format!("Failed to decode blob {}", name))
}

/// Render up to `limit` values as a bracketed list
pub fn render_values(record: &BlobRecord, limit: usize) -> String {
    let values = record.tensor.format_values(limit);
    let more = record.tensor.num_elements().saturating_sub(values.len());
    if more > 0 {
        format!("[{}, ... ({} more)]", values.join(", "), more)
    } else {
        format!("[{}]", values.join(", "))
    }
}

/// Execute the show command
pub fn execute(
    db: &Path,
    name: &str,
    limit: usize,
    backend: DbBackend,
    config: &TensorConfig,
) -> Result<()> {
    let record = read_record(db, name, backend, config)?;

    println!("{} {}", style("Blob").bold(), style(&record.name).cyan());
    println!("{}", "=".repeat(50));
    println!("  DType:     {}", record.dtype());
    println!("  Shape:     {}", format_shape(record.shape()));
    println!("  Elements:  {}", record.tensor.num_elements());
    println!("  Size:      {}", format_bytes(record.tensor.size_bytes() as u64));
    println!("  Device:    {}", record.device);
    println!("  Checksum:  {}", hex(&record.checksum()));
    println!();
    println!("  Values:    {}", render_values(&record, limit));
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
