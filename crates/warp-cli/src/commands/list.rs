//! list command - summarize every blob in a database

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use warp_tensor::{BlobRecord, DbBackend, Device, TensorConfig, TensorDtype};

use super::{format_bytes, format_shape};

/// One row of the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobSummary {
    /// Record key
    pub name: String,
    /// Element type
    pub dtype: TensorDtype,
    /// Dimensions
    pub shape: Vec<usize>,
    /// Device recorded at save time
    pub device: Device,
    /// Raw element bytes
    pub size: u64,
}

/// Decode every record of `db`, in write order
pub fn collect(db: &Path, backend: DbBackend, config: &TensorConfig) -> Result<Vec<BlobSummary>> {
    let mut reader = warp_blobdb::open_for_read(db, backend)
        .with_context(|| format!("Failed to open {} database {}", backend, db.display()))?;

    let mut rows = Vec::with_capacity(reader.len());
    for key in reader.keys()? {
        let bytes = reader.get(&key)?;
        let record = BlobRecord::from_bytes_with(bytes, config.verify_checksums)
            .with_context(|| format!("Failed to decode blob {}", key))?;
        rows.push(BlobSummary {
            name: key,
            dtype: record.dtype(),
            shape: record.shape().to_vec(),
            device: record.device,
            size: record.tensor.size_bytes() as u64,
        });
    }
    reader.close();
    Ok(rows)
}

/// Execute the list command
pub fn execute(db: &Path, backend: DbBackend, config: &TensorConfig) -> Result<()> {
    let rows = collect(db, backend, config)?;

    println!(
        "{} {} ({}, {} blobs)",
        style("Database").bold(),
        db.display(),
        backend,
        rows.len()
    );
    println!("{}", "=".repeat(72));
    println!(
        "{:<32} {:<8} {:<14} {:<14} {:>10}",
        "NAME", "DTYPE", "SHAPE", "DEVICE", "SIZE"
    );
    for row in &rows {
        println!(
            "{:<32} {:<8} {:<14} {:<14} {:>10}",
            style(&row.name).cyan(),
            row.dtype,
            format_shape(&row.shape),
            row.device,
            format_bytes(row.size)
        );
    }

    let total: u64 = rows.iter().map(|r| r.size).sum();
    println!("{}", "=".repeat(72));
    println!("Total: {}", format_bytes(total));
    Ok(())
}
