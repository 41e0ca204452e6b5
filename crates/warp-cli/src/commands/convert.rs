//! convert command - copy a database into another backend

use std::path::Path;

use anyhow::{Context, Result, bail};
use console::style;
use tracing::info;
use warp_tensor::{BlobRecord, DbBackend, TensorConfig};

/// Copy every record from `src` to `dst`, returning the record count
///
/// Records are decoded on the way through so a corrupt source fails the
/// conversion instead of being copied.
pub fn convert(
    src: &Path,
    dst: &Path,
    from: DbBackend,
    to: DbBackend,
    config: &TensorConfig,
) -> Result<usize> {
    if src == dst {
        bail!("Source and destination are the same path: {}", src.display());
    }

    let mut reader = warp_blobdb::open_for_read(src, from)
        .with_context(|| format!("Failed to open {} database {}", from, src.display()))?;
    let mut writer = warp_blobdb::open_for_write(dst, to)
        .with_context(|| format!("Failed to create {} database {}", to, dst.display()))?;

    let keys = reader.keys()?;
    for key in &keys {
        let bytes = reader.get(key)?;
        BlobRecord::from_bytes_with(bytes.clone(), config.verify_checksums)
            .with_context(|| format!("Failed to decode blob {}", key))?;
        writer.put(key, &bytes)?;
    }

    writer.close()?;
    reader.close();

    info!(
        src = %src.display(),
        dst = %dst.display(),
        %from,
        %to,
        records = keys.len(),
        "Converted database"
    );
    Ok(keys.len())
}

/// Execute the convert command
pub fn execute(
    src: &Path,
    dst: &Path,
    from: DbBackend,
    to: DbBackend,
    config: &TensorConfig,
) -> Result<()> {
    let count = convert(src, dst, from, to, config)?;
    println!(
        "{} {} blobs: {} ({}) -> {} ({})",
        style("Converted").green(),
        count,
        src.display(),
        from,
        dst.display(),
        to
    );
    Ok(())
}
