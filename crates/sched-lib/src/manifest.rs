//! Sample manifest I/O
//!
//! The manifest is a comma-delimited file, one row per sample:
//!
//! ```text
//! sample_id,r1_path,r2_path,r1_size_bytes,r2_size_bytes,status
//! ```
//!
//! Array job index `i` is a pure offset into row order, so rows are always
//! written in the order given and never re-sorted after discovery.

use crate::error::{Result, SchedError};
use crate::models::{Sample, SampleStatus};
use crate::persist;
use anyhow::Context;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const HEADER: &str = "sample_id,r1_path,r2_path,r1_size_bytes,r2_size_bytes,status";

const R1_MARKER: &str = "_R1_";
const R2_MARKER: &str = "_R2_";
const FASTQ_SUFFIX: &str = ".fastq.gz";

/// Read a manifest, preserving row order
pub fn read(path: &Path) -> Result<Vec<Sample>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    parse(&content)
}

/// Parse manifest contents; line numbers in errors are 1-based
pub fn parse(content: &str) -> Result<Vec<Sample>> {
    let mut lines = content.lines().enumerate();

    match lines.next() {
        Some((_, header)) if header.trim() == HEADER => {}
        Some((_, header)) => {
            return Err(SchedError::Manifest {
                line: 1,
                reason: format!("unexpected header '{}'", header.trim()),
            })
        }
        None => {
            return Err(SchedError::Manifest {
                line: 1,
                reason: "empty manifest".to_string(),
            })
        }
    }

    let mut samples = Vec::new();
    let mut seen = HashSet::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let sample = parse_row(line).map_err(|reason| SchedError::Manifest {
            line: line_no,
            reason,
        })?;
        if !seen.insert(sample.sample_id.clone()) {
            return Err(SchedError::Manifest {
                line: line_no,
                reason: format!("duplicate sample_id '{}'", sample.sample_id),
            });
        }
        samples.push(sample);
    }

    Ok(samples)
}

fn parse_row(line: &str) -> std::result::Result<Sample, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(format!("expected 6 fields, found {}", fields.len()));
    }
    if fields[0].is_empty() {
        return Err("empty sample_id".to_string());
    }

    let size = |field: &str, name: &str| {
        field
            .parse::<u64>()
            .map_err(|_| format!("invalid {} '{}'", name, field))
    };

    Ok(Sample {
        sample_id: fields[0].to_string(),
        r1_path: PathBuf::from(fields[1]),
        r2_path: PathBuf::from(fields[2]),
        r1_size_bytes: size(fields[3], "r1_size_bytes")?,
        r2_size_bytes: size(fields[4], "r2_size_bytes")?,
        status: fields[5].parse()?,
    })
}

/// Render samples as manifest text
pub fn render(samples: &[Sample]) -> Result<String> {
    let mut out = String::with_capacity(64 + samples.len() * 128);
    out.push_str(HEADER);
    out.push('\n');

    for (idx, sample) in samples.iter().enumerate() {
        let r1 = sample.r1_path.to_string_lossy();
        let r2 = sample.r2_path.to_string_lossy();
        for field in [sample.sample_id.as_str(), &*r1, &*r2] {
            if field.contains(',') || field.contains('\n') {
                return Err(SchedError::Manifest {
                    line: idx + 2,
                    reason: format!("field '{}' contains a delimiter", field),
                });
            }
        }
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            sample.sample_id,
            r1,
            r2,
            sample.r1_size_bytes,
            sample.r2_size_bytes,
            sample.status
        ));
    }

    Ok(out)
}

/// Write a manifest atomically in the given row order
pub fn write(path: &Path, samples: &[Sample]) -> Result<()> {
    let content = render(samples)?;
    persist::write_atomic(path, content.as_bytes())?;
    Ok(())
}

/// Write the manifest for one chunk; row `i` is run by array index `i + 1`
pub fn write_chunk_manifest(dir: &Path, chunk_id: &str, samples: &[Sample]) -> Result<PathBuf> {
    let path = dir.join(format!("{}_manifest.csv", chunk_id));
    write(&path, samples)?;
    debug!(chunk_id = chunk_id, path = %path.display(), rows = samples.len(), "Chunk manifest written");
    Ok(path)
}

/// Find paired-end inputs under `base_dir`
///
/// Every `*_R1_*.fastq.gz` is paired with its `_R2_` sibling. Pairs with a
/// missing mate or either file below `min_input_bytes` are skipped. Samples
/// are ordered by R1 path and start out `pending`.
pub fn discover(base_dir: &Path, min_input_bytes: u64) -> Result<Vec<Sample>> {
    let mut r1_files = Vec::new();
    collect_r1_files(base_dir, &mut r1_files)?;
    r1_files.sort();

    let mut samples = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0usize;

    for r1_path in r1_files {
        let Some(file_name) = r1_path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((sample_id, _)) = file_name.split_once(R1_MARKER) else {
            continue;
        };
        let r2_path = r1_path.with_file_name(file_name.replacen(R1_MARKER, R2_MARKER, 1));

        let (Ok(r1_meta), Ok(r2_meta)) = (fs::metadata(&r1_path), fs::metadata(&r2_path)) else {
            debug!(r1 = %r1_path.display(), "Skipping sample without a readable mate");
            skipped += 1;
            continue;
        };
        if r1_meta.len() < min_input_bytes || r2_meta.len() < min_input_bytes {
            debug!(r1 = %r1_path.display(), "Skipping sample below minimum input size");
            skipped += 1;
            continue;
        }
        if !seen.insert(sample_id.to_string()) {
            debug!(sample_id = sample_id, "Skipping repeated sample id");
            skipped += 1;
            continue;
        }

        samples.push(Sample {
            sample_id: sample_id.to_string(),
            r1_size_bytes: r1_meta.len(),
            r2_size_bytes: r2_meta.len(),
            r1_path,
            r2_path,
            status: SampleStatus::Pending,
        });
    }

    info!(
        base_dir = %base_dir.display(),
        samples = samples.len(),
        skipped = skipped,
        "Discovered samples"
    );
    Ok(samples)
}

fn collect_r1_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat {}", path.display()))?;

        if file_type.is_dir() {
            collect_r1_files(&path, out)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(R1_MARKER) && n.ends_with(FASTQ_SUFFIX))
        {
            out.push(path);
        }
    }
    Ok(())
}
