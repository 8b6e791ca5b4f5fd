//! Compressed binary storage for pack unit lists.
//!
//! Pack unit generation is slow (it walks the device database), so generated
//! [`PackUnitList`]s are saved to disk and reloaded by later packing runs.
//! The on-disk format is a small header (magic bytes + format version)
//! followed by a deflate-compressed bincode payload. Corrupt, truncated, or
//! version-mismatched files are rejected with a descriptive [`ArchError`].

use crate::pack_unit::PackUnitList;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a Mosaic pack unit file.
const PACK_UNIT_MAGIC: [u8; 4] = *b"MOSA";

/// Current pack unit file format version. Increment on breaking changes to
/// the header or payload format.
const PACK_UNIT_FORMAT_VERSION: u32 = 1;

/// Errors arising from pack unit storage.
#[derive(Debug, thiserror::Error)]
pub enum ArchError {
    /// An underlying filesystem operation failed.
    #[error("pack unit I/O error on {path}: {source}")]
    Io {
        /// The file being read or written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a Mosaic pack unit file or is corrupt.
    #[error("invalid pack unit file {path}: {reason}")]
    Format {
        /// The offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The file was written by an incompatible format version.
    #[error("pack unit file {path} has format version {found}, expected {expected}")]
    Version {
        /// The offending file.
        path: PathBuf,
        /// Version found in the file.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },
}

/// Saves a pack unit list to `path`.
pub fn save_pack_units(path: &Path, units: &PackUnitList) -> Result<(), ArchError> {
    let payload = bincode::serde::encode_to_vec(units, bincode::config::standard()).map_err(
        |e| ArchError::Format {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    )?;

    let mut output = Vec::with_capacity(payload.len() / 2 + 8);
    output.extend_from_slice(&PACK_UNIT_MAGIC);
    output.extend_from_slice(&PACK_UNIT_FORMAT_VERSION.to_le_bytes());

    let mut encoder = GzEncoder::new(&mut output, Compression::default());
    encoder.write_all(&payload).map_err(|e| ArchError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    encoder.finish().map_err(|e| ArchError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    std::fs::write(path, &output).map_err(|e| ArchError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Loads a pack unit list from `path`, validating the header and rebuilding
/// the list's lookup tables.
pub fn load_pack_units(path: &Path) -> Result<PackUnitList, ArchError> {
    let bytes = std::fs::read(path).map_err(|e| ArchError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if bytes.len() < 8 || bytes[..4] != PACK_UNIT_MAGIC {
        return Err(ArchError::Format {
            path: path.to_path_buf(),
            reason: "missing magic bytes".to_string(),
        });
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != PACK_UNIT_FORMAT_VERSION {
        return Err(ArchError::Version {
            path: path.to_path_buf(),
            found: version,
            expected: PACK_UNIT_FORMAT_VERSION,
        });
    }

    let mut payload = Vec::new();
    GzDecoder::new(&bytes[8..])
        .read_to_end(&mut payload)
        .map_err(|e| ArchError::Format {
            path: path.to_path_buf(),
            reason: format!("decompression failed: {e}"),
        })?;

    let (mut units, _): (PackUnitList, usize) =
        bincode::serde::decode_from_slice(&payload, bincode::config::standard()).map_err(|e| {
            ArchError::Format {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
    units.rebuild_indices();
    Ok(units)
}
