//! Manifest
//!
//! Durable record of which table files exist and which tier owns each one.
//!
//! ## File Format
//! ```text
//! #CRC=<crc32 of everything after this line>
//! T<tier> <file name>
//! T<tier> <file name>
//! ...
//! ```
//!
//! Every mutation rewrites the whole file through `MANIFEST.tmp` + rename.
//! On load, a manifest that fails its checksum, does not parse, or disagrees
//! with the files actually present in the tier directories is discarded and
//! rebuilt from a directory scan.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TierError};

use super::{parse_tier_dir, temp_path, tier_dir, TableName, TEMP_SUFFIX};

/// Manifest file name, relative to the data directory
pub const MANIFEST_FILE: &str = "MANIFEST";

/// Prefix of the checksum line
const CRC_PREFIX: &str = "#CRC=";

/// In-memory manifest plus the path it persists to
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    num_tiers: u32,
    /// file name → tier
    file_tiers: BTreeMap<String, u32>,
}

impl Manifest {
    /// Load the manifest at `path`, rebuilding it from `tables_dir` if it is
    /// missing, corrupted, or stale.
    pub fn load(path: &Path, tables_dir: &Path, num_tiers: u32) -> Result<Self> {
        let scanned = scan_tables(tables_dir, num_tiers)?;

        let mut manifest = Self {
            path: path.to_path_buf(),
            num_tiers,
            file_tiers: BTreeMap::new(),
        };

        let rebuild_reason = match fs::read(path) {
            Ok(bytes) => match parse_manifest(&bytes, num_tiers) {
                Ok(file_tiers) if file_tiers == scanned => {
                    manifest.file_tiers = file_tiers;
                    return Ok(manifest);
                }
                Ok(file_tiers) => format!(
                    "manifest lists {} tables but {} are on disk",
                    file_tiers.len(),
                    scanned.len()
                ),
                Err(TierError::ManifestCorruption(reason)) => reason,
                Err(e) => return Err(e),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => "no manifest found".to_string(),
            Err(e) => return Err(e.into()),
        };

        tracing::warn!(
            path = %path.display(),
            reason = %rebuild_reason,
            tables = scanned.len(),
            "Rebuilding manifest from tier directories"
        );
        manifest.file_tiers = scanned;
        manifest.persist()?;
        Ok(manifest)
    }

    /// Rewrite the manifest file completely
    pub fn persist(&self) -> Result<()> {
        let content = self.render_entries();
        let crc = crc32fast::hash(content.as_bytes());

        let tmp = temp_path(&self.path);
        {
            let mut file = File::create(&tmp)?;
            write!(file, "{}{}\n{}", CRC_PREFIX, crc, content)?;
            // fsync to ensure data is on disk before rename
            file.sync_all()?;
        }

        // Atomic rename
        fs::rename(&tmp, &self.path)?;

        #[cfg(unix)]
        {
            if let Some(dir) = self.path.parent() {
                if let Ok(dir) = File::open(dir) {
                    let _ = dir.sync_all();
                }
            }
        }

        Ok(())
    }

    /// Record a new table
    pub fn add_file(&mut self, file_name: &str, tier: u32) -> Result<()> {
        self.check_tier(tier)?;
        self.file_tiers.insert(file_name.to_string(), tier);
        self.persist()
    }

    /// Change the tier recorded for a table
    pub fn update_file_tier(&mut self, file_name: &str, tier: u32) -> Result<()> {
        self.check_tier(tier)?;
        self.file_tiers.insert(file_name.to_string(), tier);
        self.persist()
    }

    /// Drop the compaction inputs and add its output with a single rewrite
    pub fn apply_compaction_result<S: AsRef<str>>(
        &mut self,
        removed: &[S],
        new_file: &str,
        tier: u32,
    ) -> Result<()> {
        self.check_tier(tier)?;
        for name in removed {
            self.file_tiers.remove(name.as_ref());
        }
        self.file_tiers.insert(new_file.to_string(), tier);
        self.persist()
    }

    /// file name → tier for every live table
    pub fn file_tiers(&self) -> &BTreeMap<String, u32> {
        &self.file_tiers
    }

    /// Tier recorded for a file
    pub fn tier_of(&self, file_name: &str) -> Option<u32> {
        self.file_tiers.get(file_name).copied()
    }

    /// Number of tracked tables
    pub fn len(&self) -> usize {
        self.file_tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_tiers.is_empty()
    }

    fn check_tier(&self, tier: u32) -> Result<()> {
        if tier >= self.num_tiers {
            return Err(TierError::InvalidTier {
                tier,
                num_tiers: self.num_tiers,
            });
        }
        Ok(())
    }

    fn render_entries(&self) -> String {
        self.file_tiers
            .iter()
            .map(|(name, tier)| format!("T{} {}\n", tier, name))
            .collect()
    }
}

/// Verify the checksum line and parse `T<tier> <name>` records
fn parse_manifest(bytes: &[u8], num_tiers: u32) -> Result<BTreeMap<String, u32>> {
    let corrupt = |reason: String| TierError::ManifestCorruption(reason);

    let text = std::str::from_utf8(bytes)
        .map_err(|_| corrupt("manifest is not valid UTF-8".to_string()))?;

    let (crc_line, rest) = text
        .split_once('\n')
        .ok_or_else(|| corrupt("missing checksum line".to_string()))?;
    let expected: u32 = crc_line
        .strip_prefix(CRC_PREFIX)
        .and_then(|crc| crc.trim_end_matches('\r').parse().ok())
        .ok_or_else(|| corrupt(format!("malformed checksum line {:?}", crc_line)))?;

    let actual = crc32fast::hash(rest.as_bytes());
    if actual != expected {
        return Err(corrupt(format!(
            "checksum mismatch: expected {}, actual {}",
            expected, actual
        )));
    }

    let mut file_tiers = BTreeMap::new();
    for line in rest.lines().filter(|l| !l.is_empty()) {
        let (tier, name) = line
            .split_once(' ')
            .ok_or_else(|| corrupt(format!("malformed record {:?}", line)))?;
        let tier = parse_tier_dir(tier)
            .filter(|&t| t < num_tiers)
            .ok_or_else(|| corrupt(format!("bad tier in record {:?}", line)))?;
        if TableName::parse(name).is_none() {
            return Err(corrupt(format!("bad file name in record {:?}", line)));
        }
        file_tiers.insert(name.to_string(), tier);
    }

    Ok(file_tiers)
}

/// Walk `T0..T{num_tiers-1}` and map every complete table file to its tier
pub fn scan_tables(tables_dir: &Path, num_tiers: u32) -> Result<BTreeMap<String, u32>> {
    let mut file_tiers = BTreeMap::new();

    for tier in 0..num_tiers {
        let dir = tier_dir(tables_dir, tier);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if TableName::parse(&name).is_none() {
                continue;
            }
            if let Some(existing) = file_tiers.get(&name) {
                tracing::warn!(file = %name, kept = *existing, ignored = tier, "Table present in two tiers");
                continue;
            }
            file_tiers.insert(name, tier);
        }
    }

    Ok(file_tiers)
}

/// Delete `*.tmp` leftovers of interrupted table writes.
/// Returns the number of files removed.
pub fn remove_stale_temp_files(tables_dir: &Path, num_tiers: u32) -> Result<usize> {
    let mut removed = 0;

    for tier in 0..num_tiers {
        let dir = tier_dir(tables_dir, tier);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TEMP_SUFFIX));
            if is_temp && path.is_file() {
                tracing::warn!(path = %path.display(), "Removing stale temporary table");
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
    }

    Ok(removed)
}
