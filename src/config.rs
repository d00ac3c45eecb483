//! Ambient configuration, shared by the CLI entry point and library callers
//! who embed the analyzer directly (§2a).

use std::collections::HashSet;
use std::path::PathBuf;

use clap::Parser;

/// Analyzer configuration.
///
/// The CLI builds this via [`clap::Parser`]; embedders construct it directly
/// with [`Config::new`] and skip argument parsing entirely.
#[derive(Debug, Clone, Parser)]
#[command(name = "retrograde-decompiler", about = "Decompile a 32-bit PE/PDB pair")]
pub struct Config {
    /// Path to the matched executable (32-bit PE).
    #[arg(long)]
    pub exe_path: PathBuf,

    /// Path to the matched program database (PDB 2.0, "JG"-signed).
    #[arg(long)]
    pub pdb_path: PathBuf,

    /// Directory the emitted source tree is written into.
    #[arg(long, default_value = "out")]
    pub output_dir: PathBuf,

    /// Fully-qualified record names for which overlapping members in the
    /// layout tree are tolerated rather than treated as a type-store
    /// invariant violation (§4.3, §9 Open Questions). Empty by default: a
    /// record must be named here explicitly to admit an overlap.
    #[arg(long = "allow-overlap", value_delimiter = ',')]
    pub overlap_allow_list: Vec<String>,

    /// Directory snapshot caches are read from / written to (§5). Defaults
    /// to the platform cache directory when unset.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Disable the snapshot cache entirely, forcing a full re-parse.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,
}

impl Config {
    /// Construct a `Config` programmatically, bypassing `clap` — the path
    /// library embedders use (§2a).
    pub fn new(exe_path: PathBuf, pdb_path: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            exe_path,
            pdb_path,
            output_dir,
            overlap_allow_list: Vec::new(),
            cache_dir: None,
            no_cache: false,
        }
    }

    pub fn overlap_allow_set(&self) -> HashSet<String> {
        self.overlap_allow_list.iter().cloned().collect()
    }

    pub fn allows_overlap(&self, record_name: &str) -> bool {
        self.overlap_allow_list.iter().any(|n| n == record_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_rejects_every_name() {
        let cfg = Config::new("a.exe".into(), "a.pdb".into(), "out".into());
        assert!(!cfg.allows_overlap("_DDBLTFX"));
    }

    #[test]
    fn populated_allow_list_admits_named_record() {
        let mut cfg = Config::new("a.exe".into(), "a.pdb".into(), "out".into());
        cfg.overlap_allow_list.push("_DDBLTFX".to_string());
        assert!(cfg.allows_overlap("_DDBLTFX"));
        assert!(!cfg.allows_overlap("_DDPIXELFORMAT"));
    }
}
