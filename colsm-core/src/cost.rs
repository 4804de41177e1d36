//! Per-level block format advice
//!
//! The cost model that decides which LSM levels store vertical blocks runs
//! outside this crate. Its output is a small text file:
//!
//! ```text
//! <num_level> <flag_0> <flag_1> ... <flag_{num_level-1}>
//! ```
//!
//! with whitespace-separated `0`/`1` flags. [`LevelTable`] loads that file
//! and answers [`FormatAdvisor::should_use_vertical`].

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::{config, ColsmError, Result};

/// Decides per LSM level whether blocks are written in the vertical format.
pub trait FormatAdvisor: Send + Sync {
    fn should_use_vertical(&self, level: usize) -> bool;
}

/// Every level vertical
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysVertical;

impl FormatAdvisor for AlwaysVertical {
    fn should_use_vertical(&self, _level: usize) -> bool {
        true
    }
}

/// Every level row-oriented
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverVertical;

impl FormatAdvisor for NeverVertical {
    fn should_use_vertical(&self, _level: usize) -> bool {
        false
    }
}

/// Level assignments read from a cost model file
#[derive(Debug)]
pub struct LevelTable {
    path: Option<PathBuf>,
    levels: RwLock<Vec<bool>>,
}

impl LevelTable {
    /// Load the table at `path`. A missing or malformed file yields the
    /// all-row default.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let levels = match read_table(&path) {
            Ok(levels) => {
                info!("Loaded cost model {:?} ({} levels)", path, levels.len());
                levels
            }
            Err(e) => {
                warn!(
                    "Cost model {:?} unavailable ({}), using row format on all levels",
                    path, e
                );
                default_levels()
            }
        };
        Self {
            path: Some(path),
            levels: RwLock::new(levels),
        }
    }

    /// Load `colsm_model` from the working directory.
    pub fn load_default() -> Self {
        Self::load(config::COST_MODEL_FILE)
    }

    /// Table with fixed assignments and no backing file.
    pub fn from_levels(levels: Vec<bool>) -> Self {
        Self {
            path: None,
            levels: RwLock::new(levels),
        }
    }

    /// Re-read the backing file. On error the current table is kept.
    pub fn reload(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| ColsmError::Config("level table has no backing file".into()))?;
        let levels = read_table(path)?;
        *self.levels.write() = levels;
        Ok(())
    }

    pub fn num_levels(&self) -> usize {
        self.levels.read().len()
    }

    pub fn levels(&self) -> Vec<bool> {
        self.levels.read().clone()
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self::from_levels(default_levels())
    }
}

impl FormatAdvisor for LevelTable {
    /// Levels past the end of the table are row-oriented.
    fn should_use_vertical(&self, level: usize) -> bool {
        self.levels.read().get(level).copied().unwrap_or(false)
    }
}

fn default_levels() -> Vec<bool> {
    vec![false; config::DEFAULT_NUM_LEVELS]
}

fn read_table(path: &Path) -> Result<Vec<bool>> {
    let text = fs::read_to_string(path)?;
    parse_table(&text)
}

/// Parse the `<num_level> <flag>...` text form.
pub fn parse_table(text: &str) -> Result<Vec<bool>> {
    let mut tokens = text.split_whitespace();
    let count: usize = tokens
        .next()
        .ok_or_else(|| ColsmError::Config("empty cost model".into()))?
        .parse()
        .map_err(|e| ColsmError::Config(format!("bad level count: {}", e)))?;

    // the count is untrusted; grow only as flags are read
    let mut levels = Vec::new();
    for level in 0..count {
        let flag = match tokens.next() {
            Some("0") => false,
            Some("1") => true,
            Some(other) => {
                return Err(ColsmError::Config(format!(
                    "level {} flag must be 0 or 1, got {:?}",
                    level, other
                )))
            }
            None => {
                return Err(ColsmError::Config(format!(
                    "cost model lists {} of {} levels",
                    level, count
                )))
            }
        };
        levels.push(flag);
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_parse_table() {
        assert_eq!(parse_table("3 0 1 1").unwrap(), vec![false, true, true]);
        assert_eq!(parse_table("2\n1\n0\n").unwrap(), vec![true, false]);
        assert_eq!(parse_table("0").unwrap(), Vec::<bool>::new());

        assert!(parse_table("").is_err());
        assert!(parse_table("3 0 1").is_err());
        assert!(parse_table("2 0 7").is_err());
        assert!(parse_table("x 1").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("colsm_model");
        fs::write(&path, "4 0 0 1 1").unwrap();

        let table = LevelTable::load(&path);
        assert_eq!(table.num_levels(), 4);
        assert!(!table.should_use_vertical(0));
        assert!(!table.should_use_vertical(1));
        assert!(table.should_use_vertical(2));
        assert!(table.should_use_vertical(3));
        // past the table
        assert!(!table.should_use_vertical(4));
        assert!(!table.should_use_vertical(100));
    }

    #[test]
    fn test_missing_file_uses_default() {
        let temp_dir = TempDir::new().unwrap();
        let table = LevelTable::load(temp_dir.path().join("absent"));
        assert_eq!(table.num_levels(), 8);
        assert!((0..8).all(|level| !table.should_use_vertical(level)));
        assert!(table.reload().is_err());
        assert_eq!(table.num_levels(), 8);
    }

    #[test]
    fn test_huge_level_count_uses_default() {
        assert!(parse_table("18446744073709551615 1").is_err());
        assert!(parse_table("4294967296 0 1").is_err());

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("colsm_model");
        fs::write(&path, "18446744073709551615 1").unwrap();
        let table = LevelTable::load(&path);
        assert_eq!(table.num_levels(), 8);
        assert!(!table.should_use_vertical(0));
    }

    #[test]
    fn test_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("colsm_model");
        fs::write(&path, "2 0 0").unwrap();

        let table = Arc::new(LevelTable::load(&path));
        assert!(!table.should_use_vertical(1));

        fs::write(&path, "3 0 1 1").unwrap();
        table.reload().unwrap();
        assert_eq!(table.levels(), vec![false, true, true]);

        // a broken rewrite keeps the last good table
        fs::write(&path, "3 0").unwrap();
        assert!(table.reload().is_err());
        assert!(table.should_use_vertical(1));

        let reader = Arc::clone(&table);
        let handle = std::thread::spawn(move || reader.should_use_vertical(2));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_fixed_advisors() {
        let advisors: Vec<Box<dyn FormatAdvisor>> = vec![
            Box::new(AlwaysVertical),
            Box::new(NeverVertical),
            Box::new(LevelTable::default()),
            Box::new(LevelTable::from_levels(vec![true])),
        ];
        let answers: Vec<bool> = advisors.iter().map(|a| a.should_use_vertical(0)).collect();
        assert_eq!(answers, vec![true, false, false, true]);
        assert!(LevelTable::default().reload().is_err());
    }
}
