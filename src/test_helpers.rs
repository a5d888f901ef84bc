//! Test utilities for creating temporary log files and mutating them the way
//! writers and log rotation do.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct TempLogFile {
    path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new empty log file in its own temporary directory. The path's
    /// directory is canonicalized so it matches notification paths.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().canonicalize()?.join("test.log");

        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Append each line followed by a newline
    pub fn append_lines(&self, lines: &[&str]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        file.flush()
    }

    /// Append bytes verbatim
    pub fn append_raw(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(bytes)?;
        file.flush()
    }

    /// Truncate by reopening with O_TRUNC
    pub fn truncate(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        Ok(())
    }

    /// Truncate in place to `len` bytes
    pub fn truncate_to(&self, len: u64) -> std::io::Result<()> {
        OpenOptions::new().write(true).open(&self.path)?.set_len(len)
    }

    pub fn remove(&self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }

    /// Create the file again after it was removed or renamed away
    pub fn recreate(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        Ok(())
    }

    /// Rename the file away (rotation) and return the new location
    pub fn rotate(&self) -> std::io::Result<PathBuf> {
        let rotated = self.path.with_extension("log.1");
        std::fs::rename(&self.path, &rotated)?;
        Ok(rotated)
    }

    pub fn len(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
        assert_eq!(temp_file.len(), 0);
    }

    #[test]
    fn test_append_lines() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_lines(&["line 1", "line 2"]).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "line 1\nline 2\n");
    }

    #[test]
    fn test_truncate() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_lines(&["initial content"]).unwrap();
        temp_file.truncate().unwrap();

        assert_eq!(temp_file.len(), 0);
    }

    #[test]
    fn test_truncate_to() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_lines(&["before"]).unwrap();
        temp_file.truncate_to(5).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "befor");
    }

    #[test]
    fn test_rotate_and_recreate() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_lines(&["old"]).unwrap();

        let rotated = temp_file.rotate().unwrap();
        assert!(!temp_file.path().exists());
        assert_eq!(std::fs::read_to_string(rotated).unwrap(), "old\n");

        temp_file.recreate().unwrap();
        assert_eq!(temp_file.len(), 0);
    }
}
