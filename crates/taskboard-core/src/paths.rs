//! Standard paths used by Taskboard tools

use std::path::PathBuf;

/// Standard Taskboard paths
pub struct Paths {
    /// Data directory (~/.local/share/taskboard)
    pub data: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("taskboard");

        Self { data }
    }

    /// Default database file location
    pub fn db_file(&self) -> PathBuf {
        self.data.join("tasks.db")
    }
}
