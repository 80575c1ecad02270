use std::path::PathBuf;

use crate::interval::DEFAULT_BIN_DAYS;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bin_days: u32,
    pub log_level: String,
    /// Fixed seed for the daily pick; entropy when unset.
    pub seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ASCENT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let bin_days = std::env::var("ASCENT_BIN_DAYS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|&days| days > 0)
            .unwrap_or(DEFAULT_BIN_DAYS);

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let seed = std::env::var("ASCENT_SEED")
            .ok()
            .and_then(|value| value.parse::<u64>().ok());

        Self {
            data_dir,
            bin_days,
            log_level,
            seed,
        }
    }

    pub fn topics_path(&self) -> PathBuf {
        self.data_dir.join("topics.csv")
    }

    pub fn edges_path(&self) -> PathBuf {
        self.data_dir.join("edges.csv")
    }

    pub fn problems_path(&self) -> PathBuf {
        self.data_dir.join("problems.csv")
    }

    /// Optional override of the built-in judge tag table.
    pub fn tags_path(&self) -> PathBuf {
        self.data_dir.join("tags.csv")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.data_dir.join("history")
    }

    pub fn users_dir(&self) -> PathBuf {
        self.data_dir.join("users")
    }
}
