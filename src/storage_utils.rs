use crate::notifier::NotifierConfig;
use crate::retry::RetryConfig;
use crate::scheduler::ScheduleConfig;
use crate::strategy::StrategyConfig;
use crate::yahoo::ProviderConfig;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

// CONFIGURATION STRUCTS
// Every field has a default so a partial config.json is enough.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub market: String,          // e.g., "japan"
    pub lookback_days: u32,      // calendar days of history per symbol
    pub chart_days: usize,       // trailing bars drawn on the chart
    pub workers: usize,          // symbols processed concurrently
    pub retry: RetryConfig,
    pub strategy: StrategyConfig,
    pub provider: ProviderConfig,
    pub notifier: NotifierConfig,
    pub schedule: ScheduleConfig,
    pub log_file: Option<String>, // relative to the storage directory
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            market: "japan".to_string(),
            lookback_days: 200,
            chart_days: 50,
            workers: 4,
            retry: RetryConfig::default(),
            strategy: StrategyConfig::default(),
            provider: ProviderConfig::default(),
            notifier: NotifierConfig::default(),
            schedule: ScheduleConfig::default(),
            log_file: Some("trace.log".to_string()),
        }
    }
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Absolute path to the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Storage rooted at an explicit directory, created if missing.
    pub async fn new<P: AsRef<Path>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        if !fs::try_exists(&base_dir).await? {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// Storage next to the running executable, so the binary works from any
    /// current directory.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::new(base_dir).await
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.base_dir.join(file_name)
    }

    /// Serializes `data` to `<filename>.json`.
    /// Writes a .tmp file first and renames it over the target so a crash
    /// mid-write never leaves a truncated file behind.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let file_name = format!("{}.json", filename);
        let final_path = self.base_dir.join(&file_name);
        let tmp_path = self.base_dir.join(format!("{}.tmp", file_name));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    /// Reads `<filename>.json` into `T`.
    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));

        // serde_json scans the bytes anyway, no need for a UTF-8 pass via read_to_string.
        let content = fs::read(path).await?;

        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Like `load`, but a missing file yields `T::default()`, which is then
    /// written out so the user has a template to edit.
    pub async fn load_or_init<T>(&self, filename: &str) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let path = self.base_dir.join(format!("{}.json", filename));
        if fs::try_exists(&path).await? {
            return self.load(filename).await;
        }
        let data = T::default();
        self.save(filename, &data).await?;
        info!(path = %path.display(), "wrote default {}.json", filename);
        Ok(data)
    }

    pub async fn remove(&self, filename: &str) -> anyhow::Result<()> {
        let path = self.base_dir.join(format!("{}.json", filename));
        if fs::try_exists(&path).await? {
            fs::remove_file(path).await?;
        }
        Ok(())
    }
}
