use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use directories::ProjectDirs;

use crate::config_models::network::NetworkId;

pub const CACHE_DIRECTORY_NAME: &str = "cache";

#[derive(Debug, Clone)]
pub struct DataDirectory {
    data_dir: PathBuf,
}

impl DataDirectory {
    ///////////////////////////////////////////////////////////////////////////
    ///
    /// The data directory that contains the persisted cache
    ///
    /// The default varies by operating system, and includes the network, e.g.
    ///
    /// - Linux:   /home/alice/.local/share/paywall-sync/1
    /// - Windows: C:\Users\Alice\AppData\Roaming\unlock\paywall-sync\data\1
    /// - macOS:   /Users/Alice/Library/Application Support/org.unlock.paywall-sync/1
    pub fn get(root_dir: Option<PathBuf>, network: NetworkId) -> Result<Self> {
        let project_dirs = root_dir
            .map(ProjectDirs::from_path)
            .unwrap_or_else(|| ProjectDirs::from("org", "unlock", "paywall-sync"))
            .context("Could not determine data directory")?;

        let network_dir = network.to_string();
        let data_dir = project_dirs.data_dir().to_path_buf().join(network_dir);

        Ok(DataDirectory { data_dir })
    }

    /// Create directory if it does not exist
    pub fn create_dir_if_not_exists(dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {}", dir.to_string_lossy()))
    }

    /// The root data directory path
    pub fn root_dir_path(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// The directory holding one file per cache storage id.
    ///
    /// This directory lives within `DataDirectory::root_dir_path()`.
    pub fn cache_dir_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_DIRECTORY_NAME)
    }
}

impl std::fmt::Display for DataDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.data_dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_is_part_of_the_path() {
        let root = std::env::temp_dir().join("paywall-sync-data-dir-test");
        let dir = DataDirectory::get(Some(root), NetworkId(1984)).unwrap();
        assert!(dir.root_dir_path().ends_with("1984"));
        assert!(dir.cache_dir_path().starts_with(dir.root_dir_path()));
    }
}
