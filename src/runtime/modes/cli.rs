//! One-shot maintenance commands

use anyhow::{Context, Result};
use tracing::info;

use crate::config::StaticConfig;
use crate::storage::StorageFactory;

/// Connect, apply pending migrations, and exit
///
/// Opening the storage runs the migrator, so there is nothing else to do.
pub async fn run_migrate() -> Result<()> {
    let storage = StorageFactory::create()
        .await
        .context("Failed to open database for migration")?;
    info!("Migrations applied on {}", storage.backend_name());
    storage.close().await.context("Failed to close database")?;
    Ok(())
}

/// Write a sample config file, or print it when no path is given
pub fn generate_config(output: Option<&str>) -> Result<()> {
    match output {
        Some(path) => {
            StaticConfig::default()
                .save_to_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path, e))?;
            println!("Sample configuration written to {}", path);
        }
        None => println!("{}", StaticConfig::generate_sample_config()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_config_writes_parseable_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        generate_config(path.to_str()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: StaticConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.server.port, StaticConfig::default().server.port);
    }
}
