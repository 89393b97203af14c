use anyhow::{bail, Context, Result};
use strata_core::ProjectConfig;

use super::context::GlobalOptions;

/// Write a starter configuration file; never overwrites an existing one
pub fn run(options: &GlobalOptions) -> Result<()> {
    let path = options.config_path();
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    ProjectConfig::starter().save(&path)?;
    tracing::info!(path = %path.display(), "wrote starter configuration");
    println!("Created ./{}", options.config.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> GlobalOptions {
        GlobalOptions {
            config: PathBuf::from("strata.yaml"),
            cwd: Some(dir.path().to_path_buf()),
            env: "development".to_string(),
        }
    }

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        run(&options(&dir)).unwrap();

        let config = ProjectConfig::load(&dir.path().join("strata.yaml")).unwrap();
        assert_eq!(config, ProjectConfig::starter());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.yaml");
        fs::write(&path, "environments: {}\n").unwrap();

        assert!(run(&options(&dir)).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "environments: {}\n");
    }
}
