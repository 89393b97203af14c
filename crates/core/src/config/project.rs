use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::environment::Environment;
use crate::errors::{CoreError, CoreResult};

/// Project configuration loaded from `strata.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Connection settings keyed by environment name
    pub environments: BTreeMap<String, ConnectionConfig>,
    #[serde(default)]
    pub migrations: MigrationSettings,
    #[serde(default)]
    pub seeds: SeedSettings,
}

/// Database connection for one environment.
///
/// The `client` key selects the variant; the set of clients is closed and
/// resolved once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "client", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Postgres {
        /// Literal connection URL
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Environment variable holding the connection URL
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url_env: Option<String>,
    },
    Sqlite {
        /// Database file, relative to the project directory, or `:memory:`
        filename: PathBuf,
    },
}

/// Database client family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Client {
    Postgres,
    Sqlite,
}

impl Client {
    pub fn as_str(&self) -> &'static str {
        match self {
            Client::Postgres => "postgres",
            Client::Sqlite => "sqlite",
        }
    }
}

/// A connection with every indirection (env vars, relative paths) resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub client: Client,
    pub url: String,
}

/// How a named rollback target bounds the rolled back set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackBoundary {
    /// The named migration is rolled back together with everything after it
    #[default]
    Inclusive,
    /// Only migrations applied after the named one are rolled back
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    pub directory: PathBuf,
    pub table_name: String,
    pub extensions: Vec<String>,
    pub disable_transactions: bool,
    pub rollback_boundary: RollbackBoundary,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("migrations"),
            table_name: "strata_migrations".to_string(),
            extensions: vec!["sql".to_string()],
            disable_transactions: false,
            rollback_boundary: RollbackBoundary::Inclusive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedSettings {
    pub directory: PathBuf,
    pub extensions: Vec<String>,
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("seeds"),
            extensions: vec!["sql".to_string()],
        }
    }
}

const DEFAULT_URL_ENV: &str = "DATABASE_URL";

impl ConnectionConfig {
    pub fn client(&self) -> Client {
        match self {
            ConnectionConfig::Postgres { .. } => Client::Postgres,
            ConnectionConfig::Sqlite { .. } => Client::Sqlite,
        }
    }

    /// Resolve against the process environment
    pub fn resolve(&self, base_dir: &Path) -> CoreResult<ResolvedConnection> {
        self.resolve_with(base_dir, |var| std::env::var(var).ok())
    }

    /// Resolve with an explicit variable lookup
    pub fn resolve_with<F>(&self, base_dir: &Path, lookup: F) -> CoreResult<ResolvedConnection>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = match self {
            ConnectionConfig::Postgres { url: Some(url), .. } => url.clone(),
            ConnectionConfig::Postgres { url: None, url_env } => {
                let var = url_env.as_deref().unwrap_or(DEFAULT_URL_ENV);
                lookup(var).ok_or_else(|| CoreError::MissingEnvVar {
                    var: var.to_string(),
                    hint: "Set it or provide `url` in the environment's connection block."
                        .to_string(),
                })?
            }
            ConnectionConfig::Sqlite { filename } => {
                if filename.as_os_str() == ":memory:" {
                    "sqlite::memory:".to_string()
                } else {
                    let path = if filename.is_absolute() {
                        filename.clone()
                    } else {
                        base_dir.join(filename)
                    };
                    format!("sqlite://{}?mode=rwc", path.display())
                }
            }
        };

        Ok(ResolvedConnection {
            client: self.client(),
            url,
        })
    }
}

impl ProjectConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ProjectConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded project configuration");
        Ok(config)
    }

    /// Write configuration as YAML
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Starter configuration written by `init`
    pub fn starter() -> Self {
        let mut environments = BTreeMap::new();
        environments.insert(
            "development".to_string(),
            ConnectionConfig::Sqlite {
                filename: PathBuf::from("dev.sqlite3"),
            },
        );
        environments.insert(
            "production".to_string(),
            ConnectionConfig::Postgres {
                url: None,
                url_env: Some(DEFAULT_URL_ENV.to_string()),
            },
        );

        Self {
            environments,
            migrations: MigrationSettings::default(),
            seeds: SeedSettings::default(),
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.environments.is_empty() {
            return Err(CoreError::configuration(
                "at least one environment must be configured",
            ));
        }

        let table = &self.migrations.table_name;
        let valid_table = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !valid_table {
            return Err(CoreError::invalid_value(
                "migrations.table_name",
                table.clone(),
                "letters, digits, '_' or '.'",
            ));
        }

        if self.migrations.extensions.is_empty() {
            return Err(CoreError::invalid_value(
                "migrations.extensions",
                "[]",
                "at least one file extension",
            ));
        }

        if self.seeds.extensions.is_empty() {
            return Err(CoreError::invalid_value(
                "seeds.extensions",
                "[]",
                "at least one file extension",
            ));
        }

        Ok(())
    }

    /// Connection settings for an environment, matching its aliases
    pub fn connection_for(&self, env: &Environment) -> CoreResult<&ConnectionConfig> {
        env.aliases()
            .into_iter()
            .find_map(|name| self.environments.get(name))
            .ok_or_else(|| CoreError::UnknownEnvironment {
                name: env.as_str().to_string(),
                available: self
                    .environments
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
environments:
  development:
    client: sqlite
    filename: dev.sqlite3
  prod:
    client: postgres
    url_env: APP_DATABASE_URL
migrations:
  directory: db/migrations
  rollback_boundary: exclusive
"#;

    #[test]
    fn test_parse_tagged_connections() {
        let config: ProjectConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.environments.len(), 2);
        assert_eq!(
            config.environments["prod"],
            ConnectionConfig::Postgres {
                url: None,
                url_env: Some("APP_DATABASE_URL".to_string())
            }
        );
        assert_eq!(config.migrations.directory, PathBuf::from("db/migrations"));
        assert_eq!(config.migrations.table_name, "strata_migrations");
        assert_eq!(
            config.migrations.rollback_boundary,
            RollbackBoundary::Exclusive
        );
        assert_eq!(config.seeds.directory, PathBuf::from("seeds"));
    }

    #[test]
    fn test_unknown_client_rejected() {
        let yaml = "environments:\n  development:\n    client: oracle\n";
        assert!(serde_yaml::from_str::<ProjectConfig>(yaml).is_err());
    }

    #[test]
    fn test_connection_for_matches_aliases() {
        let config: ProjectConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let conn = config.connection_for(&Environment::Production).unwrap();
        assert_eq!(conn.client(), Client::Postgres);

        let err = config
            .connection_for(&Environment::Staging)
            .unwrap_err()
            .to_string();
        assert!(err.contains("staging"));
        assert!(err.contains("development, prod"));
    }

    #[test]
    fn test_resolve_sqlite_relative_to_base() {
        let conn = ConnectionConfig::Sqlite {
            filename: PathBuf::from("dev.sqlite3"),
        };
        let resolved = conn.resolve_with(Path::new("/srv/app"), |_| None).unwrap();
        assert_eq!(resolved.client, Client::Sqlite);
        assert_eq!(resolved.url, "sqlite:///srv/app/dev.sqlite3?mode=rwc");

        let memory = ConnectionConfig::Sqlite {
            filename: PathBuf::from(":memory:"),
        };
        let resolved = memory.resolve_with(Path::new("/srv/app"), |_| None).unwrap();
        assert_eq!(resolved.url, "sqlite::memory:");
    }

    #[test]
    fn test_resolve_postgres_from_env() {
        let conn = ConnectionConfig::Postgres {
            url: None,
            url_env: Some("APP_DATABASE_URL".to_string()),
        };
        let resolved = conn
            .resolve_with(Path::new("."), |var| {
                (var == "APP_DATABASE_URL").then(|| "postgres://localhost/app".to_string())
            })
            .unwrap();
        assert_eq!(resolved.url, "postgres://localhost/app");

        let err = conn.resolve_with(Path::new("."), |_| None).unwrap_err();
        assert!(matches!(err, CoreError::MissingEnvVar { ref var, .. } if var == "APP_DATABASE_URL"));
    }

    #[test]
    fn test_resolve_postgres_defaults_to_database_url() {
        let conn = ConnectionConfig::Postgres {
            url: None,
            url_env: None,
        };
        let resolved = conn
            .resolve_with(Path::new("."), |var| {
                (var == "DATABASE_URL").then(|| "postgres://db/main".to_string())
            })
            .unwrap();
        assert_eq!(resolved.url, "postgres://db/main");
    }

    #[test]
    fn test_validate_rejects_bad_table_name() {
        let mut config = ProjectConfig::starter();
        config.migrations.table_name = "migrations; DROP TABLE users".to_string();
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_extension_lists() {
        let mut config = ProjectConfig::starter();
        config.seeds.extensions.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue { ref field, .. } if field == "seeds.extensions"));

        let yaml = "environments:\n  development:\n    client: sqlite\n    filename: dev.sqlite3\n\
                    migrations:\n  extensions: []\n";
        let config: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, CoreError::InvalidValue { ref field, .. } if field == "migrations.extensions")
        );
    }

    #[test]
    fn test_starter_round_trips_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("strata.yaml");

        let config = ProjectConfig::starter();
        config.save(&path).unwrap();
        let loaded = ProjectConfig::load(&path).unwrap();

        assert_eq!(loaded, config);
        assert!(loaded.environments.contains_key("development"));
    }
}
