/// Deployment environment a command runs against
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Staging,
    Production,
    Custom(String),
}

impl From<&str> for Environment {
    fn from(env: &str) -> Self {
        match env.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "testing" | "test" => Environment::Testing,
            "staging" | "stage" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Custom(env.to_string()),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Environment {
    /// Get environment name as string
    pub fn as_str(&self) -> &str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Custom(name) => name,
        }
    }

    /// Names this environment may be keyed under in the configuration file
    pub fn aliases(&self) -> Vec<&str> {
        match self {
            Environment::Development => vec!["development", "dev"],
            Environment::Testing => vec!["testing", "test"],
            Environment::Staging => vec!["staging", "stage"],
            Environment::Production => vec!["production", "prod"],
            Environment::Custom(name) => vec![name.as_str()],
        }
    }

    /// Check if seeds may run here without an explicit `--force`
    pub fn is_safe_for_seeding(&self) -> bool {
        match self {
            Environment::Development | Environment::Testing | Environment::Staging => true,
            Environment::Production | Environment::Custom(_) => false,
        }
    }
}
