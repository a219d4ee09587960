use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a dotted settings key to the environment variable that sets it
pub fn to_env_var(field_path: &str) -> String {
    let field_path = field_path.trim_start_matches("missing field ");
    format!("HERON_{}", field_path.replace('.', "__").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("provider.api_key"), "HERON_PROVIDER__API_KEY");
        assert_eq!(to_env_var("type"), "HERON_TYPE");
        assert_eq!(
            to_env_var("generation.stall_timeout_secs"),
            "HERON_GENERATION__STALL_TIMEOUT_SECS"
        );
    }

    #[test]
    fn test_missing_env_var_message() {
        let err = ConfigError::MissingEnvVar {
            env_var: "HERON_PROVIDER__API_KEY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: HERON_PROVIDER__API_KEY"
        );
    }
}
