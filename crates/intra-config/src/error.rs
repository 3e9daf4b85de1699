//! Configuration errors.

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot render config as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A setting every command needs is absent from all layers.
    #[error("'{field}' is not configured; set it under {context}")]
    MissingField { field: String, context: String },

    #[error(
        "no OAuth client secret found; run 'intra config set-secret', export {env_var}, \
         or set [oauth] client_secret"
    )]
    SecretNotFound { env_var: String },

    #[error("keyring: {0}")]
    Keyring(String),
}
