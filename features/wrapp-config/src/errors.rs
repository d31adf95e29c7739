use std::sync::Arc;

/// Errors when trying to aquire a config value
#[derive(thiserror::Error, Debug, Clone)]
pub enum GetConfigError {
    /// The named configuration key is not set
    #[error("The configuration key '{0}' is not set")]
    MissingKey(String),
    /// The required Config type is not known
    #[error("The required Config type '{0}' is not known")]
    MissingType(&'static str),
    /// The config is registered under the type but holds something else
    #[error("Failed to downcast config, required: '{0}'")]
    DowncastFailed(&'static str),
}

/// Errors when trying to register or load configs
#[derive(thiserror::Error, Debug, Clone)]
pub enum RegisterConfigError {
    /// The required Config is already registered
    #[error("The Config type '{0}' is already registered")]
    AlreadyRegistered(&'static str),
    /// A `.env` file could not be read
    #[error("Failed to load env file: {0}")]
    EnvFile(Arc<dotenvy::Error>),
}

impl From<dotenvy::Error> for RegisterConfigError {
    fn from(error: dotenvy::Error) -> Self {
        Self::EnvFile(Arc::new(error))
    }
}
