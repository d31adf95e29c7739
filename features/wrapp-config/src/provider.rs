use std::{
    any::{type_name, Any, TypeId},
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::Arc,
};

use crate::errors::{GetConfigError, RegisterConfigError};

/// The resolved environment of an application.
///
/// Holds two kinds of configuration:
/// - raw string values addressed by key, read by `environment` injections
/// - typed config objects addressed by type, for factories needing structured settings
///
/// Once handed to a bring-up run the provider is shared read-only.
#[derive(Default)]
pub struct ConfigProvider {
    values: BTreeMap<String, String>,
    configs: HashMap<TypeId, Arc<dyn Any + Send + Sync + 'static>>,
}

impl std::fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values may hold secrets - only list the keys
        f.debug_struct("ConfigProvider")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("typed_configs", &self.configs.len())
            .finish()
    }
}

impl ConfigProvider {
    /// Initializes an empty Config Provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the whole process environment
    pub fn from_env() -> Self {
        let mut provider = Self::new();
        provider.values.extend(unicode_vars());
        tracing::debug!("Loaded {} values from the process environment", provider.values.len());
        provider
    }

    /// Captures all environment variables starting with `prefix`, with the prefix stripped
    ///
    /// `from_env_prefixed("APP_")` turns `APP_API_TOKEN` into `API_TOKEN`.
    pub fn from_env_prefixed(prefix: &str) -> Self {
        let mut provider = Self::new();
        provider.values.extend(unicode_vars().filter_map(|(key, value)| {
            key.strip_prefix(prefix)
                .filter(|stripped| !stripped.is_empty())
                .map(|stripped| (stripped.to_string(), value))
        }));
        tracing::debug!(
            "Loaded {} values with prefix '{prefix}' from the process environment",
            provider.values.len()
        );
        provider
    }

    /// Adds all values of a `.env` style file, overriding existing keys
    pub fn load_env_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, RegisterConfigError> {
        let path = path.as_ref();
        let mut loaded = 0usize;
        for item in dotenvy::from_path_iter(path)? {
            let (key, value) = item?;
            self.values.insert(key, value);
            loaded += 1;
        }
        tracing::debug!("Loaded {loaded} values from '{}'", path.display());
        Ok(self)
    }

    /// Sets a raw value, returning the provider for chaining
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_value(key, value);
        self
    }

    /// Sets a raw value, replacing an existing one
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    /// Returns the raw value of `key` if it is set
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the raw value of `key`, failing if it is not set
    pub fn require_value(&self, key: &str) -> Result<&str, GetConfigError> {
        self.value(key)
            .ok_or_else(|| GetConfigError::MissingKey(key.to_string()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterates all raw keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Retrieve a config with specified type.
    ///
    /// Returns `Ok(None)` if no config of this type was registered
    pub fn get_config<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, GetConfigError> {
        self.configs
            .get(&TypeId::of::<T>())
            .map(|entry| entry.clone().downcast())
            .transpose()
            .map_err(|_| GetConfigError::DowncastFailed(type_name::<T>()))
    }

    /// Retrieve a config with specified type, failing if it is not registered
    pub fn require_config<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, GetConfigError> {
        self.get_config::<T>()?
            .ok_or(GetConfigError::MissingType(type_name::<T>()))
    }

    /// Add a config to the registry.
    ///
    /// If the config type is already registered, it will return a
    /// [`RegisterConfigError`]
    pub fn add_config<T: Send + Sync + 'static>(
        &mut self,
        config: T,
    ) -> Result<&mut Self, RegisterConfigError> {
        let type_id = TypeId::of::<T>();

        if self.configs.contains_key(&type_id) {
            return Err(RegisterConfigError::AlreadyRegistered(type_name::<T>()));
        }

        self.configs.insert(type_id, Arc::new(config));
        Ok(self)
    }

    /// Can optionally add a config to the registry.
    ///
    /// If the config provided is `Some(T)`, it will be the same as calling [`ConfigProvider::add_config`]
    /// If the config provided is `None`, then the function just returns `Ok(self)` for chaining
    pub fn maybe_add_config<T: Send + Sync + 'static>(
        &mut self,
        config: Option<T>,
    ) -> Result<&mut Self, RegisterConfigError> {
        match config {
            Some(c) => self.add_config(c),
            None => Ok(self),
        }
    }
}

/// Process environment, skipping variables which are not valid unicode
fn unicode_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}
