use std::sync::Arc;

use thiserror::Error;

use crate::types::{ComponentKey, DynError};

/// Static defects of the declared dependency graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("'{consumer}' needs '{target}' through property '{property}' but it is not registered")]
    MissingDependency {
        consumer: ComponentKey,
        property: String,
        target: String,
    },
    #[error("'{consumer}' references '{target}' through property '{property}', which is registered as several components: {candidates:?}")]
    AmbiguousReference {
        consumer: ComponentKey,
        property: String,
        target: String,
        candidates: Vec<ComponentKey>,
    },
    #[error("A Circular Dependency exists: {}", .chain.join(" -> "))]
    CircularDependency { chain: Vec<ComponentKey> },
}

/// Failure to compute the value of a single injection
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("The environment key '{key}' is not set")]
    MissingEnvironment { key: String },
    #[error("The referenced component '{target}' is not live")]
    MissingReference { target: ComponentKey },
    #[error("The factory failed: {0}")]
    Factory(Arc<DynError>),
    #[error("The transform failed: {0}")]
    Transform(Arc<DynError>),
}

/// Errors while a component takes its resolved values
#[derive(Error, Debug, Clone)]
pub enum InjectError {
    /// Nothing was resolved under the property
    #[error("Property '{property}' was not resolved")]
    Missing { property: String },
    #[error("Property '{property}' holds '{actual}', required: '{required}'")]
    DowncastFailed {
        property: String,
        required: &'static str,
        actual: &'static str,
    },
    /// Generic error during Injection
    #[error("Error during injection: {0}")]
    Other(Arc<DynError>),
}

/// A single component failed to come up
#[derive(Error, Debug, Clone)]
pub enum ComponentError {
    #[error("Failed to resolve '{property}' of '{component}': {source}")]
    Resolution {
        component: ComponentKey,
        property: String,
        source: ResolveError,
    },
    #[error("Failed to construct '{component}': {error}")]
    Construct {
        component: ComponentKey,
        error: Arc<DynError>,
    },
    #[error("Failed to wire '{component}': {source}")]
    Wire {
        component: ComponentKey,
        source: InjectError,
    },
    #[error("Initialization hook of '{component}' failed: {error}")]
    Init {
        component: ComponentKey,
        error: Arc<DynError>,
    },
}
impl ComponentError {
    /// Key of the failing component
    pub fn component(&self) -> &str {
        match self {
            ComponentError::Resolution { component, .. }
            | ComponentError::Construct { component, .. }
            | ComponentError::Wire { component, .. }
            | ComponentError::Init { component, .. } => component,
        }
    }
}

/// Errors of a bring-up run
#[derive(Error, Debug, Clone)]
pub enum BringUpError {
    /// There are issues with the dependency graph
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Role '{role}' points to '{key}', which is not a registered component")]
    UnknownRole { role: String, key: ComponentKey },
    /// Exactly one component of a stage failed
    #[error(transparent)]
    Component(#[from] ComponentError),
    /// Several components of the same stage failed
    #[error("Stage {stage} had {} failures:{}", .errors.len(), bullet_list(.errors))]
    Stage {
        stage: usize,
        errors: Vec<ComponentError>,
    },
    /// A stage ran past its deadline, failures which happened before are kept
    #[error("Stage {stage} did not complete in time, still pending: {pending:?}{}", bullet_list(.errors))]
    Timeout {
        stage: usize,
        pending: Vec<ComponentKey>,
        errors: Vec<ComponentError>,
    },
}
impl BringUpError {
    /// All component failures carried by this error
    pub fn component_errors(&self) -> &[ComponentError] {
        match self {
            BringUpError::Component(error) => std::slice::from_ref(error),
            BringUpError::Stage { errors, .. } | BringUpError::Timeout { errors, .. } => errors,
            _ => &[],
        }
    }
}

/// Errors when trying to require a live component
#[derive(Error, Debug, Clone)]
pub enum RequireError {
    #[error("No component is live under '{0}'")]
    ComponentMissing(ComponentKey),
    #[error("No component is assigned to the role '{0}'")]
    RoleMissing(String),
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
}

/// Teardown hooks which failed during shutdown
#[derive(Error, Debug, Clone)]
pub struct ShutdownError {
    pub failures: Vec<(ComponentKey, Arc<DynError>)>,
}
impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let failures = self
            .failures
            .iter()
            .map(|(key, error)| format!("'{key}': {error}"));
        write!(
            f,
            "Shutdown had {} failures:{}",
            self.failures.len(),
            bullet_list(failures)
        )
    }
}

fn bullet_list<I>(items: I) -> String
where
    I: IntoIterator,
    I::Item: std::fmt::Display,
{
    items
        .into_iter()
        .map(|item| format!("\n- {item}"))
        .collect()
}
