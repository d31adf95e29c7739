use std::{
    any::type_name,
    collections::BTreeMap,
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};

use futures::{stream::FuturesUnordered, StreamExt};

use crate::{
    component::Teardown,
    errors::{RequireError, ShutdownError},
    scheduler::Stages,
    types::{ComponentKey, DynError, Injectable, Instance},
};

/// Live components by key
///
/// Filled stage by stage during bring-up and only read while a stage runs.
#[derive(Clone, Default)]
pub struct LiveRegistry {
    instances: BTreeMap<ComponentKey, Instance>,
}
impl Debug for LiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (key, instance) in &self.instances {
            map.entry(key, &instance.info.type_name);
        }
        map.finish()
    }
}

impl LiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, key: ComponentKey, instance: Instance) {
        self.instances.insert(key, instance);
    }

    pub fn get(&self, key: &str) -> Option<&Instance> {
        self.instances.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.instances.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ComponentKey> {
        self.instances.keys()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Teardown hooks grouped by the stage their component was brought up in
pub(crate) type TeardownStages = Vec<Vec<(ComponentKey, Teardown)>>;

/// Container holding all live components after a successful bring-up
#[derive(Clone)]
pub struct Container(Arc<ContainerInner>);
struct ContainerInner {
    live: LiveRegistry,
    stages: Stages,
    roles: BTreeMap<String, ComponentKey>,
    teardowns: Mutex<TeardownStages>,
}
impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("live", &self.0.live)
            .field("stages", &self.0.stages)
            .field("roles", &self.0.roles)
            .finish()
    }
}

impl Container {
    pub(crate) fn new(
        live: LiveRegistry,
        stages: Stages,
        roles: BTreeMap<String, ComponentKey>,
        teardowns: TeardownStages,
    ) -> Self {
        Self(Arc::new(ContainerInner {
            live,
            stages,
            roles,
            teardowns: Mutex::new(teardowns),
        }))
    }

    /// Attempts to get the live component under `key` as `T`
    pub fn require<T: Injectable>(&self, key: &str) -> Result<Arc<T>, RequireError> {
        match self.0.live.get(key) {
            Some(instance) => {
                instance
                    .downcast()
                    .map_err(|actual_type| RequireError::DowncastFailed {
                        required_type: type_name::<T>(),
                        actual_type,
                    })
            }
            None => Err(RequireError::ComponentMissing(key.to_string())),
        }
    }

    /// Attempts to get the live component assigned to `role` as `T`
    pub fn role<T: Injectable>(&self, role: &str) -> Result<Arc<T>, RequireError> {
        let key = self
            .role_key(role)
            .ok_or_else(|| RequireError::RoleMissing(role.to_string()))?;
        self.require(key)
    }

    /// Key of the component assigned to `role`
    pub fn role_key(&self, role: &str) -> Option<&str> {
        self.0.roles.get(role).map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Instance> {
        self.0.live.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.live.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ComponentKey> {
        self.0.live.keys()
    }

    pub fn live(&self) -> &LiveRegistry {
        &self.0.live
    }

    /// The stages the components were brought up in
    pub fn stages(&self) -> &Stages {
        &self.0.stages
    }

    /// Runs the teardown hooks in reverse stage order
    ///
    /// Hooks of one stage run concurrently. Every hook runs even if others fail, the
    /// failures are returned together. Only the first call tears anything down.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        let teardowns = std::mem::take(
            &mut *self
                .0
                .teardowns
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if teardowns.is_empty() {
            tracing::debug!("Nothing to tear down");
            return Ok(());
        }

        tracing::info!("Shutting down {} components", self.0.live.len());
        let failures = teardown_stages(teardowns).await;
        if !failures.is_empty() {
            return Err(ShutdownError { failures });
        }

        tracing::info!("Shutdown complete");
        Ok(())
    }
}

/// Tears the stages down from last to first, the hooks of one stage concurrently
pub(crate) async fn teardown_stages(stages: TeardownStages) -> Vec<(ComponentKey, Arc<DynError>)> {
    let mut failures = Vec::new();

    for (index, stage) in stages.into_iter().enumerate().rev() {
        tracing::debug!("Tearing down stage {index} with {} components", stage.len());

        let mut pending: FuturesUnordered<_> = stage
            .into_iter()
            .map(|(key, teardown)| async move {
                let result = teardown().await;
                (key, result)
            })
            .collect();

        while let Some((key, result)) = pending.next().await {
            match result {
                Ok(()) => tracing::debug!("Tore down '{key}'"),
                Err(error) => {
                    tracing::warn!("Teardown of '{key}' failed: {error}");
                    failures.push((key, Arc::new(error)));
                }
            }
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use futures::{executor::block_on, FutureExt};
    use pretty_assertions::assert_eq;

    use super::*;

    fn recording(log: &Arc<Mutex<Vec<String>>>, key: &str, fail: bool) -> (ComponentKey, Teardown) {
        let log = log.clone();
        let name = key.to_string();
        let teardown: Teardown = Box::new(move || {
            async move {
                log.lock().unwrap().push(name.clone());
                if fail {
                    return Err(DynError::from(format!("{name} refused")));
                }
                Ok(())
            }
            .boxed()
        });
        (key.to_string(), teardown)
    }

    fn container(teardowns: TeardownStages) -> Container {
        let mut live = LiveRegistry::new();
        live.insert("cache".into(), Instance::new(64usize));
        live.insert("queue".into(), Instance::new("amqp://local".to_string()));
        let stages = Stages::default();
        let roles = BTreeMap::from([("the-cache".to_string(), "cache".to_string())]);
        Container::new(live, stages, roles, teardowns)
    }

    #[test]
    fn require_and_role_lookups() {
        let container = container(Vec::new());

        assert_eq!(*container.require::<usize>("cache").unwrap(), 64);
        assert_eq!(*container.role::<usize>("the-cache").unwrap(), 64);
        assert!(matches!(
            container.require::<usize>("queue"),
            Err(RequireError::DowncastFailed { actual_type, .. }) if actual_type.ends_with("String")
        ));
        assert!(matches!(
            container.require::<usize>("db"),
            Err(RequireError::ComponentMissing(key)) if key == "db"
        ));
        assert!(matches!(
            container.role::<usize>("the-db"),
            Err(RequireError::RoleMissing(_))
        ));
    }

    #[test]
    fn shutdown_runs_stages_in_reverse_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = container(vec![
            vec![recording(&log, "cache", false)],
            vec![recording(&log, "queue", true)],
        ]);

        let error = block_on(container.shutdown()).unwrap_err();
        assert_eq!(error.failures.len(), 1);
        assert_eq!(error.failures[0].0, "queue");
        assert_eq!(*log.lock().unwrap(), vec!["queue", "cache"]);

        block_on(container.shutdown()).unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn live_registry_debug_lists_types() {
        let mut live = LiveRegistry::new();
        live.insert("cache".into(), Instance::new(1u8));
        assert_eq!(format!("{live:?}"), r#"{"cache": "u8"}"#);
    }
}
