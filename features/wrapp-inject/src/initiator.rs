use std::{
    collections::BTreeSet,
    sync::Arc,
    thread::{self, sleep},
    time::Duration,
};

use futures::{
    future::{self, BoxFuture},
    stream::FuturesUnordered,
    FutureExt, StreamExt,
};
use futures_channel::oneshot;

use crate::{
    builder::Plan,
    component::Published,
    container::{teardown_stages, Container, LiveRegistry, TeardownStages},
    dependency_graph::GraphNode,
    errors::{BringUpError, ComponentError},
    resolver::{resolve_injections, ResolveContext},
    scheduler::Stage,
    types::ComponentKey,
};

/// Brings up the components of a [`Plan`] stage by stage
pub(crate) struct BringUpInitiator {
    plan: Plan,
    ctx: ResolveContext,
    stage_timeout: Option<Duration>,
}

/// Components which came up in a stage
type StageOutcome = Vec<(ComponentKey, Published)>;

impl BringUpInitiator {
    pub(crate) fn new(plan: Plan, ctx: ResolveContext, stage_timeout: Option<Duration>) -> Self {
        BringUpInitiator {
            plan,
            ctx,
            stage_timeout,
        }
    }

    pub(crate) async fn initiate(self) -> Result<Container, BringUpError> {
        let stages = self.plan.stages();
        tracing::info!(
            "Bringing up {} components in {} stages",
            stages.component_count(),
            stages.len()
        );

        let mut live = LiveRegistry::new();
        let mut teardowns: TeardownStages = Vec::with_capacity(stages.len());

        for (index, stage) in stages.iter().enumerate() {
            let (outcome, result) = self.run_stage(index, stage, &live).await;

            // Published components are recorded even if a sibling failed, so they are rolled back
            let mut stage_teardowns = Vec::new();
            for (key, published) in outcome {
                if let Some(teardown) = published.teardown {
                    stage_teardowns.push((key.clone(), teardown));
                }
                live.insert(key, published.instance);
            }
            teardowns.push(stage_teardowns);

            if let Err(error) = result {
                tracing::error!("Bring-up aborted in stage {index}: {error}");
                rollback(teardowns).await;
                return Err(error);
            }
        }

        tracing::info!("All {} components are live", live.len());
        Ok(Container::new(
            live,
            self.plan.into_stages(),
            self.ctx.roles,
            teardowns,
        ))
    }

    /// Brings up all components of one stage concurrently
    ///
    /// Waits for every component of the stage, even if one of them already failed.
    async fn run_stage(
        &self,
        index: usize,
        stage: &Stage,
        live: &LiveRegistry,
    ) -> (StageOutcome, Result<(), BringUpError>) {
        tracing::debug!("Starting stage {index} with {} components", stage.len());

        let mut deadline = deadline(self.stage_timeout).fuse();
        // Stages are computed from this graph, every key has a node
        let mut component_futures: FuturesUnordered<_> = stage
            .iter()
            .filter_map(|key| self.plan.graph().get(key))
            .map(|node| async move { (&node.key, bring_up(node, live, &self.ctx).await) })
            .collect();

        let component_count = component_futures.len();
        let mut pending: BTreeSet<&ComponentKey> = stage.iter().collect();
        let mut outcome = Vec::new();
        let mut errors = Vec::new();

        loop {
            tracing::debug!(
                "Waiting for stage {index} [{} of {component_count} complete]",
                component_count - pending.len()
            );

            futures::select! {
                result = component_futures.next() => {
                    let Some((key, result)) = result else {
                        break;
                    };
                    pending.remove(key);
                    match result {
                        Ok(published) => outcome.push((key.clone(), published)),
                        Err(error) => {
                            tracing::error!("Component '{key}' failed: {error}");
                            errors.push(error);
                        }
                    }
                }
                _ = deadline => {
                    let pending: Vec<ComponentKey> = pending.into_iter().cloned().collect();
                    tracing::error!("Stage {index} timed out waiting for {pending:?}");
                    errors.sort_by(|a, b| a.component().cmp(b.component()));
                    let error = BringUpError::Timeout {
                        stage: index,
                        pending,
                        errors,
                    };
                    return (outcome, Err(error));
                }
            }
        }

        errors.sort_by(|a, b| a.component().cmp(b.component()));
        let result = match errors.len() {
            0 => Ok(()),
            1 => Err(BringUpError::Component(errors.remove(0))),
            _ => Err(BringUpError::Stage {
                stage: index,
                errors,
            }),
        };
        (outcome, result)
    }
}

/// Construct, resolve, wire and initialize a single component
async fn bring_up(
    node: &GraphNode,
    live: &LiveRegistry,
    ctx: &ResolveContext,
) -> Result<Published, ComponentError> {
    let unwired = node
        .descriptor
        .component()
        .construct()
        .map_err(|error| ComponentError::Construct {
            component: node.key.clone(),
            error: Arc::new(error),
        })?;

    let resolved = resolve_injections(node, live, ctx).await?;

    let published = unwired
        .start(resolved)
        .await
        .map_err(|error| error.for_component(&node.key))?;

    tracing::debug!("'{}' is live", node.key);
    Ok(published)
}

/// Resolves once `timeout` elapsed, never if there is none
fn deadline(timeout: Option<Duration>) -> BoxFuture<'static, ()> {
    let Some(timeout) = timeout else {
        return future::pending().boxed();
    };

    let (timeout_tx, timeout_rx) = oneshot::channel::<()>();
    // The timer thread is never joined, it exits once it fired
    thread::spawn(move || {
        sleep(timeout);
        let _ = timeout_tx.send(());
    });
    timeout_rx.map(|_| ()).boxed()
}

/// Tears down everything published so far, in reverse stage order
async fn rollback(teardowns: TeardownStages) {
    let count: usize = teardowns.iter().map(Vec::len).sum();
    if count == 0 {
        return;
    }

    tracing::warn!("Rolling back {count} components");
    let failures = teardown_stages(teardowns).await;
    if !failures.is_empty() {
        tracing::warn!("{} teardown hooks failed during rollback", failures.len());
    }
}
