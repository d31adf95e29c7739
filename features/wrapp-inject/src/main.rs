use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::executor::block_on;
use tracing_subscriber::EnvFilter;
use wrapp_inject::{
    BringUpBuilder, Component, ConfigProvider, DynError, InjectError, Injection, Injections,
    Resolved, Signal, Slot,
};

fn main() -> Result<(), DynError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wrapp_inject=debug")),
        )
        .init();

    let config = ConfigProvider::from_env().with_value("CACHE_CAPACITY", "128");

    let builder = BringUpBuilder::new()
        .component::<StatusBoard>()
        .component::<Queue>()
        .component::<Cache>()
        .config(config)
        .external("region", "eu-west".to_string())
        .role("cache", Cache::KEY)
        .stage_timeout(Duration::from_secs(5));

    println!("{:?}", builder.plan()?.stages());

    let container = block_on(builder.build())?;
    println!("{:?}", container);

    let board = container.require::<StatusBoard>(StatusBoard::KEY)?;
    println!("{:?}", board);

    let cache = container.role::<Cache>("cache")?;
    println!("cache hits: {}", cache.hits.get());

    block_on(container.shutdown())?;
    Ok(())
}

#[derive(Debug)]
struct Cache {
    capacity: usize,
    entries: HashMap<String, String>,
    hits: Slot<u64>,
}
impl Component for Cache {
    const KEY: &'static str = "cache";

    fn injections() -> Injections {
        Injections::new()
            .with(
                "capacity",
                Injection::env_with("CACHE_CAPACITY", |raw, _| async move { raw.parse::<usize>() }),
            )
            .with("hits", Injection::local_slot(0u64))
    }

    fn construct() -> Result<Self, DynError> {
        Ok(Cache {
            capacity: 0,
            entries: HashMap::new(),
            hits: Slot::new(0),
        })
    }

    fn wire(&mut self, resolved: &mut Resolved) -> Result<(), InjectError> {
        self.capacity = *resolved.take::<usize>("capacity")?;
        self.hits = resolved.take_cloned("hits")?;
        Ok(())
    }

    async fn init(&mut self) -> Result<(), DynError> {
        self.entries.reserve(self.capacity);
        Ok(())
    }

    async fn teardown(&self) -> Result<(), DynError> {
        tracing::info!("Flushing cache with {} entries", self.entries.len());
        Ok(())
    }
}

#[derive(Debug)]
struct Queue {
    url: String,
    region: Option<Arc<String>>,
    cache_capacity: usize,
}
impl Component for Queue {
    const KEY: &'static str = "queue";

    fn injections() -> Injections {
        Injections::new()
            .with(
                "url",
                Injection::env_optional_with("QUEUE_URL", |raw, _| async move {
                    Ok::<_, DynError>(raw.unwrap_or_else(|| "memory://jobs".to_string()))
                }),
            )
            .with(
                "cache_capacity",
                Injection::reference_with(|cache: Arc<Cache>| cache.capacity),
            )
            .with("region", Injection::external_use())
    }

    fn construct() -> Result<Self, DynError> {
        Ok(Queue {
            url: String::new(),
            region: None,
            cache_capacity: 0,
        })
    }

    fn wire(&mut self, resolved: &mut Resolved) -> Result<(), InjectError> {
        self.url = resolved.take_cloned("url")?;
        self.cache_capacity = *resolved.take::<usize>("cache_capacity")?;
        self.region = resolved.take_optional("region")?;
        Ok(())
    }
}

#[derive(Debug)]
struct StatusBoard {
    queue: Option<Arc<Queue>>,
    status: Signal<&'static str>,
}
impl Component for StatusBoard {
    const KEY: &'static str = "signal";

    fn injections() -> Injections {
        Injections::new()
            .with("queue", Injection::reference::<Queue>())
            .with("status", Injection::signal("starting"))
    }

    fn construct() -> Result<Self, DynError> {
        Ok(StatusBoard {
            queue: None,
            status: Signal::new("starting"),
        })
    }

    fn wire(&mut self, resolved: &mut Resolved) -> Result<(), InjectError> {
        self.queue = Some(resolved.take("queue")?);
        self.status = resolved.take_cloned("status")?;
        Ok(())
    }

    async fn init(&mut self) -> Result<(), DynError> {
        self.status.set("ready");
        Ok(())
    }
}
