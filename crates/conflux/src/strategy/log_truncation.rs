//! Quorum-based garbage collection of transform logs
//!
//! A transform is only dropped from the coordinated logs once every one of
//! them has logged it, so a lagging source never loses the history it still
//! needs to detect duplicates. Agreement is checked each time any source logs
//! a transform; there is no message exchange between sources.

use super::{Registrations, Strategy, StrategyBase};
use crate::coordinator::Coordinator;
use crate::source::{EventKind, Source, SourceEvent};
use async_trait::async_trait;
use conflux_core::{ActivationOptions, Result, StrategyConfig};
use futures::FutureExt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Truncates every coordinated log once all of them contain a transform
#[derive(Debug)]
pub struct LogTruncationStrategy {
    base: StrategyBase,
    registrations: Registrations,
}

impl LogTruncationStrategy {
    pub const DEFAULT_NAME: &'static str = "log-truncation";

    pub fn new() -> Self {
        Self {
            base: Self::base_for(StrategyConfig::new()),
            registrations: Registrations::default(),
        }
    }

    /// Strategy over a subset of sources, or with a custom name or prefix
    pub fn with_config(config: StrategyConfig) -> Self {
        Self {
            base: Self::base_for(config),
            registrations: Registrations::default(),
        }
    }

    fn base_for(config: StrategyConfig) -> StrategyBase {
        let name = config
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_NAME.to_string());
        StrategyBase::named(name, config)
    }

    /// Number of `transform` listeners currently registered
    pub fn listener_count(&self) -> usize {
        self.registrations.len()
    }

    async fn wire(&self, sources: &[Arc<Source>]) -> Result<()> {
        for source in sources {
            source.transform_log().reified().await?;
        }

        let all: Vec<Weak<Source>> = sources.iter().map(Arc::downgrade).collect();
        for source in sources {
            let this = Arc::downgrade(source);
            let all = all.clone();
            let handle = source.on(EventKind::Transform, move |event: &SourceEvent| {
                let id = event.transform()?.id.clone();
                let this = this.clone();
                let all = all.clone();
                Some(async move { review(this, all, id).await }.boxed())
            });
            self.registrations.add(source, handle);
        }
        Ok(())
    }
}

impl Default for LogTruncationStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate every log at `id` if all sources other than `source` logged it
async fn review(source: Weak<Source>, all: Vec<Weak<Source>>, id: String) -> Result<()> {
    let Some(source) = source.upgrade() else {
        return Ok(());
    };
    let sources: Vec<Arc<Source>> = all.iter().filter_map(Weak::upgrade).collect();

    let agreed = sources.len() < 2
        || sources
            .iter()
            .filter(|other| !Arc::ptr_eq(other, &source))
            .all(|other| other.transform_log().contains(&id));
    if !agreed {
        return Ok(());
    }

    for participant in &sources {
        participant.transform_log().truncate(&id, 0).await?;
    }
    debug!(id = %id, sources = sources.len(), "Truncated coordinated logs");
    Ok(())
}

#[async_trait]
impl Strategy for LogTruncationStrategy {
    fn base(&self) -> &StrategyBase {
        &self.base
    }

    async fn activate(&self, coordinator: &Coordinator, options: &ActivationOptions) -> Result<()> {
        let sources = self.base.begin_activation(coordinator, options)?;
        let result = self.wire(&sources).await;
        if result.is_err() {
            self.registrations.remove_all();
        }
        self.base.end_activation(result)?;
        debug!(
            strategy = %self.name(),
            sources = sources.len(),
            "{} activated",
            self.base.log_prefix()
        );
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        if !self.base.begin_deactivation() {
            return Ok(());
        }
        self.registrations.remove_all();
        self.base.end_deactivation();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_core::{Bucket, MemoryBucket, Transform};

    #[tokio::test]
    async fn test_single_source_truncates_immediately() {
        let coordinator = Coordinator::new();
        let only = Source::memory("only");
        coordinator.add_source(only.clone()).unwrap();

        let strategy = LogTruncationStrategy::new();
        strategy
            .activate(&coordinator, &ActivationOptions::new())
            .await
            .unwrap();
        assert_eq!(strategy.listener_count(), 1);

        only.push(Transform::new("t1", vec![])).await.unwrap();
        assert!(only.transform_log().is_empty());
    }

    #[tokio::test]
    async fn test_activation_reifies_logs() {
        let bucket = Arc::new(MemoryBucket::new("store"));
        bucket
            .set_item("memory-log", serde_json::json!(["old"]))
            .await
            .unwrap();
        let memory = Source::builder("memory", Arc::new(crate::source::MemoryBackend::new()))
            .with_bucket(bucket)
            .build();
        let coordinator = Coordinator::new();
        coordinator.add_source(memory.clone()).unwrap();

        let strategy = LogTruncationStrategy::new();
        strategy
            .activate(&coordinator, &ActivationOptions::new())
            .await
            .unwrap();
        assert!(memory.transform_log().is_reified());
        assert!(memory.transform_log().contains("old"));

        strategy.deactivate().await.unwrap();
        assert_eq!(strategy.listener_count(), 0);
        assert_eq!(memory.events().listener_count(EventKind::Transform), 0);
    }
}
