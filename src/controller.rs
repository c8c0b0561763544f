//! Maps stack lifecycle requests onto engine calls.
//!
//! Holds no state of its own: every operation reads what it needs from the
//! engine, and the engine alone serializes work on a stack.

use crate::{
    config::PlatformConfig,
    definition::{ResourceDefinition, ResourceKind, StackName},
    engines::{Engine, StackOutputs, StackRef},
    error::StackResult,
};
use futures::{stream, StreamExt as _, TryStreamExt as _};
use std::sync::Arc;

/// Stacks whose outputs are read at the same time while listing.
const LIST_CONCURRENCY: usize = 4;

/// A stack of a given kind, as shown in a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct StackListing {
    pub name: String,
    pub outputs: StackOutputs,
    pub console_url: String,
    /// An apply or destroy was running when the stack was listed.
    pub update_in_progress: bool,
    pub resource_count: Option<u64>,
}

impl StackListing {
    /// String value of an output, if present.
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).and_then(|v| v.as_str())
    }
}

pub struct StackController {
    config: PlatformConfig,
    engine: Arc<dyn Engine>,
}

impl StackController {
    pub fn new(config: PlatformConfig, engine: Arc<dyn Engine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    fn stack<'a>(&'a self, name: &'a StackName) -> StackRef<'a> {
        StackRef { project: &self.config.project_name, name }
    }

    /// Creates the stack and applies `definition` to it. Never touches an existing stack.
    pub async fn create(&self, name: &StackName, definition: &ResourceDefinition) -> StackResult<StackOutputs> {
        let stack = self.stack(name);
        log::info!("Creating stack {name}");
        self.engine.create_stack(stack).await?;
        self.apply(stack, definition).await
    }

    /// Stacks of `kind`, told apart from other kinds by their outputs.
    pub async fn list(&self, kind: ResourceKind) -> StackResult<Vec<StackListing>> {
        let summaries = self.engine.list_stacks(&self.config.project_name).await?;
        let listings: Vec<Option<StackListing>> = stream::iter(summaries)
            .map(|summary| async move {
                let Ok(name) = summary.name.parse::<StackName>() else {
                    log::debug!("Skipping stack {} not managed here", summary.name);
                    return Ok(None);
                };
                let outputs = self.read_outputs(&name).await?;
                let listing = outputs.contains_key(kind.defining_output()).then(|| StackListing {
                    console_url: self.config.console_url(name.as_str()),
                    name: summary.name,
                    outputs,
                    update_in_progress: summary.update_in_progress,
                    resource_count: summary.resource_count,
                });
                StackResult::Ok(listing)
            })
            .buffered(LIST_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(listings.into_iter().flatten().collect())
    }

    /// Applies a new definition to an existing stack. Fails before applying anything if the stack is unknown.
    pub async fn update(&self, name: &StackName, definition: &ResourceDefinition) -> StackResult<StackOutputs> {
        let stack = self.stack(name);
        log::info!("Updating stack {name}");
        self.engine.select_stack(stack).await?;
        self.apply(stack, definition).await
    }

    /// Current outputs, for pre-filling an edit form.
    pub async fn read_outputs(&self, name: &StackName) -> StackResult<StackOutputs> {
        let stack = self.stack(name);
        self.engine.select_stack(stack).await?;
        self.engine.outputs(stack).await
    }

    /// Tears down the stack's resources and forgets the stack.
    pub async fn delete(&self, name: &StackName) -> StackResult<()> {
        let stack = self.stack(name);
        log::info!("Deleting stack {name}");
        self.engine.select_stack(stack).await?;
        self.engine.destroy(stack).await?;
        self.engine.remove_stack(stack).await?;
        log::info!("Stack {name} deleted");
        Ok(())
    }

    async fn apply(&self, stack: StackRef<'_>, definition: &ResourceDefinition) -> StackResult<StackOutputs> {
        self.engine.set_config(stack, "aws:region", &self.config.region).await?;
        let outputs = self.engine.up(stack, definition).await?;
        log::info!("Stack {} is up to date", stack.name);
        Ok(outputs)
    }
}
