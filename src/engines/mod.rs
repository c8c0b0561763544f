mod memory;
mod program;
mod pulumi;

pub use memory::Memory;
pub use pulumi::PulumiCli;

use crate::{
    definition::{ResourceDefinition, StackName},
    error::StackResult,
};
use async_trait::async_trait;
use clap::{Args, Subcommand};
use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};

/// Outputs exported by a stack's last successful apply.
pub type StackOutputs = BTreeMap<String, serde_json::Value>;

/// Addresses one stack of one project.
#[derive(Debug, Clone, Copy)]
pub struct StackRef<'a> {
    pub project: &'a str,
    pub name: &'a StackName,
}

/// A stack as seen when listing a project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSummary {
    pub name: String,
    #[serde(default)]
    pub update_in_progress: bool,
    pub resource_count: Option<u64>,
}

/// An infrastructure-as-code engine that owns stack state.
///
/// Implementations classify their failures: a name collision on create is
/// `AlreadyExists`, an apply or destroy while another one runs is
/// `ConcurrentUpdate`, an unknown stack is `NotFound`.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Fails with `AlreadyExists` rather than touching an existing stack.
    async fn create_stack(&self, stack: StackRef<'_>) -> StackResult<()>;

    /// Fails with `NotFound` if the stack does not exist.
    async fn select_stack(&self, stack: StackRef<'_>) -> StackResult<()>;

    async fn list_stacks(&self, project: &str) -> StackResult<Vec<StackSummary>>;

    async fn set_config(&self, stack: StackRef<'_>, key: &str, value: &str) -> StackResult<()>;

    /// Reconciles the stack with `definition`.
    async fn up(&self, stack: StackRef<'_>, definition: &ResourceDefinition) -> StackResult<StackOutputs>;

    async fn outputs(&self, stack: StackRef<'_>) -> StackResult<StackOutputs>;

    /// Tears down every resource the stack holds. The stack itself remains.
    async fn destroy(&self, stack: StackRef<'_>) -> StackResult<()>;

    /// Forgets a stack. Fails if it still holds resources.
    async fn remove_stack(&self, stack: StackRef<'_>) -> StackResult<()>;

    /// Makes a resource provider plugin available before any stack needs it.
    async fn install_plugin(&self, _name: &str, _version: &str) -> StackResult<()> {
        Ok(())
    }
}

#[derive(Args, Clone)]
pub struct SomeEngine {
    #[command(subcommand)]
    inner: SomeEngineEnum,
}

#[derive(Subcommand, Clone)]
#[command(subcommand_help_heading = "Engines", subcommand_value_name = "ENGINE", disable_help_subcommand = true)]
enum SomeEngineEnum {
    /// Pulumi CLI
    Pulumi(PulumiCli),
    /// In-process stacks, nothing is provisioned
    Memory(Memory),
}

impl SomeEngine {
    /// Prepares the chosen engine (plugin installation, work directories) and hands it out.
    pub async fn start(&self) -> anyhow::Result<Arc<dyn Engine>> {
        match &self.inner {
            SomeEngineEnum::Pulumi(p) => {
                let engine = p.clone();
                engine.prepare().await?;
                Ok(Arc::new(engine))
            }
            SomeEngineEnum::Memory(m) => {
                log::warn!("Using the in-memory engine, stacks are lost on exit and nothing is provisioned");
                Ok(Arc::new(m.clone()))
            }
        }
    }
}
