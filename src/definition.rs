//! Declarative descriptions of what a stack should contain.
//!
//! A [`ResourceDefinition`] is plain data. Engines turn it into whatever their
//! backend understands (a Pulumi YAML program, or simulated outputs).

use crate::{error::StackError, instance_type::InstanceType};
use anyhow::Context as _;
use std::{fmt, path::Path, str::FromStr};

pub const WEBSITE_URL: &str = "website_url";
pub const WEBSITE_CONTENT: &str = "website_content";
pub const INSTANCE_TYPE: &str = "instance_type";
pub const PUBLIC_KEY: &str = "public_key";
pub const PUBLIC_IP: &str = "public_ip";
pub const PUBLIC_DNS: &str = "public_dns";

pub const INDEX_DOCUMENT: &str = "index.html";
pub const INDEX_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const SSH_PORT: u16 = 22;

const MAX_STACK_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceDefinition {
    /// Declares nothing. Bound when a stack is only selected to read outputs or destroy it.
    Empty,
    Site(SiteDefinition),
    VirtualMachine(VmDefinition),
}

/// An S3 bucket serving `content` as its index document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDefinition {
    pub content: String,
}

/// An EC2 instance reachable over SSH with `public_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDefinition {
    pub public_key: String,
    pub instance_type: InstanceType,
}

impl VmDefinition {
    /// Uses the submitted key, or the contents of `fallback_key_file` if none was submitted.
    pub async fn new(submitted_key: Option<&str>, instance_type: InstanceType, fallback_key_file: &Path) -> anyhow::Result<Self> {
        let public_key = match submitted_key.map(str::trim).filter(|key| !key.is_empty()) {
            Some(key) => key.to_owned(),
            None => {
                log::debug!("No key submitted, reading {}", fallback_key_file.display());
                let key = tokio::fs::read_to_string(fallback_key_file)
                    .await
                    .with_context(|| format!("reading default public key {}", fallback_key_file.display()))?;
                key.trim().to_owned()
            }
        };
        Ok(Self { public_key, instance_type })
    }
}

/// The kinds of stack a user can manage. Stacks of every kind share one project,
/// so listings tell them apart by the outputs they export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Site,
    VirtualMachine,
}

impl ResourceKind {
    /// Output whose presence marks a stack as being of this kind.
    pub fn defining_output(&self) -> &'static str {
        match self {
            ResourceKind::Site => WEBSITE_URL,
            ResourceKind::VirtualMachine => PUBLIC_DNS,
        }
    }

    /// Label at the start of a sentence.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Site => "Site",
            ResourceKind::VirtualMachine => "VM",
        }
    }

    /// Label in the middle of a sentence.
    pub fn label_lower(&self) -> &'static str {
        match self {
            ResourceKind::Site => "site",
            ResourceKind::VirtualMachine => "VM",
        }
    }

    pub fn list_path(&self) -> &'static str {
        match self {
            ResourceKind::Site => "/sites",
            ResourceKind::VirtualMachine => "/vms",
        }
    }
}

/// A validated stack name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackName(String);

impl StackName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StackName {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StackError::InvalidInput("a name is required".to_owned()));
        }
        if s.len() > MAX_STACK_NAME_LEN {
            return Err(StackError::InvalidInput(format!("name '{s}' is longer than {MAX_STACK_NAME_LEN} characters")));
        }
        if let Some(c) = s.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))) {
            return Err(StackError::InvalidInput(format!(
                "name '{s}' contains '{c}'; use letters, digits, '-', '_' or '.'"
            )));
        }
        Ok(Self(s.to_owned()))
    }
}
