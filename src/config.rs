use clap::Args;
use std::path::PathBuf;

pub const DEFAULT_PROJECT_NAME: &str = "self-service-platyform";
pub const DEFAULT_REGION: &str = "us-west-2";

/// Deployment-wide settings every stack operation is scoped by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Project all stacks live in.
    pub project_name: String,
    /// Pulumi organization, only used to link stacks in the Pulumi console.
    pub org_name: String,
    /// Value of `aws:region` on every stack.
    pub region: String,
    /// Key pair material for VMs created without a submitted key.
    pub default_public_key: PathBuf,
}

impl PlatformConfig {
    pub fn new(project_name: impl Into<String>, org_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            org_name: org_name.into(),
            region: region.into(),
            default_public_key: default_public_key_path(),
        }
    }

    pub fn console_url(&self, stack_name: &str) -> String {
        format!("https://app.pulumi.com/{}/{}/{}", self.org_name, self.project_name, stack_name)
    }
}

fn default_public_key_path() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".ssh").join("id_rsa.pub")
}

#[derive(Args)]
#[command(next_help_heading = "Platform options")]
pub struct PlatformArgs {
    /// Project that holds every stack.
    #[arg(long, default_value = DEFAULT_PROJECT_NAME, global = true)]
    project_name: String,

    /// Pulumi organization, used for console links.
    #[arg(long = "org", env = "PULUMI_ORG", default_value = "organization", global = true)]
    org_name: String,

    /// AWS region stacks are deployed to.
    #[arg(long, default_value = DEFAULT_REGION, global = true)]
    region: String,

    /// Public key used for VMs submitted without one [default: ~/.ssh/id_rsa.pub]
    #[arg(long, value_name = "PATH", global = true)]
    default_public_key: Option<PathBuf>,
}

impl PlatformArgs {
    pub fn to_config(&self) -> PlatformConfig {
        PlatformConfig {
            project_name: self.project_name.clone(),
            org_name: self.org_name.clone(),
            region: self.region.clone(),
            default_public_key: self.default_public_key.clone().unwrap_or_else(default_public_key_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_url_points_at_the_stack() {
        let config = PlatformConfig::new("self-service-platyform", "acme", "us-west-2");
        assert_eq!(config.console_url("demo"), "https://app.pulumi.com/acme/self-service-platyform/demo");
    }

    #[test]
    fn default_key_is_the_users_rsa_key() {
        let config = PlatformConfig::new("p", "o", "r");
        assert!(config.default_public_key.ends_with(".ssh/id_rsa.pub"));
    }
}
