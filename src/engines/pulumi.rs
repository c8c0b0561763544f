use super::{program, Engine, StackOutputs, StackRef, StackSummary};
use crate::{
    command_ext::{CommandExt as _, StreamMode},
    definition::{ResourceDefinition, StackName},
    error::{StackError, StackResult},
};
use anyhow::Context as _;
use async_trait::async_trait;
use clap::Args;
use regex::Regex;
use semver::Version;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    process::Output,
    sync::{Arc, LazyLock, Mutex},
};
use tokio::{fs, process::Command};

const PROGRAM_FILE: &str = "Pulumi.yaml";
/// Directory used for project-wide commands. `@` cannot appear in a stack name.
const PROJECT_DIR: &str = "@project";

const CONFLICT_TEXT: &str = "[409] Conflict: Another update is currently in progress.";
const LOCAL_BACKEND_CONFLICT_TEXT: &str = "the stack is currently locked by";
static ALREADY_EXISTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"stack '.*' already exists").unwrap());
static NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"no stack named '.*' found").unwrap());

/// Pulumi CLI
#[derive(Args, Clone)]
#[command(
    override_usage = color_print::cstr! {r#"<bold>platyform</bold> [OPTIONS] <bold>pulumi</bold> [OPTIONS]

<bold><underline>Authentication:</underline></bold>
  - pulumi login (or PULUMI_ACCESS_TOKEN) for the state backend
  - AWS credentials as understood by the AWS provider (AWS_PROFILE, ...)
  - PULUMI_CONFIG_PASSPHRASE when using a self-managed backend
"#},)]
pub struct PulumiCli {
    /// The pulumi executable.
    #[arg(long, value_name = "PATH", default_value = "pulumi")]
    pulumi_bin: PathBuf,

    /// Where per-stack project directories are kept [default: <cache dir>/platyform]
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// State backend, e.g. file://~/.pulumi-state [default: the logged-in backend]
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Version of the AWS resource plugin installed at startup.
    #[arg(long, value_name = "VERSION", default_value = "v3.36.0", value_parser = parse_plugin_version)]
    aws_plugin_version: Version,

    /// Stacks with an apply or destroy running in this process.
    #[arg(skip)]
    busy: Arc<Mutex<HashSet<(String, StackName)>>>,
}

fn parse_plugin_version(s: &str) -> anyhow::Result<Version> {
    Ok(Version::parse(s.trim().trim_start_matches('v'))?)
}

impl PulumiCli {
    pub fn new(pulumi_bin: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            pulumi_bin: pulumi_bin.into(),
            work_dir: Some(work_dir.into()),
            backend_url: None,
            aws_plugin_version: Version::new(3, 36, 0),
            busy: Arc::default(),
        }
    }

    /// Checks the CLI is usable and installs the AWS plugin.
    pub async fn prepare(&self) -> anyhow::Result<()> {
        log::info!("Checking pulumi installation...");
        let root = self.work_root();
        fs::create_dir_all(&root).await.with_context(|| format!("creating {}", root.display()))?;
        let output = self.run(&root, None, &["version"], StreamMode::Capture).await?;
        log::info!("pulumi {}", String::from_utf8_lossy(&output.stdout).trim());

        log::info!("Installing aws plugin v{}...", self.aws_plugin_version);
        self.install_plugin("aws", &format!("v{}", self.aws_plugin_version)).await?;
        Ok(())
    }

    fn work_root(&self) -> PathBuf {
        self.work_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("platyform")))
            .unwrap_or_else(|| std::env::temp_dir().join("platyform"))
    }

    fn project_root(&self, project: &str) -> PathBuf {
        self.work_root().join(sha256(project.as_bytes()))
    }

    /// Claims the stack for an apply or destroy. The program file is only written
    /// while the claim is held, so a rejected request never changes what a running
    /// `pulumi up` reads.
    fn begin(&self, stack: StackRef<'_>) -> StackResult<Operation> {
        let key = (stack.project.to_owned(), stack.name.clone());
        if !self.busy.lock().unwrap().insert(key.clone()) {
            return Err(StackError::ConcurrentUpdate(stack.name.to_string()));
        }
        Ok(Operation { busy: self.busy.clone(), key })
    }

    /// Directory to run read-only commands for a stack in. Falls back to the
    /// project directory so names that turn out not to exist leave nothing behind.
    async fn lookup_dir(&self, stack: StackRef<'_>) -> anyhow::Result<PathBuf> {
        let dir = self.project_root(stack.project).join(stack.name.as_str());
        if fs::try_exists(dir.join(PROGRAM_FILE)).await? {
            return Ok(dir);
        }
        self.stack_dir(stack.project, PROJECT_DIR).await
    }

    /// Directory holding the stack's program and its `Pulumi.<stack>.yaml` config.
    /// Writes an empty program if none is there yet; an existing one is left alone
    /// since an apply may be reading it.
    async fn stack_dir(&self, project: &str, dir_name: &str) -> anyhow::Result<PathBuf> {
        let dir = self.project_root(project).join(dir_name);
        fs::create_dir_all(&dir).await.with_context(|| format!("creating {}", dir.display()))?;
        if fs::try_exists(dir.join(PROGRAM_FILE)).await? {
            return Ok(dir);
        }
        write_program(&dir, project, &ResourceDefinition::Empty).await?;
        Ok(dir)
    }

    async fn run(&self, dir: &Path, stack: Option<&StackName>, args: &[&str], stdout_mode: StreamMode) -> StackResult<Output> {
        let context = match stack {
            Some(name) => format!("pulumi[{name}]"),
            None => "pulumi".to_owned(),
        };
        log::debug!("{context}: pulumi {}", args.join(" "));

        let mut command = Command::new(&self.pulumi_bin);
        command
            .args(args)
            .args(["--non-interactive", "--color", "never"])
            .current_dir(dir)
            .env("PULUMI_SKIP_UPDATE_CHECK", "true");
        if let Some(url) = &self.backend_url {
            command.env("PULUMI_BACKEND_URL", url);
        }

        let output = command.run_to_completion(&context, stdout_mode).await?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify(&stderr, stack).context(format!("pulumi {}", args.first().copied().unwrap_or_default())))
    }
}

/// Maps pulumi's stderr onto the error taxonomy.
fn classify(stderr: &str, stack: Option<&StackName>) -> ClassifiedFailure {
    let name = stack.map(ToString::to_string).unwrap_or_default();
    if ALREADY_EXISTS.is_match(stderr) {
        ClassifiedFailure::Known(StackError::AlreadyExists(name))
    } else if stderr.contains(CONFLICT_TEXT) || stderr.contains(LOCAL_BACKEND_CONFLICT_TEXT) {
        ClassifiedFailure::Known(StackError::ConcurrentUpdate(name))
    } else if NOT_FOUND.is_match(stderr) {
        ClassifiedFailure::Known(StackError::NotFound(name))
    } else {
        ClassifiedFailure::Other(stderr.trim().to_owned())
    }
}

/// Releases the stack's claim, also when the request driving the operation is dropped.
struct Operation {
    busy: Arc<Mutex<HashSet<(String, StackName)>>>,
    key: (String, StackName),
}

impl Drop for Operation {
    fn drop(&mut self) {
        self.busy.lock().unwrap().remove(&self.key);
    }
}

enum ClassifiedFailure {
    Known(StackError),
    /// Stderr of a failure with no specific meaning.
    Other(String),
}

impl ClassifiedFailure {
    fn context(self, context: String) -> StackError {
        match self {
            ClassifiedFailure::Known(e) => e,
            ClassifiedFailure::Other(stderr) => StackError::Unclassified(anyhow::anyhow!("{stderr}").context(context)),
        }
    }
}

/// Writes the program next to the file it replaces and renames it into place.
async fn write_program(dir: &Path, project: &str, definition: &ResourceDefinition) -> anyhow::Result<()> {
    let yaml = program::render(project, definition)?;
    let staging = dir.join(format!(".{PROGRAM_FILE}.{}", hex::encode(rand::random::<[u8; 4]>())));
    fs::write(&staging, yaml).await.with_context(|| format!("writing {}", staging.display()))?;
    fs::rename(&staging, dir.join(PROGRAM_FILE)).await.context("replacing program")?;
    Ok(())
}

#[async_trait]
impl Engine for PulumiCli {
    async fn create_stack(&self, stack: StackRef<'_>) -> StackResult<()> {
        let dir = self.project_root(stack.project).join(stack.name.as_str());
        let existed = fs::try_exists(&dir).await.context("checking stack directory")?;
        let dir = self.stack_dir(stack.project, stack.name.as_str()).await?;
        let result = self.run(&dir, Some(stack.name), &["stack", "init", stack.name.as_str()], StreamMode::Capture).await;
        if result.is_err() && !existed {
            if let Err(e) = fs::remove_dir_all(&dir).await {
                log::warn!("Removing {}: {e:#}", dir.display());
            }
        }
        result.map(|_| ())
    }

    async fn select_stack(&self, stack: StackRef<'_>) -> StackResult<()> {
        let dir = self.lookup_dir(stack).await?;
        self.run(&dir, Some(stack.name), &["stack", "select", stack.name.as_str()], StreamMode::Capture).await?;
        Ok(())
    }

    async fn list_stacks(&self, project: &str) -> StackResult<Vec<StackSummary>> {
        let dir = self.stack_dir(project, PROJECT_DIR).await?;
        let output = self.run(&dir, None, &["stack", "ls", "--json"], StreamMode::Capture).await?;
        let stacks: Vec<StackSummary> = serde_json::from_slice(&output.stdout).context("decoding stack list")?;
        log::debug!("listed stacks: {stacks:?}");
        Ok(stacks)
    }

    async fn set_config(&self, stack: StackRef<'_>, key: &str, value: &str) -> StackResult<()> {
        let dir = self.stack_dir(stack.project, stack.name.as_str()).await?;
        let args = ["config", "set", key, value, "--stack", stack.name.as_str()];
        self.run(&dir, Some(stack.name), &args, StreamMode::Capture).await?;
        Ok(())
    }

    async fn up(&self, stack: StackRef<'_>, definition: &ResourceDefinition) -> StackResult<StackOutputs> {
        let operation = self.begin(stack)?;
        let dir = self.stack_dir(stack.project, stack.name.as_str()).await?;
        write_program(&dir, stack.project, definition).await?;
        let args = ["up", "--yes", "--skip-preview", "--stack", stack.name.as_str()];
        self.run(&dir, Some(stack.name), &args, StreamMode::Log(log::Level::Info)).await?;
        drop(operation);
        self.outputs(stack).await
    }

    async fn outputs(&self, stack: StackRef<'_>) -> StackResult<StackOutputs> {
        let dir = self.lookup_dir(stack).await?;
        let args = ["stack", "output", "--json", "--show-secrets", "--stack", stack.name.as_str()];
        let output = self.run(&dir, Some(stack.name), &args, StreamMode::Capture).await?;
        Ok(serde_json::from_slice(&output.stdout).context("decoding stack outputs")?)
    }

    async fn destroy(&self, stack: StackRef<'_>) -> StackResult<()> {
        let _operation = self.begin(stack)?;
        let dir = self.stack_dir(stack.project, stack.name.as_str()).await?;
        let args = ["destroy", "--yes", "--skip-preview", "--stack", stack.name.as_str()];
        self.run(&dir, Some(stack.name), &args, StreamMode::Log(log::Level::Info)).await?;
        Ok(())
    }

    async fn remove_stack(&self, stack: StackRef<'_>) -> StackResult<()> {
        let _operation = self.begin(stack)?;
        let dir = self.lookup_dir(stack).await?;
        self.run(&dir, Some(stack.name), &["stack", "rm", "--yes", stack.name.as_str()], StreamMode::Capture)
            .await?;
        let stack_dir = self.project_root(stack.project).join(stack.name.as_str());
        if dir == stack_dir {
            log::debug!("Deleting stack directory {}", dir.display());
            if let Err(e) = fs::remove_dir_all(&dir).await {
                log::error!("{e:#}");
            }
        }
        Ok(())
    }

    async fn install_plugin(&self, name: &str, version: &str) -> StackResult<()> {
        let root = self.work_root();
        self.run(&root, None, &["plugin", "install", "resource", name, version], StreamMode::Log(log::Level::Debug))
            .await?;
        Ok(())
    }
}

fn sha256(x: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(x);
    let result = hasher.finalize();
    hex::encode(result)
}
