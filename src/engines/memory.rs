use super::{Engine, StackOutputs, StackRef, StackSummary};
use crate::{
    definition::{self, ResourceDefinition, StackName},
    error::{StackError, StackResult},
};
use async_trait::async_trait;
use clap::Args;
use maplit::btreemap;
use rand::Rng as _;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use tokio::time::{sleep, Duration};

const DEFAULT_REGION: &str = "us-east-1";

/// Keeps stacks in process memory and fabricates outputs instead of provisioning.
///
/// Follows the same contract as a real backend: names are unique per project,
/// only one apply or destroy runs per stack, and a stack holding resources
/// cannot be removed.
#[derive(Args, Clone, Default)]
#[command(
    override_usage = color_print::cstr! {r#"<bold>platyform</bold> [OPTIONS] <bold>memory</bold> [OPTIONS]

Intended for developing and testing platyform itself. Stacks are lost when
the process exits.
"#},)]
pub struct Memory {
    /// Simulated duration of every apply and destroy, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 0)]
    apply_delay_ms: u64,

    #[arg(skip)]
    stacks: Arc<Mutex<BTreeMap<(String, StackName), StackRecord>>>,
}

#[derive(Default)]
struct StackRecord {
    config: BTreeMap<String, String>,
    /// Logical resource name -> physical id.
    resources: BTreeMap<String, String>,
    outputs: StackOutputs,
    busy: bool,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apply_delay(delay: Duration) -> Self {
        Self { apply_delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), ..Self::default() }
    }

    fn key(stack: StackRef<'_>) -> (String, StackName) {
        (stack.project.to_owned(), stack.name.clone())
    }

    /// Marks the stack busy until the returned guard is dropped.
    fn begin(&self, stack: StackRef<'_>) -> StackResult<Operation> {
        let key = Self::key(stack);
        let mut stacks = self.stacks.lock().unwrap();
        let record = stacks.get_mut(&key).ok_or_else(|| StackError::NotFound(stack.name.to_string()))?;
        if record.busy {
            return Err(StackError::ConcurrentUpdate(stack.name.to_string()));
        }
        record.busy = true;
        Ok(Operation { stacks: self.stacks.clone(), key })
    }

    async fn simulate_work(&self) {
        if self.apply_delay_ms > 0 {
            sleep(Duration::from_millis(self.apply_delay_ms)).await;
        }
    }
}

/// Clears the busy mark, also when the request driving the operation is dropped.
struct Operation {
    stacks: Arc<Mutex<BTreeMap<(String, StackName), StackRecord>>>,
    key: (String, StackName),
}

impl Drop for Operation {
    fn drop(&mut self) {
        if let Some(record) = self.stacks.lock().unwrap().get_mut(&self.key) {
            record.busy = false;
        }
    }
}

#[async_trait]
impl Engine for Memory {
    async fn create_stack(&self, stack: StackRef<'_>) -> StackResult<()> {
        let mut stacks = self.stacks.lock().unwrap();
        let key = Self::key(stack);
        if stacks.contains_key(&key) {
            return Err(StackError::AlreadyExists(stack.name.to_string()));
        }
        log::debug!("Created in-memory stack {}/{}", stack.project, stack.name);
        stacks.insert(key, StackRecord::default());
        Ok(())
    }

    async fn select_stack(&self, stack: StackRef<'_>) -> StackResult<()> {
        match self.stacks.lock().unwrap().contains_key(&Self::key(stack)) {
            true => Ok(()),
            false => Err(StackError::NotFound(stack.name.to_string())),
        }
    }

    async fn list_stacks(&self, project: &str) -> StackResult<Vec<StackSummary>> {
        let stacks = self.stacks.lock().unwrap();
        Ok(stacks
            .iter()
            .filter(|((p, _), _)| p == project)
            .map(|((_, name), record)| StackSummary {
                name: name.to_string(),
                update_in_progress: record.busy,
                resource_count: Some(record.resources.len() as u64),
            })
            .collect())
    }

    async fn set_config(&self, stack: StackRef<'_>, key: &str, value: &str) -> StackResult<()> {
        let mut stacks = self.stacks.lock().unwrap();
        let record = stacks.get_mut(&Self::key(stack)).ok_or_else(|| StackError::NotFound(stack.name.to_string()))?;
        record.config.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn up(&self, stack: StackRef<'_>, definition: &ResourceDefinition) -> StackResult<StackOutputs> {
        let operation = self.begin(stack)?;
        log::info!("Updating in-memory stack {}/{}", stack.project, stack.name);
        self.simulate_work().await;

        let outputs = {
            let mut stacks = self.stacks.lock().unwrap();
            let record = stacks.get_mut(&operation.key).ok_or_else(|| StackError::NotFound(stack.name.to_string()))?;
            let region = record.config.get("aws:region").map(String::as_str).unwrap_or(DEFAULT_REGION).to_owned();
            let (resources, outputs) = simulate(definition, &record.resources, &region);
            record.resources = resources;
            record.outputs = outputs.clone();
            outputs
        };
        drop(operation);
        Ok(outputs)
    }

    async fn outputs(&self, stack: StackRef<'_>) -> StackResult<StackOutputs> {
        let stacks = self.stacks.lock().unwrap();
        let record = stacks.get(&Self::key(stack)).ok_or_else(|| StackError::NotFound(stack.name.to_string()))?;
        Ok(record.outputs.clone())
    }

    async fn destroy(&self, stack: StackRef<'_>) -> StackResult<()> {
        let operation = self.begin(stack)?;
        log::info!("Destroying in-memory stack {}/{}", stack.project, stack.name);
        self.simulate_work().await;

        {
            let mut stacks = self.stacks.lock().unwrap();
            if let Some(record) = stacks.get_mut(&operation.key) {
                record.resources.clear();
                record.outputs.clear();
            }
        }
        drop(operation);
        Ok(())
    }

    async fn remove_stack(&self, stack: StackRef<'_>) -> StackResult<()> {
        let mut stacks = self.stacks.lock().unwrap();
        let key = Self::key(stack);
        let record = stacks.get(&key).ok_or_else(|| StackError::NotFound(stack.name.to_string()))?;
        if record.busy {
            return Err(StackError::ConcurrentUpdate(stack.name.to_string()));
        }
        if !record.resources.is_empty() {
            return Err(anyhow::anyhow!("'{}' still has resources; removal rejected", stack.name).into());
        }
        stacks.remove(&key);
        Ok(())
    }
}

/// Resources and outputs a real apply of `definition` would leave behind.
/// Physical ids already assigned in `previous` are kept, like a real update does.
fn simulate(definition: &ResourceDefinition, previous: &BTreeMap<String, String>, region: &str) -> (BTreeMap<String, String>, StackOutputs) {
    let physical = |logical: &str, generate: &dyn Fn() -> String| previous.get(logical).cloned().unwrap_or_else(generate);

    match definition {
        ResourceDefinition::Empty => (BTreeMap::new(), StackOutputs::new()),
        ResourceDefinition::Site(site) => {
            let bucket = physical("s3-website-bucket", &|| format!("s3-website-bucket-{}", random_suffix()));
            let resources = btreemap! {
                "s3-website-bucket".to_owned() => bucket.clone(),
                "index".to_owned() => definition::INDEX_DOCUMENT.to_owned(),
                "bucket-policy".to_owned() => bucket.clone(),
            };
            let outputs = btreemap! {
                definition::WEBSITE_URL.to_owned() => format!("{bucket}.s3-website-{region}.amazonaws.com").into(),
                definition::WEBSITE_CONTENT.to_owned() => site.content.clone().into(),
            };
            (resources, outputs)
        }
        ResourceDefinition::VirtualMachine(vm) => {
            let ip = physical("dlami-server", &|| {
                let mut rng = rand::thread_rng();
                format!("54.{}.{}.{}", rng.gen_range(0..=255), rng.gen_range(0..=255), rng.gen_range(1..=254))
            });
            let compute_domain = match region {
                "us-east-1" => "compute-1.amazonaws.com".to_owned(),
                region => format!("{region}.compute.amazonaws.com"),
            };
            let resources = btreemap! {
                "web-secgrp".to_owned() => physical("web-secgrp", &|| format!("sg-{}", random_suffix())),
                "dlami-keypair".to_owned() => physical("dlami-keypair", &|| format!("dlami-keypair-{}", random_suffix())),
                "dlami-server".to_owned() => ip.clone(),
            };
            let outputs = btreemap! {
                definition::INSTANCE_TYPE.to_owned() => vm.instance_type.as_str().into(),
                definition::PUBLIC_KEY.to_owned() => vm.public_key.clone().into(),
                definition::PUBLIC_IP.to_owned() => ip.clone().into(),
                definition::PUBLIC_DNS.to_owned() => format!("ec2-{}.{compute_domain}", ip.replace('.', "-")).into(),
            };
            (resources, outputs)
        }
    }
}

/// Seven hex characters, as Pulumi appends to auto-named resources.
fn random_suffix() -> String {
    let mut suffix = hex::encode(rand::random::<[u8; 4]>());
    suffix.truncate(7);
    suffix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        definition::{SiteDefinition, VmDefinition},
        error::ErrorKind,
        instance_type::InstanceType,
    };

    fn name(s: &str) -> StackName {
        s.parse().unwrap()
    }

    fn site(content: &str) -> ResourceDefinition {
        ResourceDefinition::Site(SiteDefinition { content: content.to_owned() })
    }

    #[tokio::test]
    async fn create_refuses_existing_name() {
        let engine = Memory::new();
        let demo = name("demo");
        let stack = StackRef { project: "p", name: &demo };
        engine.create_stack(stack).await.unwrap();
        engine.up(stack, &site("first")).await.unwrap();

        let err = engine.create_stack(stack).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(engine.outputs(stack).await.unwrap()[definition::WEBSITE_CONTENT], "first");
    }

    #[tokio::test]
    async fn same_name_in_other_project_is_a_different_stack() {
        let engine = Memory::new();
        let demo = name("demo");
        engine.create_stack(StackRef { project: "a", name: &demo }).await.unwrap();
        engine.create_stack(StackRef { project: "b", name: &demo }).await.unwrap();
        assert_eq!(engine.list_stacks("a").await.unwrap().len(), 1);
        assert_eq!(engine.list_stacks("c").await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn overlapping_applies_are_rejected() {
        let engine = Memory::with_apply_delay(Duration::from_millis(200));
        let demo = name("demo");
        let stack = StackRef { project: "p", name: &demo };
        engine.create_stack(stack).await.unwrap();

        let first_definition = site("one");
        let second_definition = site("two");
        let (first, second) = tokio::join!(engine.up(stack, &first_definition), engine.up(stack, &second_definition));
        let kinds: Vec<_> = [first, second].into_iter().map(|r| r.map_err(|e| e.kind())).collect();
        assert_eq!(kinds.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(kinds.contains(&Err(ErrorKind::ConcurrentUpdate)));

        // busy mark is released afterwards
        engine.up(stack, &site("three")).await.unwrap();
    }

    #[test]
    fn oversized_delay_saturates() {
        assert_eq!(Memory::with_apply_delay(Duration::MAX).apply_delay_ms, u64::MAX);
        assert_eq!(Memory::with_apply_delay(Duration::from_secs(2)).apply_delay_ms, 2000);
    }

    #[tokio::test]
    async fn dropped_apply_releases_the_stack() {
        let engine = Memory::with_apply_delay(Duration::from_secs(60));
        let demo = name("demo");
        let stack = StackRef { project: "p", name: &demo };
        engine.create_stack(stack).await.unwrap();

        let definition = site("slow");
        let result = tokio::time::timeout(Duration::from_millis(10), engine.up(stack, &definition)).await;
        assert!(result.is_err());
        assert!(!engine.list_stacks("p").await.unwrap()[0].update_in_progress);
    }

    #[tokio::test]
    async fn remove_requires_destroy_first() {
        let engine = Memory::new();
        let demo = name("demo");
        let stack = StackRef { project: "p", name: &demo };
        engine.create_stack(stack).await.unwrap();
        engine.up(stack, &site("x")).await.unwrap();

        let err = engine.remove_stack(stack).await.unwrap_err();
        assert_eq!(err.to_string(), "'demo' still has resources; removal rejected");

        engine.destroy(stack).await.unwrap();
        engine.remove_stack(stack).await.unwrap();
        assert!(matches!(engine.select_stack(stack).await, Err(StackError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_keeps_physical_names_and_uses_configured_region() {
        let engine = Memory::new();
        let demo = name("demo");
        let stack = StackRef { project: "p", name: &demo };
        engine.create_stack(stack).await.unwrap();
        engine.set_config(stack, "aws:region", "us-west-2").await.unwrap();

        let first = engine.up(stack, &site("a")).await.unwrap();
        let second = engine.up(stack, &site("b")).await.unwrap();
        let url = first[definition::WEBSITE_URL].as_str().unwrap();
        assert!(url.starts_with("s3-website-bucket-"));
        assert!(url.ends_with(".s3-website-us-west-2.amazonaws.com"));
        assert_eq!(first[definition::WEBSITE_URL], second[definition::WEBSITE_URL]);
        assert_eq!(second[definition::WEBSITE_CONTENT], "b");
    }

    #[tokio::test]
    async fn vm_outputs_reflect_definition() {
        let engine = Memory::new();
        let box1 = name("box1");
        let stack = StackRef { project: "p", name: &box1 };
        engine.create_stack(stack).await.unwrap();
        let vm = VmDefinition { public_key: "ssh-ed25519 AAAA".to_owned(), instance_type: InstanceType::P2Xlarge };
        let outputs = engine.up(stack, &ResourceDefinition::VirtualMachine(vm)).await.unwrap();

        assert_eq!(outputs[definition::INSTANCE_TYPE], "p2.xlarge");
        assert_eq!(outputs[definition::PUBLIC_KEY], "ssh-ed25519 AAAA");
        let ip = outputs[definition::PUBLIC_IP].as_str().unwrap();
        let dns = outputs[definition::PUBLIC_DNS].as_str().unwrap();
        assert_eq!(dns, format!("ec2-{}.compute-1.amazonaws.com", ip.replace('.', "-")));
    }
}
