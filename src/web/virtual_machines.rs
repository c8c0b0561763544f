//! EC2 instances reachable over SSH with a user-supplied key.

use super::{
    failure_flash, flash, log_outcome, outcome_flash,
    pages::{instance_choices, VmCreatePage, VmListPage, VmRow, VmUpdatePage},
    redirect_to_list, render, Action, AppState,
};
use crate::{
    definition::{ResourceDefinition, ResourceKind, StackName, VmDefinition, INSTANCE_TYPE, PUBLIC_KEY},
    engines::StackOutputs,
    error::{StackError, StackResult},
    instance_type::InstanceType,
};
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

const KIND: ResourceKind = ResourceKind::VirtualMachine;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/vms", get(list))
        .route("/vms/", get(list))
        .route("/vms/new", get(new).post(create))
        .route("/vms/:id/update", get(edit).post(update))
        .route("/vms/:id/delete", post(delete))
}

#[derive(Deserialize)]
struct VmForm {
    /// Absent on update, where the name comes from the path.
    #[serde(rename = "vm-id", default)]
    vm_id: String,
    /// Empty means the server's default key.
    #[serde(rename = "vm-keypair", default)]
    vm_keypair: String,
    #[serde(default)]
    instance_type: String,
}

impl VmForm {
    async fn definition(&self, state: &AppState) -> StackResult<ResourceDefinition> {
        let instance_type: InstanceType = self.instance_type.parse().map_err(|e: anyhow::Error| StackError::InvalidInput(e.to_string()))?;
        let fallback_key = &state.controller.config().default_public_key;
        let vm = VmDefinition::new(Some(&self.vm_keypair), instance_type, fallback_key).await?;
        Ok(ResourceDefinition::VirtualMachine(vm))
    }
}

async fn list(State(state): State<AppState>, jar: CookieJar) -> Response {
    let (jar, mut flashes) = flash::take(jar);
    let vms = match state.controller.list(KIND).await {
        Ok(listings) => listings.into_iter().map(VmRow::from).collect(),
        Err(e) => {
            log::error!("Listing VMs: {e:#}");
            flashes.push(failure_flash(&e));
            Vec::new()
        }
    };
    render(jar, VmListPage { flashes, vms })
}

async fn new(jar: CookieJar) -> Response {
    let (jar, flashes) = flash::take(jar);
    render(jar, VmCreatePage { flashes, instance_types: instance_choices(None) })
}

async fn create(State(state): State<AppState>, jar: CookieJar, Form(form): Form<VmForm>) -> Response {
    let name = form.vm_id.trim().to_owned();
    let result = create_vm(&state, &form).await;
    log_outcome(Action::Create, &name, &result);
    redirect_to_list(jar, KIND, outcome_flash(KIND, Action::Create, &name, &result))
}

async fn create_vm(state: &AppState, form: &VmForm) -> StackResult<()> {
    let name: StackName = form.vm_id.parse()?;
    let definition = form.definition(state).await?;
    state.controller.create(&name, &definition).await?;
    Ok(())
}

async fn edit(State(state): State<AppState>, Path(id): Path<String>, jar: CookieJar) -> Response {
    match read_vm(&state, &id).await {
        Ok(outputs) => {
            let (jar, flashes) = flash::take(jar);
            let output = |key: &str| outputs.get(key).and_then(|v| v.as_str());
            let page = VmUpdatePage {
                flashes,
                public_key: output(PUBLIC_KEY).unwrap_or_default().to_owned(),
                instance_types: instance_choices(output(INSTANCE_TYPE)),
                name: id,
            };
            render(jar, page)
        }
        Err(e) => {
            log::error!("Reading VM {id}: {e:#}");
            redirect_to_list(jar, KIND, failure_flash(&e))
        }
    }
}

async fn read_vm(state: &AppState, id: &str) -> StackResult<StackOutputs> {
    state.controller.read_outputs(&id.parse()?).await
}

async fn update(State(state): State<AppState>, Path(id): Path<String>, jar: CookieJar, Form(form): Form<VmForm>) -> Response {
    let result = update_vm(&state, &id, &form).await;
    log_outcome(Action::Update, &id, &result);
    redirect_to_list(jar, KIND, outcome_flash(KIND, Action::Update, &id, &result))
}

async fn update_vm(state: &AppState, id: &str, form: &VmForm) -> StackResult<()> {
    let name: StackName = id.parse()?;
    let definition = form.definition(state).await?;
    state.controller.update(&name, &definition).await?;
    Ok(())
}

async fn delete(State(state): State<AppState>, Path(id): Path<String>, jar: CookieJar) -> Response {
    let result = delete_vm(&state, &id).await;
    log_outcome(Action::Delete, &id, &result);
    redirect_to_list(jar, KIND, outcome_flash(KIND, Action::Delete, &id, &result))
}

async fn delete_vm(state: &AppState, id: &str) -> StackResult<()> {
    state.controller.delete(&id.parse()?).await
}
