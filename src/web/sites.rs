//! Static websites: an S3 bucket serving one index document.

use super::{
    failure_flash, flash, log_outcome, outcome_flash,
    pages::{SiteCreatePage, SiteListPage, SiteRow, SiteUpdatePage},
    redirect_to_list, render, Action, AppState,
};
use crate::{
    definition::{ResourceDefinition, ResourceKind, SiteDefinition, StackName, WEBSITE_CONTENT},
    engines::StackOutputs,
    error::StackResult,
};
use anyhow::Context as _;
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

const KIND: ResourceKind = ResourceKind::Site;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sites", get(list))
        .route("/sites/", get(list))
        .route("/sites/new", get(new).post(create))
        .route("/sites/:id/update", get(edit).post(update))
        .route("/sites/:id/delete", post(delete))
}

#[derive(Deserialize)]
struct CreateForm {
    #[serde(rename = "site-id", default)]
    site_id: String,
    #[serde(rename = "file-url", default)]
    file_url: String,
    #[serde(rename = "site-content", default)]
    site_content: String,
}

/// Content is taken from `file-url` when one is given.
#[derive(Deserialize)]
struct ContentForm {
    #[serde(rename = "file-url", default)]
    file_url: String,
    #[serde(rename = "site-content", default)]
    site_content: String,
}

impl ContentForm {
    async fn resolve(self, http: &reqwest::Client) -> StackResult<String> {
        let url = self.file_url.trim();
        if url.is_empty() {
            return Ok(self.site_content);
        }
        Ok(fetch(http, url).await.with_context(|| format!("fetching site content from {url}"))?)
    }
}

async fn fetch(http: &reqwest::Client, url: &str) -> anyhow::Result<String> {
    log::info!("Fetching site content from {url}");
    Ok(http.get(url).send().await?.error_for_status()?.text().await?)
}

async fn list(State(state): State<AppState>, jar: CookieJar) -> Response {
    let (jar, mut flashes) = flash::take(jar);
    let sites = match state.controller.list(KIND).await {
        Ok(listings) => listings.into_iter().map(SiteRow::from).collect(),
        Err(e) => {
            log::error!("Listing sites: {e:#}");
            flashes.push(failure_flash(&e));
            Vec::new()
        }
    };
    render(jar, SiteListPage { flashes, sites })
}

async fn new(jar: CookieJar) -> Response {
    let (jar, flashes) = flash::take(jar);
    render(jar, SiteCreatePage { flashes })
}

async fn create(State(state): State<AppState>, jar: CookieJar, Form(form): Form<CreateForm>) -> Response {
    let name = form.site_id.trim().to_owned();
    let result = create_site(&state, form).await;
    log_outcome(Action::Create, &name, &result);
    redirect_to_list(jar, KIND, outcome_flash(KIND, Action::Create, &name, &result))
}

async fn create_site(state: &AppState, form: CreateForm) -> StackResult<()> {
    let name: StackName = form.site_id.parse()?;
    let content = ContentForm { file_url: form.file_url, site_content: form.site_content }.resolve(&state.http).await?;
    state.controller.create(&name, &ResourceDefinition::Site(SiteDefinition { content })).await?;
    Ok(())
}

async fn edit(State(state): State<AppState>, Path(id): Path<String>, jar: CookieJar) -> Response {
    match read_site(&state, &id).await {
        Ok(outputs) => {
            let (jar, flashes) = flash::take(jar);
            let content = outputs.get(WEBSITE_CONTENT).and_then(|v| v.as_str()).unwrap_or_default().to_owned();
            render(jar, SiteUpdatePage { flashes, name: id, content })
        }
        Err(e) => {
            log::error!("Reading site {id}: {e:#}");
            redirect_to_list(jar, KIND, failure_flash(&e))
        }
    }
}

async fn read_site(state: &AppState, id: &str) -> StackResult<StackOutputs> {
    state.controller.read_outputs(&id.parse()?).await
}

async fn update(State(state): State<AppState>, Path(id): Path<String>, jar: CookieJar, Form(form): Form<ContentForm>) -> Response {
    let result = update_site(&state, &id, form).await;
    log_outcome(Action::Update, &id, &result);
    redirect_to_list(jar, KIND, outcome_flash(KIND, Action::Update, &id, &result))
}

async fn update_site(state: &AppState, id: &str, form: ContentForm) -> StackResult<()> {
    let name: StackName = id.parse()?;
    let content = form.resolve(&state.http).await?;
    state.controller.update(&name, &ResourceDefinition::Site(SiteDefinition { content })).await?;
    Ok(())
}

async fn delete(State(state): State<AppState>, Path(id): Path<String>, jar: CookieJar) -> Response {
    let result = delete_site(&state, &id).await;
    log_outcome(Action::Delete, &id, &result);
    redirect_to_list(jar, KIND, outcome_flash(KIND, Action::Delete, &id, &result))
}

async fn delete_site(state: &AppState, id: &str) -> StackResult<()> {
    state.controller.delete(&id.parse()?).await
}
