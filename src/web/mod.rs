//! HTTP surface: one module of handlers per resource kind, server-rendered pages,
//! and flash messages carried across redirects.

mod flash;
mod pages;
mod sites;
mod stubs;
mod virtual_machines;

pub use flash::{Category, Flash};

use crate::{
    controller::StackController,
    definition::ResourceKind,
    error::{ErrorKind, StackError, StackResult},
    shutdown,
};
use anyhow::Context as _;
use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<StackController>,
    /// Fetches site content submitted by URL.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(controller: StackController) -> Self {
        Self { controller: Arc::new(controller), http: reqwest::Client::new() }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(stubs::routes())
        .merge(sites::routes())
        .merge(virtual_machines::routes())
        .with_state(state)
}

/// Serves until SIGINT or SIGTERM, then lets in-flight requests finish.
pub async fn serve(listen: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen).await.with_context(|| format!("binding {listen}"))?;
    log::info!("Listening on http://{}", listener.local_addr().context("reading bound address")?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown::wait_for_signal())
        .await
        .context("serving http")?;
    log::info!("Server stopped");
    Ok(())
}

/// Renders `page`, answering 500 if the template fails.
fn render(jar: CookieJar, page: impl Template) -> Response {
    match page.render() {
        Ok(html) => (jar, Html(html)).into_response(),
        Err(e) => {
            log::error!("Rendering page: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("rendering page: {e}")).into_response()
        }
    }
}

/// Back to the kind's listing, with `flash` to show there.
fn redirect_to_list(jar: CookieJar, kind: ResourceKind, flash: Flash) -> Response {
    (flash::push(jar, flash), Redirect::to(kind.list_path())).into_response()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

/// What the user is told after `action` on the stack `name`.
pub fn outcome_flash<T>(kind: ResourceKind, action: Action, name: &str, result: &StackResult<T>) -> Flash {
    let (label, lower) = (kind.label(), kind.label_lower());
    let e = match result {
        Ok(_) => {
            return Flash::success(match action {
                Action::Create => format!("Successfully created {lower} '{name}'"),
                Action::Update => format!("{label} '{name}' successfully updated!"),
                Action::Delete => format!("{label} '{name}' successfully deleted!"),
            })
        }
        Err(e) => e,
    };
    match (action, e.kind()) {
        (Action::Create, ErrorKind::AlreadyExists) => {
            Flash::danger(format!("Error: {label} with name '{name}' already exists, pick a unique name"))
        }
        (Action::Update, ErrorKind::ConcurrentUpdate) => {
            Flash::danger(format!("Error: {lower} '{name}' already has an update in progress"))
        }
        (Action::Delete, ErrorKind::ConcurrentUpdate) => {
            Flash::danger(format!("Error: {label} '{name}' already has update in progress"))
        }
        _ => failure_flash(e),
    }
}

fn failure_flash(e: &StackError) -> Flash {
    Flash::danger(format!("{e:#}"))
}

/// Logs a failed operation at a level matching how surprising it is.
fn log_outcome<T>(action: Action, name: &str, result: &StackResult<T>) {
    if let Err(e) = result {
        match e.kind() {
            ErrorKind::AlreadyExists | ErrorKind::ConcurrentUpdate => log::warn!("{action:?} {name}: {e}"),
            ErrorKind::Unclassified => log::error!("{action:?} {name}: {e:#}"),
        }
    }
}
