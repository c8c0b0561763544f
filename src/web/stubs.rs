use super::{
    flash,
    pages::{IndexPage, StubPage},
    render, AppState,
};
use axum::{response::Response, routing::get, Router};
use axum_extra::extract::cookie::CookieJar;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/databases", get(databases))
        .route("/databases/", get(databases))
        .route("/vpcs", get(vpcs))
        .route("/vpcs/", get(vpcs))
}

async fn index(jar: CookieJar) -> Response {
    let (jar, flashes) = flash::take(jar);
    render(jar, IndexPage { flashes })
}

async fn databases(jar: CookieJar) -> Response {
    stub(jar, "Databases")
}

async fn vpcs(jar: CookieJar) -> Response {
    stub(jar, "VPCs")
}

fn stub(jar: CookieJar, title: &'static str) -> Response {
    let (jar, flashes) = flash::take(jar);
    render(jar, StubPage { flashes, title })
}
