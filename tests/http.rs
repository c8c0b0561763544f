use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
    routing, Router,
};
use platyform::{
    config::PlatformConfig,
    controller::StackController,
    engines::Memory,
    web::{self, AppState},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceExt as _;

fn app() -> Router {
    let config = PlatformConfig::new("self-service-platyform", "acme", "us-west-2");
    web::router(AppState::new(StackController::new(config, Arc::new(Memory::new()))))
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response<Body> {
    let mut request = Request::get(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    app.clone().oneshot(request.body(Body::empty()).unwrap()).await.unwrap()
}

async fn post(app: &Router, uri: &str, form: &str) -> Response<Body> {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_owned()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

/// The `name=value` part of the flash cookie set by `response`.
fn flash_cookie(response: &Response<Body>) -> String {
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("platyform_flash="), "{set_cookie}");
    set_cookie.split(';').next().unwrap().to_owned()
}

/// Follows a redirect the way a browser would, returning the rendered page.
async fn follow(app: &Router, response: Response<Body>) -> String {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = flash_cookie(&response);
    let page = get(app, location(&response), Some(&cookie)).await;
    assert_eq!(page.status(), StatusCode::OK);
    text(page).await
}

#[tokio::test]
async fn create_site_redirects_with_success_flash() {
    let app = app();
    let response = post(&app, "/sites/new", "site-id=demo&site-content=%3Ch1%3Ehi%3C%2Fh1%3E").await;
    assert_eq!(location(&response), "/sites");

    let page = follow(&app, response).await;
    assert!(page.contains("flash-success"), "{page}");
    assert!(page.contains("Successfully created site"), "{page}");
    assert!(page.contains("/sites/demo/update"), "{page}");
}

#[tokio::test]
async fn duplicate_site_gets_collision_flash() {
    let app = app();
    post(&app, "/sites/new", "site-id=demo&site-content=one").await;
    let response = post(&app, "/sites/new", "site-id=demo&site-content=two").await;

    let page = follow(&app, response).await;
    assert!(page.contains("flash-danger"), "{page}");
    assert!(page.contains("already exists, pick a unique name"), "{page}");
}

/// Serves `/page.html` on a local port. Every other path is a 404.
async fn content_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/page.html", routing::get(|| async { "fetched over http" }));
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

#[tokio::test]
async fn site_content_can_come_from_a_url() {
    let app = app();
    let addr = content_server().await;

    let response = post(&app, "/sites/new", &format!("site-id=demo&file-url=http://{addr}/page.html&site-content=ignored")).await;
    let page = follow(&app, response).await;
    assert!(page.contains("Successfully created site"), "{page}");

    let edit = text(get(&app, "/sites/demo/update", None).await).await;
    assert!(edit.contains("fetched over http"), "{edit}");
    assert!(!edit.contains("ignored"), "{edit}");
}

#[tokio::test]
async fn failed_fetch_creates_nothing() {
    let app = app();
    let addr = content_server().await;

    let response = post(&app, "/sites/new", &format!("site-id=demo&file-url=http://{addr}/missing.html")).await;
    let page = follow(&app, response).await;
    assert!(page.contains("flash-danger"), "{page}");
    assert!(page.contains("fetching site content from"), "{page}");
    assert!(!page.contains("/sites/demo/update"), "{page}");

    // The name was never taken.
    let response = post(&app, "/sites/new", "site-id=demo&site-content=x").await;
    assert!(follow(&app, response).await.contains("Successfully created site"));
}

#[tokio::test]
async fn invalid_name_is_reported() {
    let app = app();
    let response = post(&app, "/sites/new", "site-id=&site-content=x").await;
    let page = follow(&app, response).await;
    assert!(page.contains("a name is required"), "{page}");
}

#[tokio::test]
async fn edit_page_shows_current_content() {
    let app = app();
    post(&app, "/sites/new", "site-id=demo&site-content=hello+world").await;

    let page = get(&app, "/sites/demo/update", None).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert!(text(page).await.contains("hello world"));
}

#[tokio::test]
async fn editing_unknown_site_redirects_to_list() {
    let app = app();
    let response = get(&app, "/sites/ghost/update", None).await;
    let page = follow(&app, response).await;
    assert!(page.contains("no stack named"), "{page}");
}

#[tokio::test]
async fn delete_removes_site_from_listing() {
    let app = app();
    post(&app, "/sites/new", "site-id=demo&site-content=x").await;

    let response = post(&app, "/sites/demo/delete", "").await;
    let page = follow(&app, response).await;
    assert!(page.contains("successfully deleted!"), "{page}");
    assert!(!page.contains("/sites/demo/update"), "{page}");
}

#[tokio::test]
async fn vm_lifecycle() {
    let app = app();
    let response = post(&app, "/vms/new", "vm-id=box&vm-keypair=ssh-ed25519+AAAA&instance_type=p2.xlarge").await;
    assert_eq!(location(&response), "/vms");
    let page = follow(&app, response).await;
    assert!(page.contains("Successfully created VM"), "{page}");
    assert!(page.contains(".us-west-2.compute.amazonaws.com"), "{page}");

    let edit = text(get(&app, "/vms/box/update", None).await).await;
    assert!(edit.contains("ssh-ed25519 AAAA"), "{edit}");
    assert!(edit.contains(r#"<option value="p2.xlarge" selected>"#), "{edit}");

    let response = post(&app, "/vms/box/update", "vm-keypair=ssh-ed25519+BBBB&instance_type=c5.xlarge").await;
    let page = follow(&app, response).await;
    assert!(page.contains("successfully updated!"), "{page}");
}

#[tokio::test]
async fn unknown_instance_type_is_rejected() {
    let app = app();
    let response = post(&app, "/vms/new", "vm-id=box&vm-keypair=k&instance_type=t4g.nano").await;
    let page = follow(&app, response).await;
    assert!(page.contains("Unknown instance type: t4g.nano"), "{page}");
    assert!(!page.contains("/vms/box/update"), "{page}");
}

#[tokio::test]
async fn listing_pages_render_with_and_without_trailing_slash() {
    let app = app();
    for uri in ["/", "/sites", "/sites/", "/sites/new", "/vms", "/vms/", "/vms/new", "/databases", "/databases/", "/vpcs", "/vpcs/"] {
        let response = get(&app, uri, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
}
