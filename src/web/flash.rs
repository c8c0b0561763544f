//! One-shot messages carried from a redirecting request to the next rendered page.
//!
//! They live in a cookie, so the server keeps no session state.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

const COOKIE_NAME: &str = "platyform_flash";
const MAX_MESSAGE_LEN: usize = 1024;
const MAX_MESSAGES: usize = 3;
/// Browsers drop cookies over 4 KiB. JSON escaping can grow a message sixfold.
const MAX_VALUE_LEN: usize = 3072;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Success,
    Danger,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Success => "success",
            Category::Danger => "danger",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub category: Category,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self { category: Category::Success, message: message.into() }
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self { category: Category::Danger, message: message.into() }
    }
}

/// Queues `flash` for the next page the browser renders.
pub fn push(jar: CookieJar, mut flash: Flash) -> CookieJar {
    truncate(&mut flash.message, MAX_MESSAGE_LEN);
    let mut flashes = read(&jar);
    flashes.push(flash);
    if flashes.len() > MAX_MESSAGES {
        flashes.drain(..flashes.len() - MAX_MESSAGES);
    }
    let mut value = encode(&flashes);
    while value.len() > MAX_VALUE_LEN {
        if flashes.len() > 1 {
            flashes.remove(0);
        } else {
            let message = &mut flashes[0].message;
            let half = message.len() / 2;
            truncate(message, half);
        }
        value = encode(&flashes);
    }
    let cookie = Cookie::build((COOKIE_NAME, value)).path("/").http_only(true).same_site(SameSite::Lax);
    jar.add(cookie)
}

/// Queued messages, oldest first. The returned jar clears them.
pub fn take(jar: CookieJar) -> (CookieJar, Vec<Flash>) {
    if jar.get(COOKIE_NAME).is_none() {
        return (jar, Vec::new());
    }
    let flashes = read(&jar);
    (jar.remove(Cookie::build(COOKIE_NAME).path("/")), flashes)
}

fn encode(flashes: &[Flash]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(flashes).expect("flashes serialize"))
}

fn read(jar: &CookieJar) -> Vec<Flash> {
    let Some(cookie) = jar.get(COOKIE_NAME) else { return Vec::new() };
    let decoded = BASE64_URL_SAFE_NO_PAD
        .decode(cookie.value())
        .map_err(anyhow::Error::from)
        .and_then(|bytes| Ok(serde_json::from_slice(&bytes)?));
    match decoded {
        Ok(flashes) => flashes,
        Err(e) => {
            log::debug!("Ignoring unreadable flash cookie: {e:#}");
            Vec::new()
        }
    }
}

fn truncate(message: &mut String, max_len: usize) {
    if message.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message.truncate(end);
    message.push('…');
}
