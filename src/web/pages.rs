use super::Flash;
use crate::{
    controller::StackListing,
    definition::{PUBLIC_DNS, PUBLIC_IP, WEBSITE_URL},
    instance_type::InstanceType,
};
use askama::Template;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexPage {
    pub flashes: Vec<Flash>,
}

/// Listing placeholder for resource kinds that cannot be managed yet.
#[derive(Template)]
#[template(path = "stub.html")]
pub struct StubPage {
    pub flashes: Vec<Flash>,
    pub title: &'static str,
}

pub struct SiteRow {
    pub name: String,
    pub url: String,
    pub console_url: String,
    pub status: String,
}

impl From<StackListing> for SiteRow {
    fn from(listing: StackListing) -> Self {
        Self {
            url: format!("http://{}", listing.output(WEBSITE_URL).unwrap_or_default()),
            status: status(&listing),
            name: listing.name,
            console_url: listing.console_url,
        }
    }
}

/// "updating" while an apply or destroy runs, otherwise the resource count if known.
fn status(listing: &StackListing) -> String {
    match (listing.update_in_progress, listing.resource_count) {
        (true, _) => "updating".to_owned(),
        (false, Some(1)) => "1 resource".to_owned(),
        (false, Some(n)) => format!("{n} resources"),
        (false, None) => String::new(),
    }
}

#[derive(Template)]
#[template(path = "sites/index.html")]
pub struct SiteListPage {
    pub flashes: Vec<Flash>,
    pub sites: Vec<SiteRow>,
}

#[derive(Template)]
#[template(path = "sites/create.html")]
pub struct SiteCreatePage {
    pub flashes: Vec<Flash>,
}

#[derive(Template)]
#[template(path = "sites/update.html")]
pub struct SiteUpdatePage {
    pub flashes: Vec<Flash>,
    pub name: String,
    pub content: String,
}

pub struct VmRow {
    pub name: String,
    pub dns_name: String,
    pub ip: String,
    pub console_url: String,
    pub status: String,
}

impl From<StackListing> for VmRow {
    fn from(listing: StackListing) -> Self {
        Self {
            dns_name: listing.output(PUBLIC_DNS).unwrap_or_default().to_owned(),
            ip: listing.output(PUBLIC_IP).unwrap_or_default().to_owned(),
            status: status(&listing),
            name: listing.name,
            console_url: listing.console_url,
        }
    }
}

#[derive(Template)]
#[template(path = "virtual_machines/index.html")]
pub struct VmListPage {
    pub flashes: Vec<Flash>,
    pub vms: Vec<VmRow>,
}

/// An `<option>` of the instance type select.
pub struct InstanceChoice {
    pub value: &'static str,
    pub selected: bool,
}

/// Every instance type, with `current` preselected.
pub fn instance_choices(current: Option<&str>) -> Vec<InstanceChoice> {
    InstanceType::ALL
        .iter()
        .map(|t| InstanceChoice { value: t.as_str(), selected: current == Some(t.as_str()) })
        .collect()
}

#[derive(Template)]
#[template(path = "virtual_machines/create.html")]
pub struct VmCreatePage {
    pub flashes: Vec<Flash>,
    pub instance_types: Vec<InstanceChoice>,
}

#[derive(Template)]
#[template(path = "virtual_machines/update.html")]
pub struct VmUpdatePage {
    pub flashes: Vec<Flash>,
    pub name: String,
    pub public_key: String,
    pub instance_types: Vec<InstanceChoice>,
}
