pub mod cli;
pub mod command_ext;
pub mod config;
pub mod controller;
pub mod definition;
pub mod engines;
pub mod error;
pub mod instance_type;
pub mod logging;
pub mod shutdown;
pub mod web;
