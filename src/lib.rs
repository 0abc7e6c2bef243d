pub mod api;
pub mod archive;
pub mod args;
pub mod auth;
pub mod beancount;
pub mod cli;
pub mod config;
pub mod connect;
pub mod crypto;
pub mod download;
pub mod environment;
pub mod format;
#[cfg(feature = "forms")]
pub mod forms;
pub mod glob;
pub mod import;
pub mod inbox;
pub mod login;
pub mod paths;
pub mod poll;
pub mod template;
pub mod terminal;
