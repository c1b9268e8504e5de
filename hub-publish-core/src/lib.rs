#![doc = "hub-publish-core: core pipelines for publishing build output to a Hub repository."]

//! This crate holds all publishing logic: the authenticated HTTP client, the
//! git data API, the site publisher and the downloads publisher. The CLI
//! crate only loads configuration and calls into it.
//!
//! # Usage
//! Build a [`client::HubClient`] from a [`config::HubConfig`], wrap it in a
//! [`data::DataService`] and hand that to [`site::publish_site`]; or wrap it
//! in a [`downloads::ReleaseAssets`] for [`downloads::publish_downloads`].

pub mod client;
pub mod config;
pub mod contract;
pub mod credentials;
pub mod data;
pub mod downloads;
pub mod error;
pub mod rate_limit;
pub mod repository;
pub mod scanner;
pub mod settings;
pub mod site;
pub mod strings;

pub use error::PublishError;
