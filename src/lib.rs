//! cattle-harness
//!
//! Helpers for driving Rancher from integration tests and tooling:
//! - `charts`: install a cluster-template chart, register its removal on a
//!   `Session`, and wait until the App is deployed
//! - `controller`: adapt "object + status in, status out" handlers onto a
//!   kube-rs watch, with conditional status writes, condition stamping and
//!   dependent-object apply/prune

pub mod catalog;
pub mod charts;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod kube;
pub mod models;
pub mod session;

pub use error::{Error, Result};
pub use session::Session;
