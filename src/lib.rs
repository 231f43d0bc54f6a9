//! sitios: publish pipeline for declarative static sites.
//!
//! This crate turns a site's declarative configuration into a deployed
//! static website: render via the external `sitio` toolchain, reconcile
//! object storage against the build output, provision DNS for managed
//! subdomains, and stream progress to a live session when one exists.
//!
//! Backends (object storage, DNS, the site data layer, live connections)
//! are injected through the traits in [`contract`], so every piece can be
//! exercised against fakes.

pub mod cli;
pub mod connection;
pub mod contract;
pub mod dns;
pub mod error;
pub mod load_config;
pub mod publish;
pub mod render;
pub mod session;
pub mod site;
pub mod storage;
