//! Gateway console - admin API for gateway mappings
//!
//! This library provides the server side of a gateway-mapping console:
//! - Declarative, localized form schemas served as one meta-information document
//! - A validation engine driven by those schemas, with pluggable custom rules
//! - Conditional field visibility
//! - CRUD, search and status control for gateway mapping records
//! - DNS resolution and TCP reachability probes for backend hosts

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod i18n;
pub mod probe;
pub mod schema;
pub mod session;
pub mod store;
pub mod validation;
pub mod visibility;
