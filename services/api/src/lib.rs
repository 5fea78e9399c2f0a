//! services/api/src/lib.rs
//!
//! Library root for the `api` service, re-exporting the modules the binaries
//! need to assemble the server.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
