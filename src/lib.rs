//! Ingestion of Crone STP/PEM time-domain EM survey files.
//!
//! [`parser`] turns instrument text into typed candidates, [`reconcile`]
//! ties measurements to stored station geometry, and [`app::App`] runs both
//! against a transactional [`store::Repository`] for single files,
//! folders and survey archives.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod parser;
pub mod reconcile;
pub mod store;
