//! # idm-core
//!
//! Core utilities, configuration, and event handling for the identity
//! management engine.
//!
//! This crate provides the foundational types shared by every other
//! `idm-*` crate:
//!
//! - [`Config`] - TOML-backed engine configuration
//! - [`Error`] - configuration and I/O failures
//! - [`event`] - identity events and the bridges that publish them

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;

pub use config::{Config, FileStoreConfig, PaginationMode, QueryConfig, SqlStoreConfig, StoreConfig};
pub use error::{Error, Result};
pub use event::{Event, EventBridge, EventOutcome, EventType};
