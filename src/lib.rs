//! doifetch core library
//!
//! This library downloads Crossref metadata and publisher full-text content
//! for scholarly works identified by DOIs, storing the results in a sharded
//! local data directory.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`doi`] - DOI parsing, validation, and batch input handling
//! - [`web`] - Rate-limited, retrying HTTP transport
//! - [`crossref`] - Crossref works API client
//! - [`snapshot`] - Read-only local metadata snapshot store
//! - [`metadata`] - Typed accessors over stored Crossref metadata
//! - [`format`] / [`source`] - Per-format content model and candidate sources
//! - [`publisher`] - Per-publisher acquisition strategies and dispatch registry
//! - [`fulltext`] - Format-preference acquisition orchestration
//! - [`work`] / [`acquire`] - Per-DOI aggregate and the sequential batch driver
//! - [`status`] / [`data`] - Data-directory inventory and summary reporting

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod acquire;
pub mod config;
pub mod crossref;
pub mod crypto;
pub mod data;
pub mod doi;
pub mod format;
pub mod fulltext;
pub mod metadata;
pub mod publisher;
pub mod snapshot;
pub mod source;
pub mod status;
pub mod store;
pub mod validate;
pub mod web;
pub mod work;

// Re-export commonly used types
pub use config::Settings;
pub use doi::{Doi, DoiError, form_dois_from_input};
pub use format::{Format, FormatName};
pub use fulltext::{FullText, LoadedData};
pub use metadata::{MemberId, Metadata, MetadataSource};
pub use publisher::{Publisher, PublisherRegistry, build_default_registry};
pub use source::{AcquireError, Source};
pub use web::{WebClient, WebError};
pub use work::Work;
