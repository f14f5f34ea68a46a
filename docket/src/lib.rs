//! # Docket - Embedded Document Store
//!
//! Docket keeps JSON-like documents in named collections grouped into
//! databases. Every collection has exactly one writer: mutations are
//! submitted as events on a global intake queue, routed by a dispatcher to
//! the collection's bounded channel and applied in order by its worker
//! thread. Reads and filters run concurrently against the last applied
//! state.
//!
//! ## Key Features
//!
//! - **Serialized writes**: per collection FIFO through a single worker
//! - **Secondary indexes**: equality indexes on declared top-level fields
//! - **Parallel filters**: residual predicates are scanned by a worker pool
//! - **Batched persistence**: documents are grouped in batches, only dirty
//!   batches are written by the periodic or explicit flush
//! - **Pluggable storage**: on-disk files or in-memory maps behind a
//!   [store::StorageProvider] trait
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docket::{doc, CollectionSpec, Docket, FilterSpec};
//!
//! let docket = Docket::builder().storage_path("/var/lib/docket").open()?;
//! docket.create_database("hr")?;
//! docket.create_collections("hr", &[CollectionSpec::new("employees").with_index("city")])?;
//!
//! let asha = docket.insert_document("hr", "employees", doc! { "name": "Asha", "city": "Chennai" })?;
//! let found = docket.filter_documents("hr", "employees", &FilterSpec::new().eq("city", "Chennai"))?;
//!
//! docket.close()?;
//! ```
//!
//! ## Module Organization
//!
//! - [`collection`] - Documents, ids, batches, indexes and collection handles
//! - [`common`] - The [common::Value] type, constants and utilities
//! - [`errors`] - Error types and result definitions
//! - [`filter`] - Equality filters and their parallel executor
//! - [`pipeline`] - Events, the intake broker and collection workers
//! - [`registry`] - Databases and the catalog of live collections
//! - [`store`] - Storage providers, record codec and the flush scheduler
//! - [`docket`] - The top-level database handle
//! - [`docket_builder`] / [`docket_config`] - Opening and configuration

use crate::collection::SnowflakeIdGenerator;
use std::sync::LazyLock;

pub mod collection;
pub mod common;
pub mod docket;
pub mod docket_builder;
pub mod docket_config;
pub mod errors;
pub mod filter;
pub mod pipeline;
pub mod registry;
pub mod store;

pub use crate::collection::{CollectionStats, Document};
pub use crate::common::Value;
pub use crate::docket::Docket;
pub use crate::docket_builder::DocketBuilder;
pub use crate::docket_config::DocketConfig;
pub use crate::errors::{DocketError, DocketResult, ErrorKind};
pub use crate::filter::FilterSpec;
pub use crate::pipeline::{Event, EventOutcome, FlushSummary};
pub use crate::registry::CollectionSpec;

pub(crate) static ID_GENERATOR: LazyLock<SnowflakeIdGenerator> =
    LazyLock::new(SnowflakeIdGenerator::new);
