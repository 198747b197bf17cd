//! Dynamic DNS Update Gateway
//!
//! Accepts RFC 2136 UPDATE messages and reconciles them against zones hosted
//! behind an asynchronous, job-based zone management API.
//!
//! ## Architecture
//!
//! ```text
//! Client → UPDATE → DnsServer → UpdateHandler
//!                                   ↓
//!                   ZoneMetadataCache (zone name → id)
//!                                   ↓
//!                   ZoneSynchronizer → ZoneSnapshot
//!                                   ↓
//!                   OperationLog (one operation per name/type)
//!                                   ↓
//!                   JobCoordinator → submit / wait / apply or cancel
//!                                   ↓
//!                   ZoneApi (DpfClient over HTTP)
//! ```
//!
//! ## Components
//!
//! - `dns_types`: record types, update records and the error taxonomy
//! - `dns_config`: server configuration (listeners, API, job polling)
//! - `zone_api`: the zone management API interface
//! - `dpf_client`: HTTP implementation of the zone management API
//! - `record_set`: owner name + type record sets
//! - `operation`: per-request operation log
//! - `zone_cache`: zone name → identifier cache
//! - `zone_snapshot`: last-known zone content and its synchronizer
//! - `job_coordinator`: job submission, waiting, apply and rollback
//! - `update`: RFC 2136 prerequisite and update processing
//! - `dns_server`: UDP/TCP listener using Hickory DNS

pub mod dns_types;
pub mod dns_config;
pub mod zone_api;
pub mod dpf_client;
pub mod record_set;
pub mod operation;
pub mod zone_cache;
pub mod zone_snapshot;
pub mod job_coordinator;
pub mod update;
pub mod dns_server;

#[cfg(test)]
pub(crate) mod test_support;

pub use dns_types::*;
pub use dns_config::*;
pub use zone_api::*;
pub use dpf_client::*;
pub use record_set::*;
pub use operation::*;
pub use zone_cache::*;
pub use zone_snapshot::*;
pub use job_coordinator::*;
pub use update::*;
pub use dns_server::*;
