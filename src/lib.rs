//! # biblio-harvest
//!
//! Incremental, resumable harvesting of bibliographic metadata from a
//! paginated list protocol into a local keyed store.
//!
//! ## Architecture
//!
//! - **Protocol client** (`client`): rate-limited page fetches, opaque cursors
//! - **Normalizer** (`normalize`): wire records → canonical records and tombstones
//! - **Checkpoints** (`checkpoint`): durable per-scope progress (redb)
//! - **Orchestrator** (`harvest`): start decision, page loop, retries, cancellation
//! - **Batch sink** (`sink`) over the **record store** (`store`): idempotent upserts
//!
//! ## Library usage
//!
//! ```no_run
//! use biblio_harvest::cancel::CancelToken;
//! use biblio_harvest::checkpoint::RedbCheckpointStore;
//! use biblio_harvest::client::HttpSource;
//! use biblio_harvest::config::HarvestConfig;
//! use biblio_harvest::harvest::{HarvestOptions, Harvester};
//! use biblio_harvest::model::HarvestScope;
//! use biblio_harvest::store::{RedbRecordStore, open_database};
//!
//! let config = HarvestConfig::default();
//! let db = open_database("harvest.redb".as_ref()).unwrap();
//! let records = RedbRecordStore::new(db.clone()).unwrap();
//! let checkpoints = RedbCheckpointStore::new(db).unwrap();
//! let source = HttpSource::new(&config.source);
//!
//! let harvester = Harvester::new(
//!     &source,
//!     &checkpoints,
//!     &records,
//!     HarvestOptions::from_config(&config),
//! );
//! let summary = harvester
//!     .run(&HarvestScope::named("cs"), &CancelToken::new())
//!     .unwrap();
//! println!("{} records in {:?}", summary.stats.fetched, summary.elapsed);
//! ```

pub mod cancel;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod error;
pub mod harvest;
pub mod model;
pub mod normalize;
pub mod paths;
pub mod sink;
pub mod store;
