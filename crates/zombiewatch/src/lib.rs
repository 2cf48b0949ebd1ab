//! `zombiewatch` - Driver location tracking and zombie driver detection
//!
//! This library keeps a bounded, time-ordered history of GPS locations per
//! driver and classifies drivers that covered too little distance over a
//! recent window as zombies. Locations arrive through an in-process topic and
//! are queried over HTTP.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod distance;
pub mod error;
pub mod http;
pub mod ingest;
pub mod location;
pub mod logging;
pub mod service;
pub mod storage;
pub mod store;
pub mod zombie;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{Disposition, IngestHandler};
pub use location::{Coordinates, Location};
pub use logging::init_logging;
pub use service::DriverService;
pub use storage::{BackendKind, SortedSetBackend};
pub use store::LocationStore;
pub use zombie::{DriverStatus, ZombieClassifier, ZombiePredicate};
