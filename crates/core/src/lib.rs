//! sc-core: Core library for the s3-commander browser
//!
//! This crate provides the headless core of the dual-pane browser:
//! - Configuration and storage profiles
//! - Path parsing and key-prefix arithmetic
//! - The virtual namespace model with its listing cache
//! - Pane state, the command dispatcher and the batch transfer engine
//! - ObjectStore trait for S3 operations, with an in-memory backend
//!
//! This crate is designed to be independent of any specific S3 SDK,
//! allowing for easy testing and potential future support for other backends.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod namespace;
pub mod pane;
pub mod path;
pub mod profile;
pub mod timeout;
pub mod traits;
pub mod transfer;

pub use config::{Config, ConfigManager};
pub use dispatcher::{Command, DispatchState, Dispatcher, DispatcherOptions, Loaded, Response, Side, Snapshot};
pub use error::{Error, ErrorKind, Result};
pub use memory::MemoryStore;
pub use namespace::{Listing, ListingCache, Namespace};
pub use pane::{Navigation, PaneSnapshot, PaneState};
pub use path::{parse_location, Location};
pub use profile::{Profile, ProfileManager};
pub use timeout::TimedStore;
pub use traits::{BucketInfo, ListRequest, ListingPage, Node, ObjectMeta, ObjectStore};
pub use transfer::{
    OverwritePolicy, SourceRef, TransferEngine, TransferHandle, TransferKind, TransferRequest, TransferResult,
};
