//! Scoped resource operations.
//!
//! - [`engine`] runs read/write/delete/rename/copy for a user
//! - [`info`] builds [`model::FileInfo`] views and directory listings
//! - [`checksum`] computes file digests
//! - [`preference`] picks the listing sort and persists it as cookies

pub mod checksum;
pub mod engine;
pub mod info;
pub mod preference;

pub use checksum::ChecksumAlgo;
pub use engine::{
    etag, PatchAction, ReadOptions, ReadOutcome, ResourceEngine, WriteMethod, Written,
    DEFAULT_MAX_TEXT_SIZE,
};
pub use preference::{PreferenceCookie, SortChoice};
