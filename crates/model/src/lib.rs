//! # FileDepot Model Library
//!
//! This crate provides the data model shared by every FileDepot layer.
//!
//! ## Overview
//!
//! - **Permissions**: per-user capability flags and the command allow-list
//! - **Rules**: ordered allow/deny path rules and the reachability evaluator
//! - **Preferences**: listing sort key/order and view mode
//! - **Share links**: token records and expiry units
//! - **File views**: request-scoped [`FileInfo`] and directory [`Listing`]
//!
//! Nothing in this crate touches the filesystem or a store.
//!
//! ## Example Usage
//!
//! ```rust
//! use model::{is_allowed, PathPattern, Rule};
//!
//! let rules = vec![
//!     Rule::Deny(PathPattern::prefix("/")),
//!     Rule::Allow(PathPattern::prefix("/public")),
//! ];
//!
//! assert!(is_allowed("/public/readme.md", &rules));
//! assert!(!is_allowed("/private", &rules));
//! ```
//!
//! ## Modules
//!
//! - [`permissions`]: capability flags
//! - [`rules`]: path rules
//! - [`preferences`]: sorting and view mode
//! - [`share`]: share link records
//! - [`file_info`]: file and listing views
//! - [`error`]: error types

pub mod error;
pub mod file_info;
pub mod permissions;
pub mod preferences;
pub mod rules;
pub mod share;

pub use error::{ModelError, Result};
pub use file_info::{FileInfo, FileType, Listing};
pub use permissions::Permissions;
pub use preferences::{SortBy, SortOrder, Sorting, ViewMode};
pub use rules::{is_allowed, PathPattern, Rule};
pub use share::{ExpiryUnit, ShareLink};
