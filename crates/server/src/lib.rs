//! # FileDepot Server Library
//!
//! This crate provides path-scoped file operations and share links for
//! FileDepot users.
//!
//! ## Overview
//!
//! - **Scoped filesystems**: every user operates inside one root directory
//!   through a [`ScopedFs`] handle that never reaches outside it
//! - **Authorization**: request paths are cleaned and checked against the
//!   user's rules before any storage access
//! - **Resource operations**: list, read, write, delete, rename and copy,
//!   with mutations wrapped in pre/post hooks by the [`Runner`]
//! - **Share links**: unguessable, optionally expiring tokens with lazy
//!   expiry and a single permanent link per path
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ApiRouter                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐   ┌──────────────────┐   ┌─────────────┐  │
//! │  │ UserResolver │──▶│  authz (paths,   │──▶│ Resource    │  │
//! │  │  (UserStore) │   │  rules, perms)   │   │ Engine      │  │
//! │  └──────────────┘   └──────────────────┘   └──────┬──────┘  │
//! │                              │                    │ Runner  │
//! │                              ▼                    ▼         │
//! │                     ┌────────────────┐    ┌─────────────┐   │
//! │                     │  ShareService  │    │  ScopedFs   │   │
//! │                     │  (ShareStore)  │    │ (Os/Memory) │   │
//! │                     └────────────────┘    └─────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use server::router::{ApiRequest, Method};
//! use server::{ApiRouter, Config, JsonShareStore, ResourceEngine, ShareService, UserStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!
//!     let users = UserStore::new(config.users_path());
//!     users.load()?;
//!
//!     let shares = ShareService::new(
//!         Arc::new(JsonShareStore::open(config.shares_path())?),
//!         config.server.base_url.clone(),
//!     );
//!     let engine = ResourceEngine::new(config.runner());
//!     let router = ApiRouter::new(Arc::new(users), engine, Arc::new(shares));
//!
//!     let response = router
//!         .route(ApiRequest::new(Method::Get, "/api/resources/").user("admin"))
//!         .await;
//!     println!("{}", response.body_text());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`error`]: Resource error taxonomy
//! - [`fs`]: Scoped filesystem capability
//! - [`authz`]: Path resolution and authorization
//! - [`runner`]: Hook-wrapped execution
//! - [`resources`]: Resource operations
//! - [`shares`]: Share link lifecycle
//! - [`users`]: Users and the user store
//! - [`router`]: Request routing

pub mod authz;
pub mod config;
pub mod error;
pub mod fs;
pub mod resources;
pub mod router;
pub mod runner;
pub mod shares;
pub mod users;

// Re-export model for convenience
pub use model;

pub use config::{Config, ConfigError};
pub use error::{ResourceError, Result};
pub use fs::{MemoryFs, OsFs, ScopedFs};
pub use resources::{ReadOptions, ResourceEngine, WriteMethod, Written};
pub use router::{ApiRequest, ApiResponse, ApiRouter, Method, RouterError};
pub use runner::{CommandHooks, HookError, HookExecutor, NoHooks, RunOutcome, Runner};
pub use shares::{
    Clock, CreatedLink, JsonShareStore, ManualClock, ShareService, ShareStore, StoreError,
    SystemClock,
};
pub use users::{User, UserResolver, UserStore};
