//! Share links: unguessable, optionally expiring tokens for a path.

pub mod clock;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use service::{CreatedLink, ShareService, MIN_TOKEN_BYTES};
pub use store::{JsonShareStore, ShareStore, StoreError};
