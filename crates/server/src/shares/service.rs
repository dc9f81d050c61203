//! Share link lifecycle: listing with lazy expiry, creation and deletion.

use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use dashmap::DashMap;
use model::{ExpiryUnit, ShareLink};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::authz;
use crate::error::{ResourceError, Result};
use crate::users::User;

use super::clock::{Clock, SystemClock};
use super::store::ShareStore;

/// Smallest accepted token size in bytes.
pub const MIN_TOKEN_BYTES: usize = 6;

/// Outcome of a create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatedLink {
    /// A new link was stored.
    Created(ShareLink),
    /// An existing permanent link for the path was returned.
    Reused(ShareLink),
}

impl CreatedLink {
    pub fn link(&self) -> &ShareLink {
        match self {
            CreatedLink::Created(link) | CreatedLink::Reused(link) => link,
        }
    }

    pub fn is_reused(&self) -> bool {
        matches!(self, CreatedLink::Reused(_))
    }
}

/// Issues and manages share links.
pub struct ShareService {
    store: Arc<dyn ShareStore>,
    clock: Arc<dyn Clock>,
    base_url: String,
    token_bytes: usize,
    /// Serializes check-then-create per absolute path.
    creation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for ShareService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareService")
            .field("base_url", &self.base_url)
            .field("token_bytes", &self.token_bytes)
            .finish_non_exhaustive()
    }
}

impl ShareService {
    pub fn new(store: Arc<dyn ShareStore>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_bytes: MIN_TOKEN_BYTES,
            creation_locks: DashMap::new(),
        }
    }

    /// Use `clock` for expiry decisions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Generate tokens from `bytes` random bytes (at least [`MIN_TOKEN_BYTES`]).
    pub fn with_token_bytes(mut self, bytes: usize) -> Self {
        self.token_bytes = bytes.max(MIN_TOKEN_BYTES);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Public URL of a link.
    pub fn url_for(&self, link: &ShareLink) -> String {
        format!("{}/share/{}", self.base_url, link.hash)
    }

    /// Live links for a path. Expired links are deleted and left out.
    pub fn list(&self, user: &User, raw: &str) -> Result<Vec<ShareLink>> {
        let resolved = authz::resolve_for_share(user, raw, "")?;
        let full = user.full_path(&resolved.path);

        let links = self.store.get_by_path(&full)?;
        self.sweep(links)
    }

    /// Create a link for a path.
    ///
    /// Without `expires` an existing permanent link is reused. `expires` must
    /// be a non-negative integer counted in `unit` (hours by default).
    pub fn create(
        &self,
        user: &User,
        raw: &str,
        expires: Option<&str>,
        unit: Option<&str>,
    ) -> Result<CreatedLink> {
        let resolved = authz::resolve_for_share(user, raw, "")?;
        let full = user.full_path(&resolved.path);

        let amount = match expires.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw_amount) => Some(raw_amount.parse::<u64>().map_err(|_| {
                ResourceError::InvalidOption(format!("invalid expires value: {}", raw_amount))
            })?),
            None => None,
        };

        let Some(amount) = amount else {
            return self.create_permanent(user, full);
        };

        let unit = ExpiryUnit::parse(unit);
        let expire_date = unit
            .duration(amount)
            .and_then(|d| self.clock.now().checked_add_signed(d))
            .ok_or_else(|| ResourceError::InvalidOption("expiry out of range".to_string()))?;

        let link = ShareLink::expiring(full, self.generate_token()?, expire_date);
        self.store.save(link.clone())?;
        tracing::info!(user = %user.username, path = %link.path, expires = %expire_date, "Created expiring share link");
        Ok(CreatedLink::Created(link))
    }

    fn create_permanent(&self, user: &User, full: String) -> Result<CreatedLink> {
        let lock = Arc::clone(
            self.creation_locks
                .entry(full.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );

        let created = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            self.find_or_create_permanent(user, &full)
        };

        // Clones are only taken under the shard lock, so a count of two (the
        // map and ours) means nobody else is waiting on this path.
        self.creation_locks
            .remove_if(&full, |_, entry| Arc::strong_count(entry) == 2);

        created
    }

    fn find_or_create_permanent(&self, user: &User, full: &str) -> Result<CreatedLink> {
        if let Some(existing) = self.store.get_permanent(full)? {
            tracing::debug!(user = %user.username, path = %full, "Reusing permanent share link");
            return Ok(CreatedLink::Reused(existing));
        }

        let link = ShareLink::permanent(full, self.generate_token()?);
        self.store.save(link.clone())?;
        tracing::info!(user = %user.username, path = %link.path, "Created permanent share link");
        Ok(CreatedLink::Created(link))
    }

    /// Delete a link by token.
    ///
    /// Unknown tokens succeed; a link for a path outside the caller's scope
    /// is forbidden.
    pub fn delete(&self, user: &User, hash: &str) -> Result<()> {
        if !user.perm.share {
            return Err(ResourceError::Forbidden);
        }

        let hash = hash.trim_matches('/');
        if hash.is_empty() {
            return Ok(());
        }

        if let Some(link) = self.store.get_by_hash(hash)? {
            if !user.owns_path(&link.path) {
                tracing::warn!(user = %user.username, hash, "Share link belongs to another scope");
                return Err(ResourceError::Forbidden);
            }
            self.store.delete(hash)?;
            tracing::info!(user = %user.username, hash, "Deleted share link");
        }
        Ok(())
    }

    /// Look up a live link by token, deleting it if it has expired.
    pub fn resolve(&self, hash: &str) -> Result<Option<ShareLink>> {
        match self.store.get_by_hash(hash)? {
            Some(link) if link.is_expired_at(self.clock.now()) => {
                self.store.delete(&link.hash)?;
                tracing::debug!(hash, "Share link expired");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Every live link across all paths, sweeping expired ones.
    pub fn list_all(&self) -> Result<Vec<ShareLink>> {
        let links = self.store.list()?;
        self.sweep(links)
    }

    fn sweep(&self, links: Vec<ShareLink>) -> Result<Vec<ShareLink>> {
        let now = self.clock.now();
        let (expired, live): (Vec<ShareLink>, Vec<ShareLink>) =
            links.into_iter().partition(|l| l.is_expired_at(now));

        for link in &expired {
            self.store.delete(&link.hash)?;
            tracing::debug!(hash = %link.hash, path = %link.path, "Removed expired share link");
        }

        Ok(live)
    }

    fn generate_token(&self) -> Result<String> {
        let mut bytes = vec![0u8; self.token_bytes];
        OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
            tracing::error!(error = %e, "Random source failed");
            ResourceError::Internal(format!("random source failed: {}", e))
        })?;
        Ok(URL_SAFE.encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shares::{JsonShareStore, ManualClock};
    use chrono::{Duration, TimeZone, Utc};
    use model::Permissions;

    fn setup() -> (Arc<JsonShareStore>, Arc<ManualClock>, ShareService) {
        let store = Arc::new(JsonShareStore::in_memory());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let service = ShareService::new(store.clone(), "https://files.example.com/")
            .with_clock(clock.clone());
        (store, clock, service)
    }

    fn user() -> User {
        User::new("alice", "/srv/alice").with_permissions(Permissions::all())
    }

    #[test]
    fn test_permanent_link_reused() {
        let (store, _clock, service) = setup();
        let user = user();

        let first = service.create(&user, "/docs/a.txt", None, None).unwrap();
        assert!(!first.is_reused());
        assert_eq!(first.link().path, "/srv/alice/docs/a.txt");
        assert!(first.link().is_permanent());

        let second = service.create(&user, "/docs/a.txt", Some(""), None).unwrap();
        assert!(second.is_reused());
        assert_eq!(second.link(), first.link());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_creation_locks_released() {
        let (_store, _clock, service) = setup();
        let service = Arc::new(service);
        let user = Arc::new(user());

        for i in 0..50 {
            let created = service
                .create(&user, &format!("/file-{}.txt", i), None, None)
                .unwrap();
            service.delete(&user, &created.link().hash).unwrap();
        }
        assert!(service.creation_locks.is_empty());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let user = Arc::clone(&user);
                std::thread::spawn(move || service.create(&user, "/shared.txt", None, None).unwrap())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| !c.is_reused())
            .count();
        assert_eq!(created, 1);
        assert!(service.creation_locks.is_empty());
    }

    #[test]
    fn test_failed_create_is_not_reused() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(JsonShareStore::open(temp_dir.path().join("shares.json")).unwrap());
        let service = ShareService::new(store.clone(), "https://files.example.com");
        let user = user();

        let blocker = temp_dir.path().join("shares.json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        let err = service.create(&user, "/a.txt", None, None).unwrap_err();
        assert!(matches!(err, ResourceError::Internal(_)));
        assert!(store.list().unwrap().is_empty());

        std::fs::remove_dir(&blocker).unwrap();

        let created = service.create(&user, "/a.txt", None, None).unwrap();
        assert!(!created.is_reused());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_token_shape() {
        let (_store, _clock, service) = setup();
        let link = service.create(&user(), "/a", None, None).unwrap();
        let hash = &link.link().hash;

        assert_eq!(hash.len(), 8);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

        let wide = service.with_token_bytes(12);
        let link = wide.create(&user(), "/b", None, None).unwrap();
        assert_eq!(link.link().hash.len(), 16);
    }

    #[test]
    fn test_expiring_link_units() {
        let (_store, clock, service) = setup();
        let now = clock.now();

        let cases = [
            (Some("seconds"), Duration::seconds(10)),
            (Some("minutes"), Duration::minutes(10)),
            (Some("days"), Duration::days(10)),
            (Some("weeks"), Duration::hours(10)),
            (None, Duration::hours(10)),
        ];
        for (unit, expected) in cases {
            let created = service.create(&user(), "/a", Some("10"), unit).unwrap();
            assert!(created.link().expires);
            assert_eq!(created.link().expire_date, Some(now + expected));
        }
    }

    #[test]
    fn test_expiring_links_are_never_reused() {
        let (store, _clock, service) = setup();
        service.create(&user(), "/a", Some("1"), None).unwrap();
        service.create(&user(), "/a", Some("1"), None).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_expires() {
        let (_store, _clock, service) = setup();
        for bad in ["soon", "-5", "1.5"] {
            let err = service.create(&user(), "/a", Some(bad), None).unwrap_err();
            assert!(matches!(err, ResourceError::InvalidOption(_)), "{}", bad);
        }
        let err = service
            .create(&user(), "/a", Some(&u64::MAX.to_string()), Some("days"))
            .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidOption(_)));
    }

    #[test]
    fn test_list_sweeps_expired() {
        let (store, clock, service) = setup();
        let user = user();

        let fresh = service.create(&user, "/a", Some("1"), Some("days")).unwrap();
        service.create(&user, "/a", Some("1"), Some("minutes")).unwrap();
        service.create(&user, "/a", Some("2"), Some("minutes")).unwrap();

        clock.advance(Duration::minutes(5));

        let live = service.list(&user, "/a").unwrap();
        assert_eq!(live, vec![fresh.link().clone()]);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_share_permission_required() {
        let (_store, _clock, service) = setup();
        let mut user = user();
        user.perm.share = false;

        assert_eq!(service.list(&user, "/a").unwrap_err(), ResourceError::Forbidden);
        assert_eq!(
            service.create(&user, "/a", None, None).unwrap_err(),
            ResourceError::Forbidden
        );
        assert_eq!(service.delete(&user, "x").unwrap_err(), ResourceError::Forbidden);
    }

    #[test]
    fn test_delete() {
        let (store, _clock, service) = setup();
        let user = user();
        let created = service.create(&user, "/a", None, None).unwrap();

        service.delete(&user, &created.link().hash).unwrap();
        assert!(store.list().unwrap().is_empty());

        service.delete(&user, &created.link().hash).unwrap();
        service.delete(&user, "").unwrap();
    }

    #[test]
    fn test_delete_other_scope_forbidden() {
        let (store, _clock, service) = setup();
        let owner = user();
        let created = service.create(&owner, "/a", None, None).unwrap();

        let intruder = User::new("mallory", "/srv/mallory").with_permissions(Permissions::all());
        assert_eq!(
            service.delete(&intruder, &created.link().hash).unwrap_err(),
            ResourceError::Forbidden
        );
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_lazily_expires() {
        let (store, clock, service) = setup();
        let created = service.create(&user(), "/a", Some("30"), Some("seconds")).unwrap();
        let hash = created.link().hash.clone();

        assert!(service.resolve(&hash).unwrap().is_some());
        clock.advance(Duration::seconds(31));
        assert!(service.resolve(&hash).unwrap().is_none());
        assert!(store.get_by_hash(&hash).unwrap().is_none());
    }

    #[test]
    fn test_url_for() {
        let (_store, _clock, service) = setup();
        let link = ShareLink::permanent("/srv/a", "abc");
        assert_eq!(service.url_for(&link), "https://files.example.com/share/abc");
    }

    #[test]
    fn test_list_all() {
        let (_store, clock, service) = setup();
        service.create(&user(), "/a", None, None).unwrap();
        service.create(&user(), "/b", Some("1"), Some("seconds")).unwrap();
        clock.advance(Duration::seconds(2));
        assert_eq!(service.list_all().unwrap().len(), 1);
    }
}
