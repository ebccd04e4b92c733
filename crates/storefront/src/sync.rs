//! The cart synchronization engine.
//!
//! Keeps the authenticated user's local cart consistent with its remote
//! mirror, and performs the guest → user merge at sign-in. The protocol is
//! deliberately simple, matching what the storefront needs:
//!
//! - Every mutation applies to local state first (optimistic - the UI never
//!   waits on the network), then upserts the FULL line-item list keyed by
//!   user id. An upsert failure is logged and local state is kept; there is
//!   no rollback, no queue and no retry. Because every upsert carries the
//!   complete cart, the next successful write heals any earlier failed one.
//! - Callers are free to race mutation futures, so two rapid mutations can
//!   complete out of order remotely; last write wins. As a guard against
//!   re-reading a stale echo, every upsert carries a monotonically increasing
//!   local revision and [`CartSync::refresh`] discards any remote record
//!   older than the currently-applied revision.
//! - Guest mutations touch only the locally-owned guest cart; persisting it
//!   is the caller's job (see [`crate::persist`]).

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use luxe_core::{Cart, CartLine, Identity, ProductId, UserId};

use crate::backend::{BackendError, Query, RestClient};

/// The remote `user_cart` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartRecord {
    /// Owning user; the record's conflict key.
    pub user_id: UserId,
    /// The full line-item list.
    pub cart_items: Vec<CartLine>,
    /// Local revision of the writer at upsert time.
    #[serde(default)]
    pub revision: u64,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Seam to the remote user-cart collection.
///
/// Production uses the REST client; tests substitute an in-memory store.
pub trait CartStore: Send + Sync + 'static {
    /// Read the record for a user. `Ok(None)` is the not-found condition.
    fn fetch(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<CartRecord>, BackendError>> + Send;

    /// Create an empty record for a user (first sign-in).
    fn create_empty(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Insert-or-update the record with the full line-item list.
    fn upsert(
        &self,
        user_id: UserId,
        lines: Vec<CartLine>,
        revision: u64,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

impl<T: CartStore> CartStore for std::sync::Arc<T> {
    fn fetch(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<CartRecord>, BackendError>> + Send {
        (**self).fetch(user_id)
    }

    fn create_empty(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).create_empty(user_id)
    }

    fn upsert(
        &self,
        user_id: UserId,
        lines: Vec<CartLine>,
        revision: u64,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).upsert(user_id, lines, revision)
    }
}

impl CartStore for RestClient {
    async fn fetch(&self, user_id: UserId) -> Result<Option<CartRecord>, BackendError> {
        let query = Query::new().eq("user_id", user_id);
        match self.select_single::<CartRecord>("user_cart", &query).await {
            Ok(record) => Ok(Some(record)),
            Err(BackendError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_empty(&self, user_id: UserId) -> Result<(), BackendError> {
        let record = CartRecord {
            user_id,
            cart_items: Vec::new(),
            revision: 0,
            updated_at: Utc::now(),
        };
        self.insert("user_cart", &record).await
    }

    async fn upsert(
        &self,
        user_id: UserId,
        lines: Vec<CartLine>,
        revision: u64,
    ) -> Result<(), BackendError> {
        let record = CartRecord {
            user_id,
            cart_items: lines,
            revision,
            updated_at: Utc::now(),
        };
        RestClient::upsert(self, "user_cart", "user_id", &record).await
    }
}

#[derive(Default)]
struct CartState {
    user_cart: Cart,
    guest_cart: Cart,
}

/// The synchronization engine.
///
/// Holds both carts; the identity passed into each operation selects which
/// one a mutation targets and whether it syncs remotely.
pub struct CartSync<C> {
    remote: C,
    state: Mutex<CartState>,
    /// Monotonic revision of the local user cart; bumped on every
    /// authenticated mutation and carried on each upsert.
    revision: AtomicU64,
}

impl<C: CartStore> CartSync<C> {
    /// Create an engine with empty carts.
    pub fn new(remote: C) -> Self {
        Self {
            remote,
            state: Mutex::new(CartState::default()),
            revision: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CartState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The guest cart (snapshot).
    #[must_use]
    pub fn guest_cart(&self) -> Cart {
        self.lock().guest_cart.clone()
    }

    /// The user cart (snapshot).
    #[must_use]
    pub fn user_cart(&self) -> Cart {
        self.lock().user_cart.clone()
    }

    /// The cart the given identity is currently shopping with.
    #[must_use]
    pub fn current(&self, identity: &Identity) -> Cart {
        match identity {
            Identity::Anonymous => self.guest_cart(),
            Identity::Authenticated(_) => self.user_cart(),
        }
    }

    /// The currently-applied local revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Seed the guest cart from persisted state at startup.
    pub fn seed_guest(&self, cart: Cart) {
        self.lock().guest_cart = cart;
    }

    /// Add a line to the current cart.
    pub async fn add(&self, identity: &Identity, line: CartLine) -> Cart {
        self.apply(identity, |cart| cart.add_line(line)).await
    }

    /// Remove the first line matching a product from the current cart.
    pub async fn remove(&self, identity: &Identity, product_id: ProductId) -> Cart {
        self.apply(identity, |cart| cart.remove_line(product_id))
            .await
    }

    /// Set the quantity on lines matching a product in the current cart.
    ///
    /// A floor of 1 is applied here - the engine stands in for the UI's
    /// min-bound arithmetic, so 0 never reaches the model.
    pub async fn set_quantity(
        &self,
        identity: &Identity,
        product_id: ProductId,
        quantity: u32,
    ) -> Cart {
        let quantity = quantity.max(1);
        self.apply(identity, |cart| cart.set_quantity(product_id, quantity))
            .await
    }

    /// Empty the current cart.
    pub async fn clear(&self, identity: &Identity) -> Cart {
        self.apply(identity, Cart::clear).await
    }

    /// Apply a mutation to the cart the identity selects.
    ///
    /// Authenticated: mutate local state, bump the revision, then upsert the
    /// full snapshot - failures are logged, never surfaced, never rolled
    /// back. Guest: mutate local state only.
    async fn apply<F: FnOnce(&mut Cart)>(&self, identity: &Identity, mutate: F) -> Cart {
        match identity {
            Identity::Anonymous => {
                let mut state = self.lock();
                mutate(&mut state.guest_cart);
                state.guest_cart.clone()
            }
            Identity::Authenticated(user) => {
                let (snapshot, revision) = {
                    let mut state = self.lock();
                    mutate(&mut state.user_cart);
                    let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
                    (state.user_cart.clone(), revision)
                };
                self.push(user.id, &snapshot, revision).await;
                snapshot
            }
        }
    }

    /// Upsert a snapshot, logging (not propagating) failure.
    async fn push(&self, user_id: UserId, snapshot: &Cart, revision: u64) {
        if let Err(e) = self
            .remote
            .upsert(user_id, snapshot.lines().to_vec(), revision)
            .await
        {
            warn!(
                error = %e,
                %user_id,
                revision,
                "cart sync failed; keeping optimistic local state"
            );
        }
    }

    /// Fetch-or-create the remote cart record after sign-in.
    ///
    /// - Record exists: adopt its lines and revision (the remote copy is
    ///   authoritative and overwrites the local cache).
    /// - Not found: create an empty record and adopt empty local state.
    /// - Any other failure: adopt empty local state WITHOUT creating a
    ///   record - fail open, the cart is treated as empty for this session
    ///   until the next successful write. Never blocks.
    pub async fn initialize(&self, user_id: UserId) {
        match self.remote.fetch(user_id).await {
            Ok(Some(record)) => {
                debug!(%user_id, revision = record.revision, "adopted remote user cart");
                self.lock().user_cart = Cart::from(record.cart_items);
                self.revision.store(record.revision, Ordering::SeqCst);
            }
            Ok(None) => {
                debug!(%user_id, "no remote cart record; creating an empty one");
                if let Err(e) = self.remote.create_empty(user_id).await {
                    warn!(error = %e, %user_id, "failed to create remote cart record");
                }
                self.adopt_empty();
            }
            Err(e) => {
                warn!(
                    error = %e,
                    %user_id,
                    "failed to load user cart; treating as empty for this session"
                );
                self.adopt_empty();
            }
        }
    }

    fn adopt_empty(&self) {
        self.lock().user_cart = Cart::new();
        self.revision.store(0, Ordering::SeqCst);
    }

    /// Merge the guest cart into the user cart after a successful sign-in.
    ///
    /// Per guest line: a user line with the same (product, size, color) key
    /// has its quantity set to `min(existing + guest.quantity, guest.stock)`;
    /// otherwise the guest line is appended, clamped to its captured stock.
    /// The merged cart is upserted and the guest cart cleared. With an empty
    /// guest cart this is a no-op, which makes a second invocation harmless.
    ///
    /// Returns whether a merge actually ran.
    pub async fn merge_guest(&self, user_id: UserId) -> bool {
        let merged = {
            let mut state = self.lock();
            if state.guest_cart.is_empty() {
                None
            } else {
                let guest = std::mem::take(&mut state.guest_cart);
                state.user_cart.merge_from(&guest);
                let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
                Some((state.user_cart.clone(), revision))
            }
        };

        match merged {
            Some((snapshot, revision)) => {
                debug!(%user_id, lines = snapshot.len(), "merged guest cart into user cart");
                self.push(user_id, &snapshot, revision).await;
                true
            }
            None => false,
        }
    }

    /// Re-read the remote record, adopting it only when it is at least as
    /// new as the currently-applied local revision.
    ///
    /// This is the stale-echo guard: an out-of-order upsert completion can
    /// leave the remote record one mutation behind, and adopting it blindly
    /// would transiently roll the UI back.
    pub async fn refresh(&self, user_id: UserId) {
        match self.remote.fetch(user_id).await {
            Ok(Some(record)) => {
                let applied = self.revision.load(Ordering::SeqCst);
                if record.revision < applied {
                    debug!(
                        remote = record.revision,
                        local = applied,
                        "discarding stale remote cart echo"
                    );
                    return;
                }
                self.lock().user_cart = Cart::from(record.cart_items);
                self.revision.store(record.revision, Ordering::SeqCst);
            }
            Ok(None) => debug!(%user_id, "no remote cart record on refresh"),
            Err(e) => warn!(error = %e, "cart refresh failed; keeping local state"),
        }
    }

    /// Drop the local user cart representation (sign-out).
    ///
    /// The guest cart and the remote record are untouched.
    pub fn clear_user_local(&self) {
        self.lock().user_cart = Cart::new();
        self.revision.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use luxe_core::{AuthUser, Email, Product, UserRole};

    use super::*;

    /// In-memory stand-in for the remote user_cart collection.
    #[derive(Default)]
    struct MemoryCartStore {
        records: Mutex<HashMap<UserId, CartRecord>>,
        fail_upserts: AtomicBool,
        fail_fetches: AtomicBool,
        upserts_seen: Mutex<Vec<CartRecord>>,
    }

    impl MemoryCartStore {
        fn record(&self, user_id: UserId) -> Option<CartRecord> {
            self.records.lock().unwrap().get(&user_id).cloned()
        }

        fn put(&self, record: CartRecord) {
            self.records.lock().unwrap().insert(record.user_id, record);
        }

        fn upsert_count(&self) -> usize {
            self.upserts_seen.lock().unwrap().len()
        }
    }

    impl CartStore for MemoryCartStore {
        async fn fetch(&self, user_id: UserId) -> Result<Option<CartRecord>, BackendError> {
            if self.fail_fetches.load(Ordering::SeqCst) {
                return Err(BackendError::Api {
                    status: 500,
                    code: None,
                    message: "boom".to_string(),
                });
            }
            Ok(self.record(user_id))
        }

        async fn create_empty(&self, user_id: UserId) -> Result<(), BackendError> {
            self.put(CartRecord {
                user_id,
                cart_items: Vec::new(),
                revision: 0,
                updated_at: Utc::now(),
            });
            Ok(())
        }

        async fn upsert(
            &self,
            user_id: UserId,
            lines: Vec<CartLine>,
            revision: u64,
        ) -> Result<(), BackendError> {
            if self.fail_upserts.load(Ordering::SeqCst) {
                return Err(BackendError::Api {
                    status: 503,
                    code: None,
                    message: "unavailable".to_string(),
                });
            }
            let record = CartRecord {
                user_id,
                cart_items: lines,
                revision,
                updated_at: Utc::now(),
            };
            self.upserts_seen.lock().unwrap().push(record.clone());
            self.put(record);
            Ok(())
        }
    }

    fn product(name: &str, stock: u32) -> Product {
        Product {
            id: luxe_core::ProductId::generate(),
            name: name.to_string(),
            description: String::new(),
            price: Decimal::new(2000, 2),
            category: "men".to_string(),
            images: vec![],
            sizes: vec!["M".to_string()],
            colors: vec!["Black".to_string()],
            stock,
            created_at: Utc::now(),
        }
    }

    fn line(product: &Product, quantity: u32) -> CartLine {
        CartLine::new(
            product.clone(),
            quantity,
            Some("M".to_string()),
            Some("Black".to_string()),
        )
    }

    fn authenticated(user_id: UserId) -> Identity {
        Identity::Authenticated(AuthUser {
            id: user_id,
            email: Email::parse("user@example.com").unwrap(),
            email_verified: true,
            role: UserRole::User,
            full_name: None,
            phone: None,
            last_login: None,
        })
    }

    #[tokio::test]
    async fn test_guest_mutations_never_touch_remote() {
        let sync = CartSync::new(MemoryCartStore::default());
        let p = product("Shirt", 10);

        let cart = sync.add(&Identity::Anonymous, line(&p, 2)).await;
        assert_eq!(cart.len(), 1);
        assert_eq!(sync.remote.upsert_count(), 0);
        assert!(sync.user_cart().is_empty());
    }

    #[tokio::test]
    async fn test_authenticated_mutation_upserts_full_snapshot() {
        let sync = CartSync::new(MemoryCartStore::default());
        let user_id = UserId::generate();
        let identity = authenticated(user_id);
        let p = product("Shirt", 10);

        sync.add(&identity, line(&p, 2)).await;
        let q = product("Socks", 10);
        sync.add(&identity, line(&q, 1)).await;

        let record = sync.remote.record(user_id).unwrap();
        // Each upsert carries the complete cart, not a delta
        assert_eq!(record.cart_items.len(), 2);
        assert_eq!(record.revision, 2);
        assert_eq!(sync.remote.upsert_count(), 2);
    }

    #[tokio::test]
    async fn test_upsert_failure_keeps_local_and_next_write_heals() {
        let sync = CartSync::new(MemoryCartStore::default());
        let user_id = UserId::generate();
        let identity = authenticated(user_id);
        let p = product("Shirt", 10);

        sync.remote.fail_upserts.store(true, Ordering::SeqCst);
        let cart = sync.add(&identity, line(&p, 2)).await;

        // Optimistic local state survives the failed sync
        assert_eq!(cart.len(), 1);
        assert!(sync.remote.record(user_id).is_none());

        // The next successful mutation carries the latest full state
        sync.remote.fail_upserts.store(false, Ordering::SeqCst);
        let q = product("Socks", 10);
        sync.add(&identity, line(&q, 1)).await;

        let record = sync.remote.record(user_id).unwrap();
        assert_eq!(record.cart_items.len(), 2);
    }

    #[tokio::test]
    async fn test_initialize_adopts_existing_record() {
        let store = MemoryCartStore::default();
        let user_id = UserId::generate();
        let p = product("Shirt", 10);
        store.put(CartRecord {
            user_id,
            cart_items: vec![line(&p, 3)],
            revision: 7,
            updated_at: Utc::now(),
        });

        let sync = CartSync::new(store);
        sync.initialize(user_id).await;

        assert_eq!(sync.user_cart().len(), 1);
        assert_eq!(sync.revision(), 7);
    }

    #[tokio::test]
    async fn test_initialize_creates_record_when_missing() {
        let sync = CartSync::new(MemoryCartStore::default());
        let user_id = UserId::generate();

        sync.initialize(user_id).await;

        let record = sync.remote.record(user_id).unwrap();
        assert!(record.cart_items.is_empty());
        assert!(sync.user_cart().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_fails_open_without_creating() {
        let store = MemoryCartStore::default();
        store.fail_fetches.store(true, Ordering::SeqCst);

        let sync = CartSync::new(store);
        let user_id = UserId::generate();
        sync.initialize(user_id).await;

        // Empty local cart, no record created
        assert!(sync.user_cart().is_empty());
        sync.remote.fail_fetches.store(false, Ordering::SeqCst);
        assert!(sync.remote.record(user_id).is_none());
    }

    #[tokio::test]
    async fn test_merge_guest_merges_upserts_and_clears() {
        let sync = CartSync::new(MemoryCartStore::default());
        let user_id = UserId::generate();
        let p = product("Shirt", 10);

        sync.add(&Identity::Anonymous, line(&p, 2)).await;
        sync.initialize(user_id).await;

        assert!(sync.merge_guest(user_id).await);

        assert!(sync.guest_cart().is_empty());
        assert_eq!(sync.user_cart().len(), 1);
        let record = sync.remote.record(user_id).unwrap();
        assert_eq!(record.cart_items.len(), 1);
        assert_eq!(record.cart_items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_merge_guest_with_empty_guest_cart_is_noop() {
        let sync = CartSync::new(MemoryCartStore::default());
        let user_id = UserId::generate();
        sync.initialize(user_id).await;
        let upserts_before = sync.remote.upsert_count();

        assert!(!sync.merge_guest(user_id).await);
        assert_eq!(sync.remote.upsert_count(), upserts_before);
    }

    #[tokio::test]
    async fn test_merge_guest_is_one_shot() {
        let sync = CartSync::new(MemoryCartStore::default());
        let user_id = UserId::generate();
        let p = product("Shirt", 10);

        sync.add(&Identity::Anonymous, line(&p, 2)).await;
        sync.initialize(user_id).await;

        assert!(sync.merge_guest(user_id).await);
        // Guest cart is already empty: second invocation is a no-op
        assert!(!sync.merge_guest(user_id).await);
        assert_eq!(sync.user_cart().lines()[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_refresh_discards_stale_echo() {
        let sync = CartSync::new(MemoryCartStore::default());
        let user_id = UserId::generate();
        let identity = authenticated(user_id);
        let p = product("Shirt", 10);

        sync.add(&identity, line(&p, 1)).await;
        sync.add(&identity, line(&p, 1)).await;
        assert_eq!(sync.revision(), 2);

        // Simulate an out-of-order completion: the remote record holds the
        // older snapshot
        let stale = CartRecord {
            user_id,
            cart_items: vec![line(&p, 1)],
            revision: 1,
            updated_at: Utc::now(),
        };
        sync.remote.put(stale);

        sync.refresh(user_id).await;

        // The stale echo is discarded; local state keeps the newer quantity
        assert_eq!(sync.user_cart().lines()[0].quantity, 2);
        assert_eq!(sync.revision(), 2);
    }

    #[tokio::test]
    async fn test_refresh_adopts_newer_record() {
        let sync = CartSync::new(MemoryCartStore::default());
        let user_id = UserId::generate();
        let p = product("Shirt", 10);

        let newer = CartRecord {
            user_id,
            cart_items: vec![line(&p, 5)],
            revision: 9,
            updated_at: Utc::now(),
        };
        sync.remote.put(newer);

        sync.refresh(user_id).await;
        assert_eq!(sync.user_cart().lines()[0].quantity, 5);
        assert_eq!(sync.revision(), 9);
    }

    #[tokio::test]
    async fn test_clear_user_local_leaves_guest_and_remote() {
        let sync = CartSync::new(MemoryCartStore::default());
        let user_id = UserId::generate();
        let identity = authenticated(user_id);
        let p = product("Shirt", 10);
        let g = product("Scarf", 5);

        sync.add(&Identity::Anonymous, line(&g, 1)).await;
        sync.initialize(user_id).await;
        sync.add(&identity, line(&p, 2)).await;

        sync.clear_user_local();

        assert!(sync.user_cart().is_empty());
        assert_eq!(sync.guest_cart().len(), 1);
        // The remote record is untouched by sign-out
        assert_eq!(sync.remote.record(user_id).unwrap().cart_items.len(), 1);
    }

    #[tokio::test]
    async fn test_set_quantity_floors_at_one_and_clamps_to_stock() {
        let sync = CartSync::new(MemoryCartStore::default());
        let user_id = UserId::generate();
        let identity = authenticated(user_id);
        let p = product("Shirt", 5);

        sync.add(&identity, line(&p, 1)).await;

        let cart = sync.set_quantity(&identity, p.id, 7).await;
        assert_eq!(cart.lines()[0].quantity, 5);

        let cart = sync.set_quantity(&identity, p.id, 0).await;
        assert_eq!(cart.lines()[0].quantity, 1);
    }
}
