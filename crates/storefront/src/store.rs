//! The application-state container.
//!
//! One `Store` per running app, cloned into whatever components need it; it
//! is the only thing the UI shell talks to. Every cart mutation funnels
//! through its operations (which delegate to the synchronization engine) -
//! no component touches cart state directly. Opening the store restores the
//! persisted `{guest cart, identity}` record before anything renders; the
//! restored identity stays provisional until [`Store::confirm_session`]
//! checks it against the auth service.

use std::sync::Arc;

use tracing::{instrument, warn};

use luxe_core::{AuthUser, Cart, CartLine, Identity, Order, ProductId};

use crate::backend::{Backend, OrderFeed, RestClient, StorageClient};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::persist::{LocalStore, PersistedState};
use crate::services::AdminService;
use crate::services::auth::{AuthService, enrich_with_profile};
use crate::services::catalog::CatalogClient;
use crate::services::orders::{CheckoutForm, OrderService};
use crate::services::profile::ProfileService;
use crate::session::{SessionGate, SignInEdge};
use crate::sync::{CartStore, CartSync};

/// Application state shared across all components.
///
/// Cheaply cloneable via `Arc`.
pub struct Store<C: CartStore = RestClient> {
    inner: Arc<StoreInner<C>>,
}

impl<C: CartStore> Clone for Store<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<C: CartStore> {
    config: StoreConfig,
    backend: Backend,
    catalog: CatalogClient,
    order_feed: OrderFeed,
    gate: SessionGate,
    carts: CartSync<C>,
    local: LocalStore,
}

impl Store<RestClient> {
    /// Open the store against the configured backend, restoring persisted
    /// local state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend clients cannot be constructed from
    /// the configuration.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let backend = Backend::new(&config)?;
        let cart_store = backend.rest().clone();
        Self::with_cart_store(config, backend, cart_store)
    }
}

impl<C: CartStore> Store<C> {
    /// Open the store with an explicit cart-store seam (tests substitute an
    /// in-memory one).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend clients cannot be constructed.
    pub fn with_cart_store(config: StoreConfig, backend: Backend, cart_store: C) -> Result<Self> {
        let local = LocalStore::new(&config.state_dir);
        let persisted = local.load().unwrap_or_else(|e| {
            warn!(error = %e, "persisted state unreadable; starting fresh");
            PersistedState::default()
        });

        let gate = SessionGate::new();
        gate.restore_provisional(persisted.identity);

        let carts = CartSync::new(cart_store);
        carts.seed_guest(persisted.guest_cart);

        let catalog = CatalogClient::new(backend.rest().clone());

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                backend,
                catalog,
                order_feed: OrderFeed::new(),
                gate,
                carts,
                local,
            }),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The hosted-backend clients.
    #[must_use]
    pub fn backend(&self) -> &Backend {
        &self.inner.backend
    }

    fn rest(&self) -> &RestClient {
        self.inner.backend.rest()
    }

    fn storage(&self) -> &StorageClient {
        self.inner.backend.storage()
    }

    /// The catalog client (cached product reads).
    #[must_use]
    pub fn catalog(&self) -> &CatalogClient {
        &self.inner.catalog
    }

    /// Order placement and history.
    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(self.rest())
    }

    /// Profile and address book.
    #[must_use]
    pub fn profile(&self) -> ProfileService<'_> {
        ProfileService::new(self.rest())
    }

    /// The admin back office.
    #[must_use]
    pub fn admin(&self) -> AdminService<'_> {
        AdminService::new(self.rest(), self.storage())
    }

    fn auth_service(&self) -> AuthService<'_> {
        AuthService::new(self.inner.backend.auth(), self.rest())
    }

    /// The new-order event feed.
    #[must_use]
    pub fn order_feed(&self) -> &OrderFeed {
        &self.inner.order_feed
    }

    /// Start the background order-feed watcher (back office only).
    pub fn start_order_watcher(&self) -> tokio::task::JoinHandle<()> {
        self.inner
            .order_feed
            .spawn_watcher(self.rest().clone(), self.inner.config.order_poll_interval)
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// The current identity.
    #[must_use]
    pub fn identity(&self) -> Identity {
        self.inner.gate.current()
    }

    /// Check the (possibly provisional) local identity against the auth
    /// service and settle it.
    ///
    /// A confirmed restored session loads the user cart (fetch-or-create,
    /// no guest merge). A rejected one signs out locally. A transport
    /// failure keeps the provisional identity - fail open, nothing blocks.
    #[instrument(skip(self))]
    pub async fn confirm_session(&self) -> Identity {
        match self.inner.backend.auth().current_session().await {
            Ok(Some(user)) => {
                let user = enrich_with_profile(self.rest(), user).await;
                let user_id = user.id;
                if self.inner.gate.signed_in(user) == SignInEdge::Entered {
                    self.inner.carts.initialize(user_id).await;
                }
            }
            Ok(None) => {
                if self.inner.gate.signed_out() {
                    self.inner.carts.clear_user_local();
                }
            }
            Err(e) => {
                warn!(error = %e, "session restore check failed; keeping provisional identity");
            }
        }
        self.persist_local();
        self.identity()
    }

    /// Register a new account.
    ///
    /// The gate is not transitioned - the UI sends the user through sign-in.
    ///
    /// # Errors
    ///
    /// See [`AuthService::sign_up`].
    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<AuthUser> {
        Ok(self.auth_service().sign_up(email, password, full_name).await?)
    }

    /// Sign in and run the one-time cart reconciliation.
    ///
    /// # Errors
    ///
    /// Returns an auth error for bad credentials; cart work never fails the
    /// sign-in.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        let user = self.auth_service().sign_in(email, password).await?;
        self.handle_signed_in(user.clone()).await;
        Ok(user)
    }

    /// React to a signed-in auth event.
    ///
    /// On the Anonymous → Authenticated edge: fetch-or-create the remote
    /// cart, then merge the guest cart into it (one-shot; a second event is
    /// absorbed by the gate). Duplicate events are no-ops.
    pub async fn handle_signed_in(&self, user: AuthUser) {
        let user_id = user.id;
        if self.inner.gate.signed_in(user) == SignInEdge::Entered {
            self.inner.carts.initialize(user_id).await;
            self.inner.carts.merge_guest(user_id).await;
        }
        self.persist_local();
    }

    /// Sign out.
    ///
    /// The local transition always happens; a failed remote revocation is
    /// logged and does not keep the user signed in.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        if let Err(e) = self.auth_service().sign_out().await {
            warn!(error = %e, "remote sign-out failed; clearing local session anyway");
        }
        self.handle_signed_out();
    }

    /// React to a signed-out auth event (explicit, or expiry/revocation).
    ///
    /// Clears the local user cart; the guest cart is untouched.
    pub fn handle_signed_out(&self) {
        if self.inner.gate.signed_out() {
            self.inner.carts.clear_user_local();
        }
        self.persist_local();
    }

    // =========================================================================
    // Cart operations
    // =========================================================================

    /// The cart the current identity is shopping with.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.inner.carts.current(&self.identity())
    }

    /// Add a line to the current cart.
    pub async fn add_to_cart(&self, line: CartLine) -> Cart {
        let identity = self.identity();
        let cart = self.inner.carts.add(&identity, line).await;
        if !identity.is_authenticated() {
            self.persist_local();
        }
        cart
    }

    /// Remove the first line matching a product from the current cart.
    pub async fn remove_from_cart(&self, product_id: ProductId) -> Cart {
        let identity = self.identity();
        let cart = self.inner.carts.remove(&identity, product_id).await;
        if !identity.is_authenticated() {
            self.persist_local();
        }
        cart
    }

    /// Set the quantity on lines matching a product in the current cart.
    pub async fn set_cart_quantity(&self, product_id: ProductId, quantity: u32) -> Cart {
        let identity = self.identity();
        let cart = self
            .inner
            .carts
            .set_quantity(&identity, product_id, quantity)
            .await;
        if !identity.is_authenticated() {
            self.persist_local();
        }
        cart
    }

    /// Empty the current cart.
    pub async fn clear_cart(&self) -> Cart {
        let identity = self.identity();
        let cart = self.inner.carts.clear(&identity).await;
        if !identity.is_authenticated() {
            self.persist_local();
        }
        cart
    }

    /// Re-read the remote user cart, discarding stale echoes.
    pub async fn refresh_cart(&self) {
        if let Some(user_id) = self.identity().user_id() {
            self.inner.carts.refresh(user_id).await;
        }
    }

    /// Place an order for the current cart, then empty it.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for guests (checkout requires sign-in), a
    /// validation error for an empty cart or incomplete form, or a backend
    /// error.
    #[instrument(skip(self, form))]
    pub async fn place_order(&self, form: &CheckoutForm) -> Result<Order> {
        let identity = self.identity();
        let Some(user) = identity.user() else {
            return Err(crate::error::AppError::Unauthorized(
                "please sign in to continue checkout".to_string(),
            ));
        };

        let cart = self.inner.carts.current(&identity);
        let order = self.orders().checkout(user, &cart, form).await?;
        self.clear_cart().await;
        Ok(order)
    }

    /// Write `{guest cart, identity}` to local durable storage.
    ///
    /// Persistence failures are logged; a full disk must not break shopping.
    fn persist_local(&self) {
        let state = PersistedState {
            guest_cart: self.inner.carts.guest_cart(),
            identity: self.inner.gate.current(),
        };
        if let Err(e) = self.inner.local.save(&state) {
            warn!(error = %e, "failed to persist local state");
        }
    }
}
