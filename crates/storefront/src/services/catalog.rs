//! Product catalog reads.
//!
//! Listing supports the storefront's full filter set (category, price range,
//! color/size, text search), sorting and pagination with an exact total for
//! the pager. Results are cached for five minutes; failures surface as
//! retryable backend errors for the UI's error state.

use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use luxe_core::{Product, ProductId};

use crate::backend::{BackendError, Query, RestClient, SortDirection};

/// Cache TTL for catalog reads.
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Maximum cached entries.
const CACHE_CAPACITY: u64 = 1_000;

/// Default page size on the products listing.
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProductSort {
    PriceAscending,
    PriceDescending,
    #[default]
    Newest,
}

/// Filter set for a product listing request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub sort: ProductSort,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            category: None,
            search: None,
            min_price: None,
            max_price: None,
            color: None,
            size: None,
            sort: ProductSort::default(),
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ProductFilter {
    /// The filter portion of the query (shared by the row select and the
    /// count).
    fn filter_query(&self) -> Query {
        let mut query = Query::new();
        if let Some(category) = &self.category {
            query = query.eq("category", category);
        }
        if let Some(min_price) = self.min_price {
            query = query.gte("price", min_price);
        }
        if let Some(max_price) = self.max_price {
            query = query.lte("price", max_price);
        }
        if let Some(color) = &self.color {
            query = query.contains("colors", color);
        }
        if let Some(size) = &self.size {
            query = query.contains("sizes", size);
        }
        if let Some(search) = &self.search {
            query = query.search(&["name", "description"], search);
        }
        query
    }

    /// The full query: filters plus sort and pagination window.
    fn listing_query(&self) -> Query {
        let page = self.page.max(1);
        let query = match self.sort {
            ProductSort::PriceAscending => self
                .filter_query()
                .order_by("price", SortDirection::Ascending),
            ProductSort::PriceDescending => self
                .filter_query()
                .order_by("price", SortDirection::Descending),
            ProductSort::Newest => self
                .filter_query()
                .order_by("created_at", SortDirection::Descending),
        };
        query.range((page - 1) * self.per_page, self.per_page)
    }
}

/// One page of a product listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductPage {
    pub products: Vec<Product>,
    /// Exact total across all pages.
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl ProductPage {
    /// Number of pages the pager should render.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.per_page))
    }
}

#[derive(Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Product(ProductId),
    Listing(ProductFilter),
}

#[derive(Clone)]
enum CacheValue {
    Product(Box<Product>),
    Listing(ProductPage),
}

/// Client for catalog reads, with a short-TTL cache in front.
#[derive(Clone)]
pub struct CatalogClient {
    rest: RestClient,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogClient {
    /// Create a catalog client.
    #[must_use]
    pub fn new(rest: RestClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();
        Self { rest, cache }
    }

    /// List products matching a filter.
    ///
    /// # Errors
    ///
    /// Returns a (retryable) backend error if either the count or the row
    /// select fails.
    #[instrument(skip(self, filter))]
    pub async fn list(&self, filter: &ProductFilter) -> Result<ProductPage, BackendError> {
        let key = CacheKey::Listing(filter.clone());
        if let Some(CacheValue::Listing(page)) = self.cache.get(&key).await {
            debug!("cache hit for product listing");
            return Ok(page);
        }

        let total = self.rest.count("products", &filter.filter_query()).await?;
        let products: Vec<Product> = self
            .rest
            .select("products", &filter.listing_query())
            .await?;

        let page = ProductPage {
            products,
            total,
            page: filter.page.max(1),
            per_page: filter.per_page,
        };
        self.cache
            .insert(key, CacheValue::Listing(page.clone()))
            .await;
        Ok(page)
    }

    /// Fetch a single product.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] for an unknown ID.
    #[instrument(skip(self))]
    pub async fn get(&self, id: ProductId) -> Result<Product, BackendError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("cache hit for product");
            return Ok(*product);
        }

        let product: Product = self
            .rest
            .select_single("products", &Query::new().eq("id", id))
            .await?;
        self.cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// Products in the same category, for the detail page's suggestions.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the select fails.
    #[instrument(skip(self))]
    pub async fn related(
        &self,
        category: &str,
        exclude: ProductId,
        limit: u32,
    ) -> Result<Vec<Product>, BackendError> {
        let query = Query::new()
            .eq("category", category)
            .order_by("created_at", SortDirection::Descending)
            .limit(limit + 1);
        let products: Vec<Product> = self.rest.select("products", &query).await?;
        Ok(products
            .into_iter()
            .filter(|p| p.id != exclude)
            .take(limit as usize)
            .collect())
    }
}
