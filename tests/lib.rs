//! Shared helpers for the tickwatch behavior tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tickwatch_core::{
    Asset, AssetKind, CacheService, HttpClient, HttpError, HttpRequest, HttpResponse,
    PriceSnapshot, Store, Symbol, UtcDateTime, WatchlistService,
};

/// Build the service stack over a fresh in-memory store.
pub fn memory_services() -> (Arc<Store>, Arc<CacheService>, Arc<WatchlistService>) {
    let store = Arc::new(Store::open_in_memory());
    let cache = Arc::new(CacheService::new(Arc::clone(&store)));
    let watchlist = Arc::new(WatchlistService::new(
        Arc::clone(&store),
        Arc::clone(&cache),
    ));
    (store, cache, watchlist)
}

pub fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).expect("test symbol must parse")
}

pub fn asset(raw: &str, kind: AssetKind) -> Asset {
    Asset::new(symbol(raw), format!("{raw} asset"), kind, None)
}

pub fn snapshot(raw: &str, price: f64, as_of: UtcDateTime) -> PriceSnapshot {
    PriceSnapshot::new(symbol(raw), price, Some(1_000.0), None, Some(0.1), as_of)
        .expect("test snapshot must validate")
}

/// Transport that answers every request with one fixed status/body and
/// counts how often it was called.
pub struct FixedResponseTransport {
    status: u16,
    body: String,
    calls: AtomicU32,
}

impl FixedResponseTransport {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpClient for FixedResponseTransport {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = HttpResponse {
            status: self.status,
            body: self.body.clone(),
        };
        Box::pin(async move { Ok(response) })
    }
}

/// Transport that fails at the connection level (timeout/connect style).
#[derive(Default)]
pub struct DownTransport {
    calls: AtomicU32,
}

impl DownTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HttpClient for DownTransport {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Err(HttpError::new("request timeout: simulated")) })
    }
}

/// Delegates to an inner transport, except for URLs containing a failing
/// fragment, which get a 500.
pub struct PartialOutageTransport<T: HttpClient> {
    inner: T,
    failing_fragment: &'static str,
}

impl<T: HttpClient> PartialOutageTransport<T> {
    pub fn new(inner: T, failing_fragment: &'static str) -> Self {
        Self {
            inner,
            failing_fragment,
        }
    }
}

impl<T: HttpClient> HttpClient for PartialOutageTransport<T> {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        if request.url.contains(self.failing_fragment) {
            return Box::pin(async move {
                Ok(HttpResponse {
                    status: 500,
                    body: String::from("synthetic outage"),
                })
            });
        }
        self.inner.execute(request)
    }

    fn is_offline(&self) -> bool {
        self.inner.is_offline()
    }
}
