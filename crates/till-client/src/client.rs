//! # Backend API Client
//!
//! REST client for the POS backend with offline behavior built in: reads
//! fall back to cached responses, mutations fall back to the offline queue.
//!
//! ## Endpoints
//! ```text
//! READS (cached)                       MUTATIONS (queued when offline)
//! ─────────────────────────────        ─────────────────────────────────────
//! GET /api/products                    POST /api/sales              CREATE_SALE
//! GET /api/customers                   POST /api/inventory/adjust   ADJUST_INVENTORY
//! GET /api/sales                       POST /api/cash-in-hand       UPDATE_CASH
//! GET /api/reports/daily-sales         POST /api/loans              CREATE_LOAN
//! GET /api/reports/product-sales       POST /api/loans/{id}/payments
//! GET /api/cash-in-hand                                             CREATE_LOAN_PAYMENT
//! GET /api/loans                       POST /api/loans/{id}/sales   ADD_SALE_TO_LOAN
//! ```

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use till_core::{CashInHand, Mutation, Product, QueuedAction};

use crate::cache::ResponseCache;
use crate::config::{endpoint, ClientConfig};
use crate::connectivity::{note_failure, ConnectivityMonitor};
use crate::error::{SyncError, SyncResult};
use crate::queue::{ActionDispatcher, OfflineQueue};

/// Endpoint paths.
pub mod endpoints {
    pub const PRODUCTS: &str = "/api/products";
    pub const CUSTOMERS: &str = "/api/customers";
    pub const SALES: &str = "/api/sales";
    pub const DAILY_SALES_REPORT: &str = "/api/reports/daily-sales";
    pub const PRODUCT_SALES_REPORT: &str = "/api/reports/product-sales";
    pub const CASH_IN_HAND: &str = "/api/cash-in-hand";
    pub const LOANS: &str = "/api/loans";
    pub const INVENTORY_ADJUST: &str = "/api/inventory/adjust";
}

/// Header carrying the register's device id on every request.
const DEVICE_ID_HEADER: &str = "x-device-id";

// =============================================================================
// Submit Outcome
// =============================================================================

/// What happened to a submitted mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The backend accepted it; carries the response body (`Null` if empty).
    Performed(Value),
    /// The device is offline; the action waits for replay.
    Queued(QueuedAction),
}

impl SubmitOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, SubmitOutcome::Queued(_))
    }
}

// =============================================================================
// API Client
// =============================================================================

/// Clone is cheap: the reqwest client and the stores are shared.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    monitor: ConnectivityMonitor,
    cache: ResponseCache,
    queue: OfflineQueue,
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        monitor: ConnectivityMonitor,
        cache: ResponseCache,
        queue: OfflineQueue,
    ) -> SyncResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let device_id = header::HeaderValue::from_str(config.device_id())
            .map_err(|e| SyncError::InvalidConfig(format!("device.id is not a valid header: {e}")))?;
        headers.insert(DEVICE_ID_HEADER, device_id);

        let http = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()?;

        Ok(ApiClient {
            http,
            base_url: config.base_url()?,
            monitor,
            cache,
            queue,
        })
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn products(&self) -> SyncResult<Vec<Product>> {
        self.read_as(endpoints::PRODUCTS).await
    }

    /// Looks up the product carrying `barcode` in the product list.
    pub async fn find_product_by_barcode(&self, barcode: &str) -> SyncResult<Option<Product>> {
        let products = self.products().await?;
        Ok(products.into_iter().find(|p| p.barcode == barcode))
    }

    pub async fn product(&self, id: &str) -> SyncResult<Product> {
        let value = self.read_uncached(&format!("{}/{id}", endpoints::PRODUCTS)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn customers(&self) -> SyncResult<Value> {
        self.read(endpoints::CUSTOMERS).await
    }

    pub async fn sales(&self) -> SyncResult<Value> {
        self.read(endpoints::SALES).await
    }

    pub async fn sale(&self, id: &str) -> SyncResult<Value> {
        self.read_uncached(&format!("{}/{id}", endpoints::SALES)).await
    }

    pub async fn sale_items(&self, sale_id: &str) -> SyncResult<Value> {
        self.read_uncached(&format!("{}/{sale_id}/items", endpoints::SALES))
            .await
    }

    pub async fn daily_sales_report(&self) -> SyncResult<Value> {
        self.read(endpoints::DAILY_SALES_REPORT).await
    }

    pub async fn product_sales_report(&self) -> SyncResult<Value> {
        self.read(endpoints::PRODUCT_SALES_REPORT).await
    }

    pub async fn cash_in_hand(&self) -> SyncResult<CashInHand> {
        self.read_as(endpoints::CASH_IN_HAND).await
    }

    pub async fn loans(&self) -> SyncResult<Value> {
        self.read(endpoints::LOANS).await
    }

    /// GET through the response cache.
    pub async fn read(&self, path: &str) -> SyncResult<Value> {
        self.cache
            .read_through(path, || self.get_json(path))
            .await
    }

    async fn read_as<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let value = self.read(path).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// GET that is not cached but still falls back to a cached entry.
    async fn read_uncached(&self, path: &str) -> SyncResult<Value> {
        match self.get_json(path).await {
            Ok(value) => Ok(value),
            Err(err) => self.cache.fallback(path, err).await,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Performs `mutation` now, or queues it when the device is offline.
    ///
    /// A call that fails without a response also marks the device offline
    /// and is queued. Backend rejections are returned as errors. While a
    /// replay pass is running the call waits for it, so older queued actions
    /// reach the backend first.
    pub async fn submit(&self, mutation: &Mutation) -> SyncResult<SubmitOutcome> {
        self.queue.wait_for_replay().await;

        if !self.monitor.is_online() {
            return self.defer(mutation).await;
        }

        match self.perform(mutation).await {
            Ok(body) => Ok(SubmitOutcome::Performed(body)),
            Err(err) if err.is_connectivity() => {
                info!(kind = %mutation.kind(), error = %err, "Backend unreachable, queueing");
                self.defer(mutation).await
            }
            Err(err) => Err(err),
        }
    }

    /// Sends `mutation` to the backend, bypassing the queue.
    pub async fn perform(&self, mutation: &Mutation) -> SyncResult<Value> {
        let path = Self::route(mutation);
        let body = mutation.to_payload()?;
        debug!(kind = %mutation.kind(), path = %path, "Performing mutation");
        self.post_json(&path, &body).await
    }

    async fn defer(&self, mutation: &Mutation) -> SyncResult<SubmitOutcome> {
        let action = mutation.to_action()?;
        self.queue.enqueue_action(action.clone()).await;
        Ok(SubmitOutcome::Queued(action))
    }

    /// Endpoint for a mutation.
    pub fn route(mutation: &Mutation) -> String {
        match mutation {
            Mutation::CreateSale(_) => endpoints::SALES.to_string(),
            Mutation::AdjustInventory(_) => endpoints::INVENTORY_ADJUST.to_string(),
            Mutation::UpdateCash(_) => endpoints::CASH_IN_HAND.to_string(),
            Mutation::CreateLoan(_) => endpoints::LOANS.to_string(),
            Mutation::CreateLoanPayment(p) => format!("{}/{}/payments", endpoints::LOANS, p.loan_id),
            Mutation::AddSaleToLoan(p) => format!("{}/{}/sales", endpoints::LOANS, p.loan_id),
        }
    }

    // =========================================================================
    // HTTP
    // =========================================================================

    fn url(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    async fn get_json(&self, path: &str) -> SyncResult<Value> {
        let result = async {
            let response = self.http.get(self.url(path)).send().await?;
            let response = Self::check_response(response).await?;
            Self::body_json(response).await
        }
        .await;
        self.observe(result)
    }

    async fn post_json(&self, path: &str, body: &Value) -> SyncResult<Value> {
        let result = async {
            let response = self.http.post(self.url(path)).json(body).send().await?;
            let response = Self::check_response(response).await?;
            Self::body_json(response).await
        }
        .await;
        self.observe(result)
    }

    /// Turns non-success statuses into `SyncError::Http` with the body text.
    async fn check_response(response: Response) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let body = if body.is_empty() {
            format!("API error: {}", status.as_u16())
        } else {
            body
        };
        Err(SyncError::Http {
            status: status.as_u16(),
            body,
        })
    }

    async fn body_json(response: Response) -> SyncResult<Value> {
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| SyncError::DeserializationFailed(e.to_string()))
    }

    fn observe<T>(&self, result: SyncResult<T>) -> SyncResult<T> {
        if let Err(ref err) = result {
            note_failure(&self.monitor, err);
        }
        result
    }
}

#[async_trait]
impl ActionDispatcher for ApiClient {
    async fn dispatch(&self, action: &QueuedAction) -> SyncResult<()> {
        let mutation = Mutation::from_action(action)?;
        self.perform(&mutation).await.map(|_| ())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Notify;
    use till_core::{ActionKind, CashUpdate, InventoryAdjustment, NewLoanPayment, PaymentMethod, SaleToLoan};
    use till_db::MemoryStore;

    type Log = Arc<Mutex<Vec<(String, Value)>>>;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn backend(log: Log) -> Router {
        Router::new()
            .route(
                "/api/products",
                get(|| async {
                    Json(json!([{
                        "id": "p-1",
                        "name": "Cola 330ml",
                        "barcode": "5449000000996",
                        "price": 1.25,
                        "stock": 24,
                        "lowStockThreshold": 5,
                        "category": "Drinks",
                        "createdAt": "2026-01-01T00:00:00Z",
                        "updatedAt": "2026-01-01T00:00:00Z"
                    }]))
                }),
            )
            .route(
                "/api/cash-in-hand",
                post(|State(log): State<Log>, Json(body): Json<Value>| async move {
                    log.lock().unwrap().push(("/api/cash-in-hand".into(), body));
                    StatusCode::NO_CONTENT
                }),
            )
            .route(
                "/api/inventory/adjust",
                post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "Unknown product") }),
            )
            .route(
                "/api/loans/{id}/payments",
                post(
                    |State(log): State<Log>, Path(id): Path<String>, Json(body): Json<Value>| async move {
                        log.lock()
                            .unwrap()
                            .push((format!("/api/loans/{id}/payments"), body));
                        Json(json!({ "id": "pay-1" }))
                    },
                ),
            )
            .with_state(log)
    }

    fn client_for(base_url: &str, online: bool) -> ApiClient {
        let mut config = ClientConfig::default();
        config.api.base_url = base_url.to_string();
        config.api.request_timeout_secs = 2;

        let store = Arc::new(MemoryStore::new());
        let monitor = ConnectivityMonitor::new(online);
        ApiClient::new(
            &config,
            monitor.clone(),
            ResponseCache::new(store.clone(), monitor),
            OfflineQueue::new(store),
        )
        .unwrap()
    }

    fn dead_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[test]
    fn test_routes() {
        let payment = Mutation::CreateLoanPayment(NewLoanPayment {
            loan_id: "loan-9".into(),
            amount: 10.0,
            payment_method: PaymentMethod::Cash,
            payment_date: "2026-10-17".into(),
            notes: None,
        });
        assert_eq!(ApiClient::route(&payment), "/api/loans/loan-9/payments");

        let link = Mutation::AddSaleToLoan(SaleToLoan {
            loan_id: "loan-9".into(),
            sale_id: "s-1".into(),
        });
        assert_eq!(ApiClient::route(&link), "/api/loans/loan-9/sales");
        assert_eq!(
            ApiClient::route(&Mutation::UpdateCash(CashUpdate::deposit(1.0, "float"))),
            "/api/cash-in-hand"
        );
    }

    #[tokio::test]
    async fn test_products_and_barcode_lookup() {
        let base = serve(backend(Log::default())).await;
        let client = client_for(&base, true);

        let products = client.products().await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].low_stock_threshold, 5);

        let found = client.find_product_by_barcode("5449000000996").await.unwrap();
        assert_eq!(found.map(|p| p.id).as_deref(), Some("p-1"));
        assert!(client.find_product_by_barcode("000").await.unwrap().is_none());

        assert!(client.cache().peek("/api/products").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_base_path_prefix_is_kept() {
        let log = Log::default();
        let base = serve(Router::new().nest("/pos", backend(log.clone()))).await;
        let client = client_for(&format!("{base}/pos/"), true);

        assert_eq!(client.products().await.unwrap().len(), 1);
        client
            .submit(&Mutation::UpdateCash(CashUpdate::deposit(3.0, "Float")))
            .await
            .unwrap();
        assert_eq!(log.lock().unwrap()[0].0, "/api/cash-in-hand");
        assert!(client.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_submit_online_performs() {
        let log = Log::default();
        let base = serve(backend(log.clone())).await;
        let client = client_for(&base, true);

        let outcome = client
            .submit(&Mutation::UpdateCash(CashUpdate::deposit(20.0, "Float")))
            .await
            .unwrap();

        assert_eq!(outcome, SubmitOutcome::Performed(Value::Null));
        assert_eq!(log.lock().unwrap()[0].1["type"], "deposit");
        assert!(client.queue().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_submit_waits_for_running_replay() {
        let log = Log::default();
        let arrived = Arc::new(Notify::new());
        let router = Router::new()
            .route(
                "/api/cash-in-hand",
                post(
                    |State((log, arrived)): State<(Log, Arc<Notify>)>, Json(body): Json<Value>| async move {
                        if body["reason"] == "Queued" {
                            arrived.notify_one();
                            tokio::time::sleep(Duration::from_millis(150)).await;
                        }
                        log.lock().unwrap().push(("/api/cash-in-hand".into(), body));
                        StatusCode::NO_CONTENT
                    },
                ),
            )
            .with_state((log.clone(), arrived.clone()));
        let base = serve(router).await;
        let client = client_for(&base, true);

        let queued = Mutation::UpdateCash(CashUpdate::deposit(1.0, "Queued"));
        client.queue().enqueue_action(queued.to_action().unwrap()).await;

        let replay = {
            let client = client.clone();
            tokio::spawn(async move { client.queue().replay(&client).await })
        };
        arrived.notified().await;

        let outcome = client
            .submit(&Mutation::UpdateCash(CashUpdate::deposit(2.0, "Live")))
            .await
            .unwrap();
        assert!(!outcome.is_queued());
        assert_eq!(replay.await.unwrap().succeeded, 1);

        let reasons: Vec<Value> = log.lock().unwrap().iter().map(|(_, body)| body["reason"].clone()).collect();
        assert_eq!(reasons, vec![json!("Queued"), json!("Live")]);
    }

    #[tokio::test]
    async fn test_rejection_is_returned_not_queued() {
        let base = serve(backend(Log::default())).await;
        let client = client_for(&base, true);

        let err = client
            .submit(&Mutation::AdjustInventory(InventoryAdjustment {
                product_id: "ghost".into(),
                quantity: 1,
                reason: "Recount".into(),
            }))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(422));
        assert!(err.to_string().contains("Unknown product"));
        assert!(client.queue().is_empty().await.unwrap());
        assert!(client.monitor().is_online());
    }

    #[tokio::test]
    async fn test_submit_offline_queues() {
        let client = client_for(&dead_url(), false);

        let outcome = client
            .submit(&Mutation::UpdateCash(CashUpdate::withdrawal(50.0, "Error correction")))
            .await
            .unwrap();

        assert!(outcome.is_queued());
        let pending = client.queue().pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, ActionKind::UpdateCash);
    }

    #[tokio::test]
    async fn test_unreachable_backend_queues_and_goes_offline() {
        let client = client_for(&dead_url(), true);

        let outcome = client
            .submit(&Mutation::UpdateCash(CashUpdate::deposit(5.0, "Tips")))
            .await
            .unwrap();

        assert!(outcome.is_queued());
        assert!(!client.monitor().is_online());
        assert_eq!(client.queue().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offline_read_serves_cache() {
        let base = serve(backend(Log::default())).await;
        let online = client_for(&base, true);
        online.products().await.unwrap();

        // Same stores, unreachable backend
        let offline = ApiClient {
            base_url: Url::parse(&dead_url()).unwrap(),
            ..online.clone()
        };
        offline.monitor().set_online(false);

        let products = offline.products().await.unwrap();
        assert_eq!(products[0].barcode, "5449000000996");
    }

    #[tokio::test]
    async fn test_dispatch_posts_loan_payment() {
        let log = Log::default();
        let base = serve(backend(log.clone())).await;
        let client = client_for(&base, true);

        let action = QueuedAction::new(
            ActionKind::CreateLoanPayment,
            json!({
                "loanId": "loan-3",
                "amount": 12.5,
                "paymentMethod": "card",
                "paymentDate": "2026-10-17"
            }),
        );
        client.dispatch(&action).await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log[0].0, "/api/loans/loan-3/payments");
        assert_eq!(log[0].1["amount"], 12.5);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_malformed_payload() {
        let client = client_for(&dead_url(), true);
        let action = QueuedAction::new(ActionKind::CreateSale, json!({"nope": true}));

        let err = client.dispatch(&action).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(_)));
        // Nothing was sent, so connectivity is untouched
        assert!(client.monitor().is_online());
    }
}
