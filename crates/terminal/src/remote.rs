//! Remote order API: the port the POS writes orders through, plus the REST
//! adapter for the hosted backend and an in-memory fake for tests/dev.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};

use kade_core::{Money, OrderId, ProductId};
use kade_sales::{MenuItem, OrderLine, OrderStatus};

/// Order header row sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub total_amount: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Order line row sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    #[serde(rename = "menu_item_id")]
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(rename = "price_at_time")]
    pub unit_price: Money,
}

impl NewOrderItem {
    pub fn for_lines(order_id: OrderId, lines: &[OrderLine]) -> Vec<NewOrderItem> {
        lines
            .iter()
            .map(|line| NewOrderItem {
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect()
    }
}

/// The row the backend returns for a created order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub id: OrderId,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("client configuration error: {0}")]
    Config(String),
}

/// Failure of a remote order write.
pub type RemoteWriteError = RemoteError;

/// Where orders are written.
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, RemoteWriteError>;

    async fn create_order_items(&self, items: &[NewOrderItem]) -> Result<(), RemoteWriteError>;
}

/// REST adapter for the hosted backend (PostgREST conventions).
#[derive(Debug, Clone)]
pub struct RestOrderApi {
    client: reqwest::Client,
    base_url: String,
}

impl RestOrderApi {
    pub fn new(base_url: &str, api_key: &SecretString, timeout: Duration) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();

        let mut key = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|e| RemoteError::Config(format!("invalid API key: {e}")))?;
        key.set_sensitive(true);
        headers.insert("apikey", key);

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
            .map_err(|e| RemoteError::Config(format!("invalid API key: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Whether the backend answers at all. Any HTTP response counts.
    pub async fn health(&self) -> bool {
        let url = format!("{}/rest/v1/", self.base_url);
        self.client.get(&url).send().await.is_ok()
    }

    /// Available menu items, ordered by category.
    pub async fn fetch_menu(&self) -> Result<Vec<MenuItem>, RemoteError> {
        let resp = self
            .client
            .get(self.table_url("menu_items"))
            .query(&[("select", "*"), ("is_available", "eq.true"), ("order", "category.asc")])
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let resp = ensure_success(resp).await?;
        resp.json::<Vec<MenuItem>>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(RemoteError::Api {
        status: status.as_u16(),
        body: resp.text().await.unwrap_or_default(),
    })
}

#[async_trait]
impl OrderApi for RestOrderApi {
    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, RemoteWriteError> {
        let resp = self
            .client
            .post(self.table_url("orders"))
            .header("Prefer", "return=representation")
            .json(&[order])
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let resp = ensure_success(resp).await?;
        let mut rows: Vec<CreatedOrder> = resp
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        if rows.is_empty() {
            return Err(RemoteError::Decode("order insert returned no rows".into()));
        }
        Ok(rows.swap_remove(0))
    }

    async fn create_order_items(&self, items: &[NewOrderItem]) -> Result<(), RemoteWriteError> {
        let resp = self
            .client
            .post(self.table_url("order_items"))
            .header("Prefer", "return=minimal")
            .json(items)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        ensure_success(resp).await?;
        Ok(())
    }
}

/// A call received by [`InMemoryOrderApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    CreateOrder(NewOrder),
    CreateItems(Vec<NewOrderItem>),
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<ApiCall>,
    orders: Vec<(OrderId, NewOrder)>,
    items: Vec<NewOrderItem>,
    next_id: i64,
    create_order_calls: usize,
    create_items_calls: usize,
    fail_order_at: Vec<usize>,
    fail_items_at: Vec<usize>,
}

/// In-memory order API for tests/dev.
///
/// Records every call, assigns sequential ids and can be scripted to fail
/// specific calls or to hold `create_order` until released.
#[derive(Debug, Default)]
pub struct InMemoryOrderApi {
    state: Mutex<FakeState>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    entered: Notify,
}

impl InMemoryOrderApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th `create_order` call (1-based).
    pub fn fail_create_order_at(&self, n: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_order_at.push(n);
        }
    }

    /// Fail the `n`-th `create_order_items` call (1-based).
    pub fn fail_create_items_at(&self, n: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_items_at.push(n);
        }
    }

    /// Hold every `create_order` until permits are added to the returned
    /// semaphore.
    pub fn hold_create_order(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        if let Ok(mut slot) = self.gate.lock() {
            *slot = Some(gate.clone());
        }
        gate
    }

    /// Resolves once a `create_order` call has started.
    pub async fn create_order_started(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Orders committed so far, in commit order.
    pub fn orders(&self) -> Vec<(OrderId, NewOrder)> {
        self.state.lock().map(|s| s.orders.clone()).unwrap_or_default()
    }

    pub fn items(&self) -> Vec<NewOrderItem> {
        self.state.lock().map(|s| s.items.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, FakeState>, RemoteError> {
        self.state
            .lock()
            .map_err(|_| RemoteError::Network("fake api poisoned".into()))
    }
}

#[async_trait]
impl OrderApi for InMemoryOrderApi {
    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, RemoteWriteError> {
        self.entered.notify_one();
        let gate = self.gate.lock().ok().and_then(|g| g.clone());
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| RemoteError::Network("gate closed".into()))?;
            permit.forget();
        }

        let mut state = self.lock()?;
        state.calls.push(ApiCall::CreateOrder(order.clone()));
        state.create_order_calls += 1;
        let n = state.create_order_calls;

        if state.fail_order_at.contains(&n) {
            return Err(RemoteError::Network("connection reset".into()));
        }

        state.next_id += 1;
        let id = OrderId::new(state.next_id);
        state.orders.push((id, order.clone()));
        Ok(CreatedOrder { id })
    }

    async fn create_order_items(&self, items: &[NewOrderItem]) -> Result<(), RemoteWriteError> {
        let mut state = self.lock()?;
        state.calls.push(ApiCall::CreateItems(items.to_vec()));
        state.create_items_calls += 1;
        let n = state.create_items_calls;

        if state.fail_items_at.contains(&n) {
            return Err(RemoteError::Api {
                status: StatusCode::BAD_REQUEST.as_u16(),
                body: "insert violates foreign key".into(),
            });
        }

        state.items.extend_from_slice(items);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_payload_matches_backend_columns() {
        let order = NewOrder {
            total_amount: Money::from_units(200),
            status: OrderStatus::Pending,
            created_at: Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap(),
        };
        let json = serde_json::to_value([&order]).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "total_amount": "200",
                "status": "pending",
                "created_at": "2024-02-01T09:00:00Z"
            }])
        );
    }

    #[test]
    fn item_payload_uses_menu_item_columns() {
        let lines = vec![OrderLine::new(ProductId::new(1), "Rice", Money::from_units(100), 2)];
        let items = NewOrderItem::for_lines(OrderId::new(55), &lines);
        let json = serde_json::to_value(&items).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "order_id": 55,
                "menu_item_id": 1,
                "quantity": 2,
                "price_at_time": "100"
            }])
        );
    }

    #[test]
    fn created_order_decodes_representation() {
        let row: CreatedOrder =
            serde_json::from_str(r#"{"id":12,"total_amount":200,"status":"pending","created_at":"2024-02-01T09:00:00+00:00"}"#)
                .unwrap();
        assert_eq!(row.id, OrderId::new(12));
    }

    #[test]
    fn rest_client_normalizes_base_url() {
        let api = RestOrderApi::new(
            "https://example.supabase.co/",
            &SecretString::from("anon-key"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(api.base_url(), "https://example.supabase.co");
        assert_eq!(api.table_url("orders"), "https://example.supabase.co/rest/v1/orders");
    }

    #[tokio::test]
    async fn fake_fails_scripted_calls_only() {
        let api = InMemoryOrderApi::new();
        api.fail_create_order_at(2);
        let order = NewOrder {
            total_amount: Money::from_units(1),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        };

        assert!(api.create_order(&order).await.is_ok());
        assert!(api.create_order(&order).await.is_err());
        assert!(api.create_order(&order).await.is_ok());
        assert_eq!(api.orders().len(), 2);
        assert_eq!(api.calls().len(), 3);
    }
}
