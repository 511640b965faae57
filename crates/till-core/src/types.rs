//! # Domain Types
//!
//! Types shared by the queue, the cache and the backend client.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐      ┌──────────────────────────────────────────┐  │
//! │  │  QueuedAction   │      │  Mutation (typed view of an action)      │  │
//! │  │  ─────────────  │      │  ──────────────────────────────────────  │  │
//! │  │  id             │◄────►│  CreateSale(NewSale)                     │  │
//! │  │  kind (type)    │      │  AdjustInventory(InventoryAdjustment)    │  │
//! │  │  payload (data) │      │  UpdateCash(CashUpdate)                  │  │
//! │  │  enqueued_at    │      │  CreateLoan(NewLoan)                     │  │
//! │  └─────────────────┘      │  CreateLoanPayment(NewLoanPayment)       │  │
//! │                           │  AddSaleToLoan(SaleToLoan)               │  │
//! │                           └──────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Read models: Product, CashInHand                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Payloads are camelCase JSON, the shape the backend accepts. A queued
//! action is stored as `{ "id", "type", "data", "timestamp" }` so the list
//! stays readable by the web front-end that shares the same store.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Action Kind
// =============================================================================

/// The mutating backend operations that may be deferred while offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    CreateSale,
    AdjustInventory,
    UpdateCash,
    CreateLoan,
    CreateLoanPayment,
    AddSaleToLoan,
}

impl ActionKind {
    /// Every kind, in declaration order.
    pub const ALL: [ActionKind; 6] = [
        ActionKind::CreateSale,
        ActionKind::AdjustInventory,
        ActionKind::UpdateCash,
        ActionKind::CreateLoan,
        ActionKind::CreateLoanPayment,
        ActionKind::AddSaleToLoan,
    ];

    /// The stored type tag.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateSale => "CREATE_SALE",
            ActionKind::AdjustInventory => "ADJUST_INVENTORY",
            ActionKind::UpdateCash => "UPDATE_CASH",
            ActionKind::CreateLoan => "CREATE_LOAN",
            ActionKind::CreateLoanPayment => "CREATE_LOAN_PAYMENT",
            ActionKind::AddSaleToLoan => "ADD_SALE_TO_LOAN",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownActionKind(s.to_string()))
    }
}

// =============================================================================
// Queued Action
// =============================================================================

/// One mutating operation deferred because the device was offline.
///
/// The payload is opaque here; [`Mutation::from_action`] gives it a type.
/// `enqueued_at` is diagnostic only: replay order is list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueuedAction {
    /// Random identifier for logs and the failure record.
    #[serde(default = "new_action_id")]
    pub id: String,

    #[serde(rename = "type")]
    pub kind: ActionKind,

    #[serde(rename = "data")]
    pub payload: serde_json::Value,

    #[serde(rename = "timestamp")]
    #[ts(as = "String")]
    pub enqueued_at: DateTime<Utc>,
}

fn new_action_id() -> String {
    Uuid::new_v4().to_string()
}

impl QueuedAction {
    /// Creates an action stamped with a fresh id and the current time.
    pub fn new(kind: ActionKind, payload: serde_json::Value) -> Self {
        QueuedAction {
            id: new_action_id(),
            kind,
            payload,
            enqueued_at: Utc::now(),
        }
    }
}

/// A queued action that was dropped after its replay failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FailedAction {
    pub action: QueuedAction,
    pub error: String,
    #[ts(as = "String")]
    pub failed_at: DateTime<Utc>,
}

// =============================================================================
// Sale
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Digital,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    #[default]
    Completed,
    Pending,
    Cancelled,
}

/// A line of a sale being created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewSaleItem {
    pub product_id: String,
    pub quantity: i64,
    /// Unit price at the time of sale.
    pub price: f64,
    pub discount: f64,
    pub total: f64,
}

/// A sale as submitted at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewSale {
    pub invoice_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub items: Vec<NewSaleItem>,
    pub subtotal: f64,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub status: SaleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// =============================================================================
// Inventory
// =============================================================================

/// A stock correction; `quantity` is signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAdjustment {
    pub product_id: String,
    pub quantity: i64,
    pub reason: String,
}

// =============================================================================
// Cash Drawer
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum CashTransactionType {
    Deposit,
    Withdrawal,
}

/// Money put into or taken out of the drawer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashUpdate {
    pub amount: f64,
    #[serde(rename = "type")]
    pub transaction_type: CashTransactionType,
    pub reason: String,
}

impl CashUpdate {
    pub fn deposit(amount: f64, reason: impl Into<String>) -> Self {
        CashUpdate {
            amount,
            transaction_type: CashTransactionType::Deposit,
            reason: reason.into(),
        }
    }

    pub fn withdrawal(amount: f64, reason: impl Into<String>) -> Self {
        CashUpdate {
            amount,
            transaction_type: CashTransactionType::Withdrawal,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Customer Loans
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    /// Single repayment on the due date.
    Once,
}

impl InstallmentFrequency {
    /// Installment that pays `amount` off in roughly one month, to the cent.
    pub fn suggested_installment(&self, amount: f64) -> f64 {
        let installment = match self {
            InstallmentFrequency::Daily => amount / 30.0,
            InstallmentFrequency::Weekly => amount / 4.0,
            InstallmentFrequency::Monthly | InstallmentFrequency::Once => amount,
        };
        (installment * 100.0).round() / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    #[default]
    Active,
    Paid,
    Defaulted,
}

/// Store credit extended to a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewLoan {
    pub customer_id: String,
    pub amount: f64,
    pub remaining_amount: f64,
    /// ISO date (`2026-11-30`).
    pub due_date: String,
    pub installment_frequency: InstallmentFrequency,
    pub installment_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: LoanStatus,
}

impl NewLoan {
    /// A fresh active loan with the whole amount outstanding.
    pub fn new(
        customer_id: impl Into<String>,
        amount: f64,
        due_date: impl Into<String>,
        installment_frequency: InstallmentFrequency,
    ) -> Self {
        NewLoan {
            customer_id: customer_id.into(),
            amount,
            remaining_amount: amount,
            due_date: due_date.into(),
            installment_frequency,
            installment_amount: installment_frequency.suggested_installment(amount),
            notes: None,
            status: LoanStatus::Active,
        }
    }
}

/// A repayment against a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewLoanPayment {
    pub loan_id: String,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    /// ISO date (`2026-10-17`).
    pub payment_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Charges an existing sale to a customer's loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleToLoan {
    pub loan_id: String,
    pub sale_id: String,
}

// =============================================================================
// Mutation
// =============================================================================

/// A mutating backend operation with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateSale(NewSale),
    AdjustInventory(InventoryAdjustment),
    UpdateCash(CashUpdate),
    CreateLoan(NewLoan),
    CreateLoanPayment(NewLoanPayment),
    AddSaleToLoan(SaleToLoan),
}

impl Mutation {
    pub fn kind(&self) -> ActionKind {
        match self {
            Mutation::CreateSale(_) => ActionKind::CreateSale,
            Mutation::AdjustInventory(_) => ActionKind::AdjustInventory,
            Mutation::UpdateCash(_) => ActionKind::UpdateCash,
            Mutation::CreateLoan(_) => ActionKind::CreateLoan,
            Mutation::CreateLoanPayment(_) => ActionKind::CreateLoanPayment,
            Mutation::AddSaleToLoan(_) => ActionKind::AddSaleToLoan,
        }
    }

    /// The payload as the JSON body the backend expects.
    pub fn to_payload(&self) -> CoreResult<serde_json::Value> {
        let value = match self {
            Mutation::CreateSale(p) => serde_json::to_value(p)?,
            Mutation::AdjustInventory(p) => serde_json::to_value(p)?,
            Mutation::UpdateCash(p) => serde_json::to_value(p)?,
            Mutation::CreateLoan(p) => serde_json::to_value(p)?,
            Mutation::CreateLoanPayment(p) => serde_json::to_value(p)?,
            Mutation::AddSaleToLoan(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Wraps this mutation into a fresh queued action.
    pub fn to_action(&self) -> CoreResult<QueuedAction> {
        Ok(QueuedAction::new(self.kind(), self.to_payload()?))
    }

    /// Decodes a queued action's payload according to its kind.
    pub fn from_action(action: &QueuedAction) -> CoreResult<Self> {
        let payload = &action.payload;
        let mutation = match action.kind {
            ActionKind::CreateSale => Mutation::CreateSale(decode(action.kind, payload)?),
            ActionKind::AdjustInventory => {
                Mutation::AdjustInventory(decode(action.kind, payload)?)
            }
            ActionKind::UpdateCash => Mutation::UpdateCash(decode(action.kind, payload)?),
            ActionKind::CreateLoan => Mutation::CreateLoan(decode(action.kind, payload)?),
            ActionKind::CreateLoanPayment => {
                Mutation::CreateLoanPayment(decode(action.kind, payload)?)
            }
            ActionKind::AddSaleToLoan => Mutation::AddSaleToLoan(decode(action.kind, payload)?),
        };
        Ok(mutation)
    }
}

fn decode<T: DeserializeOwned>(kind: ActionKind, payload: &serde_json::Value) -> CoreResult<T> {
    T::deserialize(payload).map_err(|e| CoreError::InvalidPayload {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Read Models
// =============================================================================

/// A catalog product as served by `/api/products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub barcode: String,
    pub price: f64,
    pub stock: i64,
    pub low_stock_threshold: i64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Product {
    /// Checks whether `quantity` units can leave the shelf.
    pub fn can_sell(&self, quantity: i64) -> bool {
        quantity > 0 && self.stock >= quantity
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.low_stock_threshold
    }
}

/// Current drawer balance as served by `/api/cash-in-hand`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CashInHand {
    pub amount: f64,
    pub last_updated: String,
}

// =============================================================================
// Unit Tests
// =============================================================================
