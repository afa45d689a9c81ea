//! Request/response bodies and their validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billfold_billing::{Bill, BillStatus, Currency, Item, Money};
use billfold_core::{DomainError, DomainResult, ItemId, RequestId, UserId};

#[derive(Debug, Deserialize)]
pub struct CreateBillRequest {
    pub user_id: String,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct CreateBillResponse {
    pub id: String,
    pub user_id: String,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    pub status: BillStatus,
}

pub fn validate_create_bill(req: &CreateBillRequest) -> DomainResult<(UserId, Currency)> {
    let user_id: UserId = req.user_id.parse()?;
    let currency: Currency = req.currency.parse()?;
    Ok((user_id, currency))
}

/// Money as received from clients: the currency arrives as free text and is
/// validated against the allow-set before it becomes a domain value.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestMoney {
    pub amount: i64,
    pub currency: String,
}

/// Shared body for the add and remove line-item operations.
#[derive(Debug, Deserialize)]
pub struct LineItemRequest {
    pub id: String,
    pub quantity: i64,
    pub description: String,
    pub price_per_unit: RequestMoney,
}

pub fn validate_line_item(req: &LineItemRequest) -> DomainResult<Item> {
    let id: ItemId = req.id.parse()?;
    if req.quantity < 1 {
        return Err(DomainError::validation(format!(
            "invalid item quantity: {}",
            req.quantity
        )));
    }
    if req.price_per_unit.amount < 0 {
        return Err(DomainError::validation(format!(
            "invalid price: {}",
            req.price_per_unit.amount
        )));
    }
    let currency: Currency = req.price_per_unit.currency.parse()?;

    Ok(Item {
        id,
        quantity: req.quantity,
        description: req.description.clone(),
        price_per_unit: Money::new(req.price_per_unit.amount, currency),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseBillRequest {
    /// Callers that want idempotency supply a stable value; when omitted the
    /// gateway mints a fresh one.
    pub request_id: Option<String>,
}

pub fn validate_close_bill(req: &CloseBillRequest) -> DomainResult<RequestId> {
    match &req.request_id {
        Some(raw) => raw.parse(),
        None => Ok(RequestId::new()),
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBillResponse {
    pub id: String,
    pub items: Vec<Item>,
    pub total: Money,
    pub status: BillStatus,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CloseBillResponse {
    pub bill: GetBillResponse,
    pub status: &'static str,
}

pub fn bill_to_response(bill: &Bill) -> GetBillResponse {
    GetBillResponse {
        id: bill.bill_id().to_string(),
        items: bill.items().to_vec(),
        total: bill.total(),
        status: bill.status(),
        user_id: bill.user_id().to_string(),
        created_at: bill.created_at(),
        updated_at: bill.updated_at(),
    }
}

/// A closed bill reconstructed from its persisted row and item lines.
pub fn closed_bill_to_response(bill: &Bill, items: Vec<Item>) -> GetBillResponse {
    let mut response = bill_to_response(bill);
    response.items = items;
    response
}
