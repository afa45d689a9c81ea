//! The bill aggregate: a user-scoped collection of line items with a running
//! total and an open/closing/closed lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billfold_core::{AggregateRoot, BillId, DomainError, DomainResult, Entity, ItemId, UserId};

use crate::money::{Currency, MinorUnit, Money};

/// Bill status lifecycle. Monotonic along open -> closing -> closed, except
/// that a failed close reverts closing back to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Open,
    Closing,
    Closed,
}

impl BillStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BillStatus::Open => "open",
            BillStatus::Closing => "closing",
            BillStatus::Closed => "closed",
        }
    }
}

impl core::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for BillStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            "open" => Ok(BillStatus::Open),
            "closing" => Ok(BillStatus::Closing),
            "closed" => Ok(BillStatus::Closed),
            other => Err(DomainError::validation(format!(
                "invalid bill status: {other}"
            ))),
        }
    }
}

/// A line item. `price_per_unit` is immutable once admitted; re-adding the
/// same id at a different price is rejected (clients must mint a new id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub quantity: i64,
    pub description: String,
    pub price_per_unit: Money,
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Aggregate root: Bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    id: BillId,
    user_id: UserId,
    items: Vec<Item>,
    total: Money,
    status: BillStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Bill {
    /// Create a new open bill with a freshly minted time-ordered id.
    pub fn new(user_id: UserId, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: BillId::new(),
            user_id,
            items: Vec::new(),
            total: Money::zero(currency),
            status: BillStatus::Open,
            created_at: now,
            updated_at: now,
            closed_at: None,
            version: 0,
        }
    }

    /// Reconstruct a bill from persisted state (store read paths).
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: BillId,
        user_id: UserId,
        items: Vec<Item>,
        total: Money,
        status: BillStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        closed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            user_id,
            items,
            total,
            status,
            created_at,
            updated_at,
            closed_at,
            version: 0,
        }
    }

    pub fn bill_id(&self) -> BillId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn currency(&self) -> Currency {
        self.total.currency
    }

    pub fn status(&self) -> BillStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, BillStatus::Open)
    }

    /// Stamp creation/update times. Used by the orchestrator boot protocol.
    pub fn stamp_created(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
    }

    /// Add a line item.
    ///
    /// Merges quantities when the id is already present (prices must match),
    /// appends otherwise, then recomputes the total. All checks run before
    /// any mutation, so a rejected add leaves the aggregate untouched.
    pub fn add_item(&mut self, item: Item) -> DomainResult<()> {
        if !self.is_open() {
            return Err(DomainError::invariant("bill is no longer open"));
        }
        if item.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if let Some(existing) = self.items.iter_mut().find(|i| i.id == item.id) {
            if existing.price_per_unit != item.price_per_unit {
                return Err(DomainError::conflict(
                    "price of item has changed, mint a new item id",
                ));
            }
            existing.quantity += item.quantity;
        } else {
            self.items.push(item);
        }
        self.recompute_total();
        self.version += 1;
        Ok(())
    }

    /// Remove quantity from a line item, deleting it when it reaches zero or
    /// below. The item must exist at the same price.
    pub fn remove_item(&mut self, item: &Item) -> DomainResult<()> {
        if !self.is_open() {
            return Err(DomainError::invariant("bill is no longer open"));
        }
        let idx = self
            .items
            .iter()
            .position(|i| i.id == item.id)
            .ok_or_else(DomainError::not_found)?;
        if self.items[idx].price_per_unit != item.price_per_unit {
            return Err(DomainError::conflict(
                "price of item has changed, mint a new item id",
            ));
        }
        self.items[idx].quantity -= item.quantity;
        if self.items[idx].quantity <= 0 {
            self.items.remove(idx);
        }
        self.recompute_total();
        self.version += 1;
        Ok(())
    }

    /// Sum all lines converted into the bill currency.
    pub fn calculate_total(&self) -> Money {
        let currency = self.total.currency;
        let amount: MinorUnit = self
            .items
            .iter()
            .map(|i| i.price_per_unit.convert_to(currency).amount * i.quantity)
            .sum();
        Money::new(amount, currency)
    }

    /// Recompute and store the running total from the full item list.
    pub fn recompute_total(&mut self) {
        self.total = self.calculate_total();
    }

    /// Transition open -> closing. Rejected in any other state.
    pub fn begin_close(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            BillStatus::Open => {
                self.status = BillStatus::Closing;
                self.updated_at = now;
                self.version += 1;
                Ok(())
            }
            BillStatus::Closing => Err(DomainError::conflict("bill is in the middle of closing")),
            BillStatus::Closed => Err(DomainError::conflict("bill already closed")),
        }
    }

    /// Revert closing -> open after a failed close. No-op in other states;
    /// a closed bill never moves backward.
    pub fn revert_close(&mut self, now: DateTime<Utc>) {
        if self.status == BillStatus::Closing {
            self.status = BillStatus::Open;
            self.updated_at = now;
            self.version += 1;
        }
    }

    /// Finalize closing -> closed. The terminal transition.
    pub fn finalize_close(&mut self, now: DateTime<Utc>) {
        if self.status != BillStatus::Closed {
            self.status = BillStatus::Closed;
            self.updated_at = now;
            self.closed_at = Some(now);
            self.version += 1;
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl AggregateRoot for Bill {
    type Id = BillId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
