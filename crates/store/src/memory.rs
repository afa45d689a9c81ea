//! In-memory bill store for dev and tests.
//!
//! Implements the same request-id contract as the Postgres store so the
//! orchestrator and gateway can be exercised without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use billfold_billing::{Bill, BillStatus, Item, Money};
use billfold_core::{BillId, RequestId};

use crate::error::{StoreError, StoreResult};
use crate::BillStore;

#[derive(Debug, Clone)]
struct OpenRow {
    bill: Bill,
    request_id: RequestId,
}

#[derive(Debug, Clone)]
struct ClosedRow {
    bill: Bill,
    items: Vec<Item>,
    request_id: RequestId,
}

#[derive(Debug, Default)]
pub struct MemoryBillStore {
    open: Mutex<HashMap<BillId, OpenRow>>,
    closed: Mutex<HashMap<BillId, ClosedRow>>,
}

impl MemoryBillStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillStore for MemoryBillStore {
    async fn add_open_bill(&self, bill: &Bill, request_id: RequestId) -> StoreResult<()> {
        let mut open = self.open.lock().unwrap();
        match open.get_mut(&bill.bill_id()) {
            // Same request replayed: leave the row as-is.
            Some(row) if row.request_id == request_id => {}
            Some(row) => {
                row.bill.touch(Utc::now());
            }
            None => {
                open.insert(
                    bill.bill_id(),
                    OpenRow {
                        bill: bill.clone(),
                        request_id,
                    },
                );
            }
        }
        Ok(())
    }

    async fn add_closed_bill(&self, bill: &Bill, request_id: RequestId) -> StoreResult<()> {
        if request_id.is_nil() {
            return Err(StoreError::InvalidRequest(
                "request id must not be nil".to_string(),
            ));
        }

        let mut closed = self.closed.lock().unwrap();
        if let Some(row) = closed.get(&bill.bill_id()) {
            if row.request_id == request_id {
                return Err(StoreError::DuplicateRequest);
            }
            return Err(StoreError::AlreadyClosed);
        }

        let mut persisted = bill.clone();
        persisted.finalize_close(Utc::now());
        closed.insert(
            bill.bill_id(),
            ClosedRow {
                items: persisted.items().to_vec(),
                bill: persisted,
                request_id,
            },
        );
        self.open.lock().unwrap().remove(&bill.bill_id());
        Ok(())
    }

    async fn get_open_bill(&self, id: BillId) -> StoreResult<Bill> {
        let open = self.open.lock().unwrap();
        let row = open.get(&id).ok_or(StoreError::NotFound)?;
        // Read paths return metadata only, matching the SQL store.
        Ok(Bill::from_parts(
            row.bill.bill_id(),
            row.bill.user_id(),
            Vec::new(),
            Money::zero(row.bill.currency()),
            BillStatus::Open,
            row.bill.created_at(),
            row.bill.updated_at(),
            None,
        ))
    }

    async fn get_closed_bill(&self, id: BillId) -> StoreResult<Bill> {
        let closed = self.closed.lock().unwrap();
        let row = closed.get(&id).ok_or(StoreError::NotFound)?;
        Ok(Bill::from_parts(
            row.bill.bill_id(),
            row.bill.user_id(),
            Vec::new(),
            row.bill.total(),
            BillStatus::Closed,
            row.bill.created_at(),
            row.bill.updated_at(),
            row.bill.closed_at(),
        ))
    }

    async fn get_closed_bill_request(&self, id: BillId) -> StoreResult<RequestId> {
        let closed = self.closed.lock().unwrap();
        let row = closed.get(&id).ok_or(StoreError::NotFound)?;
        Ok(row.request_id)
    }

    async fn get_closed_bill_items(&self, id: BillId) -> StoreResult<Vec<Item>> {
        let closed = self.closed.lock().unwrap();
        let row = closed.get(&id).ok_or(StoreError::NotFound)?;
        Ok(row.items.clone())
    }
}
