//! Durable persistence for open and closed bills.
//!
//! Two write paths (`add_open_bill`, `add_closed_bill`) and three point
//! reads, all transactional. Writes are keyed by a caller-supplied
//! `RequestId` so that retries are safe: replaying a completed write is a
//! no-op, and a close that lost the race to a different request fails
//! deterministically.

pub mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use billfold_billing::{Bill, Item};
use billfold_core::{BillId, RequestId};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryBillStore;
pub use postgres::PgBillStore;

/// Persistence seam consumed by the orchestrator's activities and by the
/// gateway's read paths.
#[async_trait]
pub trait BillStore: Send + Sync {
    /// Upsert into `open_bills`, gated on `request_id`: replaying the same
    /// request leaves the row untouched.
    async fn add_open_bill(&self, bill: &Bill, request_id: RequestId) -> StoreResult<()>;

    /// Atomically persist the closed artifact: insert into `closed_bills`,
    /// upsert every line into `closed_bill_items`, delete the `open_bills`
    /// row. Replaying the completing request yields
    /// [`StoreError::DuplicateRequest`]; any other request against an
    /// already-closed bill yields [`StoreError::AlreadyClosed`] without
    /// modifying storage.
    async fn add_closed_bill(&self, bill: &Bill, request_id: RequestId) -> StoreResult<()>;

    /// Point read of `open_bills`. Items are not persisted while a bill is
    /// live, so the returned aggregate carries metadata only.
    async fn get_open_bill(&self, id: BillId) -> StoreResult<Bill>;

    /// Point read of `closed_bills`.
    async fn get_closed_bill(&self, id: BillId) -> StoreResult<Bill>;

    /// The request id that completed a bill's close. Lets callers recognize
    /// an idempotent replay after the bill's orchestrator has terminated.
    async fn get_closed_bill_request(&self, id: BillId) -> StoreResult<RequestId>;

    /// All persisted lines of a closed bill.
    async fn get_closed_bill_items(&self, id: BillId) -> StoreResult<Vec<Item>>;
}
