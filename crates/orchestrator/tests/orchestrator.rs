//! Protocol tests for the bill orchestrator against the in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use billfold_billing::{Bill, BillStatus, Currency, Item, Money};
use billfold_core::{BillId, ItemId, RequestId, UserId};
use billfold_orchestrator::{BillHost, BillSignal, CloseError, HostError};
use billfold_store::{BillStore, MemoryBillStore, StoreError, StoreResult};

fn new_bill() -> Bill {
    Bill::new(UserId::new(), Currency::Usd)
}

fn usd_item(id: ItemId, quantity: i64, price: i64) -> Item {
    Item {
        id,
        quantity,
        description: "widget".to_string(),
        price_per_unit: Money::new(price, Currency::Usd),
    }
}

/// Poll until `predicate` holds; the orchestrator applies commands
/// asynchronously, so observable state trails the send.
async fn eventually<F: Fn() -> bool>(what: &str, predicate: F) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time: {what}");
}

async fn wait_until_booted<S: BillStore>(store: &S, id: BillId) {
    for _ in 0..200 {
        if store.get_open_bill(id).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("open bill never recorded for {id}");
}

#[tokio::test]
async fn boot_records_open_bill_and_answers_queries() {
    let store = Arc::new(MemoryBillStore::new());
    let host = BillHost::new(store.clone());

    let bill = new_bill();
    let id = bill.bill_id();
    host.start(bill).unwrap();

    wait_until_booted(&*store, id).await;
    assert!(host.describe(id).running);

    let snapshot = host.query_bill(id).unwrap();
    assert_eq!(snapshot.status(), BillStatus::Open);
    assert!(snapshot.items().is_empty());
}

#[tokio::test]
async fn starting_the_same_bill_twice_is_rejected() {
    let store = Arc::new(MemoryBillStore::new());
    let host = BillHost::new(store.clone());

    let bill = new_bill();
    host.start(bill.clone()).unwrap();
    let err = host.start(bill).unwrap_err();
    assert!(matches!(err, HostError::AlreadyRunning(_)));
}

#[tokio::test]
async fn signals_mutate_the_aggregate_in_order() {
    let store = Arc::new(MemoryBillStore::new());
    let host = BillHost::new(store.clone());

    let bill = new_bill();
    let id = bill.bill_id();
    host.start(bill).unwrap();
    wait_until_booted(&*store, id).await;

    let item_id = ItemId::new();
    host.signal(id, BillSignal::AddLineItem(usd_item(item_id, 1, 50)))
        .await
        .unwrap();
    host.signal(id, BillSignal::AddLineItem(usd_item(item_id, 3, 50)))
        .await
        .unwrap();

    eventually("item quantities merged", || {
        host.query_bill(id)
            .map(|b| b.items().len() == 1 && b.items()[0].quantity == 4)
            .unwrap_or(false)
    })
    .await;
    assert_eq!(host.query_bill(id).unwrap().total().amount, 200);

    host.signal(id, BillSignal::RemoveLineItem(usd_item(item_id, 4, 50)))
        .await
        .unwrap();
    eventually("item removed", || {
        host.query_bill(id)
            .map(|b| b.items().is_empty() && b.total().amount == 0)
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn rejected_mutations_are_swallowed_and_leave_state_intact() {
    let store = Arc::new(MemoryBillStore::new());
    let host = BillHost::new(store.clone());

    let bill = new_bill();
    let id = bill.bill_id();
    host.start(bill).unwrap();
    wait_until_booted(&*store, id).await;

    let item_id = ItemId::new();
    host.signal(id, BillSignal::AddLineItem(usd_item(item_id, 1, 50)))
        .await
        .unwrap();
    // Same id at a different price: rejected inside the handler, logged,
    // never surfaced to the caller.
    host.signal(id, BillSignal::AddLineItem(usd_item(item_id, 1, 60)))
        .await
        .unwrap();
    host.signal(id, BillSignal::RemoveLineItem(usd_item(item_id, 1, 60)))
        .await
        .unwrap();

    // A follow-up accepted command proves the loop survived the rejections.
    host.signal(id, BillSignal::AddLineItem(usd_item(ItemId::new(), 2, 10)))
        .await
        .unwrap();
    eventually("second item admitted", || {
        host.query_bill(id)
            .map(|b| b.items().len() == 2)
            .unwrap_or(false)
    })
    .await;

    let snapshot = host.query_bill(id).unwrap();
    assert_eq!(snapshot.items()[0].quantity, 1);
    assert_eq!(snapshot.total().amount, 70);
}

#[tokio::test]
async fn update_close_persists_the_bill_and_terminates_the_instance() {
    let store = Arc::new(MemoryBillStore::new());
    let host = BillHost::new(store.clone());

    let bill = new_bill();
    let id = bill.bill_id();
    host.start(bill).unwrap();
    wait_until_booted(&*store, id).await;

    host.signal(id, BillSignal::AddLineItem(usd_item(ItemId::new(), 2, 50)))
        .await
        .unwrap();

    let closed = host.update_close(id, RequestId::new()).await.unwrap();
    assert_eq!(closed.status(), BillStatus::Closed);
    assert_eq!(closed.total().amount, 100);
    assert!(closed.closed_at().is_some());

    let persisted = store.get_closed_bill(id).await.unwrap();
    assert_eq!(persisted.total().amount, 100);
    assert!(matches!(
        store.get_open_bill(id).await,
        Err(StoreError::NotFound)
    ));
    let items = store.get_closed_bill_items(id).await.unwrap();
    assert_eq!(items.len(), 1);

    eventually("instance deregistered", || !host.describe(id).running).await;
    assert!(matches!(
        host.update_close(id, RequestId::new()).await,
        Err(HostError::NotRunning(_))
    ));
}

#[tokio::test]
async fn close_signal_variant_also_closes_the_bill() {
    let store = Arc::new(MemoryBillStore::new());
    let host = BillHost::new(store.clone());

    let bill = new_bill();
    let id = bill.bill_id();
    host.start(bill).unwrap();
    wait_until_booted(&*store, id).await;

    host.signal(id, BillSignal::CloseBill(RequestId::new()))
        .await
        .unwrap();

    let mut persisted = false;
    for _ in 0..200 {
        if store.get_closed_bill(id).await.is_ok() {
            persisted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(persisted, "bill was never persisted as closed");
}

/// Store double: the close commits on the first call but the caller sees a
/// transient fault, so the retry replays the same request id.
struct FlakyCloseStore {
    inner: MemoryBillStore,
    failed_once: AtomicBool,
}

#[async_trait]
impl BillStore for FlakyCloseStore {
    async fn add_open_bill(&self, bill: &Bill, request_id: RequestId) -> StoreResult<()> {
        self.inner.add_open_bill(bill, request_id).await
    }

    async fn add_closed_bill(&self, bill: &Bill, request_id: RequestId) -> StoreResult<()> {
        let result = self.inner.add_closed_bill(bill, request_id).await;
        if result.is_ok() && !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "connection reset after commit".to_string(),
            ));
        }
        result
    }

    async fn get_open_bill(&self, id: BillId) -> StoreResult<Bill> {
        self.inner.get_open_bill(id).await
    }

    async fn get_closed_bill(&self, id: BillId) -> StoreResult<Bill> {
        self.inner.get_closed_bill(id).await
    }

    async fn get_closed_bill_request(&self, id: BillId) -> StoreResult<RequestId> {
        self.inner.get_closed_bill_request(id).await
    }

    async fn get_closed_bill_items(&self, id: BillId) -> StoreResult<Vec<Item>> {
        self.inner.get_closed_bill_items(id).await
    }
}

#[tokio::test]
async fn close_retry_replaying_its_own_request_id_succeeds() {
    let store = Arc::new(FlakyCloseStore {
        inner: MemoryBillStore::new(),
        failed_once: AtomicBool::new(false),
    });
    let host = BillHost::new(store.clone());

    let bill = new_bill();
    let id = bill.bill_id();
    host.start(bill).unwrap();
    wait_until_booted(&*store, id).await;

    // First attempt commits then reports a transient fault; the activity
    // retry hits the duplicate-request path and the close still succeeds.
    let closed = host.update_close(id, RequestId::new()).await.unwrap();
    assert_eq!(closed.status(), BillStatus::Closed);
    assert!(store.get_closed_bill(id).await.is_ok());
}

/// Store double whose close always rejects the input.
struct RejectingCloseStore {
    inner: MemoryBillStore,
}

#[async_trait]
impl BillStore for RejectingCloseStore {
    async fn add_open_bill(&self, bill: &Bill, request_id: RequestId) -> StoreResult<()> {
        self.inner.add_open_bill(bill, request_id).await
    }

    async fn add_closed_bill(&self, _bill: &Bill, _request_id: RequestId) -> StoreResult<()> {
        Err(StoreError::UserInput("duplicate key value".to_string()))
    }

    async fn get_open_bill(&self, id: BillId) -> StoreResult<Bill> {
        self.inner.get_open_bill(id).await
    }

    async fn get_closed_bill(&self, id: BillId) -> StoreResult<Bill> {
        self.inner.get_closed_bill(id).await
    }

    async fn get_closed_bill_request(&self, id: BillId) -> StoreResult<RequestId> {
        self.inner.get_closed_bill_request(id).await
    }

    async fn get_closed_bill_items(&self, id: BillId) -> StoreResult<Vec<Item>> {
        self.inner.get_closed_bill_items(id).await
    }
}

#[tokio::test]
async fn failed_close_reverts_the_bill_to_open() {
    let store = Arc::new(RejectingCloseStore {
        inner: MemoryBillStore::new(),
    });
    let host = BillHost::new(store.clone());

    let bill = new_bill();
    let id = bill.bill_id();
    host.start(bill).unwrap();
    wait_until_booted(&*store, id).await;

    let err = host.update_close(id, RequestId::new()).await.unwrap_err();
    assert!(matches!(err, HostError::Close(CloseError::Activity(_))));

    // Liveness preserved: the bill reverted to open and still accepts items.
    let snapshot = host.query_bill(id).unwrap();
    assert_eq!(snapshot.status(), BillStatus::Open);

    host.signal(id, BillSignal::AddLineItem(usd_item(ItemId::new(), 1, 25)))
        .await
        .unwrap();
    eventually("item admitted after failed close", || {
        host.query_bill(id)
            .map(|b| b.items().len() == 1)
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn premature_teardown_is_ignored() {
    let store = Arc::new(MemoryBillStore::new());
    let host = BillHost::new(store.clone());

    let bill = new_bill();
    let id = bill.bill_id();
    host.start(bill).unwrap();
    wait_until_booted(&*store, id).await;

    // A teardown hint for a bill that was never closed must not end the
    // loop; only a close may do that.
    host.signal(id, BillSignal::CloseWorkflow(RequestId::new()))
        .await
        .unwrap();

    // A command sequenced after the hint is still processed, proving the
    // instance ignored it and kept running.
    host.signal(id, BillSignal::AddLineItem(usd_item(ItemId::new(), 1, 40)))
        .await
        .unwrap();
    eventually("item admitted after ignored teardown", || {
        host.query_bill(id)
            .map(|b| b.items().len() == 1)
            .unwrap_or(false)
    })
    .await;
    assert!(host.describe(id).running);
    assert!(store.get_open_bill(id).await.is_ok());

    // A real close still persists the bill and terminates the instance.
    let closed = host.update_close(id, RequestId::new()).await.unwrap();
    assert_eq!(closed.status(), BillStatus::Closed);
    assert!(store.get_closed_bill(id).await.is_ok());
    eventually("instance gone after close", || !host.describe(id).running).await;
}
