//! Registry of running bill orchestrators.
//!
//! The host is the surface the gateway talks to: start an instance, send it
//! signals, query its live snapshot, or drive the awaited close update.
//! One logical instance exists per bill id; instances deregister themselves
//! when their event loop finishes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use billfold_billing::{Bill, Item};
use billfold_core::{BillId, RequestId};
use billfold_store::BillStore;

use crate::orchestrator::{BillCommand, BillOrchestrator, CloseError};

const COMMAND_BUFFER: usize = 64;

/// Asynchronous, fire-and-forget commands.
#[derive(Debug)]
pub enum BillSignal {
    AddLineItem(Item),
    RemoveLineItem(Item),
    CloseBill(RequestId),
    CloseWorkflow(RequestId),
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no running orchestrator for bill {0}")]
    NotRunning(BillId),

    #[error("an orchestrator for bill {0} is already running")]
    AlreadyRunning(BillId),

    #[error("orchestrator for bill {0} stopped accepting commands")]
    Stopped(BillId),

    #[error(transparent)]
    Close(#[from] CloseError),
}

/// Result of [`BillHost::describe`].
#[derive(Debug, Clone, Copy)]
pub struct InstanceStatus {
    pub running: bool,
}

struct Instance {
    commands: mpsc::Sender<BillCommand>,
    snapshot: watch::Receiver<Bill>,
}

struct HostInner {
    store: Arc<dyn BillStore>,
    instances: Mutex<HashMap<BillId, Instance>>,
}

#[derive(Clone)]
pub struct BillHost {
    inner: Arc<HostInner>,
}

impl BillHost {
    pub fn new(store: Arc<dyn BillStore>) -> Self {
        Self {
            inner: Arc::new(HostInner {
                store,
                instances: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Spawn a new orchestrator instance for `bill`, keyed by its id.
    ///
    /// Returns immediately; the boot protocol (including the durable
    /// open-bill insert) runs inside the instance.
    pub fn start(&self, bill: Bill) -> Result<(), HostError> {
        let id = bill.bill_id();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(bill.clone());

        {
            let mut instances = self.inner.instances.lock().unwrap();
            if instances.contains_key(&id) {
                return Err(HostError::AlreadyRunning(id));
            }
            instances.insert(
                id,
                Instance {
                    commands: command_tx,
                    snapshot: snapshot_rx,
                },
            );
        }

        let orchestrator =
            BillOrchestrator::new(bill, Arc::clone(&self.inner.store), command_rx, snapshot_tx);
        let registry = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            orchestrator.run().await;
            deregister(&registry, id);
        });

        debug!(bill_id = %id, "orchestrator instance registered");
        Ok(())
    }

    /// Enqueue a fire-and-forget signal for the bill's instance.
    pub async fn signal(&self, id: BillId, signal: BillSignal) -> Result<(), HostError> {
        let command = match signal {
            BillSignal::AddLineItem(item) => BillCommand::AddItem(item),
            BillSignal::RemoveLineItem(item) => BillCommand::RemoveItem(item),
            BillSignal::CloseBill(request_id) => BillCommand::Close {
                request_id,
                reply: None,
            },
            BillSignal::CloseWorkflow(request_id) => BillCommand::Teardown { request_id },
        };
        self.sender(id)?
            .send(command)
            .await
            .map_err(|_| HostError::Stopped(id))
    }

    /// Synchronous, non-mutating read of the live aggregate. Observes the
    /// snapshot published between handlers, never a torn state.
    pub fn query_bill(&self, id: BillId) -> Result<Bill, HostError> {
        let instances = self.inner.instances.lock().unwrap();
        let instance = instances.get(&id).ok_or(HostError::NotRunning(id))?;
        let snapshot = instance.snapshot.borrow().clone();
        Ok(snapshot)
    }

    /// Drive the close protocol and await the closed aggregate.
    pub async fn update_close(&self, id: BillId, request_id: RequestId) -> Result<Bill, HostError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender(id)?
            .send(BillCommand::Close {
                request_id,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| HostError::Stopped(id))?;

        match reply_rx.await {
            Ok(result) => result.map_err(HostError::Close),
            Err(_) => Err(HostError::Stopped(id)),
        }
    }

    pub fn describe(&self, id: BillId) -> InstanceStatus {
        let instances = self.inner.instances.lock().unwrap();
        let running = instances
            .get(&id)
            .map(|i| !i.commands.is_closed())
            .unwrap_or(false);
        InstanceStatus { running }
    }

    fn sender(&self, id: BillId) -> Result<mpsc::Sender<BillCommand>, HostError> {
        let instances = self.inner.instances.lock().unwrap();
        instances
            .get(&id)
            .map(|i| i.commands.clone())
            .ok_or(HostError::NotRunning(id))
    }
}

fn deregister(registry: &Weak<HostInner>, id: BillId) {
    if let Some(inner) = registry.upgrade() {
        inner.instances.lock().unwrap().remove(&id);
        debug!(bill_id = %id, "orchestrator instance deregistered");
    }
}
