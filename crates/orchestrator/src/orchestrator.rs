//! The per-bill orchestrator: a long-running state machine owning one bill's
//! live aggregate.
//!
//! Commands from signals and updates are sequenced into a single serial
//! stream, so at most one handler runs at a time and the aggregate needs no
//! locking. Queries are served from a snapshot published between handlers,
//! never from mid-handler state.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use billfold_billing::{Bill, BillStatus, Item};
use billfold_core::RequestId;
use billfold_store::BillStore;

use crate::activity::{self, ActivityError};

/// A command consumed by the event loop. Signal-delivered commands carry no
/// reply channel; update-delivered commands do.
#[derive(Debug)]
pub enum BillCommand {
    AddItem(Item),
    RemoveItem(Item),
    Close {
        request_id: RequestId,
        reply: Option<oneshot::Sender<Result<Bill, CloseError>>>,
    },
    /// Teardown hint sent by the gateway after it observed a successful
    /// close. Honored only once the bill is closed; a premature hint is
    /// ignored, since only a close may end the event loop.
    Teardown { request_id: RequestId },
}

/// Failure of a close attempt, surfaced to the update caller.
#[derive(Debug, Error)]
pub enum CloseError {
    #[error("bill already closed")]
    AlreadyClosed,

    #[error("bill is in the middle of closing")]
    Closing,

    #[error(transparent)]
    Activity(#[from] ActivityError),
}

pub struct BillOrchestrator {
    bill: Bill,
    store: Arc<dyn BillStore>,
    commands: mpsc::Receiver<BillCommand>,
    snapshot: watch::Sender<Bill>,
}

impl BillOrchestrator {
    pub fn new(
        bill: Bill,
        store: Arc<dyn BillStore>,
        commands: mpsc::Receiver<BillCommand>,
        snapshot: watch::Sender<Bill>,
    ) -> Self {
        Self {
            bill,
            store,
            commands,
            snapshot,
        }
    }

    /// Boot, then process commands one at a time until the bill is closed.
    pub async fn run(mut self) {
        let bill_id = self.bill.bill_id();

        // Boot protocol: stamp timestamps, then durably record the open bill
        // before accepting any event. A terminal failure here fails the
        // orchestrator and nothing else has happened.
        self.bill.stamp_created(Utc::now());
        let boot_request = RequestId::new();
        let store = Arc::clone(&self.store);
        let boot_bill = self.bill.clone();
        let booted = activity::execute(&activity::open_bill_options(), "add_open_bill", move || {
            let store = Arc::clone(&store);
            let bill = boot_bill.clone();
            async move { store.add_open_bill(&bill, boot_request).await }
        })
        .await;
        if let Err(err) = booted {
            error!(bill_id = %bill_id, error = %err, "failed to record open bill, orchestrator aborting");
            return;
        }

        let _ = self.snapshot.send(self.bill.clone());
        info!(bill_id = %bill_id, "bill orchestrator started");

        while self.bill.status() != BillStatus::Closed {
            let Some(command) = self.commands.recv().await else {
                warn!(bill_id = %bill_id, "command channel dropped before close, orchestrator stopping");
                break;
            };
            self.handle(command).await;
            let _ = self.snapshot.send(self.bill.clone());
        }

        info!(bill_id = %bill_id, "bill orchestrator finished");
    }

    async fn handle(&mut self, command: BillCommand) {
        match command {
            BillCommand::AddItem(item) => {
                // Domain rejections are reported via logs, not as failures:
                // the client already got its acknowledgment at the gateway.
                match self.bill.add_item(item) {
                    Ok(()) => self.bill.touch(Utc::now()),
                    Err(err) => {
                        warn!(bill_id = %self.bill.bill_id(), error = %err, "add line item rejected")
                    }
                }
            }
            BillCommand::RemoveItem(item) => match self.bill.remove_item(&item) {
                Ok(()) => self.bill.touch(Utc::now()),
                Err(err) => {
                    warn!(bill_id = %self.bill.bill_id(), error = %err, "remove line item rejected")
                }
            },
            BillCommand::Close { request_id, reply } => {
                let result = self.handle_close(request_id).await;
                match reply {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => {
                        if let Err(err) = result {
                            error!(bill_id = %self.bill.bill_id(), error = %err, "close signal failed");
                        }
                    }
                }
            }
            BillCommand::Teardown { request_id } => {
                // The hint never drives the state machine; an unclosed bill
                // keeps its loop and its open_bills row.
                if self.bill.status() == BillStatus::Closed {
                    info!(
                        bill_id = %self.bill.bill_id(),
                        request_id = %request_id,
                        "teardown acknowledged, finishing instance"
                    );
                } else {
                    warn!(
                        bill_id = %self.bill.bill_id(),
                        request_id = %request_id,
                        "teardown received before close completed, ignoring"
                    );
                }
            }
        }
    }

    /// The two-phase close: open -> closing -> closed, reverting to open on
    /// any terminal failure so the bill stays live.
    async fn handle_close(&mut self, request_id: RequestId) -> Result<Bill, CloseError> {
        if self.bill.begin_close(Utc::now()).is_err() {
            return Err(match self.bill.status() {
                BillStatus::Closed => CloseError::AlreadyClosed,
                _ => CloseError::Closing,
            });
        }
        self.bill.recompute_total();

        let store = Arc::clone(&self.store);
        let closing_bill = self.bill.clone();
        let result = activity::execute(
            &activity::close_bill_options(),
            "add_closed_bill",
            move || {
                let store = Arc::clone(&store);
                let bill = closing_bill.clone();
                async move { store.add_closed_bill(&bill, request_id).await }
            },
        )
        .await;

        match result {
            Ok(()) => {}
            // A replayed close already persisted this artifact; finalize the
            // same way the first request did.
            Err(ActivityError::DuplicateRequest) => {
                warn!(bill_id = %self.bill.bill_id(), request_id = %request_id, "duplicate close request, treating as success");
            }
            Err(err) => {
                error!(bill_id = %self.bill.bill_id(), request_id = %request_id, error = %err, "close failed, reverting bill to open");
                self.bill.revert_close(Utc::now());
                return Err(CloseError::Activity(err));
            }
        }

        self.bill.finalize_close(Utc::now());
        info!(bill_id = %self.bill.bill_id(), "bill saved as closed");
        Ok(self.bill.clone())
    }
}
