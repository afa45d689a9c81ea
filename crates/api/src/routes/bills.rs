//! Bill routes: create, read, mutate line items, close.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use billfold_billing::Bill;
use billfold_core::{BillId, RequestId};
use billfold_orchestrator::BillSignal;
use billfold_store::StoreError;

use crate::app::AppServices;
use crate::dto;
use crate::errors;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_bill))
        .route("/:id", get(get_bill).patch(close_bill))
        .route("/:id/items", post(add_line_item).patch(remove_line_item))
}

/// POST /bills: mint a bill and start its orchestrator instance. Returns
/// immediately; the durable open-bill insert happens inside the instance.
pub async fn create_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateBillRequest>,
) -> axum::response::Response {
    let (user_id, currency) = match dto::validate_create_bill(&body) {
        Ok(v) => v,
        Err(e) => return errors::validation_error_to_response(e),
    };

    let bill = Bill::new(user_id, currency);
    let response = dto::CreateBillResponse {
        id: bill.bill_id().to_string(),
        user_id: user_id.to_string(),
        currency,
        created_at: bill.created_at(),
        status: bill.status(),
    };

    if let Err(e) = services.host().start(bill) {
        return errors::host_error_to_response(e);
    }

    (StatusCode::CREATED, Json(response)).into_response()
}

/// GET /bills/{id}: cache, then the live instance, then the closed tables.
pub async fn get_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: BillId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::validation_error_to_response(e),
    };

    if let Some(cached) = services.cache().get(id).await {
        return (StatusCode::OK, Json(cached)).into_response();
    }

    match services.store().get_open_bill(id).await {
        Ok(_) => {
            // Live bill: the orchestrator owns the authoritative state.
            if services.host().describe(id).running {
                if let Ok(bill) = services.host().query_bill(id) {
                    let response = dto::bill_to_response(&bill);
                    services.cache().put(id, response.clone()).await;
                    return (StatusCode::OK, Json(response)).into_response();
                }
            }
            // Open row without a live instance: the close may just have
            // finished; fall through to the closed tables.
        }
        Err(StoreError::NotFound) => {}
        Err(other) => return errors::store_error_to_response(other),
    }

    let closed = match services.store().get_closed_bill(id).await {
        Ok(bill) => bill,
        Err(e) => return errors::store_error_to_response(e),
    };
    let items = match services.store().get_closed_bill_items(id).await {
        Ok(items) => items,
        Err(e) => return errors::store_error_to_response(e),
    };

    let response = dto::closed_bill_to_response(&closed, items);
    services.cache().put(id, response.clone()).await;
    (StatusCode::OK, Json(response)).into_response()
}

/// POST /bills/{id}/items: fire-and-forget add. The client gets an
/// acknowledgment; domain rejections surface in the orchestrator's logs.
pub async fn add_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::LineItemRequest>,
) -> axum::response::Response {
    line_item_command(services, &id, &body, true).await
}

/// PATCH /bills/{id}/items: fire-and-forget remove.
pub async fn remove_line_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::LineItemRequest>,
) -> axum::response::Response {
    line_item_command(services, &id, &body, false).await
}

async fn line_item_command(
    services: Arc<AppServices>,
    id: &str,
    body: &dto::LineItemRequest,
    add: bool,
) -> axum::response::Response {
    let id: BillId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::validation_error_to_response(e),
    };
    let item = match dto::validate_line_item(body) {
        Ok(v) => v,
        Err(e) => return errors::validation_error_to_response(e),
    };

    match services.store().get_open_bill(id).await {
        Ok(_) => {}
        Err(StoreError::NotFound) => {
            return errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                "bill not found or already closed",
            )
        }
        Err(other) => return errors::store_error_to_response(other),
    }
    if !services.host().describe(id).running {
        return errors::json_error(
            StatusCode::CONFLICT,
            "not_open",
            "bill is not accepting changes",
        );
    }

    let signal = if add {
        BillSignal::AddLineItem(item)
    } else {
        BillSignal::RemoveLineItem(item)
    };
    if let Err(e) = services.host().signal(id, signal).await {
        return errors::host_error_to_response(e);
    }

    (
        StatusCode::ACCEPTED,
        Json(dto::MessageResponse {
            message: "request accepted",
        }),
    )
        .into_response()
}

/// PATCH /bills/{id}: awaited close. Replaying the request id that already
/// completed a close returns the same closed artifact.
pub async fn close_bill(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::CloseBillRequest>,
) -> axum::response::Response {
    let id: BillId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::validation_error_to_response(e),
    };
    let request_id = match dto::validate_close_bill(&body) {
        Ok(v) => v,
        Err(e) => return errors::validation_error_to_response(e),
    };

    match services.store().get_open_bill(id).await {
        Ok(_) => {}
        Err(StoreError::NotFound) => return closed_bill_replay(&services, id, request_id).await,
        Err(other) => return errors::store_error_to_response(other),
    }
    if !services.host().describe(id).running {
        return errors::json_error(
            StatusCode::CONFLICT,
            "not_open",
            "bill is not accepting changes",
        );
    }

    match services.host().update_close(id, request_id).await {
        Ok(bill) => {
            // Teardown hint; the instance usually exits on its own first.
            let _ = services
                .host()
                .signal(id, BillSignal::CloseWorkflow(request_id))
                .await;
            (
                StatusCode::OK,
                Json(dto::CloseBillResponse {
                    bill: dto::bill_to_response(&bill),
                    status: "bill closed",
                }),
            )
                .into_response()
        }
        Err(e) => errors::host_error_to_response(e),
    }
}

/// A close for a bill absent from `open_bills`: either it never existed, or
/// it is already closed. A replay of the completing request id is answered
/// with the persisted artifact; any other request id is a conflict.
async fn closed_bill_replay(
    services: &AppServices,
    id: BillId,
    request_id: RequestId,
) -> axum::response::Response {
    let closed = match services.store().get_closed_bill(id).await {
        Ok(bill) => bill,
        Err(e) => return errors::store_error_to_response(e),
    };

    match services.store().get_closed_bill_request(id).await {
        Ok(stored) if stored == request_id => {
            let items = match services.store().get_closed_bill_items(id).await {
                Ok(items) => items,
                Err(e) => return errors::store_error_to_response(e),
            };
            (
                StatusCode::OK,
                Json(dto::CloseBillResponse {
                    bill: dto::closed_bill_to_response(&closed, items),
                    status: "bill closed",
                }),
            )
                .into_response()
        }
        Ok(_) => errors::json_error(
            StatusCode::CONFLICT,
            "already_closed",
            "bill already closed by a different request",
        ),
        Err(e) => errors::store_error_to_response(e),
    }
}
