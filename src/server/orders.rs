use super::{AppState, CurrentUser};
use crate::db::Store;
use crate::models::{NewOrder, OrderDetail, OrderPatch, OrderReplace, OrderSummary};
use crate::{Error, Result};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

type Payload<T> = std::result::Result<Json<T>, JsonRejection>;
type OrderId = std::result::Result<Path<i64>, PathRejection>;

fn body<T>(payload: Payload<T>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| Error::validation(rejection.body_text()))
}

fn order_id(path: OrderId) -> Result<i64> {
    path.map(|Path(id)| id)
        .map_err(|rejection| Error::validation(rejection.body_text()))
}

/// `GET /api/orders/` - the caller's orders, newest first
pub async fn list<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<OrderSummary>>> {
    let orders = state.store.list_orders(user.id).await?;

    Ok(Json(orders.iter().map(OrderSummary::from).collect()))
}

/// `POST /api/orders/`
pub async fn create<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    payload: Payload<NewOrder>,
) -> Result<(StatusCode, Json<OrderDetail>)> {
    let order = body(payload)?.validated()?;
    let created = state.store.create_order(user.id, order).await?;

    tracing::info!(user = user.id, order = created.id, "Created order {}", created);

    Ok((StatusCode::CREATED, Json(OrderDetail::from(&created))))
}

/// `GET /api/orders/{id}/`
pub async fn retrieve<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    path: OrderId,
) -> Result<Json<OrderDetail>> {
    let id = order_id(path)?;
    let order = state
        .store
        .get_order(user.id, id)
        .await?
        .ok_or(Error::NotFound)?;

    Ok(Json(OrderDetail::from(&order)))
}

/// `PUT /api/orders/{id}/` - required fields are replaced, absent optional
/// fields and the title keep their stored values
pub async fn update<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    path: OrderId,
    payload: Payload<OrderReplace>,
) -> Result<Json<OrderDetail>> {
    let id = order_id(path)?;
    let existing = state
        .store
        .get_order(user.id, id)
        .await?
        .ok_or(Error::NotFound)?;

    let order = body(payload)?.apply(&existing).validated()?;
    let updated = state
        .store
        .update_order(user.id, id, order)
        .await?
        .ok_or(Error::NotFound)?;

    Ok(Json(OrderDetail::from(&updated)))
}

/// `PATCH /api/orders/{id}/` - only the fields present change
pub async fn partial_update<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    path: OrderId,
    payload: Payload<OrderPatch>,
) -> Result<Json<OrderDetail>> {
    let id = order_id(path)?;
    let existing = state
        .store
        .get_order(user.id, id)
        .await?
        .ok_or(Error::NotFound)?;

    let order = body(payload)?.apply(&existing).validated()?;
    let updated = state
        .store
        .update_order(user.id, id, order)
        .await?
        .ok_or(Error::NotFound)?;

    Ok(Json(OrderDetail::from(&updated)))
}

/// `DELETE /api/orders/{id}/`
pub async fn destroy<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(user): CurrentUser,
    path: OrderId,
) -> Result<StatusCode> {
    let id = order_id(path)?;
    if state.store.delete_order(user.id, id).await? {
        tracing::info!(user = user.id, order = id, "Deleted order");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound)
    }
}
