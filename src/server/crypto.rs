use super::{AppState, CurrentUser};
use crate::db::Store;
use crate::models::Crypto;
use crate::{Error, Result};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

const DEFAULT_LIMIT: i64 = 500;
const MAX_LIMIT: i64 = 5000;

#[derive(Debug, Deserialize)]
pub struct CryptoQuery {
    symbol: Option<String>,
    limit: Option<i64>,
}

/// `GET /api/crypto/?symbol=&limit=` - stored bars, oldest first
pub async fn list<S: Store>(
    State(state): State<AppState<S>>,
    CurrentUser(_user): CurrentUser,
    query: std::result::Result<Query<CryptoQuery>, QueryRejection>,
) -> Result<Json<Vec<Crypto>>> {
    let Query(query) = query.map_err(|rejection| Error::validation(rejection.body_text()))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let symbol = query.symbol.as_deref().filter(|s| !s.is_empty());

    let rows = state.store.list_crypto(symbol, limit).await?;
    Ok(Json(rows))
}
