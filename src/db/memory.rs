use super::{CryptoRefresh, Store};
use crate::models::user::generate_token;
use crate::models::{Crypto, NewCrypto, NewOrder, NewUser, Order, User};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    orders: BTreeMap<i64, Order>,
    crypto: Vec<Crypto>,
    next_user_id: i64,
    next_order_id: i64,
    next_crypto_id: i64,
}

/// In-process store with the same semantics as the Postgres one
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;

        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(Error::validation(format!(
                "user with email {} already exists",
                user.email
            )));
        }

        let created = User {
            id: next_id(&mut tables.next_user_id),
            email: user.email,
            name: user.name,
            is_active: true,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            api_token: generate_token(),
            created_at: Utc::now(),
        };
        tables.users.push(created.clone());

        Ok(created)
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;

        Ok(tables
            .users
            .iter()
            .find(|u| u.is_active && u.api_token == token)
            .cloned())
    }

    async fn list_orders(&self, user_id: i64) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;

        Ok(tables
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_order(&self, user_id: i64, id: i64) -> Result<Option<Order>> {
        let tables = self.tables.read().await;

        Ok(tables
            .orders
            .get(&id)
            .filter(|o| o.user_id == user_id)
            .cloned())
    }

    async fn create_order(&self, user_id: i64, order: NewOrder) -> Result<Order> {
        let mut tables = self.tables.write().await;

        if !tables.users.iter().any(|u| u.id == user_id) {
            return Err(Error::validation(format!("unknown user {}", user_id)));
        }

        let id = next_id(&mut tables.next_order_id);
        let created = Order {
            id,
            user_id,
            title: order.title(),
            symbol: order.symbol,
            amount: order.amount,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            leverage: order.leverage,
            initial_price: order.initial_price,
            closing_price: order.closing_price,
            start_date_time: order.start_date_time,
            close_date_time: order.close_date_time,
        };
        tables.orders.insert(id, created.clone());

        Ok(created)
    }

    async fn update_order(
        &self,
        user_id: i64,
        id: i64,
        order: NewOrder,
    ) -> Result<Option<Order>> {
        let mut tables = self.tables.write().await;

        let Some(existing) = tables
            .orders
            .get_mut(&id)
            .filter(|o| o.user_id == user_id)
        else {
            return Ok(None);
        };

        existing.title = order.title();
        existing.symbol = order.symbol;
        existing.amount = order.amount;
        existing.stop_loss = order.stop_loss;
        existing.take_profit = order.take_profit;
        existing.leverage = order.leverage;
        existing.initial_price = order.initial_price;
        existing.closing_price = order.closing_price;
        existing.start_date_time = order.start_date_time;
        existing.close_date_time = order.close_date_time;

        Ok(Some(existing.clone()))
    }

    async fn delete_order(&self, user_id: i64, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;

        let owned = tables
            .orders
            .get(&id)
            .is_some_and(|o| o.user_id == user_id);
        if owned {
            tables.orders.remove(&id);
        }

        Ok(owned)
    }

    async fn replace_crypto(&self, rows: Vec<NewCrypto>) -> Result<CryptoRefresh> {
        let mut tables = self.tables.write().await;

        let deleted = tables.crypto.len() as u64;
        tables.crypto.clear();

        let inserted = rows.len() as u64;
        for row in rows {
            let id = next_id(&mut tables.next_crypto_id);
            tables.crypto.push(row.into_row(id));
        }

        Ok(CryptoRefresh { deleted, inserted })
    }

    async fn list_crypto(&self, symbol: Option<&str>, limit: i64) -> Result<Vec<Crypto>> {
        let tables = self.tables.read().await;

        let mut rows: Vec<Crypto> = tables
            .crypto
            .iter()
            .filter(|c| symbol.map_or(true, |s| c.symbol == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.date_and_time
                .cmp(&b.date_and_time)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        rows.truncate(limit.max(0) as usize);

        Ok(rows)
    }

    async fn count_crypto(&self) -> Result<i64> {
        Ok(self.tables.read().await.crypto.len() as i64)
    }
}
