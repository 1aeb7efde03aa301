pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{wait_for_db, PostgresStore};

use crate::models::{Crypto, NewCrypto, NewOrder, NewUser, Order, User};
use crate::Result;
use std::future::Future;
use std::time::Duration;

/// Outcome of a wholesale crypto table refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CryptoRefresh {
    pub deleted: u64,
    pub inserted: u64,
}

/// Persistence used by the HTTP API and the ingestion jobs
///
/// Order operations are always scoped to the owning user: an order that
/// belongs to someone else behaves exactly like a missing one.
pub trait Store: Clone + Send + Sync + 'static {
    fn create_user(&self, user: NewUser) -> impl Future<Output = Result<User>> + Send;

    /// Active user owning the token, if any
    fn find_user_by_token(&self, token: &str)
        -> impl Future<Output = Result<Option<User>>> + Send;

    /// Orders of one user, newest id first
    fn list_orders(&self, user_id: i64) -> impl Future<Output = Result<Vec<Order>>> + Send;

    fn get_order(&self, user_id: i64, id: i64)
        -> impl Future<Output = Result<Option<Order>>> + Send;

    /// Insert a validated order
    fn create_order(&self, user_id: i64, order: NewOrder)
        -> impl Future<Output = Result<Order>> + Send;

    /// Overwrite every writable field of an existing order
    fn update_order(
        &self,
        user_id: i64,
        id: i64,
        order: NewOrder,
    ) -> impl Future<Output = Result<Option<Order>>> + Send;

    fn delete_order(&self, user_id: i64, id: i64) -> impl Future<Output = Result<bool>> + Send;

    /// Atomically swap the whole crypto table for `rows`
    fn replace_crypto(&self, rows: Vec<NewCrypto>)
        -> impl Future<Output = Result<CryptoRefresh>> + Send;

    /// Stored bars ordered by time then symbol
    fn list_crypto(
        &self,
        symbol: Option<&str>,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<Crypto>>> + Send;

    fn count_crypto(&self) -> impl Future<Output = Result<i64>> + Send;
}

/// Run `probe` until it succeeds, sleeping `delay` between failures
///
/// Returns the number of attempts used, or the last error once `attempts`
/// are exhausted.
pub async fn retry_until_ready<F, Fut, E>(
    attempts: u32,
    delay: Duration,
    mut probe: F,
) -> std::result::Result<u32, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match probe().await {
            Ok(()) => return Ok(attempt),
            Err(e) if attempt < attempts => {
                tracing::info!("Database unavailable ({}), waiting {:?}...", e, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
