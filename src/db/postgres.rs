use super::{retry_until_ready, CryptoRefresh, Store};
use crate::models::user::generate_token;
use crate::models::{Crypto, NewCrypto, NewOrder, NewUser, Order, User};
use crate::{Error, Result};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::time::Duration;

/// Rows per multi-row INSERT (7 binds each, well under the 65535 limit)
const INSERT_CHUNK: usize = 1000;

const ORDER_COLUMNS: &str = "id, user_id, title, symbol, amount, stop_loss, take_profit, \
     leverage, initial_price, closing_price, start_date_time, close_date_time";

const USER_COLUMNS: &str =
    "id, email, name, is_active, is_staff, is_superuser, api_token, created_at";

/// Postgres-backed store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and run the embedded migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool })
    }

    /// Delete every row of every table (testing only)
    #[cfg(test)]
    pub async fn truncate_all(&self) -> Result<()> {
        sqlx::query("TRUNCATE crypto, orders, users RESTART IDENTITY CASCADE")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Block until the database accepts connections
pub async fn wait_for_db(database_url: &str, attempts: u32, delay: Duration) -> Result<()> {
    tracing::info!("Waiting for database...");

    let used = retry_until_ready(attempts, delay, || async move {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        pool.close().await;
        Ok::<(), sqlx::Error>(())
    })
    .await?;

    tracing::info!("Database available after {} attempt(s)", used);
    Ok(())
}

impl Store for PostgresStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let query = format!(
            "INSERT INTO users (email, name, is_staff, is_superuser, api_token) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        );

        let result = sqlx::query(&query)
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .bind(generate_token())
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => {
                let created = user_from_row(&row)?;
                tracing::debug!("Created user {} ({})", created.id, created.email);
                Ok(created)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(Error::validation(
                format!("user with email {} already exists", user.email),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let query = format!(
            "SELECT {} FROM users WHERE api_token = $1 AND is_active",
            USER_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_orders(&self, user_id: i64) -> Result<Vec<Order>> {
        let query = format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY id DESC",
            ORDER_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(order_from_row).collect()
    }

    async fn get_order(&self, user_id: i64, id: i64) -> Result<Option<Order>> {
        let query = format!(
            "SELECT {} FROM orders WHERE user_id = $1 AND id = $2",
            ORDER_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn create_order(&self, user_id: i64, order: NewOrder) -> Result<Order> {
        let query = format!(
            r#"
            INSERT INTO orders (
                user_id, title, symbol, amount, stop_loss, take_profit,
                leverage, initial_price, closing_price, start_date_time, close_date_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(order.title())
            .bind(&order.symbol)
            .bind(order.amount)
            .bind(order.stop_loss)
            .bind(order.take_profit)
            .bind(order.leverage)
            .bind(order.initial_price)
            .bind(order.closing_price)
            .bind(order.start_date_time)
            .bind(order.close_date_time)
            .fetch_one(&self.pool)
            .await?;

        let created = order_from_row(&row)?;
        tracing::debug!("Saved order {} for user {}", created.id, user_id);
        Ok(created)
    }

    async fn update_order(
        &self,
        user_id: i64,
        id: i64,
        order: NewOrder,
    ) -> Result<Option<Order>> {
        let query = format!(
            r#"
            UPDATE orders SET
                title = $3,
                symbol = $4,
                amount = $5,
                stop_loss = $6,
                take_profit = $7,
                leverage = $8,
                initial_price = $9,
                closing_price = $10,
                start_date_time = $11,
                close_date_time = $12
            WHERE user_id = $1 AND id = $2
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(id)
            .bind(order.title())
            .bind(&order.symbol)
            .bind(order.amount)
            .bind(order.stop_loss)
            .bind(order.take_profit)
            .bind(order.leverage)
            .bind(order.initial_price)
            .bind(order.closing_price)
            .bind(order.start_date_time)
            .bind(order.close_date_time)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn delete_order(&self, user_id: i64, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_crypto(&self, rows: Vec<NewCrypto>) -> Result<CryptoRefresh> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM crypto")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut inserted = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO crypto (date_and_time, low, high, open, close, volume, symbol) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.date_and_time)
                    .push_bind(row.low)
                    .push_bind(row.high)
                    .push_bind(row.open)
                    .push_bind(row.close)
                    .push_bind(row.volume)
                    .push_bind(&row.symbol);
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        Ok(CryptoRefresh { deleted, inserted })
    }

    async fn list_crypto(&self, symbol: Option<&str>, limit: i64) -> Result<Vec<Crypto>> {
        let rows = sqlx::query(
            r#"
            SELECT id, date_and_time, low, high, open, close, volume, symbol
            FROM crypto
            WHERE ($1::TEXT IS NULL OR symbol = $1)
            ORDER BY date_and_time ASC, symbol ASC
            LIMIT $2
            "#,
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(crypto_from_row).collect()
    }

    async fn count_crypto(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM crypto")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("total")?)
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        is_active: row.try_get("is_active")?,
        is_staff: row.try_get("is_staff")?,
        is_superuser: row.try_get("is_superuser")?,
        api_token: row.try_get("api_token")?,
        created_at: row.try_get("created_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        symbol: row.try_get("symbol")?,
        amount: row.try_get("amount")?,
        stop_loss: row.try_get("stop_loss")?,
        take_profit: row.try_get("take_profit")?,
        leverage: row.try_get("leverage")?,
        initial_price: row.try_get("initial_price")?,
        closing_price: row.try_get("closing_price")?,
        start_date_time: row.try_get("start_date_time")?,
        close_date_time: row.try_get("close_date_time")?,
    })
}

fn crypto_from_row(row: &PgRow) -> Result<Crypto> {
    Ok(Crypto {
        id: row.try_get("id")?,
        date_and_time: row.try_get("date_and_time")?,
        low: row.try_get("low")?,
        high: row.try_get("high")?,
        open: row.try_get("open")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
        symbol: row.try_get("symbol")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    async fn get_test_db() -> PostgresStore {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/cryptodesk_test".to_string());

        let store = PostgresStore::connect(&database_url, 2)
            .await
            .expect("Failed to connect to test database");
        store.truncate_all().await.unwrap();
        store
    }

    fn sample_order() -> NewOrder {
        NewOrder {
            symbol: "BTC".to_string(),
            initial_price: 133100000.0,
            start_date_time: Utc.with_ymd_and_hms(2023, 1, 13, 14, 30, 12).unwrap(),
            amount: None,
            stop_loss: 131100000.0,
            take_profit: 163000000.0,
            leverage: 10,
            close_date_time: None,
            closing_price: None,
            title: None,
        }
        .validated()
        .unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_user_roundtrip_and_duplicate_email() {
        let db = get_test_db().await;

        let user = db
            .create_user(NewUser::new("test@EXAMPLE.com", "Test").unwrap())
            .await
            .unwrap();
        assert_eq!(user.email, "test@example.com");

        let found = db.find_user_by_token(&user.api_token).await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));

        let dup = db
            .create_user(NewUser::new("test@example.com", "Other").unwrap())
            .await;
        assert!(matches!(dup, Err(Error::Validation(_))));
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_orders_scoped_to_user() {
        let db = get_test_db().await;
        let alice = db
            .create_user(NewUser::new("alice@example.com", "").unwrap())
            .await
            .unwrap();
        let bob = db
            .create_user(NewUser::new("bob@example.com", "").unwrap())
            .await
            .unwrap();

        let first = db.create_order(alice.id, sample_order()).await.unwrap();
        let second = db.create_order(alice.id, sample_order()).await.unwrap();
        db.create_order(bob.id, sample_order()).await.unwrap();

        let orders = db.list_orders(alice.id).await.unwrap();
        assert_eq!(
            orders.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
        assert_eq!(first.title, "BTC order created on 2023-01-13 14:30:12");
        assert_eq!(first.amount, Some(1.0));

        assert!(db.get_order(bob.id, first.id).await.unwrap().is_none());
        assert!(!db.delete_order(bob.id, first.id).await.unwrap());
        assert!(db.delete_order(alice.id, first.id).await.unwrap());
        assert_eq!(db.list_orders(alice.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_replace_crypto() {
        let db = get_test_db().await;
        let bar = |minute: u32, symbol: &str| NewCrypto {
            date_and_time: Utc.with_ymd_and_hms(2023, 1, 20, 22, minute, 0).unwrap(),
            low: 1.0,
            high: 2.0,
            open: 1.5,
            close: 1.8,
            volume: 10.0,
            symbol: symbol.to_string(),
        };

        let first = db
            .replace_crypto(vec![bar(1, "BTC-USD"), bar(0, "BTC-USD")])
            .await
            .unwrap();
        assert_eq!(first, CryptoRefresh { deleted: 0, inserted: 2 });

        let second = db
            .replace_crypto(vec![bar(2, "ETH-USD"), bar(2, "BTC-USD"), bar(0, "ETH-USD")])
            .await
            .unwrap();
        assert_eq!(second, CryptoRefresh { deleted: 2, inserted: 3 });
        assert_eq!(db.count_crypto().await.unwrap(), 3);

        let eth = db.list_crypto(Some("ETH-USD"), 10).await.unwrap();
        assert_eq!(eth.len(), 2);
        assert!(eth[0].date_and_time < eth[1].date_and_time);
    }
}
