use chrono::Utc;
use cryptodesk::db::{PostgresStore, Store};
use cryptodesk::ingest::{gather_intra_minute_data, populate_crypto_table};
use cryptodesk::{CoinbaseClient, Settings};

#[tokio::test]
#[ignore] // Requires Postgres and network
async fn test_e2e_populate_live() {
    let _ = tracing_subscriber::fmt::try_init();

    let settings = Settings::load(None).unwrap();
    let client = CoinbaseClient::new(&settings.exchange).unwrap();

    // 1. Ticker endpoint answers for every configured symbol
    let tickers = gather_intra_minute_data(&client, &settings.ingest.symbols).await;
    assert_eq!(tickers.len(), settings.ingest.symbols.len());
    for ticker in &tickers {
        assert!(ticker.price > 0.0, "{} price should be positive", ticker.symbol);
    }

    // 2. Unknown pairs are reported as 404
    let err = client.get_ticker("ASDASD").await.unwrap_err();
    assert_eq!(err.exchange_status(), Some(404));

    // 3. Refresh the crypto table
    let store = PostgresStore::connect(&settings.database.url, 2)
        .await
        .expect("Failed to connect to Postgres");
    let stats = populate_crypto_table(&client, &store, &settings.ingest, Utc::now())
        .await
        .unwrap();

    assert!(stats.inserted > 0);
    assert_ne!(store.count_crypto().await.unwrap(), 0);

    let rows = store
        .list_crypto(Some(settings.ingest.symbols[0].as_str()), 10)
        .await
        .unwrap();
    assert!(!rows.is_empty());
    for row in &rows {
        assert!(row.high >= row.low);
    }
}
