use cryptodesk::{Error, Settings};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

// Environment variables are process-wide
static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_KEYS: &[&str] = &[
    "CRYPTODESK__INGEST__SYMBOLS",
    "CRYPTODESK__INGEST__WINDOW_MINUTES",
    "CRYPTODESK__SERVER__BIND",
    "DATABASE_URL",
];

fn clear_env() {
    for key in ENV_KEYS {
        env::remove_var(key);
    }
}

fn temp_config_path(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    path.push(format!("cryptodesk_{}_{}.toml", name, std::process::id()));
    path
}

#[test]
fn loads_config_and_applies_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let path = temp_config_path("config_loader");
    let content = r#"
[database]
url = "postgres://file/ignored"

[server]
bind = "127.0.0.1:9000"

[ingest]
symbols = ["BTC-USD"]
window_minutes = 120
"#;
    fs::write(&path, content).expect("write temp config");

    env::set_var("CRYPTODESK__INGEST__SYMBOLS", "SOL-USD,ETH-USD");
    env::set_var("CRYPTODESK__INGEST__WINDOW_MINUTES", "60");
    env::set_var("DATABASE_URL", "postgres://user:pass@db:5432/cryptodesk");

    let result = Settings::load(Some(&path));
    clear_env();
    let _ = fs::remove_file(&path);

    let settings = result.expect("load config");
    assert_eq!(settings.ingest.symbols, vec!["SOL-USD", "ETH-USD"]);
    assert_eq!(settings.ingest.window_minutes, 60);
    assert_eq!(settings.database.url, "postgres://user:pass@db:5432/cryptodesk");
    // File value survives where no env var overrides it
    assert_eq!(settings.server.bind, "127.0.0.1:9000");
    assert_eq!(settings.ingest.granularity_secs, 60);
}

#[test]
fn env_only_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    env::set_var("CRYPTODESK__SERVER__BIND", "0.0.0.0:8080");
    env::set_var("DATABASE_URL", "postgres://x/y");

    let result = Settings::load(None);
    clear_env();

    let settings = result.expect("load config");
    assert_eq!(settings.server.bind, "0.0.0.0:8080");
    assert_eq!(settings.database.url, "postgres://x/y");
    assert_eq!(settings.ingest.symbols, vec!["ETH-USD", "BTC-USD", "AVAX-USD"]);
}

#[test]
fn invalid_env_symbol_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    env::set_var("CRYPTODESK__INGEST__SYMBOLS", "BTC-USD,ABCDEFGHIJKL");

    let result = Settings::load(None);
    clear_env();

    assert!(matches!(result, Err(Error::Validation(_))));
}

#[test]
fn missing_explicit_config_file_fails() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let path = temp_config_path("does_not_exist");
    let result = Settings::load(Some(&path));

    assert!(matches!(result, Err(Error::Config(_))));
}
