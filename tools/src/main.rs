//! cashpayd: headless runner for the cash-payment reconciliation engine.
//!
//! Speaks newline-delimited JSON over stdin/stdout — one ApiRequest per
//! line in, one response object per line out. A background thread runs the
//! expiry sweep on the configured cadence.
//!
//! Usage:
//!   cashpayd --db payments.db --data-dir ./data
//!   cashpayd --db :memory: --sweep-interval 10

use anyhow::Result;
use cashpay_core::{
    api::{self, ApiRequest},
    config::PayConfig,
    engine::PayEngine,
    store::PayStore,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or("cashpay.db");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    let config = PayConfig::load(data_dir)?;
    let sweep_interval = args
        .windows(2)
        .find(|w| w[0] == "--sweep-interval")
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(config.sweep_interval_secs);

    let store = PayStore::open(db)?;
    store.migrate()?;

    let engine = Arc::new(Mutex::new(PayEngine::build(store, config)));
    log::info!("cashpayd ready (db: {db}, sweep every {sweep_interval}s)");

    spawn_sweeper(Arc::clone(&engine), sweep_interval);
    run_request_loop(&engine)
}

/// Background expiry sweep — the scheduled check that moves overdue
/// transactions to `expired` without blocking the confirmation path.
fn spawn_sweeper(engine: Arc<Mutex<PayEngine>>, interval_secs: u64) {
    thread::spawn(move || loop {
        thread::sleep(Duration::from_secs(interval_secs.max(1)));
        let mut engine = match engine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match engine.expire_overdue() {
            Ok(expired) if !expired.is_empty() => {
                log::info!("sweep expired {} transactions", expired.len());
            }
            Ok(_) => {}
            Err(e) => log::error!("sweep failed: {e}"),
        }
    });
}

fn run_request_loop(engine: &Arc<Mutex<PayEngine>>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let request: ApiRequest = match serde_json::from_str(&buffer) {
            Ok(r) => r,
            Err(e) => {
                let err_json = serde_json::json!({
                    "error": { "error": e.to_string(), "code": "validation", "retryable": false }
                });
                writeln!(stdout, "{err_json}")?;
                stdout.flush()?;
                continue;
            }
        };

        let response = {
            let mut engine = match engine.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            api::dispatch(&mut engine, request)
        };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }

    Ok(())
}
