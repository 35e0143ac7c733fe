//! Integration test entry point
//!
//! Most tests run against in-memory backends. Tests in `live` need a MySQL
//! server and only run with: DBCLUSTER_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Environment variables:
//! - DBCLUSTER_RUN_INTEGRATION_TESTS: Set to "1" to enable live MySQL tests
//! - DBCLUSTER_TEST_MYSQL_URL: Server URL (default: mysql://root@127.0.0.1:3306/test)

mod monitor;

use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dbcluster::{Backend, ConnectionError, Dialer, PoolTuning, ProbeError, StaticConfig};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

/// Check if live MySQL tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("DBCLUSTER_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if live MySQL tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!("Skipping integration test (set DBCLUSTER_RUN_INTEGRATION_TESTS=1 to run)");
            return;
        }
    };
}

/// Get the live MySQL URL from environment
pub fn mysql_url() -> String {
    env::var("DBCLUSTER_TEST_MYSQL_URL")
        .unwrap_or_else(|_| "mysql://root@127.0.0.1:3306/test".to_string())
}

/// Parse a TOML document into an in-memory config
pub fn static_config(doc: &str) -> Arc<StaticConfig> {
    Arc::new(StaticConfig::from_toml(doc).expect("test config should parse"))
}

#[derive(Debug)]
struct Counters {
    alive: AtomicBool,
    pings: AtomicUsize,
    closes: AtomicUsize,
}

/// Backend that counts pings and closes
#[derive(Debug, Clone)]
pub struct CountingBackend {
    dsn: String,
    counters: Arc<Counters>,
}

impl CountingBackend {
    pub fn new(dsn: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            counters: Arc::new(Counters {
                alive: AtomicBool::new(true),
                pings: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }),
        }
    }

    /// Make every later ping fail (or succeed again)
    pub fn set_alive(&self, alive: bool) {
        self.counters.alive.store(alive, Ordering::SeqCst);
    }

    pub fn pings(&self) -> usize {
        self.counters.pings.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for CountingBackend {
    fn dsn(&self) -> &str {
        &self.dsn
    }

    async fn ping(&self) -> Result<(), ProbeError> {
        self.counters.pings.fetch_add(1, Ordering::SeqCst);
        if self.counters.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Ping(format!("{}: server has gone away", self.dsn)))
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Dialer that records every backend it opens
///
/// Dials can be made to fail a number of times, or held until a permit is
/// released.
#[derive(Debug, Default)]
pub struct CountingDialer {
    failures: Mutex<HashMap<String, usize>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    opened: Mutex<Vec<CountingBackend>>,
}

impl CountingDialer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `times` dials of `dsn`
    pub fn fail(&self, dsn: &str, times: usize) {
        self.failures.lock().insert(dsn.to_string(), times);
    }

    /// Block dials of `dsn` until the returned semaphore gets a permit
    pub fn hold(&self, dsn: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().insert(dsn.to_string(), gate.clone());
        gate
    }

    /// Successful dials so far
    pub fn dials(&self) -> usize {
        self.opened.lock().len()
    }

    /// Every backend opened for `dsn`, oldest first
    pub fn opened(&self, dsn: &str) -> Vec<CountingBackend> {
        self.opened
            .lock()
            .iter()
            .filter(|b| b.dsn == dsn)
            .cloned()
            .collect()
    }

    pub fn all_opened(&self) -> Vec<CountingBackend> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl Dialer for CountingDialer {
    type Backend = CountingBackend;

    async fn dial(&self, dsn: &str, _tuning: &PoolTuning) -> Result<CountingBackend, ConnectionError> {
        let gate = self.gates.lock().get(dsn).cloned();
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| ConnectionError::Dial(e.to_string()))?;
            permit.forget();
        }

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(dsn) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ConnectionError::Dial(format!("{dsn}: connection refused")));
                }
            }
        }

        let backend = CountingBackend::new(dsn);
        self.opened.lock().push(backend.clone());
        Ok(backend)
    }
}
