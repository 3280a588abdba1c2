//! Core E2E testing framework

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use messaging_actors::{Broker, Worker, WorkerHandle};
use router_config::{RouterConfig, WorkerSettings};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Runs scenarios against a fresh broker each
pub struct TestFramework {
    config: TestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Upper bound for one scenario, overrides shorter scenario timeouts
    pub timeout_secs: u64,

    /// Shut the broker down after each scenario
    pub cleanup: bool,

    /// Enable detailed logging
    pub verbose: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            cleanup: true,
            verbose: false,
        }
    }
}

/// Test scenario trait
#[async_trait::async_trait]
pub trait TestScenario: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// Router topology the scenario runs on.
    fn topology(&self) -> &str;

    /// Spawn the declared workers, start the router and check what
    /// comes out.
    async fn execute(&self, harness: &Harness) -> Result<TestMetrics>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub scenario_name: String,
    pub success: bool,
    pub duration: Duration,
    pub error_message: Option<String>,
    pub metrics: TestMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestMetrics {
    pub messages_observed: u64,
    pub replies_observed: u64,
    pub failures_observed: u64,
}

impl TestResult {
    fn failed(name: &str, started: Instant, reason: String) -> Self {
        Self {
            scenario_name: name.to_string(),
            success: false,
            duration: started.elapsed(),
            error_message: Some(reason),
            metrics: TestMetrics::default(),
        }
    }
}

/// A broker built from a TOML topology, plus the lookups tests need
pub struct Harness {
    broker: Broker,
    config: RouterConfig,
}

impl Harness {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config = RouterConfig::from_toml_str(text).context("Invalid scenario topology")?;
        config.validate().context("Scenario topology failed validation")?;
        Ok(Self {
            broker: Broker::new(config.broker.clone()),
            config,
        })
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Settings of a worker declared in the topology.
    pub fn settings(&self, name: &str) -> Result<WorkerSettings> {
        self.config
            .worker(name)
            .cloned()
            .with_context(|| format!("Worker {name} is not declared in the topology"))
    }

    pub fn spawn<W: Worker>(&self, name: &str, worker: W) -> Result<WorkerHandle<W>> {
        let settings = self.settings(name)?;
        self.broker
            .spawn(worker, settings)
            .with_context(|| format!("Failed to register worker {name}"))
    }

    /// Wire declared edges and start every worker.
    pub fn start(&self) -> Result<usize> {
        let edges = self.broker.connect_producers_and_consumers()?;
        let started = self.broker.run_all()?;
        info!(edges, started, "Router started");
        Ok(started)
    }

    pub async fn shutdown(&self) {
        self.broker.shutdown().await;
    }
}

impl TestFramework {
    pub fn new(config: TestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Run a complete test scenario
    pub async fn run_scenario(&self, scenario: &dyn TestScenario) -> TestResult {
        info!("Starting test scenario: {}", scenario.name());
        info!("Description: {}", scenario.description());
        let started = Instant::now();

        let harness = match Harness::from_toml(scenario.topology()) {
            Ok(harness) => harness,
            Err(e) => {
                error!("Topology rejected: {:#}", e);
                return TestResult::failed(scenario.name(), started, format!("Topology rejected: {e:#}"));
            }
        };

        let limit = scenario.timeout().min(Duration::from_secs(self.config.timeout_secs));
        let outcome = tokio::time::timeout(limit, scenario.execute(&harness)).await;

        let result = match outcome {
            Ok(Ok(metrics)) => TestResult {
                scenario_name: scenario.name().to_string(),
                success: true,
                duration: started.elapsed(),
                error_message: None,
                metrics,
            },
            Ok(Err(e)) => {
                error!("Test execution failed: {:#}", e);
                TestResult::failed(scenario.name(), started, format!("Execution failed: {e:#}"))
            }
            Err(_) => {
                error!("Test execution timed out");
                TestResult::failed(scenario.name(), started, "Test execution timed out".to_string())
            }
        };

        if self.config.cleanup {
            harness.shutdown().await;
        } else {
            warn!("Leaving workers of {} running", scenario.name());
        }

        info!(
            "Test scenario completed: {} (success: {})",
            scenario.name(),
            result.success
        );
        result
    }
}

/// Test-writer subscriber honouring `RUST_LOG`; repeated calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
