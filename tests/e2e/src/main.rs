//! End-to-End Test Runner for Switchyard

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use e2e_tests::{all_scenarios, TestConfig, TestFramework, TestResult};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario to run, or "all"
    #[arg(short, long, default_value = "all")]
    scenario: String,

    /// Per-scenario timeout in seconds
    #[arg(short, long, default_value_t = 30)]
    timeout: u64,

    /// Output results to file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Leave workers running after each scenario
    #[arg(long)]
    no_cleanup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("e2e_tests={log_level}").parse()?)
                .add_directive(format!("messaging_actors={log_level}").parse()?)
                .add_directive(format!("sync_channel={log_level}").parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Switchyard E2E Test Suite");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let framework = TestFramework::new(TestConfig {
        timeout_secs: args.timeout,
        cleanup: !args.no_cleanup,
        verbose: args.verbose,
    });

    let scenarios: Vec<_> = all_scenarios()
        .into_iter()
        .filter(|s| args.scenario == "all" || s.name() == args.scenario)
        .collect();
    if scenarios.is_empty() {
        error!("Unknown test scenario: {}", args.scenario);
        return Ok(());
    }

    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        results.push(framework.run_scenario(scenario.as_ref()).await);
    }

    print_results_summary(&results);

    if let Some(output_path) = args.output {
        save_results_to_file(&results, &output_path).await?;
        info!("Results saved to: {}", output_path.display());
    }

    if !results.iter().all(|r| r.success) {
        error!("Some tests failed");
        std::process::exit(1);
    }

    info!("All tests passed successfully!");
    Ok(())
}

fn print_results_summary(results: &[TestResult]) {
    println!("\n═══════════════════════════════════════");
    println!("        TEST RESULTS SUMMARY");
    println!("═══════════════════════════════════════");

    let passed = results.iter().filter(|r| r.success).count();
    println!("Total Tests: {}", results.len());
    println!("Passed:      {} ✓", passed);
    println!("Failed:      {} ✗", results.len() - passed);
    println!();

    for result in results {
        let status = if result.success { "✓ PASS" } else { "✗ FAIL" };
        println!("{} {} ({} ms)", status, result.scenario_name, result.duration.as_millis());

        if let Some(ref error) = result.error_message {
            println!("      Error: {}", error);
        }
        println!(
            "      Messages: {} | Replies: {} | Failures: {}",
            result.metrics.messages_observed, result.metrics.replies_observed, result.metrics.failures_observed
        );
    }

    println!("═══════════════════════════════════════");
}

async fn save_results_to_file(results: &[TestResult], path: &PathBuf) -> Result<()> {
    let json_output = serde_json::json!({
        "test_run": {
            "version": env!("CARGO_PKG_VERSION"),
            "total_tests": results.len(),
            "passed_tests": results.iter().filter(|r| r.success).count(),
            "failed_tests": results.iter().filter(|r| !r.success).count(),
        },
        "results": results
    });

    tokio::fs::write(path, serde_json::to_string_pretty(&json_output)?).await?;
    Ok(())
}
