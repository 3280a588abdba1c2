//! Full scenarios driven through the test framework

use e2e_tests::{
    init_test_tracing, CacheRequestScenario, CommandPackScenario, PriorityChannelScenario,
    ProducerConsumerScenario, TestConfig, TestFramework, TestResult, TestScenario,
};

async fn run(scenario: &dyn TestScenario) -> TestResult {
    init_test_tracing();
    let framework = TestFramework::new(TestConfig::default());
    framework.run_scenario(scenario).await
}

fn assert_passed(result: &TestResult) {
    assert!(
        result.success,
        "{} failed: {}",
        result.scenario_name,
        result.error_message.as_deref().unwrap_or("no reason")
    );
}

#[tokio::test]
async fn consumer_receives_producer_payloads_in_order() {
    let result = run(&ProducerConsumerScenario { messages: 32 }).await;
    assert_passed(&result);
    assert_eq!(result.metrics.messages_observed, 32);
}

#[tokio::test]
async fn late_backend_reply_reaches_the_requester() {
    let result = run(&CacheRequestScenario { backend_up: true }).await;
    assert_passed(&result);
    assert_eq!(result.metrics.replies_observed, 1);
    assert_eq!(result.metrics.failures_observed, 0);
}

#[tokio::test]
async fn unavailable_backend_yields_a_failure_reply() {
    let result = run(&CacheRequestScenario { backend_up: false }).await;
    assert_passed(&result);
    assert_eq!(result.metrics.failures_observed, 1);
}

#[tokio::test]
async fn command_pack_is_answered_member_by_member() {
    let result = run(&CommandPackScenario).await;
    assert_passed(&result);
    assert_eq!(result.metrics.replies_observed, 3);
}

#[tokio::test]
async fn shared_bus_is_granted_by_priority() {
    let result = run(&PriorityChannelScenario).await;
    assert_passed(&result);
}

#[tokio::test]
async fn bad_topology_fails_without_running() {
    struct Broken;

    #[async_trait::async_trait]
    impl TestScenario for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Consumer that was never declared"
        }

        fn topology(&self) -> &str {
            "[[workers]]\nname = \"lonely\"\nconsumers = [\"ghost\"]\n"
        }

        async fn execute(&self, _harness: &e2e_tests::Harness) -> anyhow::Result<e2e_tests::TestMetrics> {
            unreachable!("topology is rejected first")
        }
    }

    let result = run(&Broken).await;
    assert!(!result.success);
    let reason = result.error_message.unwrap_or_default();
    assert!(reason.contains("Topology rejected"), "{reason}");
}
