//! Router scenarios runnable from the CLI and from integration tests

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use messaging_actors::WorkerError;
use router_config::ChannelSettings;
use sync_channel::{Channel, Priority};
use tokio::sync::{mpsc, oneshot};
use tracing::info;
use types::protocol::{Command, CommandAck, CommandPack, CommandRequestPayload};
use types::{MessageId, Payload};

use crate::fixtures::{Backend, BusPoller, CacheTrace, CacheWorker, Observation, Probe, ProbeReceiver};
use crate::framework::{Harness, TestMetrics, TestScenario};

const PRODUCER_CONSUMER: &str = r#"
[[workers]]
name = "producer"
consumers = ["consumer"]

[[workers]]
name = "consumer"
"#;

const REQUESTER_CACHE: &str = r#"
[[workers]]
name = "requester"
consumers = ["cache"]

[[workers]]
name = "cache"
"#;

const POLLERS_COLLECTOR: &str = r#"
[[workers]]
name = "fast_poller"
consumers = ["collector"]

[[workers]]
name = "slow_poller"
consumers = ["collector"]

[[workers]]
name = "collector"

[[channels]]
name = "bus"
frame_gap_ms = 0
"#;

fn sample_data() -> Result<Payload> {
    let mut data = Payload::new();
    data.set("quotes:eur", 1.08)?;
    data.set("quotes:gbp", 1.27)?;
    data.set("source", "ecb")?;
    Ok(data)
}

/// Sends a command on start and reports the request's message id
fn requester(command: Arc<dyn Command>) -> (Probe, ProbeReceiver, oneshot::Receiver<MessageId>) {
    let (id_tx, id_rx) = oneshot::channel();
    let (probe, rx) = Probe::new();
    let probe = probe.on_start(move |ctx| {
        let msg = ctx.prepare_command(command);
        let id = msg.id();
        ctx.send(msg)?;
        let _ = id_tx.send(id);
        Ok(())
    });
    (probe, rx, id_rx)
}

/// A producer's payloads reach its consumer in order, sent by the producer.
pub struct ProducerConsumerScenario {
    pub messages: usize,
}

#[async_trait::async_trait]
impl TestScenario for ProducerConsumerScenario {
    fn name(&self) -> &str {
        "producer_consumer"
    }

    fn description(&self) -> &str {
        "Payloads flow along a declared producer/consumer edge"
    }

    fn topology(&self) -> &str {
        PRODUCER_CONSUMER
    }

    async fn execute(&self, harness: &Harness) -> Result<TestMetrics> {
        let count = self.messages;
        let (producer, _producer_rx) = Probe::new();
        let producer = producer.on_start(move |ctx| {
            for seq in 0..count {
                let mut payload = Payload::new();
                payload.set("seq", seq as u64).map_err(WorkerError::other)?;
                let msg = ctx.prepare_msg_with(payload);
                ctx.send(msg)?;
            }
            Ok(())
        });
        let (consumer, mut consumer_rx) = Probe::new();

        let producer = harness.spawn("producer", producer)?;
        harness.spawn("consumer", consumer)?;
        harness.start()?;

        let mut metrics = TestMetrics::default();
        for expected in 0..count {
            let msg = consumer_rx.next_message().await?;
            ensure!(msg.sender() == Some(producer.id()), "message not sent by the producer");
            let seq = msg.payload().get_i64("seq").context("payload lost its sequence number")?;
            ensure!(seq == expected as i64, "expected seq {expected}, got {seq}");
            metrics.messages_observed += 1;
        }
        consumer_rx.expect_none(Duration::from_millis(100)).await?;
        Ok(metrics)
    }
}

/// A read answered later by a backend comes back on the same context.
pub struct CacheRequestScenario {
    pub backend_up: bool,
}

#[async_trait::async_trait]
impl TestScenario for CacheRequestScenario {
    fn name(&self) -> &str {
        if self.backend_up {
            "cache_request"
        } else {
            "cache_request_backend_down"
        }
    }

    fn description(&self) -> &str {
        "Request/reply correlated through an async context"
    }

    fn topology(&self) -> &str {
        REQUESTER_CACHE
    }

    async fn execute(&self, harness: &Harness) -> Result<TestMetrics> {
        let backend = if self.backend_up { Backend::new(sample_data()?) } else { Backend::down() };
        let (cache, mut trace) = CacheWorker::traced(backend);
        let command = Arc::new(CommandRequestPayload { path: Some("quotes:eur".to_string()) });
        let (probe, mut replies, request_id) = requester(command);

        harness.spawn("requester", probe)?;
        harness.spawn("cache", cache)?;
        harness.start()?;

        let reply_msg = match replies.next().await? {
            Observation::Reply(msg) => msg,
            other => bail!("expected a reply, got {other:?}"),
        };
        let request_id = request_id.await.context("request id never reported")?;
        ensure!(reply_msg.request_id() == Some(request_id), "reply not correlated with the request");

        let reply = reply_msg.reply().context("reply message without a reply")?;
        let mut metrics = TestMetrics { replies_observed: 1, ..TestMetrics::default() };
        if self.backend_up {
            ensure!(reply.ok(), "backend up but reply failed: {:?}", reply.reason());
            let value = reply.payload().and_then(|p| p.get_f64("value"));
            ensure!(value == Some(1.08), "unexpected value {value:?}");
        } else {
            ensure!(!reply.ok(), "backend down but reply succeeded");
            ensure!(reply.reason().is_some_and(|r| !r.is_empty()), "failure without a reason");
            metrics.failures_observed += 1;
        }

        let opened = trace.recv().await.context("cache trace closed")?;
        let completed = trace.recv().await.context("cache trace closed")?;
        match (opened, completed) {
            (CacheTrace::Opened(a), CacheTrace::Completed(b)) if a == b => {}
            other => bail!("context not correlated: {other:?}"),
        }
        Ok(metrics)
    }
}

/// A command pack is answered by one ordered reply pack.
pub struct CommandPackScenario;

#[async_trait::async_trait]
impl TestScenario for CommandPackScenario {
    fn name(&self) -> &str {
        "command_pack"
    }

    fn description(&self) -> &str {
        "Pack members run one after another and reply as one pack"
    }

    fn topology(&self) -> &str {
        REQUESTER_CACHE
    }

    async fn execute(&self, harness: &Harness) -> Result<TestMetrics> {
        let members: Vec<Arc<dyn Command>> = vec![
            Arc::new(CommandRequestPayload { path: Some("source".to_string()) }),
            Arc::new(CommandAck::default()),
            Arc::new(CommandRequestPayload { path: Some("quotes:gbp".to_string()) }),
        ];
        let pack = CommandPack::new(members)?;
        let (probe, mut replies, _) = requester(Arc::new(pack));

        harness.spawn("requester", probe)?;
        harness.spawn("cache", CacheWorker::new(Backend::new(sample_data()?)))?;
        harness.start()?;

        let msg = replies.next_message().await?;
        let reply = msg.reply().context("no reply attached")?;
        let members = reply.members().context("reply is not a pack")?;
        ensure!(members.len() == 3, "expected 3 member replies, got {}", members.len());
        ensure!(reply.ok(), "pack failed");
        ensure!(msg.command().is_some_and(|command| command.reply_ok(reply)), "pack reply does not satisfy the pack");

        let source = members[0].payload().and_then(|p| p.get_str("value"));
        ensure!(source == Some("ecb"), "first member answered {source:?}");
        let gbp = members[2].payload().and_then(|p| p.get_f64("value"));
        ensure!(gbp == Some(1.27), "third member answered {gbp:?}");

        Ok(TestMetrics {
            replies_observed: members.len() as u64,
            ..TestMetrics::default()
        })
    }
}

/// Pollers sharing one channel are served by priority.
pub struct PriorityChannelScenario;

#[async_trait::async_trait]
impl TestScenario for PriorityChannelScenario {
    fn name(&self) -> &str {
        "priority_channel"
    }

    fn description(&self) -> &str {
        "The high-priority poller gets the shared bus first"
    }

    fn topology(&self) -> &str {
        POLLERS_COLLECTOR
    }

    async fn execute(&self, harness: &Harness) -> Result<TestMetrics> {
        let settings = harness
            .config()
            .channel("bus")
            .cloned()
            .unwrap_or_else(|| ChannelSettings::named("bus"));
        let channel = Channel::spawn(&settings);

        // Hold the bus so both pollers have to queue.
        let mut gate = channel.register(Priority::Low).await?;
        gate.ask_trigger()?;
        gate.next_trigger().await.context("gate never granted")?;
        gate.job_started()?;

        let (asked_tx, mut asked_rx) = mpsc::unbounded_channel();
        let slow = BusPoller::new("slow", channel.register(Priority::Normal).await?, asked_tx.clone());
        let fast = BusPoller::new("fast", channel.register(Priority::High).await?, asked_tx);
        let (collector, mut collected) = Probe::new();

        harness.spawn("slow_poller", slow)?;
        harness.spawn("fast_poller", fast)?;
        harness.spawn("collector", collector)?;
        harness.start()?;

        for _ in 0..2 {
            let label = asked_rx.recv().await.context("poller never queued")?;
            info!(poller = %label, "Queued on the bus");
        }
        gate.job_done()?;

        let mut order = Vec::new();
        for _ in 0..2 {
            let msg = collected.next_message().await?;
            order.push(msg.payload().get_str("poller").unwrap_or_default().to_string());
        }
        ensure!(order == ["fast", "slow"], "bus served out of priority order: {order:?}");

        channel.abort();
        Ok(TestMetrics {
            messages_observed: order.len() as u64,
            ..TestMetrics::default()
        })
    }
}

/// Every scenario the runner knows, by name
pub fn all_scenarios() -> Vec<Box<dyn TestScenario>> {
    vec![
        Box::new(ProducerConsumerScenario { messages: 16 }),
        Box::new(CacheRequestScenario { backend_up: true }),
        Box::new(CacheRequestScenario { backend_up: false }),
        Box::new(CommandPackScenario),
        Box::new(PriorityChannelScenario),
    ]
}
