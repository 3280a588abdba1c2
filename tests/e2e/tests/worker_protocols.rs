//! Callbacks, events, interceptor chains and journals on a live broker

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use e2e_tests::{init_test_tracing, Backend, CacheTrace, CacheWorker, Harness, Observation, Probe};
use messaging_actors::{
    BrokerError, BrokerEvent, NamespaceUnwrapper, Repeater, RenamingInterceptor, WorkerBuilder,
};
use tokio::sync::mpsc;
use types::protocol::CommandRequestPayload;
use types::Payload;

const REQUESTER_CACHE: &str = r#"
[[workers]]
name = "requester"
consumers = ["cache"]

[[workers]]
name = "cache"
"#;

fn cache_data() -> Payload {
    Payload::from_value(serde_json::json!({"source": "ecb", "quotes": {"eur": 1.08}}))
}

#[tokio::test]
async fn done_callback_replaces_on_reply() -> Result<()> {
    init_test_tracing();
    let harness = Harness::from_toml(REQUESTER_CACHE)?;
    let (probe, mut seen) = Probe::new();
    let probe = probe.on_start(|ctx| {
        let command = Arc::new(CommandRequestPayload { path: Some("source".to_string()) });
        let msg = ctx.prepare_command_with::<Probe, _>(command, |me, _ctx, reply| {
            me.record(Observation::Callback(reply.clone()));
        });
        ctx.send(msg)
    });

    harness.spawn("requester", probe)?;
    harness.spawn("cache", CacheWorker::new(Backend::new(cache_data())))?;
    harness.start()?;

    match seen.next().await? {
        Observation::Callback(msg) => {
            let reply = msg.reply().expect("reply attached");
            assert!(reply.ok());
            assert_eq!(reply.payload().and_then(|p| p.get_str("value")), Some("ecb"));
        }
        other => panic!("expected the callback, got {other:?}"),
    }
    seen.expect_none(Duration::from_millis(100)).await?;

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn fail_callback_runs_when_the_reply_does_not_satisfy() -> Result<()> {
    init_test_tracing();
    let harness = Harness::from_toml(REQUESTER_CACHE)?;
    let (outcome_tx, mut outcome) = mpsc::unbounded_channel();
    let (probe, _seen) = Probe::new();
    let probe = probe.on_start(move |ctx| {
        let done_tx = outcome_tx.clone();
        let command = Arc::new(CommandRequestPayload { path: Some("missing".to_string()) });
        let msg = ctx.prepare_command_with_fail::<Probe, _, _>(
            command,
            move |_, _, _| {
                let _ = done_tx.send("done".to_string());
            },
            move |_, _, reply| {
                let reason = reply.reply().and_then(|r| r.reason()).unwrap_or_default();
                let _ = outcome_tx.send(format!("fail: {reason}"));
            },
        );
        ctx.send(msg)
    });

    harness.spawn("requester", probe)?;
    harness.spawn("cache", CacheWorker::new(Backend::new(cache_data())))?;
    harness.start()?;

    let first = tokio::time::timeout(Duration::from_secs(5), outcome.recv()).await?;
    assert_eq!(first.as_deref(), Some("fail: no data at missing"));
    assert!(tokio::time::timeout(Duration::from_millis(100), outcome.recv()).await.is_err());

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn disconnect_fails_requests_still_in_flight() -> Result<()> {
    init_test_tracing();
    let harness = Harness::from_toml(REQUESTER_CACHE)?;
    let (probe, mut seen) = Probe::new();
    let probe = probe.on_start(|ctx| {
        let command = Arc::new(CommandRequestPayload { path: Some("source".to_string()) });
        let msg = ctx.prepare_command(command);
        ctx.send(msg)
    });
    let mut backend = Backend::new(cache_data());
    backend.latency = Duration::from_millis(300);
    let (cache, mut trace) = CacheWorker::traced(backend);

    harness.spawn("requester", probe)?;
    harness.spawn("cache", cache)?;
    harness.start()?;

    let opened = tokio::time::timeout(Duration::from_secs(5), trace.recv()).await?;
    assert!(matches!(opened, Some(CacheTrace::Opened(_))));
    harness.broker().disconnect("requester", "cache")?;

    let msg = seen.next_message().await?;
    let reply = msg.reply().expect("reply attached");
    assert!(!reply.ok());
    assert_eq!(reply.reason(), Some("requester disconnected"));

    // The backend still answers later, but the context is gone.
    seen.expect_none(Duration::from_millis(500)).await?;
    assert!(tokio::time::timeout(Duration::from_millis(50), trace.recv()).await.is_err());

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn events_reach_every_worker_but_the_publisher() -> Result<()> {
    init_test_tracing();
    let harness = Harness::from_toml(
        "[[workers]]\nname = \"a\"\n[[workers]]\nname = \"b\"\n[[workers]]\nname = \"c\"\n",
    )?;
    let (a, mut seen_a) = Probe::new();
    let (b, mut seen_b) = Probe::new();
    let (c, mut seen_c) = Probe::new();
    let publisher = harness.spawn("a", a)?;
    harness.spawn("b", b)?;
    harness.spawn("c", c)?;
    harness.start()?;

    publisher.post(|_, ctx| {
        let reached = ctx.publish_event(BrokerEvent::new(7, 0, 1));
        tracing::info!(reached, "Event published");
    })?;

    for seen in [&mut seen_b, &mut seen_c] {
        match seen.next().await? {
            Observation::Event(event) => {
                assert_eq!(event.sender(), Some(publisher.id()));
                assert_eq!(event.get::<BrokerEvent>().map(|e| e.id), Some(7));
            }
            other => panic!("expected an event, got {other:?}"),
        }
    }
    seen_a.expect_none(Duration::from_millis(100)).await?;

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn interceptors_reshape_payloads_along_the_route() -> Result<()> {
    init_test_tracing();
    let harness = Harness::from_toml(
        r#"
[[workers]]
name = "source"
consumers = ["relay"]

[[workers]]
name = "relay"
consumers = ["sink"]

[[workers]]
name = "sink"
"#,
    )?;
    let broker = harness.broker();
    broker.register_interceptor("to_fx", Box::new(RenamingInterceptor::new([("eur", "fx:eur")])))?;

    let (source, _) = Probe::new();
    let source = source.on_start(|ctx| {
        let payload = Payload::from_value(serde_json::json!({"eur": 1.08, "note": "draft"}));
        let msg = ctx.prepare_msg_with(payload);
        ctx.send(msg)
    });
    let source = WorkerBuilder::new(source, harness.settings("source")?).create_proxy_named(broker, &["to_fx"])?;
    broker.register_proxy(source)?;

    let relay = WorkerBuilder::new(Repeater::new(true), harness.settings("relay")?)
        .create_proxy(vec![Box::new(NamespaceUnwrapper::new("fx"))]);
    broker.register_proxy(relay)?;

    let (sink, mut seen) = Probe::new();
    harness.spawn("sink", sink)?;
    harness.start()?;

    let msg = seen.next_message().await?;
    assert_eq!(msg.payload().get_f64("eur"), Some(1.08));
    assert!(!msg.payload().contains("note"));

    let reused = WorkerBuilder::new(Probe::new().0, harness.settings("sink")?).create_proxy_named(broker, &["to_fx"]);
    assert!(matches!(reused, Err(BrokerError::InterceptorReused(_))));

    harness.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn journal_records_what_leaves_the_worker() -> Result<()> {
    init_test_tracing();
    let dir = tempfile::tempdir()?;
    let journal = dir.path().join("producer.jsonl");
    let topology = format!(
        r#"
[[workers]]
name = "producer"
consumers = ["consumer"]

[workers.journal]
path = "{}"
filter = "normal"

[[workers]]
name = "consumer"
"#,
        journal.display()
    );
    let harness = Harness::from_toml(&topology)?;

    let (producer, _) = Probe::new();
    let producer = producer.on_start(|ctx| {
        for seq in 0..3 {
            let msg = ctx.prepare_msg_with(Payload::from_value(serde_json::json!({"seq": seq})));
            ctx.send(msg)?;
        }
        Ok(())
    });
    let (consumer, mut seen) = Probe::new();
    harness.spawn("producer", producer)?;
    harness.spawn("consumer", consumer)?;
    harness.start()?;

    for _ in 0..3 {
        seen.next_message().await?;
    }
    harness.shutdown().await;

    let text = std::fs::read_to_string(&journal)?;
    let entries: Vec<serde_json::Value> = text.lines().map(serde_json::from_str).collect::<Result<_, _>>()?;
    assert_eq!(entries.len(), 3);
    for (seq, entry) in entries.iter().enumerate() {
        assert_eq!(entry["meta"]["worker"], "producer");
        assert_eq!(entry["payload"]["seq"], seq as u64);
    }
    Ok(())
}

#[tokio::test]
async fn registration_and_wiring_errors_are_reported() -> Result<()> {
    init_test_tracing();
    let harness = Harness::from_toml(REQUESTER_CACHE)?;
    harness.spawn("requester", Probe::new().0)?;
    harness.spawn("cache", Probe::new().0)?;

    let again = harness.broker().spawn(Probe::new().0, harness.settings("cache")?);
    assert!(matches!(again, Err(BrokerError::DuplicateName(name)) if name == "cache"));

    harness.start()?;
    assert!(harness.broker().are_connected("requester", "cache"));
    assert!(matches!(
        harness.broker().connect_producers_and_consumers(),
        Err(BrokerError::AlreadyWired)
    ));

    harness.shutdown().await;
    Ok(())
}
