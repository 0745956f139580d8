//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置文件 -> outputs -> router -> dispatcher -> journal
//! - 两种 dispatcher 模式对接真实的 file / GELF output

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{DispatcherMode, Event, FilteredEvent};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_event_weight_contract() {
        let plain = FilteredEvent::from_event(Event::new(0, "a"));
        let fanned = FilteredEvent::from_event(
            Event::new(1, "b").with_destination("x").with_destination("y"),
        );
        assert_eq!(plain.weight(), 1);
        assert_eq!(fanned.weight(), 2);
    }

    #[test]
    fn test_config_roundtrip_through_loader() {
        let config = ConfigLoader::load_from_str(
            r#"
[output_buffer]
batch_size = 10
mode = "blocking"

[[filtered_outputs]]
id = "index"
output_type = "log"
"#,
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.output_buffer.mode, DispatcherMode::Blocking);

        let json = ConfigLoader::to_json(&config).unwrap();
        let reloaded = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(reloaded.output_buffer.batch_size, 10);
        assert_eq!(reloaded.filtered_outputs, config.filtered_outputs);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        Event, Journal, ManualClock, MessageOutput, OutputConfig, ServerConfig, SystemClock,
    };
    use dispatcher::{BatchDispatcher, DispatcherBuilder, DispatcherState, MemoryJournal, ToggleHealth};
    use outputs::{LogOutput, MemoryOutputStore, OutputFactory, OutputRegistry, StreamOutputRouter};
    use tokio::net::UdpSocket;

    struct Wiring {
        dispatcher: Arc<dyn BatchDispatcher>,
        router: Arc<StreamOutputRouter>,
        store: Arc<MemoryOutputStore>,
        journal: Arc<MemoryJournal>,
        default: Arc<LogOutput>,
    }

    /// Build the pipeline the way the CLI does, with a counting default output
    async fn wire(config: &ServerConfig, health: Option<Arc<ToggleHealth>>) -> Wiring {
        let factory = OutputFactory::with_builtins();
        let mut filtered = Vec::new();
        for output in &config.filtered_outputs {
            filtered.push(factory.create(output).await.unwrap().as_output());
        }

        let store = Arc::new(MemoryOutputStore::from_config(config));
        let default = Arc::new(LogOutput::new("default"));
        let registry = Arc::new(OutputRegistry::new(factory, store.clone(), default.clone()));
        let router = Arc::new(StreamOutputRouter::new(
            registry,
            &config.route_cache,
            Arc::new(SystemClock),
        ));
        let journal = Arc::new(MemoryJournal::new());

        let mut builder = DispatcherBuilder::new(config.output_buffer.clone())
            .outputs(filtered)
            .router(router.clone())
            .journal(journal.clone());
        if let Some(health) = health {
            builder = builder.health(health);
        }

        Wiring {
            dispatcher: builder.build().unwrap(),
            router,
            store,
            journal,
            default,
        }
    }

    fn ids(outputs: &[Arc<dyn MessageOutput>]) -> Vec<String> {
        outputs.iter().map(|o| o.id().to_string()).collect()
    }

    fn load(toml: &str) -> ServerConfig {
        ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap()
    }

    /// End-to-end: config -> file batch output + GELF stream output -> journal
    ///
    /// 验证完整的数据流：
    /// 1. 每个 batch 写入 file output
    /// 2. errors stream 的事件经 GELF (UDP) 转发
    /// 3. 所有 offset 均被提交
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_batched_file_and_gelf() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive.ndjson");

        let config = load(&format!(
            r#"
[output_buffer]
batch_size = 4
flush_interval_ms = 50

[[filtered_outputs]]
id = "archive"
output_type = "file"
params = {{ path = "{}" }}

[[outputs]]
id = "graylog"
output_type = "gelf"
params = {{ host = "127.0.0.1", port = "{}", protocol = "udp" }}

[[streams]]
id = "errors"
output_ids = ["graylog"]
"#,
            archive.display(),
            port
        ));

        let wiring = wire(&config, None).await;
        wiring.dispatcher.initialize().unwrap();

        for i in 0..10u64 {
            let mut event = Event::new(i, format!("message {i}")).with_source("web-1");
            if i == 3 {
                event = event.with_stream("errors").with_field("level", 3);
            }
            wiring.dispatcher.write(event).await.unwrap();
        }

        let mut buf = vec![0u8; 65_536];
        let len = tokio::time::timeout(Duration::from_secs(2), receiver.recv(&mut buf))
            .await
            .expect("no GELF datagram received")
            .unwrap();
        let gelf: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(gelf["short_message"], "message 3");
        assert_eq!(gelf["host"], "web-1");
        assert_eq!(gelf["level"], 3);
        assert_eq!(gelf["_forwarder"], "outflow.gelf");

        wiring.dispatcher.stop().await;
        wiring.router.registry().stop_all().await;

        assert_eq!(wiring.dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(wiring.journal.committed(), Some(9));
        assert_eq!(wiring.default.received(), 10);
        let lines = std::fs::read_to_string(&archive).unwrap();
        assert_eq!(lines.lines().count(), 10);
        assert_eq!(wiring.dispatcher.metrics().events_dispatched, 10);
    }

    /// Blocking mode holds batches back while the cluster is down
    #[tokio::test]
    async fn test_e2e_blocking_mode_resumes_after_recovery() {
        let config = load(
            r#"
[output_buffer]
batch_size = 2
mode = "blocking"
shutdown_timeout_ms = 500

[[filtered_outputs]]
id = "index"
output_type = "log"
"#,
        );
        let health = Arc::new(ToggleHealth::new(false));
        let wiring = wire(&config, Some(health.clone())).await;
        let dispatcher = wiring.dispatcher.clone();

        dispatcher.write(Event::new(0, "a")).await.unwrap();
        let blocked = tokio::spawn(async move { dispatcher.write(Event::new(1, "b")).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());
        assert_eq!(wiring.journal.committed(), None);

        health.set_healthy(true);
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(wiring.journal.committed(), Some(1));
        assert_eq!(wiring.default.received(), 2);

        wiring.dispatcher.stop().await;
    }

    /// Stream routes follow storage changes once the cached route is dropped
    #[tokio::test]
    async fn test_route_changes_after_invalidation() {
        let config = load(
            r#"
[[filtered_outputs]]
id = "index"
output_type = "log"

[[outputs]]
id = "first"
output_type = "log"

[[outputs]]
id = "second"
output_type = "log"

[[streams]]
id = "errors"
output_ids = ["first"]
"#,
        );
        let wiring = wire(&config, None).await;
        let router = &wiring.router;

        assert_eq!(ids(&router.outputs_for_stream("errors").await), vec!["first"]);

        wiring
            .store
            .set_stream_outputs("errors", vec!["first".into(), "second".into()]);
        // Still cached
        assert_eq!(ids(&router.outputs_for_stream("errors").await), vec!["first"]);

        router.invalidate_stream("errors");
        assert_eq!(
            ids(&router.outputs_for_stream("errors").await),
            vec!["first", "second"]
        );
        assert_eq!(router.registry().running_outputs().len(), 2);
    }

    /// Cached routes expire with the configured TTL
    #[tokio::test]
    async fn test_route_cache_ttl_with_manual_clock() {
        let config = ServerConfig {
            filtered_outputs: vec![OutputConfig::new("index", "log")],
            outputs: vec![OutputConfig::new("first", "log")],
            ..Default::default()
        };
        let store = Arc::new(MemoryOutputStore::from_config(&config));
        let registry = Arc::new(OutputRegistry::new(
            OutputFactory::with_builtins(),
            store.clone(),
            Arc::new(LogOutput::new("default")),
        ));
        let clock = Arc::new(ManualClock::new());
        let router = StreamOutputRouter::new(registry, &config.route_cache, clock.clone());

        assert!(router.outputs_for_stream("errors").await.is_empty());
        store.set_stream_outputs("errors", vec!["first".into()]);

        clock.advance(Duration::from_millis(999));
        assert!(router.outputs_for_stream("errors").await.is_empty());

        clock.advance(Duration::from_millis(1));
        assert_eq!(router.outputs_for_stream("errors").await.len(), 1);
        assert_eq!(store.stream_lookups(), 2);
    }
}
