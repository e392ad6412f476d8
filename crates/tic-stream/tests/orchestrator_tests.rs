//! End-to-end orchestrator tests against fake discovery and transports.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tic_stream::prelude::*;
use tic_test_helpers::prelude::*;

struct Rig {
    orchestrator: TicOrchestrator,
    discovery: Arc<FakeDiscovery>,
    sources: Arc<FakeSourceFactory>,
}

fn init_tracing() {
    // Only the first test in the process installs the subscriber.
    drop(
        tracing_subscriber::fmt()
            .with_env_filter("tic_stream=debug")
            .with_test_writer()
            .try_init(),
    );
}

fn rig_with(config: StreamConfig, ports: Vec<PortDescriptor>) -> Result<Rig, StreamError> {
    init_tracing();
    let discovery = Arc::new(FakeDiscovery::with_ports(ports));
    let sources = Arc::new(FakeSourceFactory::new());
    let orchestrator = TicOrchestrator::new(config, discovery.clone(), sources.clone())?;
    Ok(Rig {
        orchestrator,
        discovery,
        sources,
    })
}

fn rig() -> Result<Rig, StreamError> {
    rig_with(StreamConfig::default(), vec![usb_port("1", "COM1"), usb_port("2", "COM2")])
}

fn com1() -> TicIdentifier {
    TicIdentifier::from_port_name("COM1")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_subscribe_opens_session_and_routes_frames() -> TestResult {
    let rig = rig()?;
    let recorder = RecordingListener::new();
    rig.orchestrator.subscribe_to(&com1(), as_listener(&recorder))?;

    assert_eq!(rig.orchestrator.session_count(), 1);
    let source = must_some(rig.sources.running_source("COM1"), "COM1 source running");
    assert_eq!(rig.sources.mode_for("COM1"), Some(TicMode::Historic));

    source.emit_frame(historic_frame(HISTORIC_SERIAL));
    wait_until("one frame", || recorder.frame_count() == 1).await;

    let frame = must_some(recorder.last_frame(), "frame recorded");
    assert_eq!(frame.identifier().serial_number(), Some(HISTORIC_SERIAL));
    assert_eq!(frame.identifier().port_name(), Some("COM1"));
    assert_eq!(frame.mode(), TicMode::Historic);
    assert_eq!(frame.frame().field("PAPP"), Some("00750"));

    // COM2 frames never reach a COM1 filter.
    assert!(rig.sources.source("COM2").is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reference_counted_teardown() -> TestResult {
    let rig = rig()?;
    let first = as_listener(&RecordingListener::new());
    let second = as_listener(&RecordingListener::new());

    rig.orchestrator.subscribe_to(&com1(), Arc::clone(&first))?;
    rig.orchestrator.subscribe_to(&com1(), Arc::clone(&second))?;
    assert_eq!(rig.sources.open_count(), 1);

    rig.orchestrator.unsubscribe_from(&com1(), &first);
    assert_eq!(rig.orchestrator.session_count(), 1);
    assert!(rig.sources.running_source("COM1").is_some());

    rig.orchestrator.unsubscribe_from(&com1(), &second);
    assert_eq!(rig.orchestrator.session_count(), 0);
    assert!(rig.sources.running_source("COM1").is_none());
    assert!(rig.orchestrator.get_available_identifiers().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unfiltered_subscriber_keeps_session_alive() -> TestResult {
    let rig = rig()?;
    let watcher = as_listener(&RecordingListener::new());
    let everything = RecordingListener::new();
    rig.orchestrator.subscribe(as_listener(&everything));

    rig.orchestrator.subscribe_to(&com1(), Arc::clone(&watcher))?;
    rig.orchestrator.unsubscribe_from(&com1(), &watcher);
    assert_eq!(rig.orchestrator.session_count(), 1);

    let source = must_some(rig.sources.running_source("COM1"), "COM1 running");
    source.emit_frame(anonymous_frame(TicMode::Historic));
    wait_until("unfiltered frame", || everything.frame_count() == 1).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsubscribe_all_releases_every_session() -> TestResult {
    let rig = rig()?;
    let listener = as_listener(&RecordingListener::new());
    rig.orchestrator.subscribe_to(&com1(), Arc::clone(&listener))?;
    rig.orchestrator
        .subscribe_to(&TicIdentifier::from_port_id("2"), Arc::clone(&listener))?;
    assert_eq!(rig.orchestrator.session_count(), 2);
    assert_eq!(rig.orchestrator.identifiers_for(&listener).len(), 2);

    rig.orchestrator.unsubscribe(&listener);
    assert_eq!(rig.orchestrator.session_count(), 0);
    assert!(!rig.orchestrator.is_subscribed(&listener));
    assert_eq!(rig.sources.running_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_filter_survives_serial_number_learning() -> TestResult {
    let rig = rig()?;
    let by_name = RecordingListener::new();
    rig.orchestrator.subscribe_to(&com1(), as_listener(&by_name))?;
    let source = must_some(rig.sources.running_source("COM1"), "COM1 running");

    source.emit_frame(historic_frame("S1"));
    source.emit_frame(historic_frame("S1"));
    wait_until("both frames", || by_name.frame_count() == 2).await;

    let identifiers = rig.orchestrator.get_available_identifiers();
    assert_eq!(identifiers.len(), 1);
    let learned = must_some(identifiers.first().cloned(), "one identifier");
    assert_eq!(learned.serial_number(), Some("S1"));
    assert_eq!(learned.port_id(), Some("1"));

    // A serial-only filter now routes to the live session without reopening.
    let by_serial = RecordingListener::new();
    rig.orchestrator
        .subscribe_to(&TicIdentifier::from_serial_number("S1"), as_listener(&by_serial))?;
    assert_eq!(rig.sources.open_count(), 1);
    source.emit_frame(historic_frame("S1"));
    wait_until("serial filter frame", || by_serial.frame_count() == 1).await;
    wait_until("name filter frame", || by_name.frame_count() == 3).await;

    // A different serial number is never routed, even on the same port.
    let other = RecordingListener::new();
    let other_filter = TicIdentifier::builder()
        .port_name("COM1")
        .serial_number("S2")
        .build()?;
    rig.orchestrator.subscribe_to(&other_filter, as_listener(&other))?;
    assert_eq!(rig.sources.open_count(), 1);
    source.emit_frame(historic_frame("S1"));
    wait_until("fourth frame", || by_name.frame_count() == 4).await;
    settle().await;
    assert_eq!(other.frame_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unplug_fans_out_and_unsubscribes() -> TestResult {
    let rig = rig()?;
    let filtered = RecordingListener::new();
    let unfiltered = RecordingListener::new();
    let filtered_dyn = as_listener(&filtered);
    let unfiltered_dyn = as_listener(&unfiltered);
    rig.orchestrator.subscribe_to(&com1(), Arc::clone(&filtered_dyn))?;
    rig.orchestrator.subscribe(Arc::clone(&unfiltered_dyn));

    let port = must_some(rig.discovery.unplug("COM1"), "COM1 attached");
    rig.orchestrator.on_device_disappeared(&port);
    assert_eq!(rig.orchestrator.session_count(), 0);
    assert!(rig.sources.running_source("COM1").is_none());

    wait_until("filtered unplug fault", || filtered.fault_count() == 1).await;
    wait_until("unfiltered unplug fault", || unfiltered.fault_count() == 1).await;
    for fault in filtered.faults().iter().chain(unfiltered.faults().iter()) {
        assert_eq!(fault.code(), ErrorCode::StreamUnplugged);
        assert_eq!(fault.identifier().port_name(), Some("COM1"));
    }

    wait_until("registry emptied", || rig.orchestrator.subscriber_count() == 0).await;
    assert!(rig.orchestrator.identifiers_for(&filtered_dyn).is_empty());
    assert!(!rig.orchestrator.is_subscribed(&unfiltered_dyn));

    settle().await;
    assert_eq!(filtered.fault_count(), 1);
    assert_eq!(unfiltered.fault_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unplug_keeps_filters_on_other_devices() -> TestResult {
    let rig = rig()?;
    let both = RecordingListener::new();
    let both_dyn = as_listener(&both);
    let com2 = TicIdentifier::from_port_name("COM2");
    must_with(rig.orchestrator.subscribe_to(&com1(), Arc::clone(&both_dyn)), "subscribe COM1");
    must_with(rig.orchestrator.subscribe_to(&com2, Arc::clone(&both_dyn)), "subscribe COM2");
    rig.orchestrator.subscribe(Arc::clone(&both_dyn));

    let port = must_some(rig.discovery.unplug("COM1"), "COM1 attached");
    rig.orchestrator.on_device_disappeared(&port);
    wait_until("unplug fault", || both.fault_count() == 1).await;
    wait_until("COM1 filter dropped", || {
        rig.orchestrator.identifiers_for(&both_dyn) == vec![com2.clone()]
    })
    .await;

    // The COM2 filter survives; the unfiltered entry does not.
    assert!(rig.orchestrator.is_subscribed(&both_dyn));
    assert_eq!(rig.orchestrator.session_count(), 1);
    let com2_source = must_some(rig.sources.running_source("COM2"), "COM2 still running");
    com2_source.emit_frame(historic_frame("S2"));
    wait_until("COM2 frame", || both.frame_count() == 1).await;
    assert_eq!(both.fault_count(), 1);

    rig.orchestrator.unsubscribe_from(&com2, &both_dyn);
    assert!(!rig.orchestrator.is_subscribed(&both_dyn));
    assert_eq!(rig.orchestrator.session_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_duplicate_appear_opens_one_session() -> TestResult {
    let rig = rig()?;
    let port = usb_port("1", "COM1");
    rig.orchestrator.on_device_appeared(&port)?;
    rig.orchestrator.on_device_appeared(&port)?;
    rig.orchestrator
        .on_device_appeared(&PortDescriptor::new(None, "COM1"))?;

    assert_eq!(rig.orchestrator.session_count(), 1);
    assert_eq!(rig.sources.open_count_for("COM1"), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_read_next_frame_returns_first_frame() -> TestResult {
    let rig = rig()?;
    let reader = rig.orchestrator.clone();
    let pending = tokio::spawn(async move {
        reader
            .read_next_frame(&com1(), Some(Duration::from_secs(5)))
            .await
    });

    let sources = Arc::clone(&rig.sources);
    wait_until("read opened COM1", || sources.running_source("COM1").is_some()).await;
    let source = must_some(rig.sources.running_source("COM1"), "COM1 running");
    source.emit_frame(standard_frame(STANDARD_SERIAL));

    let frame = pending.await??;
    assert_eq!(frame.identifier().serial_number(), Some(STANDARD_SERIAL));
    assert_eq!(frame.mode(), TicMode::Standard);

    // Opened only for the read: released afterwards.
    assert_eq!(rig.orchestrator.session_count(), 0);
    assert!(!source.is_running());
    assert_eq!(rig.orchestrator.subscriber_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_read_timeout_leaves_no_session() -> TestResult {
    let rig = rig()?;
    let started = Instant::now();
    let result = rig
        .orchestrator
        .read_next_frame(&com1(), Some(Duration::from_millis(50)))
        .await;

    let err = must_err(result);
    assert_eq!(err.code(), ErrorCode::ReadTimeout);
    assert!(matches!(err, StreamError::ReadTimeout { timeout, .. } if timeout == Duration::from_millis(50)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(rig.orchestrator.session_count(), 0);
    assert_eq!(rig.sources.running_count(), 0);
    assert_eq!(rig.orchestrator.subscriber_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_read_reraises_stream_fault() -> TestResult {
    let rig = rig()?;
    let reader = rig.orchestrator.clone();
    let pending = tokio::spawn(async move {
        reader
            .read_next_frame(&com1(), Some(Duration::from_secs(5)))
            .await
    });

    let sources = Arc::clone(&rig.sources);
    wait_until("read opened COM1", || sources.running_source("COM1").is_some()).await;
    let source = must_some(rig.sources.running_source("COM1"), "COM1 running");
    source.emit_error("checksum mismatch");

    let err = must_err(pending.await?);
    assert!(matches!(err, StreamError::Fault(ref fault) if fault.code() == ErrorCode::OtherReason));
    assert_eq!(rig.orchestrator.session_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_read_keeps_session_it_did_not_open() -> TestResult {
    let rig = rig()?;
    let keeper = as_listener(&RecordingListener::new());
    rig.orchestrator.subscribe_to(&com1(), Arc::clone(&keeper))?;

    let result = rig
        .orchestrator
        .read_next_frame(&com1(), Some(Duration::from_millis(30)))
        .await;
    assert!(matches!(result, Err(StreamError::ReadTimeout { .. })));
    assert_eq!(rig.orchestrator.session_count(), 1);
    assert!(rig.orchestrator.is_subscribed(&keeper));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_read_keeps_session_opened_by_plug_event() -> TestResult {
    let rig = rig()?;
    rig.orchestrator.on_device_appeared(&usb_port("1", "COM1"))?;

    let result = rig
        .orchestrator
        .read_next_frame(&com1(), Some(Duration::from_millis(30)))
        .await;
    assert!(matches!(result, Err(StreamError::ReadTimeout { .. })));
    assert_eq!(rig.orchestrator.session_count(), 1);
    assert!(rig.sources.running_source("COM1").is_some());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_read_uses_configured_default_timeout() -> TestResult {
    let config = StreamConfig::builder()
        .read_timeout(Duration::from_millis(40))
        .build()?;
    let rig = rig_with(config, vec![usb_port("1", "COM1")])?;

    let err = must_err(rig.orchestrator.read_next_frame(&com1(), None).await);
    assert!(matches!(err, StreamError::ReadTimeout { timeout, .. } if timeout == Duration::from_millis(40)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resolution_failures() -> TestResult {
    let rig = rig()?;
    let listener = as_listener(&RecordingListener::new());

    let unknown = rig
        .orchestrator
        .subscribe_to(&TicIdentifier::from_port_name("COM9"), Arc::clone(&listener));
    assert!(matches!(unknown, Err(StreamError::IdentifierNotFound(ref id)) if id.port_name() == Some("COM9")));

    let serial_only = rig
        .orchestrator
        .subscribe_to(&TicIdentifier::from_serial_number("S404"), Arc::clone(&listener));
    assert!(matches!(serial_only, Err(StreamError::IdentifierNotFound(_))));
    assert!(!rig.orchestrator.is_subscribed(&listener));

    let no_mode = rig_with(
        StreamConfig::builder().default_mode(None).build()?,
        vec![usb_port("1", "COM1")],
    )?;
    let err = must_err(no_mode.orchestrator.subscribe_to(&com1(), Arc::clone(&listener)));
    assert_eq!(err.code(), ErrorCode::ModeNotDefined);
    assert_eq!(no_mode.orchestrator.session_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_transport_start_is_reported() -> TestResult {
    let rig = rig()?;
    rig.sources.fail_port("COM2");
    let listener = as_listener(&RecordingListener::new());

    let err = must_err(
        rig.orchestrator
            .subscribe_to(&TicIdentifier::from_port_name("COM2"), Arc::clone(&listener)),
    );
    assert!(matches!(err, StreamError::Transport { ref port, .. } if port == "COM2"));
    assert_eq!(rig.orchestrator.session_count(), 0);
    assert!(!rig.orchestrator.is_subscribed(&listener));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_native_ports_stay_open() -> TestResult {
    let config = StreamConfig::builder().native_port("/dev/ttyAMA0").build()?;
    let rig = rig_with(config, vec![])?;
    rig.discovery.add_native(uart_port("/dev/ttyAMA0"));

    rig.orchestrator.start()?;
    assert_eq!(rig.orchestrator.session_count(), 1);

    let uart = TicIdentifier::from_port_name("/dev/ttyAMA0");
    let listener = as_listener(&RecordingListener::new());
    rig.orchestrator.subscribe_to(&uart, Arc::clone(&listener))?;
    rig.orchestrator.unsubscribe_from(&uart, &listener);
    assert!(rig.sources.running_source("/dev/ttyAMA0").is_some());

    let err = must_err(
        rig.orchestrator
            .read_next_frame(&uart, Some(Duration::from_millis(20)))
            .await,
    );
    assert_eq!(err.code(), ErrorCode::ReadTimeout);
    assert!(rig.sources.running_source("/dev/ttyAMA0").is_some());

    rig.orchestrator.stop();
    assert!(rig.sources.running_source("/dev/ttyAMA0").is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_native_port_is_skipped() -> TestResult {
    let config = StreamConfig::builder().native_port("/dev/ttyS7").build()?;
    let rig = rig_with(config, vec![])?;
    rig.orchestrator.start()?;
    assert!(rig.orchestrator.is_running());
    assert_eq!(rig.orchestrator.session_count(), 0);
    rig.orchestrator.stop();
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_clears_sessions_and_subscribers() -> TestResult {
    let rig = rig()?;
    rig.orchestrator.start()?;
    let listener = as_listener(&RecordingListener::new());
    rig.orchestrator.subscribe(Arc::clone(&listener));
    rig.orchestrator.subscribe_to(&com1(), Arc::clone(&listener))?;

    rig.orchestrator.stop();
    assert!(!rig.orchestrator.is_running());
    assert_eq!(rig.orchestrator.session_count(), 0);
    assert_eq!(rig.orchestrator.subscriber_count(), 0);
    assert_eq!(rig.sources.running_count(), 0);

    // Restartable.
    rig.orchestrator.start()?;
    assert!(rig.orchestrator.is_running());
    rig.orchestrator.stop();
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_poller_drives_sessions() -> TestResult {
    let config = StreamConfig::builder()
        .poll_interval(Duration::from_millis(10))
        .build()?;
    let rig = rig_with(config, vec![])?;
    let everything = RecordingListener::new();
    rig.orchestrator.subscribe(as_listener(&everything));
    rig.orchestrator.start()?;

    rig.discovery.plug(usb_port("7", "/dev/ttyUSB0"));
    let orchestrator = rig.orchestrator.clone();
    wait_until("session on plug", || orchestrator.session_count() == 1).await;

    let source = must_some(rig.sources.running_source("/dev/ttyUSB0"), "ttyUSB0 running");
    source.emit_frame(historic_frame(HISTORIC_SERIAL));
    wait_until("frame from plugged meter", || everything.frame_count() == 1).await;

    rig.discovery.unplug("/dev/ttyUSB0");
    wait_until("session gone on unplug", || orchestrator.session_count() == 0).await;
    wait_until("unplug fault", || everything.fault_count() == 1).await;
    assert_eq!(
        everything.faults().first().map(StreamFault::code),
        Some(ErrorCode::StreamUnplugged)
    );
    assert_eq!(
        everything
            .faults()
            .first()
            .and_then(|f| f.identifier().serial_number().map(str::to_owned)),
        Some(HISTORIC_SERIAL.to_string())
    );

    rig.orchestrator.stop();
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_poller_survives_enumeration_failure() -> TestResult {
    let config = StreamConfig::builder()
        .poll_interval(Duration::from_millis(10))
        .build()?;
    let rig = rig_with(config, vec![])?;
    rig.discovery.set_failing(true);
    rig.orchestrator.start()?;

    let discovery = Arc::clone(&rig.discovery);
    wait_until("several failed polls", || discovery.list_calls() >= 3).await;
    rig.discovery.set_failing(false);
    rig.discovery.plug(usb_port("1", "COM1"));

    let orchestrator = rig.orchestrator.clone();
    wait_until("session after recovery", || orchestrator.session_count() == 1).await;
    rig.orchestrator.stop();
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panicking_listener_does_not_affect_others() -> TestResult {
    let rig = rig()?;
    let bad = PanickingListener::new();
    let good = RecordingListener::new();
    rig.orchestrator.subscribe(as_listener(&bad));
    rig.orchestrator.subscribe_to(&com1(), as_listener(&good))?;

    let source = must_some(rig.sources.running_source("COM1"), "COM1 running");
    source.emit_frame(historic_frame("S1"));
    source.emit_frame(historic_frame("S1"));
    source.emit_error("framing error");

    wait_until("good listener frames", || good.frame_count() == 2).await;
    wait_until("good listener fault", || good.fault_count() == 1).await;
    wait_until("bad listener called", || bad.calls() == 3).await;

    let orchestrator = rig.orchestrator.clone();
    wait_until("panics counted", || orchestrator.stats().listener_panics == 3).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_listener_does_not_stall_session() -> TestResult {
    let rig = rig()?;
    let slow = RecordingListener::slow(Duration::from_millis(100));
    rig.orchestrator.subscribe_to(&com1(), as_listener(&slow))?;
    let source = must_some(rig.sources.running_source("COM1"), "COM1 running");

    let started = Instant::now();
    for _ in 0..5 {
        source.emit_frame(historic_frame("S1"));
    }
    assert!(started.elapsed() < Duration::from_millis(100));

    wait_until("slow listener caught up", || slow.frame_count() == 5).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_shaped_error_carries_last_frame() -> TestResult {
    let rig = rig()?;
    let listener = RecordingListener::new();
    rig.orchestrator.subscribe_to(&com1(), as_listener(&listener))?;
    let source = must_some(rig.sources.running_source("COM1"), "COM1 running");

    source.emit_frame(historic_frame("S1"));
    source.emit_error("Read Timeout on COM1");
    wait_until("timeout fault", || listener.fault_count() == 1).await;

    let fault = must_some(listener.faults().first().cloned(), "one fault");
    assert_eq!(fault.code(), ErrorCode::ReadTimeout);
    let context = must_some(fault.frame().cloned(), "last frame attached");
    assert_eq!(context.field("ADCO"), Some("S1"));
    assert_eq!(fault.identifier().serial_number(), Some("S1"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stats_count_deliveries() -> TestResult {
    let rig = rig()?;
    let a = RecordingListener::new();
    let b = RecordingListener::new();
    rig.orchestrator.subscribe(as_listener(&a));
    rig.orchestrator.subscribe_to(&com1(), as_listener(&b))?;

    let source = must_some(rig.sources.running_source("COM1"), "COM1 running");
    source.emit_frame(historic_frame("S1"));
    source.emit_error("noise");

    let orchestrator = rig.orchestrator.clone();
    wait_until("all deliveries", || {
        let stats = orchestrator.stats();
        stats.frames_delivered == 2 && stats.faults_delivered == 2
    })
    .await;
    assert_eq!(rig.orchestrator.stats().listener_panics, 0);
    Ok(())
}
