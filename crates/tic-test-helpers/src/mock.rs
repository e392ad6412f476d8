//! Fake collaborators for driving the orchestrator in tests.
//!
//! [`FakeDiscovery`] holds the set of attached ports, [`FakeSourceFactory`]
//! hands out [`FakeFrameSource`]s that tests feed frames and errors through,
//! and [`RecordingListener`] records everything it is given.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tic_stream::{
    FrameSink, FrameSource, FrameSourceFactory, PortDescriptor, PortDiscovery, StreamError,
    StreamFault, StreamFrame, StreamListener, StreamResult, TicFrame, TicMode,
};

#[derive(Debug, Default)]
pub struct FakeDiscovery {
    ports: Mutex<Vec<PortDescriptor>>,
    native: Mutex<Vec<PortDescriptor>>,
    failing: AtomicBool,
    list_calls: AtomicUsize,
}

impl FakeDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ports<I: IntoIterator<Item = PortDescriptor>>(ports: I) -> Self {
        let discovery = Self::new();
        for port in ports {
            discovery.plug(port);
        }
        discovery
    }

    pub fn plug(&self, port: PortDescriptor) {
        let mut ports = self.ports.lock();
        if !ports.contains(&port) {
            ports.push(port);
        }
    }

    pub fn unplug(&self, port_name: &str) -> Option<PortDescriptor> {
        let mut ports = self.ports.lock();
        let index = ports.iter().position(|p| p.port_name == port_name)?;
        Some(ports.remove(index))
    }

    /// Register a port only reachable through `find_native_port`.
    pub fn add_native(&self, port: PortDescriptor) {
        self.native.lock().push(port);
    }

    /// Make `list_ports` fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl PortDiscovery for FakeDiscovery {
    fn list_ports(&self) -> StreamResult<Vec<PortDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StreamError::transport("discovery", "enumeration failed"));
        }
        Ok(self.ports.lock().clone())
    }

    fn find_native_port(&self, port_name: &str) -> Option<PortDescriptor> {
        let native = self
            .native
            .lock()
            .iter()
            .find(|p| p.port_name == port_name)
            .cloned();
        native.or_else(|| self.find_by_port_name(port_name))
    }
}

#[derive(Default)]
pub struct FakeFrameSource {
    port: Option<PortDescriptor>,
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    fail_start: bool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeFrameSource {
    pub fn new(port: PortDescriptor) -> Self {
        Self {
            port: Some(port),
            ..Self::default()
        }
    }

    fn failing(port: PortDescriptor) -> Self {
        Self {
            port: Some(port),
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn port(&self) -> Option<&PortDescriptor> {
        self.port.as_ref()
    }

    /// Push a decoded frame as the decoder would. Returns `false` if stopped.
    pub fn emit_frame(&self, frame: TicFrame) -> bool {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => {
                sink.on_frame(frame.into_shared());
                true
            }
            None => false,
        }
    }

    /// Report a transport failure. Returns `false` if stopped.
    pub fn emit_error(&self, message: &str) -> bool {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => {
                sink.on_error(message);
                true
            }
            None => false,
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for FakeFrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeFrameSource")
            .field("port", &self.port)
            .field("running", &self.is_running())
            .field("starts", &self.start_count())
            .field("stops", &self.stop_count())
            .finish()
    }
}

impl FrameSource for FakeFrameSource {
    fn start(&self, sink: Arc<dyn FrameSink>) -> StreamResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            let port = self.port.as_ref().map(|p| p.port_name.clone()).unwrap_or_default();
            return Err(StreamError::transport(port, "port busy"));
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = None;
    }

    fn is_running(&self) -> bool {
        self.sink.lock().is_some()
    }
}

/// Factory recording every source it opens.
#[derive(Debug, Default)]
pub struct FakeSourceFactory {
    opened: Mutex<Vec<(PortDescriptor, TicMode, Arc<FakeFrameSource>)>>,
    failing_ports: Mutex<Vec<String>>,
}

impl FakeSourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources opened on `port_name` from now on fail to start.
    pub fn fail_port(&self, port_name: &str) {
        self.failing_ports.lock().push(port_name.to_string());
    }

    /// Most recent source opened on `port_name`.
    pub fn source(&self, port_name: &str) -> Option<Arc<FakeFrameSource>> {
        self.opened
            .lock()
            .iter()
            .rev()
            .find(|(port, _, _)| port.port_name == port_name)
            .map(|(_, _, source)| Arc::clone(source))
    }

    /// Most recent source on `port_name` that is still running.
    pub fn running_source(&self, port_name: &str) -> Option<Arc<FakeFrameSource>> {
        self.source(port_name).filter(|source| source.is_running())
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn open_count_for(&self, port_name: &str) -> usize {
        self.opened
            .lock()
            .iter()
            .filter(|(port, _, _)| port.port_name == port_name)
            .count()
    }

    pub fn running_count(&self) -> usize {
        self.opened
            .lock()
            .iter()
            .filter(|(_, _, source)| source.is_running())
            .count()
    }

    pub fn mode_for(&self, port_name: &str) -> Option<TicMode> {
        self.opened
            .lock()
            .iter()
            .rev()
            .find(|(port, _, _)| port.port_name == port_name)
            .map(|(_, mode, _)| *mode)
    }
}

impl FrameSourceFactory for FakeSourceFactory {
    fn open(&self, port: &PortDescriptor, mode: TicMode) -> StreamResult<Box<dyn FrameSource>> {
        let failing = self.failing_ports.lock().contains(&port.port_name);
        let source = Arc::new(if failing {
            FakeFrameSource::failing(port.clone())
        } else {
            FakeFrameSource::new(port.clone())
        });
        self.opened
            .lock()
            .push((port.clone(), mode, Arc::clone(&source)));
        Ok(Box::new(source))
    }
}

/// Listener recording frames and faults, optionally slow.
#[derive(Debug, Default)]
pub struct RecordingListener {
    frames: Mutex<Vec<StreamFrame>>,
    faults: Mutex<Vec<StreamFault>>,
    delay: Option<Duration>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Listener sleeping `delay` in every callback.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn frames(&self) -> Vec<StreamFrame> {
        self.frames.lock().clone()
    }

    pub fn faults(&self) -> Vec<StreamFault> {
        self.faults.lock().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn fault_count(&self) -> usize {
        self.faults.lock().len()
    }

    pub fn last_frame(&self) -> Option<StreamFrame> {
        self.frames.lock().last().cloned()
    }

    fn pause(&self) {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
    }
}

impl StreamListener for RecordingListener {
    fn on_data(&self, frame: &StreamFrame) {
        self.pause();
        self.frames.lock().push(frame.clone());
    }

    fn on_error(&self, fault: &StreamFault) {
        self.pause();
        self.faults.lock().push(fault.clone());
    }
}

/// Listener panicking on every frame.
#[derive(Debug, Default)]
pub struct PanickingListener {
    calls: AtomicUsize,
}

impl PanickingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StreamListener for PanickingListener {
    fn on_data(&self, _frame: &StreamFrame) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("PanickingListener: on_data");
    }

    fn on_error(&self, _fault: &StreamFault) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("PanickingListener: on_error");
    }
}

/// Upcast a concrete listener for the orchestrator API.
pub fn as_listener<L: StreamListener + 'static>(listener: &Arc<L>) -> Arc<dyn StreamListener> {
    Arc::clone(listener) as Arc<dyn StreamListener>
}
