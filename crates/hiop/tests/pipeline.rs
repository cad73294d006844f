// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end pipeline tests over the in-process transport.

use hiop::reference::Endpoint;
use hiop::transport::inproc::InProcNetwork;
use hiop::{
    slot_value, ClientRequestInfo, ClientRequestInterceptor, Current, InvokeReply, Orb, OrbError,
    OrbResult, PointResult, Servant, ServantReply, ServerRequestInfo, ServerRequestInterceptor,
    ServiceContext, SlotId, SlotScope, U64Codec,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Echoes the argument payload back.
struct Echo;

impl Servant for Echo {
    fn invoke(
        &self,
        _operation: &str,
        args: &[u8],
        _current: &mut Current<'_>,
    ) -> OrbResult<ServantReply> {
        Ok(ServantReply::Normal(args.to_vec()))
    }
}

/// Fails every operation with an application exception.
struct Grumpy;

impl Servant for Grumpy {
    fn invoke(
        &self,
        operation: &str,
        _args: &[u8],
        _current: &mut Current<'_>,
    ) -> OrbResult<ServantReply> {
        Err(OrbError::Exception(format!("refusing {}", operation)))
    }
}

/// Records every point it observes.
struct Tracer {
    name: &'static str,
    trace: Arc<Mutex<Vec<String>>>,
}

impl Tracer {
    fn new(name: &'static str, trace: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            trace: trace.clone(),
        })
    }

    fn hit(&self, point: &str) {
        self.trace.lock().push(format!("{}:{}", self.name, point));
    }
}

impl ServerRequestInterceptor for Tracer {
    fn name(&self) -> &str {
        self.name
    }
    fn receive_request_service_contexts(&self, _ri: &mut ServerRequestInfo) -> PointResult {
        self.hit("rrsc");
        Ok(())
    }
    fn receive_request(&self, _ri: &mut ServerRequestInfo) -> PointResult {
        self.hit("rr");
        Ok(())
    }
    fn send_reply(&self, _ri: &mut ServerRequestInfo) -> PointResult {
        self.hit("sr");
        Ok(())
    }
    fn send_exception(&self, _ri: &mut ServerRequestInfo) -> PointResult {
        self.hit("se");
        Ok(())
    }
}

impl ClientRequestInterceptor for Tracer {
    fn name(&self) -> &str {
        self.name
    }
    fn send_request(&self, _ri: &mut ClientRequestInfo) -> PointResult {
        self.hit("sreq");
        Ok(())
    }
    fn receive_reply(&self, _ri: &mut ClientRequestInfo) -> PointResult {
        self.hit("rrep");
        Ok(())
    }
    fn receive_exception(&self, _ri: &mut ClientRequestInfo) -> PointResult {
        self.hit("rexc");
        Ok(())
    }
}

#[test]
fn test_echo_round_trip() {
    let net = InProcNetwork::new();
    let server = Orb::builder().transport(net.clone()).build().unwrap();
    server.register_servant("echo", Arc::new(Echo));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder().transport(net).build().unwrap();
    let token = client.allocate_token();
    let target = hiop::ObjectRef::new(bound, "echo");

    let reply = client.invoke(token, &target, "ping", b"payload").unwrap();
    assert_eq!(reply, InvokeReply::Reply(b"payload".to_vec()));
}

#[test]
fn test_interceptors_run_in_registration_order_end_to_end() {
    let net = InProcNetwork::new();
    let server_trace = Arc::new(Mutex::new(Vec::new()));
    let client_trace = Arc::new(Mutex::new(Vec::new()));

    let server = Orb::builder()
        .transport(net.clone())
        .add_server_interceptor(Tracer::new("a", &server_trace))
        .add_server_interceptor(Tracer::new("b", &server_trace))
        .build()
        .unwrap();
    server.register_servant("echo", Arc::new(Echo));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder()
        .transport(net)
        .add_client_interceptor(Tracer::new("x", &client_trace))
        .add_client_interceptor(Tracer::new("y", &client_trace))
        .build()
        .unwrap();
    let token = client.allocate_token();
    let target = hiop::ObjectRef::new(bound, "echo");
    client.invoke(token, &target, "ping", b"").unwrap();

    assert_eq!(
        client_trace.lock().clone(),
        vec!["x:sreq", "y:sreq", "x:rrep", "y:rrep"]
    );
    assert_eq!(
        server_trace.lock().clone(),
        vec!["a:rrsc", "b:rrsc", "a:rr", "b:rr", "a:sr", "b:sr"]
    );
}

#[test]
fn test_inbound_error_skips_servant_and_runs_full_exception_point() {
    /// Rejects every request at receive_request.
    struct Gate {
        trace: Arc<Mutex<Vec<String>>>,
    }
    impl ServerRequestInterceptor for Gate {
        fn name(&self) -> &str {
            "gate"
        }
        fn receive_request(&self, _ri: &mut ServerRequestInfo) -> PointResult {
            self.trace.lock().push("gate:rr".into());
            Err(OrbError::Exception("denied".into()))
        }
        fn send_exception(&self, _ri: &mut ServerRequestInfo) -> PointResult {
            self.trace.lock().push("gate:se".into());
            Ok(())
        }
    }

    /// Panics the test if the servant ever runs.
    struct MustNotRun;
    impl Servant for MustNotRun {
        fn invoke(
            &self,
            _operation: &str,
            _args: &[u8],
            _current: &mut Current<'_>,
        ) -> OrbResult<ServantReply> {
            panic!("servant must not run after an inbound interceptor error");
        }
    }

    let net = InProcNetwork::new();
    let trace = Arc::new(Mutex::new(Vec::new()));
    let server = Orb::builder()
        .transport(net.clone())
        .add_server_interceptor(Arc::new(Gate {
            trace: trace.clone(),
        }))
        .add_server_interceptor(Tracer::new("after", &trace))
        .build()
        .unwrap();
    server.register_servant("obj", Arc::new(MustNotRun));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder().transport(net).build().unwrap();
    let token = client.allocate_token();
    let target = hiop::ObjectRef::new(bound, "obj");

    let err = client.invoke(token, &target, "op", b"").unwrap_err();
    assert_eq!(err, OrbError::Exception("denied".into()));
    // "after" saw the contexts point, was skipped at receive_request, and
    // still observed the exception point.
    assert_eq!(
        trace.lock().clone(),
        vec!["after:rrsc", "gate:rr", "gate:se", "after:se"]
    );
}

#[test]
fn test_application_exception_reaches_the_caller() {
    let net = InProcNetwork::new();
    let server = Orb::builder().transport(net.clone()).build().unwrap();
    server.register_servant("grumpy", Arc::new(Grumpy));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder().transport(net).build().unwrap();
    let token = client.allocate_token();
    let target = hiop::ObjectRef::new(bound, "grumpy");

    let err = client.invoke(token, &target, "work", b"").unwrap_err();
    assert_eq!(err, OrbError::Exception("refusing work".into()));
}

#[test]
fn test_unknown_object_key() {
    let net = InProcNetwork::new();
    let server = Orb::builder().transport(net.clone()).build().unwrap();
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder().transport(net).build().unwrap();
    let token = client.allocate_token();
    let target = hiop::ObjectRef::new(bound, "missing");

    let err = client.invoke(token, &target, "op", b"").unwrap_err();
    assert_eq!(err, OrbError::NoSuchObject("missing".into()));
}

#[test]
fn test_timeout_is_distinct_from_application_exception() {
    /// Never replies in time.
    struct Sleepy;
    impl Servant for Sleepy {
        fn invoke(
            &self,
            _operation: &str,
            _args: &[u8],
            _current: &mut Current<'_>,
        ) -> OrbResult<ServantReply> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(ServantReply::Normal(Vec::new()))
        }
    }

    let net = InProcNetwork::new();
    let server = Orb::builder().transport(net.clone()).build().unwrap();
    server.register_servant("sleepy", Arc::new(Sleepy));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder()
        .transport(net)
        .request_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let token = client.allocate_token();
    let target = hiop::ObjectRef::new(bound, "sleepy");

    let err = client.invoke(token, &target, "nap", b"").unwrap_err();
    assert_eq!(err, OrbError::Timeout);
}

#[test]
fn test_connect_failure_still_runs_exception_point() {
    let net = InProcNetwork::new();
    let trace = Arc::new(Mutex::new(Vec::new()));
    let client = Orb::builder()
        .transport(net)
        .add_client_interceptor(Tracer::new("t", &trace))
        .build()
        .unwrap();
    let token = client.allocate_token();
    let target = hiop::ObjectRef::new(Endpoint::new("nowhere", 9), "obj");

    let err = client.invoke(token, &target, "op", b"").unwrap_err();
    assert!(matches!(err, OrbError::Transport(_)));
    assert_eq!(trace.lock().clone(), vec!["t:rexc"]);
}

#[test]
fn test_forward_outcome_runs_other_points() {
    /// Redirects every call to a fallback reference.
    struct Mover;
    impl Servant for Mover {
        fn invoke(
            &self,
            _operation: &str,
            _args: &[u8],
            _current: &mut Current<'_>,
        ) -> OrbResult<ServantReply> {
            Ok(ServantReply::Forward(hiop::ObjectRef::new(
                Endpoint::new("elsewhere", 4242),
                "moved",
            )))
        }
    }

    struct OtherWatch {
        trace: Arc<Mutex<Vec<String>>>,
    }
    impl ServerRequestInterceptor for OtherWatch {
        fn name(&self) -> &str {
            "srv-watch"
        }
        fn send_other(&self, ri: &mut ServerRequestInfo) -> PointResult {
            let target = ri
                .forward_reference()
                .map(|r| r.to_string())
                .unwrap_or_default();
            self.trace.lock().push(format!("srv-other:{target}"));
            Ok(())
        }
    }
    impl ClientRequestInterceptor for OtherWatch {
        fn name(&self) -> &str {
            "cli-watch"
        }
        fn receive_other(&self, ri: &mut ClientRequestInfo) -> PointResult {
            let target = ri
                .forward_reference()
                .map(|r| r.to_string())
                .unwrap_or_default();
            self.trace.lock().push(format!("cli-other:{target}"));
            Ok(())
        }
    }

    let net = InProcNetwork::new();
    let trace = Arc::new(Mutex::new(Vec::new()));
    let server = Orb::builder()
        .transport(net.clone())
        .add_server_interceptor(Arc::new(OtherWatch {
            trace: trace.clone(),
        }))
        .build()
        .unwrap();
    server.register_servant("mover", Arc::new(Mover));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder()
        .transport(net)
        .add_client_interceptor(Arc::new(OtherWatch {
            trace: trace.clone(),
        }))
        .build()
        .unwrap();
    let token = client.allocate_token();
    let target = hiop::ObjectRef::new(bound, "mover");

    let reply = client.invoke(token, &target, "go", b"").unwrap();
    match reply {
        InvokeReply::Other(objref) => {
            assert_eq!(objref.object_key, "moved");
            assert_eq!(objref.endpoint, Endpoint::new("elsewhere", 4242));
        }
        other => panic!("expected a redirect, got {other:?}"),
    }
    assert_eq!(
        trace.lock().clone(),
        vec![
            "srv-other:moved@elsewhere:4242",
            "cli-other:moved@elsewhere:4242",
        ]
    );
}

const PROPAGATION_TAG: u32 = 100;

/// Client half of slot propagation: copies the request-scope slot into an
/// outbound service context.
struct SlotSender {
    slot: SlotId,
}

impl ClientRequestInterceptor for SlotSender {
    fn name(&self) -> &str {
        "slot-sender"
    }
    fn send_request(&self, ri: &mut ClientRequestInfo) -> PointResult {
        if let Some(v) = ri.get_slot(self.slot)? {
            if let Some(n) = v.downcast_ref::<u64>() {
                let data = {
                    use hiop::ContextCodec;
                    U64Codec.encode(n)?
                };
                ri.add_request_service_context(ServiceContext::new(PROPAGATION_TAG, data), true)?;
            }
        }
        Ok(())
    }
}

/// Server half: decodes the context, triples it, stores it in thread scope.
struct SlotReceiver {
    slot: SlotId,
}

impl ServerRequestInterceptor for SlotReceiver {
    fn name(&self) -> &str {
        "slot-receiver"
    }
    fn receive_request_service_contexts(&self, ri: &mut ServerRequestInfo) -> PointResult {
        if let Some(n) = ri
            .request_contexts()
            .decode_with(PROPAGATION_TAG, &U64Codec)?
        {
            ri.set_slot(SlotScope::Thread, self.slot, Some(slot_value(n * 3)))?;
        }
        Ok(())
    }
}

/// Returns the thread-scope slot as little-endian bytes.
struct SlotReader {
    slot: SlotId,
}

impl Servant for SlotReader {
    fn invoke(
        &self,
        _operation: &str,
        _args: &[u8],
        current: &mut Current<'_>,
    ) -> OrbResult<ServantReply> {
        let n = match current.get_slot(SlotScope::Thread, self.slot)? {
            Some(v) => *v.downcast_ref::<u64>().unwrap_or(&0),
            None => 0,
        };
        Ok(ServantReply::Normal(n.to_le_bytes().to_vec()))
    }
}

#[test]
fn test_slot_propagates_without_leaking_back() {
    let net = InProcNetwork::new();

    let server_builder = Orb::builder().transport(net.clone());
    let server_slot = server_builder.allocate_slot_id().unwrap();
    let server = server_builder
        .add_server_interceptor(Arc::new(SlotReceiver { slot: server_slot }))
        .build()
        .unwrap();
    server.register_servant("reader", Arc::new(SlotReader { slot: server_slot }));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client_builder = Orb::builder().transport(net);
    let client_slot = client_builder.allocate_slot_id().unwrap();
    let client = client_builder
        .add_client_interceptor(Arc::new(SlotSender { slot: client_slot }))
        .build()
        .unwrap();

    let token = client.allocate_token();
    client
        .current()
        .set_thread_slot(token, client_slot, Some(slot_value(4u64)))
        .unwrap();

    let target = hiop::ObjectRef::new(bound, "reader");
    let reply = client.invoke(token, &target, "read", b"").unwrap();
    assert_eq!(reply, InvokeReply::Reply(12u64.to_le_bytes().to_vec()));

    // The server-side mutation never leaks into the caller's thread scope.
    let v = client
        .current()
        .get_thread_slot(token, client_slot)
        .unwrap()
        .unwrap();
    assert_eq!(v.downcast_ref::<u64>(), Some(&4));
}

#[test]
fn test_reply_contexts_reach_client_interceptors() {
    const REPLY_TAG: u32 = 77;

    struct Stamp;
    impl ServerRequestInterceptor for Stamp {
        fn name(&self) -> &str {
            "stamp"
        }
        fn send_reply(&self, ri: &mut ServerRequestInfo) -> PointResult {
            ri.add_reply_service_context(ServiceContext::new(REPLY_TAG, vec![1, 2, 3]), true)
        }
    }

    struct Check {
        seen: Arc<Mutex<Option<Vec<u8>>>>,
    }
    impl ClientRequestInterceptor for Check {
        fn name(&self) -> &str {
            "check"
        }
        fn receive_reply(&self, ri: &mut ClientRequestInfo) -> PointResult {
            *self.seen.lock() = ri.reply_contexts().get(REPLY_TAG).map(|c| c.data.clone());
            Ok(())
        }
    }

    let net = InProcNetwork::new();
    let server = Orb::builder()
        .transport(net.clone())
        .add_server_interceptor(Arc::new(Stamp))
        .build()
        .unwrap();
    server.register_servant("echo", Arc::new(Echo));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let seen = Arc::new(Mutex::new(None));
    let client = Orb::builder()
        .transport(net)
        .add_client_interceptor(Arc::new(Check { seen: seen.clone() }))
        .build()
        .unwrap();
    let token = client.allocate_token();
    let target = hiop::ObjectRef::new(bound, "echo");
    client.invoke(token, &target, "ping", b"").unwrap();

    assert_eq!(seen.lock().clone(), Some(vec![1, 2, 3]));
}

#[test]
fn test_multiplex_limit_serializes_excess_calls() {
    /// Holds each request long enough to observe overlap.
    struct Slow;
    impl Servant for Slow {
        fn invoke(
            &self,
            _operation: &str,
            args: &[u8],
            _current: &mut Current<'_>,
        ) -> OrbResult<ServantReply> {
            std::thread::sleep(Duration::from_millis(100));
            Ok(ServantReply::Normal(args.to_vec()))
        }
    }

    let net = InProcNetwork::new();
    let server = Orb::builder()
        .transport(net.clone())
        .callback_workers(4)
        .build()
        .unwrap();
    server.register_servant("slow", Arc::new(Slow));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder()
        .transport(net)
        .multiplex_limit(1)
        .build()
        .unwrap();
    let target = hiop::ObjectRef::new(bound, "slow");

    let started = std::time::Instant::now();
    let mut handles = Vec::new();
    for _ in 0..2 {
        let client = client.clone();
        let target = target.clone();
        handles.push(std::thread::spawn(move || {
            let token = client.allocate_token();
            client.invoke(token, &target, "work", b"x").unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    // With one permit the second call cannot start before the first reply.
    assert!(started.elapsed() >= Duration::from_millis(200));
}

/// Wraps the in-process network and stalls every dial to one host.
struct SlowDialNetwork {
    inner: Arc<InProcNetwork>,
    slow_host: &'static str,
    delay: Duration,
}

impl hiop::transport::Transport for SlowDialNetwork {
    fn connect(
        &self,
        endpoint: &Endpoint,
        sink: Arc<dyn hiop::transport::FrameSink>,
    ) -> OrbResult<Arc<dyn hiop::transport::WireChannel>> {
        if endpoint.host == self.slow_host {
            std::thread::sleep(self.delay);
        }
        self.inner.connect(endpoint, sink)
    }

    fn listen(
        &self,
        endpoint: &Endpoint,
        acceptor: Arc<dyn hiop::transport::ChannelAcceptor>,
    ) -> OrbResult<Endpoint> {
        self.inner.listen(endpoint, acceptor)
    }
}

#[test]
fn test_slow_dial_does_not_stall_cached_connections() {
    let net = InProcNetwork::new();
    let server = Orb::builder().transport(net.clone()).build().unwrap();
    server.register_servant("echo", Arc::new(Echo));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder()
        .transport(Arc::new(SlowDialNetwork {
            inner: net,
            slow_host: "molasses",
            delay: Duration::from_secs(1),
        }))
        .build()
        .unwrap();
    let target = hiop::ObjectRef::new(bound, "echo");

    // Warm the route so the later call reuses the cached connection.
    let token = client.allocate_token();
    client.invoke(token, &target, "ping", b"warm").unwrap();

    let dialer = {
        let client = client.clone();
        std::thread::spawn(move || {
            let token = client.allocate_token();
            let far = hiop::ObjectRef::new(Endpoint::new("molasses", 9), "obj");
            // Fails after the stalled dial: nothing listens there.
            client.invoke(token, &far, "op", b"").unwrap_err()
        })
    };
    // Let the dialer get stuck inside connect.
    std::thread::sleep(Duration::from_millis(100));

    let started = std::time::Instant::now();
    client.invoke(token, &target, "ping", b"again").unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(matches!(dialer.join().unwrap(), OrbError::Transport(_)));
}

#[test]
fn test_permit_wait_counts_against_the_deadline() {
    /// Sleeps far past every deadline.
    struct Stuck;
    impl Servant for Stuck {
        fn invoke(
            &self,
            _operation: &str,
            _args: &[u8],
            _current: &mut Current<'_>,
        ) -> OrbResult<ServantReply> {
            std::thread::sleep(Duration::from_secs(2));
            Ok(ServantReply::Normal(Vec::new()))
        }
    }

    let net = InProcNetwork::new();
    let server = Orb::builder()
        .transport(net.clone())
        .callback_workers(4)
        .build()
        .unwrap();
    server.register_servant("stuck", Arc::new(Stuck));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder()
        .transport(net)
        .multiplex_limit(1)
        .request_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let target = hiop::ObjectRef::new(bound, "stuck");

    let started = std::time::Instant::now();
    let mut handles = Vec::new();
    for _ in 0..2 {
        let client = client.clone();
        let target = target.clone();
        handles.push(std::thread::spawn(move || {
            let token = client.allocate_token();
            client.invoke(token, &target, "wait", b"").unwrap_err()
        }));
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), OrbError::Timeout);
    }
    // The call queued behind the permit times out at its own deadline
    // instead of restarting the clock once the permit frees.
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[test]
fn test_concurrent_calls_correlate_replies() {
    let net = InProcNetwork::new();
    let server = Orb::builder()
        .transport(net.clone())
        .callback_workers(4)
        .build()
        .unwrap();
    server.register_servant("echo", Arc::new(Echo));
    let bound = server.listen(&Endpoint::new("server", 0)).unwrap();

    let client = Orb::builder().transport(net).build().unwrap();
    let target = hiop::ObjectRef::new(bound, "echo");

    let mut handles = Vec::new();
    for i in 0..16u64 {
        let client = client.clone();
        let target = target.clone();
        handles.push(std::thread::spawn(move || {
            let token = client.allocate_token();
            let mut payload = i.to_le_bytes().to_vec();
            payload.resize(8 + fastrand::usize(..512), 0xEE);
            let reply = client.invoke(token, &target, "ping", &payload).unwrap();
            assert_eq!(reply, InvokeReply::Reply(payload));
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
