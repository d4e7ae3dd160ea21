//! Unit tests for the plugin server.

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::thread;

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::handshake::HandshakeContract;
use crate::protocol::RpcClient;

#[fixture]
fn server() -> PluginServer {
    PluginServer::new("0.2.19", ApiVersion::new(5, 0))
        .register(
            CapabilityKind::Provisioner,
            "comment",
            |method: &str, payload: Value| match method {
                "prepare" => Ok(json!({ "echo": payload })),
                other => Err(format!("unsupported method {other}")),
            },
        )
        .register(CapabilityKind::DataSource, "clock", |_: &str, _: Value| {
            Ok::<_, String>(json!(0))
        })
}

#[derive(Default)]
struct ScriptedTransport {
    requests: VecDeque<Vec<u8>>,
    responses: Vec<ResponseEnvelope>,
}

impl ScriptedTransport {
    fn with(requests: &[Request]) -> Self {
        let requests = requests
            .iter()
            .zip(1..)
            .map(|(request, id)| {
                serde_json::to_vec(&RequestEnvelope {
                    id,
                    request: request.clone(),
                })
                .expect("encode")
            })
            .collect();
        Self {
            requests,
            responses: Vec::new(),
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        self.responses
            .push(serde_json::from_slice(message).expect("decode response"));
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        self.requests.pop_front().ok_or(TransportError::Closed)
    }
}

fn call(kind: CapabilityKind, component: &str, method: &str) -> Request {
    Request::Call {
        capability: kind,
        component: component.to_owned(),
        method: method.to_owned(),
        payload: json!({"line": "hello"}),
    }
}

#[rstest]
fn registration_is_reflected_in_description(server: PluginServer) {
    let description = server.description();
    assert_eq!(description.version(), "0.2.19");
    assert!(description.provides(CapabilityKind::Provisioner, "comment"));
    assert!(description.provides(CapabilityKind::DataSource, "clock"));
    assert!(!description.provides(CapabilityKind::Builder, "comment"));
}

#[rstest]
fn answers_describe(server: PluginServer) {
    let mut transport = ScriptedTransport::with(&[Request::Describe]);
    server.serve_transport(&mut transport).expect("serve");

    let [response] = transport.responses.as_slice() else {
        panic!("expected one response, got {:?}", transport.responses);
    };
    assert_eq!(response.id, 1);
    let Outcome::Ok { value } = &response.outcome else {
        panic!("describe failed: {:?}", response.outcome);
    };
    let description: PluginDescription =
        serde_json::from_value(value.clone()).expect("description");
    assert_eq!(&description, server.description());
}

#[rstest]
#[case::handled(
    call(CapabilityKind::Provisioner, "comment", "prepare"),
    Outcome::Ok { value: json!({"echo": {"line": "hello"}}) }
)]
#[case::handler_error(
    call(CapabilityKind::Provisioner, "comment", "explode"),
    Outcome::Error { message: String::from("unsupported method explode") }
)]
#[case::wrong_kind(
    call(CapabilityKind::Builder, "comment", "prepare"),
    Outcome::Error { message: String::from("no builder named 'comment' is registered") }
)]
fn dispatches_calls(server: PluginServer, #[case] request: Request, #[case] expected: Outcome) {
    let mut transport = ScriptedTransport::with(&[request]);
    server.serve_transport(&mut transport).expect("serve");
    let outcomes: Vec<&Outcome> = transport.responses.iter().map(|r| &r.outcome).collect();
    assert_eq!(outcomes, [&expected]);
}

#[rstest]
fn shutdown_stops_the_loop(server: PluginServer) {
    let mut transport = ScriptedTransport::with(&[Request::Shutdown, Request::Describe]);
    server.serve_transport(&mut transport).expect("serve");
    assert_eq!(transport.responses.len(), 1);
    assert_eq!(transport.requests.len(), 1, "describe left unread");
}

#[rstest]
fn undecodable_requests_are_skipped(server: PluginServer) {
    let mut transport = ScriptedTransport::with(&[Request::Describe]);
    transport.requests.push_front(b"{not json".to_vec());
    server.serve_transport(&mut transport).expect("serve");
    assert_eq!(transport.responses.len(), 1);
}

fn environment(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

#[rstest]
fn environment_from_host_contract_is_accepted(server: PluginServer) {
    let host: HashMap<String, String> = HandshakeContract::default()
        .environment()
        .into_iter()
        .collect();
    server
        .check_environment(|key| host.get(key).cloned())
        .expect("accepted");
}

#[rstest]
#[case::missing(environment(&[]))]
#[case::wrong(environment(&[(MAGIC_COOKIE_KEY, "nope")]))]
fn missing_cookie_is_refused(server: PluginServer, #[case] host: HashMap<String, String>) {
    let error = server
        .check_environment(|key| host.get(key).cloned())
        .expect_err("refused");
    assert!(matches!(
        error,
        PluginError::MagicCookieMismatch {
            variable: MAGIC_COOKIE_KEY
        }
    ));
}

#[rstest]
fn unsupported_protocol_versions_are_refused(server: PluginServer) {
    let host = environment(&[
        (MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE),
        (PROTOCOL_VERSIONS_KEY, "3,4"),
    ]);
    let error = server
        .check_environment(|key| host.get(key).cloned())
        .expect_err("refused");
    assert!(matches!(error, PluginError::IncompatibleProtocol { .. }));
}

#[test]
fn announce_writes_a_negotiable_handshake() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
    let mut out = Vec::new();
    PluginServer::announce(&listener, &mut out).expect("announce");

    let line = String::from_utf8(out).expect("utf8");
    assert!(line.ends_with('\n'));
    let handshake = Handshake::parse(&line).expect("parse");
    let endpoint = HandshakeContract::default()
        .negotiate(&handshake)
        .expect("negotiate");
    assert_eq!(endpoint.network, Network::Tcp);
    assert_eq!(
        endpoint.address,
        listener.local_addr().expect("addr").to_string()
    );
}

#[rstest]
fn serves_a_real_connection(server: PluginServer) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
    let address = listener.local_addr().expect("addr");
    let worker = thread::spawn(move || server.serve_on(&listener));

    let stream = TcpStream::connect(address).expect("connect");
    let reader = stream.try_clone().expect("clone");
    let mut client = RpcClient::new(LineTransport::new(reader, stream));
    let outcome = client
        .request(call(CapabilityKind::Provisioner, "comment", "prepare"))
        .expect("call");
    assert_eq!(
        outcome,
        Outcome::Ok {
            value: json!({"echo": {"line": "hello"}})
        }
    );
    client.request(Request::Shutdown).expect("shutdown");

    worker.join().expect("join").expect("served");
}
