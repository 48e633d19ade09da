//! End-to-end tests: a fake router on one side, a TCP JSON-RPC client on the
//! other, with the full gateway in between.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    sha2::{Digest, Sha256},
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::{TcpListener, TcpStream, tcp::OwnedReadHalf, tcp::OwnedWriteHalf},
    },
    tokio_util::codec::Framed,
};

use {
    mudgate_config::{ChannelDef, CredentialConfig, MudgateConfig, RouterHostConfig},
    mudgate_gateway::Gateway,
    mudgate_packet::{Header, MudInfo, MudlistPacket, Packet, StartupReplyPacket},
    mudgate_wire::{FrameCodec, Value as WireValue, ValueMap},
};

const WAIT: Duration = Duration::from_secs(5);

fn key_hash(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn test_config(router_port: u16, tcp_port: u16) -> MudgateConfig {
    let mut config = MudgateConfig::default();
    config.mud.name = "Alpha".into();
    config.mud.port = 4000;
    config.mud.admin_email = "admin@alpha.example".into();
    config.routers.push(RouterHostConfig {
        name: "*i3".into(),
        host: "127.0.0.1".into(),
        port: router_port,
        password: 0,
    });
    config.connection.reconnect_delay_s = 1;
    config.connection.reconnect_delay_cap_s = 1;
    config.api.host = "127.0.0.1".into();
    config.api.websocket.enabled = false;
    config.api.tcp.enabled = true;
    config.api.tcp.port = tcp_port;
    config.auth.credentials.push(CredentialConfig {
        key_hash: key_hash("k1"),
        mud_name: "Alpha".into(),
        permissions: vec!["*".into()],
        rate_limit_override: None,
    });
    config.auth.credentials.push(CredentialConfig {
        key_hash: key_hash("k2"),
        mud_name: "Alpha".into(),
        permissions: vec!["info".into()],
        rate_limit_override: None,
    });
    config.channels.default_channels.push(ChannelDef {
        name: "chat".into(),
        channel_type: "public".into(),
        owner_mud: "*i3".into(),
    });
    config
}

type RouterFramed = Framed<TcpStream, FrameCodec>;

struct Fixture {
    gateway: Gateway,
    router_listener: TcpListener,
    router: RouterFramed,
    tcp_port: u16,
}

impl Fixture {
    /// Boot the gateway, complete the router handshake, and seed Beta as an
    /// online mud.
    async fn start() -> Self {
        let router_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let router_port = router_listener.local_addr().unwrap().port();
        let tcp_port = free_port();

        let gateway = Gateway::build(test_config(router_port, tcp_port));
        let run_gateway = Gateway {
            core: Arc::clone(&gateway.core),
            registry: Arc::clone(&gateway.registry),
        };
        tokio::spawn(async move {
            let _ = run_gateway.run().await;
        });

        let mut router = accept_router(&router_listener).await;
        complete_handshake(&mut router).await;
        seed_beta(&mut router).await;

        // Wait until the mudlist diff is visible to the dispatcher.
        wait_until(|| gateway.core.state.get_mud("Beta").is_some()).await;

        Self {
            gateway,
            router_listener,
            router,
            tcp_port,
        }
    }

    async fn client(&self, api_key: &str) -> Client {
        let mut client = Client::connect(self.tcp_port).await;
        let welcome = client.next_message().await;
        assert_eq!(welcome["method"], "welcome");
        client
            .request(1, "authenticate", json!({ "api_key": api_key }))
            .await;
        let response = client.wait_for_id(1).await;
        assert_eq!(response["result"]["status"], "authenticated");
        client
    }
}

async fn accept_router(listener: &TcpListener) -> RouterFramed {
    let (socket, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("router accept timed out")
        .unwrap();
    Framed::new(socket, FrameCodec::default())
}

async fn router_recv(router: &mut RouterFramed) -> Packet {
    let value = tokio::time::timeout(WAIT, router.next())
        .await
        .expect("router read timed out")
        .expect("router socket closed")
        .unwrap();
    Packet::from_value(&value).unwrap()
}

async fn complete_handshake(router: &mut RouterFramed) {
    let startup = router_recv(router).await;
    assert_eq!(startup.kind(), mudgate_packet::PacketKind::StartupReq3);
    let reply = Packet::StartupReply(StartupReplyPacket {
        header: Header::new("*i3", "", "Alpha", ""),
        router_list: vec![("*i3".into(), "127.0.0.1 8080".into())],
        password: 1,
    });
    router.send(reply.to_value()).await.unwrap();
}

async fn seed_beta(router: &mut RouterFramed) {
    let mudlist = Packet::Mudlist(MudlistPacket {
        header: Header::new("*i3", "", "Alpha", ""),
        mudlist_id: 1,
        entries: vec![(
            "Beta".into(),
            Some(MudInfo {
                state: -1,
                host: "beta.example".into(),
                player_port: 5000,
                tcp_port: 0,
                udp_port: 0,
                mudlib: "BetaLib".into(),
                base_mudlib: "LPMud".into(),
                driver: "FluffOS".into(),
                mud_type: "LP".into(),
                open_status: "open".into(),
                admin_email: "admin@beta.example".into(),
                services: vec![("tell".into(), 1)],
                other_data: ValueMap::new(),
            }),
        )],
    });
    router.send(mudlist.to_value()).await.unwrap();
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(port: u16) -> Self {
        let stream = tokio::time::timeout(WAIT, async {
            loop {
                match TcpStream::connect(("127.0.0.1", port)).await {
                    Ok(stream) => return stream,
                    Err(_) => tokio::time::sleep(Duration::from_millis(25)).await,
                }
            }
        })
        .await
        .expect("client connect timed out");
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    async fn send_raw(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn request(&mut self, id: i64, method: &str, params: Value) {
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        self.send_raw(&body.to_string()).await;
    }

    async fn next_message(&mut self) -> Value {
        let mut line = String::new();
        tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("client read timed out")
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    /// Skip interleaved notifications until the response with `id` arrives.
    async fn wait_for_id(&mut self, id: i64) -> Value {
        loop {
            let message = self.next_message().await;
            if message.get("id") == Some(&json!(id)) {
                return message;
            }
        }
    }

    /// Skip other traffic until a notification with `method` arrives.
    async fn wait_for_notification(&mut self, method: &str) -> Value {
        loop {
            let message = self.next_message().await;
            if message.get("method") == Some(&json!(method)) {
                return message;
            }
        }
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tell_round_trip() {
    let mut fixture = Fixture::start().await;
    let mut client = fixture.client("k1").await;

    client
        .request(
            2,
            "tell",
            json!({
                "target_mud": "Beta",
                "target_user": "bob",
                "message": "hi",
                "from_user": "alice",
            }),
        )
        .await;

    // The router sees exactly the eight-position tell sequence.
    let packet = router_recv(&mut fixture.router).await;
    let values = packet.to_values();
    assert_eq!(
        values,
        vec![
            WireValue::Str("tell".into()),
            WireValue::Int(200),
            WireValue::Str("Alpha".into()),
            WireValue::Str("alice".into()),
            WireValue::Str("Beta".into()),
            WireValue::Str("bob".into()),
            WireValue::Str("alice".into()),
            WireValue::Str("hi".into()),
        ]
    );

    let response = client.wait_for_id(2).await;
    assert_eq!(response["result"]["status"], "sent");
    let message_id = response["result"]["message_id"].as_str().unwrap();
    assert!(message_id.starts_with("tell_Alpha_"), "{message_id}");
}

#[tokio::test]
async fn test_inbound_channel_message_fans_out_to_subscribers() {
    let mut fixture = Fixture::start().await;
    let mut client = fixture.client("k1").await;

    client.request(2, "channel_join", json!({ "channel": "chat" })).await;
    assert_eq!(client.wait_for_id(2).await["result"]["status"], "joined");
    // The join tunes the mud in at the router.
    let listen = router_recv(&mut fixture.router).await;
    assert_eq!(listen.kind(), mudgate_packet::PacketKind::ChannelListen);

    // Router broadcast, integer-zero addressed.
    let frame = WireValue::List(vec![
        WireValue::Str("channel-m".into()),
        WireValue::Int(199),
        WireValue::Str("Beta".into()),
        WireValue::Str("bob".into()),
        WireValue::Int(0),
        WireValue::Int(0),
        WireValue::Str("chat".into()),
        WireValue::Str("Bob".into()),
        WireValue::Str("hello all".into()),
    ]);
    fixture.router.send(frame).await.unwrap();

    let notification = client.wait_for_notification("channel_message").await;
    let params = &notification["params"];
    assert_eq!(params["channel"], "chat");
    assert_eq!(params["from_mud"], "Beta");
    assert_eq!(params["from_user"], "bob");
    assert_eq!(params["visname"], "Bob");
    assert_eq!(params["message"], "hello all");
    assert!(params["timestamp"].is_string());

    // History gained the entry.
    let history = fixture
        .gateway
        .core
        .state
        .history_read("chat", 10, None, None)
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body, "hello all");
}

#[tokio::test]
async fn test_unknown_destination_fails_and_notifies() {
    let fixture = Fixture::start().await;
    let mut client = fixture.client("k1").await;

    client
        .request(
            2,
            "tell",
            json!({
                "target_mud": "Ghost",
                "target_user": "bob",
                "message": "hi",
                "from_user": "alice",
            }),
        )
        .await;

    let response = client.wait_for_id(2).await;
    assert_eq!(response["result"]["status"], "failed");
    assert_eq!(response["result"]["error"], "unk-dst");

    let notification = client.wait_for_notification("error_occurred").await;
    assert_eq!(notification["params"]["error_code"], "unk-dst");
}

#[tokio::test]
async fn test_rate_limit_kicks_in_at_burst() {
    let fixture = Fixture::start().await;
    let mut client = fixture.client("k1").await;

    // Default burst is 20: the 21st immediate request is refused.
    for n in 0..20i64 {
        client.request(100 + n, "ping", json!({})).await;
        let response = client.wait_for_id(100 + n).await;
        assert!(response["result"]["pong"].as_bool().unwrap(), "request {n}");
    }
    client.request(200, "ping", json!({})).await;
    let response = client.wait_for_id(200).await;
    assert_eq!(response["error"]["code"], -32001);

    // After a second of idle the bucket has at least one token again.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    client.request(201, "ping", json!({})).await;
    let response = client.wait_for_id(201).await;
    assert!(response["result"]["pong"].as_bool().unwrap());
}

#[tokio::test]
async fn test_permission_denied_without_capability() {
    let fixture = Fixture::start().await;
    let mut client = fixture.client("k2").await;

    client
        .request(
            2,
            "tell",
            json!({ "target_mud": "Beta", "target_user": "bob", "message": "hi" }),
        )
        .await;
    let response = client.wait_for_id(2).await;
    assert_eq!(response["error"]["code"], -32002);

    // The info capability still works.
    client.request(3, "mudlist", json!({})).await;
    let response = client.wait_for_id(3).await;
    assert_eq!(response["result"]["status"], "success");
    assert_eq!(response["result"]["count"], 1);
}

#[tokio::test]
async fn test_unauthenticated_requests_are_refused() {
    let fixture = Fixture::start().await;
    let mut client = Client::connect(fixture.tcp_port).await;
    let welcome = client.next_message().await;
    assert_eq!(welcome["params"]["authentication"], "required");

    client.request(1, "ping", json!({})).await;
    let response = client.wait_for_id(1).await;
    assert_eq!(response["error"]["code"], -32000);

    client.request(2, "authenticate", json!({ "api_key": "wrong" })).await;
    let response = client.wait_for_id(2).await;
    assert_eq!(response["error"]["code"], -32000);
}

#[tokio::test]
async fn test_router_failover_reconnect_notifies_clients() {
    let mut fixture = Fixture::start().await;
    let mut client = fixture.client("k1").await;

    // Kill the router connection; the gateway must redial and re-handshake.
    drop(fixture.router);
    let mut router = accept_router(&fixture.router_listener).await;
    complete_handshake(&mut router).await;

    let notification = client.wait_for_notification("gateway_reconnected").await;
    assert_eq!(notification["params"]["status"], "connected");

    // Traffic resumes over the new connection.
    client
        .request(
            5,
            "tell",
            json!({ "target_mud": "Beta", "target_user": "bob", "message": "back", "from_user": "alice" }),
        )
        .await;
    let packet = router_recv(&mut router).await;
    assert_eq!(packet.kind(), mudgate_packet::PacketKind::Tell);
    assert_eq!(client.wait_for_id(5).await["result"]["status"], "sent");
}

#[tokio::test]
async fn test_batch_and_notification_semantics() {
    let fixture = Fixture::start().await;
    let mut client = fixture.client("k1").await;

    // Mixed batch: one call, one notification. Only the call is answered.
    let batch = json!([
        { "jsonrpc": "2.0", "id": 10, "method": "ping", "params": {} },
        { "jsonrpc": "2.0", "method": "heartbeat", "params": {} },
    ]);
    client.send_raw(&batch.to_string()).await;
    let response = client.next_message().await;
    let members = response.as_array().expect("batch response is an array");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["id"], 10);

    // A follow-up request still works (nothing stuck on the wire).
    client.request(11, "status", json!({})).await;
    let response = client.wait_for_id(11).await;
    assert_eq!(response["result"]["connected"], true);
    assert_eq!(response["result"]["mud_name"], "Alpha");
}

#[tokio::test]
async fn test_channel_history_rpc() {
    let mut fixture = Fixture::start().await;
    let mut client = fixture.client("k1").await;

    for n in 0..3 {
        let frame = WireValue::List(vec![
            WireValue::Str("channel-m".into()),
            WireValue::Int(199),
            WireValue::Str("Beta".into()),
            WireValue::Str("bob".into()),
            WireValue::Int(0),
            WireValue::Int(0),
            WireValue::Str("chat".into()),
            WireValue::Str("Bob".into()),
            WireValue::Str(format!("msg {n}")),
        ]);
        fixture.router.send(frame).await.unwrap();
    }
    wait_until(|| {
        fixture
            .gateway
            .core
            .state
            .history_read("chat", 10, None, None)
            .is_some_and(|h| h.len() == 3)
    })
    .await;

    client
        .request(2, "channel_history", json!({ "channel": "chat", "limit": 2 }))
        .await;
    let response = client.wait_for_id(2).await;
    assert_eq!(response["result"]["count"], 2);
    let messages = response["result"]["messages"].as_array().unwrap();
    assert_eq!(messages[0]["body"], "msg 1");
    assert_eq!(messages[1]["body"], "msg 2");

    client
        .request(3, "channel_history", json!({ "channel": "nochan" }))
        .await;
    let response = client.wait_for_id(3).await;
    assert_eq!(response["result"]["status"], "failed");
    assert_eq!(response["result"]["error"], "unk-channel");
}
