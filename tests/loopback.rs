use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use natprobe::client::{ClientConfig, ClientSession, DEFAULT_MESSAGE};
use natprobe::probe::{Payload, ProbeProtocol};
use natprobe::server::{ReplySession, ServerConfig, ServerStats};
use natprobe::transport::{CancelToken, Opener, Transport, UdpOpener};

fn opener(ip: Ipv4Addr) -> UdpOpener {
    UdpOpener {
        bind_ip: ip,
        poll_interval: Duration::from_millis(50),
    }
}

fn spawn_server(config: ServerConfig) -> (u16, thread::JoinHandle<ServerStats>) {
    let mut server = ReplySession::new(opener(Ipv4Addr::LOCALHOST), config, CancelToken::new());
    let port = server.start().unwrap().port();
    let handle = thread::spawn(move || server.run().unwrap());
    (port, handle)
}

fn client_config(port: u16) -> ClientConfig {
    let mut config = ClientConfig::new(ProbeProtocol::Udp, vec![Ipv4Addr::LOCALHOST]);
    config.port = port;
    config.timeout = Some(Duration::from_secs(5));
    config
}

fn text(payload: &Payload) -> &str {
    match payload {
        Payload::Text(t) => t,
        Payload::Echo { .. } => panic!("esperava texto"),
    }
}

#[test]
fn udp_reply_and_alternate_port_reply() {
    let mut config = ServerConfig::new(ProbeProtocol::Udp, 0);
    config.alternate_port = true;
    config.limit = Some(1);
    let (port, server) = spawn_server(config);

    let mut config = client_config(port);
    config.expect = Some(2);
    let report = ClientSession::new(opener(Ipv4Addr::LOCALHOST), config, CancelToken::new())
        .run()
        .unwrap();

    let stats = server.join().unwrap();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.replies, 2);

    assert_eq!(report.replies.len(), 2);
    assert_eq!(report.timeouts, 0);
    let ports: HashSet<u16> = report.replies.iter().map(|r| r.from.port()).collect();
    assert_eq!(ports.len(), 2);
    assert!(ports.contains(&port));

    let texts: HashSet<&str> = report.replies.iter().map(|r| text(&r.payload)).collect();
    let direct = format!("reply to {}", DEFAULT_MESSAGE);
    let alternate = format!("{} from other port", DEFAULT_MESSAGE);
    let expected: HashSet<&str> = [direct.as_str(), alternate.as_str()].into();
    assert_eq!(texts, expected);
}

#[test]
fn default_client_reports_alternate_port_reply() {
    let mut config = ServerConfig::new(ProbeProtocol::Udp, 0);
    config.alternate_port = true;
    config.limit = Some(1);
    let (port, server) = spawn_server(config);

    // Sem --expect: escuta até o timeout e reporta tudo o que chegar
    let mut config = ClientConfig::new(ProbeProtocol::Udp, vec![Ipv4Addr::LOCALHOST]);
    config.port = port;
    config.timeout = Some(Duration::from_secs(1));
    let report = ClientSession::new(opener(Ipv4Addr::LOCALHOST), config, CancelToken::new())
        .run()
        .unwrap();

    assert_eq!(server.join().unwrap().replies, 2);
    assert_eq!(report.replies.len(), 2);
    assert_eq!(report.timeouts, 0);
    let alternate = format!("{} from other port", DEFAULT_MESSAGE);
    assert!(report.replies.iter().any(|r| text(&r.payload) == alternate));
    assert!(report.replies.iter().any(|r| r.from.port() != port));
}

#[test]
fn udp_single_reply_leaves_second_wait_to_timeout() {
    let mut config = ServerConfig::new(ProbeProtocol::Udp, 0);
    config.limit = Some(1);
    let (port, server) = spawn_server(config);

    let mut config = client_config(port);
    config.expect = Some(2);
    config.timeout = Some(Duration::from_millis(500));
    let report = ClientSession::new(opener(Ipv4Addr::LOCALHOST), config, CancelToken::new())
        .run()
        .unwrap();

    assert_eq!(server.join().unwrap().replies, 1);
    assert_eq!(report.replies.len(), 1);
    assert_eq!(report.replies[0].from.port(), port);
    assert_eq!(report.timeouts, 1);
}

#[test]
fn udp_sweep_uses_new_source_port_each_iteration() {
    let mut config = ServerConfig::new(ProbeProtocol::Udp, 0);
    config.limit = Some(3);
    let (port, server) = spawn_server(config);

    let mut config = client_config(port);
    config.iterations = 3;
    config.expect = Some(1);
    let report = ClientSession::new(opener(Ipv4Addr::LOCALHOST), config, CancelToken::new())
        .run()
        .unwrap();

    assert_eq!(server.join().unwrap().received, 3);
    assert_eq!(report.replies.len(), 3);
    let sources: HashSet<u16> = report.sent.iter().map(|s| s.from.port()).collect();
    assert_eq!(sources.len(), 3);
}

#[cfg(target_os = "linux")]
#[test]
fn server_filter_drops_other_source() {
    let mut config = ServerConfig::new(ProbeProtocol::Udp, 0);
    config.filter = Some(Ipv4Addr::LOCALHOST);
    config.limit = Some(2);
    let (port, server) = spawn_server(config);
    let dst = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);

    // Linux aceita qualquer endereço de 127.0.0.0/8 na loopback
    let mut other = opener(Ipv4Addr::new(127, 0, 0, 2)).open(None).unwrap();
    other.send_to(b"from other", dst).unwrap();
    thread::sleep(Duration::from_millis(100));

    let mut config = client_config(port);
    config.expect = Some(1);
    let report = ClientSession::new(opener(Ipv4Addr::LOCALHOST), config, CancelToken::new())
        .run()
        .unwrap();

    let stats = server.join().unwrap();
    assert_eq!(stats.filtered, 1);
    assert_eq!(stats.received, 1);
    assert_eq!(report.replies.len(), 1);
    assert_eq!(text(&report.replies[0].payload), format!("reply to {}", DEFAULT_MESSAGE));
}
