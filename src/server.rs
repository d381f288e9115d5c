use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::{debug, info, trace};

use crate::error::Result;
use crate::icmp::{self, EchoKind};
use crate::probe::{self, Payload, ProbeProtocol};
use crate::transport::{CancelToken, Opener, Transport, recv_until};

pub const DEFAULT_SERVER_PORT: u16 = 7777;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub protocol: ProbeProtocol,
    /// Porta local (ignorada para ICMP).
    pub port: u16,
    /// UDP: responde também a partir de uma porta efêmera nova.
    pub alternate_port: bool,
    /// ICMP: responde Echo Requests com Echo Replies.
    pub echo_reply: bool,
    pub filter: Option<Ipv4Addr>,
    /// Encerra após tratar este número de pacotes (`None` = para sempre).
    pub limit: Option<u64>,
}

impl ServerConfig {
    pub fn new(protocol: ProbeProtocol, port: u16) -> Self {
        Self {
            protocol,
            port,
            alternate_port: false,
            echo_reply: false,
            filter: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Receiving,
    Replying,
    RepeatReceiving,
}

/// Resultado do tratamento de um pacote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Respostas enviadas; `sources` são os endereços locais de cada uma.
    Replied {
        from: SocketAddr,
        payload: Payload,
        sources: Vec<SocketAddr>,
    },
    /// Registrado sem resposta.
    Received { from: SocketAddr, payload: Payload },
    Filtered { from: SocketAddr },
    Malformed { from: SocketAddr },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub received: u64,
    pub replies: u64,
    pub filtered: u64,
    pub malformed: u64,
}

impl ServerStats {
    fn record(&mut self, handled: &Handled) {
        match handled {
            Handled::Replied { sources, .. } => {
                self.received += 1;
                self.replies += sources.len() as u64;
            }
            Handled::Received { .. } => self.received += 1,
            Handled::Filtered { .. } => self.filtered += 1,
            Handled::Malformed { .. } => self.malformed += 1,
        }
    }
}

/// Sessão do servidor: recebe sondas e responde.
pub struct ReplySession<O: Opener> {
    opener: O,
    config: ServerConfig,
    cancel: CancelToken,
    transport: Option<O::Transport>,
    state: ServerState,
    buf: Vec<u8>,
}

impl<O: Opener> ReplySession<O> {
    pub fn new(opener: O, config: ServerConfig, cancel: CancelToken) -> Self {
        let buf = vec![0u8; config.protocol.recv_buffer_len()];
        Self {
            opener,
            config,
            cancel,
            transport: None,
            state: ServerState::Idle,
            buf,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Abre o transporte principal e devolve o endereço local.
    pub fn start(&mut self) -> Result<SocketAddr> {
        let transport = self.transport.insert(open_primary(&self.opener, &self.config)?);
        let local = transport.local_addr()?;
        self.set_state(ServerState::Receiving);
        Ok(local)
    }

    /// Recebe um pacote e o trata (filtro, decodificação, respostas).
    /// Abre o transporte principal se `start` ainda não foi chamado.
    pub fn serve_one(&mut self) -> Result<Handled> {
        let config = &self.config;
        let opener = &self.opener;
        let transport = match &mut self.transport {
            Some(transport) => transport,
            slot @ None => slot.insert(open_primary(opener, config)?),
        };
        if self.state != ServerState::Receiving {
            trace!("estado do servidor: {:?} -> {:?}", self.state, ServerState::Receiving);
            self.state = ServerState::Receiving;
        }

        let (n, from) = loop {
            if let Some(received) = recv_until(&mut *transport, &mut self.buf, None, &self.cancel)? {
                break received;
            }
        };

        if let Some(filter) = config.filter {
            if from.ip() != IpAddr::V4(filter) {
                debug!("ignorando pacote de {} (filtro {})", from.ip(), filter);
                return Ok(Handled::Filtered { from });
            }
        }

        let packet = &self.buf[..n];
        let payload = match probe::decode(config.protocol, packet) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("descartando pacote de {}: {}", from, e);
                return Ok(Handled::Malformed { from });
            }
        };
        info!("recebido de {} {}", from, payload);

        self.state = ServerState::Replying;
        trace!("estado do servidor: {:?}", self.state);

        let handled = match (&payload, config.protocol) {
            (Payload::Text(message), ProbeProtocol::Udp) => {
                let mut sources = Vec::with_capacity(2);

                let reply = format!("reply to {}", message);
                transport.send_to(reply.as_bytes(), from)?;
                let local = transport.local_addr()?;
                info!("enviado \"{}\" para {} a partir da porta {}", reply, from, local.port());
                sources.push(local);

                if config.alternate_port {
                    // Porta nova: testa se o NAT aceita origem sem mapeamento
                    let mut alt = opener.open(None)?;
                    let reply = format!("{} from other port", message);
                    alt.send_to(reply.as_bytes(), from)?;
                    let alt_local = alt.local_addr()?;
                    info!(
                        "enviado \"{}\" para {} a partir da porta {}",
                        reply,
                        from,
                        alt_local.port()
                    );
                    sources.push(alt_local);
                }

                Handled::Replied {
                    from,
                    payload,
                    sources,
                }
            }
            (
                Payload::Echo {
                    kind: Some(EchoKind::Request),
                    ids,
                },
                ProbeProtocol::Icmp,
            ) if config.echo_reply => {
                let ids = *ids;
                let offset = icmp::icmp_offset(packet);
                let reply = icmp::build_echo_reply(
                    ids.identifier,
                    ids.sequence,
                    icmp::payload(packet, offset),
                );
                transport.send_to(&reply, from)?;
                info!(
                    "enviado Echo Reply para {} id: {} sequence: {}",
                    from.ip(),
                    ids.identifier,
                    ids.sequence
                );
                Handled::Replied {
                    from,
                    payload,
                    sources: vec![transport.local_addr()?],
                }
            }
            _ => Handled::Received { from, payload },
        };

        self.set_state(ServerState::RepeatReceiving);
        Ok(handled)
    }

    /// Laço principal; termina por cancelamento (erro) ou pelo `limit`.
    pub fn run(&mut self) -> Result<ServerStats> {
        let mut stats = ServerStats::default();
        let mut handled_count = 0u64;

        while self.config.limit.is_none_or(|limit| handled_count < limit) {
            let handled = self.serve_one()?;
            stats.record(&handled);
            handled_count += 1;
        }
        Ok(stats)
    }

    fn set_state(&mut self, state: ServerState) {
        trace!("estado do servidor: {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

fn open_primary<O: Opener>(opener: &O, config: &ServerConfig) -> Result<O::Transport> {
    let transport = opener.open(Some(config.port))?;
    info!("servidor {} escutando em {}", config.protocol, transport.local_addr()?);
    Ok(transport)
}
