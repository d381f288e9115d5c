use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{ProbeError, Result};
use crate::icmp::EchoKind;
use crate::probe::{self, Payload, ProbeProtocol};
use crate::sweep::{EchoIds, SweepMode, progression};
use crate::transport::{CancelToken, Opener, Transport, recv_until};

/// Identifier inicial padrão das sondas ICMP.
pub const DEFAULT_IDENTIFIER: u16 = 32767;
pub const DEFAULT_PORT: u16 = 7777;
pub const DEFAULT_MESSAGE: &str = "nat probe";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub protocol: ProbeProtocol,
    /// Destinos já resolvidos; cada iteração envia uma sonda para cada um.
    pub targets: Vec<Ipv4Addr>,
    /// Porta de destino (ignorada para ICMP).
    pub port: u16,
    pub base: EchoIds,
    pub sweep: SweepMode,
    pub iterations: u32,
    /// Espera respostas após cada iteração.
    pub wait: bool,
    /// Encerra a espera de cada iteração após este número de respostas.
    /// `None` continua recebendo até o timeout ou Ctrl+C, como o servidor
    /// pode responder mais de uma vez (ex.: a partir de outra porta).
    pub expect: Option<usize>,
    /// Só aceita respostas vindas deste endereço.
    pub filter: Option<Ipv4Addr>,
    pub message: String,
    /// `None` bloqueia até chegar resposta.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(protocol: ProbeProtocol, targets: Vec<Ipv4Addr>) -> Self {
        Self {
            protocol,
            targets,
            port: DEFAULT_PORT,
            base: EchoIds::new(DEFAULT_IDENTIFIER, 0),
            sweep: SweepMode::None,
            iterations: 1,
            wait: true,
            expect: None,
            filter: None,
            message: DEFAULT_MESSAGE.to_string(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentProbe {
    pub iteration: u32,
    pub from: SocketAddr,
    pub to: SocketAddr,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub iteration: u32,
    pub from: SocketAddr,
    pub payload: Payload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientReport {
    pub sent: Vec<SentProbe>,
    pub replies: Vec<Reply>,
    /// Iterações encerradas pelo timeout antes de `expect` respostas
    /// (ou sem nenhuma resposta, quando `expect` não foi definido).
    pub timeouts: u32,
}

/// Sessão do cliente: dispara as sondas e, se configurado, espera respostas.
pub struct ClientSession<O: Opener> {
    opener: O,
    config: ClientConfig,
    cancel: CancelToken,
}

impl<O: Opener> ClientSession<O> {
    pub fn new(opener: O, config: ClientConfig, cancel: CancelToken) -> Self {
        Self {
            opener,
            config,
            cancel,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn run(&mut self) -> Result<ClientReport> {
        let mut report = ClientReport::default();
        let cfg = &self.config;

        let ids_per_iteration = progression(cfg.base, cfg.sweep).take(cfg.iterations as usize);
        for (iteration, ids) in (0u32..).zip(ids_per_iteration) {
            if self.cancel.is_cancelled() {
                return Err(ProbeError::Interrupted);
            }

            // Socket novo a cada iteração: em UDP isso gera uma nova porta de origem
            let mut transport = self.opener.open(None)?;
            let local = transport.local_addr()?;

            for target in &cfg.targets {
                let to = SocketAddr::new(IpAddr::V4(*target), cfg.port);
                let (bytes, payload) = probe::encode_request(cfg.protocol, ids, &cfg.message);
                transport.send_to(&bytes, to)?;
                info!("enviado {} para {} a partir da porta {}", payload, to, local.port());
                report.sent.push(SentProbe {
                    iteration,
                    from: local,
                    to,
                    payload,
                });
            }

            if cfg.wait {
                self.collect_replies(&mut transport, iteration, &mut report)?;
            }
        }

        Ok(report)
    }

    fn collect_replies(
        &self,
        transport: &mut O::Transport,
        iteration: u32,
        report: &mut ClientReport,
    ) -> Result<()> {
        let cfg = &self.config;
        let deadline = cfg.timeout.map(|t| Instant::now() + t);
        let mut buf = vec![0u8; cfg.protocol.recv_buffer_len()];
        let mut received = 0;

        while cfg.expect.is_none_or(|expect| received < expect) {
            let Some((n, from)) = recv_until(&mut *transport, &mut buf, deadline, &self.cancel)? else {
                if cfg.expect.is_some() || received == 0 {
                    warn!("tempo esgotado: {} resposta(s) na iteração {}", received, iteration);
                    report.timeouts += 1;
                } else {
                    debug!("fim da espera: {} resposta(s) na iteração {}", received, iteration);
                }
                break;
            };

            if let Some(payload) = self.accept(&buf[..n], from) {
                received += 1;
                info!("recebido (pacote #{}) de {} {}", report.replies.len() + 1, from.ip(), payload);
                report.replies.push(Reply {
                    iteration,
                    from,
                    payload,
                });
            }
        }
        Ok(())
    }

    /// Aplica filtro de origem e decodifica; `None` descarta o pacote.
    fn accept(&self, buf: &[u8], from: SocketAddr) -> Option<Payload> {
        if let Some(filter) = self.config.filter {
            if from.ip() != IpAddr::V4(filter) {
                debug!("ignorando pacote de {} (filtro {})", from.ip(), filter);
                return None;
            }
        }

        match probe::decode(self.config.protocol, buf) {
            Ok(Payload::Echo { kind, ids }) if kind != Some(EchoKind::Reply) => {
                // Inclui o próprio Echo Request visto pelo socket RAW
                debug!(
                    "ignorando ICMP que não é Echo Reply de {} (id {} seq {})",
                    from.ip(),
                    ids.identifier,
                    ids.sequence
                );
                None
            }
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!("descartando pacote de {}: {}", from.ip(), e);
                None
            }
        }
    }
}
