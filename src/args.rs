use std::net::Ipv4Addr;
use std::time::Duration;

use clap::{ArgGroup, Parser};

use crate::client::{ClientConfig, DEFAULT_IDENTIFIER, DEFAULT_MESSAGE, DEFAULT_PORT};
use crate::error::{ProbeError, Result};
use crate::probe::ProbeProtocol;
use crate::server::ServerConfig;
use crate::sweep::{EchoIds, SweepMode};
use crate::transport::resolve_ipv4;

#[derive(Parser, Debug)]
#[command(name = "natprobe", version)]
#[command(about = "Cliente/servidor ICMP e UDP para testar o comportamento de NAT")]
#[command(group(ArgGroup::new("mode").required(true).args(["client", "server"])))]
pub struct Cli {
    /// Modo cliente: envia sondas para um ou mais hosts
    #[arg(short, long, value_name = "HOST", num_args = 1..)]
    pub client: Vec<String>,

    /// Modo servidor: escuta nesta porta (ignorada para ICMP)
    #[arg(short, long, value_name = "PORT")]
    pub server: Option<u16>,

    /// Protocolo das sondas
    #[arg(short = 'P', long, value_enum, default_value_t = ProbeProtocol::Udp)]
    pub protocol: ProbeProtocol,

    /// Porta de destino UDP
    #[arg(short, long, value_name = "DESTPORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Envia N sondas por destino sem esperar resposta
    #[arg(short = 'n', long, value_name = "N")]
    pub count: Option<u32>,

    /// Espera respostas mesmo com --count
    #[arg(short, long)]
    pub wait: bool,

    /// Varre o identifier ICMP
    #[arg(short = 'i', long)]
    pub sweep_id: bool,

    /// Varre a sequence ICMP (comportamento típico do ping)
    #[arg(short = 'q', long)]
    pub sweep_sequence: bool,

    /// Identifier inicial
    #[arg(long, value_name = "ID", default_value_t = DEFAULT_IDENTIFIER)]
    pub id: u16,

    /// Sequence inicial
    #[arg(long, value_name = "SEQ", default_value_t = 0)]
    pub sequence: u16,

    /// Só considera pacotes vindos deste IP
    #[arg(short, long, value_name = "IP")]
    pub filter: Option<Ipv4Addr>,

    /// Servidor UDP também responde a partir de outra porta
    #[arg(short, long)]
    pub alternate_port: bool,

    /// Servidor ICMP responde com Echo Reply
    #[arg(long)]
    pub echo_reply: bool,

    /// Para de esperar após N respostas por iteração (padrão: até o timeout ou Ctrl+C)
    #[arg(short, long, value_name = "N")]
    pub expect: Option<usize>,

    /// Texto das sondas UDP
    #[arg(short, long, default_value = DEFAULT_MESSAGE)]
    pub message: String,

    /// Tempo máximo de espera por resposta, em segundos (padrão: sem limite)
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Log de depuração
    #[arg(short, long)]
    pub verbose: bool,
}

/// Papel do processo, já validado.
#[derive(Debug, Clone)]
pub enum Role {
    Client(ClientConfig),
    Server(ServerConfig),
}

fn invalid(msg: impl Into<String>) -> ProbeError {
    ProbeError::Configuration(msg.into())
}

impl Cli {
    /// Combinação de flags de varredura.
    pub fn sweep_mode(&self) -> Result<SweepMode> {
        match (self.sweep_id, self.sweep_sequence) {
            (false, false) => Ok(SweepMode::None),
            (true, false) => Ok(SweepMode::Identifier),
            (false, true) => Ok(SweepMode::Sequence),
            (true, true) => Err(invalid(
                "--sweep-id e --sweep-sequence são mutuamente exclusivos",
            )),
        }
    }

    /// Valida as flags e resolve os hosts. Nenhum socket é aberto aqui.
    pub fn into_role(self) -> Result<Role> {
        match (self.client.is_empty(), self.server) {
            (false, Some(_)) => Err(invalid(
                "Não é possível usar modo cliente e servidor ao mesmo tempo",
            )),
            (true, None) => Err(invalid("Informe o modo cliente ou servidor")),
            (false, None) => self.into_client().map(Role::Client),
            (true, Some(port)) => self.into_server(port).map(Role::Server),
        }
    }

    fn into_client(self) -> Result<ClientConfig> {
        if self.alternate_port || self.echo_reply {
            return Err(invalid(
                "--alternate-port e --echo-reply só valem no modo servidor",
            ));
        }
        let sweep = self.sweep_mode()?;
        if self.protocol == ProbeProtocol::Udp && sweep != SweepMode::None {
            return Err(invalid(
                "--sweep-id e --sweep-sequence exigem --protocol icmp",
            ));
        }
        if self.count == Some(0) {
            return Err(invalid("--count precisa ser maior que zero"));
        }
        if self.expect == Some(0) {
            return Err(invalid("--expect precisa ser maior que zero"));
        }
        let timeout = self
            .timeout
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| invalid(format!("--timeout inválido: {}", secs)))
            })
            .transpose()?;

        let targets = self
            .client
            .iter()
            .map(|host| resolve_ipv4(host))
            .collect::<Result<Vec<_>>>()?;

        let mut config = ClientConfig::new(self.protocol, targets);
        config.port = self.port;
        config.base = EchoIds::new(self.id, self.sequence);
        config.sweep = sweep;
        config.iterations = self.count.unwrap_or(1);
        config.wait = self.count.is_none() || self.wait;
        config.expect = self.expect;
        config.filter = self.filter;
        config.message = self.message;
        config.timeout = timeout;
        Ok(config)
    }

    fn into_server(self, port: u16) -> Result<ServerConfig> {
        if self.count.is_some()
            || self.wait
            || self.sweep_id
            || self.sweep_sequence
            || self.expect.is_some()
            || self.timeout.is_some()
        {
            return Err(invalid(
                "--count, --wait, --sweep-*, --expect e --timeout só valem no modo cliente",
            ));
        }
        match self.protocol {
            ProbeProtocol::Icmp if self.alternate_port => {
                return Err(invalid("--alternate-port exige --protocol udp"));
            }
            ProbeProtocol::Udp if self.echo_reply => {
                return Err(invalid("--echo-reply exige --protocol icmp"));
            }
            _ => {}
        }

        let mut config = ServerConfig::new(self.protocol, port);
        config.alternate_port = self.alternate_port;
        config.echo_reply = self.echo_reply;
        config.filter = self.filter;
        Ok(config)
    }
}
