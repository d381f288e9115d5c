use std::fmt;

use clap::ValueEnum;

use crate::error::Result;
use crate::icmp::{self, EchoHeader, EchoKind};
use crate::sweep::EchoIds;

/// Buffer de recepção para ICMP (inclui cabeçalho IP).
pub const ICMP_MAX_RECV: usize = 2048;
/// Buffer de recepção para UDP.
pub const UDP_MAX_RECV: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProbeProtocol {
    Icmp,
    Udp,
}

impl ProbeProtocol {
    pub fn recv_buffer_len(self) -> usize {
        match self {
            ProbeProtocol::Icmp => ICMP_MAX_RECV,
            ProbeProtocol::Udp => UDP_MAX_RECV,
        }
    }
}

impl fmt::Display for ProbeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeProtocol::Icmp => f.write_str("icmp"),
            ProbeProtocol::Udp => f.write_str("udp"),
        }
    }
}

/// Conteúdo de uma sonda, enviada ou recebida.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Echo { kind: Option<EchoKind>, ids: EchoIds },
    Text(String),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Echo { ids, .. } => {
                write!(f, "id: {} sequence: {}", ids.identifier, ids.sequence)
            }
            Payload::Text(text) => write!(f, "\"{}\"", text),
        }
    }
}

/// Bytes de uma sonda do cliente e o `Payload` que a descreve.
pub fn encode_request(protocol: ProbeProtocol, ids: EchoIds, message: &str) -> (Vec<u8>, Payload) {
    match protocol {
        ProbeProtocol::Icmp => (
            icmp::build_echo_request(ids.identifier, ids.sequence),
            Payload::Echo {
                kind: Some(EchoKind::Request),
                ids,
            },
        ),
        ProbeProtocol::Udp => (message.as_bytes().to_vec(), Payload::Text(message.to_string())),
    }
}

/// Interpreta um datagrama recebido. Só ICMP pode falhar (pacote curto).
pub fn decode(protocol: ProbeProtocol, buf: &[u8]) -> Result<Payload> {
    match protocol {
        ProbeProtocol::Icmp => {
            let hdr = EchoHeader::decode_packet(buf)?;
            Ok(Payload::Echo {
                kind: hdr.kind(),
                ids: EchoIds::new(hdr.identifier, hdr.sequence),
            })
        }
        ProbeProtocol::Udp => Ok(Payload::Text(String::from_utf8_lossy(buf).into_owned())),
    }
}
