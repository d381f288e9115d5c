use crate::checksum::checksum;
use crate::error::{ProbeError, Result};

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

/// Cabeçalho ICMP: type, code, checksum, identifier, sequence.
pub const HEADER_LEN: usize = 8;
/// Payload fixo dos Echo Requests emitidos por esta ferramenta.
pub const PAYLOAD_LEN: usize = 55;
pub const PACKET_LEN: usize = HEADER_LEN + PAYLOAD_LEN;
/// Cabeçalho IPv4 sem opções.
pub const IPV4_HEADER_LEN: usize = 20;

const PAYLOAD_START: u8 = 0x42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoKind {
    Request,
    Reply,
}

impl EchoKind {
    pub fn icmp_type(self) -> u8 {
        match self {
            EchoKind::Request => ICMP_ECHO_REQUEST,
            EchoKind::Reply => ICMP_ECHO_REPLY,
        }
    }

    pub fn from_icmp_type(icmp_type: u8) -> Option<Self> {
        match icmp_type {
            ICMP_ECHO_REQUEST => Some(EchoKind::Request),
            ICMP_ECHO_REPLY => Some(EchoKind::Reply),
            _ => None,
        }
    }
}

/// Campos do cabeçalho de um Echo Request/Reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
}

impl EchoHeader {
    /// Lê o cabeçalho ICMP que começa em `offset` dentro de `buf`.
    ///
    /// O checksum não é verificado aqui; veja [`verify_checksum`].
    pub fn decode(buf: &[u8], offset: usize) -> Result<Self> {
        let icmp = buf
            .get(offset..)
            .filter(|icmp| icmp.len() >= HEADER_LEN)
            .ok_or(ProbeError::MalformedPacket {
                len: buf.len(),
                offset,
            })?;

        Ok(EchoHeader {
            icmp_type: icmp[0],
            code: icmp[1],
            checksum: u16::from_be_bytes([icmp[2], icmp[3]]),
            identifier: u16::from_be_bytes([icmp[4], icmp[5]]),
            sequence: u16::from_be_bytes([icmp[6], icmp[7]]),
        })
    }

    /// Decodifica um buffer vindo de um socket RAW, pulando o cabeçalho IPv4 se houver.
    pub fn decode_packet(buf: &[u8]) -> Result<Self> {
        Self::decode(buf, icmp_offset(buf))
    }

    pub fn kind(&self) -> Option<EchoKind> {
        if self.code != 0 {
            return None;
        }
        EchoKind::from_icmp_type(self.icmp_type)
    }
}

/// Payload de preenchimento: 0x42, 0x43, ... (mod 256).
pub fn filler_payload() -> [u8; PAYLOAD_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte = PAYLOAD_START.wrapping_add(i as u8);
    }
    payload
}

/// Monta um pacote Echo (Request ou Reply) com o payload dado.
pub fn build_echo(kind: EchoKind, ident: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(HEADER_LEN + payload.len());

    // Type, Code=0, checksum zerado
    pkt.extend_from_slice(&[kind.icmp_type(), 0, 0, 0]);
    pkt.extend_from_slice(&ident.to_be_bytes());
    pkt.extend_from_slice(&seq.to_be_bytes());
    pkt.extend_from_slice(payload);

    let csum = checksum(&pkt);
    pkt[2..4].copy_from_slice(&csum.to_be_bytes());

    pkt
}

/// Echo Request de 63 bytes com o payload fixo.
pub fn build_echo_request(ident: u16, seq: u16) -> Vec<u8> {
    build_echo(EchoKind::Request, ident, seq, &filler_payload())
}

/// Echo Reply ecoando o payload recebido.
pub fn build_echo_reply(ident: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    build_echo(EchoKind::Reply, ident, seq, payload)
}

/// Offset do cabeçalho ICMP dentro de um buffer recebido.
///
/// Alguns sockets entregam o cabeçalho IP junto; se o buffer começa com
/// versão 4, pula IHL * 4 bytes.
pub fn icmp_offset(buf: &[u8]) -> usize {
    if buf.len() >= IPV4_HEADER_LEN && (buf[0] >> 4) == 4 {
        let ihl = (buf[0] & 0x0F) as usize * 4;
        if ihl >= IPV4_HEADER_LEN {
            return ihl;
        }
    }
    0
}

/// Payload após o cabeçalho ICMP que começa em `offset`.
pub fn payload(buf: &[u8], offset: usize) -> &[u8] {
    buf.get(offset + HEADER_LEN..).unwrap_or(&[])
}

/// Um pacote ICMP íntegro soma zero quando o checksum é recalculado.
pub fn verify_checksum(icmp: &[u8]) -> bool {
    checksum(icmp) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_ip_header(icmp: &[u8]) -> Vec<u8> {
        let mut pkt = vec![0u8; IPV4_HEADER_LEN];
        pkt[0] = 0x45;
        pkt[9] = 1;
        pkt.extend_from_slice(icmp);
        pkt
    }

    #[test]
    fn request_has_fixed_layout() {
        let pkt = build_echo_request(0x1234, 0x0007);
        assert_eq!(pkt.len(), PACKET_LEN);
        assert_eq!(&pkt[..2], &[ICMP_ECHO_REQUEST, 0]);
        assert_eq!(&pkt[4..8], &[0x12, 0x34, 0x00, 0x07]);
        assert_eq!(pkt[8], 0x42);
        assert_eq!(pkt[PACKET_LEN - 1], 0x42 + 54);
    }

    #[test]
    fn filler_wraps_mod_256() {
        let payload = filler_payload();
        assert_eq!(payload[0], 0x42);
        assert_eq!(payload[54], 0x78);
        assert!(payload.windows(2).all(|w| w[1] == w[0].wrapping_add(1)));
    }

    #[test]
    fn request_decodes_at_boundaries() {
        for (id, seq) in [(0, 0), (0, 65535), (65535, 0), (65535, 65535), (32767, 1)] {
            let pkt = build_echo_request(id, seq);
            let hdr = EchoHeader::decode(&pkt, 0).unwrap();
            assert_eq!(hdr.icmp_type, ICMP_ECHO_REQUEST);
            assert_eq!(hdr.code, 0);
            assert_eq!(hdr.identifier, id);
            assert_eq!(hdr.sequence, seq);
            assert_eq!(hdr.kind(), Some(EchoKind::Request));
        }
    }

    #[test]
    fn embedded_checksum_recomputes() {
        let mut pkt = build_echo_request(100, 42);
        let hdr = EchoHeader::decode(&pkt, 0).unwrap();
        assert!(verify_checksum(&pkt));

        pkt[2] = 0;
        pkt[3] = 0;
        assert_eq!(checksum(&pkt), hdr.checksum);
    }

    #[test]
    fn corrupted_packet_fails_verification() {
        let mut pkt = build_echo_request(100, 42);
        pkt[20] ^= 0xFF;
        assert!(!verify_checksum(&pkt));
    }

    #[test]
    fn reply_echoes_payload() {
        let pkt = build_echo_reply(7, 9, b"abc");
        assert_eq!(pkt.len(), HEADER_LEN + 3);
        assert_eq!(payload(&pkt, 0), b"abc");
        assert!(verify_checksum(&pkt));
        let hdr = EchoHeader::decode(&pkt, 0).unwrap();
        assert_eq!(hdr.kind(), Some(EchoKind::Reply));
    }

    #[test]
    fn skips_ipv4_header() {
        let icmp = build_echo_reply(100, 0, &filler_payload());
        let raw = with_ip_header(&icmp);
        assert_eq!(icmp_offset(&raw), IPV4_HEADER_LEN);
        assert_eq!(icmp_offset(&icmp), 0);

        let hdr = EchoHeader::decode_packet(&raw).unwrap();
        assert_eq!(hdr.icmp_type, ICMP_ECHO_REPLY);
        assert_eq!(hdr.identifier, 100);
        assert_eq!(hdr.sequence, 0);
        assert_eq!(payload(&raw, IPV4_HEADER_LEN), &filler_payload()[..]);
    }

    #[test]
    fn tolerates_any_length_from_header_up() {
        let hdr = EchoHeader::decode(&[0, 0, 0xFF, 0xFF, 0, 1, 0, 2], 0).unwrap();
        assert_eq!(hdr.identifier, 1);
        assert_eq!(hdr.sequence, 2);

        let long = build_echo(EchoKind::Reply, 1, 2, &[0u8; 1400]);
        assert!(EchoHeader::decode(&long, 0).is_ok());
    }

    #[test]
    fn short_buffer_is_malformed() {
        let err = EchoHeader::decode(&[0u8; 7], 0).unwrap_err();
        assert!(matches!(err, ProbeError::MalformedPacket { len: 7, offset: 0 }));

        let err = EchoHeader::decode(&[0u8; 27], IPV4_HEADER_LEN).unwrap_err();
        assert!(matches!(err, ProbeError::MalformedPacket { len: 27, offset: 20 }));

        assert!(EchoHeader::decode(&[0u8; 4], 10).is_err());
    }

    #[test]
    fn unknown_types_have_no_kind() {
        let hdr = EchoHeader::decode(&[3, 1, 0, 0, 0, 0, 0, 0], 0).unwrap();
        assert_eq!(hdr.kind(), None);
    }
}
