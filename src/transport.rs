use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

use crate::error::{ProbeError, Result};

/// Intervalo de leitura usado para checar cancelamento enquanto bloqueia.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Envio e recepção de datagramas com endereço do par.
pub trait Transport {
    fn send_to(&mut self, buf: &[u8], dst: SocketAddr) -> io::Result<usize>;

    /// Pode devolver `WouldBlock`/`TimedOut` quando o intervalo de leitura expira.
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Abre transportes novos do mesmo tipo.
pub trait Opener {
    type Transport: Transport;

    /// Abre um transporte na porta local `port`, ou numa porta efêmera se `None`.
    fn open(&self, port: Option<u16>) -> Result<Self::Transport>;
}

/// Sinal de cancelamento compartilhado com o handler de Ctrl+C.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Recebe um datagrama, repetindo a leitura até chegar algo.
///
/// Sem `deadline` bloqueia indefinidamente; com `deadline` devolve `None`
/// quando o prazo passa. Cancelamento vira [`ProbeError::Interrupted`].
pub fn recv_until<T: Transport + ?Sized>(
    transport: &mut T,
    buf: &mut [u8],
    deadline: Option<Instant>,
    cancel: &CancelToken,
) -> Result<Option<(usize, SocketAddr)>> {
    loop {
        if cancel.is_cancelled() {
            return Err(ProbeError::Interrupted);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(None);
        }

        match transport.recv_from(buf) {
            Ok(received) => return Ok(Some(received)),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Resolve um hostname para o primeiro endereço IPv4.
pub fn resolve_ipv4(host: &str) -> Result<Ipv4Addr> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(addr);
    }

    let resolution = || ProbeError::Resolution {
        host: host.to_string(),
    };
    (host, 0)
        .to_socket_addrs()
        .map_err(|_| resolution())?
        .find_map(|sa| match sa.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(resolution)
}

fn sockaddr_to_std(addr: &SockAddr) -> io::Result<SocketAddr> {
    addr.as_socket()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "endereço não é IP"))
}

/// Socket UDP comum.
#[derive(Debug)]
pub struct UdpTransport {
    sock: UdpSocket,
}

impl Transport for UdpTransport {
    fn send_to(&mut self, buf: &[u8], dst: SocketAddr) -> io::Result<usize> {
        self.sock.send_to(buf, dst)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.sock.recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }
}

#[derive(Debug, Clone)]
pub struct UdpOpener {
    pub bind_ip: Ipv4Addr,
    pub poll_interval: Duration,
}

impl Default for UdpOpener {
    fn default() -> Self {
        Self {
            bind_ip: Ipv4Addr::UNSPECIFIED,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl Opener for UdpOpener {
    type Transport = UdpTransport;

    fn open(&self, port: Option<u16>) -> Result<UdpTransport> {
        let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        let local = SocketAddr::new(IpAddr::V4(self.bind_ip), port.unwrap_or(0));
        sock.bind(&local.into())?;
        sock.set_read_timeout(Some(self.poll_interval))?;

        let sock = UdpSocket::from(sock);
        debug!("socket UDP aberto em {}", sock.local_addr()?);
        Ok(UdpTransport { sock })
    }
}

/// Socket ICMP RAW (AF_INET, SOCK_RAW, IPPROTO_ICMP).
///
/// Em Linux cada leitura entrega o cabeçalho IPv4 antes do ICMP.
#[derive(Debug)]
pub struct IcmpTransport {
    sock: Socket,
}

impl Transport for IcmpTransport {
    fn send_to(&mut self, buf: &[u8], dst: SocketAddr) -> io::Result<usize> {
        // A porta é ignorada para ICMP
        let dst = SocketAddr::new(dst.ip(), 0);
        self.sock.send_to(buf, &dst.into())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        // SAFETY: `recv_from` só escreve bytes inicializados no buffer e
        // `u8` e `MaybeUninit<u8>` têm o mesmo layout.
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        let (n, addr) = self.sock.recv_from(uninit)?;
        Ok((n, sockaddr_to_std(&addr)?))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        sockaddr_to_std(&self.sock.local_addr()?)
    }
}

#[derive(Debug, Clone)]
pub struct IcmpOpener {
    pub poll_interval: Duration,
}

impl Default for IcmpOpener {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
        }
    }
}

// SOCK_RAW vale 3 em Linux, macOS e Windows; libc::SOCK_RAW não existe no Windows
const SOCK_RAW: i32 = 3;

/// Erro ao abrir o socket RAW: falta de permissão vira [`ProbeError::Privilege`].
pub fn open_error(e: io::Error) -> ProbeError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => ProbeError::Privilege(e),
        _ => ProbeError::Io(e),
    }
}

impl Opener for IcmpOpener {
    type Transport = IcmpTransport;

    fn open(&self, _port: Option<u16>) -> Result<IcmpTransport> {
        let sock = Socket::new(Domain::IPV4, Type::from(SOCK_RAW), Some(Protocol::ICMPV4))
            .map_err(open_error)?;
        sock.set_read_timeout(Some(self.poll_interval))?;

        debug!("socket ICMP RAW aberto");
        Ok(IcmpTransport { sock })
    }
}
