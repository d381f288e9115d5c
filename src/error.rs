use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Configuração inválida: {0}")]
    Configuration(String),

    #[error("Sem permissão para abrir socket RAW (execute como root ou use setcap): {0}")]
    Privilege(#[source] io::Error),

    #[error("Não foi possível resolver o host {host}")]
    Resolution { host: String },

    #[error("Pacote malformado: {len} bytes, cabeçalho ICMP esperado no offset {offset}")]
    MalformedPacket { len: usize, offset: usize },

    #[error("Operação interrompida")]
    Interrupted,

    #[error("Erro de I/O: {0}")]
    Io(#[from] io::Error),
}

impl ProbeError {
    /// Código de saída do processo para cada categoria de erro.
    pub fn exit_code(&self) -> u8 {
        match self {
            ProbeError::Configuration(_) => 2,
            ProbeError::Resolution { .. } => 68,
            ProbeError::Privilege(_) => 77,
            ProbeError::Interrupted => 130,
            ProbeError::MalformedPacket { .. } | ProbeError::Io(_) => 1,
        }
    }
}

pub type Result<T, E = ProbeError> = std::result::Result<T, E>;
