// Tratamento de erros ergonômico
use anyhow::{Context, Result};

// Parsing de argumentos
use clap::Parser;

// Log estruturado
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use std::process::ExitCode;

use natprobe::ProbeError;
use natprobe::args::{Cli, Role};
use natprobe::client::{ClientConfig, ClientSession};
use natprobe::probe::ProbeProtocol;
use natprobe::server::{ReplySession, ServerConfig};
use natprobe::transport::{CancelToken, IcmpOpener, Opener, UdpOpener};

/// Programa principal: cliente ou servidor de sondas para teste de NAT.
/// O modo ICMP requer root (ou CAP_NET_RAW) para abrir o socket RAW.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if matches!(e.downcast_ref::<ProbeError>(), Some(ProbeError::Interrupted)) {
                warn!("Interrompido");
            } else {
                error!("{:#}", e);
            }
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Código de saída distinto para cada erro fatal conhecido, mesmo sob `.context`.
fn exit_code(e: &anyhow::Error) -> u8 {
    e.downcast_ref::<ProbeError>().map_or(1, ProbeError::exit_code)
}

fn run(cli: Cli) -> Result<()> {
    let role = cli.into_role()?;

    // Ctrl+C só sinaliza; os laços de recepção checam o token e encerram
    let cancel = CancelToken::new();
    let c = cancel.clone();
    ctrlc::set_handler(move || c.cancel()).context("Erro ao configurar handler de Ctrl+C")?;

    match role {
        Role::Client(config) => match config.protocol {
            ProbeProtocol::Icmp => run_client(IcmpOpener::default(), config, cancel),
            ProbeProtocol::Udp => run_client(UdpOpener::default(), config, cancel),
        },
        Role::Server(config) => match config.protocol {
            ProbeProtocol::Icmp => run_server(IcmpOpener::default(), config, cancel),
            ProbeProtocol::Udp => run_server(UdpOpener::default(), config, cancel),
        },
    }
}

fn run_client<O: Opener>(opener: O, config: ClientConfig, cancel: CancelToken) -> Result<()> {
    let targets = config
        .targets
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        "Cliente {} para {} ({} iteração(ões), varredura {:?})",
        config.protocol, targets, config.iterations, config.sweep
    );

    let mut session = ClientSession::new(opener, config, cancel);
    let report = session.run().context("Falha na sessão do cliente")?;

    info!("--- estatísticas para {} ---", targets);
    info!(
        "{} sondas enviadas, {} respostas recebidas, {} esperas esgotadas",
        report.sent.len(),
        report.replies.len(),
        report.timeouts
    );
    Ok(())
}

fn run_server<O: Opener>(opener: O, config: ServerConfig, cancel: CancelToken) -> Result<()> {
    let mut session = ReplySession::new(opener, config, cancel);
    session.start().context("Falha ao abrir o socket do servidor")?;

    let stats = session.run().context("Falha na sessão do servidor")?;
    info!(
        "{} recebidos, {} respostas, {} filtrados, {} malformados",
        stats.received, stats.replies, stats.filtered, stats.malformed
    );
    Ok(())
}
