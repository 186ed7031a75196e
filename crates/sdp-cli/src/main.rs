//! `sdp-negotiate`: run the offer/answer engine against SDP files
//!
//! ```text
//! sdp-negotiate answer offer.sdp --config agent.json
//! sdp-negotiate offer
//! sdp-negotiate options
//! ```
//!
//! Logging follows `RUST_LOG`; the negotiation report goes to stderr so the
//! SDP on stdout can be piped.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rvoip_sdp_negotiation::{
    Collaborators, NegotiationConfig, NegotiationEngine, NegotiationReport, PortPool,
};
use tracing::{debug, info};

/// SDP offer/answer negotiation driver
#[derive(Parser, Debug)]
#[command(name = "sdp-negotiate", author, version, about, long_about = None)]
struct Cli {
    /// JSON negotiation configuration
    #[arg(short, long, global = true, env = "SDP_NEGOTIATE_CONFIG")]
    config: Option<PathBuf>,

    /// First RTP port handed out
    #[arg(long, global = true, default_value_t = 16384)]
    port_start: u16,

    /// Print the negotiation report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a remote offer read from a file, or stdin with `-`
    Answer {
        /// Offer SDP
        offer: PathBuf,
    },
    /// Print an initial local offer
    Offer,
    /// Print an OPTIONS capability body
    Options,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rvoip_sdp_negotiation=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => NegotiationConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => NegotiationConfig::default(),
    };
    debug!(?config, "configuration loaded");

    let ports = PortPool::new(cli.port_start, cli.port_start.saturating_add(1000))
        .context("building the RTP port pool")?;
    let collaborators = Collaborators::new(Arc::new(ports));
    let engine = Arc::new(NegotiationEngine::with_collaborators(config, collaborators)?);
    let mut session = engine.new_session();

    let body = match &cli.command {
        Command::Answer { offer } => {
            let remote = read_body(offer)?;
            let report = session
                .negotiate_offer_sdp(Some(remote.as_slice()), true)
                .context("negotiating the remote offer")?;
            print_report(&report, cli.json)?;
            session.encode_sdp_and_update_version()
        }
        Command::Offer => {
            session.negotiate_offer_sdp(None, true)?;
            session.encode_sdp_and_update_version()
        }
        Command::Options => session.create_options_sdp().to_bytes(),
    };

    info!(bytes = body.len(), "local SDP written");
    std::io::stdout().write_all(&body)?;
    Ok(())
}

fn read_body(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut body = Vec::new();
        std::io::Read::read_to_end(&mut std::io::stdin(), &mut body)?;
        return Ok(body);
    }
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn print_report(report: &NegotiationReport, json: bool) -> Result<()> {
    let mut err = std::io::stderr();
    if json {
        writeln!(err, "{}", serde_json::to_string_pretty(report)?)?;
        return Ok(());
    }
    for line in &report.lines {
        let codec = line.codec.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
        let direction = line
            .direction
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            err,
            "m={} level {}: {:?} codec {} direction {}",
            line.media, line.level, line.status, codec, direction
        )?;
    }
    if let Some(direction) = report.video_offered {
        writeln!(err, "video offered ({}) but not enabled for this call", direction)?;
    }
    Ok(())
}
