use anyhow::{Context, Result};
use clap::Parser;
use fairreel_execution::verify_payload;
use fairreel_types::{
    pf::{VerificationPayload, VerificationReport},
    slot::ReelStripSet,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verification payload exported for an ended session (JSON).
    payload: PathBuf,

    /// Published reel strip set (YAML). Repeat for every mode the session played.
    #[arg(short, long = "strips")]
    strips: Vec<PathBuf>,

    /// Log level for diagnostics written to stderr.
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,
}

fn init_tracing(level: tracing::Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_payload(path: &Path) -> Result<VerificationPayload> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read payload {}", path.display()))?;
    parse_payload(&raw).with_context(|| format!("invalid payload {}", path.display()))
}

fn parse_payload(raw: &str) -> Result<VerificationPayload> {
    Ok(serde_json::from_str(raw)?)
}

fn load_strips(path: &Path) -> Result<ReelStripSet> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read reel strips {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .with_context(|| format!("invalid reel strips {}", path.display()))
}

fn run(args: &Args) -> Result<VerificationReport> {
    let payload = load_payload(&args.payload)?;
    let strips = args
        .strips
        .iter()
        .map(|path| load_strips(path))
        .collect::<Result<Vec<_>>>()?;
    if strips.is_empty() {
        warn!("no reel strips supplied, reel positions will not be checked");
    }
    info!(
        session = %payload.session_id,
        spins = payload.spins.len(),
        strip_sets = strips.len(),
        "verifying session"
    );
    Ok(verify_payload(&payload, &strips))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level);

    let report = run(&args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.valid {
        for diagnostic in &report.diagnostics {
            warn!(%diagnostic, "verification failed");
        }
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairreel_execution::hash_chain::hash_server_seed;
    use fairreel_types::pf::ServerSeed;
    use uuid::Uuid;

    #[test]
    fn parses_repeated_strip_flags() {
        let args = Args::parse_from([
            "fairreel-verifier",
            "session.json",
            "--strips",
            "base.yaml",
            "-s",
            "bonus_buy.yaml",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.payload, PathBuf::from("session.json"));
        assert_eq!(args.strips.len(), 2);
        assert_eq!(args.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn empty_session_payload_verifies() {
        let seed = ServerSeed::from_bytes([7; 32]);
        let raw = serde_json::json!({
            "session_id": Uuid::nil(),
            "server_seed": seed.to_hex(),
            "server_seed_hash": hash_server_seed(&seed),
            "theta_commitment": null,
            "theta_seed": null,
            "spins": [],
        })
        .to_string();
        let payload = parse_payload(&raw).unwrap();
        let report = verify_payload(&payload, &[]);
        assert!(report.valid, "{report:?}");
        assert_eq!(report.commitment_valid, Some(true));
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(parse_payload("{\"session_id\": 1}").is_err());
    }
}
