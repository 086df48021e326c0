use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use blueico::{
    auth::SignedCall,
    contracts::{CALCULATOR_LABEL, SALE_LABEL},
    logging::init_tracing,
    runtime::JournalEntry,
    Address, Call, Config, ErrorKind, Runtime,
};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "blueico",
    version,
    about = "BlueCoin ledger, BlueICO sale and metered Calculator"
)]
struct Cli {
    /// JSON config; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an ed25519 keypair and its ledger address
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Print the address for a public key or a label
    Address {
        #[arg(long, conflicts_with = "label", required_unless_present = "label")]
        pk_hex: Option<String>,
        #[arg(long)]
        label: Option<String>,
    },
    /// Sign a call (JSON) with a 32-byte secret key for the configured deployment
    Sign {
        #[arg(long)]
        sk_hex: String,
        #[arg(long)]
        nonce: u64,
        #[arg(long)]
        call: String,
    },
    /// Execute a scenario file and print receipts plus a final summary
    Run {
        scenario: PathBuf,
        #[arg(long)]
        journal_out: Option<PathBuf>,
    },
    /// Replay a journal and compare the resulting state root
    Verify {
        journal: PathBuf,
        #[arg(long)]
        root: String,
    },
}

#[derive(Deserialize)]
struct Scenario {
    /// Extra accounts to include in the summary.
    #[serde(default)]
    watch: Vec<Address>,
    steps: Vec<Step>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    Call { from: Address, call: Call },
    Signed(SignedCall),
    Advance { seconds: u64 },
    SetTime { timestamp: u64 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    init_tracing(&config.logging)?;

    match cli.command {
        Command::Keygen { out_dir } => keygen_cmd(&out_dir),
        Command::Address { pk_hex, label } => address_cmd(pk_hex.as_deref(), label.as_deref()),
        Command::Sign { sk_hex, nonce, call } => sign_cmd(&config, &sk_hex, nonce, &call),
        Command::Run {
            scenario,
            journal_out,
        } => run_cmd(&config, &scenario, journal_out.as_deref()),
        Command::Verify { journal, root } => verify_cmd(&config, &journal, &root),
    }
}

fn parse_sk_hex(sk_hex: &str) -> Result<SigningKey> {
    let bytes = hex::decode(sk_hex.trim()).context("invalid sk-hex")?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow!("sk-hex must be 32 bytes (64 hex chars)"))?;
    Ok(SigningKey::from_bytes(&arr))
}

fn keygen_cmd(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut sk_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut sk_bytes);
    let sk = SigningKey::from_bytes(&sk_bytes);
    let pk = sk.verifying_key();
    let address = Address::from_public_key(pk.as_bytes());

    fs::write(out_dir.join("sk.hex"), hex::encode(sk_bytes)).context("failed to write sk.hex")?;
    fs::write(out_dir.join("pk.hex"), hex::encode(pk.as_bytes()))
        .context("failed to write pk.hex")?;
    fs::write(out_dir.join("address"), address.to_string()).context("failed to write address")?;
    println!("{address}");
    Ok(())
}

fn address_cmd(pk_hex: Option<&str>, label: Option<&str>) -> Result<()> {
    let address = match (pk_hex, label) {
        (Some(pk_hex), _) => {
            let bytes = hex::decode(pk_hex.trim()).context("invalid pk-hex")?;
            let arr: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow!("pk-hex must be 32 bytes (64 hex chars)"))?;
            Address::from_public_key(&arr)
        }
        (None, Some(label)) => Address::from_label(label),
        (None, None) => bail!("one of --pk-hex or --label is required"),
    };
    println!("{address}");
    Ok(())
}

fn sign_cmd(config: &Config, sk_hex: &str, nonce: u64, call_json: &str) -> Result<()> {
    let sk = parse_sk_hex(sk_hex)?;
    let call: Call = serde_json::from_str(call_json).context("failed to parse --call")?;
    let deployment = Runtime::new(config)?.deployment_id();
    let signed = SignedCall::sign(&sk, &deployment, nonce, call)?;
    println!("{}", serde_json::to_string(&signed)?);
    Ok(())
}

fn run_cmd(config: &Config, scenario_path: &Path, journal_out: Option<&Path>) -> Result<()> {
    let raw = fs::read_to_string(scenario_path)
        .with_context(|| format!("failed to read scenario {}", scenario_path.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw).context("failed to parse scenario")?;

    let mut runtime = Runtime::new(config)?;
    for step in scenario.steps {
        match step {
            // rejected calls are reported through their receipt
            Step::Call { from, call } => {
                let _ = runtime.execute(from, call);
            }
            Step::Signed(signed) => {
                let caller = signed.caller();
                if let Err(err) = runtime.submit(signed) {
                    if matches!(err.kind(), ErrorKind::BadNonce | ErrorKind::BadSignature) {
                        warn!(caller = %caller, error = %err, "signed call refused");
                    }
                }
            }
            Step::Advance { seconds } => runtime.advance_time(seconds),
            Step::SetTime { timestamp } => runtime.set_time(timestamp)?,
        }
    }

    for receipt in runtime.receipts() {
        println!("{}", serde_json::to_string(receipt)?);
    }

    if let Some(path) = journal_out {
        let json = serde_json::to_vec_pretty(runtime.journal())?;
        fs::write(path, json)
            .with_context(|| format!("failed to write journal {}", path.display()))?;
    }

    let mut accounts: BTreeSet<Address> = config.genesis.native_balances.keys().copied().collect();
    accounts.insert(config.genesis.owner);
    accounts.insert(Address::from_label(SALE_LABEL));
    accounts.insert(Address::from_label(CALCULATOR_LABEL));
    accounts.extend(runtime.journal().iter().map(|e| e.caller));
    accounts.extend(scenario.watch);
    let accounts: Vec<Address> = accounts.into_iter().collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&runtime.summary(&accounts))?
    );
    Ok(())
}

fn verify_cmd(config: &Config, journal_path: &Path, root_hex: &str) -> Result<()> {
    let raw = fs::read_to_string(journal_path)
        .with_context(|| format!("failed to read journal {}", journal_path.display()))?;
    let journal: Vec<JournalEntry> = serde_json::from_str(&raw).context("failed to parse journal")?;
    let expected = hex::decode(root_hex.trim()).context("invalid --root")?;

    let mut runtime = Runtime::new(config)?;
    runtime.replay(&journal)?;
    let root = runtime.state_root();
    if root.as_slice() != expected.as_slice() {
        bail!(
            "state root mismatch: journal replays to {}, expected {}",
            hex::encode(root),
            root_hex.trim()
        );
    }
    println!("verify: OK ({} entries, root {})", journal.len(), hex::encode(root));
    Ok(())
}
