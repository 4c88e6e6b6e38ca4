use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use leaf_settle::{
    abi::{decode_lock_payload, encode_lock_payload},
    config::{parse_amount, NetworkConfig},
    presale::{PresaleConfig, PresaleSettlement},
    scenario, Address, Amount,
};

#[derive(Parser)]
#[command(name = "leaf-settle", version, about = "LEAF vesting and presale settlement tools")]
struct Cli {
    /// JSON file with network profiles (built-in profiles when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay the presale/vesting integration run on an in-memory engine
    Simulate {
        #[arg(long, default_value = "local")]
        network: String,
        /// Seed for the two signer addresses
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Encode a batch-lock payload for transfer_and_call
    EncodeLock {
        /// Recipient and amount as ADDRESS:AMOUNT, repeatable
        #[arg(long = "to", value_parser = parse_lock_target, required = true)]
        targets: Vec<(Address, Amount)>,
    },
    /// Decode a batch-lock payload given as hex
    DecodeLock { payload: String },
    /// Print the resolved network profiles
    Networks,
    /// Allocation a payment would receive on a network
    Quote {
        #[arg(long)]
        network: String,
        #[arg(long)]
        wei: String,
    },
}

#[derive(Serialize)]
struct DecodedLock {
    recipient: Address,
    amount: String,
    total: String,
}

fn parse_lock_target(raw: &str) -> Result<(Address, Amount), String> {
    let (addr, amount) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected ADDRESS:AMOUNT, got {raw}"))?;
    let addr: Address = addr.parse().map_err(|e| format!("{e}"))?;
    let amount = parse_amount("amount", amount).map_err(|e| format!("{e}"))?;
    Ok((addr, amount))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<NetworkConfig> {
    let mut config = NetworkConfig::load(path.map(|p| p.as_path()))?;
    config.apply_env().context("applying environment overrides")?;
    Ok(config)
}

fn simulate_cmd(config: &NetworkConfig, network: &str, seed: u64, json: bool) -> Result<()> {
    let profile = config.profile(network)?;
    let (owner, second) = scenario::signers(seed);
    let report = scenario::run(profile, owner, second).context("integration replay failed")?;
    if json {
        return print_json(&report);
    }

    println!("✅ Deployed LeafToken to {}", report.addresses.token);
    println!("✅ Deployed LeafLongTermVesting to {}", report.addresses.vesting);
    println!("✅ Deployed LeafPresale to {}", report.addresses.presale);
    for step in &report.steps {
        println!();
        println!("-- {}", step.action);
        println!("Owner have {} leaf tokens", step.owner_balance);
        println!("Presale contract have {} leaf tokens", step.presale_inventory);
    }
    println!();
    println!("---------Checking on vesting contract---------");
    println!("Total vested count: {}", report.vestors.len());
    for entry in &report.vestors {
        println!("Vested Address is {} ({} locked)", entry.recipient, entry.locked_amount);
    }
    println!("Vesting root: {}", report.vesting_root);
    Ok(())
}

fn encode_lock_cmd(targets: &[(Address, Amount)]) -> Result<()> {
    let (recipients, amounts): (Vec<Address>, Vec<Amount>) = targets.iter().copied().unzip();
    println!("0x{}", hex::encode(encode_lock_payload(&recipients, &amounts)));
    Ok(())
}

fn decode_lock_cmd(payload: &str) -> Result<()> {
    let trimmed = payload.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(digits).context("payload is not hex")?;
    let (recipients, amounts) = decode_lock_payload(&bytes)?;
    let mut running: Amount = 0;
    let mut rows = Vec::with_capacity(recipients.len());
    for (recipient, amount) in recipients.into_iter().zip(amounts) {
        running = match running.checked_add(amount) {
            Some(v) => v,
            None => bail!("payload amounts overflow"),
        };
        rows.push(DecodedLock {
            recipient,
            amount: amount.to_string(),
            total: running.to_string(),
        });
    }
    print_json(&rows)
}

fn quote_cmd(config: &NetworkConfig, network: &str, wei: &str) -> Result<()> {
    let profile = config.profile(network)?;
    let wei = parse_amount("wei", wei)?;
    let presale = PresaleSettlement::new(
        Address::ZERO,
        PresaleConfig {
            token: profile.leaf_token.unwrap_or(Address::ZERO),
            vesting: profile.vesting.unwrap_or(Address::ZERO),
            min_accept_amount: profile.min_accept_wei,
            leaf_per_wei: profile.leaf_per_wei,
        },
    );
    let allocation = presale.quote(wei)?;
    println!("{allocation}");
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate {
            network,
            seed,
            json,
        } => simulate_cmd(&load_config(cli.config.as_ref())?, &network, seed, json),
        Command::EncodeLock { targets } => encode_lock_cmd(&targets),
        Command::DecodeLock { payload } => decode_lock_cmd(&payload),
        Command::Networks => print_json(&load_config(cli.config.as_ref())?),
        Command::Quote { network, wei } => quote_cmd(&load_config(cli.config.as_ref())?, &network, &wei),
    }
}
