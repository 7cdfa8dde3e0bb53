use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;
use vault_crypto::address::decode_address;
use vault_crypto::keys::key_hash_hex;
use vault_crypto::script::{find_match, hash_script, probe_all_versions, verify_match};
use vault_crypto::derive_address;
use vault_engine::{BalanceManager, EngineConfig, TransactionBuilder};
use vault_indexer::{BlockfrostIndexer, ChainIndexer, VenueClient};
use vault_storage::{new_contract, ContractRegistry, ContractStore};
use vault_types::{
    ContractStatus, KeyHash, Network, OutputRef, PlutusVersion, TradeSide, VaultDatum, VaultError,
    LOVELACE_PER_ADA,
};

#[derive(Parser)]
#[command(
    name = "vault",
    author,
    version,
    about = "Agent vault operator tool: derive, register, inspect and build vault transactions"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Engine config file (JSON). Flags and environment override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, env = "VAULT_NETWORK")]
    network: Option<Network>,
    #[arg(long, global = true, env = "VAULT_INDEXER_URL")]
    indexer_url: Option<String>,
    #[arg(long, global = true, env = "VAULT_INDEXER_PROJECT_ID", hide_env_values = true)]
    project_id: Option<String>,
    #[arg(long, global = true, env = "VAULT_REGISTRY")]
    registry: Option<PathBuf>,
    /// Collateral inputs for script spends, as `<tx hash>#<index>`.
    #[arg(long, global = true)]
    collateral: Vec<OutputRef>,
    #[arg(long, global = true, default_value = "warn")]
    log_level: Level,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a compiled script under every Plutus language tag
    HashScript {
        #[arg(long)]
        script: PathBuf,
    },
    /// Derive the enterprise script address of a compiled script
    DeriveAddress {
        #[arg(long)]
        script: PathBuf,
        #[arg(long, default_value = "v2")]
        version: PlutusVersion,
    },
    /// Check that a script hashes to an address, suggesting the form that does if not
    Verify {
        #[arg(long)]
        address: String,
        #[arg(long)]
        script: PathBuf,
        #[arg(long, default_value = "v2")]
        version: PlutusVersion,
    },
    /// Record a deployed contract in the registry
    Register {
        #[arg(long)]
        address: String,
        #[arg(long)]
        script: PathBuf,
        #[arg(long, default_value = "v2")]
        version: PlutusVersion,
        #[arg(long, default_value = "agent vault")]
        purpose: String,
    },
    /// Move a registry entry to another lifecycle status
    SetStatus {
        #[arg(long)]
        id: String,
        #[arg(long)]
        status: ContractStatus,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// List registry entries, newest first
    List,
    /// Show one registry entry by id or address
    Show {
        #[arg(long, conflicts_with = "address", required_unless_present = "address")]
        id: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    /// Probe language tags and CBOR wrapping for a stuck entry
    Recover {
        #[arg(long)]
        id: String,
    },
    /// Fresh balance snapshot of an address
    Balance {
        #[arg(long)]
        address: String,
    },
    /// Trade feasibility for a requested amount (lovelace)
    Evaluate {
        #[arg(long)]
        address: String,
        #[arg(long)]
        amount: u64,
        /// Defaults to the configured minimum trade floor.
        #[arg(long)]
        floor: Option<u64>,
    },
    /// Suggested position size for a vault
    Recommend {
        #[arg(long)]
        address: String,
    },
    /// Lock funds at a vault with a fresh datum
    BuildDeposit {
        #[arg(long)]
        from: String,
        #[arg(long)]
        vault: String,
        #[arg(long)]
        amount: u64,
        /// Owner payment key hash; defaults to the key behind `--from`.
        #[arg(long)]
        owner: Option<KeyHash>,
        #[arg(long)]
        max_trade: u64,
        #[arg(long, default_value_t = 1)]
        leverage: u64,
        #[arg(long)]
        trading_disabled: bool,
    },
    /// Owner withdrawal
    BuildWithdraw {
        #[arg(long)]
        vault: String,
        #[arg(long)]
        owner_address: String,
        #[arg(long)]
        amount: u64,
    },
    /// Agent trade funding, scaled to what the vault can afford
    BuildTrade {
        #[arg(long)]
        vault: String,
        #[arg(long)]
        amount: u64,
        #[arg(long, default_value = "long")]
        side: TradeSide,
    },
    /// Emergency withdrawal signed by the admin set
    BuildAdminWithdraw {
        #[arg(long)]
        vault: String,
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        amount: u64,
        #[arg(long = "signer", required = true)]
        signers: Vec<KeyHash>,
    },
    /// Disable agent trading on a vault (or re-enable it with --resume)
    EmergencyStop {
        #[arg(long)]
        vault: String,
        #[arg(long = "signer", required = true)]
        signers: Vec<KeyHash>,
        #[arg(long)]
        resume: bool,
    },
    /// Venue price and open interest
    Market {
        /// Convert this many lovelace to USD.
        #[arg(long)]
        lovelace: Option<u64>,
    },
    /// Payment key hash of an ed25519 verification key (hex)
    KeyHash {
        #[arg(long)]
        vkey: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: logging unavailable: {e}");
    }

    match run(cli).await {
        Ok(out) => {
            println!("{}", serde_json::to_string_pretty(&out).unwrap_or_else(|_| out.to_string()));
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<VaultError>() {
                Some(vault) => eprintln!("error[{}]: {e:#}", vault.kind().as_str()),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(network) = cli.network {
        config.network = network;
    }
    if let Some(url) = &cli.indexer_url {
        config.indexer.base_url = url.clone();
    }
    if let Some(project_id) = &cli.project_id {
        config.indexer.project_id = project_id.clone();
    }
    if let Some(path) = &cli.registry {
        config.registry_path = path.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Reads compiled script bytes from a text envelope (`cborHex`), a
/// blueprint validator (`compiledCode`), bare hex, or raw bytes.
fn read_script(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("reading script {}", path.display()))?;
    script_bytes(&raw)
}

fn script_bytes(raw: &[u8]) -> Result<Vec<u8>> {
    if let Ok(doc @ Value::Object(_)) = serde_json::from_slice::<Value>(raw) {
        let hex_field = ["cborHex", "compiledCode"]
            .iter()
            .find_map(|k| doc.get(k).and_then(Value::as_str))
            .or_else(|| {
                doc.pointer("/validators/0/compiledCode")
                    .and_then(Value::as_str)
            })
            .ok_or_else(|| anyhow!("JSON script has no cborHex or compiledCode field"))?;
        return hex::decode(hex_field).context("script hex");
    }
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if !trimmed.is_empty() && trimmed.len() % 2 == 0 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return hex::decode(trimmed).context("script hex");
    }
    Ok(raw.to_vec())
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn open_registry(config: &EngineConfig) -> Result<Arc<ContractRegistry>> {
    Ok(Arc::new(ContractRegistry::open(&config.registry_path)?))
}

fn balance_manager(config: &EngineConfig) -> Result<Arc<BalanceManager>> {
    let indexer: Arc<dyn ChainIndexer> = Arc::new(BlockfrostIndexer::new(config.indexer.clone())?);
    Ok(Arc::new(BalanceManager::from_config(indexer, config)))
}

fn builder(config: &EngineConfig, collateral: Vec<OutputRef>) -> Result<TransactionBuilder> {
    let registry: Arc<dyn ContractStore> = open_registry(config)?;
    Ok(TransactionBuilder::new(config, registry, balance_manager(config)?).with_collateral(collateral))
}

async fn run(cli: Cli) -> Result<Value> {
    let config = load_config(&cli)?;
    debug!(network = %config.network, registry = %config.registry_path.display(), "config loaded");

    match cli.command {
        Commands::HashScript { script } => {
            let bytes = read_script(&script)?;
            Ok(json!({
                "size": bytes.len(),
                "hashes": to_json(&probe_all_versions(&bytes))?,
            }))
        }
        Commands::DeriveAddress { script, version } => {
            let bytes = read_script(&script)?;
            let hash = hash_script(&bytes, version);
            Ok(json!({
                "version": version.to_string(),
                "network": config.network,
                "scriptHash": hash,
                "address": derive_address(&hash, config.network)?,
            }))
        }
        Commands::Verify {
            address,
            script,
            version,
        } => {
            let bytes = read_script(&script)?;
            let matches = verify_match(&address, &bytes, version)?;
            let suggestion = if matches {
                None
            } else {
                find_match(&bytes, &address)?
            };
            Ok(json!({
                "address": address,
                "version": version.to_string(),
                "matches": matches,
                "suggestion": to_json(&suggestion)?,
            }))
        }
        Commands::Register {
            address,
            script,
            version,
            purpose,
        } => {
            let bytes = read_script(&script)?;
            let registry = open_registry(&config)?;
            let id = registry.register(new_contract(address, bytes, version, purpose))?;
            let entry = registry
                .get(&id)?
                .ok_or_else(|| VaultError::NotFound(id.clone()))?;
            to_json(&entry)
        }
        Commands::SetStatus { id, status, note } => {
            let registry = open_registry(&config)?;
            to_json(&registry.update_status(&id, status, &note)?)
        }
        Commands::List => to_json(&open_registry(&config)?.list()?),
        Commands::Show { id, address } => {
            let registry = open_registry(&config)?;
            let (key, entry) = match (id, address) {
                (Some(id), _) => {
                    let entry = registry.get(&id)?;
                    (id, entry)
                }
                (None, Some(address)) => {
                    let entry = registry.get_by_address(&address)?;
                    (address, entry)
                }
                (None, None) => return Err(anyhow!("pass --id or --address")),
            };
            to_json(&entry.ok_or(VaultError::NotFound(key))?)
        }
        Commands::Recover { id } => {
            let registry = open_registry(&config)?;
            let outcome = registry.attempt_recovery(&id)?;
            Ok(json!({
                "outcome": to_json(&outcome)?,
                "entry": to_json(&registry.get(&id)?)?,
            }))
        }
        Commands::Balance { address } => {
            decode_address(&address)?;
            to_json(&balance_manager(&config)?.get_balance(&address).await?)
        }
        Commands::Evaluate {
            address,
            amount,
            floor,
        } => {
            let floor = floor.unwrap_or(config.min_trade_floor);
            let verdict = balance_manager(&config)?
                .evaluate_trade_execution(&address, amount, floor)
                .await?;
            to_json(&verdict)
        }
        Commands::Recommend { address } => to_json(
            &balance_manager(&config)?
                .get_trading_recommendations(&address)
                .await?,
        ),
        Commands::BuildDeposit {
            from,
            vault,
            amount,
            owner,
            max_trade,
            leverage,
            trading_disabled,
        } => {
            let owner = match owner {
                Some(owner) => owner,
                None => match decode_address(&from)?.payment {
                    vault_crypto::Credential::Key(k) => k,
                    vault_crypto::Credential::Script(_) => {
                        return Err(anyhow!("--from is a script address; pass --owner"))
                    }
                },
            };
            let datum = VaultDatum {
                owner,
                trading_enabled: !trading_disabled,
                max_trade_amount: max_trade,
                leverage,
            };
            let builder = builder(&config, cli.collateral)?;
            let funding = builder.balance().get_balance(&from).await?.utxos;
            to_json(&builder.build_deposit(&from, &funding, &vault, amount, &datum)?)
        }
        Commands::BuildWithdraw {
            vault,
            owner_address,
            amount,
        } => {
            let builder = builder(&config, cli.collateral)?;
            to_json(&builder.build_user_withdraw(&vault, &owner_address, amount).await?)
        }
        Commands::BuildTrade {
            vault,
            amount,
            side,
        } => {
            let builder = builder(&config, cli.collateral)?;
            to_json(&builder.build_agent_trade(&vault, amount, side).await?)
        }
        Commands::BuildAdminWithdraw {
            vault,
            recipient,
            amount,
            signers,
        } => {
            let builder = builder(&config, cli.collateral)?;
            to_json(
                &builder
                    .build_admin_withdraw(&vault, &recipient, amount, &signers)
                    .await?,
            )
        }
        Commands::EmergencyStop {
            vault,
            signers,
            resume,
        } => {
            let builder = builder(&config, cli.collateral)?;
            to_json(&builder.build_set_trading(&vault, resume, &signers).await?)
        }
        Commands::Market { lovelace } => {
            let venue = VenueClient::new(
                &config.venue_url,
                Duration::from_secs(config.indexer.timeout_secs.max(1)),
            )?;
            let info = venue.market_info().await?;
            let mut out = to_json(&info)?;
            if let Some(lovelace) = lovelace {
                out["lovelace"] = json!(lovelace);
                out["ada"] = json!(lovelace as f64 / LOVELACE_PER_ADA as f64);
                out["usd"] = json!(info.lovelace_to_usd(lovelace));
            }
            Ok(out)
        }
        Commands::KeyHash { vkey } => {
            let hash = key_hash_hex(&vkey)?;
            Ok(json!({
                "keyHash": hash,
                "testnetAddress": vault_crypto::address::enterprise_key_address(&hash, Network::Testnet)?,
                "mainnetAddress": vault_crypto::address::enterprise_key_address(&hash, Network::Mainnet)?,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn script_bytes_accepts_envelopes_and_hex() {
        let envelope = br#"{ "type": "PlutusScriptV2", "cborHex": "4e4d01000033222220051200120011" }"#;
        let from_envelope = script_bytes(envelope).unwrap();
        assert_eq!(from_envelope[0], 0x4e);

        let blueprint = br#"{ "validators": [ { "title": "vault.spend", "compiledCode": "4d01000033222220051200120011" } ] }"#;
        assert_eq!(script_bytes(blueprint).unwrap(), from_envelope[1..].to_vec());

        assert_eq!(script_bytes(b"  4d01\n").unwrap(), vec![0x4d, 0x01]);
        assert_eq!(script_bytes(&[0x4d, 0x01, 0xff]).unwrap(), vec![0x4d, 0x01, 0xff]);
        assert!(script_bytes(br#"{ "title": "nothing here" }"#).is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "network": "testnet", "indexer": {{ "project_id": "from-file" }}, "registry_path": "a.json" }}"#
        )
        .unwrap();

        let cli = Cli::parse_from([
            "vault",
            "--config",
            file.path().to_str().unwrap(),
            "--network",
            "mainnet",
            "--registry",
            "b.json",
            "list",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.indexer.project_id, "from-file");
        assert_eq!(config.registry_path, PathBuf::from("b.json"));
        assert_eq!(config.reserve_lovelace, 2 * LOVELACE_PER_ADA);
    }

    #[test]
    fn admin_commands_need_a_signer() {
        assert!(Cli::try_parse_from(["vault", "emergency-stop", "--vault", "addr_test1x"]).is_err());
        let cli = Cli::try_parse_from([
            "vault",
            "build-trade",
            "--vault",
            "addr_test1x",
            "--amount",
            "50000000",
            "--side",
            "short",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::BuildTrade {
                side: TradeSide::Short,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn register_and_show_through_the_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("vault.plutus");
        std::fs::write(&script, "4d01000033222220051200120011").unwrap();
        let registry = dir.path().join("registry.json");
        let bytes = read_script(&script).unwrap();
        let address = derive_address(&hash_script(&bytes, PlutusVersion::V2), Network::Testnet).unwrap();

        let args = |cmd: Vec<&str>| {
            let mut argv = vec![
                "vault".to_string(),
                "--registry".to_string(),
                registry.display().to_string(),
            ];
            argv.extend(cmd.into_iter().map(String::from));
            Cli::parse_from(argv)
        };
        let registered = run(args(vec![
            "register",
            "--address",
            &address,
            "--script",
            script.to_str().unwrap(),
        ]))
        .await
        .unwrap();
        assert_eq!(registered["status"], "testing");

        let shown = run(args(vec!["show", "--address", &address])).await.unwrap();
        assert_eq!(shown["id"], registered["id"]);

        let err = run(args(vec!["show", "--id", "contract_missing"])).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VaultError>(),
            Some(VaultError::NotFound(_))
        ));
    }
}
