use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use guess_client::config::DEFAULT_POLL_INTERVAL;
use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod client;
mod ui;
mod wallets;

const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE: &str = "guess-the-number.log";

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: guess-the-number [--paseo | --local] [--rpc-url <url>] [--contract <address>]\n\
         [--wallet <name>]... [--wallet-dir <path>] [--dev-account <name>]...\n\
         [--poll-secs <seconds>] [--log-dir <path>]\n\
         \n\
         Flags:\n\
           --paseo               Play on Pop Network Paseo through a contract gateway (default {})\n\
                                 The bare RPC node does not serve the gateway API; pass\n\
                                 --rpc-url <gateway> unless a gateway runs on that host\n\
           --local               Play on a simulated in-process chain; with --rpc-url, on a local node\n\
           --rpc-url <url>       Contract gateway URL for the selected network (local default {})\n\
           --contract <address>  Contract address; remembered for the network in .deployments/\n\
           --wallet <name>       Keystore wallet to play with (repeatable; all wallets by default)\n\
           --wallet-dir <path>   Override the wallet directory (defaults to ~/.guess-the-number/wallets)\n\
           --dev-account <name>  Play with a development account (repeatable; local defaults {:?})\n\
           --poll-secs <secs>    Seconds between game refreshes (10 to 20, default {})\n\
           --log-dir <path>      Directory for log files (default ./{})",
        client::DEFAULT_PASEO_RPC_URL,
        client::DEFAULT_LOCAL_RPC_URL,
        client::DEFAULT_DEV_ACCOUNTS,
        DEFAULT_POLL_INTERVAL.as_secs(),
        DEFAULT_LOG_DIR,
    );
    std::process::exit(0);
}

struct CliArgs {
    app: client::AppConfig,
    log_dir: PathBuf,
}

fn parse_cli_args() -> Result<CliArgs> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Paseo,
        Local,
    }

    let mut args = std::env::args().skip(1);
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut contract: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_names: Vec<String> = Vec::new();
    let mut dev_accounts: Vec<String> = Vec::new();
    let mut poll_interval = DEFAULT_POLL_INTERVAL;
    let mut log_dir: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--paseo" | "--local" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --paseo/--local"
                    ));
                }
                network_flag = Some(if arg == "--paseo" {
                    NetworkFlag::Paseo
                } else {
                    NetworkFlag::Local
                });
            }
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                if custom_url.is_some() {
                    return Err(eyre!("--rpc-url may only be specified once"));
                }
                custom_url = Some(url);
            }
            "--contract" => {
                let address = args
                    .next()
                    .ok_or_else(|| eyre!("--contract requires an address argument"))?;
                if contract.is_some() {
                    return Err(eyre!("--contract may only be specified once"));
                }
                contract = Some(address);
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                wallet_names.push(name);
            }
            "--dev-account" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--dev-account requires an account name"))?;
                dev_accounts.push(name);
            }
            "--poll-secs" => {
                let secs: u64 = args
                    .next()
                    .ok_or_else(|| eyre!("--poll-secs requires a number of seconds"))?
                    .parse()
                    .wrap_err("--poll-secs must be a whole number of seconds")?;
                poll_interval = Duration::from_secs(secs);
            }
            "--log-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--log-dir requires a path argument"))?;
                log_dir = Some(dir);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let network = match (network_flag, custom_url) {
        (None | Some(NetworkFlag::Paseo), url) => client::NetworkTarget::Paseo {
            url: url.unwrap_or_else(|| client::DEFAULT_PASEO_RPC_URL.to_string()),
        },
        (Some(NetworkFlag::Local), Some(url)) => client::NetworkTarget::LocalNode { url },
        (Some(NetworkFlag::Local), None) => client::NetworkTarget::Simulated,
    };

    if !dev_accounts.is_empty() && (!wallet_names.is_empty() || wallet_dir.is_some()) {
        return Err(eyre!("--dev-account cannot be combined with keystore wallets"));
    }
    let wallets = match &network {
        client::NetworkTarget::Paseo { .. } if !dev_accounts.is_empty() => {
            return Err(eyre!("Development accounts are only available with --local"));
        }
        _ if !dev_accounts.is_empty() => client::WalletConfig::DevAccounts {
            names: dev_accounts,
        },
        client::NetworkTarget::Simulated if wallet_names.is_empty() && wallet_dir.is_none() => {
            client::WalletConfig::DevAccounts {
                names: client::DEFAULT_DEV_ACCOUNTS.map(String::from).to_vec(),
            }
        }
        _ => client::WalletConfig::Keystore {
            names: wallet_names,
            dir: wallets::resolve_wallet_dir(wallet_dir.as_deref())?,
        },
    };

    Ok(CliArgs {
        app: client::AppConfig {
            network,
            contract,
            wallets,
            poll_interval,
        },
        log_dir: PathBuf::from(log_dir.unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())),
    })
}

/// The terminal belongs to the UI, so logs go to a daily rolling file.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, LOG_FILE));
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!(e))?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = parse_cli_args()?;
    let _guard = init_tracing(&args.log_dir)?;
    tracing::info!("starting guess-the-number client");
    deployments::ensure_structure().map_err(|e| eyre!(e))?;
    client::run_app(args.app).await
}
