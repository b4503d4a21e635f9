use crate::{
    ui,
    wallets,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
    record_deployment,
};
use guess_client::{
    Error as ClientError,
    config::{
        ClientConfig,
        DEFAULT_RPC_URL,
    },
    notify::{
        Notice,
        NotificationBoard,
        NotificationSink,
    },
    session::{
        SessionPool,
        parse_number,
    },
    signer::{
        KeypairSigner,
        Signer,
    },
    transport::{
        ContractTransport,
        HttpTransport,
        LocalChain,
        LocalChainConfig,
    },
    types::ContractAddress,
    view::GameViewModel,
};
use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::time;
use tracing::{
    debug,
    info,
    warn,
};

pub const DEFAULT_PASEO_RPC_URL: &str = DEFAULT_RPC_URL;
pub const DEFAULT_LOCAL_RPC_URL: &str = "ws://127.0.0.1:9944";
pub const DEFAULT_DEV_ACCOUNTS: [&str; 2] = ["alice", "bob"];
const SIMULATED_URL: &str = "in-process";
const FADE_TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub enum NetworkTarget {
    Paseo { url: String },
    LocalNode { url: String },
    /// A chain simulated inside this process.
    Simulated,
}

impl NetworkTarget {
    fn url(&self) -> &str {
        match self {
            NetworkTarget::Paseo { url } | NetworkTarget::LocalNode { url } => url,
            NetworkTarget::Simulated => SIMULATED_URL,
        }
    }

    fn deployment_env(&self) -> Option<DeploymentEnv> {
        match self {
            NetworkTarget::Paseo { .. } => Some(DeploymentEnv::Paseo),
            NetworkTarget::LocalNode { .. } => Some(DeploymentEnv::Local),
            NetworkTarget::Simulated => None,
        }
    }

    /// The default Paseo URL is a bare RPC node without the contract gateway API.
    fn endpoint_warning(&self) -> Option<&'static str> {
        match self {
            NetworkTarget::Paseo { url } if url.trim_end_matches('/') == DEFAULT_PASEO_RPC_URL => {
                Some("The default Paseo endpoint serves no contract gateway; pass --rpc-url <gateway>")
            }
            _ => None,
        }
    }

    fn label(&self) -> String {
        match self {
            NetworkTarget::Paseo { url } => format!("{} {url}", DeploymentEnv::Paseo),
            NetworkTarget::LocalNode { url } => format!("{} {url}", DeploymentEnv::Local),
            NetworkTarget::Simulated => "Simulated chain".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum WalletConfig {
    /// Encrypted keystores; every wallet in `dir` when `names` is empty.
    Keystore { names: Vec<String>, dir: PathBuf },
    DevAccounts { names: Vec<String> },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub contract: Option<String>,
    pub wallets: WalletConfig,
    pub poll_interval: Duration,
}

pub struct Account {
    pub name: String,
    pub signer: Arc<dyn Signer>,
}

impl Account {
    pub fn dev(name: &str) -> Self {
        Self {
            name: name.to_string(),
            signer: Arc::new(KeypairSigner::dev_account(name)),
        }
    }
}

/// Everything the UI renders for one frame.
#[derive(Clone, Debug, Default)]
pub struct AppSnapshot {
    pub account: String,
    pub address: String,
    pub account_index: usize,
    pub account_count: usize,
    pub network: String,
    pub contract: String,
    pub game_line: Option<String>,
    pub game_found: bool,
    pub attempts: Vec<String>,
    pub notices: Vec<Notice>,
}

pub struct AppController<T, C> {
    pool: SessionPool<T, C>,
    accounts: Vec<Account>,
    active: usize,
    model: GameViewModel<T>,
    board: NotificationBoard,
    network: String,
}

impl<T, C> AppController<T, C>
where
    T: ContractTransport,
    C: Fn(&ClientConfig) -> guess_client::Result<T>,
{
    pub fn new(
        pool: SessionPool<T, C>,
        accounts: Vec<Account>,
        board: NotificationBoard,
        network: String,
    ) -> Result<Self> {
        let first = accounts
            .first()
            .ok_or_else(|| eyre!("No wallet available to play with"))?;
        let session = pool.session_for(Some(first.signer.clone()))?;
        let model = GameViewModel::new(session, pool.config().poll_interval);
        Ok(Self {
            pool,
            accounts,
            active: 0,
            model,
            board,
            network,
        })
    }

    pub fn model(&self) -> &GameViewModel<T> {
        &self.model
    }

    pub fn board(&self) -> &NotificationBoard {
        &self.board
    }

    /// Move to the next account; its session is reused if it was opened before.
    pub async fn switch_account(&mut self) -> Result<()> {
        if self.accounts.len() < 2 {
            self.board
                .error("Only one wallet is connected; nothing to switch to".to_string());
            return Ok(());
        }
        let next = (self.active + 1) % self.accounts.len();
        let account = &self.accounts[next];
        let session = self.pool.session_for(Some(account.signer.clone()))?;
        info!(account = %account.name, origin = %session.origin().short(), "switching account");
        let model = GameViewModel::new(session, self.pool.config().poll_interval);
        let previous = std::mem::replace(&mut self.model, model);
        previous.shutdown().await;
        self.active = next;
        Ok(())
    }

    pub fn snapshot(&self) -> AppSnapshot {
        let account = &self.accounts[self.active];
        let game = self.model.current_game();
        AppSnapshot {
            account: account.name.clone(),
            address: self.model.session().origin().to_string(),
            account_index: self.active + 1,
            account_count: self.accounts.len(),
            network: self.network.clone(),
            contract: self.pool.config().contract_address.to_string(),
            game_line: game.as_ref().map(|g| g.headline()),
            game_found: game.as_ref().is_some_and(|g| g.is_found()),
            attempts: self
                .model
                .attempts()
                .iter()
                .map(|attempt| attempt.describe())
                .collect(),
            notices: self.board.notices(),
        }
    }

    pub async fn start_new_game(&self, min: &str, max: &str) {
        let result = match parse_number(min).and_then(|min| Ok((min, parse_number(max)?))) {
            Ok((min, max)) => self.model.start_new_game(min, max).await.map(drop),
            Err(err) => Err(err),
        };
        self.report(result);
    }

    pub async fn make_guess(&self, guess: &str) {
        let result = match parse_number(guess) {
            Ok(guess) => self.model.make_guess(guess).await.map(drop),
            Err(err) => Err(err),
        };
        self.report(result);
    }

    pub fn refresh(&self) {
        self.model.refresh_now();
    }

    pub async fn shutdown(self) {
        self.model.shutdown().await;
    }

    fn report(&self, result: guess_client::Result<()>) {
        match result {
            Ok(()) => {}
            Err(err @ (ClientError::Validation(_) | ClientError::NoSigner)) => {
                self.board.error(err.to_string());
            }
            Err(err) => debug!(%err, "session already reported the failure"),
        }
    }
}

pub fn load_accounts(wallets: &WalletConfig) -> Result<Vec<Account>> {
    match wallets {
        WalletConfig::DevAccounts { names } => {
            Ok(names.iter().map(|name| Account::dev(name)).collect())
        }
        WalletConfig::Keystore { names, dir } => {
            let descriptors = if names.is_empty() {
                wallets::list_wallets(dir)?
            } else {
                names
                    .iter()
                    .map(|name| wallets::find_wallet(dir, name))
                    .collect::<Result<Vec<_>>>()?
            };
            if descriptors.is_empty() {
                return Err(eyre!(
                    "No wallets found in {}; pass --wallet-dir or --dev-account",
                    dir.to_string_lossy()
                ));
            }
            descriptors
                .iter()
                .map(|descriptor| {
                    let signer = descriptor.unlock()?;
                    Ok(Account {
                        name: descriptor.name.clone(),
                        signer: Arc::new(signer),
                    })
                })
                .collect()
        }
    }
}

/// An explicit address wins and is remembered for the network; otherwise the stored
/// deployment for the same URL, then the published default.
pub fn resolve_contract(
    store: Option<&DeploymentStore>,
    network_url: &str,
    explicit: Option<&str>,
) -> Result<ContractAddress> {
    if let Some(raw) = explicit {
        let address: ContractAddress = raw.parse()?;
        if let Some(store) = store {
            let known = store.latest_for(network_url).map_err(|e| eyre!(e))?;
            if known.is_none_or(|record| record.contract_address != address.as_str()) {
                record_deployment(store, address.as_str(), network_url)
                    .map_err(|e| eyre!(e))?;
            }
        }
        return Ok(address);
    }

    let record = match store {
        Some(store) => store.latest_for(network_url).map_err(|e| eyre!(e))?,
        None => None,
    };
    let Some(record) = record else {
        info!(network = %network_url, "no stored deployment; using default contract");
        return Ok(ContractAddress::default());
    };
    let address: ContractAddress = record
        .contract_address
        .parse()
        .wrap_err_with(|| format!("Stored deployment from {} is invalid", record.deployed_at))?;
    info!(%address, "using stored deployment");
    Ok(address)
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let store = config
        .network
        .deployment_env()
        .map(DeploymentStore::new)
        .transpose()
        .map_err(|e| eyre!(e))?;
    let contract = resolve_contract(
        store.as_ref(),
        config.network.url(),
        config.contract.as_deref(),
    )?;
    let client_config = ClientConfig::new(config.network.url(), contract, config.poll_interval);
    let accounts = load_accounts(&config.wallets)?;
    let board = NotificationBoard::new();
    let sink: Arc<dyn NotificationSink> = Arc::new(board.clone());
    let network = config.network.label();
    if let Some(message) = config.network.endpoint_warning() {
        warn!(url = %config.network.url(), "{message}");
        board.error(message.to_string());
    }

    match config.network {
        NetworkTarget::Simulated => {
            let chain = LocalChain::new(LocalChainConfig::default());
            let pool = SessionPool::new(client_config, sink, move |_: &ClientConfig| {
                Ok(chain.clone())
            });
            run_with(AppController::new(pool, accounts, board, network)?).await
        }
        NetworkTarget::Paseo { .. } | NetworkTarget::LocalNode { .. } => {
            let pool = SessionPool::new(client_config, sink, |config: &ClientConfig| {
                HttpTransport::new(&config.rpc_url, config.contract_address.clone())
            });
            run_with(AppController::new(pool, accounts, board, network)?).await
        }
    }
}

async fn run_with<T, C>(controller: AppController<T, C>) -> Result<()>
where
    T: ContractTransport,
    C: Fn(&ClientConfig) -> guess_client::Result<T>,
{
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<T, C>(
    mut controller: AppController<T, C>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()>
where
    T: ContractTransport,
    C: Fn(&ClientConfig) -> guess_client::Result<T>,
{
    tracing::info!("Running app loop");
    let mut notices = controller.board().subscribe();
    let mut fade = time::interval(FADE_TICK);
    let mut view = controller.model().subscribe();

    loop {
        ui::draw(ui_state, &controller.snapshot()).wrap_err("draw failed")?;

        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    controller.shutdown().await;
                    return Err(eyre!("game poller stopped unexpectedly"));
                }
            }
            _ = notices.changed() => {}
            _ = fade.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::NewGame { min, max } => {
                        controller.start_new_game(&min, &max).await;
                    }
                    ui::UserEvent::Guess(guess) => controller.make_guess(&guess).await,
                    ui::UserEvent::SwitchWallet => {
                        controller
                            .switch_account()
                            .await
                            .wrap_err("switching account failed")?;
                        view = controller.model().subscribe();
                    }
                    ui::UserEvent::Refresh => controller.refresh(),
                }
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}
