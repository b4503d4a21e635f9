use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use guess_client::signer::KeypairSigner;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

const KEYSTORE_EXT: &str = "json";

/// An encrypted keystore file; the file stem is the wallet name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    fn from_path(path: PathBuf) -> Option<Self> {
        if !path.is_file() || path.extension()? != KEYSTORE_EXT {
            return None;
        }
        let name = path.file_stem()?.to_str()?.to_owned();
        Some(Self { name, path })
    }

    pub fn unlock(&self) -> Result<KeypairSigner> {
        let password = rpassword::prompt_password(format!(
            "Password for wallet '{}' ({}): ",
            self.name,
            self.path.display()
        ))
        .wrap_err("Failed to read wallet password")?;
        self.decrypt(&password)
    }

    pub fn decrypt(&self, password: &str) -> Result<KeypairSigner> {
        let secret = eth_keystore::decrypt_key(&self.path, password)
            .map_err(|err| eyre!("Cannot unlock wallet '{}': {err}", self.name))?;
        Ok(KeypairSigner::from_secret_bytes(&self.name, &secret)?)
    }
}

/// `~/.guess-the-number/wallets` unless overridden; `~` is expanded.
pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    let raw = dir.unwrap_or("~/.guess-the-number/wallets");
    let expanded = shellexpand::full(raw)
        .map_err(|err| eyre!("Cannot expand wallet directory {raw:?}: {err}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Keystores in `dir` sorted by name; a missing directory has none.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err)
                .wrap_err_with(|| format!("Failed to read wallet directory {}", dir.display()));
        }
    };
    let mut wallets = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .wrap_err("Failed to list wallet directory")?
        .into_iter()
        .filter_map(WalletDescriptor::from_path)
        .collect::<Vec<_>>();
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    list_wallets(dir)?
        .into_iter()
        .find(|wallet| wallet.name == name)
        .ok_or_else(|| eyre!("No wallet named '{name}' in {}", dir.display()))
}
