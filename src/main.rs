use hdreceive::storage::{AccountOrigin, AccountSource, AccountStore, CipherKey};
use hdreceive::wallet::{ChainKind, MarginManager};
use hdreceive::WalletConfig;
use std::env;

fn account_source() -> AccountSource {
    if let Ok(key) = env::var("HDRECEIVE_XPUB") {
        AccountSource::ExtendedKey(key)
    } else if let Ok(words) = env::var("HDRECEIVE_MNEMONIC") {
        AccountSource::Mnemonic(words)
    } else {
        AccountSource::Generate
    }
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    // RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match env::var("HDRECEIVE_CONFIG") {
        Ok(path) => WalletConfig::load(path)?,
        Err(_) => WalletConfig::from_env()?,
    };
    let cipher = match env::var("HDRECEIVE_CIPHER_KEY") {
        Ok(hex_key) => Some(
            CipherKey::from_hex(&hex_key)
                .ok_or_else(|| anyhow::anyhow!("HDRECEIVE_CIPHER_KEY must be 64 hex characters"))?,
        ),
        Err(_) => None,
    };

    let margins = MarginManager::new(config.gap_limit, config.max_safe_extend);
    let store = AccountStore::new(config, cipher);
    let mut opened = store.open_or_create(&account_source())?;

    if let Some(mnemonic) = &opened.mnemonic {
        println!("New seed phrase, write it down; it is not stored:");
        println!("  {}", mnemonic);
    }

    let report = margins.ensure_margins(&mut opened.account)?;
    if opened.origin == AccountOrigin::Loaded && report.overrun().is_some() {
        log::warn!("Chain grew past the safe limit; the next sync must rescan from the birthday");
    }
    store.save(&opened.account)?;

    let account = &opened.account;
    println!("Account:    {}", account.name());
    println!("Xpub:       {}", account.keychain().xpub());
    println!("Snapshot:   {}", store.persistence().path().display());
    println!(
        "Chains:     receive {}, change {}",
        account.chain(ChainKind::Receive).len(),
        account.chain(ChainKind::Change).len()
    );
    match account.next_receive_address() {
        Some(address) => println!("Receive to: {} ({})", address.address(), address.relative_path()),
        None => println!("Receive to: <none derived>"),
    }
    Ok(())
}
