use dotenvy::dotenv;
use log::info;
use std::env;

use rcoin::{Address, Ledger, LedgerConfig, Result, Transaction};

/// Demo key; override with LEDGER_DEMO_KEY.
const DEMO_KEY: &str = "7ece54aaf2cb68d23dbc7f62961b4e76212560290a1cdefbf25f323c880a2c04";

fn main() -> Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = LedgerConfig::from_env()?;
    let mut ledger = Ledger::new(config)?;

    let key_hex = env::var("LEDGER_DEMO_KEY").unwrap_or_else(|_| DEMO_KEY.to_string());
    let key = ledger.engine().parse_secret_key(&key_hex)?;
    let me = ledger.engine().address_of(&key);
    info!("wallet address {me}");

    println!("⛏️ Mining block 1...");
    ledger.mine(&me)?;
    println!("Your balance is: {}", ledger.balance_of(&me));

    println!("⛏️ Mining block 2...");
    ledger.mine(&me)?;
    println!("Your balance is: {}", ledger.balance_of(&me));

    let mut tx = Transaction::new(me.clone(), Address::new("jeff"), 10);
    tx.sign(ledger.engine(), &key)?;
    ledger.submit_transaction(tx)?;

    println!("⛏️ Mining block 3...");
    ledger.mine(&me)?;
    println!("Your balance is: {}", ledger.balance_of(&me));
    println!("Chain valid: {}", ledger.is_valid());

    println!("{}", ledger.to_json()?);
    Ok(())
}
