//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `recipebox_core` linkage and the configured database.
//! - Keep output deterministic for quick local sanity checks.

use recipebox_core::{init_from_config, Store, StoreConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("recipebox_core ping={}", recipebox_core::ping());
    println!("recipebox_core version={}", recipebox_core::core_version());

    match probe() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("recipebox probe failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn probe() -> Result<(), Box<dyn std::error::Error>> {
    let config = StoreConfig::from_env()?;
    init_from_config(&config)?;
    println!("recipebox db_path={}", config.db_path.display());

    let store = Store::open(&config)?;
    let session = store.restore_session()?;
    store.refresh_recipes()?;
    store.refresh_users()?;

    println!("recipebox recipes={}", store.recipes().len());
    println!("recipebox users={}", store.users().len());
    println!(
        "recipebox signed_in={}",
        session.current_user_id().unwrap_or("-")
    );
    Ok(())
}
