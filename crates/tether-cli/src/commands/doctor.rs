//! Diagnostic command to check installation.

use tether_core::Config;
use tether_store::{SessionStore, SqliteSessionStore};

use crate::AppContext;

pub async fn run(ctx: &AppContext) -> anyhow::Result<()> {
    println!("Running diagnostics...\n");

    // Check config directory
    let config_dir = Config::config_dir();
    println!("Config directory: {:?}", config_dir);
    if config_dir.exists() {
        println!("  ✓ Exists");
    } else {
        println!("  ✗ Does not exist (will be created on first use)");
    }

    // Check data directory
    let data_dir = ctx.config.data_dir();
    println!("\nData directory: {:?}", data_dir);
    if data_dir.exists() {
        println!("  ✓ Exists");
    } else {
        println!("  ✗ Does not exist (will be created on first use)");
    }

    // Check configuration
    println!("\nConfiguration:");
    let result = ctx.config.validate();
    if result.is_ok() {
        println!("  ✓ Valid");
    } else {
        for error in result.errors() {
            println!("  ✗ {}: {}", error.field, error.message);
        }
    }
    for warning in result.warnings() {
        println!("  ! {}: {}", warning.field, warning.message);
    }

    // Check session store
    println!("\nSession store:");
    match SqliteSessionStore::new(&data_dir) {
        Ok(store) => {
            println!("  ✓ Opened {:?}", data_dir.join("sessions.db"));
            match store.list().await {
                Ok(records) => {
                    println!("  ✓ {} stored session(s)", records.len());
                    for record in &records {
                        let readiness = if record.is_ready { "ready" } else { "not ready" };
                        println!("    - {} ({})", record.client_id, readiness);
                    }
                }
                Err(e) => {
                    println!("  ✗ Failed to list sessions: {}", e);
                }
            }
        }
        Err(e) => {
            println!("  ✗ Failed to open store: {}", e);
        }
    }

    // Check scratch directory
    if let Some(ref scratch) = ctx.config.session.scratch_dir {
        println!("\nScratch directory: {:?}", scratch);
        if scratch.exists() {
            println!("  ! Exists (stale cache from a previous run, cleared on next startup)");
        } else {
            println!("  ✓ Clean");
        }
    }

    println!("\nDiagnostics complete.");
    Ok(())
}
