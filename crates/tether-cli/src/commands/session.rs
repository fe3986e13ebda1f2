//! Session inspection commands.

use chrono::{DateTime, Local, Utc};

use tether_core::SessionRecord;
use tether_store::{SessionStore, SqliteSessionStore, StoreError};

use crate::{AppContext, SessionAction};

/// Format a datetime for display.
fn format_time(dt: &DateTime<Utc>) -> String {
    let local: DateTime<Local> = dt.with_timezone(&Local);
    local.format("%Y-%m-%d %H:%M").to_string()
}

/// Format a stored record for display.
fn format_record(record: &SessionRecord, verbose: bool) -> String {
    let readiness = if record.is_ready { "ready" } else { "not ready" };
    let updated = format_time(&record.updated_at);

    if verbose {
        format!(
            "{} [{}] updated {} ({} credential keys, scan artifact: {})",
            record.client_id,
            readiness,
            updated,
            record.credential_blob.len(),
            if record.qr_artifact.is_some() {
                "yes"
            } else {
                "no"
            }
        )
    } else {
        format!("{} [{}] updated {}", record.client_id, readiness, updated)
    }
}

pub async fn handle(action: SessionAction, ctx: &AppContext) -> anyhow::Result<()> {
    // Open the session store
    let store = match SqliteSessionStore::new(ctx.config.data_dir()) {
        Ok(store) => store,
        Err(e) => {
            println!("Failed to open session store: {}", e);
            println!("The session database may not exist yet. Run the engine first.");
            return Ok(());
        }
    };

    match action {
        SessionAction::Status => {
            show_status(&store, &ctx.config.session.client_id).await?;
        }
        SessionAction::List => {
            list_sessions(&store).await?;
        }
        SessionAction::Qr => {
            show_qr(&store, &ctx.config.session.client_id).await?;
        }
        SessionAction::Logout { yes } => {
            logout(&store, &ctx.config.session.client_id, yes).await?;
        }
    }

    Ok(())
}

async fn show_status(store: &SqliteSessionStore, client_id: &str) -> anyhow::Result<()> {
    let record = match store.find_by_client_id(client_id).await? {
        Some(record) => record,
        None => {
            println!("No stored session for client: {}", client_id);
            return Ok(());
        }
    };

    println!("Session: {}", record.client_id);
    println!("================================================================================");
    println!();
    println!(
        "Ready:       {}",
        if record.is_ready { "yes" } else { "no" }
    );
    if let Some(ref at) = record.ready_at {
        println!("Ready At:    {}", format_time(at));
    }
    println!();
    println!("Created:     {}", format_time(&record.created_at));
    println!("Updated:     {}", format_time(&record.updated_at));
    if let Some(ref at) = record.last_qr_generated_at {
        println!("Last Scan:   {}", format_time(at));
    }
    println!();
    println!("Credential keys: {}", record.credential_blob.len());
    println!(
        "Scan artifact:   {}",
        if record.qr_artifact.is_some() {
            "stored"
        } else {
            "none"
        }
    );

    Ok(())
}

async fn list_sessions(store: &SqliteSessionStore) -> anyhow::Result<()> {
    let records = store.list().await?;

    if records.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("Sessions ({}):", records.len());
    println!();

    for record in &records {
        println!("{}", format_record(record, true));
    }

    println!();
    println!("Use 'tether session status' for details");

    Ok(())
}

async fn show_qr(store: &SqliteSessionStore, client_id: &str) -> anyhow::Result<()> {
    match store.find_by_client_id(client_id).await? {
        Some(record) => match record.qr_artifact {
            Some(artifact) => {
                println!("{}", artifact);
            }
            None => {
                println!("No scan artifact stored for client: {}", client_id);
            }
        },
        None => {
            println!("No stored session for client: {}", client_id);
        }
    }

    Ok(())
}

async fn logout(store: &SqliteSessionStore, client_id: &str, yes: bool) -> anyhow::Result<()> {
    if !yes {
        println!("This deletes the stored session for '{}'.", client_id);
        println!("The next startup will require a fresh scan. Pass --yes to confirm.");
        return Ok(());
    }

    match store.delete_by_client_id(client_id).await {
        Ok(()) => {
            println!("Deleted session: {}", client_id);
        }
        Err(StoreError::NotFound(_)) => {
            println!("No stored session for client: {}", client_id);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
