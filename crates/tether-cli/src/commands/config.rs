//! Configuration management commands.

use crate::{AppContext, ConfigAction};

pub async fn handle(action: ConfigAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(&ctx.config)?;
            println!("{}", rendered);
        }
        ConfigAction::Validate => {
            let result = ctx.config.validate();

            for error in result.errors() {
                println!("error: {}: {}", error.field, error.message);
            }
            for warning in result.warnings() {
                println!("warning: {}: {}", warning.field, warning.message);
            }

            if result.is_ok() {
                println!("Configuration is valid.");
            } else {
                anyhow::bail!("configuration validation failed");
            }
        }
    }
    Ok(())
}
