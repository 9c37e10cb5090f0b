use crate::api;
use crate::cli::actions::Action;
use crate::config::Settings;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { config, port } => {
            let settings = Settings::load(&config)?;
            let port = port.unwrap_or(settings.server.port);

            api::new(port, &settings).await?;
        }
    }

    Ok(())
}
