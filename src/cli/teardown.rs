use anyhow::Result;
use colored::Colorize;

use crate::config::settings::Settings;
use crate::docker::client::DockerClient;
use crate::docker::compose::ComposeStack;

/// Drop the compose project, removing orphaned containers.
pub async fn teardown() -> Result<()> {
    let settings = Settings::load()?;
    let stack = ComposeStack::discover(settings.resolved_stack_dir()?)?;

    DockerClient::connect().await?;

    println!("{} Dropping compose project...", "=>".blue().bold());

    if stack.down().run("Waiting for compose...").await? {
        println!("{} Compose project removed", "✓".green().bold());
    } else {
        println!(
            "{} There was an error dropping the compose project",
            "✗".red().bold()
        );
    }

    Ok(())
}
