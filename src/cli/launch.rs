use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;

use crate::config::settings::Settings;
use crate::docker::client::DockerClient;
use crate::docker::compose::{ComposeCommand, ComposeStack, GpuPlan, LaunchPlan};
use crate::docker::gpu;

use super::Cli;

/// Assemble and start the compose project.
pub async fn launch(cli: Cli) -> Result<()> {
    let settings = Settings::load()?;
    let plan = resolve_plan(&cli, &settings)?;

    let stack = ComposeStack::discover(settings.resolved_stack_dir()?)?;
    let command = stack.up(&plan)?;

    print_recap(&plan, &command);

    if !cli.quiet && !confirm()? {
        println!("Aborted.");
        return Ok(());
    }

    let client = DockerClient::connect().await?;
    if let Some(version) = client.server_version().await {
        tracing::debug!("Docker daemon version {}", version);
    }
    for (key, value) in command.envs() {
        tracing::debug!("Exporting {}={}", key, value);
    }

    println!("{} Starting compose project...", "=>".blue().bold());

    if command.run("Waiting for compose...").await? {
        println!(
            "{} Compose project started successfully",
            "✓".green().bold()
        );
        println!(
            "  Web UI: {}",
            format!("http://localhost:{}", plan.webui_port).cyan()
        );
    } else {
        println!(
            "{} There was an error starting the compose project",
            "✗".red().bold()
        );
    }

    Ok(())
}

/// Resolve the parsed flags plus ambient configuration into a launch plan.
/// GPU detection only runs when GPU support was actually requested, and an
/// undetectable driver aborts the launch before anything is assembled.
fn resolve_plan(cli: &Cli, settings: &Settings) -> Result<LaunchPlan> {
    let gpu = match &cli.gpu {
        Some(opts) => {
            let driver = gpu::detect()
                .context("GPU support was requested but no usable GPU was found")?;
            Some(GpuPlan {
                driver,
                count: opts.count,
            })
        }
        None => None,
    };

    Ok(LaunchPlan {
        webui_port: cli.webui_port,
        gpu,
        api_port: cli.api.map(|api| api.port),
        data_dir: settings.resolved_data_dir(),
        build: cli.build,
    })
}

fn print_recap(plan: &LaunchPlan, command: &ComposeCommand) {
    println!("{} Compose launch plan", "=>".blue().bold());
    for file in command.files() {
        println!("  {} Layer: {}", "•".yellow(), file.display());
    }
    println!("  {} Web UI port: {}", "•".yellow(), plan.webui_port);
    if let Some(gpu) = &plan.gpu {
        println!("  {} GPU: {} (count {})", "•".yellow(), gpu.driver, gpu.count);
    }
    if let Some(port) = plan.api_port {
        println!("  {} API port: {}", "•".yellow(), port);
    }
    if let Some(data_dir) = &plan.data_dir {
        println!("  {} Data directory: {}", "•".yellow(), data_dir.display());
    }
    if plan.build {
        println!("  {} Images will be rebuilt", "•".yellow());
    }
}

/// Single-keypress confirmation. Enter and `y` proceed, anything that
/// declines (including Esc) aborts.
fn confirm() -> Result<bool> {
    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Do you want to proceed?")
        .default(true)
        .interact_opt()
        .context("Failed to read the confirmation keypress")?;

    Ok(answer.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ApiOpts;

    fn quiet_cli() -> Cli {
        Cli {
            quiet: true,
            ..Cli::default()
        }
    }

    #[test]
    fn plan_without_gpu_skips_detection() {
        let cli = Cli {
            api: Some(ApiOpts { port: 11435 }),
            webui_port: 8080,
            ..quiet_cli()
        };
        let plan = resolve_plan(&cli, &Settings::default()).unwrap();

        assert_eq!(plan.webui_port, 8080);
        assert_eq!(plan.api_port, Some(11435));
        assert!(plan.gpu.is_none());
        assert!(!plan.build);
    }

    #[test]
    fn stored_data_dir_flows_into_the_plan() {
        let settings = Settings {
            stack_dir: None,
            data_dir: Some(std::path::PathBuf::from("/srv/stack-data")),
        };
        let plan = resolve_plan(&quiet_cli(), &settings).unwrap();
        assert_eq!(
            plan.data_dir,
            Some(std::path::PathBuf::from("/srv/stack-data"))
        );
    }
}
