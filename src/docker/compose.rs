use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use super::gpu::GpuDriver;

/// Base compose file and the layers merged on top of it.
pub const BASE_FILE: &str = "docker-compose.yaml";
pub const GPU_FILE: &str = "docker-compose.gpu.yaml";
pub const API_FILE: &str = "docker-compose.api.yaml";
pub const DATA_FILE: &str = "docker-compose.data.yaml";

/// Everything the assembler needs to lay out an `up` invocation.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub webui_port: u16,
    pub gpu: Option<GpuPlan>,
    pub api_port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub build: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct GpuPlan {
    pub driver: GpuDriver,
    pub count: u32,
}

/// A compose project rooted at a directory, addressed through whichever
/// compose binary the host provides.
pub struct ComposeStack {
    dir: PathBuf,
    program: Vec<String>,
}

impl ComposeStack {
    /// Locate the compose binary and the project's base file.
    pub fn discover(dir: PathBuf) -> Result<Self> {
        let program = compose_program()?;

        if !dir.join(BASE_FILE).exists() {
            anyhow::bail!(
                "No {} found in {}. Run stackup from the stack directory or set stack_dir in settings.",
                BASE_FILE,
                dir.display()
            );
        }

        Ok(Self { dir, program })
    }

    #[cfg(test)]
    fn with_program(dir: PathBuf, program: Vec<String>) -> Self {
        Self { dir, program }
    }

    /// Assemble the `up` invocation for the given plan.
    ///
    /// Layer order is fixed: base, GPU, API, data. Every referenced layer
    /// must exist on disk before anything is executed.
    pub fn up(&self, plan: &LaunchPlan) -> Result<ComposeCommand> {
        let mut cmd = ComposeCommand::new(&self.program);

        cmd.file(self.dir.join(BASE_FILE));
        cmd.env("STACKUP_WEBUI_PORT", plan.webui_port.to_string());

        if let Some(gpu) = &plan.gpu {
            cmd.file(self.layer(GPU_FILE)?);
            cmd.env("STACKUP_GPU_DRIVER", gpu.driver.as_str());
            cmd.env("STACKUP_GPU_COUNT", gpu.count.to_string());
        }

        if let Some(port) = plan.api_port {
            cmd.file(self.layer(API_FILE)?);
            cmd.env("STACKUP_API_PORT", port.to_string());
        }

        if let Some(data_dir) = &plan.data_dir {
            cmd.file(self.layer(DATA_FILE)?);
            cmd.env("STACKUP_DATA_DIR", data_dir.display().to_string());
        }

        cmd.arg("up");
        cmd.arg("-d");
        cmd.arg("--remove-orphans");
        cmd.arg("--force-recreate");
        if plan.build {
            cmd.arg("--build");
        }

        Ok(cmd)
    }

    /// Assemble the teardown invocation. Orphaned containers are removed
    /// along with the project.
    pub fn down(&self) -> ComposeCommand {
        let mut cmd = ComposeCommand::new(&self.program);
        cmd.file(self.dir.join(BASE_FILE));
        cmd.arg("down");
        cmd.arg("--remove-orphans");
        cmd
    }

    fn layer(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        if !path.exists() {
            anyhow::bail!("Compose layer {} not found in {}", name, self.dir.display());
        }
        Ok(path)
    }
}

fn compose_program() -> Result<Vec<String>> {
    if which::which("docker").is_ok() {
        return Ok(vec!["docker".to_string(), "compose".to_string()]);
    }
    if which::which("docker-compose").is_ok() {
        return Ok(vec!["docker-compose".to_string()]);
    }
    anyhow::bail!("Neither 'docker' nor 'docker-compose' was found in PATH")
}

/// An assembled compose invocation: binary, layered files, child
/// environment, and trailing arguments.
pub struct ComposeCommand {
    program: Vec<String>,
    files: Vec<PathBuf>,
    env: Vec<(String, String)>,
    args: Vec<String>,
}

impl ComposeCommand {
    fn new(program: &[String]) -> Self {
        Self {
            program: program.to_vec(),
            files: Vec::new(),
            env: Vec::new(),
            args: Vec::new(),
        }
    }

    fn file(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    fn env(&mut self, key: &str, value: impl Into<String>) {
        self.env.push((key.to_string(), value.into()));
    }

    fn arg(&mut self, arg: &str) {
        self.args.push(arg.to_string());
    }

    /// Configuration files layered into this invocation, base first.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Variables exported to the compose child.
    pub fn envs(&self) -> &[(String, String)] {
        &self.env
    }

    /// Spawn the compose child, echo its output above a spinner, and wait
    /// for it. Returns whether the child exited successfully.
    pub async fn run(&self, message: &str) -> Result<bool> {
        tracing::debug!("Running: {}", self);

        let mut child = self
            .build_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program.join(" ")))?;

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        let mut forwards = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            forwards.push(tokio::spawn(forward_lines(stdout, spinner.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            forwards.push(tokio::spawn(forward_lines(stderr, spinner.clone())));
        }

        let status = child
            .wait()
            .await
            .context("Failed to wait for the compose process")?;

        for forward in forwards {
            forward.await.ok();
        }
        spinner.finish_and_clear();

        Ok(status.success())
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program[0]);
        cmd.args(&self.program[1..]);
        for file in &self.files {
            cmd.arg("-f").arg(file);
        }
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.program.clone();
        for file in &self.files {
            parts.push("-f".to_string());
            parts.push(file.display().to_string());
        }
        parts.extend(self.args.iter().cloned());
        f.write_str(&parts.join(" "))
    }
}

async fn forward_lines<R>(reader: R, spinner: ProgressBar)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        spinner.println(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::gpu::GpuDriver;

    fn stack_with(files: &[&str]) -> (tempfile::TempDir, ComposeStack) {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            std::fs::write(dir.path().join(name), "services: {}\n").unwrap();
        }
        let stack = ComposeStack::with_program(
            dir.path().to_path_buf(),
            vec!["docker".to_string(), "compose".to_string()],
        );
        (dir, stack)
    }

    fn plan() -> LaunchPlan {
        LaunchPlan {
            webui_port: 3000,
            gpu: None,
            api_port: None,
            data_dir: None,
            build: false,
        }
    }

    fn has_env(cmd: &ComposeCommand, key: &str, value: &str) -> bool {
        cmd.envs().iter().any(|(k, v)| k == key && v == value)
    }

    #[test]
    fn base_only_plan_layers_one_file() {
        let (_dir, stack) = stack_with(&[BASE_FILE]);
        let cmd = stack.up(&plan()).unwrap();

        assert_eq!(cmd.files().len(), 1);
        assert!(cmd.files()[0].ends_with(BASE_FILE));
        assert!(has_env(&cmd, "STACKUP_WEBUI_PORT", "3000"));
        assert!(cmd.to_string().ends_with("up -d --remove-orphans --force-recreate"));
    }

    #[test]
    fn api_request_layers_api_file_and_port() {
        let (_dir, stack) = stack_with(&[BASE_FILE, API_FILE]);
        let cmd = stack
            .up(&LaunchPlan {
                api_port: Some(11435),
                ..plan()
            })
            .unwrap();

        assert!(cmd.files().iter().any(|f| f.ends_with(API_FILE)));
        assert!(has_env(&cmd, "STACKUP_API_PORT", "11435"));
    }

    #[test]
    fn gpu_request_exports_driver_and_count() {
        let (_dir, stack) = stack_with(&[BASE_FILE, GPU_FILE]);
        let cmd = stack
            .up(&LaunchPlan {
                gpu: Some(GpuPlan {
                    driver: GpuDriver::Nvidia,
                    count: 2,
                }),
                ..plan()
            })
            .unwrap();

        assert!(cmd.files().iter().any(|f| f.ends_with(GPU_FILE)));
        assert!(has_env(&cmd, "STACKUP_GPU_DRIVER", "nvidia"));
        assert!(has_env(&cmd, "STACKUP_GPU_COUNT", "2"));
    }

    #[test]
    fn api_layer_leaves_gpu_layering_untouched() {
        let (_dir, stack) = stack_with(&[BASE_FILE, API_FILE, GPU_FILE]);
        let cmd = stack
            .up(&LaunchPlan {
                api_port: Some(11435),
                gpu: Some(GpuPlan {
                    driver: GpuDriver::Nvidia,
                    count: 1,
                }),
                ..plan()
            })
            .unwrap();

        let names: Vec<_> = cmd
            .files()
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![BASE_FILE, GPU_FILE, API_FILE]);
    }

    #[test]
    fn data_dir_layers_data_file() {
        let (_dir, stack) = stack_with(&[BASE_FILE, DATA_FILE]);
        let cmd = stack
            .up(&LaunchPlan {
                data_dir: Some(PathBuf::from("/srv/stack-data")),
                ..plan()
            })
            .unwrap();

        assert!(cmd.files().iter().any(|f| f.ends_with(DATA_FILE)));
        assert!(has_env(&cmd, "STACKUP_DATA_DIR", "/srv/stack-data"));
    }

    #[test]
    fn missing_layer_file_is_an_error() {
        let (_dir, stack) = stack_with(&[BASE_FILE]);
        let result = stack.up(&LaunchPlan {
            api_port: Some(8080),
            ..plan()
        });
        assert!(result.is_err());
    }

    #[test]
    fn build_flag_appends_build() {
        let (_dir, stack) = stack_with(&[BASE_FILE]);
        let cmd = stack
            .up(&LaunchPlan {
                build: true,
                ..plan()
            })
            .unwrap();
        assert!(cmd.to_string().ends_with("--build"));
    }

    #[test]
    fn down_takes_no_plan_and_removes_orphans() {
        let (_dir, stack) = stack_with(&[BASE_FILE]);
        let cmd = stack.down();

        assert_eq!(cmd.files().len(), 1);
        assert!(cmd.to_string().ends_with("down --remove-orphans"));
    }
}
