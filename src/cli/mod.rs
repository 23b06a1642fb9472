pub mod launch;
pub mod teardown;

use std::env;
use std::process;
use std::str::FromStr;

use anyhow::Result;
use thiserror::Error;

use crate::docker::gpu;

pub const DEFAULT_WEBUI_PORT: u16 = 3000;
pub const DEFAULT_API_PORT: u16 = 8080;
pub const DEFAULT_GPU_COUNT: u32 = 1;

/// A single recognized command-line token.
///
/// The launcher grammar is deliberately tiny: every flag is one token, and
/// the parameterized flags carry their value inline as `--flag[key=value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    EnableGpu { count: Option<u32> },
    EnableApi { port: Option<u16> },
    Webui { port: Option<u16> },
    Build,
    Drop,
    Quiet,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Invalid value for {flag}: '{value}'")]
    InvalidValue { flag: String, value: String },
}

/// GPU support requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuOpts {
    pub count: u32,
}

/// API exposure requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiOpts {
    pub port: u16,
}

/// Options folded out of the argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub gpu: Option<GpuOpts>,
    pub api: Option<ApiOpts>,
    pub webui_port: u16,
    pub build: bool,
    pub drop: bool,
    pub quiet: bool,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            gpu: None,
            api: None,
            webui_port: DEFAULT_WEBUI_PORT,
            build: false,
            drop: false,
            quiet: false,
        }
    }
}

/// Outcome of a successful parse: either a set of launch options or an
/// immediate help request.
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    Run(Cli),
    Help,
}

impl Cli {
    /// Parse `std::env::args`, printing usage and exiting on `--help` or on
    /// a bad token.
    pub fn parse() -> Self {
        match Self::try_parse_from(env::args().skip(1)) {
            Ok(Parsed::Run(cli)) => cli,
            Ok(Parsed::Help) => {
                print!("{}", usage());
                process::exit(0);
            }
            Err(err) => {
                eprintln!("{err}");
                eprint!("{}", usage());
                process::exit(1);
            }
        }
    }

    /// Scan tokens left to right. Later occurrences of a flag overwrite
    /// earlier ones; `--help` short-circuits the scan.
    pub fn try_parse_from<I>(args: I) -> Result<Parsed, ParseError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut cli = Cli::default();

        for arg in args {
            match parse_flag(arg.as_ref())? {
                Flag::EnableGpu { count } => {
                    cli.gpu = Some(GpuOpts {
                        count: count.unwrap_or(DEFAULT_GPU_COUNT),
                    });
                }
                Flag::EnableApi { port } => {
                    cli.api = Some(ApiOpts {
                        port: port.unwrap_or(DEFAULT_API_PORT),
                    });
                }
                Flag::Webui { port } => {
                    cli.webui_port = port.unwrap_or(DEFAULT_WEBUI_PORT);
                }
                Flag::Build => cli.build = true,
                Flag::Drop => cli.drop = true,
                Flag::Quiet => cli.quiet = true,
                Flag::Help => return Ok(Parsed::Help),
            }
        }

        Ok(Parsed::Run(cli))
    }

    pub async fn execute(self) -> Result<()> {
        if self.drop {
            // Teardown ignores every other flag
            teardown::teardown().await
        } else {
            launch::launch(self).await
        }
    }
}

fn parse_flag(token: &str) -> Result<Flag, ParseError> {
    // Split off the bracket group so `--webui[port=8080]` matches `--webui`
    let (name, rest) = match token.find('[') {
        Some(idx) => (&token[..idx], &token[idx..]),
        None => (token, ""),
    };

    match name {
        "--enable-gpu" => return Ok(Flag::EnableGpu { count: bracket_number(name, rest)? }),
        "--enable-api" => return Ok(Flag::EnableApi { port: bracket_number(name, rest)? }),
        "--webui" => return Ok(Flag::Webui { port: bracket_number(name, rest)? }),
        _ => {}
    }

    match token {
        "--build" => Ok(Flag::Build),
        "--drop" => Ok(Flag::Drop),
        "-q" | "--quiet" => Ok(Flag::Quiet),
        "-h" | "--help" => Ok(Flag::Help),
        _ => Err(ParseError::UnknownOption(token.to_string())),
    }
}

/// Extract the value out of a `[key=value]` group. A missing or malformed
/// group (no `[`, `=`, or `]`) reads as no value at all.
fn bracket_value(rest: &str) -> Option<&str> {
    let open = rest.find('[')?;
    let eq = rest[open + 1..].find('=')? + open + 1;
    let close = rest[eq + 1..].find(']')? + eq + 1;
    Some(&rest[eq + 1..close])
}

fn bracket_number<T: FromStr>(flag: &str, rest: &str) -> Result<Option<T>, ParseError> {
    let value = match bracket_value(rest) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(None),
    };

    value.parse().map(Some).map_err(|_| ParseError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

/// Usage text, including a live probe of the host GPU so operators can see
/// what `--enable-gpu` would pick up.
pub fn usage() -> String {
    let driver = match gpu::detect() {
        Ok(driver) => driver.to_string(),
        Err(err) => err.to_string(),
    };

    format!(
        "Usage: stackup [OPTIONS]\n\
         \n\
         Start or drop the compose stack.\n\
         \n\
         Options:\n\
           --enable-gpu[count=COUNT]  Enable GPU support with the specified device count\n\
           --enable-api[port=PORT]    Expose the API service on the specified port\n\
           --webui[port=PORT]         Set the port for the web user interface (default {webui})\n\
           --build                    Build images before starting the compose project\n\
           --drop                     Drop the compose project\n\
           -q, --quiet                Run without the confirmation prompt\n\
           -h, --help                 Show this help message\n\
         \n\
         Detected GPU driver: {driver}\n",
        webui = DEFAULT_WEBUI_PORT,
        driver = driver,
    )
}
