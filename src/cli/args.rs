//! Command line argument parsing
//!
//! Subcommands:
//! - `run`: Create or reuse a container and print where to reach it
//! - `prune`: Remove every labeled container and image
//! - `remove`: Remove a container by exact name
//! - `show-config`: Show configuration discovery information

use super::config::RunDefaults;
use super::probe::http_readiness;
use crate::container::{Result as RunResult, RunRequest, options};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub enum ExecutionMode {
    Run(RunConfig),
    Prune(PruneConfig),
    Remove { name: String },
    ShowConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub repository: String,
    pub tag: Option<String>,
    pub name: Option<String>,
    pub env: Vec<String>,
    pub ports: Vec<u16>,
    /// (container port, host port)
    pub bindings: Vec<(u16, u16)>,
    pub reuse: bool,
    pub recreate_on_err: bool,
    pub remove_on_exists: bool,
    /// `Some(None)` disables expiry
    pub expiry: Option<Option<Duration>>,
    pub http_probe: Option<HttpProbe>,
    pub detach: bool,
    pub json: bool,
    pub cmd: Vec<String>,
}

impl RunConfig {
    /// Build the run request: configured defaults first, then the command line flags.
    ///
    /// `http` is only used when an HTTP probe was requested.
    pub fn to_request(&self, defaults: &RunDefaults, http: reqwest::Client) -> RunResult<RunRequest> {
        let mut opts = defaults.to_options();

        if let Some(tag) = &self.tag {
            opts.push(options::with_tag(tag.clone()));
        }
        if let Some(name) = &self.name {
            opts.push(options::with_name(name.clone()));
        }
        if !self.env.is_empty() {
            opts.push(options::with_env(self.env.clone()));
        }
        if !self.cmd.is_empty() {
            opts.push(options::with_cmd(self.cmd.clone()));
        }
        if !self.ports.is_empty() {
            opts.push(options::with_exposed_ports(self.ports.clone()));
        }
        for &(container_port, host_port) in &self.bindings {
            opts.push(options::with_port_binding(container_port, host_port));
        }
        if let Some(expiry) = self.expiry {
            opts.push(options::with_expiry(expiry));
        }
        opts.push(options::with_reuse(self.reuse, self.recreate_on_err));
        opts.push(options::with_remove_on_exists(self.remove_on_exists));

        if let Some(probe) = &self.http_probe {
            opts.push(http_readiness(probe.clone(), http));
        }

        RunRequest::apply(self.repository.clone(), opts)
    }
}

/// HTTP GET readiness check against a published port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProbe {
    pub port: u16,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PruneConfig {
    pub filters: Vec<(String, String)>,
    pub json: bool,
}

#[derive(Debug, Parser)]
#[command(name = "tcontainer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run, reuse and clean up short-lived containers for test suites")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a container, or reuse the one holding its name
    Run {
        /// Image repository
        repository: String,
        /// Image tag
        #[arg(short = 't', long = "tag")]
        tag: Option<String>,
        /// Container name
        #[arg(short = 'n', long = "name")]
        name: Option<String>,
        /// Environment variable as KEY=VALUE (can be used multiple times)
        #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
        /// Exposed TCP port (can be used multiple times)
        #[arg(short = 'p', long = "port")]
        ports: Vec<u16>,
        /// Port binding as CONTAINER:HOST (can be used multiple times)
        #[arg(short = 'b', long = "bind", value_name = "CONTAINER:HOST")]
        bindings: Vec<String>,
        /// Reuse an existing container with the same name
        #[arg(long = "reuse")]
        reuse: bool,
        /// Recreate the container when it cannot be reused
        #[arg(long = "recreate-on-err", requires = "reuse")]
        recreate_on_err: bool,
        /// Remove an existing container with the same name first
        #[arg(long = "remove-on-exists", conflicts_with = "reuse")]
        remove_on_exists: bool,
        /// Stop the container after this many seconds
        #[arg(long = "expiry", value_name = "SECONDS")]
        expiry: Option<u64>,
        /// Keep the container until it is removed
        #[arg(long = "no-expiry", conflicts_with = "expiry")]
        no_expiry: bool,
        /// Wait until GET PORT[/PATH] on the published port succeeds
        #[arg(long = "http-probe", value_name = "PORT[/PATH]")]
        http_probe: Option<String>,
        /// Exit right away instead of waiting for expiry or Ctrl-C and purging
        #[arg(short = 'd', long = "detach")]
        detach: bool,
        /// Print the container as JSON
        #[arg(long = "json")]
        json: bool,
        /// Command to run in the container
        #[arg(last = true)]
        cmd: Vec<String>,
    },
    /// Remove every labeled container and image
    Prune {
        /// Extra filter as KEY=VALUE, e.g. label=suite=db (can be used multiple times)
        #[arg(short = 'f', long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,
        /// Print the report as JSON
        #[arg(long = "json")]
        json: bool,
    },
    /// Remove a container by exact name
    Remove {
        /// Container name
        name: String,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Run {
                repository,
                tag,
                name,
                env,
                ports,
                bindings,
                reuse,
                recreate_on_err,
                remove_on_exists,
                expiry,
                no_expiry,
                http_probe,
                detach,
                json,
                cmd,
            }) => {
                let bindings = bindings
                    .iter()
                    .map(|b| Self::parse_binding(b))
                    .collect::<Result<Vec<_>, _>>()?;

                let expiry = match (expiry, no_expiry) {
                    (_, true) => Some(None),
                    (Some(secs), false) => Some(Some(Duration::from_secs(*secs))),
                    (None, false) => None,
                };

                Ok(ExecutionMode::Run(RunConfig {
                    repository: repository.clone(),
                    tag: tag.clone(),
                    name: name.clone(),
                    env: env.clone(),
                    ports: ports.clone(),
                    bindings,
                    reuse: *reuse,
                    recreate_on_err: *recreate_on_err,
                    remove_on_exists: *remove_on_exists,
                    expiry,
                    http_probe: http_probe.as_deref().map(Self::parse_probe).transpose()?,
                    detach: *detach,
                    json: *json,
                    cmd: cmd.clone(),
                }))
            }
            Some(Commands::Prune { filters, json }) => Ok(ExecutionMode::Prune(PruneConfig {
                filters: filters
                    .iter()
                    .map(|f| {
                        f.split_once('=')
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .ok_or_else(|| format!("Filter `{}` is not KEY=VALUE", f))
                    })
                    .collect::<Result<_, _>>()?,
                json: *json,
            })),
            Some(Commands::Remove { name }) => Ok(ExecutionMode::Remove { name: name.clone() }),
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => Err(
                "No command specified. Use 'tcontainer --help' to see available commands."
                    .to_string(),
            ),
        }
    }

    /// `CONTAINER:HOST`
    fn parse_binding(value: &str) -> Result<(u16, u16), String> {
        let (container, host) = value
            .split_once(':')
            .ok_or_else(|| format!("Binding `{}` is not CONTAINER:HOST", value))?;

        let parse = |port: &str| {
            port.parse::<u16>()
                .map_err(|e| format!("Invalid port `{}` in binding `{}`: {}", port, value, e))
        };

        Ok((parse(container)?, parse(host)?))
    }

    /// `PORT` or `PORT/PATH`
    fn parse_probe(value: &str) -> Result<HttpProbe, String> {
        let (port, path) = match value.split_once('/') {
            Some((port, path)) => (port, format!("/{}", path)),
            None => (value, "/".to_string()),
        };

        let port = port
            .parse::<u16>()
            .map_err(|e| format!("Invalid probe port `{}`: {}", port, e))?;

        Ok(HttpProbe { port, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(extra: &[&str]) -> Args {
        let mut argv = vec!["tcontainer", "run", "postgres"];
        argv.extend_from_slice(extra);
        <Args as Parser>::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_run_command() {
        let args = run_args(&[
            "-t",
            "16",
            "-n",
            "suite-db",
            "-e",
            "POSTGRES_PASSWORD=secret",
            "-p",
            "5432",
            "-b",
            "5432:15432",
            "--reuse",
            "--recreate-on-err",
            "--http-probe",
            "8080/health",
            "--",
            "postgres",
            "-c",
            "fsync=off",
        ]);

        let ExecutionMode::Run(config) = args.mode().unwrap() else {
            panic!("Expected Run mode");
        };

        assert_eq!(config.tag.as_deref(), Some("16"));
        assert_eq!(config.name.as_deref(), Some("suite-db"));
        assert_eq!(config.ports, vec![5432]);
        assert_eq!(config.bindings, vec![(5432, 15432)]);
        assert!(config.reuse && config.recreate_on_err);
        assert_eq!(
            config.http_probe,
            Some(HttpProbe {
                port: 8080,
                path: "/health".to_string()
            })
        );
        assert_eq!(config.cmd, vec!["postgres", "-c", "fsync=off"]);
        assert_eq!(config.expiry, None);
    }

    #[test]
    fn test_expiry_flags() {
        let ExecutionMode::Run(config) = run_args(&["--expiry", "5"]).mode().unwrap() else {
            panic!("Expected Run mode");
        };
        assert_eq!(config.expiry, Some(Some(Duration::from_secs(5))));

        let ExecutionMode::Run(config) = run_args(&["--no-expiry"]).mode().unwrap() else {
            panic!("Expected Run mode");
        };
        assert_eq!(config.expiry, Some(None));
    }

    #[test]
    fn test_reuse_conflicts_with_remove_on_exists() {
        let result = <Args as Parser>::try_parse_from([
            "tcontainer",
            "run",
            "redis",
            "--reuse",
            "--remove-on-exists",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_binding() {
        let args = run_args(&["-b", "5432"]);
        assert!(args.mode().unwrap_err().contains("CONTAINER:HOST"));

        let args = run_args(&["-b", "5432:99999"]);
        assert!(args.mode().is_err());
    }

    #[test]
    fn test_prune_filters() {
        let args = <Args as Parser>::try_parse_from([
            "tcontainer",
            "--config",
            "custom.toml",
            "prune",
            "-f",
            "label=suite=db",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
        let ExecutionMode::Prune(config) = args.mode().unwrap() else {
            panic!("Expected Prune mode");
        };
        assert_eq!(
            config.filters,
            vec![("label".to_string(), "suite=db".to_string())]
        );
    }

    #[test]
    fn test_flags_override_defaults() {
        let ExecutionMode::Run(config) = run_args(&[
            "-n",
            "suite-db",
            "-p",
            "5432",
            "-b",
            "5432:15432",
            "--no-expiry",
            "--http-probe",
            "5432",
        ])
        .mode()
        .unwrap() else {
            panic!("Expected Run mode");
        };

        let defaults = RunDefaults {
            expiry_secs: 30,
            ..Default::default()
        };
        let request = config
            .to_request(&defaults, reqwest::Client::new())
            .unwrap();

        assert_eq!(request.image(), "postgres:latest");
        assert_eq!(request.name.as_deref(), Some("suite-db"));
        assert_eq!(request.exposed_ports, vec!["5432/tcp".to_string()]);
        assert!(request.port_bindings.contains_key("5432/tcp"));
        assert_eq!(request.expiry, None);
        assert!(request.retry.probe.is_some());
        assert!(!request.reuse.enabled);
    }

    #[test]
    fn test_defaults_apply_without_flags() {
        let ExecutionMode::Run(config) = run_args(&[]).mode().unwrap() else {
            panic!("Expected Run mode");
        };

        let defaults = RunDefaults {
            expiry_secs: 30,
            ..Default::default()
        };
        let request = config
            .to_request(&defaults, reqwest::Client::new())
            .unwrap();

        assert_eq!(request.expiry, Some(Duration::from_secs(30)));
        assert!(request.retry.probe.is_none());
    }

    #[test]
    fn test_no_command() {
        let args = Args {
            config: None,
            command: None,
        };
        assert!(args.mode().is_err());
    }
}
