//! Run requests.
//!
//! A [`RunRequest`] starts from fixed defaults and is changed by an ordered list of
//! [`RunOption`] mutators; the last option touching a field wins. [`RunRequestBuilder`]
//! is a fluent front end that collects the same options.

use crate::container::backoff::{ExponentialBackoff, RetryError};
use crate::container::compat::{ConfigCheck, default_config_check};
use crate::container::{ContainerError, ContainerHandle, PortBinding, Result};
use crate::env::{OWNERSHIP_LABEL, defaults};
use bollard::models::HostConfig;
use futures::future::BoxFuture;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("container name pattern is valid")
});

/// Ordered mutation applied to a [`RunRequest`] while it is built.
pub type RunOption = Box<dyn FnOnce(&mut RunRequest) -> Result<()> + Send>;

/// Caller-supplied readiness check, polled under [`RetryOptions::backoff`].
///
/// Return [`RetryError::Transient`] while the service is still starting and
/// [`RetryError::Permanent`] when waiting cannot help.
pub type ReadinessProbe = Arc<
    dyn Fn(ContainerHandle) -> BoxFuture<'static, std::result::Result<(), RetryError>>
        + Send
        + Sync,
>;

/// What to do when a container with the requested name already exists.
#[derive(Clone)]
pub struct ReuseOptions {
    /// Reuse the existing container when possible
    pub enabled: bool,
    /// Remove and recreate the container when reuse fails
    pub recreate_on_err: bool,
    /// Schedule for waiting on a recovering container
    pub backoff: ExponentialBackoff,
    /// Predicates the existing container must pass, in order
    pub config_checks: Vec<ConfigCheck>,
}

impl Default for ReuseOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            recreate_on_err: false,
            backoff: ExponentialBackoff::reuse_default(),
            config_checks: vec![default_config_check()],
        }
    }
}

impl fmt::Debug for ReuseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReuseOptions")
            .field("enabled", &self.enabled)
            .field("recreate_on_err", &self.recreate_on_err)
            .field("backoff", &self.backoff)
            .field("config_checks", &self.config_checks.len())
            .finish()
    }
}

/// Readiness probing after the container is up.
#[derive(Clone, Default)]
pub struct RetryOptions {
    /// Probe to run, if any
    pub probe: Option<ReadinessProbe>,
    /// Probe schedule
    pub backoff: ExponentialBackoff,
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("probe", &self.probe.is_some())
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// Everything needed to create, reuse and probe one container.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Image repository, e.g. `postgres`
    pub repository: String,
    /// Image tag
    pub tag: String,
    /// Container name; the daemon picks one when unset
    pub name: Option<String>,
    /// Environment as `KEY=VALUE`
    pub env: Vec<String>,
    /// Command override
    pub cmd: Option<Vec<String>>,
    /// Entrypoint override
    pub entrypoint: Option<Vec<String>>,
    /// Working directory
    pub working_dir: Option<String>,
    /// User to run as
    pub user: Option<String>,
    /// Container hostname
    pub hostname: Option<String>,
    /// Exposed ports as `<port>/tcp`
    pub exposed_ports: Vec<String>,
    /// Host bindings by container port
    pub port_bindings: HashMap<String, Vec<PortBinding>>,
    /// Extra host configuration passed to the daemon as is
    pub host_config: HostConfig,
    /// Container labels, always including the ownership label
    pub labels: HashMap<String, String>,
    /// Let the daemon remove the container once it stops
    pub auto_remove: bool,
    /// Stop the container after this long.
    ///
    /// With [`ContainerClient`](crate::container::ContainerClient) the timer runs on a
    /// background thread owned by the client, so it still fires after the runtime that
    /// called `run` has shut down. It does not survive the process.
    pub expiry: Option<Duration>,
    /// Readiness probing
    pub retry: RetryOptions,
    /// Behavior on name collisions
    pub reuse: ReuseOptions,
    /// Remove a colliding container and create a new one
    pub remove_on_exists: bool,
}

impl RunRequest {
    fn baseline(repository: String) -> Self {
        Self {
            repository,
            tag: defaults::IMAGE_TAG.to_string(),
            name: None,
            env: Vec::new(),
            cmd: None,
            entrypoint: None,
            working_dir: None,
            user: None,
            hostname: None,
            exposed_ports: Vec::new(),
            port_bindings: HashMap::new(),
            host_config: HostConfig::default(),
            labels: HashMap::from([(OWNERSHIP_LABEL.to_string(), OWNERSHIP_LABEL.to_string())]),
            auto_remove: defaults::AUTO_REMOVE,
            expiry: Some(defaults::CONTAINER_EXPIRY),
            retry: RetryOptions::default(),
            reuse: ReuseOptions::default(),
            remove_on_exists: false,
        }
    }

    /// Build a request for `repository` by applying `options` in order.
    ///
    /// # Errors
    ///
    /// Returns the first option error ([`ContainerError::InvalidOption`]), or
    /// [`ContainerError::OptionConflict`] when reuse and remove-on-exists are both set.
    pub fn apply<S, I>(repository: S, options: I) -> Result<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = RunOption>,
    {
        let mut request = Self::baseline(repository.into());
        for option in options {
            option(&mut request)?;
        }
        request.validate()?;
        request
            .labels
            .insert(OWNERSHIP_LABEL.to_string(), OWNERSHIP_LABEL.to_string());
        Ok(request)
    }

    /// Start a fluent builder for `repository`.
    pub fn builder<S: Into<String>>(repository: S) -> RunRequestBuilder {
        RunRequestBuilder::new(repository)
    }

    /// Image reference as `repository:tag`.
    pub fn image(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Check the rules that span several fields.
    ///
    /// [`ContainerOrchestrator::run`](crate::container::ContainerOrchestrator::run) checks
    /// again, since the fields stay public after the request is built.
    ///
    /// # Errors
    ///
    /// [`ContainerError::InvalidOption`] for an empty repository,
    /// [`ContainerError::OptionConflict`] when reuse and remove-on-exists are both set.
    pub fn validate(&self) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(ContainerError::InvalidOption(
                "repository must not be empty".to_string(),
            ));
        }

        if self.reuse.enabled && self.remove_on_exists {
            return Err(ContainerError::OptionConflict(
                "reuse and remove-on-exists cannot be used together".to_string(),
            ));
        }

        Ok(())
    }
}

/// Option constructors, one per configurable field.
pub mod options {
    use super::*;

    fn invalid<T>(message: String) -> Result<T> {
        Err(ContainerError::InvalidOption(message))
    }

    fn check_env_entry(entry: &str) -> Result<()> {
        match entry.split_once('=') {
            Some((key, _)) if !key.is_empty() => Ok(()),
            _ => invalid(format!("env entry `{}` is not KEY=VALUE", entry)),
        }
    }

    fn port_key(port: u16) -> Result<String> {
        if port == 0 {
            return invalid("port must be between 1 and 65535".to_string());
        }
        Ok(format!("{}/tcp", port))
    }

    /// Image tag.
    pub fn with_tag<S: Into<String>>(tag: S) -> RunOption {
        let tag = tag.into();
        Box::new(move |request| {
            if tag.trim().is_empty() {
                return invalid("tag must not be empty".to_string());
            }
            request.tag = tag;
            Ok(())
        })
    }

    /// Container name, `[a-zA-Z0-9][a-zA-Z0-9_.-]*`.
    pub fn with_name<S: Into<String>>(name: S) -> RunOption {
        let name = name.into();
        Box::new(move |request| {
            if !NAME_PATTERN.is_match(&name) {
                return invalid(format!(
                    "container name `{}` must match [a-zA-Z0-9][a-zA-Z0-9_.-]*",
                    name
                ));
            }
            request.name = Some(name);
            Ok(())
        })
    }

    /// Environment, each entry as `KEY=VALUE`. Replaces earlier entries.
    pub fn with_env<I, S>(env: I) -> RunOption
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let env: Vec<String> = env.into_iter().map(Into::into).collect();
        Box::new(move |request| {
            for entry in &env {
                check_env_entry(entry)?;
            }
            request.env = env;
            Ok(())
        })
    }

    /// Append one `key=value` entry to the environment.
    pub fn with_env_var<K: Into<String>, V: Into<String>>(key: K, value: V) -> RunOption {
        let entry = format!("{}={}", key.into(), value.into());
        Box::new(move |request| {
            check_env_entry(&entry)?;
            request.env.push(entry);
            Ok(())
        })
    }

    /// Command override.
    pub fn with_cmd<I, S>(cmd: I) -> RunOption
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cmd: Vec<String> = cmd.into_iter().map(Into::into).collect();
        Box::new(move |request| {
            request.cmd = Some(cmd);
            Ok(())
        })
    }

    /// Entrypoint override.
    pub fn with_entrypoint<I, S>(entrypoint: I) -> RunOption
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entrypoint: Vec<String> = entrypoint.into_iter().map(Into::into).collect();
        Box::new(move |request| {
            request.entrypoint = Some(entrypoint);
            Ok(())
        })
    }

    pub fn with_working_dir<S: Into<String>>(dir: S) -> RunOption {
        let dir = dir.into();
        Box::new(move |request| {
            request.working_dir = Some(dir);
            Ok(())
        })
    }

    pub fn with_user<S: Into<String>>(user: S) -> RunOption {
        let user = user.into();
        Box::new(move |request| {
            request.user = Some(user);
            Ok(())
        })
    }

    pub fn with_hostname<S: Into<String>>(hostname: S) -> RunOption {
        let hostname = hostname.into();
        Box::new(move |request| {
            request.hostname = Some(hostname);
            Ok(())
        })
    }

    /// Exposed TCP ports. Replaces earlier ports.
    pub fn with_exposed_ports<I: IntoIterator<Item = u16>>(ports: I) -> RunOption {
        let ports: Vec<u16> = ports.into_iter().collect();
        Box::new(move |request| {
            request.exposed_ports = ports
                .into_iter()
                .map(port_key)
                .collect::<Result<Vec<_>>>()?;
            Ok(())
        })
    }

    /// Bind `container_port` to `host_port` on all interfaces, in addition to earlier
    /// bindings.
    pub fn with_port_binding(container_port: u16, host_port: u16) -> RunOption {
        Box::new(move |request| {
            let key = port_key(container_port)?;
            if host_port == 0 {
                return invalid("host port must be between 1 and 65535".to_string());
            }
            let bindings = request.port_bindings.entry(key).or_default();
            let binding = PortBinding::any_interface(host_port);
            if !bindings.contains(&binding) {
                bindings.push(binding);
            }
            Ok(())
        })
    }

    /// Full binding map. Replaces earlier bindings.
    pub fn with_port_bindings(bindings: HashMap<String, Vec<PortBinding>>) -> RunOption {
        Box::new(move |request| {
            request.port_bindings = bindings;
            Ok(())
        })
    }

    /// Host configuration passed to the daemon. Replaces earlier host configuration.
    pub fn with_host_config(host_config: HostConfig) -> RunOption {
        Box::new(move |request| {
            request.host_config = host_config;
            Ok(())
        })
    }

    /// Adjust the host configuration in place.
    pub fn with_host_config_fn<F>(f: F) -> RunOption
    where
        F: FnOnce(&mut HostConfig) + Send + 'static,
    {
        Box::new(move |request| {
            f(&mut request.host_config);
            Ok(())
        })
    }

    /// Stop the container after `expiry`; `None` keeps it until purged.
    ///
    /// The timer lives until it fires or the process exits, see [`RunRequest::expiry`].
    pub fn with_expiry(expiry: Option<Duration>) -> RunOption {
        Box::new(move |request| {
            if expiry.is_some_and(|e| e.is_zero()) {
                return invalid("expiry must be positive".to_string());
            }
            request.expiry = expiry;
            Ok(())
        })
    }

    pub fn with_auto_remove(auto_remove: bool) -> RunOption {
        Box::new(move |request| {
            request.auto_remove = auto_remove;
            Ok(())
        })
    }

    /// Reuse a container that already has the requested name.
    pub fn with_reuse(enabled: bool, recreate_on_err: bool) -> RunOption {
        Box::new(move |request| {
            request.reuse.enabled = enabled;
            request.reuse.recreate_on_err = recreate_on_err;
            Ok(())
        })
    }

    pub fn with_reuse_backoff(backoff: ExponentialBackoff) -> RunOption {
        Box::new(move |request| {
            request.reuse.backoff = backoff;
            Ok(())
        })
    }

    /// Append a reuse compatibility check.
    pub fn with_reuse_config_check(check: ConfigCheck) -> RunOption {
        Box::new(move |request| {
            request.reuse.config_checks.push(check);
            Ok(())
        })
    }

    /// Replace the reuse compatibility checks, dropping the default one.
    pub fn with_reuse_config_checks(checks: Vec<ConfigCheck>) -> RunOption {
        Box::new(move |request| {
            request.reuse.config_checks = checks;
            Ok(())
        })
    }

    pub fn with_remove_on_exists(remove_on_exists: bool) -> RunOption {
        Box::new(move |request| {
            request.remove_on_exists = remove_on_exists;
            Ok(())
        })
    }

    /// Readiness probe run after the container is up.
    pub fn with_readiness_probe<F, Fut>(probe: F) -> RunOption
    where
        F: Fn(ContainerHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), RetryError>> + Send + 'static,
    {
        let probe: ReadinessProbe = Arc::new(
            move |handle| -> BoxFuture<'static, std::result::Result<(), RetryError>> {
                Box::pin(probe(handle))
            },
        );
        Box::new(move |request| {
            request.retry.probe = Some(probe);
            Ok(())
        })
    }

    pub fn with_probe_backoff(backoff: ExponentialBackoff) -> RunOption {
        Box::new(move |request| {
            request.retry.backoff = backoff;
            Ok(())
        })
    }

    /// Extra label. The ownership label cannot be overridden.
    pub fn with_label<K: Into<String>, V: Into<String>>(key: K, value: V) -> RunOption {
        let key = key.into();
        let value = value.into();
        Box::new(move |request| {
            if key.is_empty() {
                return invalid("label key must not be empty".to_string());
            }
            request.labels.insert(key, value);
            Ok(())
        })
    }
}

/// Fluent builder collecting [`RunOption`]s.
///
/// Validation happens in [`build`](Self::build), so setters never fail.
pub struct RunRequestBuilder {
    repository: String,
    options: Vec<RunOption>,
}

impl RunRequestBuilder {
    /// Create a builder for `repository`.
    pub fn new<S: Into<String>>(repository: S) -> Self {
        Self {
            repository: repository.into(),
            options: Vec::new(),
        }
    }

    /// Append a raw option.
    pub fn option(mut self, option: RunOption) -> Self {
        self.options.push(option);
        self
    }

    /// Set the image tag.
    pub fn tag<S: Into<String>>(self, tag: S) -> Self {
        self.option(options::with_tag(tag))
    }

    /// Set the container name.
    pub fn name<S: Into<String>>(self, name: S) -> Self {
        self.option(options::with_name(name))
    }

    /// Add an environment variable.
    pub fn env<K: Into<String>, V: Into<String>>(self, key: K, value: V) -> Self {
        self.option(options::with_env_var(key, value))
    }

    /// Add multiple environment variables.
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in envs {
            self = self.env(k, v);
        }
        self
    }

    /// Set the command to run in the container.
    pub fn cmd<I, S>(self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.option(options::with_cmd(cmd))
    }

    /// Set the entrypoint for the container.
    pub fn entrypoint<I, S>(self, entrypoint: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.option(options::with_entrypoint(entrypoint))
    }

    /// Set the working directory in the container.
    pub fn working_dir<S: Into<String>>(self, dir: S) -> Self {
        self.option(options::with_working_dir(dir))
    }

    /// Set user to run as in the container.
    pub fn user<S: Into<String>>(self, user: S) -> Self {
        self.option(options::with_user(user))
    }

    pub fn hostname<S: Into<String>>(self, hostname: S) -> Self {
        self.option(options::with_hostname(hostname))
    }

    /// Expose TCP ports.
    pub fn exposed_ports<I: IntoIterator<Item = u16>>(self, ports: I) -> Self {
        self.option(options::with_exposed_ports(ports))
    }

    /// Add a port binding (container port -> host port on all interfaces).
    pub fn port_binding(self, container_port: u16, host_port: u16) -> Self {
        self.option(options::with_port_binding(container_port, host_port))
    }

    /// Set memory limit in bytes.
    pub fn memory_limit(self, bytes: i64) -> Self {
        self.option(options::with_host_config_fn(move |hc| hc.memory = Some(bytes)))
    }

    /// Set CPU quota in microseconds per period.
    pub fn cpu_quota(self, quota: i64) -> Self {
        self.option(options::with_host_config_fn(move |hc| hc.cpu_quota = Some(quota)))
    }

    /// Add a volume bind mount (host_path:container_path[:mode]).
    pub fn bind<S: Into<String>>(self, bind: S) -> Self {
        let bind = bind.into();
        self.option(options::with_host_config_fn(move |hc| {
            hc.binds.get_or_insert_with(Vec::new).push(bind)
        }))
    }

    /// Set network mode (e.g., "bridge", "host", "none").
    pub fn network_mode<S: Into<String>>(self, mode: S) -> Self {
        let mode = mode.into();
        self.option(options::with_host_config_fn(move |hc| {
            hc.network_mode = Some(mode)
        }))
    }

    pub fn host_config(self, host_config: HostConfig) -> Self {
        self.option(options::with_host_config(host_config))
    }

    /// Add a label to the container.
    pub fn label<K: Into<String>, V: Into<String>>(self, key: K, value: V) -> Self {
        self.option(options::with_label(key, value))
    }

    /// Enable auto-removal of container on stop.
    pub fn auto_remove(self, enable: bool) -> Self {
        self.option(options::with_auto_remove(enable))
    }

    /// Stop the container after `expiry`. The timer does not outlive the process.
    pub fn expiry(self, expiry: Duration) -> Self {
        self.option(options::with_expiry(Some(expiry)))
    }

    /// Keep the container until it is purged.
    pub fn no_expiry(self) -> Self {
        self.option(options::with_expiry(None))
    }

    /// Reuse an existing container with the same name.
    pub fn reuse(self, enabled: bool, recreate_on_err: bool) -> Self {
        self.option(options::with_reuse(enabled, recreate_on_err))
    }

    pub fn reuse_backoff(self, backoff: ExponentialBackoff) -> Self {
        self.option(options::with_reuse_backoff(backoff))
    }

    pub fn reuse_config_check(self, check: ConfigCheck) -> Self {
        self.option(options::with_reuse_config_check(check))
    }

    /// Remove an existing container with the same name before creating.
    pub fn remove_on_exists(self, enable: bool) -> Self {
        self.option(options::with_remove_on_exists(enable))
    }

    /// Probe the container until it is ready.
    pub fn readiness_probe<F, Fut>(self, probe: F) -> Self
    where
        F: Fn(ContainerHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), RetryError>> + Send + 'static,
    {
        self.option(options::with_readiness_probe(probe))
    }

    pub fn probe_backoff(self, backoff: ExponentialBackoff) -> Self {
        self.option(options::with_probe_backoff(backoff))
    }

    /// Apply every option and validate the result.
    ///
    /// # Errors
    ///
    /// See [`RunRequest::apply`].
    pub fn build(self) -> Result<RunRequest> {
        RunRequest::apply(self.repository, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ErrorKind;

    #[test]
    fn test_defaults() {
        let request = RunRequest::builder("redis").build().unwrap();

        assert_eq!(request.image(), "redis:latest");
        assert_eq!(request.expiry, Some(Duration::from_secs(60)));
        assert!(request.auto_remove);
        assert!(!request.reuse.enabled);
        assert!(!request.reuse.recreate_on_err);
        assert!(!request.remove_on_exists);
        assert_eq!(request.reuse.config_checks.len(), 1);
        assert_eq!(request.reuse.backoff.max_interval, Duration::from_secs(1));
        assert_eq!(
            request.reuse.backoff.max_elapsed_time,
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            request.retry.backoff.initial_interval,
            Duration::from_millis(500)
        );
        assert_eq!(
            request.labels.get(OWNERSHIP_LABEL).map(String::as_str),
            Some(OWNERSHIP_LABEL)
        );
    }

    #[test]
    fn test_last_option_wins() {
        let request = RunRequest::apply(
            "postgres",
            [
                options::with_tag("15"),
                options::with_exposed_ports([5432, 5433]),
                options::with_tag("16"),
                options::with_exposed_ports([5432]),
            ],
        )
        .unwrap();

        assert_eq!(request.image(), "postgres:16");
        assert_eq!(request.exposed_ports, vec!["5432/tcp".to_string()]);
    }

    #[test]
    fn test_environment_variables() {
        let request = RunRequest::builder("ubuntu")
            .env("FOO", "bar")
            .env("BAZ", "qux")
            .build()
            .unwrap();

        assert!(request.env.contains(&"FOO=bar".to_string()));
        assert!(request.env.contains(&"BAZ=qux".to_string()));
    }

    #[test]
    fn test_invalid_env_entry() {
        let err = RunRequest::apply("ubuntu", [options::with_env(["NOVALUE"])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOption);
    }

    #[test]
    fn test_builder_env_requires_a_key() {
        let err = RunRequest::builder("ubuntu").env("", "x").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOption);

        let err = RunRequest::apply("ubuntu", [options::with_env(["=x"])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOption);

        // Values may contain '=' and may be empty.
        let request = RunRequest::builder("ubuntu")
            .env("OPTS", "a=b")
            .env("EMPTY", "")
            .build()
            .unwrap();
        assert_eq!(request.env, vec!["OPTS=a=b".to_string(), "EMPTY=".to_string()]);
    }

    #[test]
    fn test_validate_after_build() {
        let mut request = RunRequest::builder("redis").reuse(true, false).build().unwrap();
        assert!(request.validate().is_ok());

        request.remove_on_exists = true;
        assert_eq!(request.validate().unwrap_err().kind(), ErrorKind::OptionConflict);
    }

    #[test]
    fn test_name_validation() {
        assert!(RunRequest::builder("redis").name("suite_redis-1.0").build().is_ok());

        for bad in ["", "-redis", "my redis", "redis/1"] {
            let err = RunRequest::builder("redis").name(bad).build().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidOption, "name {bad:?}");
        }
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            RunRequest::builder("redis").tag("").build(),
            RunRequest::builder("").build(),
            RunRequest::builder("redis").exposed_ports([0]).build(),
            RunRequest::builder("redis").port_binding(6379, 0).build(),
            RunRequest::builder("redis").expiry(Duration::ZERO).build(),
        ];

        for result in cases {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidOption);
        }
    }

    #[test]
    fn test_reuse_conflicts_with_remove_on_exists() {
        let err = RunRequest::builder("redis")
            .reuse(true, false)
            .remove_on_exists(true)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OptionConflict);

        // Turning one of them off again is fine.
        assert!(
            RunRequest::builder("redis")
                .reuse(true, false)
                .remove_on_exists(true)
                .reuse(false, false)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_ownership_label_is_enforced() {
        let request = RunRequest::builder("redis")
            .label(OWNERSHIP_LABEL, "someone-else")
            .label("suite", "integration")
            .build()
            .unwrap();

        assert_eq!(request.labels[OWNERSHIP_LABEL], OWNERSHIP_LABEL);
        assert_eq!(request.labels["suite"], "integration");
    }

    #[test]
    fn test_port_bindings_accumulate() {
        let request = RunRequest::builder("redis")
            .port_binding(6379, 16379)
            .port_binding(6379, 26379)
            .port_binding(6379, 16379)
            .build()
            .unwrap();

        assert_eq!(request.port_bindings["6379/tcp"].len(), 2);
    }

    #[test]
    fn test_host_config_passthrough() {
        let request = RunRequest::builder("ubuntu")
            .memory_limit(2_147_483_648) // 2GB
            .cpu_quota(100000)
            .bind("/host/path:/container/path:ro")
            .network_mode("bridge")
            .build()
            .unwrap();

        assert_eq!(request.host_config.memory, Some(2_147_483_648));
        assert_eq!(request.host_config.cpu_quota, Some(100000));
        assert_eq!(
            request.host_config.binds,
            Some(vec!["/host/path:/container/path:ro".to_string()])
        );
        assert_eq!(request.host_config.network_mode.as_deref(), Some("bridge"));
    }

    #[test]
    fn test_readiness_probe_is_stored() {
        let request = RunRequest::builder("redis")
            .readiness_probe(|_handle| async { Ok(()) })
            .build()
            .unwrap();

        assert!(request.retry.probe.is_some());
        assert!(format!("{:?}", request).contains("probe: true"));
    }
}
