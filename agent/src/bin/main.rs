use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, FromArgMatches};
use config::GeneralConfig;
use tributary::agent::{self, RunningAgent};
use tributary::component::registry::Registry;
use tributary::config::{merge_override, ComponentsConfig, Loader};
use tributary::controller::LoadReport;
use tributary::service::cluster::{self, Cluster};
use tributary::service::labelstore::{self, MemoryLabelStore};
use tributary::service::Services;
use tributary_agent::{builtin_registry, init_logger};

const BINARY: &str = env!("CARGO_BIN_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point of `tributary-agent`.
///
/// Commands that only need the registry (`kinds`, `config regen`) return before the
/// config file is read. Errors are returned with their context chain, which `main`
/// prints with `Debug` on exit.
fn main() -> anyhow::Result<()> {
    init_logger();

    let cmd = cli::Cli::augment_args(clap::Command::new(BINARY).version(VERSION));
    let args = cli::Cli::from_arg_matches(&cmd.get_matches()).unwrap_or_else(|e| e.exit());

    log::info!("Starting tributary agent '{BINARY}' v{VERSION}");
    let registry = builtin_registry().context("invalid built-in kinds")?;

    if run_command_no_config(&args, &registry)? {
        return Ok(());
    }

    let overrides = cli_overrides(&args).context("invalid config overrides")?;
    let mut loader = Loader::parse_file(&args.common.config)
        .substitute_env_variables(true)
        .with_override(overrides);
    if !args.common.no_default_config {
        loader = loader.or_default(config::default_config_string()?, true);
    }
    let config = loader.load().context("could not load config file")?;

    let general = GeneralConfig::from_table(&config)?;
    let components = ComponentsConfig::from_table(&config).context("invalid component declarations")?;
    log::info!("{} component(s) declared in {}", components.len(), args.common.config);

    let agent = start_agent(&args, registry, general).context("startup failure")?;

    match args.command {
        None | Some(cli::Command::Run) => {
            let report = agent.load_blocking(components).context("invalid configuration")?;
            print_report(&report);
            // until Ctrl+C
            agent.wait_for_shutdown(Duration::MAX).context("the agent stopped with an error")?;
        }
        Some(cli::Command::Check) => {
            let n = components.len();
            let loaded = agent.load_blocking(components);
            agent.shutdown_and_wait().context("error while stopping the components")?;
            let report = loaded.context("invalid configuration")?;
            print_report(&report);
            let fatal = report
                .failures
                .iter()
                .filter(|f| !f.build_error().is_some_and(|e| e.is_environment()))
                .count();
            if fatal > 0 {
                anyhow::bail!("{fatal} component(s) failed");
            }
            println!("Configuration is valid: {n} component(s).");
        }
        Some(cli::Command::Kinds | cli::Command::Config(_)) => agent.shutdown_and_wait()?,
    }
    Ok(())
}

/// Runs `kinds` and `config regen`, which do not read the config file.
/// Returns `false` if `args` selects another command.
fn run_command_no_config(args: &cli::Cli, registry: &Registry) -> anyhow::Result<bool> {
    use cli::{Command, ConfigArgs, ConfigCommand};

    match args.command {
        Some(Command::Config(ConfigArgs {
            command: ConfigCommand::Regen,
        })) => {
            let file = &args.common.config;
            std::fs::write(file, config::default_config_string()?)
                .with_context(|| format!("could not write {file}"))?;
            log::info!("Wrote the default configuration to {file}");
            Ok(true)
        }
        Some(Command::Kinds) => {
            println!("Available component kinds:");
            for definition in registry.iter() {
                println!("- {} ({})", definition.name, definition.stability);
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn start_agent(args: &cli::Cli, registry: Arc<Registry>, config: GeneralConfig) -> anyhow::Result<RunningAgent> {
    let cluster = Cluster::new(config.cluster).context("invalid cluster config")?;
    let services = Services::new()
        .with(labelstore::SERVICE_NAME, Arc::new(MemoryLabelStore::new()))
        .with(cluster::SERVICE_NAME, Arc::new(cluster));

    let mut builder = agent::Builder::new(registry)
        .services(services)
        .runtime_config(config.runtime);
    if let Some(n) = args.common.worker_threads {
        builder = builder.worker_threads(n);
    }
    builder.build_and_start()
}

fn print_report(report: &LoadReport) {
    for failure in &report.failures {
        log::error!("{failure}");
    }
    for timeout in &report.shutdown_timeouts {
        log::warn!("{timeout}");
    }
    if !report.pending.is_empty() {
        let pending: Vec<String> = report.pending.iter().map(ToString::to_string).collect();
        log::warn!("Waiting for the exports of other components: {}", pending.join(", "));
    }
}

/// Collects `--config-override` tables and the runtime flags into one override table.
///
/// Later overrides win. `--min-stability` and `--grace-period` win over `--config-override`.
fn cli_overrides(args: &cli::Cli) -> anyhow::Result<toml::Table> {
    let mut table = toml::Table::new();
    for text in args.common.config_override.iter().flatten() {
        let parsed = toml::Table::from_str(text).with_context(|| format!("not a TOML table: {text}"))?;
        merge_override(&mut table, parsed);
    }

    let mut runtime = toml::Table::new();
    if let Some(min_stability) = args.common.min_stability {
        runtime.insert("min_stability".into(), toml::Value::String(min_stability.to_string()));
    }
    if let Some(grace_period) = args.common.grace_period {
        let formatted = humantime_serde::re::humantime::format_duration(grace_period).to_string();
        runtime.insert("shutdown_grace_period".into(), toml::Value::String(formatted));
    }
    if !runtime.is_empty() {
        let mut flags = toml::Table::new();
        flags.insert(tributary::config::RUNTIME_KEY.into(), toml::Value::Table(runtime));
        merge_override(&mut table, flags);
    }
    Ok(table)
}

/// Command-line interface, parsed with clap.
mod cli {
    use std::time::Duration;

    use clap::{Args, Parser, Subcommand};
    use tributary::component::Stability;

    /// Tributary agent: run a graph of telemetry components.
    #[derive(Parser)]
    pub struct Cli {
        #[command(subcommand)]
        pub command: Option<Command>,

        #[command(flatten)]
        pub common: CommonArgs,
    }

    #[derive(Subcommand)]
    pub enum Command {
        /// Run the components until the agent is stopped.
        ///
        /// This is the default command.
        Run,

        /// Build every component once, report the errors and stop.
        Check,

        /// List the available component kinds.
        Kinds,

        /// Configuration file utilities.
        Config(ConfigArgs),
    }

    #[derive(Args)]
    pub struct ConfigArgs {
        #[command(subcommand)]
        pub command: ConfigCommand,
    }

    #[derive(Subcommand)]
    pub enum ConfigCommand {
        /// Write the default configuration to the `--config` path, replacing any existing file.
        Regen,
    }

    /// Common CLI arguments.
    #[derive(Args, Clone)]
    pub struct CommonArgs {
        /// TOML file with the runtime settings and the component declarations.
        #[arg(long, env = "TRIBUTARY_CONFIG", default_value = "tributary.toml")]
        pub config: String,

        /// Fail if the config file is missing instead of creating a default one.
        #[arg(long)]
        pub no_default_config: bool,

        /// TOML snippet merged over the config file, ex. `runtime.control_channel_size = 64`.
        /// Can be repeated.
        #[arg(long)]
        pub config_override: Option<Vec<String>>,

        /// Minimum stability level of the component kinds: experimental, beta or stable.
        #[arg(long)]
        pub min_stability: Option<Stability>,

        /// How long a component can take to stop before it is aborted, ex. `10s`.
        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        pub grace_period: Option<Duration>,

        /// How many worker threads to spawn.
        #[arg(long, env = "TRIBUTARY_THREADS")]
        pub worker_threads: Option<usize>,
    }
}

/// Settings of the config file, besides `[[component]]`.
mod config {
    use anyhow::Context;
    use serde::{Deserialize, Serialize};
    use tributary::component::Stability;
    use tributary::config::RuntimeConfig;
    use tributary::service::cluster::ClusterOptions;

    #[derive(Serialize, Deserialize)]
    pub struct GeneralConfig {
        pub runtime: RuntimeConfig,
        pub cluster: ClusterOptions,
    }

    /// Components of the default configuration: a counter, relabeled, then logged.
    const DEFAULT_COMPONENTS: &str = r#"
[[component]]
kind = "metrics.log"
label = "stdout"

[[component]]
kind = "metrics.relabel"
label = "agent"
[component.arguments]
label = "agent"
value = "tributary"
forward_to = [{ ref = "metrics.log.stdout", export = "receiver" }]

[[component]]
kind = "metrics.generate"
label = "heartbeat"
[component.arguments]
name = "heartbeat_total"
interval = "10s"
forward_to = [{ ref = "metrics.relabel.agent", export = "receiver" }]
"#;

    impl Default for GeneralConfig {
        fn default() -> Self {
            Self {
                runtime: RuntimeConfig {
                    // metrics.generate is beta
                    min_stability: Stability::Beta,
                    ..Default::default()
                },
                cluster: ClusterOptions::default(),
            }
        }
    }

    impl GeneralConfig {
        pub fn from_table(table: &toml::Table) -> anyhow::Result<Self> {
            let runtime = RuntimeConfig::from_table(table).context("invalid runtime config")?;
            let cluster = match table.get("cluster") {
                Some(value) => value.clone().try_into().context("invalid cluster config")?,
                None => ClusterOptions::default(),
            };
            Ok(Self { runtime, cluster })
        }
    }

    /// Returns the content of the default configuration file.
    pub fn default_config_string() -> anyhow::Result<String> {
        let mut content = toml::to_string(&GeneralConfig::default()).context("could not serialize the default config")?;
        content.push_str(DEFAULT_COMPONENTS);
        Ok(content)
    }

}
