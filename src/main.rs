//! tortoise-vpa - inspect and clean up the VPAs managed by Tortoise

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use serde::Serialize;

use tortoise_common::crd::{RecommendedContainerResources, Tortoise, VerticalPodAutoscaler};
use tortoise_common::events::KubeEventPublisher;
use tortoise_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use tortoise_vpa::{KubeVpaClient, VpaService, VpaServiceConfig};

/// Operator tooling for the monitor and updater VPAs owned by a Tortoise
#[derive(Parser, Debug)]
#[command(name = "tortoise-vpa", version, about, long_about = None)]
struct Cli {
    /// Path to a kubeconfig file (in-cluster or default config when unset)
    #[arg(long, env = "KUBECONFIG", global = true)]
    kubeconfig: Option<PathBuf>,

    /// Namespace of the Tortoise
    #[arg(
        short,
        long,
        env = "TORTOISE_NAMESPACE",
        default_value = "default",
        global = true
    )]
    namespace: String,

    /// Timeout for establishing a connection to the API server
    #[arg(long, default_value_t = 10, global = true)]
    connect_timeout_secs: u64,

    /// Timeout for a single API server response
    #[arg(long, default_value_t = 30, global = true)]
    read_timeout_secs: u64,

    /// Attempts made when a VPA write hits a version conflict
    #[arg(
        long,
        default_value_t = 5,
        value_parser = clap::value_parser!(u32).range(1..),
        global = true
    )]
    retry_attempts: u32,

    /// Reporting component recorded on emitted events
    #[arg(
        long,
        env = "TORTOISE_CONTROLLER_NAME",
        default_value = tortoise_common::DEFAULT_CONTROLLER_NAME,
        global = true
    )]
    controller_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the monitor and updater VPAs of a Tortoise
    ///
    /// Prints each VPA's name, whether the monitor's recommendation is ready
    /// and the current per-container recommendations as JSON.
    Status {
        /// Name of the Tortoise
        tortoise: String,
    },

    /// Clear the updater VPA's recommendation without deleting it
    DisableUpdater {
        /// Name of the Tortoise
        tortoise: String,
    },

    /// Delete the monitor and updater VPAs
    ///
    /// Honors the Tortoise's deletion policy and leaves VPAs that are not
    /// marked as managed by Tortoise untouched.
    Delete {
        /// Name of the Tortoise
        tortoise: String,
    },

    /// Print the Tortoise CRD manifest and exit
    Crd,
}

/// What `status` reports for one VPA
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VpaReport {
    name: String,
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ready: Option<bool>,
    recommendations: Vec<RecommendedContainerResources>,
}

impl VpaReport {
    fn found(vpa: &VerticalPodAutoscaler, ready: Option<bool>) -> Self {
        Self {
            name: vpa.name_any(),
            found: true,
            ready,
            recommendations: vpa.container_recommendations().to_vec(),
        }
    }

    fn missing(name: String) -> Self {
        Self {
            name,
            found: false,
            ready: None,
            recommendations: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    tortoise: String,
    namespace: String,
    monitor: VpaReport,
    updater: VpaReport,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Crd = cli.command {
        let crd = serde_yaml::to_string(&Tortoise::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        service_name: "tortoise-vpa".to_string(),
        log_format: LogFormat::Pretty,
        ..Default::default()
    })?;

    let client = build_client(&cli).await?;
    let config = service_config(&cli);
    let service = VpaService::new(
        Arc::new(KubeVpaClient::new(client.clone())),
        Arc::new(KubeEventPublisher::new(client.clone(), &config.controller_name)),
        config,
    );
    let tortoises: Api<Tortoise> = Api::namespaced(client, &cli.namespace);

    match &cli.command {
        Commands::Status { tortoise } => {
            let tortoise = tortoises.get(tortoise).await?;
            let report = status(&service, &tortoise).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::DisableUpdater { tortoise } => {
            let tortoise = tortoises.get(tortoise).await?;
            service.disable_updater_vpa(&tortoise).await?;
            tracing::info!(tortoise = %tortoise.name_any(), "updater VPA disabled");
        }
        Commands::Delete { tortoise } => {
            let tortoise = tortoises.get(tortoise).await?;
            service.delete_monitor_vpa(&tortoise).await?;
            service.delete_updater_vpa(&tortoise).await?;
            tracing::info!(tortoise = %tortoise.name_any(), "VPA cleanup finished");
        }
        Commands::Crd => {}
    }

    Ok(())
}

/// Service settings taken from the command line
fn service_config(cli: &Cli) -> VpaServiceConfig {
    VpaServiceConfig::default()
        .with_conflict_attempts(cli.retry_attempts)
        .with_controller_name(&cli.controller_name)
}

/// Build a kube client from the explicit kubeconfig or the inferred one
async fn build_client(cli: &Cli) -> anyhow::Result<Client> {
    let mut config = match &cli.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
        }
        None => kube::Config::infer().await?,
    };
    config.connect_timeout = Some(Duration::from_secs(cli.connect_timeout_secs));
    config.read_timeout = Some(Duration::from_secs(cli.read_timeout_secs));

    Ok(Client::try_from(config)?)
}

async fn status(service: &VpaService, tortoise: &Tortoise) -> anyhow::Result<StatusReport> {
    let name = tortoise.name_any();

    let monitor = match service.get_monitor_vpa(tortoise).await {
        Ok((vpa, ready)) => VpaReport::found(&vpa, Some(ready)),
        Err(e) if e.is_not_found() => VpaReport::missing(tortoise_vpa::monitor_vpa_name(&name)),
        Err(e) => return Err(e.into()),
    };

    let updater = match service.get_updater_vpa(tortoise).await {
        Ok(vpa) => VpaReport::found(&vpa, None),
        Err(e) if e.is_not_found() => VpaReport::missing(tortoise_vpa::updater_vpa_name(&name)),
        Err(e) => return Err(e.into()),
    };

    Ok(StatusReport {
        tortoise: name,
        namespace: tortoise.namespace().unwrap_or_default(),
        monitor,
        updater,
    })
}
