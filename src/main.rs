use anyhow::Context;
use std::time::Duration;
use tcontainer::cli::{
    Args, ConfigDiscovery, ExecutionMode, PruneConfig, RunConfig, TcontainerConfig,
};
use tcontainer::container::{ContainerHandle, ContainerOrchestrator, PruneOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tcontainer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mode = args.mode().map_err(anyhow::Error::msg)?;

    let config = ConfigDiscovery::load(args.config.as_deref())?;

    if let ExecutionMode::ShowConfig = mode {
        ConfigDiscovery::show_discovery_info();
        println!();
        println!("Effective configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let orchestrator = ContainerOrchestrator::with_client_config(config.client.clone())
        .await
        .context("failed to connect to the container runtime")?;

    match mode {
        ExecutionMode::Run(run) => run_container(&orchestrator, &config, run, &cancel).await,
        ExecutionMode::Prune(prune) => prune_resources(&orchestrator, prune).await,
        ExecutionMode::Remove { name } => {
            orchestrator.remove_by_name(&name).await?;
            println!("Removed {}", name);
            Ok(())
        }
        ExecutionMode::ShowConfig => Ok(()),
    }
}

async fn run_container(
    orchestrator: &ContainerOrchestrator,
    config: &TcontainerConfig,
    run: RunConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("failed to build HTTP client")?;
    let request = run.to_request(&config.run, http)?;
    let handle = orchestrator.run(&request, cancel).await?;

    print_handle(&handle, run.json)?;

    if run.detach {
        return Ok(());
    }

    // The expiry timer only runs while this process is alive.
    match request.expiry {
        Some(expiry) => {
            info!("Container expires in {:?}, press Ctrl-C to remove it now", expiry);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(expiry) => {}
            }
        }
        None => {
            info!("Press Ctrl-C to remove the container");
            cancel.cancelled().await;
        }
    }

    if let Err(e) = orchestrator.purge(&handle).await {
        warn!("Failed to purge container {}: {}", handle.id, e);
    }
    Ok(())
}

fn print_handle(handle: &ContainerHandle, json: bool) -> anyhow::Result<()> {
    let endpoints: Vec<_> = handle
        .endpoints()
        .into_iter()
        .map(|(port, endpoint)| {
            serde_json::json!({
                "port": port,
                "endpoint": endpoint,
                "published": handle.published_endpoint(port),
            })
        })
        .collect();

    if json {
        let value = serde_json::json!({
            "id": handle.id,
            "name": handle.name,
            "image": handle.snapshot().image,
            "state": handle.lifecycle().to_string(),
            "endpoints": endpoints,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{} ({})", handle.name, handle.id);
    for (port, endpoint) in handle.endpoints() {
        match handle.published_endpoint(port) {
            Some(published) => println!("  {} -> {} (host {})", port, endpoint, published),
            None => println!("  {} -> {}", port, endpoint),
        }
    }
    Ok(())
}

async fn prune_resources(
    orchestrator: &ContainerOrchestrator,
    prune: PruneConfig,
) -> anyhow::Result<()> {
    let options = prune
        .filters
        .into_iter()
        .fold(PruneOptions::default(), |options, (key, value)| {
            options
                .container_filter(key.clone(), value.clone())
                .image_filter(key, value)
        });

    let report = orchestrator.prune(&options).await?;

    if prune.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Removed {} containers and {} images",
            report.removed_containers.len(),
            report.removed_images.len()
        );
    }
    Ok(())
}
