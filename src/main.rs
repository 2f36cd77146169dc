// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stream_drainer::config::{load_and_validate_config, RuntimeBuilder};
use stream_drainer::engine::{DrainMode, Drainer};
use stream_drainer::observability::DrainDataStatistics;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound for one episode, so a blob that never reports its drain data
/// cannot hang the runner.
const EPISODE_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <pipeline.yaml> [intermediate|semi-final|final ...]", args[0]);
        eprintln!("Example: {} configs/three-blob-pipeline.yaml intermediate final", args[0]);
        eprintln!("Example: {} configs/stalled-blob.yaml intermediate", args[0]);
        std::process::exit(1);
    }

    let config_file = &args[1];
    let modes = if args.len() > 2 {
        args[2..]
            .iter()
            .map(|arg| arg.parse::<DrainMode>().map_err(anyhow::Error::msg))
            .collect::<anyhow::Result<Vec<_>>>()?
    } else {
        vec![DrainMode::Intermediate, DrainMode::Final]
    };

    let start_time = Instant::now();
    let config = load_and_validate_config(config_file)
        .with_context(|| format!("loading {}", config_file))?;
    let statistics = Arc::new(DrainDataStatistics::new());
    let drainer = RuntimeBuilder::builder(&config)?
        .observer(statistics.clone())
        .build()?;

    println!("Configuration: {}", config_file);
    println!("Blobs: {}", drainer.graph().len());
    println!("Source blob: {}", drainer.graph().source());
    println!(
        "Deadlock timeout: {:?} ({:?})",
        config.drainer.deadlock_timeout(),
        config.drainer.deadlock_policy
    );

    for mode in modes {
        run_episode(&drainer, mode).await?;
    }

    let mut buffered = Vec::new();
    statistics.write_to(&mut buffered)?;
    if !buffered.is_empty() {
        println!("\nBuffered items per token, one line per episode:");
        print!("{}", String::from_utf8_lossy(&buffered));
    }

    println!("\nTotal time (including config load): {:?}", start_time.elapsed());
    Ok(())
}

async fn run_episode(drainer: &Drainer, mode: DrainMode) -> anyhow::Result<()> {
    println!("\n{}", "─".repeat(60));
    println!("Episode: {} draining", mode);

    let episode_start = Instant::now();
    let drained = match mode {
        DrainMode::Intermediate => {
            tokio::time::timeout(EPISODE_TIMEOUT, drainer.drain_intermediate()).await
        }
        DrainMode::SemiFinal | DrainMode::Final => {
            tokio::time::timeout(EPISODE_TIMEOUT, drainer.drain_final(mode == DrainMode::SemiFinal))
                .await
        }
    };

    let data = match drained {
        Ok(result) => result?,
        Err(_) => {
            for (blob, state) in drainer.node_states() {
                println!("  {} : {}", blob, state);
            }
            bail!("{} draining did not finish within {:?}", mode, EPISODE_TIMEOUT);
        }
    };

    let Some(data) = data else {
        println!("Rejected: final draining was already requested");
        return Ok(());
    };

    println!("Drained in {:?} (episode {})", episode_start.elapsed(), drainer.episode());
    for (blob, state) in drainer.node_states() {
        println!("  {} : {}", blob, state);
    }

    println!("Drain data:");
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
