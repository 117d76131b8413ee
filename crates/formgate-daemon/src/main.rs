// Copyright (c) 2026 The formgate Authors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use formgate_daemon::config::GateConfig;
use formgate_daemon::http_verify;
use formgate_daemon::telemetry::Telemetry;
use formgate_daemon::verifier::{TokenVerifier, VerifierClient};

#[derive(Debug, Parser)]
#[command(name = "formgate-daemon")]
#[command(about = "reCAPTCHA verification gatekeeper for form submissions")]
struct Args {
    /// Overrides the address derived from PORT.
    #[arg(long)]
    listen: Option<String>,

    /// Serves Prometheus text metrics on this address when set.
    #[arg(long)]
    metrics_listen: Option<String>,

    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log))
        .init();

    let mut cfg = GateConfig::from_env()?;
    if let Some(listen) = args.listen {
        cfg.listen = listen;
    }
    if let Err(err) = cfg.verifier.validate() {
        tracing::error!(
            error=%err,
            protocol = cfg.verifier.protocol.as_str(),
            "verifier configuration incomplete; submissions will be refused"
        );
    }

    let verifier: Arc<dyn TokenVerifier> = Arc::new(VerifierClient::from_config(
        &cfg.verifier,
        Duration::from_millis(cfg.backend_timeout_ms),
    )?);
    let telemetry = Arc::new(Telemetry::new());
    if let Some(metrics_listen) = args.metrics_listen {
        let addr: SocketAddr = metrics_listen.parse()?;
        telemetry.clone().spawn_metrics_server(addr).await?;
        tracing::info!(%addr, "metrics listener started");
    }

    let listener = http_verify::bind_listener(&cfg.listen).await?;
    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        protocol = cfg.verifier.protocol.as_str(),
        threshold = cfg.policy.score_threshold(),
        allowed_origin = %cfg.allowed_origin,
        "starting formgate verification server"
    );

    let state = http_verify::build_state(cfg, verifier, telemetry);
    http_verify::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })
    .await?;

    Ok(())
}
