// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use loghub_server::config::Configuration;
use loghub_server::crypto::NullCipher;
use loghub_server::ingest::LogRequestHandler;
use loghub_server::logger;
use loghub_server::registry::{ClientIntegrityTask, Registry};
use loghub_server::server::IntakeServer;
use loghub_server::sink::FileSink;

const DEFAULT_CONFIG_PATH: &str = "loghub.json";

#[tokio::main]
async fn main() {
    let log_level = env::var("LOGHUB_LOG_LEVEL")
        .map(|level| level.to_lowercase())
        .unwrap_or_else(|_| "info".to_string());
    let subscriber = tracing_subscriber::fmt()
        .event_format(logger::Formatter)
        .with_env_filter(EnvFilter::new(log_level))
        .finish();
    if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {error}");
        return;
    }

    let config_path = env::var("LOGHUB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let configuration = match Configuration::from_file(&config_path) {
        Ok(configuration) => Arc::new(configuration),
        Err(error) => {
            error!(path = %config_path.display(), %error, "failed to load configuration");
            return;
        }
    };

    let sink = match FileSink::new(Arc::clone(&configuration)) {
        Ok(sink) => Arc::new(sink),
        Err(error) => {
            error!(%error, "failed to initialize log sink");
            return;
        }
    };

    let registry = Arc::new(Registry::new(Arc::clone(&configuration)));
    let integrity_task = Arc::new(ClientIntegrityTask::new(
        Arc::downgrade(&registry),
        configuration.client_integrity_task_interval(),
    ));
    registry.set_client_integrity_task(Arc::clone(&integrity_task));

    let handler = Arc::new(LogRequestHandler::new(
        Arc::clone(&registry),
        sink,
        Arc::new(NullCipher),
    ));
    handler.start();

    let cancel_token = CancellationToken::new();
    let integrity_worker = {
        let task = Arc::clone(&integrity_task);
        let token = cancel_token.clone();
        tokio::spawn(async move { task.run(token).await })
    };

    let intake = IntakeServer::new(Arc::clone(&handler), configuration.listen_addr().to_string());
    info!(config = %config_path.display(), "loghub starting");

    tokio::select! {
        result = intake.run(cancel_token.clone()) => {
            if let Err(error) = result {
                error!(%error, "intake server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    cancel_token.cancel();
    handler.shutdown().await;
    let _ = integrity_worker.await;
    info!("loghub stopped");
}
