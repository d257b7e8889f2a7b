use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use marquee::controller::ReconciliationController;
use marquee::logging;
use marquee::messages::ControllerEvent;
use marquee::shutdown::{ShutdownController, DEFAULT_SHUTDOWN_TIMEOUT};
use marquee::surface::headless::HeadlessSurfaceFactory;
use marquee_server::ApiGateway;

use crate::args::ServerArgs;
use crate::config_file::{watch_config_file, ConfigFile};

pub async fn start_server(args: &ServerArgs) -> Result<()> {
    let filter = args
        .log_filter
        .clone()
        .unwrap_or_else(|| format!("{},marquee={}", args.log_level, args.log_level));
    let log_path = args.log_dir.join("marquee-server.log");
    logging::setup_global_logging(&log_path, &filter, args.log_stdout)
        .expect("Failed to setup logging");

    info!("starting marquee server");
    info!("config file: {:?}", args.config);

    let mut config = ConfigFile::load_or_create(&args.config).await?;
    let api_port = config.current().api_port;
    let api_key = config.current().api_key.clone();

    let factory = Arc::new(HeadlessSurfaceFactory::new()?);
    let (controller, mut controller_events) = ReconciliationController::spawn(factory);

    let (shutdown, gateway_shutdown) = ShutdownController::new();

    let gateway = match api_port {
        Some(port) => {
            let gateway = ApiGateway::new(controller.clone(), port, api_key);
            {
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    if let Err(err) = gateway.run(gateway_shutdown).await {
                        error!("control API failed: {err:#}");
                    }
                });
            }
            Some(gateway)
        }
        None => {
            warn!("no apiPort configured, control API disabled");
            None
        }
    };

    controller.apply(config.current().clone());

    // Wire controller events to the gateway and the config file.
    let (watcher, mut config_changes) = watch_config_file(&args.config)?;
    {
        let controller = controller.clone();
        tokio::spawn(async move {
            // Keep the watcher alive for the lifetime of the loop.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    event = controller_events.recv() => {
                        let Some(event) = event else { break };
                        match event {
                            ControllerEvent::StatusChanged(status) => {
                                if let Some(gateway) = &gateway {
                                    gateway.set_status(status);
                                }
                            }
                            ControllerEvent::PersistRequested { id, spec } => {
                                if let Err(err) = config.update_display(&id, spec).await {
                                    error!("failed to persist modified spec: {err:#}");
                                }
                            }
                            ControllerEvent::DisplayClosed { id } => {
                                warn!("display \"{id}\" closed");
                            }
                        }
                    }
                    Some(()) = config_changes.recv() => {
                        match config.reload().await {
                            Ok(Some(state)) => {
                                info!("config file changed, applying");
                                if state.api_port != api_port {
                                    warn!("apiPort changes require a restart to take effect");
                                }
                                controller.apply(state);
                            }
                            Ok(None) => {}
                            Err(err) => error!("failed to reload config: {err:#}"),
                        }
                    }
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    shutdown.signal_shutdown();
    match tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, controller.shutdown()).await {
        Ok(result) => result?,
        Err(_) => warn!("timed out waiting for displays to close"),
    }

    Ok(())
}
