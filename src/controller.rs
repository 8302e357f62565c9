//! Controller assembly
//!
//! Wires the MAVLink connection, the tunnel command handler, telemetry
//! tracking, pulse relay and (optionally) the pulse simulator into one
//! running controller. The binary is a thin shell around [`Controller`].

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use crate::communication::mavlink::connection::Connection;
use crate::communication::mavlink::dispatcher::MessageDispatcher;
use crate::communication::mavlink::handlers::{CommandHandler, CommandSettings, TelemetryTracker};
use crate::communication::mavlink::status_notifier::StatusNotifier;
use crate::communication::mavlink::transport::{self, MavlinkTransport, TransportError};
use crate::communication::mavlink::tunnel::TunnelSender;
use crate::detection::{PulseRelay, PulseSimulator};
use crate::parameters::{ConfigError, ControllerConfig};

/// Failures that prevent the controller from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("MAVLink transport: {0}")]
    Transport(#[from] TransportError),

    #[error("{what}: {source}")]
    Io {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
}

fn io_context(what: &'static str) -> impl FnOnce(std::io::Error) -> StartupError {
    move |source| StartupError::Io { what, source }
}

/// A running controller
pub struct Controller {
    connection: Connection,
    handler: Arc<CommandHandler>,
    telemetry: Arc<TelemetryTracker>,
    relay: PulseRelay,
    simulator: Option<PulseSimulator>,
}

impl Controller {
    /// Open the configured link and start every subsystem
    pub fn start(config: &ControllerConfig) -> Result<Self, StartupError> {
        config.validate()?;
        let transport = transport::open(&config.link.address()?)?;
        crate::log_info!("MAVLink connection on {}", transport.describe());
        Self::start_with_transport(config, transport)
    }

    /// Start on an already opened transport
    pub fn start_with_transport(
        config: &ControllerConfig,
        transport: Arc<dyn MavlinkTransport>,
    ) -> Result<Self, StartupError> {
        let dispatcher = Arc::new(MessageDispatcher::new());
        let connection = Connection::start_with_transport(
            transport,
            config.link.connection_config(),
            dispatcher.clone(),
        )?;
        let link = connection.link().clone();

        let telemetry = TelemetryTracker::new(config.telemetry, link.peers().clone());
        telemetry.register(&dispatcher);
        telemetry
            .start_sampler()
            .map_err(io_context("telemetry sampler"))?;

        let handler = CommandHandler::new(
            CommandSettings::from_config(config),
            TunnelSender::new(link.clone()),
            Arc::new(StatusNotifier::new(link.clone())),
            connection.custom_mode(),
            Some(telemetry.clone()),
        )
        .map_err(io_context("lifecycle worker"))?;
        handler.register(&dispatcher);

        let relay = PulseRelay::start(
            config.pulse.listen_addr()?,
            TunnelSender::new(link.clone()),
            Some(telemetry.clone()),
        )
        .map_err(io_context("pulse listener"))?;

        let simulator = if config.simulator.enabled {
            Some(
                PulseSimulator::start(
                    config.simulator,
                    TunnelSender::new(link.clone()),
                    telemetry.clone(),
                )
                .map_err(io_context("pulse simulator"))?,
            )
        } else {
            None
        };

        crate::log_info!("Controller started");
        Ok(Self {
            connection,
            handler,
            telemetry,
            relay,
            simulator,
        })
    }

    pub fn handler(&self) -> &Arc<CommandHandler> {
        &self.handler
    }

    pub fn telemetry(&self) -> &Arc<TelemetryTracker> {
        &self.telemetry
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Address the pulse relay is listening on
    pub fn pulse_addr(&self) -> SocketAddr {
        self.relay.local_addr()
    }

    /// Stop processes, then threads, then the link
    pub fn shutdown(self) {
        crate::log_info!("Controller shutting down");
        if let Some(simulator) = &self.simulator {
            simulator.stop();
        }
        self.relay.stop();
        self.handler.shutdown();
        self.telemetry.stop();
        self.connection.stop();
    }
}
