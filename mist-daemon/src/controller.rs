//! Controller loop: gather a snapshot, decide a cooling mode, publish.

use std::sync::Arc;

use tracing::{error, info, warn};

use mist_core::{
    decide, engine, footprint, Config, Decision, DummyModeWalker, Notifier, RuntimeSettings,
    SensorSource,
};
use mist_error::Result;
use mist_protocol::{SenseSnapshot, StatusInfo, PUBSUB_TOPIC};

use crate::shutdown::Shutdown;
use crate::transport;

/// Produces one control message per publisher period.
pub struct MessageGenerator {
    config: Config,
    settings: RuntimeSettings,
    source: Arc<dyn SensorSource>,
    notifier: Arc<dyn Notifier>,
    walker: Option<DummyModeWalker>,
}

impl MessageGenerator {
    pub fn new(
        config: Config,
        settings: RuntimeSettings,
        source: Arc<dyn SensorSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let walker = settings.dummy_mode.then(DummyModeWalker::new);
        Self {
            config,
            settings,
            source,
            notifier,
            walker,
        }
    }

    /// Build the next control message as a JSON payload. `None` skips the
    /// period after a wholesale snapshot failure.
    pub fn generate(&mut self) -> Option<String> {
        let message = if let Some(walker) = &mut self.walker {
            let decision = Decision {
                mode_index: walker.step(),
                cooler_status: StatusInfo::silent(0),
                outdoor_status: StatusInfo::silent(0),
                outdoor_temp_unknown: false,
            };
            engine::gen_control_msg(&decision, SenseSnapshot::default(), true, self.settings.speedup)
        } else {
            let snapshot = match self.source.fetch() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("Failed to fetch sensor data: {e}");
                    self.notifier
                        .notify_error(&format!("Failed to fetch sensor data: {e}"));
                    return None;
                }
            };

            info!("Judge cooling mode");
            let decision = decide(&snapshot, &self.config.controller.thresholds);
            if decision.outdoor_temp_unknown {
                self.notifier.notify_error(
                    "The outdoor temperature is unknown, cannot classify AC activity.",
                );
            }
            engine::gen_control_msg(&decision, snapshot, false, 1)
        };

        if let Err(e) = footprint::update(&self.config.controller.liveness.file) {
            warn!("Failed to touch liveness marker: {e}");
        }

        match message.to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                error!("Failed to encode control message: {e}");
                None
            }
        }
    }
}

/// Run the controller: the real publisher on `real_port` and, unless
/// disabled, the caching proxy republishing on `pub_port`.
pub async fn run(
    config: Config,
    settings: RuntimeSettings,
    source: Arc<dyn SensorSource>,
    notifier: Arc<dyn Notifier>,
    shutdown: Shutdown,
) -> Result<()> {
    info!("Start controller (port: {})", settings.pub_port);

    let proxy_handle = if settings.disable_proxy {
        None
    } else {
        let host = settings.control_host.clone();
        let real_port = settings.real_port;
        let pub_port = settings.pub_port;
        let msg_count = settings.msg_count;
        let idle_timeout = settings.idle_timeout_sec;
        let proxy_shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            transport::run_proxy(&host, real_port, pub_port, msg_count, idle_timeout, proxy_shutdown)
                .await
        }))
    };

    let interval_sec = settings.effective_interval(config.controller.interval_sec);
    let mut generator = MessageGenerator::new(config, settings.clone(), source, notifier);

    let result = transport::run_publisher(
        settings.real_port,
        interval_sec,
        settings.msg_count,
        PUBSUB_TOPIC,
        shutdown.clone(),
        move || generator.generate(),
    )
    .await;

    // The publisher ending (count exhausted or error) drains the proxy too.
    shutdown.trigger();
    if let Some(handle) = proxy_handle {
        match tokio::time::timeout(mist_core::constants::WORKER_JOIN_TIMEOUT, handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!("Proxy failed: {e}"),
            Ok(Err(e)) => error!("Proxy panicked: {e}"),
            Err(_) => warn!("Proxy did not stop within the join timeout"),
        }
    }

    warn!("Terminate controller");
    result
}
