use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::core::{Error, Result};
use super::discovery::{DiscoveryEngine, DiscoveryStep};

/// Handle used to stop a running [`DiscoveryScheduler`]
#[derive(Clone)]
pub struct SchedulerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Asks the scheduler loop to stop after the current step
    pub fn shutdown(&self) {
        // Nobody listening means the loop is already gone
        let _ = self.shutdown.send(true);
    }
}

/// Periodically runs discovery steps on a shared engine
///
/// The engine sits behind a mutex so link tasks can inspect the routing
/// table between steps. Radio operations block, so each step runs on the
/// blocking thread pool.
pub struct DiscoveryScheduler {
    engine: Arc<Mutex<DiscoveryEngine>>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl DiscoveryScheduler {
    /// Creates a scheduler polling at the engine's configured interval
    pub fn new(engine: DiscoveryEngine) -> (Self, SchedulerHandle) {
        let poll_interval = engine.config().discovery_poll_interval;
        let (tx, rx) = watch::channel(false);

        let scheduler = DiscoveryScheduler {
            engine: Arc::new(Mutex::new(engine)),
            poll_interval,
            shutdown: rx,
        };
        let handle = SchedulerHandle { shutdown: Arc::new(tx) };

        (scheduler, handle)
    }

    /// Returns the shared engine
    pub fn engine(&self) -> Arc<Mutex<DiscoveryEngine>> {
        Arc::clone(&self.engine)
    }

    /// Runs a single discovery step
    pub async fn tick(&self) -> Result<Option<DiscoveryStep>> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let mut engine = engine.blocking_lock();
            engine.run_discovery_step()
        })
        .await
        .map_err(|e| Error::transport(format!("Discovery task failed: {}", e)))?
    }

    /// Runs discovery steps until shut down
    pub async fn run(&mut self) -> Result<()> {
        let mut poll = interval(self.poll_interval);
        info!("Discovery scheduler started, polling every {:?}", self.poll_interval);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match self.tick().await {
                        Ok(Some(step)) => debug!("Discovery step: {:?}", step),
                        Ok(None) => {}
                        Err(e) => warn!("Discovery step failed: {}", e),
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Discovery scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Address, Config, GroupId, HopLevel};
    use crate::network::discovery::JoinOutcome;
    use crate::network::mode::DiscoveryPolicy;
    use crate::network::sim::SimNode;
    use crate::protocol::{Beacon, FrameCodec};
    use tokio::time::timeout;

    fn scheduler(node: &SimNode, address: Address, is_hub: bool) -> (DiscoveryScheduler, SchedulerHandle) {
        let mut config = Config::for_node(address, is_hub);
        config.discovery_poll_interval = Duration::from_millis(10);
        let engine = DiscoveryEngine::new(config, node.peripherals(7)).unwrap();
        DiscoveryScheduler::new(engine)
    }

    #[tokio::test]
    async fn test_tick_respects_discovery_mode() {
        let node = SimNode::new(Address(1), GroupId(3));
        let (scheduler, _handle) = scheduler(&node, Address(1), true);

        assert_eq!(scheduler.tick().await.unwrap(), None);

        scheduler.engine().lock().await.set_discovery_mode(DiscoveryPolicy::Long);
        let step = scheduler.tick().await.unwrap();
        assert!(matches!(step, Some(DiscoveryStep::Beacon(_))));
        assert_eq!(node.radio.sent_frames().len(), 2);
    }

    #[tokio::test]
    async fn test_tick_joins_unattached_node() {
        let node = SimNode::new(Address(2), GroupId(0));
        let (scheduler, _handle) = scheduler(&node, Address(2), false);
        scheduler.engine().lock().await.set_discovery_mode(DiscoveryPolicy::Short);

        let beacon = Beacon {
            level: HopLevel::HUB,
            source: Address(1),
            group: GroupId(3),
            seconds: 10,
            sub_second: 0,
        };
        let frame = FrameCodec::new().build_beacon(beacon).unwrap();
        node.radio.queue_frame(&frame, -50);

        let step = scheduler.tick().await.unwrap();
        assert!(matches!(step, Some(DiscoveryStep::Join(JoinOutcome::Joined(_)))));
        assert!(scheduler.engine().lock().await.is_attached());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let node = SimNode::new(Address(1), GroupId(3));
        let (mut scheduler, handle) = scheduler(&node, Address(1), true);
        scheduler.engine().lock().await.set_discovery_mode(DiscoveryPolicy::Long);

        let task = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown();

        let result = timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert!(!node.radio.sent_frames().is_empty());
    }
}
