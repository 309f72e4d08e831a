//! Async channel bridge between Tokio runtime and the scale worker thread

use async_channel::{Receiver, Sender, bounded};
use protocol::WeightMeasurement;

/// Commands from Tokio runtime to the scale worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleCommand {
    /// Stop polling, close the session and exit the thread
    Shutdown,
}

/// Events from the scale worker
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleEvent {
    /// A stable weight was decoded this tick
    Measurement { weight: WeightMeasurement },

    /// The interrupt transfer failed this tick
    TransferFailed {
        /// Name of the underlying USB error
        error: String,
    },

    /// The worker closed the session and located the scale again
    SessionReopened {
        /// Bus/address of the newly opened device
        location: String,
    },
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct ScaleBridge {
    cmd_tx: Sender<ScaleCommand>,
    event_rx: Receiver<ScaleEvent>,
}

impl ScaleBridge {
    /// Send a command to the scale worker
    pub async fn send_command(&self, cmd: ScaleCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the scale worker
    ///
    /// Fails once the worker has exited and dropped its sender.
    pub async fn recv_event(&self) -> crate::Result<ScaleEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for the scale worker thread (blocking)
pub struct ScaleWorker {
    cmd_rx: Receiver<ScaleCommand>,
    event_tx: Sender<ScaleEvent>,
}

impl ScaleWorker {
    /// Try to receive a command without blocking
    ///
    /// A closed command channel reads as `Shutdown`: nobody is left to
    /// consume measurements.
    pub fn try_recv_command(&self) -> Option<ScaleCommand> {
        match self.cmd_rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(async_channel::TryRecvError::Empty) => None,
            Err(async_channel::TryRecvError::Closed) => Some(ScaleCommand::Shutdown),
        }
    }

    /// Send an event to Tokio runtime (blocking)
    pub fn send_event(&self, event: ScaleEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and the scale worker
///
/// Returns (ScaleBridge for Tokio, ScaleWorker for the worker thread)
pub fn create_scale_bridge() -> (ScaleBridge, ScaleWorker) {
    let (cmd_tx, cmd_rx) = bounded(16);
    let (event_tx, event_rx) = bounded(256);

    (
        ScaleBridge { cmd_tx, event_rx },
        ScaleWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_scale_bridge();

        let handle = std::thread::spawn(move || {
            worker
                .send_event(ScaleEvent::Measurement {
                    weight: WeightMeasurement::from_raw(100, -2),
                })
                .unwrap();
        });

        let event = bridge.recv_event().await.unwrap();
        assert_eq!(
            event,
            ScaleEvent::Measurement {
                weight: WeightMeasurement::from_raw(100, -2)
            }
        );
        handle.join().unwrap();
    }

    #[test]
    fn test_closed_command_channel_means_shutdown() {
        let (bridge, worker) = create_scale_bridge();
        assert_eq!(worker.try_recv_command(), None);

        drop(bridge);
        assert_eq!(worker.try_recv_command(), Some(ScaleCommand::Shutdown));
    }
}
