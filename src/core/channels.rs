//! Inter-task channels for the sentiment pipeline

use tokio::sync::{broadcast, mpsc};

use crate::adapters::types::SentimentSample;
use crate::config::constants::{intent_channel_capacity, sample_channel_capacity};
use crate::core::trigger::ActionIntent;

/// Bundle of all inter-task communication channels
#[derive(Debug)]
pub struct ChannelBundle {
    /// Stream tasks -> ingestion task: raw samples
    pub sample_tx: mpsc::Sender<SentimentSample>,
    pub sample_rx: mpsc::Receiver<SentimentSample>,

    /// Round task -> dispatch task: confirmed intents
    pub intent_tx: mpsc::Sender<ActionIntent>,
    pub intent_rx: mpsc::Receiver<ActionIntent>,

    /// Shutdown broadcast: main -> all tasks
    pub shutdown_tx: broadcast::Sender<()>,
}

impl ChannelBundle {
    pub fn new(sample_capacity: usize, intent_capacity: usize) -> Self {
        let (sample_tx, sample_rx) = mpsc::channel(sample_capacity.max(1));
        let (intent_tx, intent_rx) = mpsc::channel(intent_capacity.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            sample_tx,
            sample_rx,
            intent_tx,
            intent_rx,
            shutdown_tx,
        }
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}

impl Default for ChannelBundle {
    /// Capacities from `SAMPLE_CHANNEL_CAPACITY` / `INTENT_CHANNEL_CAPACITY`
    fn default() -> Self {
        Self::new(sample_channel_capacity(), intent_channel_capacity())
    }
}
