//! Frame event streams for async consumers

use futures::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;
use trackbridge_media::FrameEvent;

/// Stream of buffer replacement events of one receive track
///
/// A slow consumer that falls more than the channel capacity behind skips
/// the events it missed; only the latest buffer matters.
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<FrameEvent>,
    missed: u64,
}

impl EventStream {
    /// Wrap a track's event receiver
    pub fn new(receiver: broadcast::Receiver<FrameEvent>) -> Self {
        Self {
            receiver,
            missed: 0,
        }
    }

    /// Get the next event, or `None` once the track is gone
    pub async fn next(&mut self) -> Option<FrameEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<FrameEvent>, TryRecvError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Ok(Some(event)),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Closed) => return Err(TryRecvError::Closed),
            }
        }
    }

    /// Events skipped because the consumer fell behind
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Convert into a [`Stream`]
    pub fn into_stream(self) -> impl Stream<Item = FrameEvent> {
        stream::unfold(self, |mut events| async move {
            events.next().await.map(|event| (event, events))
        })
    }

    fn record_lag(&mut self, skipped: u64) {
        warn!("Frame event consumer lagged, skipped {} events", skipped);
        self.missed += skipped;
    }
}
