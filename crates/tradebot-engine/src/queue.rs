//! Message merging for the engine loop.

use tokio::sync::mpsc;
use tradebot_core::types::{FeedItem, Fill};

/// One message for the engine loop.
#[derive(Debug)]
pub enum EngineMessage {
    /// A feed item from the data source.
    Feed(FeedItem),
    /// An execution report from the broker.
    Fill(Fill),
    /// Stop request from the handle.
    Stop,
}

/// Merges the feed, fill, and control channels into one sequential
/// message stream.
///
/// Priority is stop > fills > feed: a stop request preempts everything
/// else, and a fill that has already arrived is always delivered before
/// the next market event, so the portfolio is up to date when the
/// strategy next runs. Within each channel, order is FIFO.
pub struct EngineQueue {
    feed: mpsc::Receiver<FeedItem>,
    fills: mpsc::Receiver<Fill>,
    stop: mpsc::Receiver<()>,
    feed_open: bool,
    fills_open: bool,
}

impl EngineQueue {
    pub fn new(
        feed: mpsc::Receiver<FeedItem>,
        fills: mpsc::Receiver<Fill>,
        stop: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            feed,
            fills,
            stop,
            feed_open: true,
            fills_open: true,
        }
    }

    /// Receive the next message, or `None` once both feed and fill
    /// channels are closed and empty.
    pub async fn next(&mut self) -> Option<EngineMessage> {
        loop {
            if !self.feed_open && !self.fills_open {
                return None;
            }
            tokio::select! {
                biased;
                Some(()) = self.stop.recv() => {
                    return Some(EngineMessage::Stop);
                }
                fill = self.fills.recv(), if self.fills_open => {
                    match fill {
                        Some(fill) => return Some(EngineMessage::Fill(fill)),
                        None => self.fills_open = false,
                    }
                }
                item = self.feed.recv(), if self.feed_open => {
                    match item {
                        Some(item) => return Some(EngineMessage::Feed(item)),
                        None => self.feed_open = false,
                    }
                }
                else => return None,
            }
        }
    }

    /// Receive only fill messages, for the drain phase. Returns `None`
    /// when the fill channel is closed and empty.
    pub async fn next_fill(&mut self) -> Option<Fill> {
        if !self.fills_open {
            return None;
        }
        let fill = self.fills.recv().await;
        if fill.is_none() {
            self.fills_open = false;
        }
        fill
    }
}
