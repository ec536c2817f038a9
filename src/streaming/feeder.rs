//! Streaming playback feeder
//!
//! Consumes a job channel and appends segments to a [`PlaybackSink`] strictly
//! in index order, one at a time. Segments that arrive early wait in a reorder
//! buffer until every earlier index has been appended.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::{ClipperError, ClipperResult};
use crate::ports::PlaybackSink;
use crate::streaming::channel::{JobReceiver, WorkerMessage};

/// Result of a completed feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedReport {
    pub appended: u64,
    pub duration: f64,
}

pub struct PlaybackFeeder<S: PlaybackSink> {
    sink: S,
    pending: BTreeMap<u64, Vec<u8>>,
    next_index: u64,
    segment_seconds: f64,
    finalized: bool,
}

impl<S: PlaybackSink> PlaybackFeeder<S> {
    pub fn new(sink: S, segment_seconds: f64) -> Self {
        Self {
            sink,
            pending: BTreeMap::new(),
            next_index: 0,
            segment_seconds,
            finalized: false,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Segments appended so far
    pub fn appended(&self) -> u64 {
        self.next_index
    }

    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Queue a segment and append everything that is now in order
    pub async fn accept(&mut self, index: u64, payload: Vec<u8>) -> ClipperResult<()> {
        if self.finalized {
            warn!(index, "Segment after end of stream ignored");
            return Ok(());
        }
        if index < self.next_index || self.pending.contains_key(&index) {
            warn!(index, "Duplicate segment ignored");
            return Ok(());
        }
        self.pending.insert(index, payload);
        self.drain().await
    }

    async fn drain(&mut self) -> ClipperResult<()> {
        while let Some(payload) = self.pending.remove(&self.next_index) {
            let index = self.next_index;
            let position = index as f64 * self.segment_seconds;
            self.sink
                .extend_duration(position + self.segment_seconds)
                .await?;
            self.sink.set_write_offset(position).await?;
            self.sink.append(payload).await?;
            debug!(index, position, "Segment appended");
            self.next_index += 1;
        }
        Ok(())
    }

    /// Mark the stream complete once everything queued has been appended
    pub async fn finish(&mut self) -> ClipperResult<()> {
        if self.finalized {
            return Ok(());
        }
        self.drain().await?;
        if !self.pending.is_empty() {
            let missing = self.next_index;
            warn!(
                missing,
                stranded = self.pending.len(),
                "Stream ended with a gap, later segments dropped"
            );
            self.pending.clear();
        }
        self.sink.end_of_stream().await?;
        self.finalized = true;
        info!(appended = self.next_index, "Playback stream finalized");
        Ok(())
    }

    /// Feed from `receiver` until the job ends.
    ///
    /// Log and progress messages are handed to `on_message`. An error message
    /// stops feeding and is returned as the same typed error the worker saw.
    pub async fn consume<F>(
        &mut self,
        receiver: &mut JobReceiver,
        mut on_message: F,
    ) -> ClipperResult<FeedReport>
    where
        F: FnMut(&WorkerMessage) + Send,
    {
        loop {
            let Some(message) = receiver.recv().await else {
                return Err(ClipperError::ChannelClosed);
            };
            match message {
                WorkerMessage::Segment { index, payload } => self.accept(index, payload).await?,
                WorkerMessage::Done { .. } => {
                    self.finish().await?;
                    return Ok(FeedReport {
                        appended: self.next_index,
                        duration: self.next_index as f64 * self.segment_seconds,
                    });
                }
                WorkerMessage::Error { detail } => return Err(detail.into()),
                other => on_message(&other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<String>,
        appended: Vec<Vec<u8>>,
        ended: bool,
    }

    #[async_trait]
    impl PlaybackSink for RecordingSink {
        async fn extend_duration(&mut self, seconds: f64) -> ClipperResult<()> {
            self.calls.push(format!("duration {seconds}"));
            Ok(())
        }

        async fn set_write_offset(&mut self, seconds: f64) -> ClipperResult<()> {
            self.calls.push(format!("offset {seconds}"));
            Ok(())
        }

        async fn append(&mut self, payload: Vec<u8>) -> ClipperResult<()> {
            tokio::task::yield_now().await;
            self.calls.push("append".to_string());
            self.appended.push(payload);
            Ok(())
        }

        async fn end_of_stream(&mut self) -> ClipperResult<()> {
            self.ended = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_out_of_order_arrival_is_appended_in_order() {
        let mut feeder = PlaybackFeeder::new(RecordingSink::default(), 1.0);
        feeder.accept(0, vec![0]).await.unwrap();
        feeder.accept(2, vec![2]).await.unwrap();
        assert_eq!(feeder.appended(), 1);
        assert_eq!(feeder.queued(), 1);
        feeder.accept(1, vec![1]).await.unwrap();
        feeder.finish().await.unwrap();

        let sink = feeder.into_sink();
        assert_eq!(sink.appended, vec![vec![0], vec![1], vec![2]]);
        assert!(sink.ended);
    }

    #[tokio::test]
    async fn test_sink_is_positioned_before_each_append() {
        let mut feeder = PlaybackFeeder::new(RecordingSink::default(), 2.0);
        feeder.accept(0, vec![0]).await.unwrap();
        feeder.accept(1, vec![1]).await.unwrap();
        assert_eq!(
            feeder.sink().calls,
            vec![
                "duration 2",
                "offset 0",
                "append",
                "duration 4",
                "offset 2",
                "append"
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicates_are_ignored() {
        let mut feeder = PlaybackFeeder::new(RecordingSink::default(), 1.0);
        feeder.accept(0, vec![0]).await.unwrap();
        feeder.accept(0, vec![9]).await.unwrap();
        assert_eq!(feeder.into_sink().appended, vec![vec![0]]);
    }

    #[tokio::test]
    async fn test_gap_at_end_is_dropped() {
        let mut feeder = PlaybackFeeder::new(RecordingSink::default(), 1.0);
        feeder.accept(0, vec![0]).await.unwrap();
        feeder.accept(2, vec![2]).await.unwrap();
        feeder.finish().await.unwrap();
        assert!(feeder.is_finalized());
        assert_eq!(feeder.into_sink().appended, vec![vec![0]]);
    }

    proptest! {
        #[test]
        fn appends_are_gapless_for_any_arrival_order(
            order in Just((0u64..12).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let appended = runtime.block_on(async {
                let mut feeder = PlaybackFeeder::new(RecordingSink::default(), 1.0);
                for index in &order {
                    feeder.accept(*index, vec![*index as u8]).await.unwrap();
                }
                feeder.finish().await.unwrap();
                feeder.into_sink().appended
            });
            let expected: Vec<Vec<u8>> = (0u8..12).map(|i| vec![i]).collect();
            prop_assert_eq!(appended, expected);
        }
    }
}
