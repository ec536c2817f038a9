//! Segment delivery and progressive playback

pub mod channel;
pub mod feeder;
pub mod poller;

pub use channel::{job_channel, JobChannel, JobReceiver, OutputBlob, WorkerMessage};
pub use feeder::{FeedReport, PlaybackFeeder};
pub use poller::{SegmentPoller, DEFAULT_POLL_INTERVAL};
