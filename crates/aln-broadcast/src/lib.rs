//! Broadcast layer (§4.10): turns the closed set of in-process
//! [`DomainEvent`](aln_types::DomainEvent)s into the one outbound wire shape
//! (`{event, data, timestamp}`) and fans each one out to every connected GM
//! console, except the two unicast replies (`transaction:result`,
//! `batch:ack`) that go to exactly the socket that asked.

pub mod layer;
pub mod registry;
pub mod video_status;

pub use layer::BroadcastLayer;
pub use registry::{ConsoleRegistry, ConsoleSink, SendError};
pub use video_status::{VideoStatus, VideoStatusKind};
