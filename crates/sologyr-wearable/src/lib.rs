//! Watch sync for Sologyr
//!
//! Encodes weather state as dictionary packets and mirrors it to a paired
//! watch over an acknowledged, rate-limited link.

pub mod engine;
pub mod error;
pub mod keys;
pub mod packet;
pub mod series;
pub mod session;
pub mod transport;

pub use engine::{BulkOutcome, EngineSettings, Followup, SyncEngine, WearableEvent};
pub use error::{PacketError, SyncError, TransportError};
pub use packet::{Packet, Value};
pub use series::{Clock, FixedClock, LocalClock, SeriesClock, SeriesLimits};
pub use session::{SyncSession, Transition};
pub use transport::{HostSnapshot, SyncHost, Transport};
