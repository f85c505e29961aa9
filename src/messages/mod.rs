//! Message Scheduling
//!
//! Queue of decided auto-responses and the worker that delivers them.

pub mod delivery;
pub mod outbound;

pub use delivery::delivery_loop;
pub use outbound::{Dispatcher, ScheduledSend};
