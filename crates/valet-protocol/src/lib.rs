pub mod messages;

pub use messages::{ErrorShape, InboundMessage, OutboundMessage};
