pub mod broker;
pub mod document;
pub mod email;
pub mod error;
pub mod providers;
pub mod search;
pub mod tool;
pub mod voice;

pub use broker::ToolBroker;
pub use error::{BrokerError, Result};
pub use tool::{ToolDescriptor, ToolServer, ToolStatus};
