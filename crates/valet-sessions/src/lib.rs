pub mod error;
pub mod janitor;
pub mod registry;
pub mod types;

pub use error::{Result, SessionError};
pub use registry::SessionRegistry;
pub use types::{Outbound, SessionHandle};
