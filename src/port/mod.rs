//! Port abstraction layer for serial communication.
//!
//! Provides the adapter trait, the real and mock implementations, and the
//! backend seam that opens them, enabling dependency injection and testing.

pub mod backend;
pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use backend::{PortBackend, SystemBackend};
pub use error::PortError;
pub use mock::{MockBackend, MockSerialPort};
pub use sync_port::*;
pub use traits::*;
