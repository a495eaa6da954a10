//! Transport layer module.

pub mod mock;
pub mod request;
pub mod router;
pub mod traits;

pub use mock::{AckScript, MockTransport};
pub use request::{ControlValue, DeviceRequest};
pub use router::{AckRouter, DeviceResponse};
pub use traits::{DeviceTransport, TransportError};
