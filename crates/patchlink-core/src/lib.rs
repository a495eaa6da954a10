//! Patchlink-Core: command dispatch for a USB-attached audio patch device.
//!
//! Everything the host asks of the device (heartbeats, control-dial values,
//! file-system operations, firmware uploads) goes through one serializing
//! dispatcher, so at most one device transaction is ever outstanding and each
//! acknowledgment can be matched to the command that caused it.
//!
//! # Architecture
//!
//! - **Protocol**: Acknowledgment frames, tokens, status codes, firmware header, CRC32
//! - **Transport**: Transport trait, acknowledgment router, mock transport
//! - **Command**: GUI / serial / shell command taxonomy and per-command state
//! - **Link**: The single-phase transact primitive (arm, register, transmit, wait)
//! - **Transfer**: Chunked open/append/close uploads
//! - **Admission**: Gating of commands around long operations
//! - **Processor**: Bounded queue, processor thread, periodic producers
//! - **Events**: Observer pattern for UI decoupling
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use patchlink_core::{Command, Dispatcher, DispatcherConfig, MockTransport, TracingObserver};
//!
//! let dispatcher = Dispatcher::new(
//!     Arc::new(MockTransport::new()),
//!     Arc::new(TracingObserver),
//!     DispatcherConfig::default(),
//! );
//! dispatcher.start();
//! let outcome = dispatcher.offer_and_wait(Command::start_patch(), Duration::from_secs(5));
//! assert!(outcome.is_some_and(|o| o.success));
//! ```

pub mod admission;
pub mod barrier;
pub mod command;
pub mod config;
pub mod events;
pub mod link;
pub mod processor;
pub mod protocol;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use admission::{AdmissionClass, AdmissionController};
pub use barrier::{Barrier, CancelToken, WaitError};
pub use command::{
    Command, CommandError, CommandState, Completion, ControlSource, Outcome, Phase, SerialKind,
    ShellPurpose, ShellTask,
};
pub use config::DispatcherConfig;
pub use events::{
    CommandEvent, CommandObserver, GuiAction, LogLevel, NullObserver, RecordingObserver,
    TracingObserver,
};
pub use processor::{Dispatcher, OfferResult};
pub use protocol::{AckEvent, FirmwareHeader, StatusCode, crc32};
pub use transfer::{FileUpload, FirmwareUpload, TransferSource};
pub use transport::{DeviceRequest, DeviceTransport, MockTransport, TransportError};
