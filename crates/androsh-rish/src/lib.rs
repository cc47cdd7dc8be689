//! Remote-command transport for the privileged shell.
//!
//! Each call cold-spawns the loader with a freshly verified payload, sends a
//! single framed command and decodes `(stdout, stderr, exit_code)` from the
//! merged text that comes back.

pub mod asset;
pub mod channel;
pub mod codec;
pub mod error;
pub mod quote;
pub mod result;

pub use asset::{AssetConfig, AssetRecord, AssetStager, DEFAULT_PAYLOAD_NAME};
pub use channel::{
    APPLICATION_ID_ENV, ChannelConfig, CommandChannel, DEFAULT_APPLICATION_ID, DEFAULT_LOADER,
    Runner, default_loader_args,
};
pub use error::{ChannelError, StageError};
pub use quote::{shell_join, shell_quote};
pub use result::CommandResult;
