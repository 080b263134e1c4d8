//! Media store client for chat attachments.
//!
//! Attachments never travel over the chat socket. Outbound files are
//! uploaded to the media store first and referenced by the identifier it
//! returns; inbound envelopes carry a store path that is downloaded into a
//! local directory before the message reaches the agent runtime.
//!
//! The [`MediaTransfer`] trait is the seam the gateway depends on;
//! [`MediaClient`] is the `reqwest` implementation.

pub mod client;
pub mod error;
pub mod types;

// Re-export primary types for convenience.
pub use client::{MediaClient, MediaFuture, MediaTransfer};
pub use error::MediaError;
pub use types::DownloadedMedia;
