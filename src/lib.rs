//! Streaming chat client with Markdown rendering and persisted history, plus
//! the relay server it talks to.

// Safety and hygiene
#![deny(unsafe_code)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(unused_imports)]
#![warn(unused_variables)]
#![deny(unused_must_use)]
#![deny(nonstandard_style)]
#![deny(overflowing_literals)]
// Clippy discipline
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::cognitive_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

/// HTTP client for the chat backend.
pub mod client;
/// Conversations, messages and their persistence.
pub mod conversations;
/// Error types.
pub mod error;
/// Request and response bodies.
pub mod protocol;
/// Markdown-subset renderer.
pub mod render;
/// HTTP relay server and its routes.
#[allow(clippy::missing_errors_doc, clippy::unused_async)]
pub mod server;
/// Send orchestration for one chat window.
pub mod session;
/// Entry helpers for the binaries.
pub mod start;
/// Stream framing and event decoding.
pub mod stream;

pub use error::{ChatError, ChatResult};
