//! Blocking client for the Playlab conversation API.
//!
//! A [`PlaylabClient`] holds one active conversation. Replies arrive as
//! server-sent events (`data: {"delta": "..."}` lines); the [`sse`] module
//! parses them and the [`reassembler`] joins the deltas while forwarding each
//! one to a callback or the presenter as it arrives.
//!
//! ```no_run
//! use playlab_client::prelude::*;
//!
//! # fn main() -> Result<(), PlaylabError> {
//! let client = PlaylabClient::connect(ClientConfig::from_env()?.verbose(false))?;
//!
//! let mut print_chunk = |chunk: &str| print!("{chunk}");
//! let reply = client.stream_message("Hello!", Some(&mut print_chunk), BodyEncoding::Json)?;
//! println!();
//!
//! for message in client.list_messages()? {
//!     println!("{:?}: {}", message.source, message.content);
//! }
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

/// File attachments for multipart uploads.
pub mod attachment;
/// Client configuration and environment lookup.
pub mod config;
/// Public error type.
pub mod errors;
/// Conversation messages and instruction variables.
pub mod message;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Rendering of assistant output.
pub mod presenter;
pub mod reassembler;
/// Conversation session client.
pub mod session;
pub mod sse;
/// HTTP transport contract and reqwest implementation.
pub mod transport;

pub use attachment::Attachment;
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use errors::PlaylabError;
pub use message::{InstructionValue, InstructionVariables, Message, MessageSource};
pub use observability::init_observability;
pub use presenter::{DisplayMode, MarkdownPresenter, PlainPresenter, Presenter};
pub use reassembler::{AccumulatedResponse, StreamReassembler};
pub use session::{ClientBuilder, PlaylabClient, SendOptions};
pub use sse::StreamEvent;
pub use transport::{ApiRequest, BodyEncoding, HttpResponse, RequestBody, ReqwestTransport, Transport};
