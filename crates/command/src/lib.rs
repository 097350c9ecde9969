//! Command side of the saga messaging core.
//!
//! This crate provides:
//! - [`Command`] and [`CommandMessage`] for typed command payloads
//! - [`CommandHandler`] and the [`CommandHandlers`] registry
//! - correlation of reply headers with their request
//! - Success/Failure reply building, optionally under a [`ReplyLock`]
//! - [`CommandDispatcher`], which turns inbound commands into outbound replies

pub mod command;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod headers;
pub mod outcome;
pub mod registry;
pub mod reply;

pub use command::{Command, CommandMessage, PathVariables};
pub use correlation::correlate_message_headers;
pub use dispatcher::CommandDispatcher;
pub use error::{CommandError, Result};
pub use handler::{CommandHandler, CommandHandlerBuilder, HandlerOptions};
pub use headers::{CommandMessageHeaders, ReplyMessageHeaders};
pub use outcome::{CommandReplyOutcome, Failure, HandlerOutcome, ReplyPayload, ReplyValue, Success};
pub use registry::CommandHandlers;
pub use reply::{ReplyLock, with_failure, with_lock, with_success};
