//! Embedded SQS server for zipstack
//!
//! An in-memory queue service speaking the AWS JSON 1.0 protocol, with:
//! - CreateQueue, DeleteQueue, ListQueues, GetQueueUrl, PurgeQueue
//! - SendMessage, ReceiveMessage (long polling), DeleteMessage,
//!   ChangeMessageVisibility
//! - Queue attributes, including approximate message counts
//! - Visibility timeouts and strict or relaxed request limits

pub mod handlers;
pub mod limits;
mod server;
mod storage;

pub use handlers::handle_request;
pub use limits::SqsLimits;
pub use server::{router, EmbeddedSqsServer, RunningSqsServer, ServerError};
pub use storage::{md5_hex, Message, MessageCounts, Queue, SqsError, SqsState, SqsStorage};
