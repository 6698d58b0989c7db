//! # AMIE dispatch
//!
//! The dispatch and continuation core of an AMIE site: the part of the account management protocol engine
//! that decides what happens to each packet received from a peer site.
//!
//! An inbound packet names an action, e.g. `request_user_modify`. The packet is routed to the handler bound
//! to that action, the handler does the work and the result is one of:
//!
//! - a reply packet, correlated to the request, to send back to the peer, or
//! - a task status, saying the action cannot complete yet (e.g. an operator must approve it). The task is
//!   kept until the work it waits on is done, then resumed to produce the reply.
//!
//! ## Registering handlers
//!
//! Handlers are registered once at startup with a `RegistryBuilder`. Each packet type may be bound to exactly
//! one handler. Sealing the builder gives the immutable `Registry` used for dispatch.
//!
//! ```ignore
//! use amie_dispatch::prelude::*;
//!
//! struct Lookup;
//!
//! #[async_trait::async_trait]
//! impl Action<MySite> for Lookup {
//!     async fn perform(&self, site: &MySite, packet: &ActionPacket) -> ActionResult<Option<TaskStatus>> {
//!         match site.needs_review(packet) {
//!             true => Ok(Some(TaskStatus::blocked_on_operator(packet, "review"))),
//!             false => Ok(None),
//!         }
//!     }
//! }
//!
//! let mut builder = RegistryBuilder::new(Arc::new(MySite::new()));
//! builder.register_action("request_account_create", Lookup)?;
//! // registering the same packet type again fails with `AmieError::DuplicateBinding`
//! let dispatcher = Dispatcher::new(builder.seal());
//! ```
//!
//! ## Dispatching
//!
//! ```ignore
//! let packet = ActionPacket::from_json(&line)?;
//! match dispatcher.respond(&packet).await? {
//!     Response::Transmit(reply) => transport.send(reply).await?,
//!     Response::Persist(task) => tasks.insert_pending(task).await?,
//! }
//! ```
//!
//! `Dispatcher::dispatch` returns the handler's `Outcome` unchanged and fails with `AmieError::UnknownAction`
//! for a packet type nobody handles. `Dispatcher::respond` turns such failures into a failed
//! `inform_transaction_complete` reply so that the peer always hears back.
//!
//! ## Resuming tasks
//!
//! `Dispatcher::dispatch_tracked` stores outstanding tasks in a `TaskStore`, which holds at most one
//! outstanding task per correlation id. `Dispatcher::resume` re-runs the stored action later.

pub mod dispatcher;
pub mod handler;
pub mod handlers;
pub mod packet;
pub mod prelude;
pub mod registry;
pub mod task;
pub(crate) mod err;

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;


pub use err::*;
pub use dispatcher::{Dispatcher, Response};
pub use handler::{Action, ActionHandler, Handler, Outcome};
pub use packet::{ActionPacket, CorrelationId, PacketBody, PacketType, ReplyPacket};
pub use registry::{Registry, RegistryBuilder};
pub use task::{MemoryTaskStore, Resumption, TaskState, TaskStatus, TaskStore};

/// The reply that ends a transaction.
pub const INFORM_TRANSACTION_COMPLETE: &str = "inform_transaction_complete";

pub const STATUS_SUCCESS: &str = "Success";
pub const STATUS_FAILED: &str = "Failed";
