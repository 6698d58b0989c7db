use crate::err::*;
use crate::packet::{ActionPacket, CorrelationId, PacketBody, PacketType, ReplyPacket};
use crate::task::TaskStatus;
use async_trait::async_trait;
use std::sync::Arc;

/// The result of handling a packet: either the work is outstanding, or it is done and the reply is ready.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Pending(TaskStatus),
    Reply(ReplyPacket),
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }

    pub fn correlation(&self) -> &CorrelationId {
        match self {
            Outcome::Pending(task) => task.correlation(),
            Outcome::Reply(reply) => reply.correlation(),
        }
    }
}

/// The business logic for one action type. `C` is the site adapter giving access to local accounts.
///
/// Returns `Some(TaskStatus)` if the action cannot complete now, e.g. because an operator must decide
/// something first. Any changes made before returning a status must be complete or safe to repeat when the
/// task is resumed.
#[async_trait]
pub trait Action<C>: Send + Sync + 'static
where
    C: Send + Sync + 'static,
{
    async fn perform(&self, ctx: &C, packet: &ActionPacket) -> ActionResult<Option<TaskStatus>>;

    /// Fields to put in the reply once the action has completed.
    fn reply_fields(&self, _packet: &ActionPacket) -> PacketBody {
        PacketBody::new()
    }
}

/// Handles packets of exactly one type.
#[async_trait]
pub trait Handler: Send + Sync {
    fn packet_type(&self) -> &PacketType;

    /// Do the work for `packet`. The caller must only pass packets of this handler's type.
    async fn work(&self, packet: &ActionPacket) -> AmieResult<Outcome>;
}

/// A `Handler` that runs an `Action` against a shared site adapter.
pub struct ActionHandler<C, A> {
    packet_type: PacketType,
    ctx: Arc<C>,
    action: A,
}

impl<C, A> ActionHandler<C, A>
where
    C: Send + Sync + 'static,
    A: Action<C>,
{
    pub fn new(packet_type: PacketType, ctx: Arc<C>, action: A) -> Self {
        ActionHandler {
            packet_type,
            ctx,
            action,
        }
    }
}

#[async_trait]
impl<C, A> Handler for ActionHandler<C, A>
where
    C: Send + Sync + 'static,
    A: Action<C>,
{
    fn packet_type(&self) -> &PacketType {
        &self.packet_type
    }

    async fn work(&self, packet: &ActionPacket) -> AmieResult<Outcome> {
        // an outstanding task must never be masked by a reply
        if let Some(task) = self.action.perform(&self.ctx, packet).await? {
            return Ok(Outcome::Pending(task));
        }

        let reply = packet.create_reply(self.action.reply_fields(packet))?;
        Ok(Outcome::Reply(reply))
    }
}
