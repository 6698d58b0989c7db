use super::UserDirectory;
use crate::err::*;
use crate::handler::Action;
use crate::packet::ActionPacket;
use crate::task::TaskStatus;
use async_trait::async_trait;

pub const REQUEST_PERSON_MERGE: &str = "request_person_merge";

/// Handles a `request_person_merge` packet: folds the records of one person into another.
pub struct PersonMerge;

#[async_trait]
impl<C> Action<C> for PersonMerge
where
    C: UserDirectory,
{
    async fn perform(&self, ctx: &C, packet: &ActionPacket) -> ActionResult<Option<TaskStatus>> {
        let keep = packet.field_str("keep_person_id")?;
        let delete = packet.field_str("delete_person_id")?;
        if keep == delete {
            return Err(ActionError::InvalidTarget(format!(
                "cannot merge person {} into itself",
                keep
            )));
        }

        ctx.merge_person(keep, delete, packet).await
    }
}
