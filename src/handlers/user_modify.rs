use super::UserDirectory;
use crate::err::*;
use crate::handler::Action;
use crate::packet::ActionPacket;
use crate::task::TaskStatus;
use async_trait::async_trait;

pub const REQUEST_USER_MODIFY: &str = "request_user_modify";

const ACTION_TYPES: &[&str] = &["replace", "delete"];

/// Handles a `request_user_modify` packet: changes the attributes of a person known to both sites.
pub struct UserModify;

#[async_trait]
impl<C> Action<C> for UserModify
where
    C: UserDirectory,
{
    async fn perform(&self, ctx: &C, packet: &ActionPacket) -> ActionResult<Option<TaskStatus>> {
        packet.field_str("person_id")?;

        let action_type = packet.field_str("action_type")?;
        if !ACTION_TYPES.contains(&action_type) {
            return Err(ActionError::InvalidField {
                field: "action_type".to_string(),
                reason: format!("expected one of {}", ACTION_TYPES.join(", ")),
            });
        }

        ctx.modify_user(packet).await
    }
}
