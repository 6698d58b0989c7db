//! Handlers for the account management actions this site supports.
//!
//! The actions delegate the account changes themselves to a `UserDirectory`, the site adapter that knows how
//! local person records are stored.

pub mod person_merge;
pub mod user_modify;

use crate::err::*;
use crate::packet::ActionPacket;
use crate::registry::RegistryBuilder;
use crate::task::TaskStatus;
use async_trait::async_trait;

pub use person_merge::{PersonMerge, REQUEST_PERSON_MERGE};
pub use user_modify::{UserModify, REQUEST_USER_MODIFY};

/// Access to the local site's person records.
///
/// Each method either applies the change and returns `None`, or returns a `TaskStatus` describing what the
/// change is waiting on.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    async fn modify_user(&self, packet: &ActionPacket) -> ActionResult<Option<TaskStatus>>;

    async fn merge_person(
        &self,
        keep_person_id: &str,
        delete_person_id: &str,
        packet: &ActionPacket,
    ) -> ActionResult<Option<TaskStatus>>;
}

/// Register the handler for every action in this module.
pub fn install<C>(builder: &mut RegistryBuilder<C>) -> AmieResult<()>
where
    C: UserDirectory,
{
    builder
        .register_action(REQUEST_USER_MODIFY, UserModify)?
        .register_action(REQUEST_PERSON_MERGE, PersonMerge)?;
    Ok(())
}
