pub use crate::err::*;
pub use crate::dispatcher::{Dispatcher, Response};
pub use crate::handler::{Action, Handler, Outcome};
pub use crate::packet::{ActionPacket, CorrelationId, PacketBody, PacketType, ReplyPacket};
pub use crate::registry::{Registry, RegistryBuilder};
pub use crate::task::{MemoryTaskStore, TaskState, TaskStatus, TaskStore};
