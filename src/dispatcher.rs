use crate::err::*;
use crate::handler::Outcome;
use crate::packet::{ActionPacket, CorrelationId, ReplyPacket};
use crate::registry::Registry;
use crate::task::{TaskStatus, TaskStore};
use futures::future::join_all;

/// What the transport should do with the result of handling a packet.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    /// Send this reply to the peer site.
    Transmit(ReplyPacket),
    /// Keep this task until the work it waits on is done. Nothing is sent yet.
    Persist(TaskStatus),
}

impl From<Outcome> for Response {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Pending(task) => Response::Persist(task),
            Outcome::Reply(reply) => Response::Transmit(reply),
        }
    }
}

/// Routes packets to the handler bound to their type.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Registry,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Dispatcher { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run the handler bound to the packet's type and return its outcome unchanged.
    pub async fn dispatch(&self, packet: &ActionPacket) -> AmieResult<Outcome> {
        debug!("Dispatch {} #{}", packet.packet_type(), packet.correlation());
        let handler = self.registry.lookup(packet.packet_type())?;
        handler.work(packet).await
    }

    /// Dispatch several packets concurrently. Results are in the order of `packets`.
    pub async fn dispatch_all(&self, packets: &[ActionPacket]) -> Vec<AmieResult<Outcome>> {
        join_all(packets.iter().map(|p| self.dispatch(p))).await
    }

    /// Dispatch a packet and keep any task it leaves outstanding in `store`. The correlation id is reserved in
    /// the store before the action runs, so a second request for the same transaction is turned away instead
    /// of running the action again.
    pub async fn dispatch_tracked(
        &self,
        packet: &ActionPacket,
        store: &impl TaskStore,
    ) -> AmieResult<Outcome> {
        store
            .insert_pending(TaskStatus::pending(packet, "in progress"))
            .await?;

        match self.dispatch(packet).await {
            Ok(Outcome::Pending(task)) => {
                store.replace(task.clone()).await;
                info!("Task stored: {}", &task);
                Ok(Outcome::Pending(task))
            }
            Ok(outcome) => {
                store.take(packet.correlation()).await;
                Ok(outcome)
            }
            Err(e) => {
                store.take(packet.correlation()).await;
                Err(e)
            }
        }
    }

    /// Re-run the action for a stored task once the work it waited on is done. The task stays stored while
    /// the action runs. A reply closes the task; a new outstanding status replaces the stored one; an error
    /// leaves the task as it was so the resumption can be retried.
    pub async fn resume(
        &self,
        correlation: &CorrelationId,
        store: &impl TaskStore,
    ) -> AmieResult<Outcome> {
        let task = store
            .get(correlation)
            .await
            .ok_or_else(|| AmieError::UnknownTask(correlation.clone()))?;
        info!("Resume task: {}", &task);

        let packet = task.into_packet();
        let outcome = self.dispatch(&packet).await?;

        match &outcome {
            Outcome::Pending(task) => {
                store.replace(task.clone()).await;
                info!("Task still outstanding: {}", task);
            }
            Outcome::Reply(_) => {
                if let Err(e) = store.close(correlation).await {
                    warn!("Close task after resume failed: {}", &e);
                }
            }
        }
        Ok(outcome)
    }

    /// Handle a packet for the transport. Unknown actions and action failures are answered with a failure
    /// reply so the peer always hears back. Other errors are returned.
    pub async fn respond(&self, packet: &ActionPacket) -> AmieResult<Response> {
        match self.dispatch(packet).await {
            Ok(outcome) => Ok(outcome.into()),
            Err(e) if e.is_protocol_rejection() => {
                warn!(
                    "Rejected {} #{}: {}",
                    packet.packet_type(),
                    packet.correlation(),
                    &e
                );
                Ok(Response::Transmit(packet.create_failure_reply(&e)))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::err::{ActionError, ActionResult};
    use crate::handler::Action;
    use crate::packet::{PacketBody, PacketType};
    use crate::registry::RegistryBuilder;
    use crate::task::MemoryTaskStore;
    use crate::STATUS_FAILED;
    use async_trait::async_trait;
    use std::sync::{atomic::{AtomicBool, Ordering}, Arc};

    #[derive(Default)]
    struct Site {
        approved: AtomicBool,
    }

    struct AwaitApproval;

    #[async_trait]
    impl Action<Site> for AwaitApproval {
        async fn perform(&self, ctx: &Site, packet: &ActionPacket) -> ActionResult<Option<TaskStatus>> {
            if ctx.approved.load(Ordering::SeqCst) {
                Ok(None)
            } else {
                Ok(Some(TaskStatus::blocked_on_operator(packet, "awaiting approval")))
            }
        }
    }

    struct Ldap {
        store: Arc<MemoryTaskStore>,
        down: AtomicBool,
    }

    struct ModifyOverLdap;

    #[async_trait]
    impl Action<Ldap> for ModifyOverLdap {
        async fn perform(&self, ctx: &Ldap, packet: &ActionPacket) -> ActionResult<Option<TaskStatus>> {
            if !ctx.down.load(Ordering::SeqCst) {
                return Ok(Some(TaskStatus::pending(packet, "queued")));
            }

            // a retransmitted request for the same transaction arrives meanwhile
            let _ = ctx
                .store
                .insert_pending(TaskStatus::pending(packet, "retransmit"))
                .await;
            Err(ActionError::Directory("ldap down".into()))
        }
    }

    fn setup() -> (Arc<Site>, Dispatcher) {
        let site = Arc::new(Site::default());
        let mut builder = RegistryBuilder::new(site.clone());
        builder.register_action("request_user_modify", AwaitApproval).unwrap();
        (site, Dispatcher::new(builder.seal()))
    }

    fn packet(packet_type: &str, correlation: &str) -> ActionPacket {
        ActionPacket::new(
            PacketType::new(packet_type).unwrap(),
            correlation.into(),
            PacketBody::new(),
        )
    }

    #[tokio::test]
    async fn test_dispatch_tracked_rejects_second_outstanding_task() {
        let (_site, dispatcher) = setup();
        let store = MemoryTaskStore::new();
        let packet = packet("request_user_modify", "R1");

        let outcome = dispatcher.dispatch_tracked(&packet, &store).await.unwrap();
        assert!(outcome.is_pending());

        let err = dispatcher.dispatch_tracked(&packet, &store).await.unwrap_err();
        assert_eq!(AmieError::TaskAlreadyPending("R1".into()), err);
        assert_eq!(1, store.pending().await.len());
    }

    #[tokio::test]
    async fn test_resume_completes_task() {
        let (site, dispatcher) = setup();
        let store = MemoryTaskStore::new();
        let packet = packet("request_user_modify", "R1");
        dispatcher.dispatch_tracked(&packet, &store).await.unwrap();

        // still waiting, the task stays stored
        let outcome = dispatcher.resume(packet.correlation(), &store).await.unwrap();
        assert!(outcome.is_pending());
        assert!(store.get(packet.correlation()).await.is_some());

        site.approved.store(true, Ordering::SeqCst);
        let outcome = dispatcher.resume(packet.correlation(), &store).await.unwrap();
        match outcome {
            Outcome::Reply(reply) => assert_eq!(packet.correlation(), reply.correlation()),
            Outcome::Pending(task) => panic!("unexpected pending task {}", task),
        }
        assert!(store.get(packet.correlation()).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_resume_returns_action_error_and_keeps_task() {
        let store = Arc::new(MemoryTaskStore::new());
        let ldap = Arc::new(Ldap {
            store: store.clone(),
            down: AtomicBool::new(false),
        });
        let mut builder = RegistryBuilder::new(ldap.clone());
        builder.register_action("request_user_modify", ModifyOverLdap).unwrap();
        let dispatcher = Dispatcher::new(builder.seal());

        let packet = packet("request_user_modify", "R1");
        dispatcher.dispatch_tracked(&packet, &*store).await.unwrap();

        ldap.down.store(true, Ordering::SeqCst);
        let err = dispatcher
            .resume(packet.correlation(), &*store)
            .await
            .unwrap_err();
        assert_eq!(AmieError::Action(ActionError::Directory("ldap down".into())), err);

        let task = store.get(packet.correlation()).await.unwrap();
        assert_eq!("queued", task.description());
    }

    #[tokio::test]
    async fn test_dispatch_tracked_releases_reservation_on_reply() {
        let (site, dispatcher) = setup();
        site.approved.store(true, Ordering::SeqCst);
        let store = MemoryTaskStore::new();
        let packet = packet("request_user_modify", "R1");

        let outcome = dispatcher.dispatch_tracked(&packet, &store).await.unwrap();
        assert!(!outcome.is_pending());
        assert!(store.get(packet.correlation()).await.is_none());
    }

    #[tokio::test]
    async fn test_resume_unknown_task() {
        let (_site, dispatcher) = setup();
        let store = MemoryTaskStore::new();
        let err = dispatcher.resume(&"R9".into(), &store).await.unwrap_err();
        assert_eq!(AmieError::UnknownTask("R9".into()), err);
    }

    #[tokio::test]
    async fn test_respond_rejects_unknown_action() {
        let (_site, dispatcher) = setup();
        let packet = packet("request_unicorn_modify", "R1");

        match dispatcher.respond(&packet).await.unwrap() {
            Response::Transmit(reply) => {
                assert_eq!("R1", reply.correlation().as_str());
                assert_eq!(Some(STATUS_FAILED), reply.status_code());
            }
            Response::Persist(task) => panic!("unexpected task {}", task),
        }
    }

    #[tokio::test]
    async fn test_respond_persists_pending_task() {
        let (_site, dispatcher) = setup();
        let packet = packet("request_user_modify", "R1");
        let response = dispatcher.respond(&packet).await.unwrap();
        assert_eq!(
            Response::Persist(TaskStatus::blocked_on_operator(&packet, "awaiting approval")),
            response
        );
    }

    #[tokio::test]
    async fn test_dispatch_all_keeps_order() {
        let (site, dispatcher) = setup();
        site.approved.store(true, Ordering::SeqCst);
        let packets = vec![
            packet("request_user_modify", "R1"),
            packet("request_unicorn_modify", "R2"),
            packet("request_user_modify", "R3"),
        ];

        let results = dispatcher.dispatch_all(&packets).await;
        assert_eq!("R1", results[0].as_ref().unwrap().correlation().as_str());
        assert!(matches!(results[1], Err(AmieError::UnknownAction(_))));
        assert_eq!("R3", results[2].as_ref().unwrap().correlation().as_str());
    }
}
