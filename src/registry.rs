use crate::err::*;
use crate::handler::{Action, ActionHandler, Handler};
use crate::packet::PacketType;
use std::{collections::HashMap, sync::Arc};

/// Collects handler bindings at startup. Call `seal` once every handler is registered to get the `Registry`
/// used for dispatch. No binding can be added after sealing.
pub struct RegistryBuilder<C> {
    ctx: Arc<C>,
    handlers: HashMap<PacketType, Arc<dyn Handler>>,
}

impl<C> RegistryBuilder<C>
where
    C: Send + Sync + 'static,
{
    /// `ctx` is the site adapter shared by all handlers built through this registry.
    pub fn new(ctx: Arc<C>) -> Self {
        RegistryBuilder {
            ctx,
            handlers: HashMap::new(),
        }
    }

    pub fn context(&self) -> &Arc<C> {
        &self.ctx
    }

    /// Bind the handler built by `factory` to `packet_type`. Errors if the type is already bound, or if packets
    /// of this type end a transaction and so could never be answered.
    pub fn register<H, F>(&mut self, packet_type: &str, factory: F) -> AmieResult<&mut Self>
    where
        H: Handler + 'static,
        F: FnOnce(PacketType, Arc<C>) -> H,
    {
        let packet_type = PacketType::new(packet_type)?;
        packet_type.reply_type()?;
        if self.handlers.contains_key(&packet_type) {
            return Err(AmieError::DuplicateBinding(packet_type));
        }

        let handler = factory(packet_type.clone(), self.ctx.clone());
        debug!("Registered handler for {}", &packet_type);
        self.handlers.insert(packet_type, Arc::new(handler));
        Ok(self)
    }

    /// Bind `action` to `packet_type` through an `ActionHandler`.
    pub fn register_action<A>(&mut self, packet_type: &str, action: A) -> AmieResult<&mut Self>
    where
        A: Action<C>,
    {
        self.register(packet_type, |packet_type, ctx| {
            ActionHandler::new(packet_type, ctx, action)
        })
    }

    pub fn seal(self) -> Registry {
        info!("Handler registry sealed with {} bindings", self.handlers.len());
        Registry {
            handlers: Arc::new(self.handlers),
        }
    }
}

/// The sealed map from packet type to handler. Cheap to clone and safe to share between concurrent
/// dispatches.
#[derive(Clone)]
pub struct Registry {
    handlers: Arc<HashMap<PacketType, Arc<dyn Handler>>>,
}

impl Registry {
    /// Gets the handler bound to `packet_type`.
    pub fn lookup(&self, packet_type: &PacketType) -> AmieResult<Arc<dyn Handler>> {
        self.handlers
            .get(packet_type)
            .cloned()
            .ok_or_else(|| AmieError::UnknownAction(packet_type.clone()))
    }

    pub fn contains(&self, packet_type: &PacketType) -> bool {
        self.handlers.contains_key(packet_type)
    }

    /// The bound packet types in sorted order.
    pub fn packet_types(&self) -> Vec<PacketType> {
        let mut packet_types = self.handlers.keys().cloned().collect::<Vec<_>>();
        packet_types.sort();
        packet_types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
