//! Type registry for dynamic channel creation

use super::packet::Packet;
use super::sender::Sender;
use crossbeam_channel::{Sender as CrossbeamSender, bounded};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

type ChannelCreatorFn =
    Box<dyn Fn(usize) -> (Box<dyn Any + Send>, Box<dyn Any + Send>) + Send + Sync>;
type OutputWrapperFn =
    Box<dyn Fn(Vec<Box<dyn Any + Send>>) -> Option<Box<dyn Any + Send>> + Send + Sync>;

/// Channel factories keyed by payload `TypeId`
pub(crate) struct TypeRegistry {
    channel_creators: HashMap<TypeId, ChannelCreatorFn>,
    output_wrappers: HashMap<TypeId, OutputWrapperFn>,
}

impl TypeRegistry {
    fn new() -> Self {
        Self {
            channel_creators: HashMap::new(),
            output_wrappers: HashMap::new(),
        }
    }

    /// Register a payload type for use in channels
    fn register<T: Send + Sync + 'static>(&mut self) {
        let type_id = TypeId::of::<T>();

        self.channel_creators.insert(
            type_id,
            Box::new(|buffer_size: usize| {
                let (tx, rx) = bounded::<Packet<T>>(buffer_size);
                (
                    Box::new(tx) as Box<dyn Any + Send>,
                    Box::new(rx) as Box<dyn Any + Send>,
                )
            }),
        );

        // An empty list yields a sender for an unconnected output
        self.output_wrappers.insert(
            type_id,
            Box::new(|senders: Vec<Box<dyn Any + Send>>| {
                let typed = senders
                    .into_iter()
                    .map(|sender| {
                        sender
                            .downcast::<CrossbeamSender<Packet<T>>>()
                            .ok()
                            .map(|tx| *tx)
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(Box::new(Sender::new(typed)) as Box<dyn Any + Send>)
            }),
        );
    }

    pub(crate) fn create_channel(
        &self,
        type_id: TypeId,
        buffer_size: usize,
    ) -> Option<(Box<dyn Any + Send>, Box<dyn Any + Send>)> {
        self.channel_creators
            .get(&type_id)
            .map(|creator| creator(buffer_size))
    }

    pub(crate) fn wrap_output(
        &self,
        type_id: TypeId,
        senders: Vec<Box<dyn Any + Send>>,
    ) -> Option<Box<dyn Any + Send>> {
        self.output_wrappers.get(&type_id)?(senders)
    }
}

// Global type registry
lazy_static::lazy_static! {
    pub(crate) static ref TYPE_REGISTRY: Mutex<TypeRegistry> = {
        let mut registry = TypeRegistry::new();
        registry.register::<crate::matrix::Matrix>();
        Mutex::new(registry)
    };
}

/// Register a payload type for use in pipelines.
/// Call this before building pipelines that stream custom types.
pub fn register_type<T: Send + Sync + 'static>() {
    TYPE_REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .register::<T>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use crossbeam_channel::Receiver;

    #[test]
    fn test_matrix_registered_by_default() {
        let registry = TYPE_REGISTRY.lock().unwrap();
        let (tx, rx) = registry
            .create_channel(TypeId::of::<Matrix>(), 1)
            .expect("Matrix channels available");
        assert!(tx.downcast_ref::<CrossbeamSender<Packet<Matrix>>>().is_some());
        assert!(rx.downcast_ref::<Receiver<Packet<Matrix>>>().is_some());
    }

    #[test]
    fn test_unregistered_type_has_no_channel() {
        struct Unregistered;
        let registry = TYPE_REGISTRY.lock().unwrap();
        assert!(registry
            .create_channel(TypeId::of::<Unregistered>(), 1)
            .is_none());
        assert!(registry
            .wrap_output(TypeId::of::<Unregistered>(), Vec::new())
            .is_none());
    }

    #[test]
    fn test_wrap_output_without_destinations() {
        register_type::<u16>();
        let registry = TYPE_REGISTRY.lock().unwrap();
        let sender = registry
            .wrap_output(TypeId::of::<u16>(), Vec::new())
            .expect("u16 registered");
        let sender = sender.downcast_ref::<Sender<u16>>().unwrap();
        assert_eq!(sender.num_destinations(), 0);
    }
}
