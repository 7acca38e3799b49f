// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event delivery for assemblies and the data loader
//!
//! Listeners run synchronously on the orchestrating thread, in
//! subscription order, when an event is emitted.

use serde::Serialize;

use crate::keys::{AnnotationKey, ShapeKey, ShellKey};

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Box<dyn FnMut(&E)>;

pub struct EventBus<E> {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener<E>)>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener; returns false if it was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, event: &E) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Geometry arrival inside an assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyEvent {
    /// A shell included by `shape` finished loading
    ShapeLoaded { shape: ShapeKey, shell: ShellKey },
    /// An annotation included by `shape` finished loading
    AnnotationLoaded {
        shape: ShapeKey,
        annotation: AnnotationKey,
    },
}

/// Request lifecycle notifications from the data loader
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LoaderEvent {
    AddRequest {
        file: String,
    },
    /// `loaded` is a percentage when the payload length is known
    LoadProgress {
        file: String,
        loaded: Option<f64>,
    },
    LoadComplete {
        file: String,
    },
    ParseComplete {
        file: String,
    },
    RootLoad {
        file: String,
    },
    ShellLoad {
        file: String,
    },
    AnnotationLoad {
        file: String,
    },
    WorkerFinish {
        file: String,
    },
    LoadError {
        file: String,
        message: String,
    },
    QueueEmpty,
}

impl LoaderEvent {
    pub fn file(&self) -> Option<&str> {
        match self {
            LoaderEvent::AddRequest { file }
            | LoaderEvent::LoadProgress { file, .. }
            | LoaderEvent::LoadComplete { file }
            | LoaderEvent::ParseComplete { file }
            | LoaderEvent::RootLoad { file }
            | LoaderEvent::ShellLoad { file }
            | LoaderEvent::AnnotationLoad { file }
            | LoaderEvent::WorkerFinish { file }
            | LoaderEvent::LoadError { file, .. } => Some(file),
            LoaderEvent::QueueEmpty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        let sink = seen.clone();
        let id = bus.subscribe(move |e: &u32| sink.borrow_mut().push(*e));
        bus.emit(&1);
        assert!(bus.unsubscribe(id));
        bus.emit(&2);

        assert_eq!(*seen.borrow(), vec![1]);
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_loader_event_json() {
        let event = LoaderEvent::LoadProgress {
            file: "sh1.xml".to_string(),
            loaded: Some(50.0),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "loadProgress");
        assert_eq!(json["file"], "sh1.xml");
        assert_eq!(json["loaded"], 50.0);
        assert_eq!(
            serde_json::to_value(LoaderEvent::QueueEmpty).unwrap()["type"],
            "queueEmpty"
        );
    }
}
