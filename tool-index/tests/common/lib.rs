//! Shared test doubles for the tool index and vector store integration
//! tests.

use std::sync::{Arc, Mutex, PoisonError};

use toolhub_embeddings::{EmbeddingEvent, EventSink};

mod store;
mod transport;

pub use store::FakeStore;
pub use transport::{ScriptedFactory, ScriptedTransport, unit_vector};

/// Sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EmbeddingEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<EmbeddingEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events matching `predicate`.
    pub fn matching(&self, predicate: impl Fn(&EmbeddingEvent) -> bool) -> Vec<EmbeddingEvent> {
        self.events().into_iter().filter(|e| predicate(e)).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EmbeddingEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
