use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use toolhub_embeddings::{
    Embedding, EmbeddingError, EmbeddingSettings, EmbeddingTransport, Result, TransportFactory,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unit vector of `width` with a 1.0 at `hot % width`.
pub fn unit_vector(width: usize, hot: usize) -> Embedding {
    let mut v = vec![0.0; width];
    if width > 0 {
        v[hot % width] = 1.0;
    }
    v
}

enum Reply {
    Vector(Embedding),
    Failure,
}

/// Transport returning canned vectors.
///
/// Rules are matched in insertion order against the request text; the
/// first rule whose pattern the text contains decides the reply.
pub struct ScriptedTransport {
    rules: Mutex<Vec<(String, Reply)>>,
    default: Mutex<Reply>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    /// Reply `default` to every request.
    pub fn new(default: Embedding) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default: Mutex::new(Reply::Vector(default)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every request not matched by a rule.
    pub fn failing() -> Self {
        let transport = Self::new(Vec::new());
        *lock(&transport.default) = Reply::Failure;
        transport
    }

    /// Reply `vector` to texts containing `pattern`.
    pub fn respond(self, pattern: &str, vector: Embedding) -> Self {
        lock(&self.rules).push((pattern.to_string(), Reply::Vector(vector)));
        self
    }

    /// Fail texts containing `pattern`.
    pub fn fail(self, pattern: &str) -> Self {
        lock(&self.rules).push((pattern.to_string(), Reply::Failure));
        self
    }

    /// Change the default reply.
    pub fn set_default(&self, vector: Embedding) {
        *lock(&self.default) = Reply::Vector(vector);
    }

    /// `(text, model)` of every request so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.calls).clone()
    }
}

fn reply(reply: &Reply) -> Result<Embedding> {
    match reply {
        Reply::Vector(v) => Ok(v.clone()),
        Reply::Failure => Err(EmbeddingError::ApiStatus {
            status: 503,
            body: "unavailable".to_string(),
        }),
    }
}

#[async_trait]
impl EmbeddingTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Embedding> {
        lock(&self.calls).push((text.to_string(), model.to_string()));

        let rules = lock(&self.rules);
        match rules.iter().find(|(pattern, _)| text.contains(pattern.as_str())) {
            Some((_, r)) => reply(r),
            None => reply(&lock(&self.default)),
        }
    }
}

/// Factory handing out one shared [`ScriptedTransport`] and recording the
/// settings it was asked for.
pub struct ScriptedFactory {
    transport: Arc<ScriptedTransport>,
    requests: Mutex<Vec<EmbeddingSettings>>,
}

impl ScriptedFactory {
    pub fn new(transport: Arc<ScriptedTransport>) -> Self {
        Self {
            transport,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<EmbeddingSettings> {
        lock(&self.requests).clone()
    }
}

impl TransportFactory for ScriptedFactory {
    fn transport(&self, settings: &EmbeddingSettings) -> Arc<dyn EmbeddingTransport> {
        lock(&self.requests).push(settings.clone());
        self.transport.clone()
    }
}
