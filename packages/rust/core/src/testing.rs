//! Scripted generator for phase, repair and controller tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;

use mvpfactory_generation::{Generator, ModelRole};
use mvpfactory_shared::{FactoryError, Result};

/// Replies queued per role. A role with an empty queue answers with its
/// fallback reply when one is set, otherwise with a generation error.
#[derive(Default)]
pub struct ScriptedGenerator {
    queues: Mutex<HashMap<ModelRole, VecDeque<std::result::Result<String, String>>>>,
    fallbacks: HashMap<ModelRole, String>,
    calls: Mutex<Vec<(ModelRole, String)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one successful reply for `role`.
    pub fn with(self, role: ModelRole, reply: &str) -> Self {
        self.push(role, Ok(reply.to_string()))
    }

    /// Queue one failed call for `role`.
    pub fn with_failure(self, role: ModelRole, message: &str) -> Self {
        self.push(role, Err(message.to_string()))
    }

    /// Reply used for `role` once its queue is empty.
    pub fn with_fallback(mut self, role: ModelRole, reply: &str) -> Self {
        self.fallbacks.insert(role, reply.to_string());
        self
    }

    fn push(self, role: ModelRole, reply: std::result::Result<String, String>) -> Self {
        if let Ok(mut queues) = self.queues.lock() {
            queues.entry(role).or_default().push_back(reply);
        }
        self
    }

    /// Number of calls made for `role`.
    pub fn calls_for(&self, role: ModelRole) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|(r, _)| *r == role).count())
            .unwrap_or(0)
    }

    /// Prompts sent for `role`, in order.
    pub fn prompts_for(&self, role: ModelRole) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|(r, _)| *r == role)
                    .map(|(_, p)| p.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn next(&self, role: ModelRole, prompt: &str) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((role, prompt.to_string()));
        }
        let queued = self
            .queues
            .lock()
            .ok()
            .and_then(|mut queues| queues.get_mut(&role).and_then(VecDeque::pop_front));

        match queued {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(FactoryError::Generation(message)),
            None => self
                .fallbacks
                .get(&role)
                .cloned()
                .ok_or_else(|| FactoryError::Generation(format!("no scripted reply for {role}"))),
        }
    }
}

impl Generator for ScriptedGenerator {
    fn generate(
        &self,
        role: ModelRole,
        prompt: &str,
    ) -> impl Future<Output = Result<String>> + Send {
        std::future::ready(self.next(role, prompt))
    }
}
