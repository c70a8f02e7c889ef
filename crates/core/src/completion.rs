//! The text-completion capability every pipeline stage talks to.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CompletionError;

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model name recorded in summary metadata.
    fn model(&self) -> &str;

    /// Run one prompt and return the reply parsed as JSON.
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<Value, CompletionError>;
}

/// `complete` bounded by `timeout`; an expired call is a completion failure.
pub async fn complete_within(
    client: &dyn CompletionClient,
    prompt: &str,
    temperature: f32,
    timeout: Duration,
) -> Result<Value, CompletionError> {
    match tokio::time::timeout(timeout, client.complete(prompt, temperature)).await {
        Ok(result) => result,
        Err(_) => Err(CompletionError::Timeout(timeout)),
    }
}

/// Parse a model reply as JSON, tolerating code fences and prose around the object.
pub fn parse_json_content(content: &str) -> Result<Value, CompletionError> {
    let trimmed = strip_code_fence(content.trim());

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let embedded = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            return Err(CompletionError::Unparseable {
                reason: "no JSON object in reply".to_string(),
            });
        }
    };

    serde_json::from_str(embedded).map_err(|e| CompletionError::Unparseable {
        reason: e.to_string(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the language tag line, e.g. ```json
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Read a JSON array of strings, skipping blanks and non-string items.
pub(crate) fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use serde_json::Value;

    use super::CompletionClient;
    use crate::error::CompletionError;

    type Responder = Box<dyn Fn(&str) -> Result<Value, CompletionError> + Send + Sync>;

    /// Completion mock that answers by the first marker found in the prompt.
    pub(crate) struct ScriptedCompletion {
        routes: Vec<(&'static str, Responder)>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedCompletion {
        pub(crate) fn new() -> Self {
            Self {
                routes: Vec::new(),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        pub(crate) fn on(
            mut self,
            marker: &'static str,
            responder: impl Fn(&str) -> Result<Value, CompletionError> + Send + Sync + 'static,
        ) -> Self {
            self.routes.push((marker, Box::new(responder)));
            self
        }

        pub(crate) fn reply(self, marker: &'static str, value: Value) -> Self {
            self.on(marker, move |_| Ok(value.clone()))
        }

        pub(crate) fn fail(self, marker: &'static str) -> Self {
            self.on(marker, |_| {
                Err(CompletionError::Unparseable {
                    reason: "scripted failure".to_string(),
                })
            })
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn prompts_containing(&self, marker: &str) -> Vec<String> {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.contains(marker))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletion {
        fn model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(&self, prompt: &str, _temperature: f32) -> Result<Value, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.routes
                .iter()
                .find(|(marker, _)| prompt.contains(marker))
                .map(|(_, responder)| responder(prompt))
                .unwrap_or_else(|| {
                    Err(CompletionError::Unparseable {
                        reason: "no scripted route".to_string(),
                    })
                })
        }
    }
}
