//! Scripted oracle used by unit tests across the crate.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient};

struct Rule {
    needles: Vec<String>,
    replies: Vec<String>,
}

/// Replays canned replies chosen by prompt substring.
///
/// The first rule whose needles all occur in the prompt answers. A rule with
/// several replies hands them out in order and then keeps repeating the last.
#[derive(Default)]
pub(crate) struct ScriptedLlm {
    rules: Mutex<Vec<Rule>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(self, needle: &str, reply: &str) -> Self {
        self.on_sequence(needle, &[reply])
    }

    pub(crate) fn on_sequence(self, needle: &str, replies: &[&str]) -> Self {
        self.push_rule(&[needle], replies)
    }

    /// Answer prompts that contain every one of `needles`.
    pub(crate) fn on_all(self, needles: &[&str], reply: &str) -> Self {
        self.push_rule(needles, &[reply])
    }

    fn push_rule(self, needles: &[&str], replies: &[&str]) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            replies: replies.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    /// Every prompt seen so far, in call order.
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub(crate) fn calls_matching(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat_completion(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        _options: ChatOptions,
    ) -> anyhow::Result<ChatResponse> {
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());

        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| r.needles.iter().all(|n| prompt.contains(n.as_str())))
            .ok_or_else(|| anyhow::anyhow!("no scripted reply for prompt: {}", prompt))?;

        let reply = if rule.replies.len() > 1 {
            rule.replies.remove(0)
        } else {
            rule.replies.first().cloned().unwrap_or_default()
        };

        Ok(ChatResponse {
            content: Some(reply),
            ..ChatResponse::default()
        })
    }
}
