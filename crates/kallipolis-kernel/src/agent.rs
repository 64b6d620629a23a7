//! Agents: named roles wrapping a system framing and a text-generation call.
//!
//! Agents hold no conversation state. The orchestrator hands each call the
//! context it needs and records the reply; agents never touch the transcript.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GenerationUnavailable;
use crate::roster::Participant;
use crate::turn::Turn;

/// A chat message with role and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One completion request as seen by the generation backend.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    /// Name of the agent asking, for backends that route or script by speaker
    pub agent: &'a str,
    pub system_prompt: &'a str,
    pub messages: &'a [ChatMessage],
}

/// The external text-generation capability.
///
/// Implementations return one completion or a single
/// [`GenerationUnavailable`]; they never retry on their own.
pub trait TextGenerator: Send + Sync {
    fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> impl Future<Output = Result<String, GenerationUnavailable>> + Send;
}

/// Build the chat context an agent sees from the turns recorded so far.
///
/// The agent's own earlier turns come back as `assistant` messages; everyone
/// else's are `user` messages prefixed with the speaker's name. `cue` is the
/// directed question for this call and goes last.
pub fn build_context(own_name: &str, history: &[Turn], cue: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .map(|t| {
            if t.speaker == own_name {
                ChatMessage::assistant(t.message.clone())
            } else {
                ChatMessage::user(format!("{}: {}", t.speaker, t.message))
            }
        })
        .collect();

    if !cue.is_empty() {
        messages.push(ChatMessage::user(cue));
    }
    messages
}

/// A role-playing agent.
pub struct Agent<G> {
    participant: Participant,
    system_prompt: String,
    generator: Arc<G>,
    timeout: Duration,
}

impl<G: TextGenerator> Agent<G> {
    pub fn new(
        participant: Participant,
        system_prompt: impl Into<String>,
        generator: Arc<G>,
        timeout: Duration,
    ) -> Self {
        Self {
            participant,
            system_prompt: system_prompt.into(),
            generator,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.participant.name
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }


    /// Produce one response for the given context.
    ///
    /// Fails with [`GenerationUnavailable`] when the backend errors, times
    /// out, or returns only whitespace. The returned text is trimmed.
    pub async fn respond(&self, context: &[ChatMessage]) -> Result<String, GenerationUnavailable> {
        let request = CompletionRequest {
            agent: &self.participant.name,
            system_prompt: &self.system_prompt,
            messages: context,
        };

        let text = tokio::time::timeout(self.timeout, self.generator.complete(request))
            .await
            .map_err(|_| GenerationUnavailable::timed_out(self.timeout))??;

        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationUnavailable::empty());
        }

        debug!(agent = %self.participant.name, chars = text.len(), "Agent responded");
        Ok(text.to_string())
    }
}
