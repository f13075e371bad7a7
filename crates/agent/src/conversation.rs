use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::timeout;

use outdial_core::domain::call::{Speaker, TranscriptEntry};

use crate::llm::LlmClient;

const FALLBACK_GREETING: &str =
    "Hi, this is an assistant calling on behalf of our sales team. Do you have a quick moment?";
const FALLBACK_LINE: &str =
    "I'm sorry, I didn't catch that. Could you say that again?";
const CLOSING_LINE: &str =
    "Thanks so much for your time today. We'll follow up with the details shortly. Goodbye!";

/// Per-call conversation state. Created at placement, dropped once the call
/// reaches a terminal status. The transcript here mirrors what is persisted;
/// it exists so prompts can be built without a database round trip.
#[derive(Clone, Debug)]
pub struct ConversationContext {
    pub lead_name: String,
    pub knowledge_context: String,
    pub custom_script: Option<String>,
    pub transcript: Vec<TranscriptEntry>,
    pub turn_count: u32,
    pub max_turns: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    /// True when this is the last line of the call and the caller should
    /// hang up instead of gathering more speech.
    pub closing: bool,
}

/// Post-call analysis. `available` is false when the backend could not
/// produce insights; the call outcome itself is unaffected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallInsights {
    pub qualification: Option<String>,
    pub sentiment: Option<String>,
    pub objections: Vec<String>,
    pub available: bool,
}

impl CallInsights {
    pub fn unavailable() -> Self {
        Self { qualification: None, sentiment: None, objections: Vec::new(), available: false }
    }
}

pub struct ConversationEngine {
    client: Arc<dyn LlmClient>,
    backend_timeout: Duration,
}

impl ConversationEngine {
    pub fn new(client: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self { client, backend_timeout: Duration::from_secs(timeout_secs) }
    }

    pub fn initialize(
        &self,
        lead_name: impl Into<String>,
        knowledge_context: impl Into<String>,
        custom_script: Option<String>,
        max_turns: u32,
    ) -> ConversationContext {
        ConversationContext {
            lead_name: lead_name.into(),
            knowledge_context: knowledge_context.into(),
            custom_script,
            transcript: Vec::new(),
            turn_count: 0,
            max_turns,
        }
    }

    /// First line of the call. A configured script wins outright and never
    /// touches the backend; otherwise the backend writes the opener, with a
    /// fixed greeting as the floor. Never empty.
    pub async fn initial_greeting(&self, ctx: &mut ConversationContext) -> String {
        let greeting = match &ctx.custom_script {
            Some(script) => script.replace("{name}", &ctx.lead_name),
            None => {
                let prompt = greeting_prompt(ctx);
                match self.complete_bounded(&prompt).await {
                    Some(text) => text,
                    None => {
                        tracing::warn!(
                            event_name = "conversation.greeting_fallback",
                            lead_name = %ctx.lead_name,
                            "backend unavailable for greeting, using fixed line"
                        );
                        FALLBACK_GREETING.to_string()
                    }
                }
            }
        };

        ctx.transcript.push(TranscriptEntry::now(Speaker::Agent, greeting.clone()));
        greeting
    }

    /// One lead utterance in, one agent line out. The turn ceiling is checked
    /// before the backend is consulted; at the ceiling the fixed closing line
    /// is returned and the call should end. Never errors past this boundary.
    pub async fn process_turn(
        &self,
        ctx: &mut ConversationContext,
        lead_utterance: &str,
    ) -> TurnReply {
        ctx.transcript.push(TranscriptEntry::now(Speaker::Lead, lead_utterance.to_string()));

        if ctx.turn_count >= ctx.max_turns {
            tracing::info!(
                event_name = "conversation.turn_ceiling",
                turn_count = ctx.turn_count,
                max_turns = ctx.max_turns,
                "turn ceiling reached, closing the call"
            );
            ctx.transcript.push(TranscriptEntry::now(Speaker::Agent, CLOSING_LINE.to_string()));
            return TurnReply { text: CLOSING_LINE.to_string(), closing: true };
        }

        let prompt = turn_prompt(ctx);
        let text = match self.complete_bounded(&prompt).await {
            Some(text) => text,
            None => {
                tracing::warn!(
                    event_name = "conversation.turn_fallback",
                    turn_count = ctx.turn_count,
                    "backend unavailable for turn, using fallback line"
                );
                FALLBACK_LINE.to_string()
            }
        };

        ctx.transcript.push(TranscriptEntry::now(Speaker::Agent, text.clone()));
        ctx.turn_count += 1;
        TurnReply { text, closing: false }
    }

    /// Post-call summary. Failure here is absorbed: the call already ended
    /// and insights are strictly additive.
    pub async fn summarize(&self, ctx: &ConversationContext) -> CallInsights {
        if ctx.transcript.is_empty() {
            return CallInsights::unavailable();
        }

        let prompt = summary_prompt(ctx);
        let Some(raw) = self.complete_bounded(&prompt).await else {
            return CallInsights::unavailable();
        };

        match serde_json::from_str::<RawInsights>(extract_json(&raw)) {
            Ok(parsed) => CallInsights {
                qualification: parsed.qualification,
                sentiment: parsed.sentiment,
                objections: parsed.objections.unwrap_or_default(),
                available: true,
            },
            Err(error) => {
                tracing::warn!(
                    event_name = "conversation.insights_unparseable",
                    error = %error,
                    "backend summary was not valid json"
                );
                CallInsights::unavailable()
            }
        }
    }

    async fn complete_bounded(&self, prompt: &str) -> Option<String> {
        match timeout(self.backend_timeout, self.client.complete(prompt)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(Ok(_)) => None,
            Ok(Err(error)) => {
                tracing::warn!(
                    event_name = "conversation.backend_error",
                    error = %error,
                    "backend completion failed"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    event_name = "conversation.backend_timeout",
                    timeout_secs = self.backend_timeout.as_secs(),
                    "backend completion timed out"
                );
                None
            }
        }
    }
}

fn greeting_prompt(ctx: &ConversationContext) -> String {
    format!(
        "You are a friendly sales agent on a live phone call.\n\n{}\n\nOpen the call with a short, \
         natural greeting for a lead named {}. One or two sentences, spoken language only.",
        ctx.knowledge_context, ctx.lead_name
    )
}

fn turn_prompt(ctx: &ConversationContext) -> String {
    format!(
        "You are a friendly sales agent on a live phone call with {}.\n\n{}\n\nConversation so \
         far:\n{}\n\nReply with the agent's next spoken line only. Keep it short and \
         conversational; answer questions using the company information above.",
        ctx.lead_name,
        ctx.knowledge_context,
        render_transcript(ctx)
    )
}

fn summary_prompt(ctx: &ConversationContext) -> String {
    format!(
        "Analyze this completed sales call with {}.\n\nTranscript:\n{}\n\nRespond with json only: \
         {{\"qualification\": \"hot|warm|cold\", \"sentiment\": \"positive|neutral|negative\", \
         \"objections\": [\"...\"]}}",
        ctx.lead_name,
        render_transcript(ctx)
    )
}

fn render_transcript(ctx: &ConversationContext) -> String {
    let mut output = String::new();
    for entry in &ctx.transcript {
        let speaker = match entry.speaker {
            Speaker::Agent => "Agent",
            Speaker::Lead => "Lead",
        };
        output.push_str(speaker);
        output.push_str(": ");
        output.push_str(&entry.text);
        output.push('\n');
    }
    output
}

/// Backends wrap json in markdown fences often enough that stripping them is
/// table stakes.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_fence = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_fence.trim_end_matches("```").trim()
}

#[derive(Deserialize)]
struct RawInsights {
    qualification: Option<String>,
    sentiment: Option<String>,
    objections: Option<Vec<String>>,
}
