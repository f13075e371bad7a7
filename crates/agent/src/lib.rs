//! Conversation engine for live outbound calls.
//!
//! This crate is the "voice" of the system: given a lead, the company's
//! knowledge context, and a generative backend behind the [`llm::LlmClient`]
//! seam, it produces every line the agent speaks on a call.
//!
//! # Safety principle
//!
//! The backend is strictly a text generator. It never decides whether a call
//! continues: the turn ceiling, the closing line, and every fallback are
//! enforced here, deterministically. A slow or failing backend degrades to a
//! fixed utterance; it never drops a live call.

pub mod conversation;
pub mod llm;

pub use conversation::{CallInsights, ConversationContext, ConversationEngine, TurnReply};
pub use llm::{LlmClient, OpenAiCompatClient};
