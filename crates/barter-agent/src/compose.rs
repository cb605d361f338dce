//! Outbound letter composition.
//!
//! The model writes the friendly part of a letter; everything that matters
//! for the deal (subject, terms footer, acceptance phrase) is deterministic.
//! Any inference failure or unusable text falls back to [`fallback::body`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use barter_types::{AgentPhase, Framing, Participant, Terms};

use crate::fallback::{self, LetterKind};
use crate::llm::{GenerationRequest, InferenceBackend, InferenceClient};
use crate::prompt::PromptEngine;
use crate::strategy::RejectionReason;

/// Longest generated body accepted, in characters.
const MAX_BODY_CHARS: usize = 600;

/// The footer is ours; generation stops before the model writes one.
const FOOTER_STOPS: &[&str] = &["[OFFER]", "[REQUEST]"];

/// Phrases that mark a refusal or meta-commentary instead of a letter.
const UNUSABLE_MARKERS: &[&str] = &[
    "as an ai",
    "as a language model",
    "i cannot help",
    "i can't help",
    "[offer]",
    "[request]",
    "```",
];

/// Everything needed to write one letter.
#[derive(Debug, Clone, Copy)]
pub struct LetterContext<'a> {
    /// Kind of letter.
    pub kind: LetterKind,
    /// Who receives it.
    pub recipient: &'a Participant,
    /// Terms from the agent's perspective, if the letter carries any.
    pub terms: Option<&'a Terms>,
    /// Why we decline, for rejections.
    pub reason: Option<RejectionReason>,
    /// Persuasion framing.
    pub framing: Framing,
    /// Our current objective.
    pub phase: AgentPhase,
}

/// A finished letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLetter {
    /// Subject line.
    pub subject: String,
    /// Body including any terms footer.
    pub body: String,
    /// Whether the body came from the template instead of the model.
    pub used_fallback: bool,
}

#[derive(Serialize)]
struct ComposeContext<'a> {
    alias: &'a str,
    phase: &'static str,
    recipient: &'a str,
    give: String,
    ask: String,
    framing: &'static str,
    reason: &'static str,
}

/// Writes letters, preferring the model and falling back to templates.
pub struct Composer {
    alias: String,
    prompts: Arc<PromptEngine>,
    max_tokens: u32,
}

impl Composer {
    /// Create a composer signing as `alias`.
    pub fn new(alias: impl Into<String>, prompts: Arc<PromptEngine>, max_tokens: u32) -> Self {
        Self {
            alias: alias.into(),
            prompts,
            max_tokens,
        }
    }

    /// Compose one letter. Never fails.
    pub async fn compose<B: InferenceBackend>(
        &self,
        inference: &InferenceClient<B>,
        ctx: &LetterContext<'_>,
    ) -> OutboundLetter {
        let (text, used_fallback) = match self.generate(inference, ctx).await {
            Some(text) => (text, false),
            None => (
                fallback::body(
                    ctx.kind,
                    ctx.recipient.as_str(),
                    ctx.terms,
                    ctx.reason,
                    ctx.framing,
                ),
                true,
            ),
        };

        let body = match ctx.terms {
            Some(terms) if ctx.kind != LetterKind::Rejection => {
                format!("{text}\n\n{}", fallback::footer(ctx.kind, terms))
            }
            _ => text,
        };

        debug!(
            kind = ctx.kind.label(),
            recipient = %ctx.recipient,
            used_fallback,
            "letter composed"
        );
        OutboundLetter {
            subject: fallback::subject(ctx.kind, ctx.terms),
            body,
            used_fallback,
        }
    }

    async fn generate<B: InferenceBackend>(
        &self,
        inference: &InferenceClient<B>,
        ctx: &LetterContext<'_>,
    ) -> Option<String> {
        let render_ctx = ComposeContext {
            alias: &self.alias,
            phase: ctx.phase.label(),
            recipient: ctx.recipient.as_str(),
            give: ctx.terms.map(fallback::give_text).unwrap_or_default(),
            ask: ctx.terms.map(fallback::ask_text).unwrap_or_default(),
            framing: ctx.framing.label(),
            reason: ctx.reason.map_or("", RejectionReason::text),
        };
        let prompt = match self.prompts.render(ctx.kind.prompt(), &render_ctx) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, kind = ctx.kind.label(), "letter prompt failed to render");
                return None;
            }
        };
        let request =
            GenerationRequest::from_prompt(prompt, self.max_tokens).with_stop(FOOTER_STOPS);
        match inference.ask(&request).await {
            Ok(text) if is_usable(&text) => Some(text),
            Ok(text) => {
                warn!(kind = ctx.kind.label(), chars = text.chars().count(), "generated letter rejected");
                None
            }
            Err(e) => {
                warn!(error = %e, kind = ctx.kind.label(), "letter generation fell back to template");
                None
            }
        }
    }
}

/// Whether generated text can go out as a letter body.
fn is_usable(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_BODY_CHARS {
        return false;
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return false;
    }
    let lower = trimmed.to_lowercase();
    !UNUSABLE_MARKERS.iter().any(|marker| lower.contains(marker))
}
