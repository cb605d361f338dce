//! Prompt template loading and rendering via `minijinja`.
//!
//! Templates ship inside the binary (`templates/*.j2`). Operators can
//! override any of them by pointing `inference.templates_dir` at a
//! directory holding files with the same names; missing files fall back to
//! the built-in version.

use std::path::Path;

use minijinja::Environment;
use serde::Serialize;
use tracing::debug;

use crate::error::AgentError;

/// Built-in templates, by name.
const BUILTIN: &[(&str, &str)] = &[
    ("system", include_str!("../templates/system.j2")),
    ("classify", include_str!("../templates/classify.j2")),
    ("proposal", include_str!("../templates/proposal.j2")),
    ("counter", include_str!("../templates/counter.j2")),
    ("rejection", include_str!("../templates/rejection.j2")),
    ("confirmation", include_str!("../templates/confirmation.j2")),
];

/// Which user prompt to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Classify an inbound letter into a JSON verdict.
    Classify,
    /// Open a new trade.
    Proposal,
    /// Answer an offer with different terms.
    Counter,
    /// Decline an offer.
    Rejection,
    /// Confirm a closed deal.
    Confirmation,
}

impl PromptKind {
    const fn template(self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Proposal => "proposal",
            Self::Counter => "counter",
            Self::Rejection => "rejection",
            Self::Confirmation => "confirmation",
        }
    }
}

/// The complete rendered prompt ready to send to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// System message establishing who the agent is.
    pub system: String,
    /// Task-specific user message.
    pub user: String,
}

/// Manages prompt template loading and rendering.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Engine with only the built-in templates.
    pub fn builtin() -> Result<Self, AgentError> {
        Self::new(None)
    }

    /// Engine with built-in templates, overridden by `*.j2` files found in
    /// `templates_dir`.
    pub fn new(templates_dir: Option<&Path>) -> Result<Self, AgentError> {
        let mut env = Environment::new();
        for (name, source) in BUILTIN {
            let override_path = templates_dir.map(|dir| dir.join(format!("{name}.j2")));
            match override_path.filter(|path| path.is_file()) {
                Some(path) => {
                    let source = std::fs::read_to_string(&path).map_err(|e| {
                        AgentError::Template(format!("failed to read {}: {e}", path.display()))
                    })?;
                    debug!(template = name, path = %path.display(), "template override loaded");
                    env.add_template_owned(*name, source).map_err(|e| {
                        AgentError::Template(format!("failed to add {name} template: {e}"))
                    })?;
                }
                None => {
                    env.add_template(name, source).map_err(|e| {
                        AgentError::Template(format!("failed to add {name} template: {e}"))
                    })?;
                }
            }
        }
        Ok(Self { env })
    }

    /// Render the system prompt plus the `kind` user prompt against `ctx`.
    pub fn render<S: Serialize>(&self, kind: PromptKind, ctx: &S) -> Result<RenderedPrompt, AgentError> {
        Ok(RenderedPrompt {
            system: self.render_one("system", ctx)?,
            user: self.render_one(kind.template(), ctx)?,
        })
    }

    fn render_one<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String, AgentError> {
        self.env
            .get_template(name)
            .map_err(|e| AgentError::Template(format!("missing {name} template: {e}")))?
            .render(ctx)
            .map(|text| text.trim().to_owned())
            .map_err(|e| AgentError::Template(format!("{name} render failed: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_templates_render() {
        let engine = PromptEngine::builtin().unwrap();
        let ctx = serde_json::json!({
            "alias": "trader",
            "phase": "acquiring_resources",
            "recipient": "bob",
            "give": "2 wood",
            "ask": "1 iron",
            "framing": "scarcity",
        });
        let prompt = engine.render(PromptKind::Proposal, &ctx).unwrap();
        assert!(prompt.system.contains("trader"));
        assert!(prompt.system.contains("collecting resources"));
        assert!(prompt.user.contains("2 wood"));
        assert!(prompt.user.contains("limited"));
    }

    #[test]
    fn classify_mentions_suspicion_only_when_present() {
        let engine = PromptEngine::builtin().unwrap();
        let mut ctx = serde_json::json!({
            "sender": "eve",
            "text": "hello",
            "resources": ["wood", "stone"],
        });
        let plain = engine.render(PromptKind::Classify, &ctx).unwrap();
        assert!(!plain.user.contains("suspicious"));
        assert!(plain.user.contains("wood, stone"));

        ctx["suspicion"] = serde_json::json!("pressure");
        let flagged = engine.render(PromptKind::Classify, &ctx).unwrap();
        assert!(flagged.user.contains("suspicious phrasing (pressure)"));
    }

    #[test]
    fn directory_overrides_single_template() {
        let dir = std::env::temp_dir().join(format!("barter-prompts-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("rejection.j2"), "No thanks, {{ recipient }}.").unwrap();

        let engine = PromptEngine::new(Some(&dir)).unwrap();
        let ctx = serde_json::json!({"alias": "me", "recipient": "bob", "reason": "x"});
        assert_eq!(
            engine.render(PromptKind::Rejection, &ctx).unwrap().user,
            "No thanks, bob."
        );
        // Other templates keep the built-in text.
        let confirmation = engine.render(PromptKind::Confirmation, &ctx).unwrap();
        assert!(confirmation.user.contains("confirming"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
