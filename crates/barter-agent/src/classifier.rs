//! Inbound message classification.
//!
//! Most letters are settled by cheap deterministic checks. The inference
//! backend is consulted only for the free-form remainder, and every failure
//! there degrades to [`Classification::Informational`].
//!
//! Pipeline, first match wins:
//!
//! ```text
//!   system notice ──> Informational
//!   red flags >= final hits ──> Scam
//!   red flags >= suspicion hits ──> Scam if the model confirms, else continue
//!   rejection or negated acceptance, no proposal language ──> Rejection
//!   unconditional acceptance ──> Acceptance (oldest open deal)
//!   short, no proposal language ──> Informational
//!   extractable terms ──> CounterOffer
//!   model verdict ──> any, or Informational on failure
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use barter_ledger::NegotiationLedger;
use barter_types::{
    Classification, MAX_DESPERATION, Message, Participant, ScamReason, Terms,
};

use crate::config::{AgentConfig, ClassifierConfig};
use crate::error::AgentError;
use crate::llm::{GenerationRequest, InferenceBackend, InferenceClient};
use crate::parse::{Verdict, VerdictLabel, parse_verdict};
use crate::prompt::{PromptEngine, PromptKind};
use crate::terms::TermExtractor;

// ---------------------------------------------------------------------------
// Phrase lists (matched on lower-cased text, at word boundaries)
// ---------------------------------------------------------------------------

const UPFRONT_TRANSFER: &[&str] = &[
    "send me",
    "send first",
    "you send first",
    "send it first",
    "pay first",
    "pay me first",
    "envíame",
    "enviame",
    "envía primero",
    "envia primero",
    "mándame",
    "mandame",
    "manda primero",
    "primero tú",
    "primero tu",
    "transfer me",
    "transfiéreme",
    "transfiereme",
];

const FREE_RESOURCES: &[&str] = &[
    "free gold",
    "free resources",
    "for free",
    "no trade needed",
    "nothing in return",
    "no strings attached",
    "giveaway",
    "gratis",
    "regalo",
    "te regalo",
    "sin nada a cambio",
    "sin intercambio",
    "oro gratis",
    "double your",
    "duplica tu",
];

const IMPERSONATION: &[&str] = &[
    "system error",
    "system bug",
    "error del sistema",
    "fallo del sistema",
    "bug",
    "admin",
    "administrator",
    "administrador",
    "moderator",
    "moderador",
    "refund",
    "reembolso",
    "official notice",
    "aviso oficial",
    "your account",
    "tu cuenta",
];

const PRESSURE: &[&str] = &[
    "last chance",
    "only today",
    "today only",
    "right now",
    "immediately",
    "expires",
    "before it's too late",
    "última oportunidad",
    "ultima oportunidad",
    "solo hoy",
    "ahora mismo",
    "inmediatamente",
    "envía ya",
    "envia ya",
    "antes de que sea tarde",
    "se acaba",
];

const BLIND_TRUST: &[&str] = &[
    "trust me",
    "confía",
    "confia",
    "confía en mí",
    "i promise",
    "prometo",
    "te lo prometo",
    "pay you later",
    "pay you back",
    "te pago después",
    "te pago despues",
    "transfiero después",
    "transfiero despues",
    "i'll send later",
    "guaranteed",
    "garantizado",
];

const REJECTION: &[&str] = &[
    "no thanks",
    "no, thanks",
    "no thank you",
    "not interested",
    "i decline",
    "i reject",
    "no deal",
    "i'll pass",
    "no gracias",
    "no, gracias",
    "no me interesa",
    "rechazo",
    "no acepto",
    "no hay trato",
    "sin trato",
    "yo paso",
    "paso, gracias",
    "paso gracias",
    "esta vez paso",
    "paso de tu oferta",
];

const ACCEPTANCE: &[&str] = &[
    "deal accepted",
    "accept the deal",
    "accept your offer",
    "i accept",
    "accepted",
    "it's a deal",
    "its a deal",
    "acepto el trato",
    "acepto la oferta",
    "acepto tu oferta",
    "acepto",
    "trato hecho",
    "aceptado",
];

/// Machine-readable terms tags. Confirmations carry them too.
const FOOTER_TAGS: &[&str] = &["[offer]", "[request]", "[ofrezco]", "[pido]"];

/// Free-text offer language.
const PROPOSAL_PHRASES: &[&str] = &[
    "i give",
    "i offer",
    "i'll give",
    "te doy",
    "te paso",
    "te ofrezco",
    "ofrezco",
    "in exchange",
    "a cambio",
    "how about",
    "what about",
    "instead",
    "qué tal",
    "que tal",
    "en su lugar",
    "counter",
    "contraoferta",
];

/// Words that attach a condition to an acceptance.
const CONDITIONS: &[&str] = &[
    "if you",
    "only if",
    "provided",
    "as long as",
    "unless",
    "but",
    "solo si",
    "sólo si",
    "si me",
    "si tú",
    "siempre que",
    "a menos que",
    "pero",
];

/// Words that negate a following acceptance phrase.
const NEGATIONS: &[&str] = &[
    "not", "no", "never", "cannot", "can't", "can’t", "cant", "don't", "don’t", "dont", "won't",
    "won’t", "wont", "couldn't", "wouldn't", "unable", "nunca", "jamás", "jamas", "tampoco", "ni",
];

/// How many words before an acceptance phrase a negation may sit.
const NEGATION_WINDOW: usize = 3;

const SYSTEM_NOTICE_PREFIXES: &[&str] = &[
    "[system]",
    "[sistema]",
    "you have received",
    "package received",
    "has recibido",
    "paquete recibido",
    "paquete entregado",
];

const URGENCY: &[&str] = &[
    "urgent",
    "urgente",
    "asap",
    "now",
    "ahora",
    "hurry",
    "quickly",
    "rápido",
    "rapido",
    "cuanto antes",
];

const PLEADING: &[&str] = &[
    "please",
    "pls",
    "por favor",
    "porfa",
    "i beg",
    "te lo ruego",
    "help me",
    "ayúdame",
    "ayudame",
];

const SUPERLATIVE: &[&str] = &[
    "desperately",
    "desperate",
    "desesperadamente",
    "desesperado",
    "really really",
    "extremely",
    "badly",
    "muchísimo",
    "muchisimo",
    "muy muy",
];

const EXPLANATION: &[&str] = &["because", "since", "porque", "ya que", "es que"];

/// Bodies longer than this with explanation words count as over-explaining.
const OVER_EXPLANATION_CHARS: usize = 280;

/// Words that start instruction lines ("reply 'deal accepted' to close").
const INSTRUCTION_WORDS: &[&str] = &["reply", "respond", "responde", "contesta", "if you accept", "si aceptas"];

/// Byte offsets where `phrase` occurs in `haystack` at word boundaries.
fn phrase_starts<'a>(haystack: &'a str, phrase: &'a str) -> impl Iterator<Item = usize> + 'a {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    haystack.match_indices(phrase).filter_map(move |(start, matched)| {
        let before_ok = haystack
            .get(..start)
            .and_then(|s| s.chars().next_back())
            .is_none_or(|c| !is_word(c) || !phrase.starts_with(is_word));
        let after_ok = haystack
            .get(start.saturating_add(matched.len())..)
            .and_then(|s| s.chars().next())
            .is_none_or(|c| !is_word(c) || !phrase.ends_with(is_word));
        (before_ok && after_ok).then_some(start)
    })
}

/// Whether `phrase` occurs in `haystack` at word boundaries.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    phrase_starts(haystack, phrase).next().is_some()
}

fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| contains_phrase(haystack, phrase))
}

/// What the acceptance phrases in a letter amount to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptanceCue {
    /// No acceptance phrase.
    Absent,
    /// Every acceptance phrase is negated ("can't accept", "no lo acepto").
    Negated,
    /// At least one acceptance phrase stands on its own.
    Explicit,
}

/// Scan `lower` for acceptance phrases and their negations.
fn acceptance_cue(lower: &str) -> AcceptanceCue {
    let mut cue = AcceptanceCue::Absent;
    for phrase in ACCEPTANCE {
        for start in phrase_starts(lower, phrase) {
            if !negated_before(lower, start) {
                return AcceptanceCue::Explicit;
            }
            cue = AcceptanceCue::Negated;
        }
    }
    cue
}

/// Whether a negation sits in the same clause just before `start`.
fn negated_before(lower: &str, start: usize) -> bool {
    let Some(before) = lower.get(..start) else {
        return false;
    };
    for token in before.split_whitespace().rev().take(NEGATION_WINDOW) {
        if token.ends_with([',', '.', ';', ':', '!', '?']) {
            return false;
        }
        let word = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '’');
        if NEGATIONS.contains(&word) {
            return true;
        }
    }
    false
}

/// Whether an acceptance comes with strings attached or a new offer.
fn is_conditional(lower: &str) -> bool {
    contains_any(lower, CONDITIONS) || contains_any(lower, PROPOSAL_PHRASES)
}

/// Red flags found in one message.
#[derive(Debug, Default)]
struct RedFlags {
    reasons: BTreeSet<ScamReason>,
    hits: usize,
}

impl RedFlags {
    fn hit(&mut self, reason: ScamReason) {
        self.reasons.insert(reason);
        self.hits = self.hits.saturating_add(1);
    }

    fn confidence(&self, per_hit: u8) -> u8 {
        let hits = u8::try_from(self.hits).unwrap_or(u8::MAX);
        hits.saturating_mul(per_hit).min(100)
    }

    /// Comma-separated reason labels for the prompt.
    fn suspicion(&self) -> Option<String> {
        if self.reasons.is_empty() {
            return None;
        }
        let labels: Vec<&str> = self.reasons.iter().map(|reason| reason.label()).collect();
        Some(labels.join(", "))
    }
}

#[derive(Serialize)]
struct ClassifyContext<'a> {
    alias: &'a str,
    sender: &'a str,
    text: &'a str,
    suspicion: Option<String>,
    resources: Vec<&'a str>,
}

/// Turns inbound letters into [`Classification`]s.
pub struct Classifier {
    config: ClassifierConfig,
    alias: String,
    gold_key: String,
    system_senders: Vec<String>,
    participants: BTreeSet<String>,
    extractor: TermExtractor,
    impersonation: Regex,
    prompts: Arc<PromptEngine>,
    max_tokens: u32,
}

impl Classifier {
    /// Build a classifier from the agent configuration.
    pub fn new(config: &AgentConfig, prompts: Arc<PromptEngine>) -> Result<Self, AgentError> {
        let mut extractor = TermExtractor::new(&config.game.gold_key)?;
        extractor.learn(config.valuation.base_values.keys().map(String::as_str));
        Ok(Self {
            config: config.classifier,
            alias: config.identity.alias.clone(),
            gold_key: config.game.gold_key.clone(),
            system_senders: config
                .game
                .system_senders
                .iter()
                .map(|name| name.trim().to_lowercase())
                .collect(),
            participants: BTreeSet::new(),
            extractor,
            impersonation: Regex::new(
                r"\b(?:i am|i'm|this is|soy|aqu[ií] habla|habla)\s+(?:the\s+|el\s+|la\s+)?([\p{L}\d_-]+)",
            )?,
            prompts,
            max_tokens: config.inference.classify_max_tokens,
        })
    }

    /// Teach the extractor resource names seen in holdings or goals.
    pub fn learn_resources<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        self.extractor.learn(names);
    }

    /// Remember participant names for impersonation checks.
    pub fn learn_participants<'a>(&mut self, names: impl IntoIterator<Item = &'a Participant>) {
        self.participants
            .extend(names.into_iter().map(|p| p.as_str().trim().to_lowercase()));
    }

    /// The deterministic term extractor.
    pub const fn extractor(&self) -> &TermExtractor {
        &self.extractor
    }

    /// Classify one message.
    ///
    /// Only the sender's profile in `ledger` is touched.
    pub async fn classify<B: InferenceBackend>(
        &self,
        message: &Message,
        ledger: &mut NegotiationLedger,
        inference: &InferenceClient<B>,
    ) -> Classification {
        let text = message.full_text();
        let lower = text.to_lowercase();

        if self.is_system_notice(message, &lower) {
            debug!(message_id = %message.id, sender = %message.sender, "system notice");
            return Classification::Informational;
        }

        let terms = self.extractor.extract(&text);
        let desperation = self.desperation_score(message, &lower, terms.as_ref(), ledger);
        update_profile(ledger, &message.sender, desperation, terms.as_ref());

        let flags = self.red_flags(message, &lower, terms.as_ref());
        if flags.hits >= self.config.scam_heuristic_min_hits {
            let confidence = flags.confidence(self.config.scam_confidence_per_hit);
            info!(
                sender = %message.sender,
                hits = flags.hits,
                confidence,
                "red flags found, message classified as scam"
            );
            return Classification::Scam {
                reasons: flags.reasons.into_iter().collect(),
                confidence,
            };
        }

        // Suspect but not conclusive: the model gets the casting vote, and a
        // silent model leaves the letter to the deterministic checks below.
        let suspect = flags.hits >= self.config.scam_suspicion_min_hits;
        let early_verdict = if suspect {
            self.ask_model(message, &text, &flags, inference).await
        } else {
            None
        };
        if early_verdict.as_ref().is_some_and(|verdict| verdict.scam) {
            info!(sender = %message.sender, hits = flags.hits, "model confirmed suspected scam");
            return self.model_scam(&flags);
        }
        if suspect {
            debug!(sender = %message.sender, hits = flags.hits, "suspected scam not confirmed");
        }

        let proposal_language = terms.is_some()
            || contains_any(&lower, FOOTER_TAGS)
            || contains_any(&lower, PROPOSAL_PHRASES);
        let without_instructions = strip_instructions(&lower);
        let cue = acceptance_cue(&without_instructions);

        if !proposal_language && (cue == AcceptanceCue::Negated || contains_any(&lower, REJECTION)) {
            return Classification::Rejection;
        }

        if cue == AcceptanceCue::Explicit {
            if is_conditional(&without_instructions) {
                debug!(sender = %message.sender, "conditional acceptance read as an offer");
            } else {
                let deal = ledger.oldest_open(&message.sender).map(|deal| deal.id);
                debug!(sender = %message.sender, matched = deal.is_some(), "acceptance phrase");
                return Classification::Acceptance { deal };
            }
        }

        if !proposal_language && message.body.trim().chars().count() < self.config.short_message_chars {
            return Classification::Informational;
        }

        if let Some(terms) = terms {
            debug!(sender = %message.sender, terms = %terms, desperation, "terms extracted");
            return Classification::CounterOffer(terms);
        }

        let verdict = if suspect {
            early_verdict
        } else {
            self.ask_model(message, &text, &flags, inference).await
        };
        self.interpret(message, verdict, &flags, ledger)
    }

    /// Ask the model for a verdict. `None` on any failure.
    async fn ask_model<B: InferenceBackend>(
        &self,
        message: &Message,
        text: &str,
        flags: &RedFlags,
        inference: &InferenceClient<B>,
    ) -> Option<Verdict> {
        let ctx = ClassifyContext {
            alias: &self.alias,
            sender: message.sender.as_str(),
            text,
            suspicion: flags.suspicion(),
            resources: self.extractor.known_resources().collect(),
        };
        let prompt = match self.prompts.render(PromptKind::Classify, &ctx) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, "classify prompt failed to render");
                return None;
            }
        };
        let request = GenerationRequest::from_prompt(prompt, self.max_tokens);
        let raw = match inference.ask(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, sender = %message.sender, "model verdict unavailable");
                return None;
            }
        };
        let verdict = parse_verdict(&raw, &self.gold_key)?;
        debug!(
            sender = %message.sender,
            label = ?verdict.label,
            scam = verdict.scam,
            reason = verdict.reason.as_deref().unwrap_or_default(),
            "model verdict"
        );
        Some(verdict)
    }

    /// Map a model verdict onto a classification.
    fn interpret(
        &self,
        message: &Message,
        verdict: Option<Verdict>,
        flags: &RedFlags,
        ledger: &mut NegotiationLedger,
    ) -> Classification {
        let Some(verdict) = verdict else {
            return Classification::Informational;
        };
        if verdict.scam {
            return self.model_scam(flags);
        }
        match verdict.label {
            VerdictLabel::Acceptance => Classification::Acceptance {
                deal: ledger.oldest_open(&message.sender).map(|deal| deal.id),
            },
            VerdictLabel::CounterOffer if !verdict.terms.is_empty() => {
                update_profile(ledger, &message.sender, 0, Some(&verdict.terms));
                Classification::CounterOffer(verdict.terms)
            }
            VerdictLabel::Rejection => Classification::Rejection,
            VerdictLabel::CounterOffer | VerdictLabel::Scam | VerdictLabel::Informational => {
                Classification::Informational
            }
        }
    }

    fn model_scam(&self, flags: &RedFlags) -> Classification {
        let mut reasons: Vec<ScamReason> = flags.reasons.iter().copied().collect();
        reasons.push(ScamReason::ModelFlagged);
        let confidence = flags
            .confidence(self.config.scam_confidence_per_hit)
            .max(self.config.inference_scam_confidence);
        Classification::Scam { reasons, confidence }
    }

    fn is_system_notice(&self, message: &Message, lower: &str) -> bool {
        let sender = message.sender.as_str().trim().to_lowercase();
        if self.system_senders.contains(&sender) {
            return true;
        }
        let body = message.body.trim_start().to_lowercase();
        SYSTEM_NOTICE_PREFIXES
            .iter()
            .any(|prefix| body.starts_with(prefix) || lower.starts_with(prefix))
    }

    fn red_flags(&self, message: &Message, lower: &str, terms: Option<&Terms>) -> RedFlags {
        let mut flags = RedFlags::default();
        let upfront = contains_any(lower, UPFRONT_TRANSFER);
        let categories = [
            (upfront, ScamReason::UpfrontTransfer),
            (contains_any(lower, FREE_RESOURCES), ScamReason::FreeResources),
            (contains_any(lower, IMPERSONATION), ScamReason::Impersonation),
            (contains_any(lower, PRESSURE), ScamReason::Pressure),
            (contains_any(lower, BLIND_TRUST), ScamReason::BlindTrust),
        ];
        for (fired, reason) in categories {
            if fired {
                flags.hit(reason);
            }
        }

        // Asking us to send first while offering nothing.
        if upfront && terms.is_none_or(|t| !t.offers_anything()) {
            flags.hit(ScamReason::UpfrontTransfer);
        }

        // Large gifts with nothing asked in return.
        if let Some(t) = terms
            && !t.requests_anything()
            && (t.offered.total_units() >= 10 || t.offered_gold >= 20)
        {
            flags.hit(ScamReason::FreeResources);
        }

        // Claims to be the server or someone else.
        for caps in self.impersonation.captures_iter(lower) {
            let Some(claimed) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let is_system = self.system_senders.iter().any(|s| s == claimed);
            let is_other = self.participants.contains(claimed) && !message.sender.same_as(claimed);
            if is_system || is_other {
                flags.hit(ScamReason::Impersonation);
                break;
            }
        }

        flags
    }

    /// Desperation on the 0-10 scale.
    fn desperation_score(
        &self,
        message: &Message,
        lower: &str,
        terms: Option<&Terms>,
        ledger: &NegotiationLedger,
    ) -> u8 {
        let weights = self.config.desperation;
        let mut score = 0_u8;
        let mut add = |fired: bool, weight: u8| {
            if fired {
                score = score.saturating_add(weight);
            }
        };

        add(contains_any(lower, URGENCY), weights.urgency);
        add(contains_any(lower, PLEADING), weights.pleading);
        add(contains_any(lower, SUPERLATIVE), weights.superlative);
        add(lower.contains("!!"), weights.exclamation);
        add(is_shouting(&message.body), weights.shouting);
        add(
            message.body.chars().count() > OVER_EXPLANATION_CHARS && contains_any(lower, EXPLANATION),
            weights.over_explanation,
        );

        let repeated = terms.is_some_and(|current| {
            current.requests_anything()
                && ledger
                    .history(&message.sender)
                    .filter(|earlier| earlier.id != message.id)
                    .filter_map(|earlier| self.extractor.extract(&earlier.full_text()))
                    .any(|earlier| {
                        earlier
                            .requested
                            .names()
                            .any(|name| current.requested.contains(name))
                    })
        });
        add(repeated, weights.repeat_request);

        score.min(MAX_DESPERATION)
    }
}

/// Fold a message's desperation and terms into the sender's profile.
fn update_profile(
    ledger: &mut NegotiationLedger,
    sender: &Participant,
    desperation: u8,
    terms: Option<&Terms>,
) {
    let profile = ledger.ensure_profile(sender);
    profile.observe_desperation(desperation);
    if let Some(terms) = terms {
        profile
            .known_surplus
            .extend(terms.offered.names().map(str::to_owned));
        profile
            .known_wants
            .extend(terms.requested.names().map(str::to_owned));
        if terms.offered_gold > 0 {
            profile.last_offered_gold = Some(terms.offered_gold);
        }
    }
}

/// Mostly upper-case text with enough letters to matter.
fn is_shouting(body: &str) -> bool {
    let letters = body.chars().filter(|c| c.is_alphabetic()).count();
    let upper = body.chars().filter(|c| c.is_uppercase()).count();
    letters >= 8 && upper.saturating_mul(10) >= letters.saturating_mul(6)
}

/// Drop lines that tell the reader how to reply, so quoting our own
/// instructions back is not read as acceptance.
fn strip_instructions(lower: &str) -> String {
    lower
        .lines()
        .filter(|line| !INSTRUCTION_WORDS.iter().any(|word| contains_phrase(line, word)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use barter_ledger::LedgerConfig;
    use barter_types::{DealId, MessageId, ResourceBundle};
    use chrono::Utc;

    use super::*;
    use crate::llm::InferenceError;

    struct Scripted(&'static str);

    impl InferenceBackend for Scripted {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, InferenceError> {
            Ok(self.0.to_owned())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Down;

    impl InferenceBackend for Down {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, InferenceError> {
            Err(InferenceError::Backend("connection refused".to_owned()))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn classifier() -> Classifier {
        let mut config = AgentConfig::default();
        config.identity.alias = "me".to_owned();
        let mut classifier =
            Classifier::new(&config, Arc::new(PromptEngine::builtin().unwrap())).unwrap();
        classifier.learn_participants(&[Participant::new("alice"), Participant::new("bob")]);
        classifier
    }

    fn letter(id: &str, sender: &str, body: &str) -> Message {
        Message {
            id: MessageId::new(id),
            sender: Participant::new(sender),
            subject: String::new(),
            body: body.to_owned(),
            received_at: Utc::now(),
            round: 1,
        }
    }

    fn client<B: InferenceBackend>(backend: B) -> InferenceClient<B> {
        InferenceClient::new(backend, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn upfront_demand_is_scam_without_model() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter("1", "mallory", "send me 50 gold now, no trade needed, trust me");
        let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        let Classification::Scam { reasons, confidence } = verdict else {
            panic!("expected scam, got {verdict:?}");
        };
        assert!(reasons.contains(&ScamReason::UpfrontTransfer));
        assert!(reasons.contains(&ScamReason::BlindTrust));
        assert!(confidence >= 60);
    }

    #[tokio::test]
    async fn desperate_request_scores_high_but_is_not_scam() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter("1", "carol", "I desperately need iron, please, urgent!!");
        let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        assert!(!verdict.is_scam());
        let Classification::CounterOffer(terms) = verdict else {
            panic!("expected counter offer");
        };
        assert_eq!(terms.requested, ResourceBundle::new().with("iron", 1));
        let profile = ledger.profile(&Participant::new("carol")).unwrap();
        assert!(profile.desperation >= 7);
        assert!(profile.known_wants.contains("iron"));
    }

    #[tokio::test]
    async fn system_senders_are_informational() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter("1", "Sistema", "send me everything, last chance, trust me");
        let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        assert_eq!(verdict, Classification::Informational);
    }

    #[tokio::test]
    async fn acceptance_binds_oldest_open_deal() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let bob = Participant::new("bob");
        let first = ledger.record_outgoing(&bob, Terms::default(), 1);
        ledger.record_outgoing(&bob, Terms::default(), 2);

        let msg = letter("1", "bob", "Trato hecho, amigo");
        let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        assert_eq!(verdict, Classification::Acceptance { deal: Some(first) });
    }

    #[tokio::test]
    async fn quoted_instructions_are_not_acceptance() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter(
            "1",
            "bob",
            "Trade offer\n[OFFER] 2 stone\n[REQUEST] 1 wood\nReply 'deal accepted' to close.",
        );
        let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        assert!(matches!(verdict, Classification::CounterOffer(_)));
    }

    /// Bob holds one open deal from us; returns its id.
    fn ledger_with_open_deal() -> (NegotiationLedger, DealId) {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let id = ledger.record_outgoing(&Participant::new("bob"), Terms::default(), 1);
        (ledger, id)
    }

    #[tokio::test]
    async fn negated_acceptance_is_a_rejection() {
        for body in [
            "Sorry, I can't accept your offer.",
            "Your offer is not accepted.",
            "No lo acepto, es muy caro.",
            "I do not accept the deal, too expensive",
        ] {
            let (mut ledger, _) = ledger_with_open_deal();
            let msg = letter("1", "bob", body);
            let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
            assert_eq!(verdict, Classification::Rejection, "{body}");
        }
    }

    #[tokio::test]
    async fn conditional_acceptance_is_a_counter_offer() {
        let (mut ledger, _) = ledger_with_open_deal();
        let msg = letter(
            "1",
            "bob",
            "I accept your offer if you add 2 wood: I give 2 stone in exchange for 3 wood",
        );
        let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        let Classification::CounterOffer(terms) = verdict else {
            panic!("expected counter offer, got {verdict:?}");
        };
        assert_eq!(terms.offered.get("stone"), 2);
        assert_eq!(terms.requested.get("wood"), 3);
    }

    #[tokio::test]
    async fn acceptance_after_an_unrelated_no_still_counts() {
        let (mut ledger, id) = ledger_with_open_deal();
        let msg = letter("1", "bob", "No problem, I accept the deal. Sending now.");
        let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        assert_eq!(verdict, Classification::Acceptance { deal: Some(id) });
    }

    #[tokio::test]
    async fn two_flags_on_a_real_swap_do_not_block_without_the_model() {
        for (body, stone, wood) in [
            (
                "I give you 4 stone in exchange for 3 wood, send me the wood right now and I ship immediately",
                4,
                3,
            ),
            (
                "I offer 5 stone for 2 wood. I promise the stone is delivered, offer expires next round",
                5,
                2,
            ),
        ] {
            let mut ledger = NegotiationLedger::new(LedgerConfig::default());
            let msg = letter("1", "bob", body);
            let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
            let Classification::CounterOffer(terms) = verdict else {
                panic!("expected counter offer for {body:?}, got {verdict:?}");
            };
            assert_eq!(terms.offered.get("stone"), stone);
            assert_eq!(terms.requested.get("wood"), wood);
        }
    }

    #[tokio::test]
    async fn two_flags_become_scam_when_the_model_agrees() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter(
            "1",
            "bob",
            "I give you 4 stone in exchange for 3 wood, send me the wood right now and I ship immediately",
        );
        let model = Scripted(r#"{"label": "scam", "scam": true, "reason": "wants wood first"}"#);
        let verdict = classifier().classify(&msg, &mut ledger, &client(model)).await;
        let Classification::Scam { reasons, confidence } = verdict else {
            panic!("expected scam, got {verdict:?}");
        };
        assert!(reasons.contains(&ScamReason::UpfrontTransfer));
        assert!(reasons.contains(&ScamReason::Pressure));
        assert!(reasons.contains(&ScamReason::ModelFlagged));
        assert_eq!(confidence, 70);
    }

    #[tokio::test]
    async fn te_paso_is_not_a_refusal() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter("1", "bob", "te paso 3 madera mañana");
        let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        assert_ne!(verdict, Classification::Rejection);

        let refusal = letter("2", "bob", "Esta vez paso, suerte con el trato");
        let verdict = classifier().classify(&refusal, &mut ledger, &client(Down)).await;
        assert_eq!(verdict, Classification::Rejection);
    }

    #[test]
    fn negation_stays_inside_its_clause() {
        assert_eq!(acceptance_cue("i can't accept your offer"), AcceptanceCue::Negated);
        assert_eq!(acceptance_cue("no, deal accepted"), AcceptanceCue::Explicit);
        assert_eq!(acceptance_cue("trato hecho"), AcceptanceCue::Explicit);
        assert_eq!(acceptance_cue("hello there"), AcceptanceCue::Absent);
    }

    #[tokio::test]
    async fn plain_rejection() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter("1", "bob", "No gracias, no me interesa por ahora.");
        let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        assert_eq!(verdict, Classification::Rejection);
    }

    #[tokio::test]
    async fn short_chatter_is_informational() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter("1", "bob", "hola!");
        let verdict = classifier()
            .classify(&msg, &mut ledger, &client(Scripted(r#"{"label": "counter_offer"}"#)))
            .await;
        assert_eq!(verdict, Classification::Informational);
    }

    #[tokio::test]
    async fn free_text_goes_to_model() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter("1", "bob", "Would you consider a swap of a pair of hammers for a trio of bricks?");
        let reply = "```json\n{\"label\": \"counter_offer\", \"offered\": {\"wood\": 2}, \"requested\": {\"stone\": \"3\"}, \"scam\": false,}\n```";
        let verdict = classifier()
            .classify(&msg, &mut ledger, &client(Scripted(reply)))
            .await;
        let Classification::CounterOffer(terms) = verdict else {
            panic!("expected counter offer");
        };
        assert_eq!(terms.offered.get("wood"), 2);
        assert_eq!(terms.requested.get("stone"), 3);
    }

    #[tokio::test]
    async fn model_failure_degrades_to_informational() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter("1", "bob", "Hello there, how is your day going so far?");
        let down = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        assert_eq!(down, Classification::Informational);

        let garbage = classifier()
            .classify(&msg, &mut ledger, &client(Scripted("I cannot answer that")))
            .await;
        assert_eq!(garbage, Classification::Informational);
    }

    #[tokio::test]
    async fn model_scam_flag_uses_inference_confidence() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter("1", "eve", "Hello friend, a wonderful opportunity awaits you today");
        let verdict = classifier()
            .classify(&msg, &mut ledger, &client(Scripted(r#"{"label": "informational", "scam": true}"#)))
            .await;
        assert_eq!(
            verdict,
            Classification::Scam {
                reasons: vec![ScamReason::ModelFlagged],
                confidence: 70,
            }
        );
    }

    #[tokio::test]
    async fn impersonating_another_participant_is_flagged() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let msg = letter("1", "eve", "Hi, this is alice on a new account. Send me 10 gold first.");
        let verdict = classifier().classify(&msg, &mut ledger, &client(Down)).await;
        let Classification::Scam { reasons, .. } = verdict else {
            panic!("expected scam, got {verdict:?}");
        };
        assert!(reasons.contains(&ScamReason::Impersonation));
    }

    #[tokio::test]
    async fn repeated_requests_raise_desperation() {
        let mut ledger = NegotiationLedger::new(LedgerConfig::default());
        let classifier = classifier();
        let first = letter("1", "dan", "I need 2 stone for my house");
        ledger.record_message(&first);
        classifier.classify(&first, &mut ledger, &client(Down)).await;
        let calm = ledger.profile(&Participant::new("dan")).unwrap().desperation;

        let second = letter("2", "dan", "I still need 2 stone for my house");
        ledger.record_message(&second);
        classifier.classify(&second, &mut ledger, &client(Down)).await;
        let after = ledger.profile(&Participant::new("dan")).unwrap().desperation;
        assert!(after > calm);
    }

    #[test]
    fn phrase_matching_respects_word_boundaries() {
        assert!(contains_phrase("i need it now!", "now"));
        assert!(!contains_phrase("do you know", "now"));
        assert!(contains_phrase("[offer] 2 wood", "[offer]"));
        assert!(!contains_phrase("debugging", "bug"));
    }

    #[test]
    fn shouting_needs_enough_letters() {
        assert!(is_shouting("GIVE ME THE WOOD"));
        assert!(!is_shouting("OK"));
        assert!(!is_shouting("Give me the wood"));
    }
}
