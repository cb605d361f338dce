//! Deterministic extraction of trade terms from free text.
//!
//! Recognised shapes, tried in order:
//!
//! 1. Tagged footers: `[OFFER] 2 wood, 3 gold` / `[REQUEST] 1 iron` (also
//!    `[OFREZCO]` / `[PIDO]`). When tags are present nothing else is read.
//! 2. Swap phrasing: "I give you 2 wood for 3 stone", "te doy 2 madera y tú
//!    me das 3 piedra".
//! 3. Loose statements: "I need iron", "tengo 4 piedra", "I'll pay 10 gold".
//!
//! Outside tagged footers a resource must be known, so "te doy 2 razones"
//! does not become an offer of reasons. Extracted terms are from the
//! sender's perspective.

use std::collections::BTreeSet;

use regex::Regex;

use barter_types::{ResourceBundle, Terms};

use crate::parse::is_gold_key;

/// Resource names recognised before the server tells us more.
const BASE_RESOURCES: &[&str] = &[
    "madera", "piedra", "comida", "hierro", "trigo", "carbon", "agua", "plata", "cobre",
    "diamante", "lana", "tela", "cuero", "cristal", "acero", "ladrillos", "arroz", "queso", "pan",
    "leche", "carne", "pescado", "fruta", "verdura", "sal", "azucar", "miel", "vino", "cerveza",
    "wood", "stone", "food", "iron", "wheat", "coal", "water", "silver", "copper", "diamond",
    "wool", "cloth", "leather", "glass", "steel", "bricks", "rice", "cheese", "bread", "milk",
    "meat", "fish", "fruit", "vegetables", "salt", "sugar", "honey", "wine", "beer",
];

/// Compiled patterns plus the set of known resource names.
#[derive(Debug, Clone)]
pub struct TermExtractor {
    tagged_offer: Regex,
    tagged_request: Regex,
    qty_first: Regex,
    name_first: Regex,
    swap: Regex,
    wants: Regex,
    has: Regex,
    pays: Regex,
    gold_key: String,
    known: BTreeSet<String>,
}

impl TermExtractor {
    /// Compile the patterns.
    pub fn new(gold_key: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            tagged_offer: Regex::new(r"\[(?:offer|ofrezco|ofrece|doy)\]([^\[\n]*)")?,
            tagged_request: Regex::new(r"\[(?:request|pido|pide|quiero)\]([^\[\n]*)")?,
            qty_first: Regex::new(
                r"(\d+)\s*(?:x\s+)?(?:units?\s+of\s+|unidades\s+de\s+|de\s+|of\s+)?([\p{L}_]+)",
            )?,
            name_first: Regex::new(r"([\p{L}_]+)\s*[:=]\s*(\d+)")?,
            swap: Regex::new(
                r"\b(?:i(?:'ll| will)? give(?: you)?|i offer|te doy|te ofrezco|ofrezco|doy)\s+(.+?)\s+(?:and you give me|if you give me|in exchange for|for|a cambio de|por|y t[uú] me das|y me das|si me das)\s+([^.!?\n]+)",
            )?,
            wants: Regex::new(
                r"\b(?:need|want|looking for|necesito|quiero|busco|me faltan?)\s+(?:(\d+)\s+)?(?:some\s+|more\s+|de\s+|unos?\s+|unas?\s+|algo de\s+)?([\p{L}_]+)",
            )?,
            has: Regex::new(
                r"\b(?:i have|i can offer|i sell|selling|tengo|vendo|me sobran?)\s+(?:(\d+)\s+)?(?:some\s+|spare\s+|de\s+)?([\p{L}_]+)",
            )?,
            pays: Regex::new(r"\b(?:i(?:'ll| will)? pay|pay you|te pago|pago)\s+(\d+)\s*(?:gold|oro|coins|monedas)\b")?,
            gold_key: gold_key.to_owned(),
            known: BASE_RESOURCES.iter().map(|name| (*name).to_owned()).collect(),
        })
    }

    /// Add resource names learned from the server (holdings, goals, offers).
    pub fn learn<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            let name = name.trim().to_lowercase();
            if !name.is_empty() && !is_gold_key(&name, &self.gold_key) {
                self.known.insert(name);
            }
        }
    }

    /// Every known resource name.
    pub fn known_resources(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }

    /// Whether `text` names a known resource.
    pub fn mentions_resource(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        lower
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .any(|word| self.canonical(word, true).is_some())
    }

    /// Extract terms from `text`, or `None` if it holds no recognisable offer.
    pub fn extract(&self, text: &str) -> Option<Terms> {
        let lower = text.to_lowercase();

        if let Some(terms) = self.extract_tagged(&lower) {
            return Some(terms);
        }

        if let Some(caps) = self.swap.captures(&lower) {
            let (offered, offered_gold) = self.parse_items(caps.get(1)?.as_str(), true);
            let (requested, requested_gold) = self.parse_items(caps.get(2)?.as_str(), true);
            let terms = Terms {
                offered,
                offered_gold,
                requested,
                requested_gold,
            };
            if !terms.is_empty() {
                return Some(terms);
            }
        }

        let mut terms = Terms::default();
        for caps in self.wants.captures_iter(&lower) {
            if let Some((name, qty)) = self.loose_item(&caps) {
                terms.requested.add(name, qty);
            }
        }
        for caps in self.has.captures_iter(&lower) {
            if let Some((name, qty)) = self.loose_item(&caps) {
                terms.offered.add(name, qty);
            }
        }
        for caps in self.pays.captures_iter(&lower) {
            let qty = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0);
            terms.offered_gold = terms.offered_gold.saturating_add(qty);
        }
        (!terms.is_empty()).then_some(terms)
    }

    fn extract_tagged(&self, lower: &str) -> Option<Terms> {
        let offer = self.tagged_offer.captures(lower);
        let request = self.tagged_request.captures(lower);
        if offer.is_none() && request.is_none() {
            return None;
        }
        let side = |caps: Option<regex::Captures<'_>>| {
            caps.and_then(|c| c.get(1))
                .map_or_else(|| (ResourceBundle::new(), 0), |m| self.parse_items(m.as_str(), false))
        };
        let (offered, offered_gold) = side(offer);
        let (requested, requested_gold) = side(request);
        let terms = Terms {
            offered,
            offered_gold,
            requested,
            requested_gold,
        };
        (!terms.is_empty()).then_some(terms)
    }

    /// `(name, qty)` from a loose statement; a missing quantity means one.
    fn loose_item(&self, caps: &regex::Captures<'_>) -> Option<(String, u32)> {
        let qty = caps
            .get(1)
            .map_or(Some(1), |m| m.as_str().parse::<u32>().ok())?;
        let name = self.canonical(caps.get(2)?.as_str(), true)?;
        Some((name, qty))
    }

    /// Parse an item list such as `2 wood, 3 gold` or `wood: 2`.
    fn parse_items(&self, text: &str, require_known: bool) -> (ResourceBundle, u64) {
        let mut bundle = ResourceBundle::new();
        let mut gold = 0_u64;
        let mut record = |raw_name: &str, raw_qty: &str| {
            let Ok(qty) = raw_qty.parse::<u32>() else {
                return;
            };
            if is_gold_key(raw_name, &self.gold_key) {
                gold = gold.saturating_add(u64::from(qty));
            } else if let Some(name) = self.canonical(raw_name, require_known) {
                bundle.add(name, qty);
            }
        };
        let mut matched = false;
        for caps in self.qty_first.captures_iter(text) {
            if let (Some(qty), Some(name)) = (caps.get(1), caps.get(2)) {
                record(name.as_str(), qty.as_str());
                matched = true;
            }
        }
        if !matched {
            for caps in self.name_first.captures_iter(text) {
                if let (Some(name), Some(qty)) = (caps.get(1), caps.get(2)) {
                    record(name.as_str(), qty.as_str());
                }
            }
        }
        (bundle, gold)
    }

    /// Map a word to a resource name, folding simple plurals onto known names.
    fn canonical(&self, word: &str, require_known: bool) -> Option<String> {
        let word = word.trim();
        if word.is_empty() || is_gold_key(word, &self.gold_key) {
            return None;
        }
        if self.known.contains(word) {
            return Some(word.to_owned());
        }
        for suffix in ["es", "s"] {
            if let Some(stem) = word.strip_suffix(suffix)
                && self.known.contains(stem)
            {
                return Some(stem.to_owned());
            }
        }
        (!require_known).then(|| word.to_owned())
    }
}
