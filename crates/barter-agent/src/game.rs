//! Game-economy server client.
//!
//! [`GameClient`] is the seam the orchestrator talks through; the HTTP
//! implementation speaks the server's JSON dialect:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | state + mailbox | `GET /info` (`Recursos`, `Objetivo`, `Buzon`, `Alias`) |
//! | participants | `GET /gente` |
//! | send letter | `POST /carta` |
//! | delete letter | `DELETE /mail/{uid}` |
//! | send package | `POST /paquete/{dest}`, falling back to `?dest=` on 404 |
//! | register alias | `POST /alias/{name}` |
//!
//! Gold travels inside the resource map under a configurable key and is
//! lifted out into [`StateSnapshot::gold`] here, so bundles never carry it.

use std::future::Future;

use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tracing::{debug, warn};

use barter_types::{Message, MessageId, Participant, ResourceBundle};

use crate::config::GameConfig;
use crate::parse::coerce_bundle;

/// Everything the server reports about the agent in one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Resources held, gold excluded.
    pub resources: ResourceBundle,
    /// Gold held.
    pub gold: u64,
    /// Target holdings.
    pub goal: ResourceBundle,
    /// Aliases registered to this agent.
    pub aliases: Vec<String>,
}

/// Errors from the game server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Connection failed, timed out, or the server returned 5xx.
    #[error("game server unreachable: {0}")]
    Unreachable(String),

    /// The server refused the request (4xx other than 404).
    #[error("game server rejected request ({status}): {detail}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body or summary.
        detail: String,
    },

    /// The target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The response could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GameError {
    /// Whether retrying the same call might succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Operations the agent needs from the game server.
pub trait GameClient: Send + Sync {
    /// Current holdings, gold, goal, and own aliases.
    fn get_state(&self) -> impl Future<Output = Result<StateSnapshot, GameError>> + Send;

    /// Letters waiting in the mailbox, oldest first, stamped with `round`.
    fn get_mailbox(&self, round: u32) -> impl Future<Output = Result<Vec<Message>, GameError>> + Send;

    /// Send a letter.
    fn send_message(
        &self,
        recipient: &Participant,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), GameError>> + Send;

    /// Send resources and gold. Irreversible.
    fn transfer_package(
        &self,
        recipient: &Participant,
        bundle: &ResourceBundle,
        gold: u64,
    ) -> impl Future<Output = Result<(), GameError>> + Send;

    /// Everyone currently in the game.
    fn list_participants(&self) -> impl Future<Output = Result<Vec<Participant>, GameError>> + Send;

    /// Remove a processed letter from the mailbox.
    fn delete_message(&self, id: &MessageId) -> impl Future<Output = Result<(), GameError>> + Send;

    /// Register an alias for this agent.
    fn register_alias(&self, alias: &str) -> impl Future<Output = Result<(), GameError>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// [`GameClient`] over the server's HTTP API.
pub struct HttpGameClient {
    client: reqwest::Client,
    base_url: Url,
    alias: String,
    gold_key: String,
}

impl HttpGameClient {
    /// Build a client for `alias`, optionally bound to a local source IP.
    pub fn new(config: &GameConfig, alias: &str) -> Result<Self, GameError> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| GameError::Malformed(format!("invalid api_url {}: {e}", config.api_url)))?;

        let mut builder = reqwest::Client::builder().timeout(config.timeout());
        if let Some(ip) = config.source_ip {
            debug!(source_ip = %ip, "binding outgoing connections");
            builder = builder.local_address(ip);
        }
        let client = builder
            .build()
            .map_err(|e| GameError::Unreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            alias: alias.to_owned(),
            gold_key: config.gold_key.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GameError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GameError::Malformed(format!("api_url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_info(&self) -> Result<Value, GameError> {
        let response = self
            .client
            .get(self.endpoint(&["info"])?)
            .send()
            .await
            .map_err(|e| transport("info", &e))?;
        let response = check_status(response, "info").await?;
        response.json().await.map_err(|e| transport("info", &e))
    }
}

impl GameClient for HttpGameClient {
    async fn get_state(&self) -> Result<StateSnapshot, GameError> {
        let info = self.fetch_info().await?;
        parse_state(&info, &self.gold_key)
    }

    async fn get_mailbox(&self, round: u32) -> Result<Vec<Message>, GameError> {
        let info = self.fetch_info().await?;
        Ok(parse_mailbox(&info, round))
    }

    async fn send_message(
        &self,
        recipient: &Participant,
        subject: &str,
        body: &str,
    ) -> Result<(), GameError> {
        let letter = serde_json::json!({
            "remi": self.alias,
            "dest": recipient.as_str(),
            "asunto": subject,
            "cuerpo": body,
            "id": format!("carta_{}_{}", self.alias, Utc::now().timestamp_millis()),
        });
        let response = self
            .client
            .post(self.endpoint(&["carta"])?)
            .json(&letter)
            .send()
            .await
            .map_err(|e| transport("carta", &e))?;
        check_status(response, "carta").await?;
        debug!(recipient = %recipient, subject, "letter sent");
        Ok(())
    }

    async fn transfer_package(
        &self,
        recipient: &Participant,
        bundle: &ResourceBundle,
        gold: u64,
    ) -> Result<(), GameError> {
        let mut payload = serde_json::Map::new();
        for (name, qty) in bundle.iter() {
            payload.insert(name.to_owned(), Value::from(qty));
        }
        if gold > 0 {
            payload.insert(self.gold_key.clone(), Value::from(gold));
        }
        let payload = Value::Object(payload);

        let response = self
            .client
            .post(self.endpoint(&["paquete", recipient.as_str()])?)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport("paquete", &e))?;

        let response = if response.status() == StatusCode::NOT_FOUND {
            debug!(recipient = %recipient, "path form not found, retrying with query form");
            self.client
                .post(self.endpoint(&["paquete"])?)
                .query(&[("dest", recipient.as_str())])
                .json(&payload)
                .send()
                .await
                .map_err(|e| transport("paquete", &e))?
        } else {
            response
        };

        check_status(response, "paquete").await?;
        Ok(())
    }

    async fn list_participants(&self) -> Result<Vec<Participant>, GameError> {
        let response = self
            .client
            .get(self.endpoint(&["gente"])?)
            .send()
            .await
            .map_err(|e| transport("gente", &e))?;
        let response = check_status(response, "gente").await?;
        let json: Value = response.json().await.map_err(|e| transport("gente", &e))?;
        parse_participants(&json)
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), GameError> {
        let response = self
            .client
            .delete(self.endpoint(&["mail", id.as_str()])?)
            .send()
            .await
            .map_err(|e| transport("mail", &e))?;
        check_status(response, "mail").await?;
        Ok(())
    }

    async fn register_alias(&self, alias: &str) -> Result<(), GameError> {
        let response = self
            .client
            .post(self.endpoint(&["alias", alias])?)
            .send()
            .await
            .map_err(|e| transport("alias", &e))?;
        check_status(response, "alias").await?;
        Ok(())
    }
}

/// Map a transport-level failure.
fn transport(what: &str, e: &reqwest::Error) -> GameError {
    if e.is_decode() {
        GameError::Malformed(format!("{what}: {e}"))
    } else {
        GameError::Unreachable(format!("{what}: {e}"))
    }
}

/// Turn a non-2xx response into the matching [`GameError`].
async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, GameError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_owned());
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        warn!(endpoint = what, detail, "server validation error");
    }
    Err(match status {
        StatusCode::NOT_FOUND => GameError::NotFound(format!("{what}: {detail}")),
        s if s.is_server_error() => GameError::Unreachable(format!("{what} returned {s}: {detail}")),
        s => GameError::Rejected {
            status: s.as_u16(),
            detail,
        },
    })
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

/// Extract the state snapshot from a `/info` payload.
pub fn parse_state(info: &Value, gold_key: &str) -> Result<StateSnapshot, GameError> {
    let object = info
        .as_object()
        .ok_or_else(|| GameError::Malformed("info payload is not an object".to_owned()))?;

    let resources = object
        .get("Recursos")
        .ok_or_else(|| GameError::Malformed("info payload has no Recursos".to_owned()))?;
    let (resources, gold) = coerce_bundle(resources, gold_key);
    let (goal, _) = object
        .get("Objetivo")
        .map(|goal| coerce_bundle(goal, gold_key))
        .unwrap_or_default();

    let aliases = match object.get("Alias") {
        Some(Value::String(alias)) => vec![alias.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(ToOwned::to_owned)
            .collect(),
        _ => Vec::new(),
    };

    Ok(StateSnapshot {
        resources,
        gold,
        goal,
        aliases,
    })
}

/// Extract mailbox letters from a `/info` payload, in server order.
///
/// Letters missing a sender are dropped; the mailbox key is the id used for
/// deletion.
pub fn parse_mailbox(info: &Value, round: u32) -> Vec<Message> {
    let Some(mailbox) = info.get("Buzon").and_then(Value::as_object) else {
        return Vec::new();
    };
    let now = Utc::now();
    mailbox
        .iter()
        .filter_map(|(uid, letter)| {
            let sender = letter.get("remi").and_then(Value::as_str)?;
            let text = |key: &str| {
                letter
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned()
            };
            Some(Message {
                id: MessageId::new(uid.clone()),
                sender: Participant::new(sender),
                subject: text("asunto"),
                body: text("cuerpo"),
                received_at: now,
                round,
            })
        })
        .collect()
}

/// Normalize a `/gente` payload: plain strings or objects with a name field.
pub fn parse_participants(json: &Value) -> Result<Vec<Participant>, GameError> {
    let items = json
        .as_array()
        .ok_or_else(|| GameError::Malformed("participant list is not an array".to_owned()))?;
    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(name.clone()),
            Value::Object(fields) => ["nombre", "name", "alias"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str))
                .map(ToOwned::to_owned),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|name| !name.trim().is_empty())
        .map(Participant::new)
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn info() -> Value {
        serde_json::json!({
            "Recursos": {"madera": 5, "piedra": "3", "oro": 40, "hierro": 0},
            "Objetivo": {"madera": 10, "hierro": 2},
            "Buzon": {
                "u2": {"remi": "bob", "dest": "me", "asunto": "hola", "cuerpo": "te doy 2 madera", "id": "x"},
                "u1": {"remi": "carol", "dest": "me", "cuerpo": "trato hecho"},
                "u3": {"dest": "me", "cuerpo": "no sender"}
            },
            "Alias": "me"
        })
    }

    #[test]
    fn state_lifts_gold_out_of_resources() {
        let state = parse_state(&info(), "oro").unwrap();
        assert_eq!(state.gold, 40);
        assert_eq!(
            state.resources,
            ResourceBundle::new().with("madera", 5).with("piedra", 3)
        );
        assert_eq!(state.goal.get("hierro"), 2);
        assert_eq!(state.aliases, vec!["me".to_owned()]);
    }

    #[test]
    fn state_without_resources_is_malformed() {
        let err = parse_state(&serde_json::json!({"Objetivo": {}}), "oro").unwrap_err();
        assert!(matches!(err, GameError::Malformed(_)));
    }

    #[test]
    fn mailbox_keeps_server_order_and_drops_anonymous_letters() {
        let letters = parse_mailbox(&info(), 4);
        let ids: Vec<_> = letters.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u1"]);
        let first = letters.first().unwrap();
        assert_eq!(first.subject, "hola");
        assert_eq!(first.round, 4);
        assert!(letters.get(1).unwrap().subject.is_empty());
    }

    #[test]
    fn participants_accept_strings_and_objects() {
        let json = serde_json::json!(["alice", {"nombre": "bob"}, {"alias": "carol"}, {"other": 1}, ""]);
        let names: Vec<_> = parse_participants(&json)
            .unwrap()
            .into_iter()
            .map(|p| p.as_str().to_owned())
            .collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn endpoint_escapes_segments() {
        let config = GameConfig {
            api_url: "http://localhost:7719/api/".to_owned(),
            ..GameConfig::default()
        };
        let client = HttpGameClient::new(&config, "me").unwrap();
        let url = client.endpoint(&["paquete", "some one"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:7719/api/paquete/some%20one");
    }

    #[test]
    fn only_unreachable_is_transient() {
        assert!(GameError::Unreachable("x".to_owned()).is_transient());
        assert!(!GameError::NotFound("x".to_owned()).is_transient());
        assert!(
            !GameError::Rejected {
                status: 422,
                detail: String::new()
            }
            .is_transient()
        );
    }
}
