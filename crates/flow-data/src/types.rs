//! Type definitions for the loyalty-token ledger.
//!
//! Addresses are stored as hex text, exactly as they appear in the ledger
//! snapshot. Amounts are token quantities as the producer wrote them: swap legs
//! priced through a token conversion are routinely fractional.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Token quantity.
pub type Amount = f64;

/// A registered loyalty business.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    /// Owner address (unique key of the business registry).
    pub owner: String,
    /// Address of the business's loyalty token contract.
    pub token: String,
    /// Router through which rewards are issued.
    pub reward_router: String,
    /// Router through which redemptions are burned.
    pub redeem_router: String,
    /// Brand name.
    #[serde(default)]
    pub brand: String,
    /// Human-readable token name.
    #[serde(default)]
    pub token_name: String,
    /// Optional token price, only used when pricing swaps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_price: Option<f64>,
}

/// A registered user account.
///
/// Deserializes from either a bare address string or an object carrying an
/// `address` field (extra fields such as key material are ignored).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "AccountRecord")]
pub struct Account {
    /// Account address (hex text).
    pub address: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AccountRecord {
    Address(String),
    Object { address: String },
}

impl From<AccountRecord> for Account {
    fn from(record: AccountRecord) -> Self {
        match record {
            AccountRecord::Address(address) | AccountRecord::Object { address } => {
                Self { address }
            }
        }
    }
}

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// Participant role, decided by registry membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    BusinessOwner,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::BusinessOwner => f.write_str("business-owner"),
            Role::User => f.write_str("user"),
        }
    }
}

/// Kind of a recognized ledger event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Reward,
    Redeem,
    Transfer,
    Swap,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Reward => "reward",
            EventKind::Redeem => "redeem",
            EventKind::Transfer => "transfer",
            EventKind::Swap => "swap",
        };
        f.write_str(name)
    }
}

/// Payload shared by reward and redeem events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenAction {
    /// Owner address of the issuing/redeeming business.
    pub business: String,
    /// User receiving (reward) or returning (redeem) the tokens.
    pub user: String,
    /// Token contract address.
    pub token: String,
    /// Amount in token units.
    pub amount: Amount,
}

/// Peer-to-peer movement of a business's token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    pub token: String,
    pub amount: Amount,
    /// Owner of the token's business, when the producer recorded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business: Option<String>,
}

/// Cross-business swap: two simultaneous opposite-direction movements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub from_user: String,
    pub from_token: String,
    pub from_business: String,
    pub from_amount: Amount,
    pub to_user: String,
    pub to_token: String,
    pub to_business: String,
    pub to_amount: Amount,
}

/// One ledger event, internally tagged by `type`.
///
/// Accepts the spellings the event producer emits (`Reward`, `Redeem`,
/// `transfer`, `swap`) plus their other common casings. Any other tag decodes
/// to [`Event::Unknown`], which every consumer ignores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "Reward", alias = "reward", alias = "REWARD")]
    Reward(TokenAction),
    #[serde(rename = "Redeem", alias = "redeem", alias = "REDEEM")]
    Redeem(TokenAction),
    #[serde(rename = "transfer", alias = "Transfer", alias = "TRANSFER")]
    Transfer(Transfer),
    #[serde(rename = "swap", alias = "Swap", alias = "SWAP")]
    Swap(Swap),
    #[serde(other)]
    Unknown,
}

/// A single directed token movement derived from an event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leg<'a> {
    pub kind: EventKind,
    pub from: &'a str,
    pub to: &'a str,
    pub token: &'a str,
    pub amount: Amount,
}

impl Event {
    /// Kind of the event, `None` for unrecognized tags.
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Event::Reward(_) => Some(EventKind::Reward),
            Event::Redeem(_) => Some(EventKind::Redeem),
            Event::Transfer(_) => Some(EventKind::Transfer),
            Event::Swap(_) => Some(EventKind::Swap),
            Event::Unknown => None,
        }
    }

    /// Directed movements carried by this event, in emission order.
    ///
    /// Reward: `business → user`. Redeem: `user → business`.
    /// Transfer: `from → to`. Swap: `fromUser → toUser` in the from-token,
    /// then `toUser → fromUser` in the to-token.
    pub fn legs(&self) -> impl Iterator<Item = Leg<'_>> {
        let legs: [Option<Leg<'_>>; 2] = match self {
            Event::Reward(a) => [
                Some(Leg {
                    kind: EventKind::Reward,
                    from: &a.business,
                    to: &a.user,
                    token: &a.token,
                    amount: a.amount,
                }),
                None,
            ],
            Event::Redeem(a) => [
                Some(Leg {
                    kind: EventKind::Redeem,
                    from: &a.user,
                    to: &a.business,
                    token: &a.token,
                    amount: a.amount,
                }),
                None,
            ],
            Event::Transfer(t) => [
                Some(Leg {
                    kind: EventKind::Transfer,
                    from: &t.from,
                    to: &t.to,
                    token: &t.token,
                    amount: t.amount,
                }),
                None,
            ],
            Event::Swap(s) => [
                Some(Leg {
                    kind: EventKind::Swap,
                    from: &s.from_user,
                    to: &s.to_user,
                    token: &s.from_token,
                    amount: s.from_amount,
                }),
                Some(Leg {
                    kind: EventKind::Swap,
                    from: &s.to_user,
                    to: &s.from_user,
                    token: &s.to_token,
                    amount: s.to_amount,
                }),
            ],
            Event::Unknown => [None, None],
        };
        legs.into_iter().flatten()
    }
}
