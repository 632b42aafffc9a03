use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per (user, gym) aggregate of usable tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenWallet {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub gym_id: ObjectId,
    pub balance: u32,
    #[serde(default)]
    pub version: u64,
}

impl TokenWallet {
    pub fn new(user_id: ObjectId, gym_id: ObjectId) -> TokenWallet {
        TokenWallet {
            id: ObjectId::new(),
            user_id,
            gym_id,
            balance: 0,
            version: 0,
        }
    }

    pub fn can_debit(&self, count: u32) -> bool {
        self.balance >= count
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantSource {
    Purchase,
    Assignment,
    Bonus,
}

/// A batch of tokens credited to a wallet at once.
///
/// `tokens` is the historical batch size; the wallet balance is the source of
/// truth for what is spendable. `swept` is set once the expiry sweep has
/// removed the batch from the balance, after which the grant is inert.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenGrant {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub wallet_id: ObjectId,
    pub tokens: u32,
    pub source: GrantSource,
    pub expires_at: Option<DateTime<Utc>>,
    pub plan_id: Option<ObjectId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub swept: bool,
}

impl TokenGrant {
    pub fn new(
        wallet_id: ObjectId,
        tokens: u32,
        source: GrantSource,
        expires_at: Option<DateTime<Utc>>,
        plan_id: Option<ObjectId>,
    ) -> TokenGrant {
        TokenGrant {
            id: ObjectId::new(),
            wallet_id,
            tokens,
            source,
            expires_at,
            plan_id,
            created_at: Utc::now(),
            swept: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.tokens > 0 && !self.swept && !self.is_expired(now)
    }

    /// Expired and still counted in the wallet balance.
    pub fn needs_sweep(&self, now: DateTime<Utc>) -> bool {
        !self.swept && self.expires_at.map(|at| at < now).unwrap_or(false)
    }
}

/// Oldest usable grant first.
pub fn select_grant(grants: &[TokenGrant], now: DateTime<Utc>) -> Option<&TokenGrant> {
    grants
        .iter()
        .filter(|grant| grant.is_usable(now))
        .min_by_key(|grant| (grant.created_at, grant.id))
}
