use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use eyre::{bail, eyre, Result};
use log::info;
use model::{
    session::Session,
    token::{TokenGrant, TokenWallet},
};

use crate::collection::{Collection, Record};

impl Record for TokenWallet {
    fn id(&self) -> ObjectId {
        self.id
    }
}

impl Record for TokenGrant {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone)]
pub struct WalletStore {
    store: Collection<TokenWallet>,
}

impl WalletStore {
    pub(crate) fn new() -> Self {
        WalletStore {
            store: Collection::new("token_wallets"),
        }
    }

    pub async fn insert(&self, session: &mut Session, wallet: TokenWallet) -> Result<()> {
        info!(
            "Insert wallet: {} user {} gym {}",
            wallet.id, wallet.user_id, wallet.gym_id
        );
        if self.find(wallet.user_id, wallet.gym_id).await?.is_some() {
            bail!(
                "Wallet of {} in {} already exists",
                wallet.user_id,
                wallet.gym_id
            );
        }
        self.store.insert(session, wallet)
    }

    pub async fn get(&self, id: ObjectId) -> Result<Option<TokenWallet>> {
        Ok(self.store.get(id))
    }

    pub async fn find(&self, user_id: ObjectId, gym_id: ObjectId) -> Result<Option<TokenWallet>> {
        Ok(self
            .store
            .find_one(|w| w.user_id == user_id && w.gym_id == gym_id))
    }

    /// Adds `count` tokens and returns the updated wallet.
    pub async fn credit(
        &self,
        session: &mut Session,
        id: ObjectId,
        count: u32,
    ) -> Result<TokenWallet> {
        info!("Credit wallet {}: {}", id, count);
        let mut overflow = false;
        let wallet = self
            .store
            .update(session, id, |wallet| match wallet.balance.checked_add(count) {
                Some(balance) => {
                    wallet.balance = balance;
                    wallet.version += 1;
                }
                None => overflow = true,
            })?
            .ok_or_else(|| eyre!("Wallet not found: {}", id))?;
        if overflow {
            bail!("Wallet {} balance overflow", id);
        }
        Ok(wallet)
    }

    /// Removes `count` tokens. Fails without touching the wallet when the
    /// balance is too low.
    pub async fn debit(
        &self,
        session: &mut Session,
        id: ObjectId,
        count: u32,
    ) -> Result<TokenWallet> {
        info!("Debit wallet {}: {}", id, count);
        let mut insufficient = false;
        let wallet = self
            .store
            .update(session, id, |wallet| match wallet.balance.checked_sub(count) {
                Some(balance) => {
                    wallet.balance = balance;
                    wallet.version += 1;
                }
                None => insufficient = true,
            })?
            .ok_or_else(|| eyre!("Wallet not found: {}", id))?;
        if insufficient {
            bail!("Wallet {} balance {} < {}", id, wallet.balance, count);
        }
        Ok(wallet)
    }

    /// Removes up to `count` tokens, stopping at zero. Returns the updated
    /// wallet and the number of tokens actually removed.
    pub async fn drain(
        &self,
        session: &mut Session,
        id: ObjectId,
        count: u32,
    ) -> Result<(TokenWallet, u32)> {
        let mut removed = 0;
        let wallet = self
            .store
            .update(session, id, |wallet| {
                removed = wallet.balance.min(count);
                wallet.balance -= removed;
                wallet.version += 1;
            })?
            .ok_or_else(|| eyre!("Wallet not found: {}", id))?;
        info!("Drain wallet {}: {} of {}", id, removed, count);
        Ok((wallet, removed))
    }
}

#[derive(Clone)]
pub struct GrantStore {
    store: Collection<TokenGrant>,
}

impl GrantStore {
    pub(crate) fn new() -> Self {
        GrantStore {
            store: Collection::new("token_grants"),
        }
    }

    pub async fn insert(&self, session: &mut Session, grant: TokenGrant) -> Result<()> {
        info!(
            "Insert grant: {} wallet {} tokens {} {:?}",
            grant.id, grant.wallet_id, grant.tokens, grant.source
        );
        self.store.insert(session, grant)
    }

    pub async fn get(&self, id: ObjectId) -> Result<Option<TokenGrant>> {
        Ok(self.store.get(id))
    }

    /// Grants of the wallet, newest first.
    pub async fn find_by_wallet(&self, wallet_id: ObjectId) -> Result<Vec<TokenGrant>> {
        let mut grants = self.store.find(|g| g.wallet_id == wallet_id);
        grants.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(grants)
    }

    /// Grants that expired before `now` and still count in a wallet balance.
    pub async fn find_to_sweep(&self, now: DateTime<Utc>) -> Result<Vec<TokenGrant>> {
        let mut grants = self.store.find(|g| g.needs_sweep(now));
        grants.sort_by_key(|g| (g.expires_at, g.id));
        Ok(grants)
    }

    pub async fn mark_swept(&self, session: &mut Session, id: ObjectId) -> Result<()> {
        info!("Mark grant {} swept", id);
        self.store
            .update(session, id, |grant| grant.swept = true)?
            .ok_or_else(|| eyre!("Grant not found: {}", id))?;
        Ok(())
    }
}
