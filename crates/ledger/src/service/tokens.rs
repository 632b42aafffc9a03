use bson::{doc, oid::ObjectId};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use model::{
    errors::LedgerError,
    history::{Action, Entity},
    payment::{Payment, PaymentStatus},
    plan::{PackagePlan, PlanRules},
    rights::{Principal, Role, Rule},
    session::Session,
    token::{self, GrantSource, TokenGrant, TokenWallet},
};
use serde::{Deserialize, Serialize};
use storage::{
    payment::PaymentStore,
    plan::PlanStore,
    token::{GrantStore, WalletStore},
};
use tx_macro::tx;

use super::{
    history::{system_actor, History},
    users::Users,
};
use crate::LedgerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignTokens {
    pub user_id: ObjectId,
    pub gym_id: ObjectId,
    pub tokens: u32,
    pub source: GrantSource,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub from_user: ObjectId,
    pub to_user: ObjectId,
    pub gym_id: ObjectId,
    pub tokens: u32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub gym_id: ObjectId,
    pub plan_id: ObjectId,
    /// Defaults to the plan price.
    pub amount_minor: Option<u64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlan {
    pub gym_id: ObjectId,
    pub name: String,
    pub tokens: u32,
    pub validity_days: u32,
    pub price_minor: u64,
    #[serde(default)]
    pub rules: PlanRules,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_grants: u32,
    pub tokens_expired: u32,
}

#[derive(Clone)]
pub struct Tokens {
    wallets: WalletStore,
    grants: GrantStore,
    plans: PlanStore,
    payments: PaymentStore,
    users: Users,
    logs: History,
    config: LedgerConfig,
}

impl Tokens {
    pub(crate) fn new(
        wallets: WalletStore,
        grants: GrantStore,
        plans: PlanStore,
        payments: PaymentStore,
        users: Users,
        logs: History,
        config: LedgerConfig,
    ) -> Self {
        Tokens {
            wallets,
            grants,
            plans,
            payments,
            users,
            logs,
            config,
        }
    }

    pub async fn get_wallet(
        &self,
        user_id: ObjectId,
        gym_id: ObjectId,
    ) -> Result<Option<TokenWallet>, LedgerError> {
        Ok(self.wallets.find(user_id, gym_id).await?)
    }

    pub async fn get_wallet_by_id(&self, wallet_id: ObjectId) -> Result<TokenWallet, LedgerError> {
        self.wallets
            .get(wallet_id)
            .await?
            .ok_or(LedgerError::WalletIdNotFound(wallet_id))
    }

    /// Wallet of a gym member, created empty on first use.
    #[tx]
    pub async fn get_or_create_wallet(
        &self,
        session: &mut Session,
        user_id: ObjectId,
        gym_id: ObjectId,
    ) -> Result<TokenWallet, LedgerError> {
        self.users.ensure_member(user_id, gym_id).await?;
        self.wallet_for(session, user_id, gym_id).await
    }

    async fn wallet_for(
        &self,
        session: &mut Session,
        user_id: ObjectId,
        gym_id: ObjectId,
    ) -> Result<TokenWallet, LedgerError> {
        if let Some(wallet) = self.wallets.find(user_id, gym_id).await? {
            return Ok(wallet);
        }
        let wallet = TokenWallet::new(user_id, gym_id);
        self.wallets.insert(session, wallet.clone()).await?;
        self.logs
            .record(
                session,
                user_id,
                Entity::TokenWallet,
                wallet.id,
                Action::Create,
                doc! { "user_id": user_id, "gym_id": gym_id },
            )
            .await;
        Ok(wallet)
    }

    #[tx]
    pub async fn assign_tokens(
        &self,
        session: &mut Session,
        principal: &Principal,
        assign: AssignTokens,
    ) -> Result<TokenGrant, LedgerError> {
        principal.ensure(Rule::AssignTokens)?;
        if assign.tokens == 0 {
            return Err(LedgerError::invalid_input("tokens must be positive"));
        }
        if assign.source == GrantSource::Purchase {
            return Err(LedgerError::invalid_input(
                "purchase grants are minted by payment confirmation",
            ));
        }

        let wallet = self
            .get_or_create_wallet_inner(session, assign.user_id, assign.gym_id)
            .await?;
        let grant = TokenGrant::new(
            wallet.id,
            assign.tokens,
            assign.source,
            assign.expires_at,
            None,
        );
        self.grants.insert(session, grant.clone()).await?;
        let wallet = self.wallets.credit(session, wallet.id, assign.tokens).await?;

        self.logs
            .record(
                session,
                principal.user_id,
                Entity::TokenGrant,
                grant.id,
                Action::Create,
                doc! {
                    "wallet_id": wallet.id,
                    "tokens": assign.tokens,
                    "source": format!("{:?}", assign.source),
                    "expires_at": assign.expires_at,
                    "balance": wallet.balance,
                    "reason": assign.reason,
                },
            )
            .await;
        Ok(grant)
    }

    #[tx]
    pub async fn consume_tokens(
        &self,
        session: &mut Session,
        actor: ObjectId,
        wallet_id: ObjectId,
        count: u32,
        reason: &str,
    ) -> Result<TokenWallet, LedgerError> {
        self.debit(session, actor, wallet_id, count, reason).await
    }

    #[tx]
    pub async fn refund_tokens(
        &self,
        session: &mut Session,
        actor: ObjectId,
        wallet_id: ObjectId,
        count: u32,
        reason: &str,
    ) -> Result<TokenWallet, LedgerError> {
        self.credit(session, actor, wallet_id, count, reason).await
    }

    pub(crate) async fn debit(
        &self,
        session: &mut Session,
        actor: ObjectId,
        wallet_id: ObjectId,
        count: u32,
        reason: &str,
    ) -> Result<TokenWallet, LedgerError> {
        if count == 0 {
            return Err(LedgerError::invalid_input("count must be positive"));
        }
        let wallet = self.get_wallet_by_id(wallet_id).await?;
        if !wallet.can_debit(count) {
            return Err(LedgerError::InsufficientBalance {
                wallet_id,
                balance: wallet.balance,
                required: count,
            });
        }
        let updated = self.wallets.debit(session, wallet_id, count).await?;
        self.logs
            .record(
                session,
                actor,
                Entity::TokenWallet,
                wallet_id,
                Action::Consume,
                doc! {
                    "previous_balance": wallet.balance,
                    "new_balance": updated.balance,
                    "count": count,
                    "reason": reason,
                },
            )
            .await;
        Ok(updated)
    }

    pub(crate) async fn credit(
        &self,
        session: &mut Session,
        actor: ObjectId,
        wallet_id: ObjectId,
        count: u32,
        reason: &str,
    ) -> Result<TokenWallet, LedgerError> {
        if count == 0 {
            return Err(LedgerError::invalid_input("count must be positive"));
        }
        let wallet = self.get_wallet_by_id(wallet_id).await?;
        let updated = self.wallets.credit(session, wallet_id, count).await?;
        self.logs
            .record(
                session,
                actor,
                Entity::TokenWallet,
                wallet_id,
                Action::Refund,
                doc! {
                    "previous_balance": wallet.balance,
                    "new_balance": updated.balance,
                    "count": count,
                    "reason": reason,
                },
            )
            .await;
        Ok(updated)
    }

    /// Moves tokens between two wallets of the same gym. The receiver gets a
    /// bonus grant that expires after the configured transfer window.
    #[tx]
    pub async fn transfer_tokens(
        &self,
        session: &mut Session,
        principal: &Principal,
        transfer: Transfer,
    ) -> Result<TokenGrant, LedgerError> {
        if !principal.is(transfer.from_user) && principal.role != Role::Admin {
            return Err(LedgerError::NotOwner {
                actor: principal.user_id,
                owner: transfer.from_user,
            });
        }
        if transfer.tokens == 0 {
            return Err(LedgerError::invalid_input("tokens must be positive"));
        }
        if transfer.from_user == transfer.to_user {
            return Err(LedgerError::invalid_input("can not transfer to the same user"));
        }

        let from = self
            .wallets
            .find(transfer.from_user, transfer.gym_id)
            .await?
            .ok_or(LedgerError::WalletNotFound {
                user_id: transfer.from_user,
                gym_id: transfer.gym_id,
            })?;
        let to = self
            .wallets
            .find(transfer.to_user, transfer.gym_id)
            .await?
            .ok_or(LedgerError::WalletNotFound {
                user_id: transfer.to_user,
                gym_id: transfer.gym_id,
            })?;

        let reason = transfer
            .reason
            .clone()
            .unwrap_or_else(|| "transfer".to_string());
        self.debit(session, principal.user_id, from.id, transfer.tokens, &reason)
            .await?;

        let expires_at = Utc::now() + Duration::days(self.config.transfer_expiry_days as i64);
        let grant = TokenGrant::new(
            to.id,
            transfer.tokens,
            GrantSource::Bonus,
            Some(expires_at),
            None,
        );
        self.grants.insert(session, grant.clone()).await?;
        let to = self.wallets.credit(session, to.id, transfer.tokens).await?;

        self.logs
            .record(
                session,
                principal.user_id,
                Entity::TokenGrant,
                grant.id,
                Action::Transfer,
                doc! {
                    "from_wallet": from.id,
                    "to_wallet": to.id,
                    "tokens": transfer.tokens,
                    "expires_at": expires_at,
                    "reason": reason,
                },
            )
            .await;
        Ok(grant)
    }

    #[tx]
    pub async fn create_plan(
        &self,
        session: &mut Session,
        principal: &Principal,
        plan: NewPlan,
    ) -> Result<PackagePlan, LedgerError> {
        principal.ensure(Rule::ManagePlans)?;
        let name = plan.name.trim().to_string();
        if name.is_empty() {
            return Err(LedgerError::invalid_input("plan name is empty"));
        }
        if plan.tokens == 0 || plan.validity_days == 0 {
            return Err(LedgerError::invalid_input(
                "plan tokens and validity must be positive",
            ));
        }

        let plan = PackagePlan::new(
            plan.gym_id,
            name,
            plan.tokens,
            plan.validity_days,
            plan.price_minor,
            plan.rules,
        );
        self.plans.insert(session, plan.clone()).await?;
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::PackagePlan,
                plan.id,
                Action::Create,
                doc! {
                    "name": plan.name.as_str(),
                    "tokens": plan.tokens,
                    "validity_days": plan.validity_days,
                    "price_minor": plan.price_minor as i64,
                    "cancel_before_hours": plan.rules.cancel_before_hours,
                },
            )
            .await;
        Ok(plan)
    }

    #[tx]
    pub async fn set_plan_active(
        &self,
        session: &mut Session,
        principal: &Principal,
        plan_id: ObjectId,
        active: bool,
    ) -> Result<(), LedgerError> {
        principal.ensure(Rule::ManagePlans)?;
        self.plans
            .get(plan_id)
            .await?
            .ok_or(LedgerError::PlanNotFound(plan_id))?;
        self.plans.set_active(session, plan_id, active).await?;
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::PackagePlan,
                plan_id,
                Action::Update,
                doc! { "is_active": active },
            )
            .await;
        Ok(())
    }

    pub async fn get_plan(&self, plan_id: ObjectId) -> Result<Option<PackagePlan>, LedgerError> {
        Ok(self.plans.get(plan_id).await?)
    }

    pub async fn plans(&self, gym_id: ObjectId) -> Result<Vec<PackagePlan>, LedgerError> {
        Ok(self.plans.find_by_gym(gym_id, true).await?)
    }

    /// Opens a pending payment for a plan. Tokens are minted once the
    /// payment provider confirms it.
    #[tx]
    pub async fn purchase_tokens(
        &self,
        session: &mut Session,
        principal: &Principal,
        purchase: Purchase,
    ) -> Result<Payment, LedgerError> {
        let plan = self
            .plans
            .get(purchase.plan_id)
            .await?
            .filter(|plan| plan.is_active && plan.gym_id == purchase.gym_id)
            .ok_or(LedgerError::PlanNotFound(purchase.plan_id))?;
        self.users
            .ensure_member(principal.user_id, purchase.gym_id)
            .await?;

        let payment = Payment::pending(
            principal.user_id,
            purchase.gym_id,
            plan.id,
            purchase.amount_minor.unwrap_or(plan.price_minor),
            purchase
                .currency
                .unwrap_or_else(|| self.config.default_currency.clone()),
            self.config.payment_provider.clone(),
        );
        self.payments.insert(session, payment.clone()).await?;
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::Payment,
                payment.id,
                Action::Create,
                doc! {
                    "plan_id": plan.id,
                    "amount_minor": payment.amount_minor as i64,
                    "currency": payment.currency.as_str(),
                    "provider": payment.provider.as_str(),
                },
            )
            .await;
        Ok(payment)
    }

    #[tx]
    pub async fn confirm_purchase(
        &self,
        session: &mut Session,
        payment_id: ObjectId,
    ) -> Result<TokenGrant, LedgerError> {
        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or(LedgerError::PaymentNotFound(payment_id))?;
        if !payment.is_pending() {
            return Err(LedgerError::PaymentAlreadyProcessed(payment_id));
        }
        let plan = self
            .plans
            .get(payment.plan_id)
            .await?
            .ok_or(LedgerError::PlanNotFound(payment.plan_id))?;

        let wallet = self
            .wallet_for(session, payment.user_id, payment.gym_id)
            .await?;
        let expires_at = Utc::now() + Duration::days(plan.validity_days as i64);
        let grant = TokenGrant::new(
            wallet.id,
            plan.tokens,
            GrantSource::Purchase,
            Some(expires_at),
            Some(plan.id),
        );
        self.grants.insert(session, grant.clone()).await?;
        let wallet = self.wallets.credit(session, wallet.id, plan.tokens).await?;
        self.payments
            .set_status(session, payment_id, PaymentStatus::Completed)
            .await?;

        self.logs
            .record(
                session,
                payment.user_id,
                Entity::Payment,
                payment_id,
                Action::Update,
                doc! {
                    "status": "COMPLETED",
                    "grant_id": grant.id,
                    "tokens": plan.tokens,
                    "balance": wallet.balance,
                },
            )
            .await;
        Ok(grant)
    }

    /// Removes expired grants from their wallets. Each grant is swept once;
    /// the wallet balance never drops below zero.
    #[tx]
    pub async fn sweep_expired_grants(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, LedgerError> {
        let mut report = SweepReport::default();
        for grant in self.grants.find_to_sweep(now).await? {
            if self.wallets.get(grant.wallet_id).await?.is_none() {
                warn!(
                    "Grant {} points to missing wallet {}",
                    grant.id, grant.wallet_id
                );
                self.grants.mark_swept(session, grant.id).await?;
                continue;
            }
            let (wallet, removed) = self
                .wallets
                .drain(session, grant.wallet_id, grant.tokens)
                .await?;
            self.grants.mark_swept(session, grant.id).await?;
            report.expired_grants += 1;
            report.tokens_expired += removed;

            self.logs
                .record(
                    session,
                    system_actor(),
                    Entity::TokenGrant,
                    grant.id,
                    Action::Expire,
                    doc! {
                        "wallet_id": wallet.id,
                        "tokens": grant.tokens,
                        "removed": removed,
                        "balance": wallet.balance,
                        "expires_at": grant.expires_at,
                    },
                )
                .await;
        }
        if report.expired_grants > 0 {
            info!(
                "Swept {} grants, {} tokens",
                report.expired_grants, report.tokens_expired
            );
        }
        Ok(report)
    }

    /// Grants of the wallet, newest first.
    pub async fn token_history(&self, wallet_id: ObjectId) -> Result<Vec<TokenGrant>, LedgerError> {
        Ok(self.grants.find_by_wallet(wallet_id).await?)
    }

    pub async fn get_grant(&self, grant_id: ObjectId) -> Result<Option<TokenGrant>, LedgerError> {
        Ok(self.grants.get(grant_id).await?)
    }

    /// Grant a booking is attributed to: the oldest usable one.
    pub async fn select_grant(
        &self,
        wallet_id: ObjectId,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenGrant>, LedgerError> {
        let grants = self.grants.find_by_wallet(wallet_id).await?;
        Ok(token::select_grant(&grants, now).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use model::{errors::ErrorKind, history::Entity, token::GrantSource};

    use super::{AssignTokens, NewPlan, Purchase, Transfer};
    use crate::test_utils::Fixture;

    #[tokio::test]
    async fn test_assign_requires_staff_and_membership() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let student = fx.student(0).await;

        let assign = AssignTokens {
            user_id: student.user_id,
            gym_id: fx.gym,
            tokens: 5,
            source: GrantSource::Assignment,
            expires_at: None,
            reason: None,
        };
        let err = fx
            .ledger
            .tokens
            .assign_tokens(&mut session, &student, assign.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let outsider = fx.user("outsider").await;
        let err = fx
            .ledger
            .tokens
            .assign_tokens(
                &mut session,
                &fx.professor,
                AssignTokens {
                    user_id: outsider.user_id,
                    ..assign.clone()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = fx
            .ledger
            .tokens
            .assign_tokens(
                &mut session,
                &fx.professor,
                AssignTokens {
                    source: GrantSource::Purchase,
                    ..assign.clone()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let grant = fx
            .ledger
            .tokens
            .assign_tokens(&mut session, &fx.professor, assign)
            .await
            .unwrap();
        assert_eq!(grant.tokens, 5);
        assert_eq!(fx.balance(student.user_id).await, 5);
        let logs = fx
            .ledger
            .history
            .entity_logs(Entity::TokenGrant, grant.id)
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn test_consume_never_goes_negative() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let student = fx.student(2).await;
        let wallet = fx.wallet(student.user_id).await;

        let err = fx
            .ledger
            .tokens
            .consume_tokens(&mut session, student.user_id, wallet.id, 3, "test")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(fx.balance(student.user_id).await, 2);

        fx.ledger
            .tokens
            .consume_tokens(&mut session, student.user_id, wallet.id, 2, "test")
            .await
            .unwrap();
        assert_eq!(fx.balance(student.user_id).await, 0);

        fx.ledger
            .tokens
            .refund_tokens(&mut session, student.user_id, wallet.id, 1, "test")
            .await
            .unwrap();
        assert_eq!(fx.balance(student.user_id).await, 1);
    }

    #[tokio::test]
    async fn test_transfer_moves_tokens_atomically() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let alice = fx.student(3).await;
        let bob = fx.student(0).await;

        let transfer = Transfer {
            from_user: alice.user_id,
            to_user: bob.user_id,
            gym_id: fx.gym,
            tokens: 5,
            reason: None,
        };
        let err = fx
            .ledger
            .tokens
            .transfer_tokens(&mut session, &alice, transfer.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(fx.balance(alice.user_id).await, 3);
        assert_eq!(fx.balance(bob.user_id).await, 0);

        let err = fx
            .ledger
            .tokens
            .transfer_tokens(
                &mut session,
                &bob,
                Transfer {
                    tokens: 1,
                    ..transfer.clone()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let grant = fx
            .ledger
            .tokens
            .transfer_tokens(
                &mut session,
                &alice,
                Transfer {
                    tokens: 2,
                    ..transfer
                },
            )
            .await
            .unwrap();
        assert_eq!(grant.source, GrantSource::Bonus);
        let expires_at = grant.expires_at.unwrap();
        assert!(expires_at > Utc::now() + Duration::days(29));
        assert!(expires_at <= Utc::now() + Duration::days(30));
        assert_eq!(fx.balance(alice.user_id).await, 1);
        assert_eq!(fx.balance(bob.user_id).await, 2);
    }

    #[tokio::test]
    async fn test_purchase_is_confirmed_once() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let student = fx.student(0).await;
        let plan = fx
            .ledger
            .tokens
            .create_plan(
                &mut session,
                &fx.admin,
                NewPlan {
                    gym_id: fx.gym,
                    name: "10 classes".to_string(),
                    tokens: 10,
                    validity_days: 30,
                    price_minor: 4_500_000,
                    rules: Default::default(),
                },
            )
            .await
            .unwrap();

        let purchase = Purchase {
            gym_id: fx.gym,
            plan_id: plan.id,
            amount_minor: None,
            currency: None,
        };
        let payment = fx
            .ledger
            .tokens
            .purchase_tokens(&mut session, &student, purchase.clone())
            .await
            .unwrap();
        assert!(payment.is_pending());
        assert_eq!(payment.amount_minor, 4_500_000);
        assert_eq!(payment.currency, "ARS");
        assert_eq!(fx.balance(student.user_id).await, 0);

        let grant = fx
            .ledger
            .tokens
            .confirm_purchase(&mut session, payment.id)
            .await
            .unwrap();
        assert_eq!(grant.source, GrantSource::Purchase);
        assert_eq!(grant.plan_id, Some(plan.id));
        assert_eq!(fx.balance(student.user_id).await, 10);

        let err = fx
            .ledger
            .tokens
            .confirm_purchase(&mut session, payment.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(fx.balance(student.user_id).await, 10);

        fx.ledger
            .tokens
            .set_plan_active(&mut session, &fx.admin, plan.id, false)
            .await
            .unwrap();
        let err = fx
            .ledger
            .tokens
            .purchase_tokens(&mut session, &student, purchase)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let student = fx.student(0).await;
        let now = Utc::now();

        let assign = |tokens, expires_at| AssignTokens {
            user_id: student.user_id,
            gym_id: fx.gym,
            tokens,
            source: GrantSource::Assignment,
            expires_at,
            reason: None,
        };
        fx.ledger
            .tokens
            .assign_tokens(&mut session, &fx.admin, assign(4, Some(now + Duration::hours(1))))
            .await
            .unwrap();
        fx.ledger
            .tokens
            .assign_tokens(&mut session, &fx.admin, assign(3, None))
            .await
            .unwrap();
        assert_eq!(fx.balance(student.user_id).await, 7);

        let later = now + Duration::hours(2);
        let report = fx
            .ledger
            .tokens
            .sweep_expired_grants(&mut session, later)
            .await
            .unwrap();
        assert_eq!(report.expired_grants, 1);
        assert_eq!(report.tokens_expired, 4);
        assert_eq!(fx.balance(student.user_id).await, 3);

        let report = fx
            .ledger
            .tokens
            .sweep_expired_grants(&mut session, later)
            .await
            .unwrap();
        assert_eq!(report.expired_grants, 0);
        assert_eq!(fx.balance(student.user_id).await, 3);
    }

    #[tokio::test]
    async fn test_sweep_saturates_at_zero() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let student = fx.student(0).await;
        let now = Utc::now();
        fx.ledger
            .tokens
            .assign_tokens(
                &mut session,
                &fx.admin,
                AssignTokens {
                    user_id: student.user_id,
                    gym_id: fx.gym,
                    tokens: 2,
                    source: GrantSource::Bonus,
                    expires_at: Some(now + Duration::minutes(30)),
                    reason: None,
                },
            )
            .await
            .unwrap();
        let wallet = fx.wallet(student.user_id).await;
        fx.ledger
            .tokens
            .consume_tokens(&mut session, student.user_id, wallet.id, 1, "class")
            .await
            .unwrap();

        let report = fx
            .ledger
            .tokens
            .sweep_expired_grants(&mut session, now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(report.tokens_expired, 1);
        assert_eq!(fx.balance(student.user_id).await, 0);
    }
}
