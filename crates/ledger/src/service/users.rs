use std::ops::Deref;

use bson::{doc, oid::ObjectId};
use log::info;
use model::{
    errors::LedgerError,
    history::{Action, Entity},
    rights::{Principal, Role, Rule},
    session::Session,
    user::{Membership, User},
};
use storage::user::{MembershipStore, UserStore};
use tx_macro::tx;

use super::history::History;

#[derive(Clone)]
pub struct Users {
    store: UserStore,
    memberships: MembershipStore,
    logs: History,
}

impl Users {
    pub(crate) fn new(store: UserStore, memberships: MembershipStore, logs: History) -> Self {
        Users {
            store,
            memberships,
            logs,
        }
    }

    #[tx]
    pub async fn create_user(
        &self,
        session: &mut Session,
        name: String,
        role: Role,
    ) -> Result<User, LedgerError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(LedgerError::invalid_input("user name is empty"));
        }
        let user = User::new(name, role);
        self.store.insert(session, user.clone()).await?;
        self.logs
            .record(
                session,
                user.id,
                Entity::User,
                user.id,
                Action::Create,
                doc! { "name": user.name.as_str(), "role": format!("{:?}", user.role) },
            )
            .await;
        Ok(user)
    }

    pub async fn get_user(&self, id: ObjectId) -> Result<User, LedgerError> {
        self.store
            .get(id)
            .await?
            .ok_or(LedgerError::UserNotFound(id))
    }

    #[tx]
    pub async fn add_membership(
        &self,
        session: &mut Session,
        principal: &Principal,
        user_id: ObjectId,
        gym_id: ObjectId,
        role_in_gym: Role,
    ) -> Result<Membership, LedgerError> {
        principal.ensure(Rule::ManageMemberships)?;
        self.get_user(user_id).await?;

        let membership = match self.memberships.find(user_id, gym_id).await? {
            Some(existing) if existing.is_active => {
                return Err(LedgerError::MembershipExists { user_id, gym_id });
            }
            Some(existing) => {
                self.memberships
                    .reactivate(session, existing.id, role_in_gym)
                    .await?
            }
            None => {
                let membership = Membership::new(user_id, gym_id, role_in_gym);
                self.memberships
                    .insert(session, membership.clone())
                    .await?;
                membership
            }
        };

        self.logs
            .record(
                session,
                principal.user_id,
                Entity::Membership,
                membership.id,
                Action::Create,
                doc! {
                    "user_id": user_id,
                    "gym_id": gym_id,
                    "role_in_gym": format!("{:?}", membership.role_in_gym),
                },
            )
            .await;
        Ok(membership)
    }

    #[tx]
    pub async fn deactivate_membership(
        &self,
        session: &mut Session,
        principal: &Principal,
        user_id: ObjectId,
        gym_id: ObjectId,
    ) -> Result<(), LedgerError> {
        principal.ensure(Rule::ManageMemberships)?;
        let membership = self.ensure_member(user_id, gym_id).await?;
        self.memberships
            .set_active(session, membership.id, false)
            .await?;
        self.logs
            .record(
                session,
                principal.user_id,
                Entity::Membership,
                membership.id,
                Action::Update,
                doc! { "is_active": false },
            )
            .await;
        Ok(())
    }

    pub async fn active_membership(
        &self,
        user_id: ObjectId,
        gym_id: ObjectId,
    ) -> Result<Option<Membership>, LedgerError> {
        Ok(self.memberships.find_active(user_id, gym_id).await?)
    }

    pub async fn ensure_member(
        &self,
        user_id: ObjectId,
        gym_id: ObjectId,
    ) -> Result<Membership, LedgerError> {
        self.active_membership(user_id, gym_id)
            .await?
            .ok_or(LedgerError::NotMember { user_id, gym_id })
    }

    /// Active Admin or Professor membership of the user in the gym.
    pub async fn ensure_staff(
        &self,
        user_id: ObjectId,
        gym_id: ObjectId,
    ) -> Result<Membership, LedgerError> {
        self.active_membership(user_id, gym_id)
            .await?
            .filter(|membership| membership.is_staff())
            .ok_or(LedgerError::NotStaff { user_id, gym_id })
    }

    /// Gives a professor a membership in the gym they schedule classes for.
    /// Only users whose global role is `Professor` and who have never been
    /// members of the gym are provisioned.
    pub(crate) async fn ensure_professor_membership(
        &self,
        session: &mut Session,
        user_id: ObjectId,
        gym_id: ObjectId,
    ) -> Result<(), LedgerError> {
        let user = self.get_user(user_id).await?;
        if user.role != Role::Professor {
            return Ok(());
        }
        if self.memberships.find(user_id, gym_id).await?.is_some() {
            return Ok(());
        }

        info!("Provisioning professor {} in gym {}", user_id, gym_id);
        let membership = Membership::new(user_id, gym_id, Role::Professor);
        self.memberships
            .insert(session, membership.clone())
            .await?;
        self.logs
            .record(
                session,
                user_id,
                Entity::Membership,
                membership.id,
                Action::Create,
                doc! {
                    "user_id": user_id,
                    "gym_id": gym_id,
                    "role_in_gym": "PROFESSOR",
                    "auto_provisioned": true,
                },
            )
            .await;
        Ok(())
    }
}

impl Deref for Users {
    type Target = UserStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use model::{
        errors::ErrorKind,
        history::{Action, Entity},
        rights::Role,
    };

    use crate::test_utils::Fixture;

    #[tokio::test]
    async fn test_create_user_is_audited() {
        let fx = Fixture::new().await;
        let user = fx.user("Ana").await;
        let logs = fx
            .ledger
            .history
            .entity_logs(Entity::User, user.user_id)
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, Action::Create);
        assert_eq!(logs[0].actor, user.user_id);
        assert_eq!(logs[0].diff.get_str("name").unwrap(), "Ana");
    }

    #[tokio::test]
    async fn test_reactivation_takes_requested_role() {
        let fx = Fixture::new().await;
        let mut session = fx.session().await;
        let user = fx.user("Luis").await;
        fx.ledger
            .users
            .add_membership(&mut session, &fx.admin, user.user_id, fx.gym, Role::Student)
            .await
            .unwrap();
        let err = fx
            .ledger
            .users
            .add_membership(&mut session, &fx.admin, user.user_id, fx.gym, Role::Professor)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        fx.ledger
            .users
            .deactivate_membership(&mut session, &fx.admin, user.user_id, fx.gym)
            .await
            .unwrap();
        assert!(fx
            .ledger
            .users
            .active_membership(user.user_id, fx.gym)
            .await
            .unwrap()
            .is_none());

        let membership = fx
            .ledger
            .users
            .add_membership(&mut session, &fx.admin, user.user_id, fx.gym, Role::Professor)
            .await
            .unwrap();
        assert_eq!(membership.role_in_gym, Role::Professor);
        assert!(membership.is_active);

        let stored = fx
            .ledger
            .users
            .active_membership(user.user_id, fx.gym)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, membership.id);
        assert_eq!(stored.role_in_gym, Role::Professor);
        fx.ledger
            .users
            .ensure_staff(user.user_id, fx.gym)
            .await
            .unwrap();

        let logs = fx
            .ledger
            .history
            .entity_logs(Entity::Membership, membership.id)
            .await
            .unwrap();
        let last = logs.last().unwrap();
        assert_eq!(last.diff.get_str("role_in_gym").unwrap(), "Professor");
    }
}
