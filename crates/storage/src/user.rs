use bson::oid::ObjectId;
use eyre::{eyre, Result};
use log::info;
use model::{
    rights::Role,
    session::Session,
    user::{Membership, User},
};

use crate::collection::{Collection, Record};

impl Record for User {
    fn id(&self) -> ObjectId {
        self.id
    }
}

impl Record for Membership {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone)]
pub struct UserStore {
    store: Collection<User>,
}

impl UserStore {
    pub(crate) fn new() -> Self {
        UserStore {
            store: Collection::new("users"),
        }
    }

    pub async fn insert(&self, session: &mut Session, user: User) -> Result<()> {
        info!("Insert user: {} {}", user.id, user.name);
        self.store.insert(session, user)
    }

    pub async fn get(&self, id: ObjectId) -> Result<Option<User>> {
        Ok(self.store.get(id))
    }

    pub async fn set_active(&self, session: &mut Session, id: ObjectId, active: bool) -> Result<()> {
        info!("Set user {} active: {}", id, active);
        self.store
            .update(session, id, |user| user.is_active = active)?
            .ok_or_else(|| eyre!("User not found: {}", id))?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MembershipStore {
    store: Collection<Membership>,
}

impl MembershipStore {
    pub(crate) fn new() -> Self {
        MembershipStore {
            store: Collection::new("memberships"),
        }
    }

    pub async fn insert(&self, session: &mut Session, membership: Membership) -> Result<()> {
        info!(
            "Insert membership: user {} gym {} as {:?}",
            membership.user_id, membership.gym_id, membership.role_in_gym
        );
        if self.find(membership.user_id, membership.gym_id).await?.is_some() {
            return Err(eyre!(
                "Membership of {} in {} already exists",
                membership.user_id,
                membership.gym_id
            ));
        }
        self.store.insert(session, membership)
    }

    /// Membership of the user in the gym, active or not.
    pub async fn find(&self, user_id: ObjectId, gym_id: ObjectId) -> Result<Option<Membership>> {
        Ok(self
            .store
            .find_one(|m| m.user_id == user_id && m.gym_id == gym_id))
    }

    pub async fn find_active(
        &self,
        user_id: ObjectId,
        gym_id: ObjectId,
    ) -> Result<Option<Membership>> {
        Ok(self
            .store
            .find_one(|m| m.user_id == user_id && m.gym_id == gym_id && m.is_active))
    }

    pub async fn find_by_gym(&self, gym_id: ObjectId) -> Result<Vec<Membership>> {
        Ok(self.store.find(|m| m.gym_id == gym_id))
    }

    /// Turns an inactive membership back on under the given role.
    pub async fn reactivate(
        &self,
        session: &mut Session,
        id: ObjectId,
        role_in_gym: Role,
    ) -> Result<Membership> {
        info!("Reactivate membership {} as {:?}", id, role_in_gym);
        self.store
            .update(session, id, |m| {
                m.is_active = true;
                m.role_in_gym = role_in_gym;
            })?
            .ok_or_else(|| eyre!("Membership not found: {}", id))
    }

    pub async fn set_active(&self, session: &mut Session, id: ObjectId, active: bool) -> Result<()> {
        info!("Set membership {} active: {}", id, active);
        self.store
            .update(session, id, |m| m.is_active = active)?
            .ok_or_else(|| eyre!("Membership not found: {}", id))?;
        Ok(())
    }
}
