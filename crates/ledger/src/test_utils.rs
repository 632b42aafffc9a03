use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::{DateTime, Duration, Utc};
use model::{
    booking::BookingOutcome,
    class_session::ClassSession,
    errors::LedgerError,
    plan::PlanRules,
    rights::{Principal, Role},
    session::Session,
    token::{GrantSource, TokenWallet},
};
use storage::Storage;

use crate::{
    service::{
        bookings::BookingRequest,
        calendar::NewSession,
        history::AuditSink,
        tokens::{AssignTokens, NewPlan, Purchase},
    },
    Ledger, LedgerConfig,
};

/// A gym with an admin, a professor and one room.
pub struct Fixture {
    pub ledger: Ledger,
    pub admin: Principal,
    pub professor: Principal,
    pub gym: ObjectId,
    pub room: ObjectId,
    pub class_type: ObjectId,
}

impl Fixture {
    pub async fn new() -> Fixture {
        Fixture::setup(Ledger::new(Storage::new(), LedgerConfig::default())).await
    }

    pub async fn with_sink(sink: Arc<dyn AuditSink>) -> Fixture {
        Fixture::setup(Ledger::with_audit_sink(
            Storage::new(),
            LedgerConfig::default(),
            sink,
        ))
        .await
    }

    async fn setup(ledger: Ledger) -> Fixture {
        let gym = ObjectId::new();
        let mut session = ledger.db.start_session().await;
        let admin = ledger
            .users
            .create_user(&mut session, "Admin".to_string(), Role::Admin)
            .await
            .unwrap();
        let admin = Principal::new(admin.id, Role::Admin);
        ledger
            .users
            .add_membership(&mut session, &admin, admin.user_id, gym, Role::Admin)
            .await
            .unwrap();
        let professor = ledger
            .users
            .create_user(&mut session, "Professor".to_string(), Role::Professor)
            .await
            .unwrap();
        let professor = Principal::new(professor.id, Role::Professor);
        ledger
            .users
            .add_membership(&mut session, &admin, professor.user_id, gym, Role::Professor)
            .await
            .unwrap();

        Fixture {
            ledger,
            admin,
            professor,
            gym,
            room: ObjectId::new(),
            class_type: ObjectId::new(),
        }
    }

    pub async fn session(&self) -> Session {
        self.ledger.db.start_session().await
    }

    /// A user without any membership.
    pub async fn user(&self, name: &str) -> Principal {
        let mut session = self.session().await;
        let user = self
            .ledger
            .users
            .create_user(&mut session, name.to_string(), Role::Student)
            .await
            .unwrap();
        Principal::new(user.id, Role::Student)
    }

    /// A gym member with a wallet holding `tokens` assigned tokens.
    pub async fn student(&self, tokens: u32) -> Principal {
        let student = self.user("Student").await;
        let mut session = self.session().await;
        self.ledger
            .users
            .add_membership(&mut session, &self.admin, student.user_id, self.gym, Role::Student)
            .await
            .unwrap();
        self.ledger
            .tokens
            .get_or_create_wallet(&mut session, student.user_id, self.gym)
            .await
            .unwrap();
        if tokens > 0 {
            self.ledger
                .tokens
                .assign_tokens(
                    &mut session,
                    &self.admin,
                    AssignTokens {
                        user_id: student.user_id,
                        gym_id: self.gym,
                        tokens,
                        source: GrantSource::Assignment,
                        expires_at: None,
                        reason: None,
                    },
                )
                .await
                .unwrap();
        }
        student
    }

    /// Buys and confirms a plan for the student.
    pub async fn buy_plan(&self, student: &Principal, tokens: u32, rules: PlanRules) {
        let mut session = self.session().await;
        let plan = self
            .ledger
            .tokens
            .create_plan(
                &mut session,
                &self.admin,
                NewPlan {
                    gym_id: self.gym,
                    name: "Plan".to_string(),
                    tokens,
                    validity_days: 30,
                    price_minor: 100_000,
                    rules,
                },
            )
            .await
            .unwrap();
        let payment = self
            .ledger
            .tokens
            .purchase_tokens(
                &mut session,
                student,
                Purchase {
                    gym_id: self.gym,
                    plan_id: plan.id,
                    amount_minor: None,
                    currency: None,
                },
            )
            .await
            .unwrap();
        self.ledger
            .tokens
            .confirm_purchase(&mut session, payment.id)
            .await
            .unwrap();
    }

    pub async fn wallet(&self, user_id: ObjectId) -> TokenWallet {
        self.ledger
            .tokens
            .get_wallet(user_id, self.gym)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn balance(&self, user_id: ObjectId) -> u32 {
        self.wallet(user_id).await.balance
    }

    pub async fn class_between(
        &self,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        capacity: u32,
    ) -> ClassSession {
        let mut session = self.session().await;
        self.ledger
            .calendar
            .create_session(
                &mut session,
                &self.professor,
                NewSession {
                    gym_id: self.gym,
                    professor_id: self.professor.user_id,
                    room_id: self.room,
                    class_type_id: self.class_type,
                    start_at,
                    end_at,
                    capacity,
                },
            )
            .await
            .unwrap()
    }

    /// One hour class starting `after` from now.
    pub async fn class_in(&self, after: Duration, capacity: u32) -> ClassSession {
        let start_at = Utc::now() + after;
        self.class_between(start_at, start_at + Duration::hours(1), capacity)
            .await
    }

    pub async fn book(
        &self,
        student: &Principal,
        session_id: ObjectId,
    ) -> Result<BookingOutcome, LedgerError> {
        let mut session = self.session().await;
        self.ledger
            .bookings
            .create_booking(
                &mut session,
                student,
                BookingRequest::new(session_id, student.user_id),
            )
            .await
    }
}
