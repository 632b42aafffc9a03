pub mod booking;
pub mod calendar;
pub mod collection;
pub mod history;
pub mod payment;
pub mod plan;
pub mod session;
pub mod template;
pub mod token;
pub mod user;
pub mod waitlist;

use booking::BookingStore;
use calendar::CalendarStore;
use history::HistoryStore;
use payment::PaymentStore;
use plan::PlanStore;
use session::Db;
use template::TemplateStore;
use token::{GrantStore, WalletStore};
use user::{MembershipStore, UserStore};
use waitlist::WaitlistStore;

#[derive(Clone)]
pub struct Storage {
    pub db: Db,
    pub users: UserStore,
    pub memberships: MembershipStore,
    pub wallets: WalletStore,
    pub grants: GrantStore,
    pub plans: PlanStore,
    pub payments: PaymentStore,
    pub calendar: CalendarStore,
    pub templates: TemplateStore,
    pub bookings: BookingStore,
    pub waitlist: WaitlistStore,
    pub history: HistoryStore,
}

impl Storage {
    pub fn new() -> Self {
        Storage {
            db: Db::new(),
            users: UserStore::new(),
            memberships: MembershipStore::new(),
            wallets: WalletStore::new(),
            grants: GrantStore::new(),
            plans: PlanStore::new(),
            payments: PaymentStore::new(),
            calendar: CalendarStore::new(),
            templates: TemplateStore::new(),
            bookings: BookingStore::new(),
            waitlist: WaitlistStore::new(),
            history: HistoryStore::new(),
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Storage::new()
    }
}
