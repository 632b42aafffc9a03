use bson::oid::ObjectId;
use chrono::{Datelike as _, Duration, Local, NaiveTime, Utc, Weekday};
use eyre::{eyre, Result};
use ledger::{
    service::{
        bookings::BookingRequest,
        calendar::{NewSession, NewTemplate},
        tokens::{NewPlan, Purchase},
    },
    Ledger,
};
use log::info;
use model::{
    class_session::SessionFilter,
    plan::PlanRules,
    rights::{Principal, Role},
};

/// Demo studio with two professors, three students and a week of classes.
pub struct Studio {
    pub gym: ObjectId,
    pub admin: Principal,
    pub professors: Vec<Principal>,
    pub students: Vec<Principal>,
    pub functional: ObjectId,
}

struct TemplateSeed {
    professor: usize,
    room: ObjectId,
    class_type: ObjectId,
    days: Vec<Weekday>,
    start: (u32, u32),
    duration_min: u32,
    capacity: u32,
}

pub async fn seed(ledger: &Ledger) -> Result<Studio> {
    let mut session = ledger.db.start_session().await;
    let gym = ObjectId::new();

    let admin = ledger
        .users
        .create_user(&mut session, "Admin Principal".to_string(), Role::Admin)
        .await?;
    let admin = Principal::new(admin.id, Role::Admin);
    ledger
        .users
        .add_membership(&mut session, &admin, admin.user_id, gym, Role::Admin)
        .await?;

    let mut professors = vec![];
    for name in ["María González", "Carlos Rodríguez"] {
        let user = ledger
            .users
            .create_user(&mut session, name.to_string(), Role::Professor)
            .await?;
        ledger
            .users
            .add_membership(&mut session, &admin, user.id, gym, Role::Professor)
            .await?;
        professors.push(Principal::new(user.id, Role::Professor));
    }

    let mut students = vec![];
    for name in ["Ana Martínez", "Luis Fernández", "Sofia López"] {
        let user = ledger
            .users
            .create_user(&mut session, name.to_string(), Role::Student)
            .await?;
        ledger
            .users
            .add_membership(&mut session, &admin, user.id, gym, Role::Student)
            .await?;
        ledger
            .tokens
            .get_or_create_wallet(&mut session, user.id, gym)
            .await?;
        students.push(Principal::new(user.id, Role::Student));
    }

    let main_room = ObjectId::new();
    let pole_room = ObjectId::new();
    let flex_room = ObjectId::new();
    let pole = ObjectId::new();
    let flexibility = ObjectId::new();
    let functional = ObjectId::new();
    let yoga = ObjectId::new();

    let plans = [
        ("Plan Básico", 10, 30, 500_000, 24, true, false),
        ("Plan Premium", 25, 60, 1_200_000, 12, false, true),
        ("Plan Pole Sport", 8, 30, 800_000, 6, true, false),
    ];
    for ((name, tokens, validity_days, price_minor, hours, no_show_penalty, transferable), student) in
        plans.into_iter().zip(&students)
    {
        let plan = ledger
            .tokens
            .create_plan(
                &mut session,
                &admin,
                NewPlan {
                    gym_id: gym,
                    name: name.to_string(),
                    tokens,
                    validity_days,
                    price_minor,
                    rules: PlanRules {
                        cancel_before_hours: Some(hours),
                        no_show_penalty,
                        transferable,
                    },
                },
            )
            .await?;
        let payment = ledger
            .tokens
            .purchase_tokens(
                &mut session,
                student,
                Purchase {
                    gym_id: gym,
                    plan_id: plan.id,
                    amount_minor: None,
                    currency: None,
                },
            )
            .await?;
        ledger
            .tokens
            .confirm_purchase(&mut session, payment.id)
            .await?;
    }

    let templates = [
        TemplateSeed {
            professor: 0,
            room: pole_room,
            class_type: pole,
            days: vec![Weekday::Mon, Weekday::Wed, Weekday::Fri],
            start: (18, 0),
            duration_min: 60,
            capacity: 15,
        },
        TemplateSeed {
            professor: 1,
            room: flex_room,
            class_type: flexibility,
            days: vec![Weekday::Tue, Weekday::Thu],
            start: (19, 0),
            duration_min: 45,
            capacity: 12,
        },
        TemplateSeed {
            professor: 0,
            room: main_room,
            class_type: functional,
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            start: (7, 0),
            duration_min: 50,
            capacity: 20,
        },
        TemplateSeed {
            professor: 1,
            room: main_room,
            class_type: yoga,
            days: vec![Weekday::Sat],
            start: (9, 0),
            duration_min: 75,
            capacity: 20,
        },
    ];

    let mut next_monday = Local::now().date_naive() + Duration::days(1);
    while next_monday.weekday() != Weekday::Mon {
        next_monday += Duration::days(1);
    }
    for seed in templates {
        let professor = professors[seed.professor];
        let start_time = NaiveTime::from_hms_opt(seed.start.0, seed.start.1, 0)
            .ok_or_else(|| eyre!("Invalid start time {:?}", seed.start))?;
        let template = ledger
            .calendar
            .create_template(
                &mut session,
                &professor,
                NewTemplate {
                    gym_id: gym,
                    professor_id: professor.user_id,
                    room_id: seed.room,
                    class_type_id: seed.class_type,
                    days_of_week: seed.days,
                    start_time,
                    duration_min: seed.duration_min,
                    capacity: seed.capacity,
                },
            )
            .await?;
        let report = ledger
            .calendar
            .generate_from_template(&mut session, &professor, template.id, next_monday, 1)
            .await?;
        info!(
            "Template {}: {} sessions, {} errors",
            template.id,
            report.generated,
            report.errors.len()
        );
    }

    Ok(Studio {
        gym,
        admin,
        professors,
        students,
        functional,
    })
}

/// Books a one-seat class twice, cancels the first booking and prints what
/// happened at each step.
pub async fn run_scenario(ledger: &Ledger, studio: &Studio) -> Result<()> {
    let mut session = ledger.db.start_session().await;
    let professor = studio.professors[0];
    let ana = studio.students[0];
    let luis = studio.students[1];

    // Own room, off the generated schedule.
    let trial_room = ObjectId::new();
    let start_at = Utc::now() + Duration::days(2);
    let class = ledger
        .calendar
        .create_session(
            &mut session,
            &professor,
            NewSession {
                gym_id: studio.gym,
                professor_id: professor.user_id,
                room_id: trial_room,
                class_type_id: studio.functional,
                start_at,
                end_at: start_at + Duration::minutes(50),
                capacity: 1,
            },
        )
        .await?;

    let first = ledger
        .bookings
        .create_booking(&mut session, &ana, BookingRequest::new(class.id, ana.user_id))
        .await?;
    println!("{}", serde_json::to_string_pretty(&first)?);
    let second = ledger
        .bookings
        .create_booking(&mut session, &luis, BookingRequest::new(class.id, luis.user_id))
        .await?;
    println!("{}", serde_json::to_string_pretty(&second)?);

    let booking = first
        .booking()
        .ok_or_else(|| eyre!("First booking was not seated"))?;
    let cancel = ledger
        .bookings
        .cancel_booking(
            &mut session,
            &ana,
            booking.id,
            Some("demo cancellation".to_string()),
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&cancel)?);

    let sweep = ledger
        .tokens
        .sweep_expired_grants(&mut session, Utc::now())
        .await?;
    println!("{}", serde_json::to_string_pretty(&sweep)?);

    for student in &studio.students {
        let wallet = ledger.tokens.get_wallet(student.user_id, studio.gym).await?;
        println!("{}", serde_json::to_string_pretty(&wallet)?);
    }

    let week = ledger
        .calendar
        .get_sessions(&SessionFilter::gym(studio.gym))
        .await?;
    info!("{} sessions scheduled", week.len());
    let stats = ledger
        .calendar
        .session_stats(studio.gym, None, None)
        .await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let logs = ledger.history.actor_logs(studio.admin.user_id, 5, 0).await?;
    info!("Last admin actions: {}", logs.len());
    Ok(())
}
