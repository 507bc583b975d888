//! Repository tests against a live PostgreSQL
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p hope-server -- --ignored

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use hope_server::credentials::hash_secret;
use hope_server::db::{
    create_pool, migrations, AuthorRef, Decision, DbError, DonationRepo, EventRepo, ForumRepo,
    NewDonation, NewEvent, NewNotification, NewPost, NewReportCard, NewScholar, NewUser,
    NotificationRepo, Patch, Recipient, ReportCardRepo, ScholarRepo, User, UserRepo,
};
use hope_server::models::{ActorKind, Money, Pagination, UserRole, VerificationDecision};

async fn setup() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let pool = create_pool(&url).await.expect("pool creation failed");
    migrations::run(&pool).await.expect("migrations failed");
    pool
}

fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

async fn register(pool: &PgPool, role: UserRole) -> User {
    let username = unique(role.as_str());
    UserRepo::new(pool)
        .register(NewUser {
            email: format!("{}@example.org", username),
            username,
            password_hash: hash_secret("long enough secret").unwrap(),
            full_name: "Test Person".into(),
            phone: None,
            address: None,
            role,
        })
        .await
        .expect("register failed")
}

async fn open_event(pool: &PgPool, capacity: i32) -> Uuid {
    EventRepo::new(pool)
        .create(NewEvent {
            title: unique("event"),
            description: None,
            location: Some("Barangay Hall".into()),
            latitude: None,
            longitude: None,
            starts_at: Utc::now() + Duration::days(7),
            ends_at: None,
            total_volunteers: capacity,
            created_by: Uuid::new_v4(),
            created_by_type: ActorKind::Staff,
        })
        .await
        .expect("event create failed")
        .id
}

async fn scholar(pool: &PgPool) -> User {
    let user = register(pool, UserRole::Scholar).await;
    ScholarRepo::new(pool)
        .create(NewScholar {
            user_id: user.id,
            school: "Polytechnic University".into(),
            course: Some("BS Education".into()),
            year_level: Some("2nd year".into()),
            amount_needed: Money::from_cents(5_000_000).unwrap(),
        })
        .await
        .expect("scholar create failed");
    user
}

#[tokio::test]
#[ignore = "requires database"]
async fn duplicate_username_is_a_conflict() {
    let pool = setup().await;
    let first = register(&pool, UserRole::Volunteer).await;

    let err = UserRepo::new(&pool)
        .register(NewUser {
            username: first.username.clone(),
            email: format!("{}@elsewhere.org", unique("x")),
            password_hash: hash_secret("long enough secret").unwrap(),
            full_name: "Someone Else".into(),
            phone: None,
            address: None,
            role: UserRole::Volunteer,
        })
        .await
        .unwrap_err();

    match err {
        DbError::Conflict { field, .. } => assert_eq!(field.as_deref(), Some("username")),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires database"]
async fn usernames_differing_only_in_case_collide() {
    let pool = setup().await;
    let first = register(&pool, UserRole::Volunteer).await;
    let shouted = first.username.to_uppercase();

    let err = UserRepo::new(&pool)
        .register(NewUser {
            username: shouted.clone(),
            email: format!("{}@elsewhere.org", unique("x")),
            password_hash: hash_secret("long enough secret").unwrap(),
            full_name: "Someone Else".into(),
            phone: None,
            address: None,
            role: UserRole::Volunteer,
        })
        .await
        .unwrap_err();
    match err {
        DbError::Conflict { field, .. } => assert_eq!(field.as_deref(), Some("username")),
        other => panic!("expected conflict, got {other:?}"),
    }

    let creds = UserRepo::new(&pool)
        .credentials(&shouted)
        .await
        .unwrap()
        .expect("login by any case finds the account");
    assert_eq!(creds.id, first.id);
}

#[tokio::test]
#[ignore = "requires database"]
async fn event_end_cannot_move_before_start() {
    let pool = setup().await;
    let event_id = open_event(&pool, 5).await;

    let mut patch = Patch::new("events", "id");
    patch.set("ends_at", Utc::now());
    let err = EventRepo::new(&pool).update(event_id, patch).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }), "got {err:?}");
}

#[tokio::test]
#[ignore = "requires database"]
async fn join_respects_capacity() {
    let pool = setup().await;
    let repo = EventRepo::new(&pool);
    let event_id = open_event(&pool, 1).await;
    let first = register(&pool, UserRole::Volunteer).await;
    let second = register(&pool, UserRole::Volunteer).await;

    let event = repo.join(event_id, first.id).await.unwrap();
    assert_eq!(event.current_volunteers, 1);
    assert!(event.is_full());

    let again = repo.join(event_id, first.id).await.unwrap_err();
    assert!(matches!(again, DbError::Conflict { .. }));

    let full = repo.join(event_id, second.id).await.unwrap_err();
    match full {
        DbError::Conflict { message, .. } => assert_eq!(message, "event is full"),
        other => panic!("expected conflict, got {other:?}"),
    }

    let event = repo.leave(event_id, first.id).await.unwrap();
    assert_eq!(event.current_volunteers, 0);
    repo.join(event_id, second.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires database"]
async fn concurrent_joins_never_overfill() {
    let pool = setup().await;
    let event_id = open_event(&pool, 3).await;

    let mut volunteers = Vec::new();
    for _ in 0..8 {
        volunteers.push(register(&pool, UserRole::Volunteer).await.id);
    }

    let handles: Vec<_> = volunteers
        .into_iter()
        .map(|user_id| {
            let pool = pool.clone();
            tokio::spawn(async move { EventRepo::new(&pool).join(event_id, user_id).await })
        })
        .collect();

    let mut joined = 0;
    for handle in handles {
        if handle.await.expect("task panicked").is_ok() {
            joined += 1;
        }
    }
    assert_eq!(joined, 3);

    let event = EventRepo::new(&pool).get(event_id).await.unwrap();
    assert_eq!(event.current_volunteers, 3);
    assert_eq!(EventRepo::new(&pool).participants(event_id).await.unwrap().len(), 3);
}

#[tokio::test]
#[ignore = "requires database"]
async fn sponsors_cannot_join_events() {
    let pool = setup().await;
    let event_id = open_event(&pool, 5).await;
    let sponsor = register(&pool, UserRole::Sponsor).await;

    let err = EventRepo::new(&pool).join(event_id, sponsor.id).await.unwrap_err();
    assert!(matches!(err, DbError::Forbidden { .. }));
}

#[tokio::test]
#[ignore = "requires database"]
async fn donation_is_decided_once() {
    let pool = setup().await;
    let sponsor = register(&pool, UserRole::Sponsor).await;
    let scholar = scholar(&pool).await;
    let repo = DonationRepo::new(&pool);

    let donation = repo
        .create(NewDonation {
            sponsor_id: sponsor.id,
            scholar_id: scholar.id,
            amount: Money::from_cents(250_000).unwrap(),
            reference: Some("BANK-REF-1".into()),
            proof_url: None,
            message: None,
        })
        .await
        .unwrap();
    assert_eq!(donation.verification_status, "pending");

    let admin_id = Uuid::new_v4();
    let verify = || Decision {
        decision: VerificationDecision::Verify,
        admin_id,
        reason: None,
    };
    let verified = repo.decide(donation.id, verify()).await.unwrap();
    assert_eq!(verified.verification_status, "verified");

    let err = repo.decide(donation.id, verify()).await.unwrap_err();
    match err {
        DbError::Conflict { message, .. } => assert_eq!(message, "donation already verified"),
        other => panic!("expected conflict, got {other:?}"),
    }

    let profile = ScholarRepo::new(&pool).get(scholar.id).await.unwrap();
    assert_eq!(profile.amount_received_cents, 250_000);

    let sponsor_inbox = NotificationRepo::new(&pool)
        .unread_count(Recipient::user(sponsor.id))
        .await
        .unwrap();
    assert!(sponsor_inbox >= 1);
}

#[tokio::test]
#[ignore = "requires database"]
async fn report_card_renewal_archives_previous() {
    let pool = setup().await;
    let scholar = scholar(&pool).await;
    let repo = ReportCardRepo::new(&pool);

    let card = |term: &str| NewReportCard {
        scholar_id: scholar.id,
        academic_year: "2026-2027".into(),
        term: term.into(),
        file_url: format!("https://files.example.org/{}.pdf", term),
        gpa: Some(1.5),
        remarks: None,
    };

    let first = repo.submit(card("first")).await.unwrap();
    let second = repo.submit(card("second")).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(second.verification_status, "pending");

    let current = repo.current(scholar.id).await.unwrap();
    assert_eq!(current.term, "second");

    let history = repo.history(scholar.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].original_id, first.id);
}

#[tokio::test]
#[ignore = "requires database"]
async fn page_past_the_end_is_empty() {
    let pool = setup().await;
    let volunteer = register(&pool, UserRole::Volunteer).await;
    let repo = NotificationRepo::new(&pool);
    repo.create(NewNotification {
        recipient: Recipient::user(volunteer.id),
        title: "Welcome".into(),
        message: "Thanks for signing up".into(),
        kind: "account".into(),
    })
    .await
    .unwrap();

    let first = repo
        .list_for(Recipient::user(volunteer.id), false, Pagination::new(1, 10))
        .await
        .unwrap();
    assert_eq!((first.items.len(), first.total), (1, 1));

    let beyond = repo
        .list_for(Recipient::user(volunteer.id), false, Pagination::new(u32::MAX, 100))
        .await
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 0);
    assert_eq!(beyond.page, u32::MAX);
}

#[tokio::test]
#[ignore = "requires database"]
async fn deleting_a_user_removes_their_content() {
    let pool = setup().await;
    let volunteer = register(&pool, UserRole::Volunteer).await;
    let event_id = open_event(&pool, 10).await;
    EventRepo::new(&pool).join(event_id, volunteer.id).await.unwrap();

    let author = AuthorRef {
        id: volunteer.id,
        kind: ActorKind::User,
    };
    ForumRepo::new(&pool)
        .create_post(NewPost {
            author,
            title: "Thank you".into(),
            content: "Great turnout last weekend".into(),
            category: None,
            poll: None,
        })
        .await
        .unwrap();
    NotificationRepo::new(&pool)
        .create(NewNotification {
            recipient: Recipient::user(volunteer.id),
            title: "Welcome".into(),
            message: "Thanks for signing up".into(),
            kind: "account".into(),
        })
        .await
        .unwrap();

    let purge = UserRepo::new(&pool).delete(volunteer.id).await.unwrap();
    assert_eq!(purge.participations, 1);
    assert_eq!(purge.posts, 1);
    assert!(purge.notifications >= 1);

    let err = UserRepo::new(&pool).get(volunteer.id).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));

    let event = EventRepo::new(&pool).get(event_id).await.unwrap();
    assert_eq!(event.current_volunteers, 0);
}
