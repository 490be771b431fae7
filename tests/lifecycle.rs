//! End-to-end tests of the revision lifecycle.
//!
//! These run against a real PostgreSQL database pointed to by
//! `TEST_DATABASE_URL` and are ignored by default:
//!
//! ```text
//! TEST_DATABASE_URL=postgres://localhost/opsman_test cargo test -- --ignored
//! ```

use chrono::NaiveDate;
use diesel::{
    Connection as _,
    connection::SimpleConnection,
    pg::PgConnection,
    prelude::*,
};
use lazy_static::lazy_static;
use std::sync::Mutex;

use opsman::{
    audit,
    db::{schema::{audit_log, field_history}, types::ManualStatus},
    models::{
        Chapter,
        Manual,
        Revision,
        User,
        manual::DecideManualError,
    },
    permissions::PermissionBits,
};

lazy_static! {
    // Tests share one database; serialize them.
    static ref DB_LOCK: Mutex<()> = Mutex::new(());
}

struct TestDb {
    conn: PgConnection,
    _system: actix::SystemRunner,
}

fn setup() -> (TestDb, User, User) {
    let url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run these tests");

    let conn = PgConnection::establish(&url)
        .expect("cannot connect to test database");

    diesel_migrations::run_pending_migrations(&conn)
        .expect("cannot run migrations");

    // TRUNCATE does not fire row-level triggers, so the append-only rule
    // doesn't get in the way of resetting state between tests.
    conn.batch_execute(
        "TRUNCATE users, manuals, chapters, revisions, field_history, \
        audit_log, events RESTART IDENTITY CASCADE",
    ).expect("cannot clear test database");

    let author = User::create(
        &conn,
        audit::Actor::System,
        "author@example.com",
        "Author",
        false,
        PermissionBits::EDIT_MANUAL,
    ).expect("cannot create author");

    let reviewer = User::create(
        &conn,
        audit::Actor::System,
        "reviewer@example.com",
        "Reviewer",
        false,
        PermissionBits::REVIEW_DECISION,
    ).expect("cannot create reviewer");

    let db = TestDb {
        conn,
        // Notification dispatch resolves the event manager from the actix
        // system registry; give each test a system of its own.
        _system: actix::System::new("opsman-test"),
    };

    (db, author, reviewer)
}

#[test]
#[ignore]
fn manual_walks_the_full_lifecycle() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (db, author, reviewer) = setup();
    let db = &db.conn;

    // Creation leaves the manual in draft with a draft revision "1".
    let mut manual = Manual::create(db, &author, "GOM", "Acme Air").unwrap();
    assert_eq!(manual.status, ManualStatus::Draft);

    let revisions = Revision::all_of(db, manual.id()).unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].revision_number, "1");
    assert_eq!(revisions[0].status, ManualStatus::Draft);

    // Submission promotes the existing draft revision in place.
    let revision = manual.submit_for_review(db, &author).unwrap();
    assert_eq!(revision.id, revisions[0].id);
    assert_eq!(revision.revision_number, "1");
    assert_eq!(revision.status, ManualStatus::InReview);
    assert_eq!(
        Manual::by_id(db, manual.id()).unwrap().status,
        ManualStatus::InReview,
    );

    // Rejection records the reason and reopens the manual for editing.
    let rejected = manual.reject(db, revision.id, &reviewer, "incomplete").unwrap();
    assert_eq!(rejected.status, ManualStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_ref().unwrap(), "incomplete");
    assert_eq!(
        Manual::by_id(db, manual.id()).unwrap().status,
        ManualStatus::Rejected,
    );

    // Resubmission promotes the same revision again, reusing its number.
    let resubmitted = manual.submit_for_review(db, &author).unwrap();
    assert_eq!(resubmitted.id, revision.id);
    assert_eq!(resubmitted.revision_number, "1");
    assert_eq!(Revision::all_of(db, manual.id()).unwrap().len(), 1);

    // Approval advances the visible revision label.
    let effective = NaiveDate::from_ymd(2025, 1, 1);
    let approved = manual
        .approve(db, resubmitted.id, &reviewer, effective, None)
        .unwrap();
    assert_eq!(approved.status, ManualStatus::Approved);

    let reread = Manual::by_id(db, manual.id()).unwrap();
    assert_eq!(reread.status, ManualStatus::Approved);
    assert_eq!(reread.current_revision.as_ref().unwrap(), "1");
    assert_eq!(reread.effective_date, Some(effective));

    // Starting the next cycle creates draft revision "2".
    let next = manual.start_next_revision(db, &author).unwrap();
    assert_eq!(next.revision_number, "2");
    assert_eq!(next.status, ManualStatus::Draft);
    assert_eq!(
        Manual::by_id(db, manual.id()).unwrap().status,
        ManualStatus::Draft,
    );
    assert_eq!(Revision::all_of(db, manual.id()).unwrap().len(), 2);
}

#[test]
#[ignore]
fn second_approval_fails_its_precondition() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (db, author, reviewer) = setup();
    let db = &db.conn;

    let mut manual = Manual::create(db, &author, "GOM", "Acme Air").unwrap();
    let revision = manual.submit_for_review(db, &author).unwrap();

    let effective = NaiveDate::from_ymd(2025, 1, 1);
    manual.approve(db, revision.id, &reviewer, effective, None).unwrap();

    // A duplicate approval observes the already-updated status. Under true
    // concurrency the row lock taken by the first transaction forces this
    // same serialization.
    let mut manual = Manual::by_id(db, manual.id()).unwrap();
    match manual.approve(db, revision.id, &reviewer, effective, None) {
        Err(DecideManualError::BadStatus(ManualStatus::Approved)) => (),
        other => panic!("expected BadStatus(Approved), got {:?}", other.map(|_| ())),
    }
}

#[test]
#[ignore]
fn approved_snapshots_are_frozen() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (db, author, reviewer) = setup();
    let db = &db.conn;

    let mut manual = Manual::create(db, &author, "GOM", "Acme Air").unwrap();

    Chapter::by_id(db, manual.id(), 0)
        .unwrap()
        .set_content(db, &author, None, "original text")
        .unwrap();

    let revision = manual.submit_for_review(db, &author).unwrap();
    manual
        .approve(db, revision.id, &reviewer, NaiveDate::from_ymd(2025, 1, 1), None)
        .unwrap();

    let stored = Revision::by_id(db, manual.id(), revision.id)
        .unwrap()
        .snapshot
        .clone();

    // Edit the live manual in the next cycle.
    manual.start_next_revision(db, &author).unwrap();
    Chapter::by_id(db, manual.id(), 0)
        .unwrap()
        .set_content(db, &author, None, "rewritten text")
        .unwrap();

    let reread = Revision::by_id(db, manual.id(), revision.id)
        .unwrap()
        .snapshot
        .clone();

    assert_eq!(reread, stored);
    assert!(reread.to_string().contains("original text"));
    assert!(!reread.to_string().contains("rewritten text"));
}

#[test]
#[ignore]
fn field_history_records_each_changed_field_once() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (db, author, _) = setup();
    let db = &db.conn;

    let mut manual = Manual::create(db, &author, "GOM", "Acme Air").unwrap();

    manual.update(db, &author, opsman::models::manual::ManualUpdate {
        title: Some("GOM 2"),
        organization: None,
    }).unwrap();

    let record = manual.id().to_string();

    let titles: i64 = field_history::table
        .filter(field_history::table_name.eq("manuals")
            .and(field_history::record_id.eq(record.as_str()))
            .and(field_history::field_name.eq("title")))
        .count()
        .get_result(db)
        .unwrap();
    assert_eq!(titles, 1);

    let organizations: i64 = field_history::table
        .filter(field_history::table_name.eq("manuals")
            .and(field_history::record_id.eq(record.as_str()))
            .and(field_history::field_name.eq("organization")))
        .count()
        .get_result(db)
        .unwrap();
    assert_eq!(organizations, 0);

    // A second edit back to the original value still produces a new row.
    manual.update(db, &author, opsman::models::manual::ManualUpdate {
        title: Some("GOM"),
        organization: None,
    }).unwrap();

    let titles: i64 = field_history::table
        .filter(field_history::table_name.eq("manuals")
            .and(field_history::record_id.eq(record.as_str()))
            .and(field_history::field_name.eq("title")))
        .count()
        .get_result(db)
        .unwrap();
    assert_eq!(titles, 2);
}

#[test]
#[ignore]
fn audit_log_refuses_rewrites_at_the_storage_layer() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (db, author, _) = setup();
    let db = &db.conn;

    Manual::create(db, &author, "GOM", "Acme Air").unwrap();

    let before: i64 = audit_log::table.count().get_result(db).unwrap();
    assert!(before > 0);

    let forged = diesel::update(audit_log::table)
        .set(audit_log::action.eq("forged"))
        .execute(db);
    assert!(forged.is_err());

    let erased = diesel::delete(audit_log::table).execute(db);
    assert!(erased.is_err());

    let after: i64 = audit_log::table.count().get_result(db).unwrap();
    assert_eq!(after, before);
}

#[test]
#[ignore]
fn revision_numbers_stay_unique_and_monotonic() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let (db, author, reviewer) = setup();
    let db = &db.conn;

    let mut manual = Manual::create(db, &author, "GOM", "Acme Air").unwrap();
    let effective = NaiveDate::from_ymd(2025, 1, 1);

    for _ in 0..3 {
        let revision = manual.submit_for_review(db, &author).unwrap();
        manual.approve(db, revision.id, &reviewer, effective, None).unwrap();
        manual.start_next_revision(db, &author).unwrap();
    }

    let revisions = Revision::all_of(db, manual.id()).unwrap();
    let numbers = revisions.iter()
        .map(|r| r.revision_number.clone())
        .collect::<Vec<_>>();

    assert_eq!(numbers, ["1", "2", "3", "4"]);

    let mut seen = numbers.clone();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), numbers.len());
}
