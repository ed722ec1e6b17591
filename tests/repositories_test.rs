mod common;

use artcc_sync::controller_hours::NewDutySession;
use artcc_sync::controller_hours_repo::{ControllerHoursRepository, DutySessionStore};
use artcc_sync::online::{NewMetar, NewOnlineController, OnlineController};
use artcc_sync::online_repo::{OnlineRepository, SnapshotSink};
use artcc_sync::pireps_repo::{PirepStore, PirepsRepository};
use artcc_sync::schema::controllers_online;
use chrono::{Duration, TimeZone, Utc};
use common::{TestDatabase, controller, stored_pirep};
use diesel::prelude::*;

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_controller_table_is_replaced_wholesale() {
    let db = TestDatabase::new().await.unwrap();
    let repo = OnlineRepository::new(db.pool());
    let logon = Utc.with_ymd_and_hms(2026, 6, 12, 1, 0, 0).unwrap();

    repo.replace_controllers(vec![
        NewOnlineController::from(&controller(1111111, "PHX_APP", logon)),
        NewOnlineController::from(&controller(2222222, "ABQ_CTR", logon)),
    ])
    .await
    .unwrap();
    repo.replace_controllers(vec![NewOnlineController::from(&controller(
        2222222, "ABQ_CTR", logon,
    ))])
    .await
    .unwrap();
    repo.replace_metars(vec![
        NewMetar::from_raw("KPHX 120051Z 27008KT 10SM FEW250 38/M02 A2990").unwrap(),
    ])
    .await
    .unwrap();

    let pool = db.pool();
    let rows = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let rows = controllers_online::table
            .select(OnlineController::as_select())
            .load(&mut conn)?;
        Ok::<Vec<OnlineController>, anyhow::Error>(rows)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].pos, "ABQ_CTR");
    assert_eq!(rows[0].time_start, logon);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_duty_session_open_is_idempotent() {
    let db = TestDatabase::new().await.unwrap();
    let repo = ControllerHoursRepository::new(db.pool());
    let logon = Utc.with_ymd_and_hms(2026, 6, 12, 1, 0, 0).unwrap();

    let session = NewDutySession::new(1111111, "PHX_APP", logon, logon + Duration::seconds(15));
    assert!(repo.open_session(&session).await.unwrap());
    assert!(
        !repo
            .open_session(&NewDutySession::new(
                1111111,
                "PHX_APP",
                logon,
                logon + Duration::seconds(30),
            ))
            .await
            .unwrap()
    );

    let found = repo.find_session(1111111, logon).await.unwrap().unwrap();
    assert_eq!(found.id, session.id);

    repo.extend_session(found.id, logon + Duration::minutes(10))
        .await
        .unwrap();

    let sessions = repo.sessions_for(1111111, 10).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].duration(), Duration::minutes(10));
    assert!(
        repo.find_session(1111111, logon + Duration::hours(1))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_pirep_purge_and_dedup() {
    let db = TestDatabase::new().await.unwrap();
    let repo = PirepsRepository::new(db.pool());
    let now = Utc.with_ymd_and_hms(2026, 7, 4, 20, 0, 0).unwrap();

    assert!(
        repo.insert(&stored_pirep("OLD AUTO", now - Duration::hours(3), false))
            .await
            .unwrap()
    );
    assert!(
        repo.insert(&stored_pirep("OLD MANUAL", now - Duration::hours(3), true))
            .await
            .unwrap()
    );
    assert!(
        repo.insert(&stored_pirep("FRESH", now - Duration::minutes(20), false))
            .await
            .unwrap()
    );
    assert!(
        !repo
            .insert(&stored_pirep("FRESH", now - Duration::minutes(20), false))
            .await
            .unwrap()
    );

    let purged = repo.purge_stale(now - Duration::hours(2)).await.unwrap();
    assert_eq!(purged, 1);

    let remaining: Vec<String> = repo
        .recent(now - Duration::days(1))
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.raw)
        .collect();
    assert_eq!(remaining, vec!["FRESH", "OLD MANUAL"]);
}
