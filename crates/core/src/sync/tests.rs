use super::*;
use crate::entities::{BillingAccount, Client, Entity, EntityKind};
use crate::fixtures::{ban, client, ts};
use crate::store::{ApplyOutcome, EntityStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn reconciler() -> SyncReconciler {
    SyncReconciler::new(Arc::new(EntityStore::new()))
}

fn wire(kind: &str, action: &str, data: serde_json::Value) -> WireUpdate {
    WireUpdate {
        entity_type: kind.to_string(),
        action: action.to_string(),
        data,
        timestamp: Some(ts("2026-03-01T12:00:00Z")),
    }
}

#[test]
fn every_action_is_idempotent() {
    let sync = reconciler();
    let created = ChangeEvent::remote(Change::Created(client("c1", "Uno").into_record()), None);
    let updated = ChangeEvent::remote(Change::Updated(client("c1", "Dos").into_record()), None);
    let deleted = ChangeEvent::remote(Change::Deleted(EntityKind::Client, "c1".into()), None);

    for event in [created, updated, deleted] {
        sync.apply(event.clone());
        let once = sync.store().snapshot();
        sync.apply(event);
        assert_eq!(sync.store().snapshot(), once);
    }
}

#[test]
fn broadcast_echo_of_local_create_is_not_duplicated() {
    let sync = reconciler();
    let local = client("c1", "Ferretería Central");

    let outcome = sync.apply(ChangeEvent::local(Change::Created(local.clone().into_record())));
    assert_eq!(outcome, ApplyOutcome::Applied);

    let echo = wire(
        "clients",
        "created",
        serde_json::to_value(&local).expect("encode client"),
    )
    .into_event()
    .expect("valid event");
    assert_eq!(sync.apply(echo), ApplyOutcome::AlreadyPresent);

    let clients: Vec<Client> = sync.store().list();
    assert_eq!(clients, vec![local]);
}

#[test]
fn deletion_dominates_prior_and_later_updates() {
    let sync = reconciler();
    sync.apply(ChangeEvent::local(Change::Created(client("c1", "v0").into_record())));
    for n in 1..=3 {
        let name = format!("v{n}");
        sync.apply(ChangeEvent::remote(
            Change::Updated(client("c1", &name).into_record()),
            None,
        ));
    }

    sync.apply(ChangeEvent::remote(
        Change::Deleted(EntityKind::Client, "c1".into()),
        None,
    ));
    let late = sync.apply(ChangeEvent::remote(
        Change::Updated(client("c1", "v4").into_record()),
        None,
    ));

    assert_eq!(late, ApplyOutcome::NotFound);
    assert!(sync.store().get::<Client>("c1").is_none());
}

#[test]
fn remote_events_use_broadcast_time_when_record_is_unstamped() {
    let sync = reconciler();
    sync.apply(ChangeEvent::local(Change::Created(client("c1", "v0").into_record())));

    let newer = ChangeEvent::remote(
        Change::Updated(client("c1", "newer").into_record()),
        Some(ts("2026-03-01T12:00:10Z")),
    );
    let older = ChangeEvent::remote(
        Change::Updated(client("c1", "older").into_record()),
        Some(ts("2026-03-01T12:00:05Z")),
    );

    assert!(sync.apply(newer).is_applied());
    assert_eq!(sync.apply(older), ApplyOutcome::Stale);
    assert_eq!(sync.store().get::<Client>("c1").expect("c1").name, "newer");
}

#[test]
fn record_timestamp_takes_precedence_over_broadcast_time() {
    let mut stamped = ban("b1", "c1", "618093419");
    stamped.last_updated = Some(ts("2026-01-05T00:00:00Z"));
    let event = ChangeEvent::remote(
        Change::Created(stamped.into_record()),
        Some(ts("2026-03-01T12:00:00Z")),
    );
    assert_eq!(event.version(), Some(ts("2026-01-05T00:00:00Z")));

    let local = ChangeEvent::local(Change::Created(client("c1", "x").into_record()));
    assert_eq!(local.version(), None);
}

#[test]
fn wire_updates_are_validated_at_the_boundary() {
    let deleted = wire("bans", "deleted", json!({ "id": 7 }))
        .into_event()
        .expect("delete event");
    assert_eq!(
        deleted.change,
        Change::Deleted(EntityKind::BillingAccount, "7".into())
    );
    assert_eq!(deleted.context, ApplyContext::RemoteBroadcast);

    assert!(matches!(
        wire("widgets", "created", json!({ "id": 1 })).into_event(),
        Err(InvalidUpdate::UnknownType(_))
    ));
    assert!(matches!(
        wire("clients", "upserted", json!({ "id": 1 })).into_event(),
        Err(InvalidUpdate::UnknownAction(_))
    ));
    assert!(matches!(
        wire("clients", "created", json!({ "name": "sin id" })).into_event(),
        Err(InvalidUpdate::MissingId(EntityKind::Client))
    ));
    assert!(matches!(
        wire("products", "updated", json!({ "id": 1, "price": "abc" })).into_event(),
        Err(InvalidUpdate::Record { .. })
    ));
}

#[test]
fn wire_update_decodes_server_json() {
    let update: WireUpdate = serde_json::from_value(json!({
        "type": "subscribers",
        "action": "created",
        "data": { "id": 12, "ban_id": 3, "phone_number": "7871234567", "status": "activo" },
        "timestamp": "2026-03-01T12:00:00.000Z"
    }))
    .expect("wire update");

    let event = update.into_event().expect("event");
    assert_eq!(event.change.kind(), EntityKind::Subscriber);
    assert_eq!(event.change.id(), "12");
    assert_eq!(event.timestamp, Some(ts("2026-03-01T12:00:00Z")));
}

#[tokio::test]
async fn ban_created_locally_then_echoed_stays_single() {
    let sync = reconciler();
    let (tx, rx) = mpsc::channel(8);
    let runner = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.run(rx).await })
    };

    let confirmed = ban("b1", "c1", "618093419");
    sync.apply(ChangeEvent::local(Change::Created(
        confirmed.clone().into_record(),
    )));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let echo = wire(
        "bans",
        "created",
        json!({ "id": "b1", "client_id": "c1", "number": "618093419", "status": "activo" }),
    )
    .into_event()
    .expect("echo");
    tx.send(echo).await.expect("send echo");
    drop(tx);

    let stats = runner.await.expect("runner");
    assert_eq!(stats, ReconcileStats { applied: 0, skipped: 1 });

    let bans: Vec<BillingAccount> = sync.store().list();
    assert_eq!(bans, vec![confirmed]);
}
