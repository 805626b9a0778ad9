use super::*;
use crate::fixtures::{ban, client, product, subscriber};
use crate::store::StoreChange;
use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

type Recorded = (String, HttpMethod, Option<Value>);

/// Gateway double that replays scripted responses in order.
#[derive(Default)]
struct FakeGateway {
    calls: Mutex<Vec<Recorded>>,
    responses: Mutex<VecDeque<Result<Value>>>,
}

impl FakeGateway {
    fn respond(&self, response: Result<Value>) {
        self.responses.lock().expect("responses").push_back(response);
    }

    fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().expect("calls").clone()
    }
}

#[async_trait]
impl CrmGateway for FakeGateway {
    async fn call(&self, path: &str, method: HttpMethod, body: Option<Value>) -> Result<Value> {
        self.calls
            .lock()
            .expect("calls")
            .push((path.to_string(), method, body));
        self.responses
            .lock()
            .expect("responses")
            .pop_front()
            .unwrap_or_else(|| Ok(json!({ "message": "ok" })))
    }
}

fn setup() -> (Arc<FakeGateway>, CrmCommands) {
    let gateway = Arc::new(FakeGateway::default());
    let store = Arc::new(EntityStore::new());
    let commands = CrmCommands::new(gateway.clone(), SyncReconciler::new(store));
    (gateway, commands)
}

fn seed(commands: &CrmCommands, snapshot: CrmSnapshot) {
    commands.store().replace_all(snapshot);
}

#[tokio::test]
async fn billing_account_created_then_echoed_stays_single() {
    let (gateway, commands) = setup();
    seed(
        &commands,
        CrmSnapshot {
            clients: vec![client("c1", "Ferretería Central")],
            ..CrmSnapshot::default()
        },
    );
    gateway.respond(Ok(json!({
        "id": "b1",
        "client_id": "c1",
        "number": "618093419",
        "status": "activo",
        "last_updated": "2026-03-01T12:00:00.000Z"
    })));

    let created = commands
        .create_billing_account(NewBillingAccount {
            client_id: "c1".into(),
            number: "618093419".into(),
        })
        .await
        .expect("create ban");
    assert_eq!(created.id, "b1");

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "/bans");
    assert_eq!(calls[0].1, HttpMethod::Post);
    assert_eq!(
        calls[0].2,
        Some(json!({ "client_id": "c1", "number": "618093419" }))
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    let echo = crate::sync::WireUpdate {
        entity_type: "bans".into(),
        action: "created".into(),
        data: json!({
            "id": "b1",
            "client_id": "c1",
            "number": "618093419",
            "status": "activo",
            "last_updated": "2026-03-01T12:00:00.000Z"
        }),
        timestamp: None,
    }
    .into_event()
    .expect("echo");
    assert_eq!(
        commands.reconciler().apply(echo),
        ApplyOutcome::AlreadyPresent
    );

    let bans: Vec<BillingAccount> = commands.store().list();
    assert_eq!(bans, vec![created]);
}

#[tokio::test]
async fn duplicate_subscriber_number_is_rejected() {
    let (gateway, commands) = setup();
    gateway.respond(Ok(json!({
        "id": 41,
        "ban_id": "b1",
        "phone_number": "7871234567",
        "status": "activo"
    })));
    let input = NewSubscriber {
        ban_id: "b1".into(),
        phone_number: "7871234567".into(),
        ..Default::default()
    };

    let first = commands
        .create_subscriber(input.clone())
        .await
        .expect("first create");
    assert_eq!(first.id, "41");

    let second = commands.create_subscriber(input).await;
    assert!(matches!(second, Err(Error::Conflict(_))));

    assert_eq!(gateway.calls().len(), 1);
    let subscribers: Vec<Subscriber> = commands.store().list();
    assert_eq!(subscribers.len(), 1);
}

#[tokio::test]
async fn server_conflict_leaves_store_untouched() {
    let (gateway, commands) = setup();
    gateway.respond(Err(Error::conflict(
        "El número de teléfono 7871234567 ya está registrado",
    )));

    let result = commands
        .create_subscriber(NewSubscriber {
            ban_id: "b1".into(),
            phone_number: "7871234567".into(),
            ..Default::default()
        })
        .await;

    match result {
        Err(err @ Error::Conflict(_)) => {
            assert!(err.user_message().contains("7871234567"));
        }
        other => panic!("expected conflict, got {:?}", other),
    }
    assert!(commands.store().is_empty());
}

#[tokio::test]
async fn failed_mutations_do_not_touch_the_store() {
    let (gateway, commands) = setup();
    seed(
        &commands,
        CrmSnapshot {
            clients: vec![client("c1", "Original")],
            ..CrmSnapshot::default()
        },
    );
    let before = commands.store().snapshot();

    gateway.respond(Err(Error::api(500, "boom")));
    let update = commands.update_client(client("c1", "Renamed")).await;
    assert!(matches!(update, Err(Error::Api { status: 500, .. })));

    gateway.respond(Err(Error::network("connection refused")));
    let delete = commands.delete_client("c1").await;
    assert!(matches!(delete, Err(Error::Network(_))));

    gateway.respond(Err(Error::auth("expired")));
    let create = commands
        .create_client(NewClient {
            name: "Nuevo".into(),
            ..Default::default()
        })
        .await;
    assert!(matches!(create, Err(Error::Auth(_))));

    assert_eq!(commands.store().snapshot(), before);
}

#[tokio::test]
async fn validation_failures_never_reach_the_gateway() {
    let (gateway, commands) = setup();

    let short_ban = commands
        .create_billing_account(NewBillingAccount {
            client_id: "c1".into(),
            number: "12345".into(),
        })
        .await;
    assert!(matches!(short_ban, Err(Error::Validation(_))));

    let negative = commands
        .create_income(NewIncome {
            date: "2026-03-01".into(),
            description: "Venta".into(),
            amount: dec!(-10),
            ..Default::default()
        })
        .await;
    assert!(matches!(negative, Err(Error::Validation(_))));

    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn create_without_server_id_is_not_applied() {
    let (gateway, commands) = setup();
    gateway.respond(Ok(json!({ "message": "Cliente creado" })));

    let result = commands
        .create_client(NewClient {
            name: "Uno".into(),
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(Error::Api { .. })));
    assert!(commands.store().is_empty());
}

#[tokio::test]
async fn created_client_keeps_local_only_fields() {
    let (gateway, commands) = setup();
    gateway.respond(Ok(json!({
        "id": 7,
        "name": "Uno",
        "email": "uno@crm.local",
        "salesperson_id": "s1"
    })));

    let created = commands
        .create_client(NewClient {
            name: "Uno".into(),
            email: "uno@crm.local".into(),
            salesperson_id: Some("s1".into()),
            ..Default::default()
        })
        .await
        .expect("create");

    assert_eq!(created.id, "7");
    assert_eq!(created.group, DEFAULT_CLIENT_GROUP);
    assert_eq!(commands.store().get::<Client>("7"), Some(created));
}

fn client_echo(action: &str, data: Value) -> ChangeEvent {
    crate::sync::WireUpdate {
        entity_type: "clients".into(),
        action: action.into(),
        data,
        timestamp: None,
    }
    .into_event()
    .expect("client echo")
}

fn stored_client(id: &str, group: &str) -> Client {
    let mut record = client(id, "Ferretería Central");
    record.group = group.to_string();
    record.product_ids = vec!["p1".to_string()];
    record
}

#[tokio::test]
async fn client_update_survives_its_echo() {
    let (gateway, commands) = setup();
    seed(
        &commands,
        CrmSnapshot {
            clients: vec![stored_client("c1", "Móvil")],
            ..CrmSnapshot::default()
        },
    );
    let server_row = json!({ "id": "c1", "name": "Ferretería Central", "city": "Caguas" });
    gateway.respond(Ok(server_row.clone()));

    let updated = commands
        .update_client(stored_client("c1", "Fijo"))
        .await
        .expect("update");
    assert_eq!(updated.group, "Fijo");
    assert_eq!(updated.city.as_deref(), Some("Caguas"));

    let outcome = commands
        .reconciler()
        .apply(client_echo("updated", server_row));
    assert!(outcome.is_applied());

    let stored: Client = commands.store().get("c1").expect("c1");
    assert_eq!(stored.group, "Fijo");
    assert_eq!(stored.product_ids, vec!["p1".to_string()]);
    assert_eq!(stored, updated);
}

#[tokio::test]
async fn client_update_echoed_before_the_response_keeps_local_fields() {
    let (gateway, commands) = setup();
    seed(
        &commands,
        CrmSnapshot {
            clients: vec![stored_client("c1", "Móvil")],
            ..CrmSnapshot::default()
        },
    );
    let server_row = json!({ "id": "c1", "name": "Ferretería Central", "city": "Caguas" });
    commands
        .reconciler()
        .apply(client_echo("updated", server_row.clone()));
    assert_eq!(
        commands.store().get::<Client>("c1").expect("c1").group,
        "Móvil"
    );
    gateway.respond(Ok(server_row));

    let updated = commands
        .update_client(stored_client("c1", "Fijo"))
        .await
        .expect("update");

    let stored: Client = commands.store().get("c1").expect("c1");
    assert_eq!(stored.group, "Fijo");
    assert_eq!(stored.city.as_deref(), Some("Caguas"));
    assert_eq!(stored, updated);
}

#[tokio::test]
async fn client_create_echoed_before_the_response_keeps_local_fields() {
    let (gateway, commands) = setup();
    let server_row = json!({ "id": 7, "name": "Uno", "email": "uno@crm.local" });
    assert!(commands
        .reconciler()
        .apply(client_echo("created", server_row.clone()))
        .is_applied());
    gateway.respond(Ok(server_row));

    let created = commands
        .create_client(NewClient {
            name: "Uno".into(),
            email: "uno@crm.local".into(),
            group: Some("Fijo".into()),
            pipeline_values: PipelineValues {
                fijo_new: dec!(120),
                ..Default::default()
            },
            ..Default::default()
        })
        .await
        .expect("create");

    assert_eq!(created.group, "Fijo");
    assert_eq!(created.pipeline_values.fijo_new, dec!(120));
    assert_eq!(commands.store().len(EntityKind::Client), 1);
    assert_eq!(commands.store().get::<Client>("7"), Some(created));
}

#[tokio::test]
async fn stale_update_response_returns_the_stored_record() {
    let (gateway, commands) = setup();
    let mut newer = client("c1", "Renombrado");
    newer.updated_at = Some(crate::fixtures::ts("2026-03-05T00:00:00Z"));
    seed(
        &commands,
        CrmSnapshot {
            clients: vec![newer.clone()],
            ..CrmSnapshot::default()
        },
    );
    gateway.respond(Ok(json!({
        "id": "c1",
        "name": "Original",
        "updated_at": "2026-03-01T00:00:00Z"
    })));

    let result = commands
        .update_client(client("c1", "Original"))
        .await
        .expect("update");

    assert_eq!(result, newer);
    assert_eq!(commands.store().get::<Client>("c1"), Some(newer));
}

#[tokio::test]
async fn update_acknowledgment_applies_submitted_record() {
    let (gateway, commands) = setup();
    seed(
        &commands,
        CrmSnapshot {
            products: vec![product("p1", "cat1")],
            ..CrmSnapshot::default()
        },
    );
    gateway.respond(Ok(json!({ "message": "Producto actualizado" })));

    let mut edited = product("p1", "cat1");
    edited.price = dec!(55.50);
    commands
        .update_product(edited.clone())
        .await
        .expect("update");

    let calls = gateway.calls();
    assert_eq!(calls[0].0, "/products/p1");
    assert_eq!(calls[0].1, HttpMethod::Put);
    assert_eq!(commands.store().get::<Product>("p1"), Some(edited));
}

#[tokio::test]
async fn cancel_subscriber_sends_cancelled_status() {
    let (gateway, commands) = setup();
    seed(
        &commands,
        CrmSnapshot {
            subscribers: vec![subscriber("sub1", "b1", "7871234567")],
            ..CrmSnapshot::default()
        },
    );

    let cancelled = commands.cancel_subscriber("sub1").await.expect("cancel");

    assert_eq!(cancelled.status, SubscriberStatus::Cancelled);
    let calls = gateway.calls();
    assert_eq!(calls[0].0, "/subscribers/sub1");
    assert_eq!(
        calls[0].2.as_ref().map(|body| body["status"].clone()),
        Some(json!("cancelado"))
    );
    assert_eq!(
        commands
            .store()
            .get::<Subscriber>("sub1")
            .map(|s| s.status),
        Some(SubscriberStatus::Cancelled)
    );
}

#[tokio::test]
async fn category_in_use_cannot_be_deleted() {
    let (gateway, commands) = setup();
    seed(
        &commands,
        CrmSnapshot {
            categories: vec![crate::fixtures::category("cat1", "Postpago")],
            products: vec![product("p1", "cat1")],
            ..CrmSnapshot::default()
        },
    );

    let result = commands.delete_category("cat1").await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(gateway.calls().is_empty());
    assert_eq!(commands.store().len(EntityKind::Category), 1);
}

#[tokio::test]
async fn deleting_client_cascades_after_confirmation() {
    let (gateway, commands) = setup();
    seed(
        &commands,
        CrmSnapshot {
            clients: vec![client("c1", "Uno")],
            billing_accounts: vec![ban("b1", "c1", "618093419")],
            subscribers: vec![subscriber("sub1", "b1", "7871234567")],
            ..CrmSnapshot::default()
        },
    );

    commands.delete_client("c1").await.expect("delete");

    assert_eq!(gateway.calls()[0].0, "/clients/c1");
    assert!(commands.store().is_empty());
}

#[tokio::test]
async fn session_scoped_commands_stay_local() {
    let (gateway, commands) = setup();
    seed(
        &commands,
        CrmSnapshot {
            clients: vec![client("c1", "Uno")],
            ..CrmSnapshot::default()
        },
    );
    let mut changes = commands.store().subscribe();

    let status = commands
        .create_pipeline_status(NewPipelineStatus {
            name: "Contactado".into(),
            color: "#3b82f6".into(),
        })
        .expect("status");
    let note = commands
        .add_pipeline_note(NewPipelineNote {
            client_id: "c1".into(),
            author_id: "s1".into(),
            text: "Llamar el lunes".into(),
        })
        .expect("note");

    let (millis, suffix) = status.id.split_once('-').expect("local id shape");
    assert!(millis.parse::<i64>().is_ok());
    assert_eq!(suffix.len(), 9);
    assert!(suffix
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    assert_ne!(status.id, note.id);

    assert!(gateway.calls().is_empty());
    assert_eq!(
        changes.try_recv().expect("change"),
        StoreChange::Record {
            kind: EntityKind::PipelineStatus,
            action: crate::sync::ChangeAction::Created,
            id: status.id.clone(),
        }
    );

    let missing = commands.update_pipeline_status(PipelineStatus {
        id: "nope".into(),
        name: "x".into(),
        color: String::new(),
    });
    assert!(matches!(missing, Err(Error::Validation(_))));
}

#[tokio::test]
async fn goal_update_merges_over_stored_goal() {
    let (gateway, commands) = setup();
    gateway.respond(Ok(json!({
        "id": 5,
        "vendedor_id": "s1",
        "meta_valor": "1000",
        "periodo": "mensual",
        "fecha_inicio": "2026-03-01",
        "fecha_fin": "2026-03-31",
        "activa": true,
        "tipo_meta": "ventas"
    })));
    let goal = commands
        .create_goal(NewGoal {
            salesperson_id: Some("s1".into()),
            target_value: dec!(1000),
            period: "mensual".into(),
            start_date: "2026-03-01".into(),
            end_date: "2026-03-31".into(),
            goal_type: "ventas".into(),
            ..Default::default()
        })
        .await
        .expect("create goal");

    let bad_window = commands
        .update_goal(
            &goal.id,
            GoalUpdate {
                end_date: Some("2026-02-01".into()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(bad_window, Err(Error::Validation(_))));

    let updated = commands
        .update_goal(
            &goal.id,
            GoalUpdate {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .expect("update goal");

    assert!(!updated.active);
    assert_eq!(updated.target_value, dec!(1000));
    let calls = gateway.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].0, "/metas/5");
    assert_eq!(
        calls[1].2.as_ref().map(|body| body["activa"].clone()),
        Some(json!(false))
    );
}

#[tokio::test]
async fn load_snapshot_replaces_dataset() {
    let (gateway, commands) = setup();
    seed(
        &commands,
        CrmSnapshot {
            clients: vec![client("stale", "Viejo")],
            ..CrmSnapshot::default()
        },
    );
    gateway.respond(Ok(json!({
        "clients": [{ "id": 1, "name": "Uno" }, { "id": 2, "name": "Dos" }],
        "bans": [{ "id": 3, "client_id": 1, "number": "618093419", "status": "activo" }],
        "salespeople": [],
        "products": []
    })));

    let stats = commands.load_snapshot().await.expect("load");

    assert_eq!(gateway.calls()[0].0, "/crm-data");
    assert_eq!(stats.total_clients, 2);
    assert_eq!(stats.active_billing_accounts, 1);
    assert!(commands.store().get::<Client>("stale").is_none());
}

#[tokio::test]
async fn broadcasts_buffered_during_the_initial_load_apply_on_top_of_it() {
    let (gateway, commands) = setup();
    let (events_tx, events_rx) = tokio::sync::mpsc::channel(8);
    for event in [
        client_echo("created", json!({ "id": 1, "name": "Uno" })),
        client_echo("updated", json!({ "id": 1, "name": "Uno SRL" })),
        client_echo("created", json!({ "id": 2, "name": "Dos" })),
    ] {
        events_tx.send(event).await.expect("buffer event");
    }
    drop(events_tx);
    gateway.respond(Ok(json!({
        "clients": [{ "id": 1, "name": "Uno", "group": "Fijo" }]
    })));

    commands.load_snapshot().await.expect("load");
    let stats = commands.reconciler().run(events_rx).await;

    assert_eq!(stats.applied, 2);
    assert_eq!(stats.skipped, 1);
    let first: Client = commands.store().get("1").expect("client 1");
    assert_eq!(first.name, "Uno SRL");
    assert_eq!(first.group, "Fijo");
    assert!(commands.store().contains(EntityKind::Client, "2"));
}
