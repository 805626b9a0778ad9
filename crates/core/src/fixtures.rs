//! Record builders shared by unit tests.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::entities::{
    BillingAccount, Category, Client, PipelineNote, PipelineStatus, Product, Salesperson,
    Subscriber,
};

pub fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("timestamp")
        .with_timezone(&Utc)
}

pub fn client(id: &str, name: &str) -> Client {
    serde_json::from_value(json!({ "id": id, "name": name, "email": format!("{id}@crm.local") }))
        .expect("client fixture")
}

pub fn salesperson(id: &str) -> Salesperson {
    serde_json::from_value(json!({ "id": id, "name": format!("Seller {id}"), "rol": "vendedor" }))
        .expect("salesperson fixture")
}

pub fn ban(id: &str, client_id: &str, number: &str) -> BillingAccount {
    serde_json::from_value(json!({
        "id": id,
        "clientId": client_id,
        "number": number,
        "status": "activo"
    }))
    .expect("ban fixture")
}

pub fn subscriber(id: &str, ban_id: &str, phone: &str) -> Subscriber {
    serde_json::from_value(json!({ "id": id, "banId": ban_id, "phoneNumber": phone }))
        .expect("subscriber fixture")
}

pub fn category(id: &str, name: &str) -> Category {
    serde_json::from_value(json!({ "id": id, "name": name })).expect("category fixture")
}

pub fn product(id: &str, category_id: &str) -> Product {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Plan {id}"),
        "categoryId": category_id,
        "price": "45.00"
    }))
    .expect("product fixture")
}

pub fn pipeline_status(id: &str) -> PipelineStatus {
    serde_json::from_value(json!({ "id": id, "name": "Contactado", "color": "#3b82f6" }))
        .expect("pipeline status fixture")
}

pub fn pipeline_note(id: &str, client_id: &str) -> PipelineNote {
    serde_json::from_value(json!({
        "id": id,
        "clientId": client_id,
        "authorId": "s1",
        "text": "Llamar el lunes",
        "createdAt": "2026-02-01T15:00:00Z"
    }))
    .expect("pipeline note fixture")
}
