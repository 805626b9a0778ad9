//! Request bodies in the server's column naming.

use serde_json::{json, Map, Value};

use crate::entities::{
    BillingAccount, Category, Client, Expense, Goal, Income, NewBillingAccount, NewCategory,
    NewClient, NewExpense, NewGoal, NewIncome, NewProduct, NewSalesperson, NewSubscriber,
    Product, Salesperson, Subscriber, DEFAULT_CLIENT_GROUP,
};

pub(crate) fn new_salesperson(input: &NewSalesperson) -> Value {
    json!({
        "name": input.name,
        "email": input.email,
        "avatar": input.avatar,
        "monthly_sales_goal": input.monthly_sales_goal,
        "role": input.role,
    })
}

pub(crate) fn salesperson(record: &Salesperson) -> Value {
    json!({
        "name": record.name,
        "email": record.email,
        "avatar": record.avatar,
        "monthly_sales_goal": record.monthly_sales_goal,
        "role": record.role,
    })
}

pub(crate) fn new_category(input: &NewCategory) -> Value {
    json!({ "name": input.name })
}

pub(crate) fn category(record: &Category) -> Value {
    json!({ "name": record.name })
}

pub(crate) fn new_product(input: &NewProduct) -> Value {
    json!({
        "name": input.name,
        "category_id": input.category_id,
        "price": input.price,
        "monthly_goal": input.monthly_goal,
    })
}

pub(crate) fn product(record: &Product) -> Value {
    json!({
        "name": record.name,
        "category_id": record.category_id,
        "price": record.price,
        "monthly_goal": record.monthly_goal,
    })
}

pub(crate) fn new_client(input: &NewClient) -> Value {
    json!({
        "name": input.name,
        "company": input.company,
        "email": input.email,
        "phone": input.phone,
        "mobile": input.mobile,
        "salesperson_id": input.salesperson_id,
        "pipeline_status_id": input.pipeline_status_id,
        "group": input.group.as_deref().unwrap_or(DEFAULT_CLIENT_GROUP),
    })
}

pub(crate) fn client(record: &Client) -> Value {
    json!({
        "name": record.name,
        "company": record.company,
        "email": record.email,
        "phone": record.phone,
        "mobile": record.mobile,
        "address": record.address,
        "city": record.city,
        "zip_code": record.zip_code,
        "tax_id": record.tax_id,
        "notes": record.notes,
        "salesperson_id": record.salesperson_id,
        "pipeline_status_id": record.pipeline_status_id,
        "is_completed": record.is_completed,
        "priority": record.priority,
        "group": record.group,
        "date_called": record.date_called,
        "date_to_call": record.date_to_call,
    })
}

pub(crate) fn new_billing_account(input: &NewBillingAccount) -> Value {
    json!({
        "client_id": input.client_id,
        "number": input.number,
    })
}

pub(crate) fn billing_account(record: &BillingAccount) -> Value {
    json!({
        "client_id": record.client_id,
        "number": record.number,
        "status": record.status,
    })
}

pub(crate) fn new_subscriber(input: &NewSubscriber) -> Value {
    json!({
        "ban_id": input.ban_id,
        "phone_number": input.phone_number,
        "status": input.status,
        "product_id": input.product_id,
        "category_id": input.category_id,
        "contract_end_date": input.contract_end_date,
        "equipment": input.equipment,
        "city": input.city,
        "months_sold": input.months_sold,
        "payments_made": input.payments_made,
    })
}

pub(crate) fn subscriber(record: &Subscriber) -> Value {
    json!({
        "ban_id": record.ban_id,
        "phone_number": record.phone_number,
        "status": record.status,
        "product_id": record.product_id,
        "category_id": record.category_id,
        "contract_end_date": record.contract_end_date,
        "equipment": record.equipment,
        "city": record.city,
        "months_sold": record.months_sold,
        "payments_made": record.payments_made,
    })
}

pub(crate) fn new_income(input: &NewIncome) -> Value {
    json!({
        "date": input.date,
        "description": input.description,
        "amount": input.amount,
        "product_id": input.product_id,
        "salesperson_id": input.salesperson_id,
        "client_id": input.client_id,
    })
}

pub(crate) fn income(record: &Income) -> Value {
    json!({
        "date": record.date,
        "description": record.description,
        "amount": record.amount,
        "product_id": record.product_id,
        "salesperson_id": record.salesperson_id,
        "client_id": record.client_id,
    })
}

pub(crate) fn new_expense(input: &NewExpense) -> Value {
    json!({
        "date": input.date,
        "description": input.description,
        "amount": input.amount,
        "category": input.category,
    })
}

pub(crate) fn expense(record: &Expense) -> Value {
    json!({
        "date": record.date,
        "description": record.description,
        "amount": record.amount,
        "category": record.category,
    })
}

/// Goals use the camelCase Spanish keys the `/metas` endpoint expects.
/// A whole-business goal omits `vendedorId` entirely.
pub(crate) fn new_goal(input: &NewGoal) -> Value {
    let mut body = Map::new();
    if let Some(salesperson_id) = &input.salesperson_id {
        body.insert("vendedorId".into(), json!(salesperson_id));
    }
    body.insert("metaValor".into(), json!(input.target_value));
    body.insert("periodo".into(), json!(input.period));
    body.insert("fechaInicio".into(), json!(input.start_date));
    body.insert("fechaFin".into(), json!(input.end_date));
    body.insert("tipoMeta".into(), json!(input.goal_type));
    body.insert("categoria".into(), json!(input.category));
    body.insert("descripcion".into(), json!(input.description));
    body.insert("year".into(), json!(input.year));
    body.insert("month".into(), json!(input.month));
    Value::Object(body)
}

pub(crate) fn goal(record: &Goal) -> Value {
    json!({
        "vendedorId": record.salesperson_id,
        "metaValor": record.target_value,
        "periodo": record.period,
        "fechaInicio": record.start_date,
        "fechaFin": record.end_date,
        "tipoMeta": record.goal_type,
        "categoria": record.category,
        "descripcion": record.description,
        "activa": record.active,
    })
}
