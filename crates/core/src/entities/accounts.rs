use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{keep_unset, serde_ids};

/// Per-line-of-business pipeline amounts tracked on a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineValues {
    #[serde(default, alias = "fijo_new", deserialize_with = "serde_ids::null_as_default")]
    pub fijo_new: Decimal,
    #[serde(default, alias = "fijo_ren", deserialize_with = "serde_ids::null_as_default")]
    pub fijo_ren: Decimal,
    #[serde(default, alias = "movil_new", deserialize_with = "serde_ids::null_as_default")]
    pub movil_new: Decimal,
    #[serde(default, alias = "movil_ren", deserialize_with = "serde_ids::null_as_default")]
    pub movil_ren: Decimal,
    #[serde(default, alias = "claro_tv", deserialize_with = "serde_ids::null_as_default")]
    pub claro_tv: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub company: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub email: String,
    #[serde(default, deserialize_with = "serde_ids::text")]
    pub phone: String,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, alias = "zip_code")]
    pub zip_code: Option<String>,
    #[serde(default, alias = "tax_id")]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "salesperson_id", deserialize_with = "serde_ids::opt_id")]
    pub salesperson_id: Option<String>,
    #[serde(
        default,
        alias = "pipeline_status_id",
        deserialize_with = "serde_ids::opt_id"
    )]
    pub pipeline_status_id: Option<String>,
    #[serde(default, alias = "product_ids", deserialize_with = "serde_ids::id_list")]
    pub product_ids: Vec<String>,
    #[serde(default, alias = "ban_ids", deserialize_with = "serde_ids::id_list")]
    pub ban_ids: Vec<String>,
    #[serde(default, deserialize_with = "serde_ids::count_or_zero")]
    pub comments: u32,
    #[serde(
        default,
        alias = "is_completed",
        deserialize_with = "serde_ids::null_as_default"
    )]
    pub is_completed: bool,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub group: String,
    #[serde(
        default,
        alias = "pipeline_values",
        deserialize_with = "serde_ids::null_as_default"
    )]
    pub pipeline_values: PipelineValues,
    #[serde(default, alias = "date_called")]
    pub date_called: Option<String>,
    #[serde(default, alias = "date_to_call")]
    pub date_to_call: Option<String>,
    #[serde(default, alias = "updated_at", deserialize_with = "serde_ids::opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}
super::impl_entity!(Client, clients, version = updated_at, keep_local = keep_client_fields);

/// The server keeps neither the grouping, the pipeline amounts nor the
/// product and BAN links of a client.
fn keep_client_fields(client: &mut Client, other: &Client) -> bool {
    keep_unset(&mut client.group, &other.group)
        | keep_unset(&mut client.pipeline_values, &other.pipeline_values)
        | keep_unset(&mut client.product_ids, &other.product_ids)
        | keep_unset(&mut client.ban_ids, &other.ban_ids)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewClient {
    pub name: String,
    pub company: String,
    pub email: String,
    pub phone: String,
    pub mobile: Option<String>,
    pub salesperson_id: Option<String>,
    pub pipeline_status_id: Option<String>,
    pub group: Option<String>,
    pub pipeline_values: PipelineValues,
}

pub const DEFAULT_CLIENT_GROUP: &str = "Móvil";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BanStatus {
    #[default]
    #[serde(rename = "activo")]
    Active,
    #[serde(rename = "cancelado", alias = "inactivo")]
    Cancelled,
}

/// A telecom billing account (BAN) owned by one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAccount {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, alias = "client_id", deserialize_with = "serde_ids::text")]
    pub client_id: String,
    /// Nine-digit account number.
    #[serde(default, deserialize_with = "serde_ids::text")]
    pub number: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub status: BanStatus,
    #[serde(default, alias = "last_updated", deserialize_with = "serde_ids::opt_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
}
super::impl_entity!(
    BillingAccount,
    billing_accounts,
    version = last_updated,
    keep_local = keep_ban_fields
);

fn keep_ban_fields(ban: &mut BillingAccount, other: &BillingAccount) -> bool {
    keep_unset(&mut ban.client_id, &other.client_id)
        | keep_unset(&mut ban.number, &other.number)
}

impl BillingAccount {
    pub fn is_active(&self) -> bool {
        self.status == BanStatus::Active
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewBillingAccount {
    pub client_id: String,
    pub number: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriberStatus {
    #[default]
    #[serde(rename = "activo")]
    Active,
    #[serde(rename = "suspendido")]
    Suspended,
    #[serde(rename = "cancelado")]
    Cancelled,
}

/// One phone line under a billing account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, alias = "ban_id", deserialize_with = "serde_ids::text")]
    pub ban_id: String,
    /// Ten-digit phone number.
    #[serde(default, alias = "phone_number", deserialize_with = "serde_ids::text")]
    pub phone_number: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub status: SubscriberStatus,
    #[serde(default, alias = "product_id", deserialize_with = "serde_ids::opt_id")]
    pub product_id: Option<String>,
    #[serde(default, alias = "category_id", deserialize_with = "serde_ids::opt_id")]
    pub category_id: Option<String>,
    #[serde(default, alias = "contract_end_date")]
    pub contract_end_date: Option<String>,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, alias = "months_sold", deserialize_with = "serde_ids::count_or_zero")]
    pub months_sold: u32,
    #[serde(
        default,
        alias = "payments_made",
        deserialize_with = "serde_ids::count_or_zero"
    )]
    pub payments_made: u32,
}
super::impl_entity!(Subscriber, subscribers, keep_local = keep_subscriber_fields);

fn keep_subscriber_fields(subscriber: &mut Subscriber, other: &Subscriber) -> bool {
    keep_unset(&mut subscriber.ban_id, &other.ban_id)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewSubscriber {
    pub ban_id: String,
    pub phone_number: String,
    pub status: SubscriberStatus,
    pub product_id: Option<String>,
    pub category_id: Option<String>,
    pub contract_end_date: Option<String>,
    pub equipment: Option<String>,
    pub city: Option<String>,
    pub months_sold: u32,
    pub payments_made: u32,
}
