//! Local, non-authoritative checks run before any request is sent.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::errors::{Error, Result};
use crate::store::CrmSnapshot;

pub const BAN_NUMBER_DIGITS: usize = 9;
pub const PHONE_NUMBER_DIGITS: usize = 10;

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

pub(crate) fn required(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(())
}

pub(crate) fn ban_number(number: &str) -> Result<()> {
    if !is_digits(number, BAN_NUMBER_DIGITS) {
        return Err(Error::validation(format!(
            "BAN number must be exactly {} digits, got '{}'",
            BAN_NUMBER_DIGITS, number
        )));
    }
    Ok(())
}

pub(crate) fn phone_number(phone: &str) -> Result<()> {
    if !is_digits(phone, PHONE_NUMBER_DIGITS) {
        return Err(Error::validation(format!(
            "Phone number must be exactly {} digits, got '{}'",
            PHONE_NUMBER_DIGITS, phone
        )));
    }
    Ok(())
}

/// BAN numbers are unique among active accounts. `except` skips the record
/// being edited.
pub(crate) fn unique_ban(data: &CrmSnapshot, number: &str, except: Option<&str>) -> Result<()> {
    let taken = data.billing_accounts.iter().any(|ban| {
        ban.is_active() && ban.number == number && Some(ban.id.as_str()) != except
    });
    if taken {
        return Err(Error::conflict(format!(
            "BAN {} is already registered",
            number
        )));
    }
    Ok(())
}

pub(crate) fn unique_phone(data: &CrmSnapshot, phone: &str, except: Option<&str>) -> Result<()> {
    let taken = data
        .subscribers
        .iter()
        .any(|sub| sub.phone_number == phone && Some(sub.id.as_str()) != except);
    if taken {
        return Err(Error::conflict(format!(
            "Phone number {} is already registered",
            phone
        )));
    }
    Ok(())
}

pub(crate) fn non_negative(amount: Decimal, field: &str) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(Error::validation(format!("{} cannot be negative", field)));
    }
    Ok(())
}

fn parse_date(raw: &str, field: &str) -> Result<Option<NaiveDate>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    // Accept full timestamps by looking only at the date part.
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| Error::validation(format!("{} is not a valid date: '{}'", field, raw)))
}

pub(crate) fn period_window(start: &str, end: &str) -> Result<()> {
    let start_date = parse_date(start, "Start date")?;
    let end_date = parse_date(end, "End date")?;
    if let (Some(start_date), Some(end_date)) = (start_date, end_date) {
        if start_date > end_date {
            return Err(Error::validation(format!(
                "Goal period starts after it ends ({} > {})",
                start_date, end_date
            )));
        }
    }
    Ok(())
}
