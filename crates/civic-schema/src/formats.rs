//! Built-in value formats
//!
//! Brazilian document numbers, contact data and calendar values. Each check
//! takes the raw string and answers whether it is well formed.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;

use crate::field::FieldType;

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();

    /// Digits with the usual separators, optional leading `+`
    static ref PHONE: Regex = Regex::new(r"^\+?[\d\s().-]+$").unwrap();

    static ref CPF: Regex = Regex::new(r"^(\d{3}\.\d{3}\.\d{3}-\d{2}|\d{11})$").unwrap();

    static ref CNPJ: Regex = Regex::new(r"^(\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}|\d{14})$").unwrap();

    static ref CEP: Regex = Regex::new(r"^\d{5}-?\d{3}$").unwrap();

    static ref URL: Regex = Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap();

    static ref COLOR: Regex = Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap();
}

/// Name of the format a field type implies, if any
pub fn format_name(field_type: FieldType) -> Option<&'static str> {
    match field_type {
        FieldType::Email => Some("email"),
        FieldType::Phone => Some("telefone"),
        FieldType::Cpf => Some("cpf"),
        FieldType::Cnpj => Some("cnpj"),
        FieldType::Cep => Some("cep"),
        FieldType::Url => Some("url"),
        FieldType::Color => Some("cor hexadecimal"),
        FieldType::Date => Some("AAAA-MM-DD"),
        FieldType::Datetime => Some("data e hora ISO 8601"),
        FieldType::Time => Some("HH:MM"),
        _ => None,
    }
}

/// Whether `value` is well formed for `field_type`. Types without a built-in
/// format accept anything.
pub fn matches_format(field_type: FieldType, value: &str) -> bool {
    match field_type {
        FieldType::Email => EMAIL.is_match(value),
        FieldType::Phone => is_phone(value),
        FieldType::Cpf => is_cpf(value),
        FieldType::Cnpj => is_cnpj(value),
        FieldType::Cep => CEP.is_match(value),
        FieldType::Url => URL.is_match(value),
        FieldType::Color => COLOR.is_match(value),
        FieldType::Date => parse_date(value).is_some(),
        FieldType::Datetime => parse_datetime(value).is_some(),
        FieldType::Time => parse_time(value).is_some(),
        _ => true,
    }
}

fn digits(value: &str) -> Vec<u32> {
    value.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn is_phone(value: &str) -> bool {
    PHONE.is_match(value) && (10..=13).contains(&digits(value).len())
}

/// CPF with valid check digits. Repeated-digit numbers are rejected.
pub fn is_cpf(value: &str) -> bool {
    if !CPF.is_match(value) {
        return false;
    }
    let d = digits(value);
    if d.iter().all(|&x| x == d[0]) {
        return false;
    }
    let check = |len: usize| -> u32 {
        let sum: u32 = d[..len]
            .iter()
            .enumerate()
            .map(|(i, &x)| x * (len as u32 + 1 - i as u32))
            .sum();
        (sum * 10) % 11 % 10
    };
    check(9) == d[9] && check(10) == d[10]
}

/// CNPJ with valid check digits. Repeated-digit numbers are rejected.
pub fn is_cnpj(value: &str) -> bool {
    if !CNPJ.is_match(value) {
        return false;
    }
    let d = digits(value);
    if d.iter().all(|&x| x == d[0]) {
        return false;
    }
    const W1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const W2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    let check = |weights: &[u32]| -> u32 {
        let sum: u32 = d.iter().zip(weights).map(|(x, w)| x * w).sum();
        match sum % 11 {
            r if r < 2 => 0,
            r => 11 - r,
        }
    };
    check(&W1) == d[12] && check(&W2) == d[13]
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// RFC 3339, or the `YYYY-MM-DDTHH:MM[:SS]` shape HTML forms send
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .ok()
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}
