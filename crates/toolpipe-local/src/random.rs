//! `random_generator` tool. Uses the thread-local CSPRNG (`rand::rng()`), so passwords are fit
//! for real use.

use rand::Rng;
use serde::Serialize;
use toolpipe_core::{Error, Result};

pub const PASSWORD_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*";
pub const DEFAULT_MIN: i64 = 0;
pub const DEFAULT_MAX: i64 = 100;
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;
pub const MAX_COUNT: usize = 100;
pub const MAX_PASSWORD_LENGTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomKind {
    Number,
    Uuid,
    Password,
    Pick,
}

impl RandomKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "number" => Ok(Self::Number),
            "uuid" => Ok(Self::Uuid),
            "password" => Ok(Self::Password),
            "pick" => Ok(Self::Pick),
            other => Err(Error::InvalidParams(format!(
                "unknown type {other:?} (allowed: number, uuid, password, pick)"
            ))),
        }
    }
}

/// `count == 1` yields a bare value, anything else an array.
pub fn one_or_many<T: Serialize>(mut values: Vec<T>) -> serde_json::Value {
    if values.len() == 1 {
        if let Some(v) = values.pop() {
            return serde_json::to_value(v).unwrap_or(serde_json::Value::Null);
        }
    }
    serde_json::to_value(values).unwrap_or(serde_json::Value::Null)
}

pub fn check_count(count: Option<usize>) -> Result<usize> {
    let count = count.unwrap_or(1);
    if !(1..=MAX_COUNT).contains(&count) {
        return Err(Error::InvalidParams(format!(
            "count must be between 1 and {MAX_COUNT} (got {count})"
        )));
    }
    Ok(count)
}

/// Integers in `min..=max`.
pub fn numbers(min: i64, max: i64, count: usize) -> Result<Vec<i64>> {
    if min > max {
        return Err(Error::InvalidParams(format!(
            "min ({min}) must not exceed max ({max})"
        )));
    }
    let mut rng = rand::rng();
    Ok((0..count).map(|_| rng.random_range(min..=max)).collect())
}

pub fn uuids(count: usize) -> Vec<String> {
    (0..count).map(|_| uuid::Uuid::new_v4().to_string()).collect()
}

pub fn passwords(length: usize, count: usize) -> Result<Vec<String>> {
    if !(1..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Err(Error::InvalidParams(format!(
            "length must be between 1 and {MAX_PASSWORD_LENGTH} (got {length})"
        )));
    }
    let mut rng = rand::rng();
    Ok((0..count)
        .map(|_| {
            (0..length)
                .map(|_| PASSWORD_CHARSET[rng.random_range(0..PASSWORD_CHARSET.len())] as char)
                .collect()
        })
        .collect())
}

/// `min(count, items.len())` picks, with replacement.
pub fn pick(items: &[String], count: usize) -> Result<Vec<String>> {
    if items.is_empty() {
        return Err(Error::InvalidParams(
            "Items array is required for pick operation".to_string(),
        ));
    }
    let mut rng = rand::rng();
    Ok((0..count.min(items.len()))
        .map(|_| items[rng.random_range(0..items.len())].clone())
        .collect())
}
