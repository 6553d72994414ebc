//! Translation between local aggregates and backend rows.
//!
//! Every mapper is pure. `to_row` produces exactly the columns the backend
//! models; `from_row` takes the server's values for those columns and
//! carries client-only fields over from the existing local record. JSON
//! columns are decoded into typed fields and an unexpected shape is a
//! [`MapperError`], never a silent default.

pub mod capture;
pub mod character;
pub mod document;
pub mod look;
pub mod photo;
pub mod scene;

use serde::de::DeserializeOwned;
use serde::Serialize;

use continuity_core::Table;

use crate::error::MapperError;

pub(crate) fn encode<T: Serialize>(
    table: Table,
    field: &'static str,
    value: &T,
) -> Result<serde_json::Value, MapperError> {
    serde_json::to_value(value).map_err(|e| MapperError::shape(table, field, e))
}

pub(crate) fn decode<T: DeserializeOwned>(
    table: Table,
    field: &'static str,
    value: &serde_json::Value,
) -> Result<T, MapperError> {
    T::deserialize(value).map_err(|e| MapperError::shape(table, field, e))
}

/// Like [`decode`] for columns holding a struct. serde maps a JSON array
/// onto struct fields by position, so anything but an object is rejected.
pub(crate) fn decode_object<T: DeserializeOwned>(
    table: Table,
    field: &'static str,
    value: &serde_json::Value,
) -> Result<T, MapperError> {
    if !value.is_object() {
        return Err(MapperError::shape(table, field, format!("expected an object, got {value}")));
    }
    decode(table, field, value)
}

/// A non-negative integer column as `u32`.
pub(crate) fn to_u32(table: Table, field: &'static str, value: i32) -> Result<u32, MapperError> {
    u32::try_from(value).map_err(|_| MapperError::shape(table, field, format!("negative value {value}")))
}

/// A `u32` field as an integer column, saturating at `i32::MAX`.
pub(crate) fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Order a server-supplied set the way the local copy already lists it:
/// entries the local copy has keep their position, new ones follow in
/// sorted order.
pub(crate) fn ordered_like<T: Ord + Clone>(local: &[T], server: &[T]) -> Vec<T> {
    let mut out: Vec<T> = local.iter().filter(|x| server.contains(x)).cloned().collect();
    let mut added: Vec<T> = server.iter().filter(|x| !out.contains(x)).cloned().collect();
    added.sort();
    added.dedup();
    out.dedup();
    out.extend(added);
    out
}
