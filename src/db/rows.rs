//! Decoding of arbitrary result rows into JSON objects.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use sqlx::{
    Column, Row, TypeInfo, ValueRef,
    postgres::{
        PgRow, PgTypeInfo, PgTypeKind, PgValueFormat,
        types::{PgInterval, PgTimeTz},
    },
};

use crate::vector::from_pgvector_binary;

/// Convert a row into a JSON object keyed by column name.
///
/// Columns whose type has no JSON mapping come through as their text form,
/// or base64 when the server sent binary with no known layout.
pub fn row_to_json(row: &PgRow) -> Result<Map<String, Value>, sqlx::Error> {
    let mut object = Map::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_value(row, idx, column.type_info())?;
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}

fn column_value(row: &PgRow, idx: usize, type_info: &PgTypeInfo) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    // Enum labels travel as plain UTF-8 in both formats.
    if matches!(type_info.kind(), PgTypeKind::Enum(_)) {
        return Ok(Value::String(row.try_get_unchecked::<String, _>(idx)?));
    }

    let type_name = type_info.name();
    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(idx)?),
        "INT2" => Value::from(row.try_get::<i16, _>(idx)?),
        "INT4" => Value::from(row.try_get::<i32, _>(idx)?),
        "INT8" => Value::from(row.try_get::<i64, _>(idx)?),
        "FLOAT4" => float(row.try_get::<f32, _>(idx)? as f64),
        "FLOAT8" => float(row.try_get::<f64, _>(idx)?),
        "NUMERIC" => numeric(row.try_get::<Decimal, _>(idx)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            Value::String(row.try_get::<String, _>(idx)?)
        }
        "CITEXT" => Value::String(row.try_get_unchecked::<String, _>(idx)?),
        "UUID" => Value::String(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx)?,
        "TIMESTAMPTZ" => Value::String(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339()),
        "TIMESTAMP" => Value::String(row.try_get::<NaiveDateTime, _>(idx)?.to_string()),
        "DATE" => Value::String(row.try_get::<NaiveDate, _>(idx)?.to_string()),
        "TIME" => Value::String(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        "TIMETZ" => {
            let value = row.try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(idx)?;
            Value::String(format!("{}{}", value.time, value.offset))
        }
        "INTERVAL" => interval(row.try_get::<PgInterval, _>(idx)?),
        "BYTEA" => Value::String(STANDARD.encode(row.try_get::<Vec<u8>, _>(idx)?)),
        "BOOL[]" => array(row.try_get::<Vec<Option<bool>>, _>(idx)?, Value::Bool),
        "INT2[]" => array(row.try_get::<Vec<Option<i16>>, _>(idx)?, Value::from),
        "INT4[]" => array(row.try_get::<Vec<Option<i32>>, _>(idx)?, Value::from),
        "INT8[]" => array(row.try_get::<Vec<Option<i64>>, _>(idx)?, Value::from),
        "FLOAT4[]" => array(row.try_get::<Vec<Option<f32>>, _>(idx)?, |v| {
            float(v as f64)
        }),
        "FLOAT8[]" => array(row.try_get::<Vec<Option<f64>>, _>(idx)?, float),
        "NUMERIC[]" => array(row.try_get::<Vec<Option<Decimal>>, _>(idx)?, numeric),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            array(row.try_get::<Vec<Option<String>>, _>(idx)?, Value::String)
        }
        "UUID[]" => array(row.try_get::<Vec<Option<uuid::Uuid>>, _>(idx)?, |v| {
            Value::String(v.to_string())
        }),
        "JSONB[]" => array(row.try_get::<Vec<Option<Value>>, _>(idx)?, |v| v),
        "TIMESTAMPTZ[]" => array(row.try_get::<Vec<Option<DateTime<Utc>>>, _>(idx)?, |v| {
            Value::String(v.to_rfc3339())
        }),
        _ => raw_value(row, idx, type_name)?,
    };
    Ok(value)
}

/// Fallback for types without a static mapping, including pgvector's `vector`.
fn raw_value(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    let format = raw.format();
    let bytes = raw.as_bytes().map_err(sqlx::Error::Decode)?;

    if format == PgValueFormat::Binary {
        if type_name.eq_ignore_ascii_case("vector") {
            return Ok(match from_pgvector_binary(bytes) {
                Some(vector) => Value::Array(vector.into_iter().map(float).collect()),
                None => Value::String(STANDARD.encode(bytes)),
            });
        }
        if (type_name == "INET" || type_name == "CIDR")
            && let Some(network) = inet_from_binary(bytes)
        {
            return Ok(Value::String(network));
        }
    }

    Ok(match std::str::from_utf8(bytes) {
        Ok(text) if format == PgValueFormat::Text => Value::String(text.to_string()),
        _ => Value::String(STANDARD.encode(bytes)),
    })
}

/// Decode the binary `inet`/`cidr` layout: family, prefix bits, is-cidr flag,
/// address length, address bytes.
fn inet_from_binary(bytes: &[u8]) -> Option<String> {
    let [_family, bits, _is_cidr, len, address @ ..] = bytes else {
        return None;
    };
    let ip = match (*len, address) {
        (4, &[a, b, c, d]) => IpAddr::V4(Ipv4Addr::new(a, b, c, d)),
        (16, _) if address.len() == 16 => {
            let octets: [u8; 16] = address.try_into().ok()?;
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _ => return None,
    };
    let full = if ip.is_ipv4() { 32 } else { 128 };
    Some(if *bits == full {
        ip.to_string()
    } else {
        format!("{ip}/{bits}")
    })
}

fn interval(value: PgInterval) -> Value {
    serde_json::json!({
        "months": value.months,
        "days": value.days,
        "microseconds": value.microseconds,
    })
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn numeric(value: Decimal) -> Value {
    use rust_decimal::prelude::ToPrimitive;

    // Integral values that fit stay exact; everything else goes through f64.
    if value.fract().is_zero()
        && let Some(int) = value.to_i64()
    {
        return Value::from(int);
    }
    value
        .to_f64()
        .map_or_else(|| Value::String(value.to_string()), float)
}

fn array<T>(values: Vec<Option<T>>, convert: impl Fn(T) -> Value) -> Value {
    Value::Array(
        values
            .into_iter()
            .map(|v| v.map_or(Value::Null, &convert))
            .collect(),
    )
}
