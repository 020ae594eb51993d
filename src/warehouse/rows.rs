//! Decoding of the warehouse's `{"f": [{"v": ...}]}` row encoding

use crate::warehouse::error::WarehouseError;
use crate::warehouse::schema::{FieldMode, FieldSchema, FieldType, TableSchema};
use serde_json::{Map, Number, Value};

/// A result or load row keyed by column name, in column order
pub type Row = Map<String, Value>;

/// Decode one wire row against the result schema
pub fn decode_row(schema: &TableSchema, raw: &Value) -> Result<Row, WarehouseError> {
    decode_record(&schema.fields, raw)
}

fn decode_record(fields: &[FieldSchema], raw: &Value) -> Result<Row, WarehouseError> {
    let cells = raw
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| WarehouseError::Decode(format!("row is missing its cell list: {}", raw)))?;

    if cells.len() != fields.len() {
        return Err(WarehouseError::Decode(format!(
            "row has {} cells but schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }

    let mut row = Map::with_capacity(fields.len());
    for (field, cell) in fields.iter().zip(cells) {
        let v = cell.get("v").unwrap_or(&Value::Null);
        row.insert(field.name.clone(), decode_field(field, v)?);
    }
    Ok(row)
}

fn decode_field(field: &FieldSchema, v: &Value) -> Result<Value, WarehouseError> {
    if field.mode == FieldMode::Repeated {
        let items = match v {
            Value::Null => return Ok(Value::Array(Vec::new())),
            Value::Array(items) => items,
            other => {
                return Err(WarehouseError::Decode(format!(
                    "repeated field {} is not an array: {}",
                    field.name, other
                )));
            }
        };
        return items
            .iter()
            .map(|item| decode_scalar(field, item.get("v").unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    decode_scalar(field, v)
}

fn decode_scalar(field: &FieldSchema, v: &Value) -> Result<Value, WarehouseError> {
    let text = match v {
        Value::Null => return Ok(Value::Null),
        Value::String(s) => s.as_str(),
        Value::Object(_) if field.field_type == FieldType::Record => {
            return decode_record(&field.fields, v).map(Value::Object);
        }
        other => return Ok(other.clone()),
    };

    let decoded = match field.field_type {
        FieldType::Integer => text
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(text.to_string())),
        FieldType::Float => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        FieldType::Boolean => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => {
                return Err(WarehouseError::Decode(format!(
                    "field {} has non-boolean value {}",
                    field.name, text
                )));
            }
        },
        _ => Value::String(text.to_string()),
    };
    Ok(decoded)
}
