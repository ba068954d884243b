use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use searchsync_types::{Document, FieldValue, ObjectId};
use serde_json::json;
use std::collections::BTreeMap;

#[test]
fn normalize_converts_object_ids_and_dates() {
    let owner = ObjectId::from_bytes([0x0f; 12]);
    let born = Utc.with_ymd_and_hms(2013, 5, 1, 12, 30, 0).unwrap();

    let doc = Document::new("cat-1")
        .with_field("name", "nomnom")
        .with_field("age", 3)
        .with_field("owner", owner)
        .with_field("born", born);

    let normalized = doc.normalize();
    assert_eq!(normalized.id().as_str(), "cat-1");
    assert_eq!(
        serde_json::Value::Object(normalized.body().clone()),
        json!({
            "name": "nomnom",
            "age": 3,
            "owner": "0f0f0f0f0f0f0f0f0f0f0f0f",
            "born": "2013-05-01T12:30:00.000Z"
        })
    );
}

#[test]
fn normalize_traverses_nested_values() {
    let friend = ObjectId::from_bytes([0x01; 12]);
    let seen = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();

    let mut inner = BTreeMap::new();
    inner.insert("friend".to_string(), FieldValue::ObjectId(friend));
    inner.insert(
        "visits".to_string(),
        FieldValue::Array(vec![FieldValue::Date(seen), FieldValue::Null]),
    );

    let doc = Document::new("p").with_field("meta", FieldValue::Object(inner));
    let body = serde_json::Value::Object(doc.normalize().body().clone());

    assert_eq!(
        body,
        json!({
            "meta": {
                "friend": "010101010101010101010101",
                "visits": ["2020-01-02T03:04:05.000Z", null]
            }
        })
    );
}

#[test]
fn normalize_drops_the_store_id_field() {
    let id = ObjectId::new();
    let doc = Document::new(id)
        .with_field("_id", id)
        .with_field("name", "rex");

    let normalized = doc.normalize();
    assert!(!normalized.body().contains_key("_id"));
    assert_eq!(normalized.id().as_str(), id.to_hex());
}

#[test]
fn non_finite_floats_become_null() {
    let doc = Document::new("f").with_field("ratio", f64::NAN);
    assert_eq!(doc.normalize().body()["ratio"], serde_json::Value::Null);
}

#[test]
fn to_json_serializes_body_only() {
    let doc = Document::new("d1").with_field("name", "a");
    let json = doc.normalize().to_json().unwrap();
    assert_eq!(json, r#"{"name":"a"}"#);
}

#[test]
fn field_value_from_plain_json() {
    let value = FieldValue::from(json!({"a": [1, 2.5, "x", true, null]}));
    assert_eq!(value.normalize(), json!({"a": [1, 2.5, "x", true, null]}));
}

#[test]
fn set_replaces_previous_value() {
    let mut doc = Document::new("d");
    doc.set("name", "old");
    doc.set("name", "new");
    assert_eq!(doc.get("name"), Some(&FieldValue::from("new")));
    assert_eq!(doc.fields().len(), 1);
}
