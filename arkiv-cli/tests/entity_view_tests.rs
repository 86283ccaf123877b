use arkiv_cli::EntityView;
use arkiv_client::{Attributes, Entity, EntityKey};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn selected_components_only_are_printed() {
    let entity = Entity {
        key: Some(EntityKey::from_bytes([0xab; 32])),
        attributes: Some(Attributes::new().with("type", "user").with("age", 25u64)),
        ..Default::default()
    };

    let value = serde_json::to_value(EntityView::from(&entity)).unwrap();
    assert_eq!(
        value,
        json!({
            "key": format!("0x{}", "ab".repeat(32)),
            "attributes": { "age": 25, "type": "user" },
        })
    );
}

#[test]
fn binary_payloads_are_hex_encoded() {
    let text = Entity {
        payload: Some(b"hello".to_vec()),
        ..Default::default()
    };
    assert_eq!(EntityView::from(&text).payload.as_deref(), Some("hello"));

    let binary = Entity {
        payload: Some(vec![0xff, 0x00]),
        ..Default::default()
    };
    assert_eq!(EntityView::from(&binary).payload.as_deref(), Some("0xff00"));
}
