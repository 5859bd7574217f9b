//! Integration tests for palaver-common crate.

use palaver_common::{
    contains_mention, strip_mention, truncate_string, ChatId, ChatType, EntityId, PalaverError,
    UserId,
};

#[test]
fn test_entity_display_matches_storage_key() {
    let entity = EntityId::Group(ChatId(-42));
    assert_eq!(format!("{entity}"), "group:-42");
    assert_eq!(entity.chat_id(), ChatId(-42));

    let user = EntityId::User(UserId(9));
    assert_eq!(format!("{user}"), "user:9");
    assert_eq!(user.chat_id(), ChatId(9));
}

#[test]
fn test_entity_serialization() {
    let entity = EntityId::User(UserId(123));
    let json = serde_json::to_string(&entity).unwrap();
    assert_eq!(json, r#"{"kind":"user","id":123}"#);
    let back: EntityId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, entity);
}

#[test]
fn test_chat_type_wire_names() {
    let json = serde_json::to_string(&ChatType::Supergroup).unwrap();
    assert_eq!(json, r#""supergroup""#);
}

#[test]
fn test_group_mention_helpers_compose() {
    let text = "@Palaver_bot summarize the thread";
    assert!(contains_mention(text, "palaver_bot"));
    assert_eq!(strip_mention(text, "palaver_bot"), "summarize the thread");
    assert_eq!(truncate_string("summarize the thread", 12), "summarize...");
}

#[test]
fn test_not_found_is_distinct_from_faults() {
    let errors = [
        PalaverError::not_found("x"),
        PalaverError::service("x"),
        PalaverError::persistence("x"),
        PalaverError::validation("x"),
    ];
    let not_found: Vec<bool> = errors.iter().map(PalaverError::is_not_found).collect();
    assert_eq!(not_found, vec![true, false, false, false]);
}
