use ferry_codec::{
    Array, BoundedString, CodecError, Enum, EnumValue, FromJson, Integer, Optional, Validated,
    validate_payload,
};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Active,
}

impl EnumValue for Mode {
    fn from_json_str(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(Self::Idle),
            "ACTIVE" => Some(Self::Active),
            _ => None,
        }
    }

    fn as_json_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Active => "ACTIVE",
        }
    }
}

#[derive(Debug, Validated)]
struct Window {
    width: Integer<u16, 1, 4096>,
    height: Integer<u16, 1, 4096>,
}

#[derive(Debug, Validated)]
struct ShowWindow {
    #[validated(rename = "windowId")]
    window_id: Integer<i32, 0, 1000>,
    mode: Enum<Mode>,
    title: Optional<BoundedString<1, 16>>,
    size: Optional<Window>,
    tags: Optional<Array<BoundedString<1, 8>, 0, 4>>,
}

#[test]
fn test_struct_from_object() {
    let value = json!({
        "windowId": 7,
        "mode": "ACTIVE",
        "size": {"width": 640, "height": 480},
    });
    let cmd = ShowWindow::from_json(&value);
    assert!(cmd.is_initialized());
    assert!(cmd.is_valid());
    assert_eq!(cmd.window_id, 7);
    assert_eq!(cmd.mode.get(), Some(Mode::Active));
    assert!(!cmd.title.is_initialized());
    assert_eq!(cmd.to_json(), value);
}

#[test]
fn test_struct_missing_required_field() {
    let cmd = ShowWindow::from_json(&json!({"mode": "IDLE"}));
    assert!(cmd.is_initialized());
    assert!(!cmd.is_valid());
}

#[test]
fn test_struct_nested_invalid() {
    let cmd = ShowWindow::from_json(&json!({
        "windowId": 1,
        "mode": "IDLE",
        "size": {"width": 0, "height": 10},
    }));
    assert!(!cmd.is_valid());
}

#[test]
fn test_struct_from_wrong_type() {
    let window = Window::from_json(&json!([1, 2]));
    assert!(window.is_initialized());
    assert!(!window.is_valid());
}

#[test]
fn test_validate_payload_struct() {
    let cmd: ShowWindow =
        validate_payload(br#"{"windowId": 3, "mode": "IDLE", "tags": ["a", "b"]}"#).unwrap();
    assert_eq!(cmd.tags.get().map(|t| t.len()), Some(2));

    assert_eq!(
        validate_payload::<ShowWindow>(b"{}").unwrap_err(),
        CodecError::Missing
    );
    assert!(matches!(
        validate_payload::<ShowWindow>(b"\"text\""),
        Err(CodecError::Invalid(_))
    ));
    assert!(matches!(
        validate_payload::<ShowWindow>(br#"{"windowId": 3, "mode": "OFF"}"#),
        Err(CodecError::Invalid(_))
    ));
}
