use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_error_messages_carry_driver_text() {
    assert_eq!(
        SqlmonError::Query("Invalid object name 'sys.foo'".into()).to_string(),
        "Query error: Invalid object name 'sys.foo'"
    );
    assert_eq!(
        SqlmonError::Timeout("statement exceeded 30s".into()).to_string(),
        "Timeout: statement exceeded 30s"
    );
    assert_eq!(
        SqlmonError::Decode("missing column 'name'".into()).to_string(),
        "Row decode error: missing column 'name'"
    );
}
