use mysql_rest_plugin::prelude::*;
use mysql_rest_plugin::test_utils::MockBackend;
use serde_json::{Value as JsonValue, json};

fn object(value: JsonValue) -> serde_json::Map<String, JsonValue> {
    value.as_object().cloned().unwrap()
}

fn text(s: &str) -> SqlValue {
    SqlValue::from(s)
}

#[tokio::test]
async fn create_injects_context_then_inserts() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    mock.expect_begin();
    mock.expect_exec(
        "SET @erctx_claim = ?, @request_claim = ?, @erctx_foo = ?, @request_foo = ?",
        vec![text("Alice"), text("Alice"), text("123"), text("123")],
        0,
    );
    // Values that look like context references are bound as plain text.
    mock.expect_exec(
        "INSERT INTO users (id, info, name) VALUES (?, ?, ?)",
        vec![SqlValue::Int(1), text("info"), text("erctx.claim")],
        1,
    );
    mock.expect_commit();

    let row = object(json!({"id": 1, "name": "erctx.claim", "info": "info"}));
    let ctx = object(json!({"claim": "Alice", "foo": 123}));
    let created = plugin
        .table_create("users", vec![row.clone()], Some(&ctx))
        .await?;
    assert_eq!(created, vec![row]);
    mock.verify()?;
    Ok(())
}

#[tokio::test]
async fn create_many_rows_in_one_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    mock.expect_begin();
    mock.expect_exec(
        "INSERT INTO tags (label) VALUES (?)",
        vec![text("red")],
        1,
    );
    mock.expect_exec(
        "INSERT INTO tags (label, weight) VALUES (?, ?)",
        vec![text("blue"), SqlValue::Float(0.5)],
        1,
    );
    mock.expect_commit();

    let rows = vec![
        object(json!({"label": "red"})),
        object(json!({"weight": 0.5, "label": "blue"})),
    ];
    let created = plugin.table_create("tags", rows, None).await?;
    assert_eq!(created.len(), 2);
    assert_eq!(mock.sessions_acquired(), 1);
    mock.verify()?;
    Ok(())
}

#[tokio::test]
async fn failed_insert_rolls_back_the_batch() {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    mock.expect_begin();
    mock.expect_exec("INSERT INTO tags (label) VALUES (?)", vec![text("a")], 1);
    mock.expect_exec_error(
        "INSERT INTO tags (label) VALUES (?)",
        vec![text("a")],
        "Duplicate entry 'a' for key 'label'",
    );
    mock.expect_rollback();

    let rows = vec![object(json!({"label": "a"})), object(json!({"label": "a"}))];
    let err = plugin.table_create("tags", rows, None).await.unwrap_err();
    assert_eq!(err.kind(), "execution");
    assert!(err.to_string().contains("failed to execute insert"));
    assert!(err.to_string().contains("Duplicate entry"));
    mock.verify().unwrap();
}

#[tokio::test]
async fn update_binds_set_values_before_filter() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    mock.expect_begin();
    mock.expect_exec(
        "UPDATE items SET note = ?, qty = ? WHERE id = ?",
        vec![text("restock"), SqlValue::Int(3), SqlValue::Int(7)],
        1,
    );
    mock.expect_commit();
    let updated = plugin
        .table_update(
            "items",
            &object(json!({"qty": 3, "note": "restock"})),
            &object(json!({"id": 7})),
            None,
        )
        .await?;
    assert_eq!(updated, 1);

    mock.expect_begin();
    mock.expect_exec(
        "UPDATE users SET name = ? WHERE id = ?",
        vec![text("Bob"), SqlValue::Int(1)],
        1,
    );
    mock.expect_commit();
    let updated = plugin
        .table_update(
            "users",
            &object(json!({"name": "Bob"})),
            &object(json!({"id": 1})),
            None,
        )
        .await?;
    assert_eq!(updated, 1);
    mock.verify()?;
    Ok(())
}

#[tokio::test]
async fn update_with_null_clears_the_column() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    mock.expect_begin();
    mock.expect_exec(
        "UPDATE users SET nickname = ? WHERE LOWER(email) LIKE ? AND deleted_at IS NULL",
        vec![SqlValue::Null, text("%@example.com")],
        4,
    );
    mock.expect_commit();

    let updated = plugin
        .table_update(
            "users",
            &object(json!({"nickname": null})),
            &object(json!({"email": {"ILIKE": "%@Example.com"}, "deleted_at": null})),
            None,
        )
        .await?;
    assert_eq!(updated, 4);
    mock.verify()?;
    Ok(())
}

#[tokio::test]
async fn delete_reports_affected_rows() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    mock.expect_begin();
    mock.expect_exec(
        "DELETE FROM sessions WHERE expires < ? AND user_id IN (?, ?)",
        vec![text("2024-01-01"), SqlValue::Int(1), SqlValue::Int(2)],
        3,
    );
    mock.expect_commit();

    let deleted = plugin
        .table_delete(
            "sessions",
            &object(json!({"user_id": {"IN": [1, 2]}, "expires": {"<": "2024-01-01"}})),
            None,
        )
        .await?;
    assert_eq!(deleted, 3);
    mock.verify()?;
    Ok(())
}

#[tokio::test]
async fn invalid_input_never_reaches_the_database() {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    let err = plugin
        .table_create("users", vec![serde_json::Map::new()], None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = plugin
        .table_update("users", &serde_json::Map::new(), &object(json!({"id": 1})), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = plugin
        .table_delete("users", &object(json!({"id": {"IN": []}})), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = plugin
        .table_delete(
            "users",
            &object(json!({"email": {"ilike": "%@A.COM", "ILIKE": "%@b.com"}})),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("ILIKE given more than once on field email"));

    assert_eq!(mock.sessions_acquired(), 0);
    mock.verify().unwrap();
}

#[tokio::test]
async fn begin_failure_issues_nothing_else() {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    // An exec in place of begin is a mismatch, so begin fails and nothing follows.
    mock.expect_exec("SELECT 1", vec![], 0);

    let err = plugin
        .table_delete("users", &object(json!({"id": 1})), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to begin transaction"));
    assert!(mock.verify().is_err());
}
