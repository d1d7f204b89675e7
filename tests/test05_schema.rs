use mysql_rest_plugin::prelude::*;
use mysql_rest_plugin::schema::{COLUMNS_QUERY, TABLES_QUERY};
use mysql_rest_plugin::test_utils::{MockBackend, MockRows};
use serde_json::json;

fn text(s: &str) -> SqlValue {
    SqlValue::from(s)
}

fn column(name: &str, data_type: &str, nullable: &str, default: SqlValue, key: &str) -> Vec<SqlValue> {
    vec![text(name), text(data_type), text(nullable), default, text(key)]
}

fn columns_header() -> MockRows {
    MockRows::new(&[
        "COLUMN_NAME",
        "DATA_TYPE",
        "IS_NULLABLE",
        "COLUMN_DEFAULT",
        "COLUMN_KEY",
    ])
}

fn expect_schema_queries(mock: &MockBackend) {
    mock.expect_query(
        TABLES_QUERY,
        vec![],
        MockRows::new(&["TABLE_NAME"])
            .row(vec![text("kv_cache")])
            .row(vec![text("orders")])
            .row(vec![text("users")]),
    );
    mock.expect_query(
        COLUMNS_QUERY,
        vec![text("orders")],
        columns_header()
            .row(column("id", "bigint", "NO", SqlValue::Null, "PRI"))
            .row(column("total", "decimal", "NO", text("0.00"), ""))
            .row(column("placed_at", "datetime", "NO", SqlValue::Null, "")),
    );
    mock.expect_query(
        COLUMNS_QUERY,
        vec![text("users")],
        columns_header()
            .row(column("id", "int", "NO", SqlValue::Null, "PRI"))
            .row(column("email", "varchar", "NO", SqlValue::Null, "UNI"))
            .row(column("bio", "text", "YES", SqlValue::Null, ""))
            .row(column("active", "tinyint", "NO", text("1"), "")),
    );
}

fn catalog() -> RoutineCatalog {
    let mut catalog = RoutineCatalog::new();
    let mut count = RoutineInfo::new("count_orders");
    count.params.push(RoutineParameter {
        name: "user_id".into(),
        data_type: "int".into(),
        mode: ParameterMode::In,
        ordinal: 1,
    });
    count.return_type = Some("int".into());
    catalog.insert(count);
    catalog.insert(RoutineInfo::new("purge"));
    catalog
}

#[tokio::test]
async fn describes_tables_and_routines() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let mut plugin = MysqlPlugin::with_backend(mock.clone());
    plugin.set_routines(catalog())?;

    expect_schema_queries(&mock);
    let schema = plugin.get_schema(None).await?;

    assert_eq!(
        schema["tables"]["orders"],
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "integer", "readOnly": true},
                "total": {"type": "number"},
                "placed_at": {"type": "string"},
            },
            "required": ["placed_at"],
        })
    );
    assert_eq!(
        schema["tables"]["users"]["required"],
        json!(["email"])
    );
    assert_eq!(
        schema["tables"]["users"]["properties"]["bio"],
        json!({"type": "string", "x-nullable": true})
    );
    assert!(schema["tables"].get("kv_cache").is_none());

    assert_eq!(
        schema["rpc"]["count_orders"],
        json!([
            {
                "type": "object",
                "properties": {"user_id": {"type": "integer"}},
                "required": ["user_id"],
            },
            {
                "type": "object",
                "properties": {"result": {"type": "integer"}},
            },
        ])
    );
    assert_eq!(
        schema["rpc"]["purge"],
        json!([{"type": "object", "properties": {}, "required": []}, {}])
    );
    mock.verify()?;
    Ok(())
}

#[tokio::test]
async fn repeated_calls_are_identical() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let mut plugin = MysqlPlugin::with_backend(mock.clone());
    plugin.set_routines(catalog())?;

    expect_schema_queries(&mock);
    let first = plugin.get_schema(None).await?;
    expect_schema_queries(&mock);
    let second = plugin.get_schema(None).await?;

    assert_eq!(serde_json::to_string(&first)?, serde_json::to_string(&second)?);
    mock.verify()?;
    Ok(())
}

#[tokio::test]
async fn schema_sees_caller_context() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    mock.expect_exec(
        "SET @erctx_role = ?, @request_role = ?",
        vec![text("reader"), text("reader")],
        0,
    );
    mock.expect_query(TABLES_QUERY, vec![], MockRows::new(&["TABLE_NAME"]));

    let ctx = serde_json::Map::from_iter([("role".to_string(), json!("reader"))]);
    let schema = plugin.get_schema(Some(&ctx)).await?;
    assert_eq!(schema, json!({"tables": {}, "rpc": {}}));
    mock.verify()?;
    Ok(())
}

#[tokio::test]
async fn metadata_failure_is_reported() {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    mock.expect_query_error(TABLES_QUERY, vec![], "access denied");

    let err = plugin.get_schema(None).await.unwrap_err();
    assert!(err.to_string().contains("failed to list tables"));
    assert!(err.to_string().contains("access denied"));
    mock.verify().unwrap();
}
