use mysql_rest_plugin::prelude::*;
use mysql_rest_plugin::serve;
use mysql_rest_plugin::server::{Response, handle_line};
use mysql_rest_plugin::test_utils::{MockBackend, MockRows};
use serde_json::{Value as JsonValue, json};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

fn error_kind(response: &Response) -> Option<&str> {
    response.error.as_ref().map(|e| e.kind.as_str())
}

#[tokio::test]
async fn table_get_request_maps_to_select() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let plugin = RwLock::new(MysqlPlugin::with_backend(mock.clone()));

    mock.expect_exec(
        "SET @erctx_user = ?, @request_user = ?",
        vec![SqlValue::from("bob"), SqlValue::from("bob")],
        0,
    );
    mock.expect_query(
        "SELECT id FROM users WHERE age >= ? ORDER BY id LIMIT 2",
        vec![SqlValue::Int(18)],
        MockRows::new(&["id"])
            .row(vec![SqlValue::Int(3)])
            .row(vec![SqlValue::Int(4)]),
    );

    let line = json!({
        "id": 7,
        "method": "table_get",
        "params": {
            "table": "users",
            "select": ["id"],
            "where": {"age": {">=": 18}},
            "ordering": ["id"],
            "limit": 2,
            "context": {"user": "bob"},
        }
    })
    .to_string();
    let response = handle_line(&plugin, &line).await;
    assert_eq!(response, Response::ok(json!(7), json!([{"id": 3}, {"id": 4}])));
    mock.verify()?;
    Ok(())
}

#[tokio::test]
async fn update_request_returns_affected_count() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let plugin = RwLock::new(MysqlPlugin::with_backend(mock.clone()));

    mock.expect_begin();
    mock.expect_exec(
        "UPDATE users SET name = ? WHERE id = ?",
        vec![SqlValue::from("Bob"), SqlValue::Int(1)],
        1,
    );
    mock.expect_commit();

    let line = r#"{"id":"u1","method":"table_update","params":{"table":"users","data":{"name":"Bob"},"where":{"id":1}}}"#;
    let response = handle_line(&plugin, line).await;
    assert_eq!(response.result, Some(json!(1)));
    assert_eq!(response.id, json!("u1"));
    mock.verify()?;
    Ok(())
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let plugin = RwLock::new(MysqlPlugin::with_backend(MockBackend::new()));

    let response = handle_line(&plugin, "{not json").await;
    assert_eq!(response.id, JsonValue::Null);
    assert_eq!(error_kind(&response), Some("validation"));

    let response = handle_line(&plugin, r#"{"id":1,"method":"table_delete","params":{"where":{}}}"#).await;
    assert_eq!(error_kind(&response), Some("validation"));
    assert!(response.error.unwrap().message.contains("invalid params"));

    let response = handle_line(&plugin, r#"{"id":2,"method":"drop_everything"}"#).await;
    assert_eq!(error_kind(&response), Some("unimplemented"));
}

#[tokio::test]
async fn cache_miss_has_its_own_kind() {
    let mock = MockBackend::new();
    let plugin = RwLock::new(MysqlPlugin::with_backend(mock.clone()));

    mock.expect_query(
        mysql_rest_plugin::cache::CACHE_GET,
        vec![SqlValue::from("k")],
        MockRows::new(&["cache_value"]),
    );
    let response = handle_line(&plugin, r#"{"id":3,"method":"cache_get","params":{"key":"k"}}"#).await;
    assert_eq!(error_kind(&response), Some("not_found"));
    mock.verify().unwrap();
}

#[tokio::test]
async fn serve_answers_every_line_by_id() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBackend::new();
    let plugin = MysqlPlugin::with_backend(mock.clone());

    let input = concat!(
        r#"{"id":1,"method":"nope"}"#,
        "\n",
        "\n",
        r#"{"id":2,"method":"cache_get","params":{}}"#,
        "\n",
    );
    let (client, server) = tokio::io::duplex(1 << 16);
    serve(plugin, input.as_bytes(), server).await?;

    let mut output = String::new();
    let mut client = client;
    client.read_to_string(&mut output).await?;

    let mut responses: Vec<JsonValue> = output
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    responses.sort_by_key(|r| r["id"].as_i64());
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["kind"], json!("unimplemented"));
    assert_eq!(responses[1]["error"]["kind"], json!("validation"));
    mock.verify()?;
    Ok(())
}
