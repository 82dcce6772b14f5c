use dbdash::controller::{Action, Controller};
use dbdash::domain::{DashConfig, DashError, Message};
use dbdash::export::MemoryClipboard;
use dbdash::session::Session;
use dbdash::store::RowId;
use pretty_assertions::assert_eq;

fn session() -> (Session, MemoryClipboard) {
    let clipboard = MemoryClipboard::default();
    let config = DashConfig::default()
        .with_page_size(3)
        .with_refresh_delay_ms(1);
    let session = Session::new(
        config,
        dbdash::demo::catalog().unwrap(),
        Box::new(clipboard.clone()),
    );
    (session, clipboard)
}

async fn run(session: &mut Session, line: &str) -> Result<(), DashError> {
    match Controller::new().handle_line(line, session)? {
        Action::Update(message) => session.update(message).await,
        _ => Ok(()),
    }
}

#[tokio::test]
async fn browse_filter_and_edit_users() {
    let (mut s, clipboard) = session();
    run(&mut s, "open 1/users").await.unwrap();
    assert_eq!(s.current_view().unwrap().total_filtered, 6);
    assert_eq!(s.current_view().unwrap().page_count, 2);

    run(&mut s, "filter role equals admin").await.unwrap();
    let ids: Vec<RowId> = s.current_view().unwrap().rows.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec![RowId::Integer(1), RowId::Integer(5)]);

    run(&mut s, "copy 5 email").await.unwrap();
    assert_eq!(clipboard.text().as_deref(), Some("\"emma@example.com\""));

    run(&mut s, "clear").await.unwrap();
    run(&mut s, "insert name=\"Grace Hopper\" email=grace@example.com role=Admin").await.unwrap();
    assert!(s.status_message().ends_with("inserted successfully!"));
    let view = s.current_view().unwrap();
    assert_eq!(view.total_filtered, 7);
    assert_eq!(view.page, 1);
    assert_eq!(
        view.rows[0].get("name").map(|v| v.as_text()),
        Some("Grace Hopper".to_string())
    );

    run(&mut s, "delete 2").await.unwrap();
    run(&mut s, "search bob").await.unwrap();
    assert_eq!(s.current_view().unwrap().total_filtered, 0);
}

#[tokio::test]
async fn export_writes_the_visible_page() {
    let (mut s, _) = session();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");

    run(&mut s, "open users").await.unwrap();
    run(&mut s, "page 2").await.unwrap();
    s.update(Message::Export(path.clone())).await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let rows: serde_json::Value = serde_json::from_str(&text).unwrap();
    let names: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["David Wilson", "Emma Brown", "Frank Miller"]);
}

#[tokio::test]
async fn create_table_and_insert_defaults() {
    let (mut s, _) = session();
    run(&mut s, "create \"Audit Log\"").await.unwrap();
    assert_eq!(s.current_table().unwrap().name, "audit_log");

    run(&mut s, "insert").await.unwrap();
    let view = s.current_view().unwrap();
    assert_eq!(view.total_filtered, 1);
    assert!(matches!(view.rows[0].id, RowId::Text(_)));
}

#[tokio::test]
async fn commands_need_an_open_table() {
    let (mut s, _) = session();
    assert!(matches!(run(&mut s, "search x").await, Err(DashError::NoTableOpen)));
    assert!(s.render().contains("Production DB"));
}
