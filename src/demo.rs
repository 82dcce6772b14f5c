//! Sample projects and tables the dashboard starts with.

use serde_json::json;
use uuid::Uuid;

use crate::catalog::{Catalog, DatabaseKind};
use crate::domain::DashError;
use crate::store::Table;
use crate::value::{Column, ColumnType, Value};

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn timestamp(s: &str) -> Result<Value, DashError> {
    Value::parse(&Column::new("timestamp", ColumnType::Timestamp), s)
}

fn date(s: &str) -> Result<Value, DashError> {
    Value::parse(&Column::new("date", ColumnType::Date), s)
}

pub fn users() -> Result<Table, DashError> {
    let people = [
        (1, "Alice Chen", "alice@example.com", "Admin", "2024-01-15 09:24:00", "2024-01-15 09:24:00"),
        (2, "Bob Smith", "bob@example.com", "User", "2024-01-14 14:32:00", "2024-01-15 08:15:00"),
        (3, "Carol Davis", "carol@example.com", "Editor", "2024-01-13 11:45:00", "2024-01-14 16:20:00"),
        (4, "David Wilson", "david@example.com", "User", "2024-01-12 08:30:00", "2024-01-12 08:30:00"),
        (5, "Emma Brown", "emma@example.com", "Admin", "2024-01-11 17:22:00", "2024-01-13 10:45:00"),
        (6, "Frank Miller", "frank@example.com", "User", "2024-01-10 13:15:00", "2024-01-10 13:15:00"),
    ];
    let mut records = Vec::with_capacity(people.len());
    for (id, name, email, role, created, updated) in people {
        records.push(vec![
            ("id", Value::Integer(id)),
            ("name", text(name)),
            ("email", text(email)),
            ("role", text(role)),
            ("created_at", timestamp(created)?),
            ("updated_at", timestamp(updated)?),
        ]);
    }
    Table::new(
        "users",
        vec![
            Column::primary("id", ColumnType::Integer),
            Column::new("name", ColumnType::Text),
            Column::new("email", ColumnType::Text),
            Column::new("role", ColumnType::Text),
            Column::new("created_at", ColumnType::Timestamp),
            Column::new("updated_at", ColumnType::Timestamp),
        ],
    )
    .with_records(records)
}

fn products() -> Result<Table, DashError> {
    Table::new(
        "products",
        vec![
            Column::primary("id", ColumnType::Integer),
            Column::new("name", ColumnType::Text),
            Column::new("price", ColumnType::Float),
            Column::new("in_stock", ColumnType::Boolean),
            Column::new("attributes", ColumnType::Json),
        ],
    )
    .with_records(vec![
        vec![
            ("id", Value::Integer(101)),
            ("name", text("Mechanical Keyboard")),
            ("price", Value::Float(129.99)),
            ("in_stock", Value::Boolean(true)),
            ("attributes", Value::Json(json!({"layout": "ISO", "switches": "brown"}))),
        ],
        vec![
            ("id", Value::Integer(102)),
            ("name", text("USB-C Hub")),
            ("price", Value::Float(39.5)),
            ("in_stock", Value::Boolean(false)),
            ("attributes", Value::Json(json!({"ports": 7}))),
        ],
        vec![
            ("id", Value::Integer(103)),
            ("name", text("Monitor Arm")),
            ("price", Value::Float(89.0)),
            ("in_stock", Value::Boolean(true)),
            ("attributes", Value::Json(json!({"max_kg": 9, "colors": ["black", "white"]}))),
        ],
    ])
}

fn orders() -> Result<Table, DashError> {
    Table::new(
        "orders",
        vec![
            Column::primary("id", ColumnType::Integer),
            Column::new("user_id", ColumnType::Integer),
            Column::new("product_id", ColumnType::Integer),
            Column::new("total", ColumnType::Float),
            Column::new("status", ColumnType::Text),
            Column::new("ordered_at", ColumnType::Timestamp),
        ],
    )
    .with_records(vec![
        vec![
            ("id", Value::Integer(5003)),
            ("user_id", Value::Integer(2)),
            ("product_id", Value::Integer(103)),
            ("total", Value::Float(89.0)),
            ("status", text("pending")),
            ("ordered_at", timestamp("2024-01-15 10:02:00")?),
        ],
        vec![
            ("id", Value::Integer(5002)),
            ("user_id", Value::Integer(1)),
            ("product_id", Value::Integer(102)),
            ("total", Value::Float(79.0)),
            ("status", text("shipped")),
            ("ordered_at", timestamp("2024-01-14 18:40:00")?),
        ],
        vec![
            ("id", Value::Integer(5001)),
            ("user_id", Value::Integer(5)),
            ("product_id", Value::Integer(101)),
            ("total", Value::Float(129.99)),
            ("status", text("delivered")),
            ("ordered_at", timestamp("2024-01-12 09:11:00")?),
        ],
    ])
}

fn sessions() -> Result<Table, DashError> {
    Table::new(
        "sessions",
        vec![
            Column::primary("id", ColumnType::Uuid),
            Column::new("user_id", ColumnType::Integer),
            Column::new("ip", ColumnType::Text),
            Column::new("started_at", ColumnType::Timestamp),
        ],
    )
    .with_records(vec![
        vec![
            ("id", Value::Uuid(Uuid::from_u128(0x6f1c_2a4e_8b3d_4c71_9e05_1a2b_3c4d_5e6f))),
            ("user_id", Value::Integer(1)),
            ("ip", text("10.0.0.12")),
            ("started_at", timestamp("2024-01-15 09:25:13")?),
        ],
        vec![
            ("id", Value::Uuid(Uuid::from_u128(0x0a9b_8c7d_6e5f_4a3b_8c2d_1e0f_a9b8_c7d6))),
            ("user_id", Value::Integer(3)),
            ("ip", text("192.168.1.40")),
            ("started_at", timestamp("2024-01-14 16:21:02")?),
        ],
    ])
}

fn analytics() -> Result<Table, DashError> {
    Table::new(
        "analytics",
        vec![
            Column::primary("id", ColumnType::Integer),
            Column::new("page", ColumnType::Text),
            Column::new("visits", ColumnType::Integer),
            Column::new("day", ColumnType::Date),
        ],
    )
    .with_records(vec![
        vec![
            ("id", Value::Integer(3)),
            ("page", text("/pricing")),
            ("visits", Value::Integer(412)),
            ("day", date("2024-01-15")?),
        ],
        vec![
            ("id", Value::Integer(2)),
            ("page", text("/")),
            ("visits", Value::Integer(2950)),
            ("day", date("2024-01-15")?),
        ],
        vec![
            ("id", Value::Integer(1)),
            ("page", text("/docs")),
            ("visits", Value::Integer(877)),
            ("day", date("2024-01-14")?),
        ],
    ])
}

fn events() -> Result<Table, DashError> {
    Table::new(
        "events",
        vec![
            Column::primary("id", ColumnType::Text),
            Column::new("type", ColumnType::Text),
            Column::new("payload", ColumnType::Json),
            Column::new("received_at", ColumnType::Timestamp),
        ],
    )
    .with_records(vec![
        vec![
            ("id", text("evt_3")),
            ("type", text("signup")),
            ("payload", Value::Json(json!({"plan": "pro", "referrer": "newsletter"}))),
            ("received_at", timestamp("2024-01-15 09:24:01")?),
        ],
        vec![
            ("id", text("evt_2")),
            ("type", text("page_view")),
            ("payload", Value::Json(json!({"path": "/pricing", "ms": 5400}))),
            ("received_at", timestamp("2024-01-15 09:20:44")?),
        ],
        vec![
            ("id", text("evt_1")),
            ("type", text("page_view")),
            ("payload", Value::Json(json!({"path": "/", "ms": 1200}))),
            ("received_at", timestamp("2024-01-15 09:19:30")?),
        ],
    ])
}

fn metrics() -> Result<Table, DashError> {
    Table::new(
        "metrics",
        vec![
            Column::primary("id", ColumnType::Integer),
            Column::new("name", ColumnType::Text),
            Column::new("value", ColumnType::Float),
            Column::new("recorded_on", ColumnType::Date),
        ],
    )
    .with_records(vec![
        vec![
            ("id", Value::Integer(2)),
            ("name", text("p95_latency_ms")),
            ("value", Value::Float(182.4)),
            ("recorded_on", date("2024-01-15")?),
        ],
        vec![
            ("id", Value::Integer(1)),
            ("name", text("error_rate")),
            ("value", Value::Float(0.012)),
            ("recorded_on", date("2024-01-15")?),
        ],
    ])
}

/// The catalog the dashboard opens with.
pub fn catalog() -> Result<Catalog, DashError> {
    let mut catalog = Catalog::new();
    let production = catalog.add_project("Production DB", DatabaseKind::Postgresql);
    production.tables = vec![users()?, products()?, orders()?, sessions()?, analytics()?];
    let store = catalog.add_project("Analytics Store", DatabaseKind::Mongodb);
    store.tables = vec![events()?, metrics()?];
    Ok(catalog)
}
