use std::sync::Arc;
use std::time::Duration;

use rust_sqlite_objects::{
    AsyncUnitOfWork,
    entry, ColumnDefinition, DataType, DatabaseComponent, DatabaseConfig, DatabaseError,
    DatabaseFile, DatabaseState, Entry, MetaInformationComponent, Schema, SessionOptions,
    SingleRow, SingletonTable, SingletonTableComponent, Table, TableDefinition, UpdateTable,
    UpdateTableComponent, Value,
};
use tempfile::TempDir;

fn schema() -> Schema {
    Schema::new()
        .add_table(
            TableDefinition::singleton("items").with_column(ColumnDefinition::new("value", DataType::Integer)),
        )
        .add_table(
            TableDefinition::update("events").with_column(ColumnDefinition::new("name", DataType::Text)),
        )
        .add_table(
            TableDefinition::meta_information()
                .with_column(ColumnDefinition::new("version", DataType::Integer)),
        )
}

// Helper function to create a file handle in a temporary directory
fn create_file(dir: &TempDir) -> anyhow::Result<Arc<DatabaseFile>> {
    let file = DatabaseFile::new(DatabaseConfig::new(dir.path().join("db.sqlite"), schema()))?;
    file.create_file(None, None)?;
    file.open(None)?;
    Ok(file)
}

fn update_ids(entries: Vec<Entry>) -> Vec<i64> {
    let mut ids: Vec<i64> = entries
        .iter()
        .filter_map(|e| e.get("update_id").and_then(Value::as_integer))
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn test_singleton_component_updates_in_place() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = create_file(&dir)?;
    assert!(file.is_open());

    let items = SingletonTableComponent::new(&file, "items");
    items.create_entry(None, Some(&entry([("value", 1)])), false, Entry::new())?;
    assert_eq!(items.get_entry(None, true)?.into_entry()["value"], Value::Integer(1));

    items.create_entry(None, Some(&entry([("value", 2)])), false, Entry::new())?;
    assert_eq!(items.get_entry(None, true)?.into_entry()["value"], Value::Integer(2));

    let session = file.create_session(None)?;
    let table = SingletonTable::new(file.table("items")?)?;
    assert_eq!(table.get_all(&session)?.len(), 1);
    Ok(())
}

#[test]
fn test_update_watermarks() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = create_file(&dir)?;
    let events = UpdateTableComponent::new(&file, "events");

    let session = file.create_session(None)?;
    let table = UpdateTable::new(file.table("events")?)?;
    for id in [1, 2, 3] {
        table.insert(&session, None, false, entry([("update_id", id)]))?;
    }

    let inclusive = events.get_from_update(None, 2, true, true)?.into_entries();
    assert_eq!(update_ids(inclusive), vec![2, 3]);
    let exclusive = events.get_from_update(None, 2, false, true)?.into_entries();
    assert_eq!(update_ids(exclusive), vec![3]);
    assert_eq!(events.get_last_update_id(Some(&session))?, Some(3));
    Ok(())
}

#[test]
fn test_lifecycle() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = DatabaseFile::new(DatabaseConfig::new(dir.path().join("db.sqlite"), schema()))?;
    assert!(matches!(file.create_session(None), Err(DatabaseError::NotOpen)));
    assert!(matches!(
        file.create_async_session(None),
        Err(DatabaseError::NotOpen)
    ));

    file.create_file(None, None)?;
    assert!(!file.is_open());
    assert!(file.open(None)?.is_open());
    assert!(file.close());
    assert!(!file.is_open());
    assert!(file.close());
    assert!(matches!(file.create_session(None), Err(DatabaseError::NotOpen)));
    Ok(())
}

#[test]
fn test_state_round_trip() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = DatabaseFile::new(
        DatabaseConfig::new(dir.path().join("db.sqlite"), schema())
            .with_create(true)
            .with_open(true)
            .with_session(SessionOptions::new().busy_timeout_ms(100))
            .with_table("counter", TableDefinition::singleton("items")),
    )?;
    SingletonTableComponent::new(&file, "items").create_entry(
        None,
        None,
        true,
        entry([("value", 7)]),
    )?;

    let json = serde_json::to_string(&file.state())?;
    assert!(file.close());

    let state: DatabaseState = serde_json::from_str(&json)?;
    assert!(state.is_open);
    assert!(state.tables.contains_key("counter"));
    let restored = DatabaseFile::from_state(state.clone())?;
    assert!(restored.is_open());
    assert_eq!(restored.state(), state);
    assert_eq!(
        restored.create_session(None)?.options().busy_timeout_ms,
        Some(100)
    );

    let items = SingletonTableComponent::new(&restored, "items");
    assert_eq!(items.get_entry(None, true)?.into_entry()["value"], Value::Integer(7));

    restored.close();
    let closed = DatabaseFile::from_state(restored.state())?;
    assert!(!closed.is_open());
    Ok(())
}

#[test]
fn test_late_table_registration() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = DatabaseFile::new(DatabaseConfig::new(dir.path().join("db.sqlite"), Schema::new()))?;
    let events = UpdateTableComponent::new(&file, "events");
    assert!(matches!(
        events.get_last_update_id(None),
        Err(DatabaseError::TableNotFound(_))
    ));

    file.add_table(TableDefinition::update("events"));
    file.create_file(None, None)?;
    file.open(None)?;
    assert_eq!(events.get_last_update_id(None)?, None);
    Ok(())
}

#[test]
fn test_components_degrade_when_owner_dropped() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = create_file(&dir)?;
    let meta = MetaInformationComponent::new(&file);
    assert!(meta.tables().is_some());

    drop(file);
    assert!(meta.owner().is_none());
    assert!(meta.tables().is_none());
    assert!(matches!(
        meta.get_information(None, true),
        Err(DatabaseError::OwnerDropped)
    ));
    Ok(())
}

#[test]
fn test_missing_row_is_reported() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = create_file(&dir)?;
    let meta = MetaInformationComponent::new(&file);
    let err = meta
        .set_information(None, None, true, entry([("version", 1)]))
        .unwrap_err();
    assert!(matches!(err, DatabaseError::RowNotFound { .. }));

    meta.create_information(None, None, true, entry([("version", 1)]))?;
    meta.set_information(None, None, true, entry([("version", 2)]))?;
    let record = meta.get_information(None, false)?.into_record();
    assert_eq!(
        record.and_then(|r| r.get("version").and_then(Value::as_integer)),
        Some(2)
    );
    Ok(())
}

#[tokio::test]
async fn test_async_paths() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = DatabaseFile::new(DatabaseConfig::new(dir.path().join("db.sqlite"), schema()))?;
    file.create_file_async(None, None).await?;
    file.open(None)?;

    let items = SingletonTableComponent::new(&file, "items");
    items
        .create_entry_async(None, None, true, entry([("value", 1)]))
        .await?;
    items
        .create_entry_async(None, None, true, entry([("value", 2)]))
        .await?;
    match items.get_entry_async(None, true).await? {
        SingleRow::Entry(current) => assert_eq!(current["value"], Value::Integer(2)),
        other => panic!("expected an entry, got {other:?}"),
    }

    let session = file.create_async_session(None)?;
    let table = UpdateTable::new(file.table("events")?)?;
    for id in [1, 2, 3] {
        table
            .insert_async(&session, None, false, entry([("update_id", id)]))
            .await?;
    }
    assert_eq!(table.get_last_update_id_async(&session).await?, Some(3));
    session.close().await?;

    let events = UpdateTableComponent::new(&file, "events");
    let rows = events.get_from_update_async(None, 2, true, true).await?;
    assert_eq!(update_ids(rows.into_entries()), vec![2, 3]);

    assert!(file.close_async().await);
    assert!(!file.is_open());
    assert!(file.close_async().await);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_async_reads() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = create_file(&dir)?;
    let table = UpdateTable::new(file.table("events")?)?;
    let session = file.create_session(None)?;
    for id in 1..=10 {
        table.insert(&session, None, false, entry([("update_id", id)]))?;
    }

    let mut handles = Vec::new();
    for threshold in 0..5 {
        let events = UpdateTableComponent::new(&file, "events");
        handles.push(tokio::spawn(async move {
            events
                .get_from_update_async(None, threshold, false, true)
                .await
                .map(|rows| rows.len())
        }));
    }
    for (threshold, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await??, 10 - threshold);
    }
    Ok(())
}

#[test]
fn test_singleton_refuses_second_row() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = create_file(&dir)?;
    let session = file.create_session(None)?;
    let table = Table::new(file.table("items")?);

    table.insert(&session, None, false, entry([("value", 1)]))?;
    let second = table.insert(&session, None, false, entry([("value", 2)]));
    assert!(matches!(second, Err(DatabaseError::SingletonOccupied { .. })));

    let items = SingletonTableComponent::new(&file, "items");
    items.create_entry(Some(&session), None, false, entry([("value", 3)]))?;
    assert_eq!(items.singleton_table()?.get_all(&session)?.len(), 1);
    assert_eq!(items.get_entry(None, true)?.into_entry()["value"], Value::Integer(3));
    Ok(())
}

#[tokio::test]
async fn test_async_session_survives_timeout() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let file = create_file(&dir)?;
    let session = file.create_async_session(None)?;

    let slow = session.execute(|conn| {
        Ok(conn.query_row(
            "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 5000000) \
             SELECT COUNT(*) FROM n",
            [],
            |row| row.get::<_, i64>(0),
        )?)
    });
    assert!(tokio::time::timeout(Duration::from_millis(5), slow).await.is_err());

    let events = UpdateTableComponent::new(&file, "events");
    assert_eq!(events.get_last_update_id_async(Some(&session)).await?, None);
    session.close().await?;
    Ok(())
}
