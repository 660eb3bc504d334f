//! SQLite-backed `DocumentStore`.
//!
//! # Responsibility
//! - Persist documents as JSON objects keyed by collection path + id.
//! - Fan out full collection snapshots to live listeners after each commit.
//!
//! # Invariants
//! - Snapshot order is insertion order (`rowid`); merges keep a document's
//!   position.
//! - The delivery lock is taken before the connection lock is released, so
//!   listeners observe commits in commit order.

use super::{
    CollectionPath, DocumentPath, DocumentSnapshot, DocumentStore, Fields, ListenerRegistration,
    QuerySnapshot, SnapshotListener, StoreError, StoreResult, WriteMode,
};
use crate::db::{open_db, open_db_in_memory};
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const TOUCH_UPDATED_AT_SQL: &str = "CAST(strftime('%s', 'now') AS INTEGER) * 1000";

/// Local document database with live collection listeners.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    listeners: Arc<Mutex<ListenerTable>>,
    delivery: Mutex<()>,
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: BTreeMap<u64, ListenerEntry>,
}

struct ListenerEntry {
    collection_key: String,
    listener: SnapshotListener,
    active: Arc<AtomicBool>,
}

#[derive(Clone)]
struct Target {
    listener: SnapshotListener,
    active: Arc<AtomicBool>,
}

impl SqliteDocumentStore {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            listeners: Arc::new(Mutex::new(ListenerTable::default())),
            delivery: Mutex::new(()),
        }
    }

    /// Opens the store backed by a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Number of attached listeners on `collection`.
    pub fn listener_count(&self, collection: &CollectionPath) -> usize {
        let key = collection.key();
        self.listeners
            .lock()
            .map(|table| {
                table
                    .entries
                    .values()
                    .filter(|entry| entry.collection_key == key)
                    .count()
            })
            .unwrap_or(0)
    }

    fn lock_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    // The delivery lock only orders notifications and guards no data, so a
    // listener panic that poisoned it leaves nothing to repair.
    fn lock_delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(|poisoned| {
            warn!("event=doc_notify module=store status=recovered reason=delivery_lock_poisoned");
            poisoned.into_inner()
        })
    }

    fn targets_for(&self, collection: &CollectionPath) -> Vec<Target> {
        let key = collection.key();
        let Ok(table) = self.listeners.lock() else {
            return Vec::new();
        };
        table
            .entries
            .values()
            .filter(|entry| entry.collection_key == key)
            .map(|entry| Target {
                listener: Arc::clone(&entry.listener),
                active: Arc::clone(&entry.active),
            })
            .collect()
    }

    /// Runs one write, then notifies the collection's listeners when the
    /// write reports a change.
    fn write_and_notify<T>(
        &self,
        op: &'static str,
        collection: &CollectionPath,
        write: impl FnOnce(&Connection) -> StoreResult<(T, bool)>,
    ) -> StoreResult<T> {
        let conn = self.lock_conn()?;
        let (output, changed) = write(&conn).map_err(|err| {
            error!("event=doc_write module=store status=error op={op} error={err}");
            err
        })?;
        debug!("event=doc_write module=store status=ok op={op} changed={changed}");

        if !changed {
            return Ok(output);
        }
        let targets = self.targets_for(collection);
        if targets.is_empty() {
            return Ok(output);
        }

        let snapshot = read_snapshot(&conn, collection);
        let _delivery = self.lock_delivery();
        drop(conn);
        deliver(&targets, snapshot);
        Ok(output)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn add_document(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let data = serde_json::to_string(&fields)?;
        self.write_and_notify("add", collection, |conn| {
            conn.execute(
                "INSERT INTO documents (collection_path, doc_id, data) VALUES (?1, ?2, ?3);",
                params![collection.key(), id, data],
            )?;
            Ok((id.clone(), true))
        })
    }

    fn set_document(
        &self,
        document: &DocumentPath,
        fields: Fields,
        mode: WriteMode,
    ) -> StoreResult<()> {
        let op = match mode {
            WriteMode::Replace => "set_replace",
            WriteMode::Merge => "set_merge",
        };
        self.write_and_notify(op, document.collection(), |conn| {
            let merged = match mode {
                WriteMode::Replace => fields,
                WriteMode::Merge => {
                    let mut current = read_document(conn, document)?.unwrap_or_default();
                    current.extend(fields);
                    current
                }
            };
            conn.execute(
                &format!(
                    "INSERT INTO documents (collection_path, doc_id, data) VALUES (?1, ?2, ?3)
                     ON CONFLICT (collection_path, doc_id) DO UPDATE SET
                        data = excluded.data,
                        updated_at = ({TOUCH_UPDATED_AT_SQL});"
                ),
                params![
                    document.collection().key(),
                    document.id(),
                    serde_json::to_string(&merged)?
                ],
            )?;
            Ok(((), true))
        })
    }

    fn delete_document(&self, document: &DocumentPath) -> StoreResult<()> {
        self.write_and_notify("delete", document.collection(), |conn| {
            let removed = conn.execute(
                "DELETE FROM documents WHERE collection_path = ?1 AND doc_id = ?2;",
                params![document.collection().key(), document.id()],
            )?;
            Ok(((), removed > 0))
        })
    }

    fn list_documents(&self, collection: &CollectionPath) -> StoreResult<Vec<DocumentSnapshot>> {
        let conn = self.lock_conn()?;
        query_documents(&conn, collection)
    }

    fn on_snapshot(
        &self,
        collection: &CollectionPath,
        listener: SnapshotListener,
    ) -> StoreResult<ListenerRegistration> {
        let conn = self.lock_conn()?;
        let initial = read_snapshot(&conn, collection);
        if initial.is_err() {
            let _delivery = self.lock_delivery();
            drop(conn);
            let active = Arc::new(AtomicBool::new(true));
            deliver(&[Target { listener, active }], initial);
            return Ok(ListenerRegistration::detached());
        }

        let active = Arc::new(AtomicBool::new(true));
        let id = {
            let mut table = self
                .listeners
                .lock()
                .map_err(|_| StoreError::Unavailable("listener table poisoned".to_string()))?;
            let id = table.next_id;
            table.next_id += 1;
            table.entries.insert(
                id,
                ListenerEntry {
                    collection_key: collection.key(),
                    listener: Arc::clone(&listener),
                    active: Arc::clone(&active),
                },
            );
            id
        };
        info!("event=listener_attach module=store status=ok listener_id={id}");

        let _delivery = self.lock_delivery();
        drop(conn);
        deliver(
            &[Target {
                listener,
                active: Arc::clone(&active),
            }],
            initial,
        );

        let table = Arc::downgrade(&self.listeners);
        Ok(ListenerRegistration::new(move || {
            active.store(false, Ordering::SeqCst);
            if let Some(table) = table.upgrade() {
                if let Ok(mut table) = table.lock() {
                    table.entries.remove(&id);
                }
            }
            info!("event=listener_detach module=store status=ok listener_id={id}");
        }))
    }
}

fn deliver(targets: &[Target], snapshot: Result<QuerySnapshot, String>) {
    for target in targets {
        if !target.active.load(Ordering::SeqCst) {
            continue;
        }
        match &snapshot {
            Ok(snapshot) => (target.listener)(Ok(snapshot.clone())),
            Err(message) => {
                target.active.store(false, Ordering::SeqCst);
                (target.listener)(Err(StoreError::Listen(message.clone())));
            }
        }
    }
}

fn read_snapshot(conn: &Connection, collection: &CollectionPath) -> Result<QuerySnapshot, String> {
    match query_documents(conn, collection) {
        Ok(documents) => Ok(QuerySnapshot {
            collection: collection.clone(),
            documents,
        }),
        Err(err) => {
            error!("event=snapshot_read module=store status=error error={err}");
            Err(err.to_string())
        }
    }
}

fn query_documents(
    conn: &Connection,
    collection: &CollectionPath,
) -> StoreResult<Vec<DocumentSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT doc_id, data FROM documents
         WHERE collection_path = ?1
         ORDER BY rowid ASC;",
    )?;
    let mut rows = stmt.query([collection.key()])?;
    let mut documents = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let data: String = row.get(1)?;
        let fields = parse_fields(&data, || format!("{collection}/{id}"))?;
        documents.push(DocumentSnapshot { id, fields });
    }
    Ok(documents)
}

fn read_document(conn: &Connection, document: &DocumentPath) -> StoreResult<Option<Fields>> {
    let data = conn
        .query_row(
            "SELECT data FROM documents WHERE collection_path = ?1 AND doc_id = ?2;",
            params![document.collection().key(), document.id()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    data.map(|data| parse_fields(&data, || document.to_string()))
        .transpose()
}

fn parse_fields(data: &str, describe: impl Fn() -> String) -> StoreResult<Fields> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(StoreError::Corrupt {
            document: describe(),
            message: "data is not a JSON object".to_string(),
        }),
        Err(err) => Err(StoreError::Corrupt {
            document: describe(),
            message: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteDocumentStore;
    use crate::store::{
        CollectionPath, DocumentStore, Fields, QuerySnapshot, SnapshotListener, StoreResult,
        WriteMode,
    };
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().expect("object literal")
    }

    type Seen = Arc<Mutex<Vec<StoreResult<QuerySnapshot>>>>;

    fn recorder() -> (Seen, SnapshotListener) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: SnapshotListener = Arc::new(move |event: StoreResult<QuerySnapshot>| {
            sink.lock().unwrap().push(event);
        });
        (seen, listener)
    }

    #[test]
    fn merge_preserves_unnamed_fields_and_keeps_order() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let items = CollectionPath::parse("items").unwrap();
        let first = store
            .add_document(&items, fields(json!({"name": "a", "n": 1})))
            .unwrap();
        let second = store
            .add_document(&items, fields(json!({"name": "b", "n": 2})))
            .unwrap();

        store
            .set_document(
                &items.document(&first).unwrap(),
                fields(json!({"name": "a2"})),
                WriteMode::Merge,
            )
            .unwrap();

        let docs = store.list_documents(&items).unwrap();
        assert_eq!(
            docs.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            vec![first.as_str(), second.as_str()]
        );
        assert_eq!(docs[0].fields, fields(json!({"name": "a2", "n": 1})));
    }

    #[test]
    fn replace_drops_unnamed_fields() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let items = CollectionPath::parse("items").unwrap();
        let id = store
            .add_document(&items, fields(json!({"name": "a", "n": 1})))
            .unwrap();
        store
            .set_document(
                &items.document(&id).unwrap(),
                fields(json!({"name": "z"})),
                WriteMode::Replace,
            )
            .unwrap();
        assert_eq!(
            store.list_documents(&items).unwrap()[0].fields,
            fields(json!({"name": "z"}))
        );
    }

    #[test]
    fn listener_gets_initial_and_change_snapshots_for_its_collection_only() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let mine = CollectionPath::parse("a/x/items").unwrap();
        let other = CollectionPath::parse("a/y/items").unwrap();
        let (seen, listener) = recorder();

        let registration = store.on_snapshot(&mine, listener).unwrap();
        store.add_document(&other, fields(json!({"k": 1}))).unwrap();
        let id = store.add_document(&mine, fields(json!({"k": 2}))).unwrap();
        store.delete_document(&mine.document(&id).unwrap()).unwrap();

        let sizes = seen
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.as_ref().unwrap().documents.len())
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![0, 1, 0]);
        assert_eq!(store.listener_count(&mine), 1);

        registration.remove();
        assert_eq!(store.listener_count(&mine), 0);
        store.add_document(&mine, fields(json!({"k": 3}))).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn deleting_missing_document_is_silent() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let items = CollectionPath::parse("items").unwrap();
        let (seen, listener) = recorder();
        let _registration = store.on_snapshot(&items, listener).unwrap();

        store
            .delete_document(&items.document("missing").unwrap())
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn dropping_registration_detaches_listener() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let items = CollectionPath::parse("items").unwrap();
        let (_seen, listener) = recorder();
        {
            let _registration = store.on_snapshot(&items, listener).unwrap();
            assert_eq!(store.listener_count(&items), 1);
        }
        assert_eq!(store.listener_count(&items), 0);
    }

    #[test]
    fn corrupt_row_terminates_listener_with_error() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let items = CollectionPath::parse("items").unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute_batch("PRAGMA ignore_check_constraints = ON;")
                .unwrap();
            conn.execute(
                "INSERT INTO documents (collection_path, doc_id, data) VALUES ('items', 'bad', '[1]');",
                [],
            )
            .unwrap();
        }
        let (seen, listener) = recorder();
        let registration = store.on_snapshot(&items, listener).unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
        drop(events);
        drop(registration);
        assert_eq!(store.listener_count(&items), 0);
    }

    #[test]
    fn poisoned_delivery_lock_still_commits_and_notifies() {
        let store = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let items = CollectionPath::parse("items").unwrap();
        let (seen, listener) = recorder();
        let _registration = store.on_snapshot(&items, listener).unwrap();

        let poisoner = Arc::clone(&store);
        let joined = std::thread::spawn(move || {
            let _guard = poisoner.delivery.lock().unwrap();
            panic!("listener panicked mid-delivery");
        })
        .join();
        assert!(joined.is_err());
        assert!(store.delivery.is_poisoned());

        let id = store.add_document(&items, fields(json!({"k": 1})));
        assert!(id.is_ok());
        assert_eq!(store.list_documents(&items).unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
