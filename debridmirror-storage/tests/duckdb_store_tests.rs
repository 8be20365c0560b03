use chrono::{DateTime, FixedOffset};
use debridmirror_storage::{DuckDbPersistence, LocalStore, StoreConfig, TorrentPersistence};
use debridmirror_types::{CanonicalTorrent, MediaType, SelectedFile, ServiceTag, TorrentStatus, compose_id};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn torrent(tag: ServiceTag, n: u64, added: &str) -> CanonicalTorrent {
    CanonicalTorrent {
        id: compose_id(tag, n),
        hash: format!("{n:040x}"),
        filename: format!("Show.S01E{n:02}.mkv"),
        bytes: 1_000 * n,
        media_type: MediaType::Tv,
        status: TorrentStatus::Downloading,
        service_status: "downloading".into(),
        progress: 12.5,
        added_at: DateTime::<FixedOffset>::parse_from_rfc3339(added).unwrap(),
        seeders: 7,
        speed: 2_048,
        links: vec![format!("https://dl.example/{n}")],
        selected_files: vec![SelectedFile {
            id: 1,
            path: format!("/Show.S01E{n:02}.mkv"),
            bytes: 1_000 * n,
        }],
    }
}

fn sorted(mut torrents: Vec<CanonicalTorrent>) -> Vec<CanonicalTorrent> {
    torrents.sort_by(|a, b| a.id.cmp(&b.id));
    torrents
}

// ── Rows ─────────────────────────────────────────────────────────

#[test]
fn apply_and_load_roundtrip() {
    let db = DuckDbPersistence::open_in_memory().unwrap();
    let rows = vec![
        torrent(ServiceTag::A, 1, "2024-05-01T12:00:00+02:00"),
        torrent(ServiceTag::B, 2, "2024-05-02T08:30:00Z"),
    ];

    db.apply_changes(&rows, &[]).unwrap();

    assert_eq!(db.count().unwrap(), 2);
    assert_eq!(sorted(db.load_all().unwrap()), sorted(rows));
}

#[test]
fn load_orders_newest_first() {
    let db = DuckDbPersistence::open_in_memory().unwrap();
    let older = torrent(ServiceTag::A, 1, "2024-05-01T12:00:00Z");
    // Later instant despite the smaller wall-clock text.
    let newer = torrent(ServiceTag::A, 2, "2024-05-01T09:00:00-05:00");
    db.apply_changes(&[older.clone(), newer.clone()], &[]).unwrap();

    let ids: Vec<_> = db.load_all().unwrap().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);
}

#[test]
fn upsert_replaces_existing_row() {
    let db = DuckDbPersistence::open_in_memory().unwrap();
    let mut row = torrent(ServiceTag::C, 3, "2024-05-01T12:00:00Z");
    db.apply_changes(std::slice::from_ref(&row), &[]).unwrap();

    row.progress = 100.0;
    row.status = TorrentStatus::Finished;
    db.apply_changes(std::slice::from_ref(&row), &[]).unwrap();

    assert_eq!(db.count().unwrap(), 1);
    assert_eq!(db.load_all().unwrap(), vec![row]);
}

#[test]
fn removal_deletes_rows() {
    let db = DuckDbPersistence::open_in_memory().unwrap();
    let a = torrent(ServiceTag::A, 1, "2024-05-01T12:00:00Z");
    let b = torrent(ServiceTag::A, 2, "2024-05-01T13:00:00Z");
    db.apply_changes(&[a.clone(), b.clone()], &[]).unwrap();

    db.apply_changes(&[], &[a.id.clone(), "svc-a:missing".into()]).unwrap();

    assert_eq!(db.load_all().unwrap(), vec![b]);
}

#[test]
fn replace_all_swaps_table_contents() {
    let db = DuckDbPersistence::open_in_memory().unwrap();
    db.apply_changes(&[torrent(ServiceTag::A, 1, "2024-05-01T12:00:00Z")], &[])
        .unwrap();

    let fresh: Vec<_> = (10..15)
        .map(|n| torrent(ServiceTag::B, n, "2024-06-01T00:00:00Z"))
        .collect();
    db.replace_all(&fresh).unwrap();

    assert_eq!(db.count().unwrap(), 5);
    assert_eq!(sorted(db.load_all().unwrap()), sorted(fresh));
}

#[test]
fn replace_all_with_overlapping_ids() {
    let db = DuckDbPersistence::open_in_memory().unwrap();
    let row = torrent(ServiceTag::A, 1, "2024-05-01T12:00:00Z");
    db.apply_changes(std::slice::from_ref(&row), &[]).unwrap();

    db.replace_all(std::slice::from_ref(&row)).unwrap();

    assert_eq!(db.count().unwrap(), 1);
}

// ── Files ────────────────────────────────────────────────────────

#[test]
fn rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.duckdb");
    let row = torrent(ServiceTag::A, 1, "2024-05-01T12:00:00+02:00");

    {
        let db = DuckDbPersistence::open(&path).unwrap();
        db.apply_changes(std::slice::from_ref(&row), &[]).unwrap();
    }

    let db = DuckDbPersistence::open(&path).unwrap();
    let loaded = db.load_all().unwrap();
    assert_eq!(loaded, vec![row]);
    assert_eq!(loaded[0].added_at.offset().local_minus_utc(), 2 * 3600);
}

#[tokio::test]
async fn local_store_over_duckdb_rebuilds_snapshot_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.duckdb");
    let rows: Vec<_> = (1..=3)
        .map(|n| torrent(ServiceTag::A, n, "2024-05-01T12:00:00Z"))
        .collect();

    {
        let db = Arc::new(DuckDbPersistence::open(&path).unwrap());
        let store = LocalStore::open(db, StoreConfig::default()).await.unwrap();
        store.reconcile(rows.clone()).await;
        store.flush().await.unwrap();
    }

    let db = Arc::new(DuckDbPersistence::open(&path).unwrap());
    let store = LocalStore::open(db, StoreConfig::default()).await.unwrap();
    assert_eq!(store.snapshot_len().await, 3);

    let changes = store.reconcile(rows[..2].to_vec()).await;
    assert!(changes.upserted.is_empty());
    assert_eq!(changes.removed, vec![rows[2].id.clone()]);
}
