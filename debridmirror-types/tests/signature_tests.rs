use chrono::DateTime;
use debridmirror_types::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn torrent(id: &str, progress: f64) -> CanonicalTorrent {
    CanonicalTorrent {
        id: id.to_string(),
        hash: "0123456789abcdef0123456789abcdef01234567".into(),
        filename: "Some.Show.S01E02.1080p.mkv".into(),
        bytes: 1_500_000_000,
        media_type: MediaType::Tv,
        status: TorrentStatus::Downloading,
        service_status: "downloading".into(),
        progress,
        added_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap(),
        seeders: 12,
        speed: 2048,
        links: vec!["https://host/dl/1".into()],
        selected_files: vec![SelectedFile {
            id: 1,
            path: "/Some.Show.S01E02.1080p.mkv".into(),
            bytes: 1_500_000_000,
        }],
    }
}

// ── Signatures ──

#[test]
fn identical_records_sign_identically() {
    assert_eq!(signature(&torrent("svc-a:1", 40.0)), signature(&torrent("svc-a:1", 40.0)));
}

#[test]
fn any_field_change_alters_signature() {
    let base = torrent("svc-a:1", 40.0);
    let mut moved = base.clone();
    moved.progress = 41.0;
    assert_ne!(signature(&base), signature(&moved));

    let mut relinked = base.clone();
    relinked.links.push("https://host/dl/2".into());
    assert_ne!(signature(&base), signature(&relinked));

    let mut restated = base.clone();
    restated.service_status = "queued".into();
    assert_ne!(signature(&base), signature(&restated));
}

#[test]
fn equivalent_timestamps_in_other_offsets_sign_identically() {
    let utc = torrent("svc-b:9", 100.0);
    let mut shifted = utc.clone();
    shifted.added_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00+02:00").unwrap();
    assert_eq!(signature(&utc), signature(&shifted));
}

#[test]
fn signature_is_hex_sha256() {
    let sig = signature(&torrent("svc-c:3", 0.0));
    assert_eq!(sig.len(), 64);
    assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
}

// ── Union ──

#[test]
fn union_keeps_first_record_per_id() {
    let first = SyncResult::new(vec![torrent("svc-a:1", 10.0), torrent("svc-a:2", 20.0)], 2, false);
    let second = SyncResult::new(vec![torrent("svc-a:1", 99.0), torrent("svc-b:1", 5.0)], 2, true);

    let merged = SyncResult::union([&first, &second]);
    let ids: Vec<_> = merged.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["svc-a:1", "svc-a:2", "svc-b:1"]);
    assert_eq!(merged[0].progress, 10.0);
}

proptest! {
    #[test]
    fn signature_depends_only_on_content(progress in 0.0f64..100.0, seeders in 0u32..10_000) {
        let mut a = torrent("svc-a:77", progress);
        a.seeders = seeders;
        let b = a.clone();
        prop_assert_eq!(signature(&a), signature(&b));
    }
}
