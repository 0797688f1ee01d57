//! Dispatcher entry points driven against a scripted tree.

mod common;

use std::io;
use std::sync::{Arc, Mutex};

use common::{
    harness, harness_with_limits, sample_tree, CapacityBuffer, FakeTree, RecordingProvider,
};
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;
use vprj_dispatch::{
    CallbackData, EnumerationSession, FileMetadata, NotificationKind, Status, TransferLimits,
};

const MIB: usize = 1024 * 1024;

fn cursor(h: &common::Harness, id: Uuid) -> Option<usize> {
    h.dispatcher.sessions().with_session(&id, |s| s.cursor())
}

// ============================================================================
// Enumeration
// ============================================================================

#[test]
fn test_enumeration_lists_directory_in_tree_order() {
    let h = harness(sample_tree());
    let id = Uuid::new_v4();
    let cb = CallbackData::new("src");

    assert_eq!(h.dispatcher.start_enumeration(&cb, id), Status::OK);
    let mut buf = CapacityBuffer::new(64);
    assert_eq!(h.dispatcher.get_enumeration_data(&cb, id, None, &mut buf), Status::OK);
    assert_eq!(buf.names(), vec!["a.rs", "lib.rs", "Main.rs", "nested"]);
    assert!(buf.entries[3].1.is_directory);
    assert_eq!(buf.entries[0].1.file_size, 10);

    assert_eq!(h.dispatcher.end_enumeration(id), Status::OK);
    assert!(!h.dispatcher.sessions().contains(&id));
}

#[test]
fn test_full_buffer_resumes_at_rejected_entry() {
    let h = harness(sample_tree());
    let id = Uuid::new_v4();
    let cb = CallbackData::new("src");
    h.dispatcher.start_enumeration(&cb, id);

    let mut first = CapacityBuffer::new(3);
    assert_eq!(h.dispatcher.get_enumeration_data(&cb, id, None, &mut first), Status::OK);
    assert_eq!(first.names(), vec!["a.rs", "lib.rs", "Main.rs"]);
    assert_eq!(cursor(&h, id), Some(3));

    let mut second = CapacityBuffer::new(3);
    assert_eq!(h.dispatcher.get_enumeration_data(&cb, id, None, &mut second), Status::OK);
    assert_eq!(second.names(), vec!["nested"]);
    assert_eq!(cursor(&h, id), Some(4));

    let mut drained = CapacityBuffer::new(3);
    assert_eq!(h.dispatcher.get_enumeration_data(&cb, id, None, &mut drained), Status::OK);
    assert!(drained.entries.is_empty());
}

#[test]
fn test_zero_capacity_buffer_makes_no_progress() {
    let h = harness(sample_tree());
    let id = Uuid::new_v4();
    let cb = CallbackData::new("");
    h.dispatcher.start_enumeration(&cb, id);

    let mut full = CapacityBuffer::new(0);
    assert_eq!(h.dispatcher.get_enumeration_data(&cb, id, None, &mut full), Status::OK);
    assert_eq!(cursor(&h, id), Some(0));
}

#[test]
fn test_restart_scan_serves_from_first_entry() {
    let h = harness(sample_tree());
    let id = Uuid::new_v4();
    let cb = CallbackData::new("src");
    h.dispatcher.start_enumeration(&cb, id);

    let mut partial = CapacityBuffer::new(2);
    h.dispatcher.get_enumeration_data(&cb, id, Some("*.rs"), &mut partial);
    assert_eq!(cursor(&h, id), Some(2));

    let restart = CallbackData::new("src").with_restart_scan();
    let mut again = CapacityBuffer::new(64);
    assert_eq!(h.dispatcher.get_enumeration_data(&restart, id, None, &mut again), Status::OK);
    assert_eq!(again.names(), vec!["a.rs", "lib.rs", "Main.rs", "nested"]);
}

#[test]
fn test_search_expression_saved_once_until_restart() {
    let h = harness(sample_tree());
    let id = Uuid::new_v4();
    let cb = CallbackData::new("src");
    h.dispatcher.start_enumeration(&cb, id);
    let expression = |h: &common::Harness| {
        h.dispatcher
            .sessions()
            .with_session(&id, |s| s.search_expression().map(str::to_string))
            .flatten()
    };

    h.dispatcher.get_enumeration_data(&cb, id, Some("*.rs"), &mut CapacityBuffer::new(1));
    assert_eq!(expression(&h).as_deref(), Some("*.rs"));

    h.dispatcher.get_enumeration_data(&cb, id, Some("*.md"), &mut CapacityBuffer::new(1));
    assert_eq!(expression(&h).as_deref(), Some("*.rs"));

    let restart = CallbackData::new("src").with_restart_scan();
    h.dispatcher.get_enumeration_data(&restart, id, None, &mut CapacityBuffer::new(1));
    assert_eq!(expression(&h).as_deref(), Some("*"));
}

#[test]
fn test_unknown_session_is_invalid_parameter() {
    let h = harness(sample_tree());
    let cb = CallbackData::new("src");
    let mut buf = CapacityBuffer::new(8);
    assert_eq!(
        h.dispatcher.get_enumeration_data(&cb, Uuid::new_v4(), None, &mut buf),
        Status::INVALID_PARAMETER
    );
    assert!(buf.entries.is_empty());
}

#[test]
fn test_start_enumeration_of_missing_directory() {
    let h = harness(sample_tree());
    let id = Uuid::new_v4();
    assert_eq!(
        h.dispatcher.start_enumeration(&CallbackData::new("missing"), id),
        Status::FILE_NOT_FOUND
    );
    assert!(h.dispatcher.sessions().is_empty());
}

#[test]
fn test_duplicate_session_id_keeps_original() {
    let h = harness(sample_tree());
    let id = Uuid::new_v4();
    assert_eq!(h.dispatcher.start_enumeration(&CallbackData::new("src"), id), Status::OK);
    assert_eq!(
        h.dispatcher.start_enumeration(&CallbackData::new(""), id),
        Status::UNEXPECTED
    );
    let path = h.dispatcher.sessions().with_session(&id, |s| s.path().to_string());
    assert_eq!(path.as_deref(), Some("src"));
    assert_eq!(h.dispatcher.sessions().len(), 1);
}

/// Collects formatted log output so tests can count events.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_session_defects_logged_once() {
    let h = harness(sample_tree());
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::ERROR)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let id = Uuid::new_v4();
        assert_eq!(h.dispatcher.start_enumeration(&CallbackData::new("src"), id), Status::OK);
        assert_eq!(
            h.dispatcher.start_enumeration(&CallbackData::new("src"), id),
            Status::UNEXPECTED
        );
        assert_eq!(h.dispatcher.end_enumeration(Uuid::new_v4()), Status::UNEXPECTED);
    });

    let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert_eq!(text.lines().count(), 2, "{}", text);
    assert_eq!(text.matches("already exists").count(), 1);
    assert_eq!(text.matches("does not exist").count(), 1);
}

#[test]
fn test_end_of_unknown_session_is_unexpected() {
    let h = harness(sample_tree());
    assert_eq!(h.dispatcher.end_enumeration(Uuid::new_v4()), Status::UNEXPECTED);
}

#[test]
fn test_concurrent_sessions_are_independent() {
    let tree = (0..50).fold(FakeTree::new().with_dir("big"), |t, i| {
        t.with_file(&format!("big/f{:02}", i), vec![0u8; i])
    });
    let h = harness(tree);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let id = Uuid::new_v4();
                let cb = CallbackData::new("big");
                assert_eq!(h.dispatcher.start_enumeration(&cb, id), Status::OK);
                let mut names = Vec::new();
                loop {
                    let mut buf = CapacityBuffer::new(7);
                    let status = h.dispatcher.get_enumeration_data(&cb, id, None, &mut buf);
                    assert_eq!(status, Status::OK);
                    if buf.entries.is_empty() {
                        break;
                    }
                    names.extend(buf.entries.into_iter().map(|(n, _)| n));
                }
                assert_eq!(names.len(), 50);
                assert_eq!(names[0], "f00");
                assert_eq!(names[49], "f49");
                assert_eq!(h.dispatcher.end_enumeration(id), Status::OK);
            });
        }
    });
    assert!(h.dispatcher.sessions().is_empty());
}

#[test]
fn test_sessions_serve_captured_entries() {
    let h = harness(sample_tree());
    let id = Uuid::new_v4();
    let cb = CallbackData::new("docs");
    h.dispatcher.start_enumeration(&cb, id);
    assert_eq!(h.dispatcher.sessions().with_session(&id, |s| s.len()), Some(0));

    let other = Uuid::new_v4();
    h.dispatcher
        .sessions()
        .insert(EnumerationSession::new(other, "x", vec![FileMetadata::file("only", 1)]))
        .unwrap();
    let mut buf = CapacityBuffer::new(8);
    h.dispatcher.get_enumeration_data(&CallbackData::new("x"), other, None, &mut buf);
    assert_eq!(buf.names(), vec!["only"]);
}

// ============================================================================
// Metadata queries
// ============================================================================

#[test]
fn test_file_info_reports_canonical_casing() {
    let h = harness(sample_tree());
    let provider = RecordingProvider::default();
    let cb = CallbackData::new("SRC\\main.RS").with_process("editor.exe");

    assert_eq!(h.dispatcher.get_file_info(&provider, &cb), Status::OK);
    let placeholders = provider.placeholders();
    assert_eq!(placeholders.len(), 1);
    assert_eq!(placeholders[0].0, "src\\Main.rs");
    assert!(!placeholders[0].1.basic.is_directory);
    assert_eq!(placeholders[0].1.basic.file_size, 13);
}

#[test]
fn test_file_info_for_directory() {
    let h = harness(sample_tree());
    let provider = RecordingProvider::default();
    assert_eq!(
        h.dispatcher.get_file_info(&provider, &CallbackData::new("src\\nested")),
        Status::OK
    );
    assert!(provider.placeholders()[0].1.basic.is_directory);
}

#[test]
fn test_file_info_for_virtual_file() {
    let h = harness(sample_tree());
    let provider = RecordingProvider::default();
    assert_eq!(
        h.dispatcher.get_file_info(&provider, &CallbackData::new(".vprj\\config")),
        Status::OK
    );
    let placeholders = provider.placeholders();
    assert_eq!(placeholders[0].0, ".vprj\\config");
    assert_eq!(placeholders[0].1.basic.file_size, h.dispatcher.virtual_file().len());
    assert!(!placeholders[0].1.basic.is_directory);
}

#[test]
fn test_virtual_file_match_is_case_sensitive() {
    let h = harness(sample_tree());
    let provider = RecordingProvider::default();
    assert_eq!(
        h.dispatcher.get_file_info(&provider, &CallbackData::new(".vprj\\Config")),
        Status::FILE_NOT_FOUND
    );
    assert!(provider.placeholders().is_empty());
}

#[test]
fn test_file_info_missing_path() {
    let h = harness(sample_tree());
    let provider = RecordingProvider::default();
    assert_eq!(
        h.dispatcher.get_file_info(&provider, &CallbackData::new("nope.txt")),
        Status::FILE_NOT_FOUND
    );
    assert!(provider.placeholders().is_empty());
}

#[test]
fn test_file_info_propagates_tree_failure() {
    let h = harness(sample_tree());
    h.tree.break_path("README.md");
    let provider = RecordingProvider::default();
    assert_eq!(
        h.dispatcher.get_file_info(&provider, &CallbackData::new("README.md")),
        Status::FAIL
    );
}

#[test]
fn test_placeholder_write_failure_is_returned() {
    let h = harness(sample_tree());
    let provider = RecordingProvider {
        fail_placeholder: Some(Status::ACCESS_DENIED),
        ..Default::default()
    };
    assert_eq!(
        h.dispatcher.get_file_info(&provider, &CallbackData::new("README.md")),
        Status::ACCESS_DENIED
    );
}

#[test]
fn test_query_file_name() {
    let h = harness(sample_tree());
    assert_eq!(h.dispatcher.query_file_name(&CallbackData::new("src\\lib.rs")), Status::OK);
    assert_eq!(h.dispatcher.query_file_name(&CallbackData::new("readme.MD")), Status::OK);
    assert_eq!(h.dispatcher.query_file_name(&CallbackData::new(".vprj\\config")), Status::OK);
    assert_eq!(
        h.dispatcher.query_file_name(&CallbackData::new("src\\gone.rs")),
        Status::FILE_NOT_FOUND
    );

    h.tree.break_path("docs");
    assert_eq!(h.dispatcher.query_file_name(&CallbackData::new("docs")), Status::FAIL);
}

// ============================================================================
// File data
// ============================================================================

#[test]
fn test_small_file_is_delivered_whole() {
    let h = harness(sample_tree());
    let provider = RecordingProvider::default();
    let stream = Uuid::new_v4();
    let cb = CallbackData::new("src\\lib.rs").with_data_stream(stream);

    assert_eq!(h.dispatcher.get_file_data(&provider, &cb, 4, 2), Status::OK);
    assert_eq!(provider.writes(), vec![(0, b"pub mod a;\n".to_vec())]);
}

#[test]
fn test_virtual_file_data() {
    let h = harness(sample_tree());
    let provider = RecordingProvider::default();
    let len = h.dispatcher.virtual_file().len() as u32;
    assert_eq!(
        h.dispatcher.get_file_data(&provider, &CallbackData::new(".vprj\\config"), 0, len),
        Status::OK
    );
    let writes = provider.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1, h.dispatcher.virtual_file().content());
    let parsed: toml::Table = toml::from_str(std::str::from_utf8(&writes[0].1).unwrap()).unwrap();
    assert_eq!(parsed["Config"]["root"].as_str(), Some("C:\\repo"));
}

#[test]
fn test_large_range_is_chunked_and_aligned() {
    let content: Vec<u8> = (0..10 * MIB).map(|i| (i % 253) as u8).collect();
    let h = harness(FakeTree::new().with_file("blob.bin", content.clone()));
    let provider = RecordingProvider::aligned(4096);

    let status = h
        .dispatcher
        .get_file_data(&provider, &CallbackData::new("blob.bin"), 0, (6 * MIB) as u32);
    assert_eq!(status, Status::OK);

    let writes = provider.writes();
    assert!(writes.len() > 1);
    let mut expected = 0u64;
    for (offset, data) in &writes {
        assert_eq!(*offset, expected);
        assert_eq!(offset % 4096, 0);
        assert!(data.len() <= 5 * MIB);
        assert_eq!(&content[*offset as usize..*offset as usize + data.len()], &data[..]);
        expected += data.len() as u64;
    }
    assert_eq!(expected, (6 * MIB) as u64);
}

#[test]
fn test_custom_limits_apply() {
    let limits = TransferLimits {
        min_chunk_size: 1024,
        max_chunk_size: 16 * 1024,
    };
    let h = harness_with_limits(FakeTree::new().with_file("f", vec![7u8; 64 * 1024]), limits);
    let provider = RecordingProvider::aligned(4096);

    assert_eq!(
        h.dispatcher.get_file_data(&provider, &CallbackData::new("f"), 0, 40 * 1024),
        Status::OK
    );
    let sizes: Vec<usize> = provider.writes().iter().map(|(_, d)| d.len()).collect();
    assert_eq!(sizes, vec![16 * 1024, 16 * 1024, 8 * 1024]);
}

#[test]
fn test_file_data_missing_path() {
    let h = harness(sample_tree());
    let provider = RecordingProvider::default();
    assert_eq!(
        h.dispatcher.get_file_data(&provider, &CallbackData::new("gone"), 0, 1),
        Status::FILE_NOT_FOUND
    );
    assert!(provider.writes().is_empty());
}

#[test]
fn test_file_data_allocation_failure() {
    let h = harness(sample_tree());
    let provider = RecordingProvider {
        fail_alloc: true,
        ..Default::default()
    };
    assert_eq!(
        h.dispatcher.get_file_data(&provider, &CallbackData::new("README.md"), 0, 9),
        Status::OUT_OF_MEMORY
    );
}

#[test]
fn test_range_past_end_is_invalid() {
    let h = harness(FakeTree::new().with_file("big", vec![1u8; MIB]));
    let provider = RecordingProvider::default();
    assert_eq!(
        h.dispatcher
            .get_file_data(&provider, &CallbackData::new("big"), (MIB - 4) as u64, 8),
        Status::INVALID_PARAMETER
    );
    assert!(provider.writes().is_empty());
}

// ============================================================================
// Notifications
// ============================================================================

fn notify(
    h: &common::Harness,
    path: &str,
    dest: Option<&str>,
    is_dir: bool,
    kind: NotificationKind,
) -> Status {
    h.dispatcher.notify(&CallbackData::new(path), dest, is_dir, kind.code())
}

#[test]
fn test_new_file_and_directory_created() {
    let h = harness(sample_tree());
    assert_eq!(
        notify(&h, "src\\new.rs", None, false, NotificationKind::NewFileCreated),
        Status::OK
    );
    assert_eq!(notify(&h, "docs\\guide", None, true, NotificationKind::NewFileCreated), Status::OK);
    assert_eq!(h.tree.ops(), vec!["mknod src/new.rs", "mkdir docs/guide"]);
}

#[test]
fn test_modifications_materialize() {
    let h = harness(sample_tree());
    assert_eq!(notify(&h, "README.md", None, false, NotificationKind::FileOverwritten), Status::OK);
    assert_eq!(
        notify(&h, "src\\a.rs", None, false, NotificationKind::FileHandleClosedFileModified),
        Status::OK
    );
    assert_eq!(h.tree.ops(), vec!["materialize README.md", "materialize src/a.rs"]);
}

#[test]
fn test_deletions() {
    let h = harness(sample_tree());
    assert_eq!(
        notify(&h, "src\\a.rs", None, false, NotificationKind::FileHandleClosedFileDeleted),
        Status::OK
    );
    assert_eq!(
        notify(&h, "src\\nested", None, true, NotificationKind::FileHandleClosedFileDeleted),
        Status::OK
    );
    assert_eq!(h.tree.ops(), vec!["unlink src/a.rs", "rmdir src/nested"]);
}

#[test]
fn test_rename_within_projection() {
    let h = harness(sample_tree());
    assert_eq!(
        notify(&h, "src\\a.rs", Some("docs\\b.rs"), false, NotificationKind::FileRenamed),
        Status::OK
    );
    assert_eq!(h.tree.ops(), vec!["rename src/a.rs -> docs/b.rs"]);
}

#[test]
fn test_rename_into_projection_creates() {
    let h = harness(sample_tree());
    assert_eq!(
        notify(&h, "", Some("src\\moved_in.rs"), false, NotificationKind::FileRenamed),
        Status::OK
    );
    assert_eq!(
        notify(&h, "", Some("docs\\dir_in"), true, NotificationKind::FileRenamed),
        Status::OK
    );
    assert_eq!(h.tree.ops(), vec!["mknod src/moved_in.rs", "mkdir docs/dir_in"]);
}

#[test]
fn test_rename_out_of_projection_removes() {
    let h = harness(sample_tree());
    assert_eq!(notify(&h, "src\\a.rs", Some(""), false, NotificationKind::FileRenamed), Status::OK);
    assert_eq!(notify(&h, "docs", None, true, NotificationKind::FileRenamed), Status::OK);
    assert_eq!(h.tree.ops(), vec!["unlink src/a.rs", "rmdir docs"]);
}

#[test]
fn test_hardlink_refused_without_mutation() {
    let h = harness(sample_tree());
    assert_eq!(
        notify(&h, "src\\a.rs", Some("src\\link.rs"), false, NotificationKind::PreSetHardlink),
        Status::ACCESS_DENIED
    );
    assert!(h.tree.ops().is_empty());
}

#[test]
fn test_unhandled_notification_rejected_without_mutation() {
    let h = harness(sample_tree());
    for code in [0x10, 0x20, 0x100, 0x200] {
        assert_eq!(
            h.dispatcher.notify(&CallbackData::new("src\\a.rs"), None, false, code),
            Status::INVALID_PARAMETER
        );
    }
    assert!(h.tree.ops().is_empty());
}

#[test]
fn test_notification_tree_errors_propagate() {
    let h = harness(sample_tree());
    assert_eq!(
        notify(&h, "missing\\x.rs", None, false, NotificationKind::NewFileCreated),
        Status::FILE_NOT_FOUND
    );
    h.tree.break_path("docs");
    assert_eq!(
        notify(&h, "src\\a.rs", Some("docs\\a.rs"), false, NotificationKind::FileRenamed),
        Status::FAIL
    );
    assert!(h.tree.ops().is_empty());
}
