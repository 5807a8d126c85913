//! Integration tests for URI parameters and cache scope
//!
//! These tests open real SQLCipher handles and verify:
//! - Pragma readback for options set through the URI
//! - Precedence of explicit properties over URI options
//! - Independence of the process-wide shared-cache flag and the per-handle
//!   cache scope
//! - Pre-flight rejection of unknown options

use cipherlink_connect::{
    CacheScope, ConfigSource, ConnectError, NormalizedConfig, Properties,
};

mod fixtures;

use fixtures::{isolated_connector, TestDatabase};

// ============================================================================
// Readback Tests
// ============================================================================

/// Validates pragma readback for the driver's parameter fixture URI.
///
/// Assertions:
/// - Confirms `busy_timeout`, `auto_vacuum`, `journal_mode`, `synchronous` and
///   `cache_size` read back in their encoded form.
/// - Ensures `cache=private` leaves both shared-cache observations false.
#[test]
fn test_uri_parameters_read_back() {
    let db = TestDatabase::new();
    let connector = isolated_connector();

    let conn = connector
        .open_uri(&db.uri(
            "?cache=private&busy_timeout=1800000&auto_vacuum=2&journal_mode=truncate\
             &synchronous=full&cache_size=-65536",
        ))
        .unwrap();

    assert_eq!(conn.pragma("busy_timeout").unwrap(), "1800000");
    assert_eq!(conn.pragma("auto_vacuum").unwrap(), "2");
    assert_eq!(conn.pragma("journal_mode").unwrap(), "truncate");
    assert_eq!(conn.pragma("synchronous").unwrap(), "2");
    assert_eq!(conn.pragma("cache_size").unwrap(), "-65536");

    assert!(!conn.state().is_shared_cache_enabled());
    assert!(!conn.state().is_shared_cache_connection());
}

/// Validates readback for every pragma option in the registry.
///
/// Assertions:
/// - Confirms each option reads back exactly the encoded value.
#[test]
fn test_every_pragma_round_trips() {
    let cases = [
        ("busy_timeout", "250", "250"),
        ("auto_vacuum", "incremental", "2"),
        ("journal_mode", "wal", "wal"),
        ("synchronous", "normal", "1"),
        ("cache_size", "-4096", "-4096"),
        ("foreign_keys", "on", "1"),
        ("recursive_triggers", "yes", "1"),
        ("secure_delete", "true", "1"),
        ("temp_store", "memory", "2"),
        ("locking_mode", "normal", "normal"),
        ("journal_size_limit", "1048576", "1048576"),
        ("user_version", "7", "7"),
        ("application_id", "1234", "1234"),
    ];

    let db = TestDatabase::new();
    let query: Vec<String> = cases.iter().map(|(name, raw, _)| format!("{}={}", name, raw)).collect();
    let conn = isolated_connector().open_uri(&db.uri(&format!("?{}", query.join("&")))).unwrap();

    for (name, _, expected) in cases {
        assert_eq!(conn.pragma(name).unwrap(), expected, "readback of {}", name);
    }
}

/// Validates that the `sqlite:file:` form addresses the same file.
#[test]
fn test_file_prefixed_uri() {
    let db = TestDatabase::new();
    let connector = isolated_connector();

    let conn = connector.open_uri(&db.file_uri("?user_version=11")).unwrap();
    conn.close().unwrap();

    let conn = connector.open_uri(&db.uri("")).unwrap();
    assert_eq!(conn.pragma("user_version").unwrap(), "11");
    assert!(db.path().exists());
}

/// Validates precedence of explicit properties over URI options.
///
/// Assertions:
/// - Confirms the explicit `synchronous` wins over the URI value.
/// - Confirms URI-only options still apply.
#[test]
fn test_explicit_properties_override_uri() {
    let db = TestDatabase::new();
    let source = ConfigSource::new(db.uri("?synchronous=off&cache_size=-1000"))
        .with_properties(Properties::new().with("synchronous", "extra"));

    let conn = isolated_connector().open_source(&source).unwrap();
    assert_eq!(conn.pragma("synchronous").unwrap(), "3");
    assert_eq!(conn.pragma("cache_size").unwrap(), "-1000");
}

// ============================================================================
// Cache Scope Tests
// ============================================================================

/// Validates that `cache=shared` turns on both observations.
///
/// Assertions:
/// - Confirms the process flag and the handle flag are both true.
/// - Confirms a later open without `cache=` inherits eligibility from the
///   process flag.
/// - Confirms `cache=private` still opts a handle out.
#[test]
fn test_shared_cache_scope() {
    let db = TestDatabase::new();
    let connector = isolated_connector();

    let shared = connector.open_uri(&db.uri("?cache=shared")).unwrap();
    assert!(shared.state().is_shared_cache_enabled());
    assert!(shared.state().is_shared_cache_connection());

    let other = TestDatabase::new();
    let inherited = connector.open_uri(&other.uri("")).unwrap();
    assert!(inherited.state().is_shared_cache_enabled());
    assert!(inherited.state().is_shared_cache_connection());

    let private = connector.open_uri(&other.uri("?cache=private")).unwrap();
    assert!(private.state().is_shared_cache_enabled());
    assert!(!private.state().is_shared_cache_connection());
}

/// Validates that the shared-cache flag option alone enables the process flag.
#[test]
fn test_shared_cache_flag_option() {
    let db = TestDatabase::new();
    let connector = isolated_connector();

    let conn = connector.open_uri(&db.uri("?shared_cache=1")).unwrap();
    assert!(connector.context().is_shared_cache_enabled());
    assert!(conn.state().is_shared_cache_connection());
}

/// Validates the statement-driven cache default.
///
/// Assertions:
/// - Ensures the process flag stays false.
/// - Ensures the handle is shared-cache eligible without `cache=`.
/// - Ensures `cache=private` opts the handle out.
/// - Ensures `cache=shared` makes the handle eligible without setting the
///   process flag.
#[test]
fn test_statement_driven_cache_default() {
    let db = TestDatabase::new();
    let connector = isolated_connector();

    let conn = connector
        .open_with_statements(
            &db.uri(""),
            &["PRAGMA key = 'statement secret'", "PRAGMA cipher_compatibility = 4"],
        )
        .unwrap();
    assert!(!conn.state().is_shared_cache_enabled());
    assert!(conn.state().is_shared_cache_connection());
    assert!(conn.state().is_encrypted());
    conn.close().unwrap();

    let conn = connector
        .open_with_statements(&db.uri("?cache=private"), &["PRAGMA key = 'statement secret'"])
        .unwrap();
    assert!(!conn.state().is_shared_cache_connection());
    assert!(!connector.context().is_shared_cache_enabled());
    conn.close().unwrap();

    let conn = connector
        .open_with_statements(&db.uri("?cache=shared"), &["PRAGMA key = 'statement secret'"])
        .unwrap();
    assert!(conn.state().is_shared_cache_connection());
    assert!(!conn.state().is_shared_cache_enabled());
    assert!(!connector.context().is_shared_cache_enabled());
}

/// Validates that a failed open leaves the process flag untouched.
///
/// Assertions:
/// - Ensures a wrong-key open with `cache=shared` fails with `KeyMismatch`.
/// - Ensures the process flag is still false afterwards.
/// - Ensures a later open without `cache=` is not shared-cache eligible.
#[test]
fn test_failed_open_keeps_process_flag() {
    let db = TestDatabase::new();
    let connector = isolated_connector();

    let conn = connector.open_uri(&db.uri("?key=first%20secret")).unwrap();
    conn.execute_batch("CREATE TABLE notes (body TEXT)").unwrap();
    conn.close().unwrap();

    let err = connector.open_uri(&db.uri("?cache=shared&key=second%20secret")).unwrap_err();
    assert!(matches!(err, ConnectError::KeyMismatch { .. }));
    assert!(!connector.context().is_shared_cache_enabled());

    let other = TestDatabase::new();
    let conn = connector.open_uri(&other.uri("")).unwrap();
    assert!(!conn.state().is_shared_cache_enabled());
    assert!(!conn.state().is_shared_cache_connection());
}

// ============================================================================
// Rejection Tests
// ============================================================================

/// Validates that an unknown option fails before any file is created.
///
/// Assertions:
/// - Ensures the error is `UnsupportedOption`.
/// - Ensures the database file was not created.
#[test]
fn test_unknown_option_rejected_before_open() {
    let db = TestDatabase::new();
    let err = isolated_connector().open_uri(&db.uri("?not_a_real_option=1")).unwrap_err();

    assert!(matches!(err, ConnectError::UnsupportedOption(ref name) if name == "not_a_real_option"));
    assert!(err.is_preflight());
    assert!(!db.path().exists());
}

/// Validates value and URI rejections.
#[test]
fn test_invalid_values_and_uris() {
    assert!(matches!(
        NormalizedConfig::from_uri("sqlite:x.db?journal_mode=sideways"),
        Err(ConnectError::InvalidValue { .. })
    ));
    assert!(matches!(
        NormalizedConfig::from_uri("postgres://localhost/db"),
        Err(ConnectError::InvalidUri(_))
    ));

    let config = NormalizedConfig::from_uri("sqlite:x.db?cache=SHARED").unwrap();
    assert_eq!(config.cache_scope(), Some(CacheScope::Shared));
}
