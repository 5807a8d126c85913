//! Test fixtures for cipherlink-connect integration tests
//!
//! ## Key fixtures
//! Hex constants for the three key formats, with one valid and one short
//! value per raw format, and two hex-mode keys for rekey scenarios.
//!
//! ## Database fixtures
//! - [`TestDatabase`]: temp directory plus a file path and URI builders
//! - [`isolated_connector`]: connector with its own process context, so
//!   shared-cache assertions never depend on other tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Once;

use cipherlink_connect::{Connector, ProcessContext};
use tempfile::TempDir;

// ============================================================================
// Key Fixtures
// ============================================================================

/// 32-byte raw unsalted key
pub const UNSALTED_KEY_HEX: &str =
    "54686973206973206d792076657279207365637265742070617373776f72642e";

/// 25 bytes, too short for a raw unsalted key
pub const UNSALTED_KEY_SHORT_HEX: &str = "54686973206973206d79207665765742070617373776f72642";

/// 48-byte raw salted key (32-byte secret, 16-byte salt)
pub const SALTED_KEY_HEX: &str = "54686973206973206d792076657279207365637265742070617373776f72642e2e73616c7479206b65792073616c742e";

/// 37 bytes, too short for a raw salted key
pub const SALTED_KEY_SHORT_HEX: &str =
    "54686973206973206d79207070617373776f72642e2e73616c7479206b65792073616c742e";

/// Hex-mode key
pub const HEX_KEY: &str = "54686973206973206D792070";

/// Second hex-mode key for rekey scenarios
pub const HEX_KEY_2: &str = "AAFF54686973206973206D792070";

/// Decode a fixture constant
pub fn from_hex(value: &str) -> Vec<u8> {
    hex::decode(value).unwrap()
}

// ============================================================================
// Database Fixtures
// ============================================================================

/// Temporary database file, removed with its directory on drop
pub struct TestDatabase {
    _dir: TempDir,
    path: PathBuf,
}

impl TestDatabase {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `sqlite:<path>` followed by `query` (which should start with `?`)
    pub fn uri(&self, query: &str) -> String {
        format!("sqlite:{}{}", self.path.display(), query)
    }

    /// `sqlite:file:<path>` followed by `query`
    pub fn file_uri(&self, query: &str) -> String {
        format!("sqlite:file:{}{}", self.path.display(), query)
    }
}

/// Connector backed by a fresh process context
pub fn isolated_connector() -> Connector {
    init_tracing();
    Connector::new(ProcessContext::new())
}

/// Route tracing output through the test harness
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
