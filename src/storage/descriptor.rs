//! Connection descriptor - where the backing store lives
//!
//! Format: `sqlite:///<path>`
//!
//! Examples:
//! - `sqlite:///database.db` (relative to the working directory)
//! - `sqlite:////var/data/heroes.db` (absolute)
//! - `sqlite://` or `sqlite:///:memory:` (private in-memory database)

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::{Error, Result};

const SCHEME: &str = "sqlite://";

static MEMORY_DATABASES: AtomicU64 = AtomicU64::new(0);

/// Parsed connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    /// A database file
    File(PathBuf),
    /// A named shared-cache in-memory database, alive while any connection to it is open
    Memory(String),
}

impl Descriptor {
    /// Parse a descriptor string
    pub fn parse(descriptor: &str) -> Result<Self> {
        let rest = descriptor.strip_prefix(SCHEME).ok_or_else(|| {
            Error::InvalidDescriptor(format!("{} (must start with {})", descriptor, SCHEME))
        })?;

        match rest {
            "" | "/" | "/:memory:" | ":memory:" => Ok(Self::memory()),
            _ => {
                let path = rest.strip_prefix('/').ok_or_else(|| {
                    Error::InvalidDescriptor(format!("{} (expected {}/<path>)", descriptor, SCHEME))
                })?;
                if path.is_empty() {
                    return Err(Error::InvalidDescriptor(format!("{} (empty path)", descriptor)));
                }
                Ok(Self::File(PathBuf::from(path)))
            }
        }
    }

    /// Descriptor for a database file
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    /// Fresh in-memory database, distinct from every other one in the process
    pub fn memory() -> Self {
        let n = MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed);
        Self::Memory(format!("rowkeeper-mem-{}-{}", std::process::id(), n))
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }

    /// The string handed to SQLite when opening a connection
    pub fn open_target(&self) -> String {
        match self {
            Self::File(path) => path.to_string_lossy().to_string(),
            Self::Memory(name) => format!("file:{}?mode=memory&cache=shared", name),
        }
    }
}

impl FromStr for Descriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}/{}", SCHEME, path.display()),
            Self::Memory(_) => write!(f, "{}/:memory:", SCHEME),
        }
    }
}
