//! LogLine - Cheap-to-clone formatted log line
//!
//! Uses Arc<str> internally so fan-out to many sinks never copies the text.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Immutable, already formatted log line.
///
/// # Examples
/// ```
/// use contracts::LogLine;
///
/// let line = LogLine::from("2024-01-01 00:00:00 | INFO | bot | ready");
/// let copy = line.clone();  // O(1) - just increments ref count
/// assert_eq!(line, copy);
/// assert_eq!(line.byte_len(), 40);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct LogLine(Arc<str>);

impl LogLine {
    /// Create a new LogLine from a string slice.
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Get the underlying string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Size in bytes (UTF-8)
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.0.len()
    }
}

impl Deref for LogLine {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for LogLine {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LogLine {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for LogLine {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Debug for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for LogLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LogLine {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}
