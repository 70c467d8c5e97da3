use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// First byte of a tagged string. Tagged strings are expected to repeat and
/// are worth interning in the per-connection string table.
pub const STRING_TAG_PREFIX_BYTE: u8 = 0x01;

/// Cheaply clonable, immutable string shared between the application and
/// every connection's string table.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetStringHandle(Arc<str>);

impl NetStringHandle {
    pub fn new(value: &str) -> Self {
        Self(Arc::from(value))
    }

    /// Builds a tagged string from its tag text
    pub fn tagged(tag: &str) -> Self {
        let mut value = String::with_capacity(tag.len() + 1);
        value.push(char::from(STRING_TAG_PREFIX_BYTE));
        value.push_str(tag);
        Self(Arc::from(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_tagged(&self) -> bool {
        self.0.as_bytes().first() == Some(&STRING_TAG_PREFIX_BYTE)
    }

    pub(crate) fn table_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        hasher.finish()
    }
}

impl From<&str> for NetStringHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NetStringHandle {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Debug for NetStringHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for NetStringHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
