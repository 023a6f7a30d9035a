use std::fmt;

/// Identity of a consumer context, recovered from its channel name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsumerId(String);

impl ConsumerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Recover the consumer id from a channel named `"{prefix}{id}"`.
    ///
    /// Returns `None` if the name does not carry the prefix or the id is empty.
    pub fn from_channel_name(name: &str, prefix: &str) -> Option<Self> {
        let id = name.strip_prefix(prefix)?;
        if id.is_empty() {
            return None;
        }
        Some(Self(id.to_string()))
    }

    /// The channel name a consumer with this id opens.
    pub fn channel_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}
