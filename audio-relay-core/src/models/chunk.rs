use bytes::Bytes;

/// One encoded slice of the live stream, the unit of transport.
///
/// Ordering is implicit (emission order). The payload is reference counted
/// so every consumer receives the identical bytes without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    data: Bytes,
}

impl EncodedChunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Vec<u8>> for EncodedChunk {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}
