//! Read-only view of a base archive

/// Immutable snapshot of caller-owned archive bytes.
///
/// Strategies read from it and always write into a fresh buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveImage<'a> {
    bytes: &'a [u8],
}

impl<'a> ArchiveImage<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Independently owned copy of the bytes
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl<'a> From<&'a [u8]> for ArchiveImage<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for ArchiveImage<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Self::new(bytes.as_slice())
    }
}
