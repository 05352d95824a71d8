use crate::Result;

/// Chunk processor: `(data, offset, is_final)`. Invoked synchronously on
/// the producer's stack; any captured context rides in the closure.
pub type ProcessorFn = Box<dyn FnMut(&[u8], u64, bool) -> Result<()>>;

/// A pure sink with no backing storage. Every write is forwarded to the
/// processor; reads are invalid, and the rest of the stream surface is
/// accepted as a successful no-op so codecs can call it unconditionally.
pub struct ProcessorStream {
    identity: String,
    processor: ProcessorFn,
}

impl ProcessorStream {
    pub fn new(identity: impl Into<String>, processor: ProcessorFn) -> Self {
        Self {
            identity: identity.into(),
            processor,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn write(&mut self, data: &[u8], offset: u64, is_final: bool) -> Result<()> {
        (self.processor)(data, offset, is_final)
    }
}
