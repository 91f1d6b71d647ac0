/// One unit of parallel work.
///
/// Ids are assigned in read order and decide the write order; ownership
/// moves from the reader to the input queue, to a worker, to the output
/// collection and finally to the destination file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: u64,
    pub payload: Vec<u8>,
    /// Inflated size of `payload`; only set on the decompress side.
    pub decoded_size: u64,
}

impl Block {
    pub fn new(id: u64, payload: Vec<u8>) -> Self {
        Self {
            id,
            payload,
            decoded_size: 0,
        }
    }

    pub fn with_decoded_size(id: u64, payload: Vec<u8>, decoded_size: u64) -> Self {
        Self {
            id,
            payload,
            decoded_size,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
