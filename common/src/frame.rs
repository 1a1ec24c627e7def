use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One encoded preview image (JPEG) as delivered to streaming consumers.
///
/// Frames are immutable once published. The payload is a [`Bytes`] handle so
/// every consumer holding the same generation shares one allocation.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Bytes,
    generation: u64,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub(crate) fn new(data: Bytes, generation: u64) -> Self {
        Self {
            data,
            generation,
            captured_at: Utc::now(),
        }
    }

    /// The encoded image bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Monotonic counter assigned by the relay at publish time. The first
    /// published frame has generation 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_payload() {
        let frame = Frame::new(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]), 7);
        let copy = frame.clone();
        assert_eq!(copy.generation(), 7);
        assert_eq!(copy.len(), 4);
        assert_eq!(frame.data().as_ptr(), copy.data().as_ptr());
    }
}
