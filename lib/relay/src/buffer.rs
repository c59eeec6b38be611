use std::io;

/// Read chunk size for socket ingress.
const CHUNK_SIZE: usize = 4096;

/// A buffered FIFO byte queue backing one direction of a connection. Data is
/// appended at the tail and consumed from the head; the backing storage is
/// compacted whenever the queue drains completely.
pub struct Buffer {
    data: Vec<u8>,
    head: usize,
}

impl Buffer {
    #[inline]
    pub fn new() -> Buffer {
        Buffer {
            data: Vec::new(),
            head: 0,
        }
    }

    /// The number of unconsumed bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    /// Returns true in case the buffer is empty, false otherwise.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slice containing the unconsumed data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.head..]
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    /// Advance the head past `count` consumed bytes.
    #[inline]
    pub fn consume(&mut self, count: usize) {
        debug_assert!(count <= self.len());
        self.head += count;

        if self.head == self.data.len() {
            self.clear();
        }
    }

    /// Absolute write position. Valid for `patch_u32` until the next
    /// `consume` or `clear`.
    #[inline]
    pub fn pos(&self) -> usize {
        self.data.len()
    }

    /// Patch a little-endian `u32` previously reserved at `pos`. Used to
    /// write a frame length in front of a body once the body size is known.
    #[inline]
    pub fn patch_u32(&mut self, pos: usize, value: u32) {
        self.data[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read in data from the supplied reader until it reports would-block.
    /// `Ok(0)` means the reader hit end-of-stream before yielding anything;
    /// a would-block before any byte arrives is surfaced as an error so the
    /// caller can distinguish a closed peer from an idle one.
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut total = 0;

        loop {
            match reader.read(&mut chunk) {
                Ok(0) => return Ok(total),
                Ok(count) => {
                    self.data.extend_from_slice(&chunk[..count]);
                    total += count;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock && total > 0 => {
                    return Ok(total);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Write the contents of the buffer to the supplied writer, advancing
    /// the head. Stops on would-block with the remaining data retained.
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let orig_len = self.len();

        while self.len() > 0 {
            let count = writer.write(self.as_slice())?;

            if count == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }

            self.consume(count);
        }

        Ok(orig_len)
    }
}

impl io::Write for Buffer {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::min;
    use std::io::Write;

    struct MockChannel {
        data: Vec<u8>,
        cursor: usize,
        chunk: usize,
        max_size: usize,
    }

    impl MockChannel {
        fn new(data: Vec<u8>, chunk: usize, max_size: usize) -> MockChannel {
            MockChannel {
                data,
                cursor: 0,
                chunk,
                max_size,
            }
        }

        fn clear(&mut self) {
            self.data.clear();
            self.cursor = 0;
        }
    }

    impl io::Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.cursor == self.data.len() {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let offset = min(min(self.chunk, buf.len()), self.data.len() - self.cursor);
            buf[..offset].copy_from_slice(&self.data[self.cursor..(self.cursor + offset)]);
            self.cursor += offset;
            Ok(offset)
        }
    }

    impl io::Write for MockChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.data.len() == self.max_size {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let count = min(self.chunk, buf.len());
            self.data.extend(&buf[..count]);

            Ok(count)
        }

        fn flush(&mut self) -> io::Result<()> {
            unimplemented!()
        }
    }

    #[test]
    fn test_roundtrip() {
        let mock_data: Vec<_> = (0..10000).map(|item| item as u8).collect();
        let mut channel = MockChannel::new(mock_data.clone(), 500, mock_data.len());

        let mut buffer = Buffer::new();

        let count = buffer.ingress(&mut channel).unwrap();

        assert_eq!(count, mock_data.len());
        assert_eq!(buffer.len(), mock_data.len());
        assert_eq!(buffer.as_slice(), &mock_data[..]);

        channel.clear();
        let count = buffer.egress(&mut channel).unwrap();

        assert_eq!(count, mock_data.len());
        assert_eq!(buffer.len(), 0);
        assert_eq!(channel.data[..], mock_data[..]);
    }

    #[test]
    fn test_ingress_would_block_without_data() {
        let mut channel = MockChannel::new(Vec::new(), 500, 0);
        let mut buffer = Buffer::new();

        let result = buffer.ingress(&mut channel);

        assert_eq!(result.err().unwrap().kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_egress_error_on_zero_write() {
        let mut zero_vec = vec![];

        let mut buffer = Buffer::new();
        buffer.write_all(&[1]).unwrap();

        let result = buffer.egress(&mut zero_vec[..]);

        assert_eq!(result.err().unwrap().kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_egress_partial_retains_data() {
        let mut buffer = Buffer::new();
        buffer.write_all(&[1, 2, 3, 4]).unwrap();

        // Channel accepts two bytes before blocking.
        let mut channel = MockChannel::new(Vec::new(), 2, 2);
        let result = buffer.egress(&mut channel);

        assert_eq!(result.err().unwrap().kind(), io::ErrorKind::WouldBlock);
        assert_eq!(buffer.as_slice(), &[3, 4]);
        assert_eq!(channel.data, vec![1, 2]);
    }

    #[test]
    fn test_consume_compacts_when_drained() {
        let mut buffer = Buffer::new();
        buffer.write_all(&[1, 2, 3]).unwrap();

        buffer.consume(2);
        assert_eq!(buffer.as_slice(), &[3]);
        assert_eq!(buffer.pos(), 3);

        buffer.consume(1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.pos(), 0);
    }

    #[test]
    fn test_patch_u32() {
        let mut buffer = Buffer::new();
        let start = buffer.pos();
        buffer.write_all(&[0, 0, 0, 0, 42]).unwrap();

        buffer.patch_u32(start, 5);

        assert_eq!(buffer.as_slice(), &[5, 0, 0, 0, 42]);
    }
}
