use crate::error::WtpError;

/// A linear byte region with independent read and write cursors.
///
/// `ByteBuf` backs every marshalling surface of the endpoint: packet staging,
/// message storage, fragment arenas and the in-order delivery buffer. Plain
/// `read`/`write` move the cursors linearly and fail at the capacity bound;
/// `alloc`/`free` give the same region ring semantics, wrapping to offset 0
/// when the tail cannot hold a request. Allocations and frees must pair up in
/// FIFO order; `alloc` refuses with `NoMemory` before it would overrun data
/// that has not been freed yet.
#[derive(Debug, Clone)]
pub struct ByteBuf {
    data: Vec<u8>,
    pos_r: usize,
    pos_w: usize,
    /// Bytes live between the cursors, counting tail waste skipped by wraps.
    used: usize,
}

impl ByteBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            pos_r: 0,
            pos_w: 0,
            used: 0,
        }
    }

    /// A buffer pre-filled with `data`, ready to be parsed from the front.
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            pos_r: 0,
            pos_w: data.len(),
            used: data.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn pos_r(&self) -> usize {
        self.pos_r
    }

    pub fn pos_w(&self) -> usize {
        self.pos_w
    }

    /// Bytes written but not yet read, for linear producer/consumer use.
    pub fn remaining(&self) -> usize {
        self.pos_w.saturating_sub(self.pos_r)
    }

    pub fn is_drained(&self) -> bool {
        self.pos_r == self.pos_w
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The unread region `[pos_r, pos_w)`.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.pos_r..self.pos_w]
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8], WtpError> {
        if offset + len > self.data.len() {
            return Err(WtpError::OutOfRange);
        }
        Ok(&self.data[offset..offset + len])
    }

    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], WtpError> {
        if offset + len > self.data.len() {
            return Err(WtpError::OutOfRange);
        }
        Ok(&mut self.data[offset..offset + len])
    }

    pub fn read(&mut self, out: &mut [u8]) -> Result<(), WtpError> {
        if self.pos_r + out.len() > self.data.len() {
            return Err(WtpError::OutOfRange);
        }
        out.copy_from_slice(&self.data[self.pos_r..self.pos_r + out.len()]);
        self.pos_r += out.len();
        self.used = self.used.saturating_sub(out.len());
        Ok(())
    }

    /// Advances the read cursor past `len` bytes and returns them.
    pub fn read_slice(&mut self, len: usize) -> Result<&[u8], WtpError> {
        if self.pos_r + len > self.data.len() {
            return Err(WtpError::OutOfRange);
        }
        let start = self.pos_r;
        self.pos_r += len;
        self.used = self.used.saturating_sub(len);
        Ok(&self.data[start..start + len])
    }

    pub fn read_u8(&mut self) -> Result<u8, WtpError> {
        let mut b = [0u8; 1];
        self.read(&mut b)?;
        Ok(b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WtpError> {
        let mut b = [0u8; 2];
        self.read(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn peek_u8(&self) -> Result<u8, WtpError> {
        if self.pos_r >= self.data.len() {
            return Err(WtpError::OutOfRange);
        }
        Ok(self.data[self.pos_r])
    }

    pub fn skip(&mut self, len: usize) -> Result<(), WtpError> {
        if self.pos_r + len > self.data.len() {
            return Err(WtpError::OutOfRange);
        }
        self.pos_r += len;
        self.used = self.used.saturating_sub(len);
        Ok(())
    }

    pub fn write(&mut self, src: &[u8]) -> Result<(), WtpError> {
        if self.pos_w + src.len() > self.data.len() {
            return Err(WtpError::OutOfRange);
        }
        self.data[self.pos_w..self.pos_w + src.len()].copy_from_slice(src);
        self.pos_w += src.len();
        self.used += src.len();
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), WtpError> {
        self.write(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), WtpError> {
        self.write(&value.to_le_bytes())
    }

    /// Reserves `len` bytes at the write cursor and returns their offset.
    ///
    /// Wraps to offset 0 when the tail cannot hold the request. Fails with
    /// `NoMemory` once the region would collide with unfreed data.
    pub fn alloc(&mut self, len: usize) -> Result<usize, WtpError> {
        if len > self.data.len() {
            return Err(WtpError::NoMemory);
        }
        let tail = self.data.len() - self.pos_w;
        let waste = if tail < len { tail } else { 0 };
        if self.used + waste + len > self.data.len() {
            return Err(WtpError::NoMemory);
        }
        if waste > 0 || tail == 0 {
            self.pos_w = 0;
        }
        let offset = self.pos_w;
        self.pos_w += len;
        self.used += waste + len;
        Ok(offset)
    }

    /// Releases `len` bytes at the read cursor, in allocation order.
    pub fn free(&mut self, len: usize) -> Result<(), WtpError> {
        let tail = self.data.len() - self.pos_r;
        if tail < len {
            self.used = self.used.saturating_sub(tail);
            self.pos_r = 0;
        }
        self.pos_r += len;
        self.used = self.used.saturating_sub(len);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.pos_r = 0;
        self.pos_w = 0;
        self.used = 0;
    }

    /// Moves the unread region to offset 0 so subsequent writes stay
    /// contiguous with it.
    pub fn compact(&mut self) {
        let len = self.remaining();
        self.data.copy_within(self.pos_r..self.pos_w, 0);
        self.pos_r = 0;
        self.pos_w = len;
        self.used = len;
    }
}
