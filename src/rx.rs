use std::collections::VecDeque;

use crate::buf::ByteBuf;
use crate::error::WtpError;

/// A received fragment awaiting in-order assembly.
///
/// Payload bytes live in the fragment arena at `pos`; descriptors are kept
/// in arrival order so arena reclamation can run strictly FIFO. Assembled
/// fragments stay listed until their arena bytes are reclaimed.
#[derive(Debug, Clone, Copy)]
struct RxFragment {
    seq_num: u16,
    pos: usize,
    size: u16,
    assembled: bool,
}

/// A message boundary declared by a BEGIN_MSG packet.
#[derive(Debug, Clone, Copy)]
struct MsgInfo {
    begin: u16,
    size: u16,
}

/// Sliding-window reliable receiver.
///
/// Accepts fragments in arbitrary order inside the window, stitches them
/// into a contiguous byte stream, and re-imposes message boundaries from
/// the BEGIN_MSG declarations. Completed messages land in the delivery
/// buffer as `[size:u16][bytes]` records, always a prefix of the in-order
/// reassembled stream.
#[derive(Debug)]
pub struct RxControl {
    /// Next expected sequence number.
    seq_num: u16,
    window_size: u16,
    /// In-order delivery buffer.
    msg_data_buf: ByteBuf,
    /// Bump arena holding fragment payload bytes, reclaimed oldest-first.
    arena: ByteBuf,
    /// Fragment descriptors in arrival order.
    fragments: VecDeque<RxFragment>,
    /// Declared message ranges, sorted by begin sequence. Only the head may
    /// lie partially behind `seq_num` (the message being delivered).
    msg_infos: Vec<MsgInfo>,
    msg_info_capacity: usize,
}

impl RxControl {
    pub fn new(
        window_size: u16,
        msg_data_size: usize,
        arena_size: usize,
        n_msg_info: usize,
    ) -> Self {
        Self {
            seq_num: 0,
            window_size,
            msg_data_buf: ByteBuf::new(msg_data_size),
            arena: ByteBuf::new(arena_size),
            fragments: VecDeque::new(),
            msg_infos: Vec::with_capacity(n_msg_info),
            msg_info_capacity: n_msg_info,
        }
    }

    pub fn seq_num(&self) -> u16 {
        self.seq_num
    }

    pub fn window_size(&self) -> u16 {
        self.window_size
    }

    pub fn set_window_size(&mut self, window_size: u16) {
        self.window_size = window_size;
    }

    pub fn n_pending_fragments(&self) -> usize {
        self.fragments.iter().filter(|f| !f.assembled).count()
    }

    /// Base for relative sequence comparisons across the live declarations.
    /// The head declaration can reach behind `seq_num` while its message is
    /// being delivered; it anchors the ordering in that case.
    fn msg_info_base(&self) -> u16 {
        match self.msg_infos.first() {
            Some(head) if head.begin.wrapping_sub(self.seq_num) >= self.window_size => head.begin,
            _ => self.seq_num,
        }
    }

    fn insert_msg_info(&mut self, begin: u16, size: u16) -> Result<(), WtpError> {
        let base = self.msg_info_base();
        let rel_begin = u32::from(begin.wrapping_sub(base));
        let rel_end = rel_begin + u32::from(size);

        let mut at = self.msg_infos.len();
        for (i, info) in self.msg_infos.iter().enumerate() {
            let info_begin = u32::from(info.begin.wrapping_sub(base));
            let info_end = info_begin + u32::from(info.size);
            if info_begin >= rel_begin {
                // Overlap with the successor range rejects the declaration.
                if rel_end > info_begin {
                    return Err(WtpError::Invalid);
                }
                at = i;
                break;
            }
            // Overlap with the predecessor range rejects it as well.
            if info_end > rel_begin {
                return Err(WtpError::Invalid);
            }
        }
        if self.msg_infos.len() >= self.msg_info_capacity {
            return Err(WtpError::NoMemory);
        }
        self.msg_infos.insert(at, MsgInfo { begin, size });
        Ok(())
    }

    /// Accepts one data packet.
    ///
    /// `new_msg_size` is the declared message length of a BEGIN_MSG packet
    /// and 0 for continuations. Returns how many complete messages became
    /// available in the delivery buffer.
    pub fn handle_packet(
        &mut self,
        seq_num: u16,
        data: &[u8],
        new_msg_size: u16,
    ) -> Result<u8, WtpError> {
        let size = data.len();
        let rel_begin = self.rel(seq_num);
        if size == 0
            || rel_begin >= self.window_size
            || usize::from(rel_begin) + size > usize::from(self.window_size)
        {
            return Err(WtpError::Invalid);
        }

        if new_msg_size > 0 {
            self.insert_msg_info(seq_num, new_msg_size)?;
        }

        // Fragments may not overlap; duplicates fail the same check.
        let rel_end = u32::from(rel_begin) + size as u32;
        for fragment in self.fragments.iter().filter(|f| !f.assembled) {
            let frag_begin = u32::from(self.rel(fragment.seq_num));
            let frag_end = frag_begin + u32::from(fragment.size);
            if frag_begin < rel_end && u32::from(rel_begin) < frag_end {
                return Err(WtpError::Invalid);
            }
        }

        let pos = self.arena.alloc(size)?;
        self.arena.slice_mut(pos, size)?.copy_from_slice(data);
        self.fragments.push_back(RxFragment {
            seq_num,
            pos,
            size: size as u16,
            assembled: false,
        });

        self.msg_data_buf.compact();
        let n_msgs = self.assemble_prefix()?;
        self.reclaim_arena()?;
        Ok(n_msgs)
    }

    /// Drains consecutive fragments starting at `seq_num` into the delivery
    /// buffer, interleaving message size prefixes at declared boundaries.
    fn assemble_prefix(&mut self) -> Result<u8, WtpError> {
        let mut n_msgs = 0;
        loop {
            let expected = self.seq_num;
            let Some(next) = self
                .fragments
                .iter_mut()
                .find(|f| !f.assembled && f.seq_num == expected)
            else {
                break;
            };
            let (pos, size) = (next.pos, next.size);
            next.assembled = true;

            if let Some(head) = self.msg_infos.first()
                && head.begin == self.seq_num
            {
                self.msg_data_buf.write_u16(head.size)?;
            }

            self.msg_data_buf
                .write(self.arena.slice(pos, usize::from(size))?)?;
            self.seq_num = self.seq_num.wrapping_add(size);

            if let Some(head) = self.msg_infos.first()
                && head.begin.wrapping_add(head.size) == self.seq_num
            {
                self.msg_infos.remove(0);
                n_msgs += 1;
            }
        }
        Ok(n_msgs)
    }

    /// Releases assembled fragments from the oldest end of the arena.
    fn reclaim_arena(&mut self) -> Result<(), WtpError> {
        while let Some(front) = self.fragments.front() {
            if !front.assembled {
                break;
            }
            self.arena.free(usize::from(front.size))?;
            self.fragments.pop_front();
        }
        Ok(())
    }

    /// Slices the next complete `[size:u16][bytes]` record out of the
    /// delivery buffer.
    pub fn next_message(&mut self) -> Result<&[u8], WtpError> {
        let size = self.msg_data_buf.read_u16()?;
        self.msg_data_buf.read_slice(usize::from(size))
    }

    fn rel(&self, seq: u16) -> u16 {
        seq.wrapping_sub(self.seq_num)
    }
}
