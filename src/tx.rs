use smallvec::SmallVec;

use crate::buf::ByteBuf;
use crate::error::WtpError;
use crate::packet::{self, Packet, PacketType, Param};
use crate::queue::FixedQueue;

/// Scheduling record for the READ OpSpecs one queued message needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadInfo {
    pub size: u8,
    pub n_reads: u8,
}

/// One in-flight subrange of a queued message.
///
/// The payload bytes live in the transmit message buffer; `pos` is their
/// offset there and stays valid until the fragment is acknowledged.
#[derive(Debug, Clone, Copy)]
pub struct TxFragment {
    pub seq_num: u16,
    /// Total message length when this fragment opens a message, 0 on
    /// continuations.
    pub msg_size: u16,
    pub pos: usize,
    pub size: u8,
    /// Raised by a retransmission timeout; the next uplink opportunity
    /// serializes this fragment again before making fresh ones.
    pub need_send: bool,
}

impl TxFragment {
    pub fn end_seq(&self) -> u16 {
        self.seq_num.wrapping_add(u16::from(self.size))
    }
}

/// A pending `[size:u16][bytes]` record in the message buffer.
#[derive(Debug, Clone, Copy)]
struct MsgRecord {
    pos: usize,
    size: u16,
}

/// A fully fragmented message awaiting acknowledgement of its last byte.
#[derive(Debug, Clone, Copy)]
struct SentMsg {
    end_seq: u16,
    size: u16,
}

/// Result of reconciling a cumulative acknowledgement.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AckSummary {
    /// Messages whose final byte this ACK covered; the endpoint fires that
    /// many send-completion callbacks in FIFO order.
    pub n_sent_msgs: u8,
    /// Sequence numbers of the retired fragments, so their retransmission
    /// timers can be cancelled.
    pub freed_seqs: SmallVec<[u16; 8]>,
}

/// Sliding-window reliable sender.
///
/// Buffers outbound messages as contiguous `[size:u16][bytes]` records,
/// cuts them into fragments sized for the current READ OpSpec, and retires
/// records, fragments and send completions as cumulative ACKs come back.
#[derive(Debug)]
pub struct TxControl {
    /// Highest acknowledged sequence number.
    seq_num: u16,
    window_size: u16,
    /// Retransmission timeout in ticks.
    timeout: u16,
    /// Negotiated READ OpSpec size.
    read_size: u8,
    /// Staging area for outbound control packets, `[size][type][fields]`
    /// per record; checksums are appended when records are copied out.
    pkt_buf: ByteBuf,
    /// Message data, one contiguous record per pending message.
    msg_buf: ByteBuf,
    /// Sequence number where the message under fragmentation begins.
    msg_begin_seq: u16,
    /// How much of that message has been cut into fragments.
    msg_fragmented: u16,
    /// Records not yet fully fragmented, oldest first.
    queued: FixedQueue<MsgRecord>,
    /// Records fully fragmented but not fully acknowledged, oldest first.
    unacked: FixedQueue<SentMsg>,
    fragments: FixedQueue<TxFragment>,
    read_infos: FixedQueue<ReadInfo>,
    /// Offset of the reserved size byte of the packet under construction.
    pkt_size_slot: usize,
    /// Offset of the type byte of the packet under construction.
    pkt_begin: usize,
}

impl TxControl {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        window_size: u16,
        timeout: u16,
        read_size: u8,
        pkt_buf_size: usize,
        msg_buf_size: usize,
        n_fragments: usize,
        n_msgs: usize,
    ) -> Self {
        Self {
            seq_num: 0,
            window_size,
            timeout,
            read_size,
            pkt_buf: ByteBuf::new(pkt_buf_size),
            msg_buf: ByteBuf::new(msg_buf_size),
            msg_begin_seq: 0,
            msg_fragmented: 0,
            queued: FixedQueue::new(n_msgs),
            unacked: FixedQueue::new(n_msgs),
            fragments: FixedQueue::new(n_fragments),
            read_infos: FixedQueue::new(n_msgs),
            pkt_size_slot: 0,
            pkt_begin: 0,
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

    pub fn timeout(&self) -> u16 {
        self.timeout
    }

    pub fn read_size(&self) -> u8 {
        self.read_size
    }

    pub fn set_read_size(&mut self, read_size: u8) {
        self.read_size = read_size;
    }

    pub fn n_fragments(&self) -> usize {
        self.fragments.len()
    }

    /// Reserves the one-byte size slot and writes the type byte of a new
    /// control packet.
    pub fn begin_packet(&mut self, packet_type: PacketType) -> Result<(), WtpError> {
        self.pkt_size_slot = self.pkt_buf.alloc(1)?;
        self.pkt_begin = self.pkt_buf.pos_w();
        self.pkt_buf.write_u8(packet_type as u8)
    }

    /// Backfills the reserved size slot of the packet under construction.
    pub fn end_packet(&mut self) -> Result<(), WtpError> {
        let size = self.pkt_buf.pos_w() - self.pkt_begin;
        self.pkt_buf.slice_mut(self.pkt_size_slot, 1)?[0] = size as u8;
        Ok(())
    }

    /// Stages a control packet for the next EPC round.
    pub fn stage_packet(&mut self, packet: &Packet) -> Result<(), WtpError> {
        self.begin_packet(packet.packet_type())?;
        match packet {
            Packet::Open { reliable } => self.pkt_buf.write_u8(u8::from(*reliable))?,
            Packet::Close => {}
            Packet::Ack { seq_num } => self.pkt_buf.write_u16(*seq_num)?,
            Packet::ReqUplink { n_reads, read_size } => {
                self.pkt_buf.write_u8(*n_reads)?;
                self.pkt_buf.write_u8(*read_size)?;
            }
            Packet::SetParam(Param::WindowSize(window)) => {
                self.pkt_buf.write_u8(packet::PARAM_WINDOW_SIZE)?;
                self.pkt_buf.write_u16(*window)?;
            }
            Packet::SetParam(Param::ReadSize(size)) => {
                self.pkt_buf.write_u8(packet::PARAM_READ_SIZE)?;
                self.pkt_buf.write_u8(*size)?;
            }
            // Data packets go out through READ memory, never the EPC.
            Packet::BeginMsg { .. } | Packet::ContMsg { .. } => return Err(WtpError::Invalid),
        }
        self.end_packet()
    }

    pub fn pkt_buf(&self) -> &ByteBuf {
        &self.pkt_buf
    }

    pub fn pkt_buf_mut(&mut self) -> &mut ByteBuf {
        &mut self.pkt_buf
    }

    /// Queues a message and returns the READ schedule the endpoint should
    /// announce for it.
    pub fn add_msg(&mut self, data: &[u8]) -> Result<ReadInfo, WtpError> {
        if data.is_empty() || data.len() > usize::from(u16::MAX) {
            return Err(WtpError::Invalid);
        }
        if self.queued.is_full() || self.read_infos.is_full() {
            return Err(WtpError::NoMemory);
        }
        let size = data.len() as u16;
        let pos = self.msg_buf.alloc(2 + data.len())?;
        let record = self.msg_buf.slice_mut(pos, 2 + data.len())?;
        record[..2].copy_from_slice(&size.to_le_bytes());
        record[2..].copy_from_slice(data);
        self.queued.push(MsgRecord { pos, size })?;

        let n_reads = (data.len() / usize::from(self.read_size.max(1))) as u8 + 1;
        let read_info = ReadInfo {
            size: self.read_size,
            n_reads,
        };
        self.read_infos.push(read_info)?;
        Ok(read_info)
    }

    /// Cuts the next outbound fragment, or returns `None` when nothing is
    /// eligible (no queued data, or the send window is exhausted).
    pub fn make_fragment(&mut self, avail: u8) -> Result<Option<TxFragment>, WtpError> {
        let Some(record) = self.queued.front().copied() else {
            return Ok(None);
        };

        let seq_num = self.msg_begin_seq.wrapping_add(self.msg_fragmented);
        let header = if self.msg_fragmented == 0 {
            packet::BEGIN_MSG_HEADER
        } else {
            packet::CONT_MSG_HEADER
        };
        let max_avail = usize::from(avail).saturating_sub(header);
        let max_msg = usize::from(record.size - self.msg_fragmented);
        let max_window = usize::from(
            self.seq_num
                .wrapping_add(self.window_size)
                .wrapping_sub(seq_num),
        );
        let size = max_avail
            .min(max_msg)
            .min(max_window)
            .min(packet::MAX_PAYLOAD);
        if size == 0 {
            return Ok(None);
        }

        let fragment = TxFragment {
            seq_num,
            msg_size: if self.msg_fragmented == 0 { record.size } else { 0 },
            pos: record.pos + 2 + usize::from(self.msg_fragmented),
            size: size as u8,
            need_send: false,
        };
        self.fragments.push(fragment)?;
        self.msg_fragmented += size as u16;

        // The whole message is cut: move the record to the unacked set so
        // the ACK covering its last byte can retire it, and rewind the
        // cursor for the next record.
        if self.msg_fragmented >= record.size {
            self.msg_begin_seq = self.msg_begin_seq.wrapping_add(record.size);
            self.msg_fragmented = 0;
            let done = self.queued.pop()?;
            self.unacked.push(SentMsg {
                end_seq: self.msg_begin_seq,
                size: done.size,
            })?;
        }
        Ok(Some(fragment))
    }

    /// The payload bytes of a fragment, borrowed from the message buffer.
    pub fn fragment_payload(&self, fragment: &TxFragment) -> Result<&[u8], WtpError> {
        self.msg_buf.slice(fragment.pos, usize::from(fragment.size))
    }

    /// Reconciles a cumulative acknowledgement.
    ///
    /// `seq` must land exactly on an outstanding fragment boundary; the
    /// matched fragments are retired from the oldest end, fully covered
    /// messages release their buffer records, and `seq` becomes the new
    /// send base. An ACK for the current base is a no-op.
    pub fn handle_ack(&mut self, seq: u16) -> Result<AckSummary, WtpError> {
        let rel_target = seq.wrapping_sub(self.seq_num);
        let rel_horizon = self
            .msg_begin_seq
            .wrapping_add(self.msg_fragmented)
            .wrapping_sub(self.seq_num);
        if rel_target > rel_horizon {
            return Err(WtpError::Invalid);
        }

        let mut summary = AckSummary::default();
        if rel_target == 0 {
            return Ok(summary);
        }

        let mut n_fragments = 0;
        let mut matched = false;
        for fragment in self.fragments.iter() {
            let rel_end = fragment.end_seq().wrapping_sub(self.seq_num);
            if rel_end > rel_target {
                break;
            }
            n_fragments += 1;
            if rel_end == rel_target {
                matched = true;
                break;
            }
        }
        if !matched {
            return Err(WtpError::NotAcked);
        }

        for _ in 0..n_fragments {
            let fragment = self.fragments.pop()?;
            summary.freed_seqs.push(fragment.seq_num);

            if let Some(sent) = self.unacked.front().copied() {
                let rel_msg_end = sent.end_seq.wrapping_sub(self.seq_num);
                let rel_frag_end = fragment.end_seq().wrapping_sub(self.seq_num);
                if rel_msg_end <= rel_frag_end {
                    self.unacked.pop()?;
                    self.msg_buf.free(2 + usize::from(sent.size))?;
                    summary.n_sent_msgs += 1;
                }
            }
        }

        self.seq_num = seq;
        Ok(summary)
    }

    /// Flags the fragment starting at `seq_num` for retransmission.
    /// Returns false when the fragment has already been acknowledged.
    pub fn mark_need_send(&mut self, seq_num: u16) -> bool {
        match self.fragments.iter_mut().find(|f| f.seq_num == seq_num) {
            Some(fragment) => {
                fragment.need_send = true;
                true
            }
            None => false,
        }
    }

    /// Takes the oldest fragment flagged for retransmission, clearing the
    /// flag.
    pub fn take_need_send(&mut self) -> Option<TxFragment> {
        self.fragments.iter_mut().find(|f| f.need_send).map(|f| {
            f.need_send = false;
            *f
        })
    }

    /// Consumes one READ worth of the announced schedule and returns the
    /// size the READ buffer is capped to. Falls back to the negotiated
    /// size when no schedule is pending.
    pub fn next_read_size(&mut self) -> u8 {
        match self.read_infos.front_mut() {
            Some(info) => {
                let size = info.size;
                info.n_reads -= 1;
                if info.n_reads == 0 {
                    let _ = self.read_infos.pop();
                }
                size
            }
            None => self.read_size,
        }
    }
}
