use tracing::{debug, warn};

use crate::buf::ByteBuf;
use crate::error::{WtpError, WtpStatus};
use crate::packet::{Packet, PacketType, Param};
use crate::queue::FixedQueue;
use crate::rx::RxControl;
use crate::timer::TimerWheel;
use crate::tx::TxControl;

/// State of one sublink (uplink or downlink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Opening,
    Opened,
    Closing,
}

/// Coarse-grained connection transitions exposed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Event {
    /// Both sublinks reached OPENED.
    Open = 0,
    /// The peer closed the downlink while the uplink is still open.
    HalfClose = 1,
    /// Both sublinks reached CLOSED.
    Close = 2,
}

const N_EVENTS: usize = 3;

/// The EPC buffer is rewritten every this many inventory rounds.
const EPC_REFRESH_INTERVAL: u32 = 4;

pub type SendCallback = Box<dyn FnOnce(WtpStatus)>;
pub type RecvCallback = Box<dyn FnOnce(WtpStatus, &[u8])>;
pub type EventCallback = Box<dyn FnMut(WtpStatus)>;

/// Endpoint sizing and protocol knobs. All buffers are owned by the
/// endpoint and sized from here.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Sliding window, in sequence numbers, for both directions.
    pub window_size: u16,
    /// Retransmission timeout in ticks.
    pub timeout: u16,
    /// Transmit buffer budget; a quarter stages control packets, the rest
    /// holds message data.
    pub tx_buf_size: usize,
    /// Receive buffer budget, split between delivery buffer and fragment
    /// arena.
    pub rx_buf_size: usize,
    /// Concurrent outbound messages (send completions outstanding).
    pub n_send: usize,
    /// Queued receive callbacks.
    pub n_recv: usize,
    /// Bytes of the EPC field available to the endpoint.
    pub epc_size: usize,
    /// Initial READ OpSpec payload size.
    pub read_size: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: 64,
            timeout: 10,
            tx_buf_size: 200,
            rx_buf_size: 200,
            n_send: 5,
            n_recv: 5,
            epc_size: 10,
            read_size: 24,
        }
    }
}

/// A WTP endpoint: the tag side of a reliable, ordered, message-framed
/// duplex channel over the reader-driven RFID air interface.
///
/// Uplink data travels in READ responses, downlink data arrives in
/// BLOCKWRITE buffers, and small control packets ride in the tail of the
/// EPC field advertised on every inventory round. The endpoint never
/// initiates an exchange; the reader polls, and the hooks below load or
/// consume the staged bytes.
pub struct Endpoint {
    downlink_state: LinkState,
    uplink_state: LinkState,
    downlink_reliable: bool,
    epc_buf: ByteBuf,
    read_buf: ByteBuf,
    inventory_counter: u32,
    tx: TxControl,
    rx: RxControl,
    timers: TimerWheel<u16>,
    send_cbs: FixedQueue<SendCallback>,
    recv_cbs: FixedQueue<RecvCallback>,
    event_cbs: [Option<EventCallback>; N_EVENTS],
}

impl Endpoint {
    pub fn new(config: Config) -> Self {
        let tx_unit = config.tx_buf_size / 4;
        let rx_unit = config.rx_buf_size / 2;
        let n_fragments = config.n_send * 3;
        Self {
            downlink_state: LinkState::Closed,
            uplink_state: LinkState::Closed,
            downlink_reliable: false,
            epc_buf: ByteBuf::new(config.epc_size),
            read_buf: ByteBuf::new(256),
            inventory_counter: 0,
            tx: TxControl::new(
                config.window_size,
                config.timeout,
                config.read_size,
                tx_unit,
                tx_unit * 3,
                n_fragments,
                config.n_send,
            ),
            rx: RxControl::new(config.window_size, rx_unit, rx_unit, config.n_recv),
            timers: TimerWheel::new(n_fragments),
            send_cbs: FixedQueue::new(config.n_send),
            recv_cbs: FixedQueue::new(config.n_recv),
            event_cbs: [None, None, None],
        }
    }

    pub fn uplink_state(&self) -> LinkState {
        self.uplink_state
    }

    pub fn downlink_state(&self) -> LinkState {
        self.downlink_state
    }

    pub fn downlink_reliable(&self) -> bool {
        self.downlink_reliable
    }

    /// Acknowledged send sequence number.
    pub fn tx_seq(&self) -> u16 {
        self.tx.seq_num()
    }

    /// Next expected receive sequence number.
    pub fn rx_seq(&self) -> u16 {
        self.rx.seq_num()
    }

    /// Starts opening the uplink by staging an OPEN packet for the next
    /// EPC round. The peer's ACK completes the transition.
    pub fn connect(&mut self) -> Result<(), WtpError> {
        if self.uplink_state != LinkState::Closed {
            return Err(WtpError::Already);
        }
        self.uplink_state = LinkState::Opening;
        debug!("uplink opening");
        self.tx.stage_packet(&Packet::Open { reliable: false })
    }

    /// Stages a CLOSE packet. Pending ACKs are still waited for; the close
    /// completes when the peer acknowledges.
    pub fn close(&mut self) -> Result<(), WtpError> {
        if self.uplink_state == LinkState::Closed && self.downlink_state == LinkState::Closed {
            return Err(WtpError::Already);
        }
        self.tx.stage_packet(&Packet::Close)?;
        if matches!(self.uplink_state, LinkState::Opening | LinkState::Opened) {
            self.uplink_state = LinkState::Closing;
            debug!("uplink closing");
        }
        Ok(())
    }

    /// Queues `data` for transmission as one message. `cb` fires with the
    /// completion status once the whole message is acknowledged; completions
    /// fire in `send` order.
    pub fn send(&mut self, data: &[u8], cb: SendCallback) -> Result<(), WtpError> {
        if self.send_cbs.is_full() {
            return Err(WtpError::NoMemory);
        }
        let read_info = self.tx.add_msg(data)?;
        self.tx.stage_packet(&Packet::ReqUplink {
            n_reads: read_info.n_reads,
            read_size: read_info.size,
        })?;
        self.send_cbs.push(cb)
    }

    /// Queues a callback for the next complete inbound message. Callbacks
    /// fire in the order messages were sent by the peer.
    pub fn recv(&mut self, cb: RecvCallback) -> Result<(), WtpError> {
        self.recv_cbs.push(cb)
    }

    /// Registers the callback fired on `event` transitions.
    pub fn on_event(&mut self, event: Event, cb: EventCallback) {
        self.event_cbs[event as usize] = Some(cb);
    }

    fn fire_event(&mut self, event: Event, status: WtpStatus) {
        if let Some(cb) = self.event_cbs[event as usize].as_mut() {
            cb(status);
        }
    }

    /// Parses one BLOCKWRITE buffer and dispatches every packet in it.
    ///
    /// Parsing stops at the END terminator. The first failing packet
    /// (bad checksum, unknown type, protocol violation) aborts the batch
    /// and surfaces its error.
    pub fn handle_blockwrite(&mut self, data: &[u8]) -> Result<(), WtpError> {
        let mut buf = ByteBuf::from_slice(data);
        while let Some(packet) = Packet::decode_next(&mut buf)? {
            self.handle_packet(packet)?;
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) -> Result<(), WtpError> {
        match packet {
            Packet::Open { reliable } => self.handle_open(reliable),
            Packet::Close => self.handle_close(),
            Packet::Ack { seq_num } => self.handle_ack(seq_num),
            Packet::BeginMsg {
                msg_size,
                seq_num,
                payload,
            } => self.handle_msg(seq_num, &payload, msg_size),
            Packet::ContMsg { seq_num, payload } => self.handle_msg(seq_num, &payload, 0),
            Packet::SetParam(param) => self.handle_set_param(param),
            // The reader never sends an uplink request down to the tag.
            Packet::ReqUplink { .. } => Err(WtpError::UnsupportedOp),
        }
    }

    fn handle_open(&mut self, reliable: bool) -> Result<(), WtpError> {
        let was_opened = self.downlink_state == LinkState::Opened;
        self.downlink_state = LinkState::Opened;
        self.downlink_reliable = reliable;
        debug!(reliable, "downlink opened");
        self.stage_ack()?;
        if !was_opened && self.uplink_state == LinkState::Opened {
            self.fire_event(Event::Open, Ok(()));
        }
        Ok(())
    }

    fn handle_close(&mut self) -> Result<(), WtpError> {
        if self.downlink_state == LinkState::Opened {
            self.downlink_state = LinkState::Closed;
            debug!("downlink closed");
            self.stage_ack()?;
            match self.uplink_state {
                LinkState::Opened => self.fire_event(Event::HalfClose, Ok(())),
                LinkState::Closed => self.fire_event(Event::Close, Ok(())),
                // A close is already in flight; its ACK completes things.
                LinkState::Opening | LinkState::Closing => {}
            }
            return Ok(());
        }
        self.stage_ack()
    }

    fn handle_ack(&mut self, seq_num: u16) -> Result<(), WtpError> {
        match self.uplink_state {
            LinkState::Opening => {
                self.uplink_state = LinkState::Opened;
                debug!("uplink opened");
                if self.downlink_state == LinkState::Opened {
                    self.fire_event(Event::Open, Ok(()));
                }
                Ok(())
            }
            LinkState::Closing => {
                self.uplink_state = LinkState::Closed;
                debug!("uplink closed");
                if self.downlink_state == LinkState::Closed {
                    self.fire_event(Event::Close, Ok(()));
                }
                Ok(())
            }
            LinkState::Opened | LinkState::Closed => {
                let summary = self.tx.handle_ack(seq_num)?;
                for seq in &summary.freed_seqs {
                    self.timers.clear_timeout(seq);
                }
                for _ in 0..summary.n_sent_msgs {
                    if let Ok(cb) = self.send_cbs.pop() {
                        cb(Ok(()));
                    }
                }
                Ok(())
            }
        }
    }

    fn handle_msg(
        &mut self,
        seq_num: u16,
        payload: &[u8],
        new_msg_size: u16,
    ) -> Result<(), WtpError> {
        if self.downlink_state != LinkState::Opened {
            warn!(seq_num, "data packet on a downlink that is not open");
            return Err(WtpError::Invalid);
        }
        // Out-of-window or overlapping data is dropped without aborting the
        // batch; the cumulative ACK below resynchronizes the sender.
        let n_msgs = match self.rx.handle_packet(seq_num, payload, new_msg_size) {
            Ok(n) => n,
            Err(error) => {
                warn!(seq_num, %error, "dropped data packet");
                0
            }
        };
        for _ in 0..n_msgs {
            let cb = self.recv_cbs.pop().ok();
            let message = self.rx.next_message()?;
            if let Some(cb) = cb {
                cb(Ok(()), message);
            }
        }
        self.stage_ack()
    }

    fn handle_set_param(&mut self, param: Param) -> Result<(), WtpError> {
        match param {
            Param::WindowSize(window) => {
                if window == 0 {
                    return Err(WtpError::Invalid);
                }
                debug!(window, "window size updated");
                self.tx.set_window_size(window);
                self.rx.set_window_size(window);
            }
            Param::ReadSize(size) => {
                if size == 0 {
                    return Err(WtpError::Invalid);
                }
                debug!(size, "read size updated");
                self.tx.set_read_size(size);
            }
        }
        Ok(())
    }

    fn stage_ack(&mut self) -> Result<(), WtpError> {
        self.tx.stage_packet(&Packet::Ack {
            seq_num: self.rx.seq_num(),
        })
    }

    /// Loads the next uplink payload. Called after each READ acknowledged
    /// on the air; returns the bytes to serve from READ memory.
    ///
    /// At most one data packet is emitted per READ, preferring a fragment
    /// flagged for retransmission over cutting a fresh one. The selected
    /// fragment's retransmission timer is (re)armed.
    pub fn on_read(&mut self) -> Result<&[u8], WtpError> {
        let read_size = usize::from(self.tx.next_read_size());
        self.read_buf.reset();
        if read_size == 0 {
            return Ok(&[]);
        }

        let avail = (read_size - 1).min(255) as u8;
        let fragment = match self.tx.take_need_send() {
            Some(fragment) => Some(fragment),
            None => self.tx.make_fragment(avail)?,
        };

        if let Some(fragment) = fragment {
            let payload = self.tx.fragment_payload(&fragment)?.to_vec();
            let packet = if fragment.msg_size > 0 {
                Packet::BeginMsg {
                    msg_size: fragment.msg_size,
                    seq_num: fragment.seq_num,
                    payload,
                }
            } else {
                Packet::ContMsg {
                    seq_num: fragment.seq_num,
                    payload,
                }
            };
            packet.encode(&mut self.read_buf)?;
            debug!(
                seq_num = fragment.seq_num,
                size = fragment.size,
                "fragment loaded into read memory"
            );
            self.timers.clear_timeout(&fragment.seq_num);
            self.timers.set_timeout(fragment.seq_num, self.tx.timeout())?;
        }

        if self.read_buf.pos_w() < read_size {
            self.read_buf.write_u8(PacketType::End as u8)?;
        }
        Ok(self.read_buf.unread())
    }

    /// Rewrites the EPC buffer from the staged control packets. Called
    /// before each inventory round; only every fourth round actually
    /// refreshes the field.
    pub fn before_inventory(&mut self) -> Result<(), WtpError> {
        let refresh = self.inventory_counter % EPC_REFRESH_INTERVAL == 0;
        self.inventory_counter += 1;
        if !refresh {
            return Ok(());
        }

        self.epc_buf.reset();
        let pkt_buf = self.tx.pkt_buf_mut();
        while pkt_buf.remaining() > 0 {
            let size = usize::from(pkt_buf.peek_u8()?);
            // Record plus its checksum must fit the remaining EPC space.
            if self.epc_buf.pos_w() + 1 + size + 1 > self.epc_buf.capacity() {
                break;
            }
            pkt_buf.skip(1)?;
            let record = pkt_buf.read_slice(size)?;
            let checksum = crate::packet::xor_checksum(record);
            self.epc_buf.write_u8(size as u8)?;
            self.epc_buf.write(record)?;
            self.epc_buf.write_u8(checksum)?;
        }
        let _ = self.epc_buf.write_u8(PacketType::End as u8);
        if pkt_buf.is_drained() {
            pkt_buf.reset();
        }
        Ok(())
    }

    /// The EPC field contents, as last rewritten by `before_inventory`.
    pub fn epc(&self) -> &[u8] {
        self.epc_buf.as_bytes()
    }

    /// Advances the retransmission time base by one tick. Expired fragments
    /// are flagged for retransmission on the next uplink opportunity.
    pub fn on_tick(&mut self) {
        for seq_num in self.timers.tick() {
            if self.tx.mark_need_send(seq_num) {
                debug!(seq_num, "retransmission timeout");
            }
        }
    }
}
