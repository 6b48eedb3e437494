use crate::buf::ByteBuf;
use crate::error::WtpError;

/// The transport-level packet type. Numeric values are wire-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Sentinel terminating a batch of packets.
    End = 0x00,
    Open = 0x01,
    Close = 0x02,
    Ack = 0x03,
    BeginMsg = 0x04,
    ContMsg = 0x05,
    ReqUplink = 0x06,
    SetParam = 0x07,
}

impl PacketType {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(PacketType::End),
            0x01 => Some(PacketType::Open),
            0x02 => Some(PacketType::Close),
            0x03 => Some(PacketType::Ack),
            0x04 => Some(PacketType::BeginMsg),
            0x05 => Some(PacketType::ContMsg),
            0x06 => Some(PacketType::ReqUplink),
            0x07 => Some(PacketType::SetParam),
            _ => None,
        }
    }
}

/// SET_PARAM code for a `u16` window size update.
pub const PARAM_WINDOW_SIZE: u8 = 0x00;
/// SET_PARAM code for a `u8` READ OpSpec size update.
pub const PARAM_READ_SIZE: u8 = 0x01;

/// Wire overhead of a message-opening data packet:
/// type + msg_size + seq_num + payload_size.
pub const BEGIN_MSG_HEADER: usize = 6;
/// Wire overhead of a continuation data packet: type + seq_num + payload_size.
pub const CONT_MSG_HEADER: usize = 4;
/// Data packet payloads carry their length in one byte.
pub const MAX_PAYLOAD: usize = 255;

/// XOR of every byte in `bytes`. Trails every packet on the wire.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// A negotiated parameter carried by a SET_PARAM packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    WindowSize(u16),
    ReadSize(u8),
}

/// A decoded WTP packet.
///
/// On the wire a packet is `[type][fields][xor_checksum]`; multibyte fields
/// are little-endian and the checksum covers everything from the type byte
/// through the last payload byte. A READ or BLOCKWRITE buffer holds a
/// sequence of such records terminated by an `End` byte; bytes after the
/// terminator are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Open { reliable: bool },
    Close,
    /// Cumulative acknowledgement up to (excluding) `seq_num`.
    Ack { seq_num: u16 },
    /// Opens a message of `msg_size` bytes and carries its first fragment.
    BeginMsg {
        msg_size: u16,
        seq_num: u16,
        payload: Vec<u8>,
    },
    /// Carries a continuation fragment of an already-opened message.
    ContMsg { seq_num: u16, payload: Vec<u8> },
    /// Asks the reader to schedule `n_reads` READ OpSpecs of `read_size` bytes.
    ReqUplink { n_reads: u8, read_size: u8 },
    SetParam(Param),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Open { .. } => PacketType::Open,
            Packet::Close => PacketType::Close,
            Packet::Ack { .. } => PacketType::Ack,
            Packet::BeginMsg { .. } => PacketType::BeginMsg,
            Packet::ContMsg { .. } => PacketType::ContMsg,
            Packet::ReqUplink { .. } => PacketType::ReqUplink,
            Packet::SetParam(_) => PacketType::SetParam,
        }
    }

    /// Serializes the packet, checksum included, into `buf`.
    pub fn encode(&self, buf: &mut ByteBuf) -> Result<(), WtpError> {
        let begin = buf.pos_w();
        buf.write_u8(self.packet_type() as u8)?;
        match self {
            Packet::Open { reliable } => buf.write_u8(u8::from(*reliable))?,
            Packet::Close => {}
            Packet::Ack { seq_num } => buf.write_u16(*seq_num)?,
            Packet::BeginMsg {
                msg_size,
                seq_num,
                payload,
            } => {
                if payload.len() > MAX_PAYLOAD {
                    return Err(WtpError::Invalid);
                }
                buf.write_u16(*msg_size)?;
                buf.write_u16(*seq_num)?;
                buf.write_u8(payload.len() as u8)?;
                buf.write(payload)?;
            }
            Packet::ContMsg { seq_num, payload } => {
                if payload.len() > MAX_PAYLOAD {
                    return Err(WtpError::Invalid);
                }
                buf.write_u16(*seq_num)?;
                buf.write_u8(payload.len() as u8)?;
                buf.write(payload)?;
            }
            Packet::ReqUplink { n_reads, read_size } => {
                buf.write_u8(*n_reads)?;
                buf.write_u8(*read_size)?;
            }
            Packet::SetParam(param) => match param {
                Param::WindowSize(window) => {
                    buf.write_u8(PARAM_WINDOW_SIZE)?;
                    buf.write_u16(*window)?;
                }
                Param::ReadSize(size) => {
                    buf.write_u8(PARAM_READ_SIZE)?;
                    buf.write_u8(*size)?;
                }
            },
        }
        let checksum = xor_checksum(&buf.as_bytes()[begin..buf.pos_w()]);
        buf.write_u8(checksum)
    }

    /// Decodes the next packet from `buf`.
    ///
    /// Returns `None` on the `End` terminator or when the buffer is
    /// exhausted. A checksum mismatch fails with `BadChecksum` after the
    /// packet fields have been consumed; an unknown type byte fails with
    /// `UnsupportedOp`.
    pub fn decode_next(buf: &mut ByteBuf) -> Result<Option<Packet>, WtpError> {
        if buf.is_drained() {
            return Ok(None);
        }
        let begin = buf.pos_r();
        let raw = buf.read_u8()?;
        let Some(packet_type) = PacketType::from_wire(raw) else {
            return Err(WtpError::UnsupportedOp);
        };
        let packet = match packet_type {
            PacketType::End => return Ok(None),
            PacketType::Open => Packet::Open {
                reliable: buf.read_u8()? != 0,
            },
            PacketType::Close => Packet::Close,
            PacketType::Ack => Packet::Ack {
                seq_num: buf.read_u16()?,
            },
            PacketType::BeginMsg => {
                let msg_size = buf.read_u16()?;
                let seq_num = buf.read_u16()?;
                let payload_size = buf.read_u8()? as usize;
                Packet::BeginMsg {
                    msg_size,
                    seq_num,
                    payload: buf.read_slice(payload_size)?.to_vec(),
                }
            }
            PacketType::ContMsg => {
                let seq_num = buf.read_u16()?;
                let payload_size = buf.read_u8()? as usize;
                Packet::ContMsg {
                    seq_num,
                    payload: buf.read_slice(payload_size)?.to_vec(),
                }
            }
            PacketType::ReqUplink => Packet::ReqUplink {
                n_reads: buf.read_u8()?,
                read_size: buf.read_u8()?,
            },
            PacketType::SetParam => match buf.read_u8()? {
                PARAM_WINDOW_SIZE => Packet::SetParam(Param::WindowSize(buf.read_u16()?)),
                PARAM_READ_SIZE => Packet::SetParam(Param::ReadSize(buf.read_u8()?)),
                _ => return Err(WtpError::Invalid),
            },
        };
        let calculated = xor_checksum(&buf.as_bytes()[begin..buf.pos_r()]);
        let received = buf.read_u8()?;
        if received != calculated {
            return Err(WtpError::BadChecksum);
        }
        Ok(Some(packet))
    }
}
