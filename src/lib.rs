//! # wisp-wtp
//!
//! A reliable, ordered, message-framed duplex channel over the asymmetric
//! WISP RFID air interface.
//!
//! The physical layer offers only reader-driven primitives: the reader
//! polls the tag, the tag answers with a fixed-size READ payload (uplink),
//! and the reader can push a BLOCKWRITE buffer to the tag (downlink). Small
//! control packets additionally ride in the tail of the EPC field the tag
//! advertises on every inventory round. On top of that, this crate provides
//! a sliding-window transport with fragmentation, retransmission and
//! in-order message delivery.
//!
//! ## Architecture
//!
//! - **Endpoint** ([`Endpoint`]): link state machine, packet codec, event
//!   dispatch, and the READ/BLOCKWRITE/EPC marshalling hooks.
//! - **Transmit control** ([`tx::TxControl`]): message queue, fragmentation
//!   against the negotiated READ size, send window, ACK accounting.
//! - **Receive control** ([`rx::RxControl`]): in-window fragment buffer,
//!   message boundary reconstruction, in-order delivery.
//! - **Primitives**: cursor buffer ([`ByteBuf`]), bounded FIFO
//!   ([`FixedQueue`]), tick-driven timers ([`TimerWheel`]).
//!
//! Everything is single-threaded and run-to-completion: handlers never
//! suspend, and callbacks fire in FIFO order from the dispatching hook.

pub mod bridge;
pub mod buf;
pub mod endpoint;
pub mod error;
pub mod packet;
pub mod queue;
pub mod rx;
pub mod timer;
pub mod tx;

pub use bridge::UserContext;
pub use buf::ByteBuf;
pub use endpoint::{
    Config, Endpoint, Event, EventCallback, LinkState, RecvCallback, SendCallback,
};
pub use error::{WtpError, WtpStatus};
pub use packet::{Packet, PacketType, Param, xor_checksum};
pub use queue::FixedQueue;
pub use timer::TimerWheel;
