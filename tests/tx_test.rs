use wisp_wtp::packet::PacketType;
use wisp_wtp::tx::TxControl;
use wisp_wtp::{Packet, WtpError};

fn tx() -> TxControl {
    // window 64, timeout 10 ticks, read size 24, generous buffers
    TxControl::new(64, 10, 24, 64, 192, 15, 5)
}

#[test]
fn begin_end_packet_writes_the_size_byte() {
    let mut tx = tx();
    tx.begin_packet(PacketType::Ack).unwrap();
    tx.pkt_buf_mut().write_u16(0x0105).unwrap();
    tx.end_packet().unwrap();

    // [size][type][payload]: size counts the type byte and payload only.
    assert_eq!(tx.pkt_buf().as_bytes()[0], 3);
    assert_eq!(tx.pkt_buf().as_bytes()[1], PacketType::Ack as u8);
    assert_eq!(&tx.pkt_buf().as_bytes()[2..4], &[0x05, 0x01]);
}

#[test]
fn staged_packet_size_is_one_plus_payload() {
    let mut tx = tx();
    tx.stage_packet(&Packet::Open { reliable: false }).unwrap();
    tx.stage_packet(&Packet::Close).unwrap();
    tx.stage_packet(&Packet::ReqUplink {
        n_reads: 2,
        read_size: 24,
    })
    .unwrap();

    let bytes = tx.pkt_buf().as_bytes();
    // OPEN: 1 type + 1 flag
    assert_eq!(bytes[0], 2);
    // CLOSE: type only
    assert_eq!(bytes[3], 1);
    // REQ_UPLINK: 1 type + 2 fields
    assert_eq!(bytes[5], 3);
    assert_eq!(&bytes[6..9], &[PacketType::ReqUplink as u8, 2, 24]);
}

#[test]
fn add_msg_schedules_reads() {
    let mut tx = tx();
    let info = tx.add_msg(b"hello").unwrap();
    assert_eq!(info.size, 24);
    assert_eq!(info.n_reads, 1);

    let mut tx = TxControl::new(64, 10, 4, 64, 192, 15, 5);
    let info = tx.add_msg(b"ABCDEFG").unwrap();
    assert_eq!(info.size, 4);
    assert_eq!(info.n_reads, 2);
}

#[test]
fn empty_messages_are_invalid() {
    let mut tx = tx();
    assert_eq!(tx.add_msg(&[]), Err(WtpError::Invalid));
}

#[test]
fn single_fragment_carries_the_whole_message() {
    let mut tx = tx();
    tx.add_msg(b"hello").unwrap();

    let fragment = tx.make_fragment(23).unwrap().unwrap();
    assert_eq!(fragment.seq_num, 0);
    assert_eq!(fragment.msg_size, 5);
    assert_eq!(fragment.size, 5);
    assert!(!fragment.need_send);
    assert_eq!(tx.fragment_payload(&fragment).unwrap(), b"hello");

    // Nothing left to cut.
    assert!(tx.make_fragment(23).unwrap().is_none());
}

#[test]
fn header_overhead_shrinks_the_first_fragment() {
    let mut tx = TxControl::new(64, 10, 12, 64, 192, 15, 5);
    tx.add_msg(b"ABCDEFG").unwrap();

    // 11 bytes available: 6 go to the opening header, 5 to payload.
    let first = tx.make_fragment(11).unwrap().unwrap();
    assert_eq!(first.msg_size, 7);
    assert_eq!(first.size, 5);
    assert_eq!(tx.fragment_payload(&first).unwrap(), b"ABCDE");

    // Continuations pay a 4 byte header but only 2 bytes remain.
    let second = tx.make_fragment(11).unwrap().unwrap();
    assert_eq!(second.msg_size, 0);
    assert_eq!(second.seq_num, 5);
    assert_eq!(second.size, 2);
    assert_eq!(tx.fragment_payload(&second).unwrap(), b"FG");
}

#[test]
fn window_caps_outstanding_data() {
    let mut tx = TxControl::new(4, 10, 24, 64, 192, 15, 5);
    tx.add_msg(b"0123456789").unwrap();

    let fragment = tx.make_fragment(23).unwrap().unwrap();
    assert_eq!(fragment.size, 4);
    // The window is exhausted until an ACK slides it.
    assert!(tx.make_fragment(23).unwrap().is_none());

    tx.handle_ack(4).unwrap();
    let next = tx.make_fragment(23).unwrap().unwrap();
    assert_eq!(next.seq_num, 4);
    assert_eq!(next.size, 4);
}

#[test]
fn fragments_cross_message_boundaries_in_order() {
    let mut tx = tx();
    tx.add_msg(b"aa").unwrap();
    tx.add_msg(b"bbb").unwrap();

    let first = tx.make_fragment(23).unwrap().unwrap();
    assert_eq!((first.seq_num, first.msg_size, first.size), (0, 2, 2));
    let second = tx.make_fragment(23).unwrap().unwrap();
    assert_eq!((second.seq_num, second.msg_size, second.size), (2, 3, 3));
    assert_eq!(tx.fragment_payload(&second).unwrap(), b"bbb");
}

#[test]
fn ack_on_fragment_boundary_retires_messages() {
    let mut tx = tx();
    tx.add_msg(b"hello").unwrap();
    tx.make_fragment(23).unwrap().unwrap();

    let summary = tx.handle_ack(5).unwrap();
    assert_eq!(summary.n_sent_msgs, 1);
    assert_eq!(summary.freed_seqs.as_slice(), &[0]);
    assert_eq!(tx.seq_num(), 5);
    assert_eq!(tx.n_fragments(), 0);
}

#[test]
fn cumulative_ack_retires_several_fragments() {
    let mut tx = TxControl::new(64, 10, 12, 64, 192, 15, 5);
    tx.add_msg(b"ABCDEFG").unwrap();
    tx.make_fragment(11).unwrap().unwrap();
    tx.make_fragment(11).unwrap().unwrap();

    let summary = tx.handle_ack(7).unwrap();
    assert_eq!(summary.n_sent_msgs, 1);
    assert_eq!(summary.freed_seqs.as_slice(), &[0, 5]);
    assert_eq!(tx.seq_num(), 7);
}

#[test]
fn ack_beyond_sent_data_is_invalid() {
    let mut tx = tx();
    tx.add_msg(b"hello").unwrap();
    tx.make_fragment(23).unwrap().unwrap();
    assert_eq!(tx.handle_ack(6), Err(WtpError::Invalid));
    assert_eq!(tx.seq_num(), 0);
}

#[test]
fn ack_off_a_fragment_boundary_is_not_acked() {
    let mut tx = tx();
    tx.add_msg(b"hello").unwrap();
    tx.make_fragment(23).unwrap().unwrap();
    assert_eq!(tx.handle_ack(3), Err(WtpError::NotAcked));
    assert_eq!(tx.seq_num(), 0);
    assert_eq!(tx.n_fragments(), 1);
}

#[test]
fn duplicate_ack_is_a_no_op() {
    let mut tx = tx();
    tx.add_msg(b"hello").unwrap();
    tx.make_fragment(23).unwrap().unwrap();
    tx.handle_ack(5).unwrap();

    let summary = tx.handle_ack(5).unwrap();
    assert_eq!(summary.n_sent_msgs, 0);
    assert!(summary.freed_seqs.is_empty());
    assert_eq!(tx.seq_num(), 5);
}

#[test]
fn partial_ack_keeps_the_message_pending() {
    let mut tx = TxControl::new(64, 10, 12, 64, 192, 15, 5);
    tx.add_msg(b"ABCDEFG").unwrap();
    tx.make_fragment(11).unwrap().unwrap();
    tx.make_fragment(11).unwrap().unwrap();

    let summary = tx.handle_ack(5).unwrap();
    assert_eq!(summary.n_sent_msgs, 0);
    assert_eq!(summary.freed_seqs.as_slice(), &[0]);

    let summary = tx.handle_ack(7).unwrap();
    assert_eq!(summary.n_sent_msgs, 1);
    assert_eq!(summary.freed_seqs.as_slice(), &[5]);
}

#[test]
fn need_send_marks_and_takes_oldest_first() {
    let mut tx = TxControl::new(64, 10, 12, 64, 192, 15, 5);
    tx.add_msg(b"ABCDEFG").unwrap();
    let first = tx.make_fragment(11).unwrap().unwrap();
    let second = tx.make_fragment(11).unwrap().unwrap();

    assert!(tx.take_need_send().is_none());
    assert!(tx.mark_need_send(first.seq_num));
    assert!(tx.mark_need_send(second.seq_num));
    // Already-acked fragments cannot be flagged.
    assert!(!tx.mark_need_send(99));

    let resend = tx.take_need_send().unwrap();
    assert_eq!(resend.seq_num, first.seq_num);
    let resend = tx.take_need_send().unwrap();
    assert_eq!(resend.seq_num, second.seq_num);
    assert!(tx.take_need_send().is_none());
}

#[test]
fn message_buffer_is_reusable_across_many_rounds() {
    // Buffer fits two 12-byte records at a time; sustained traffic must
    // cycle it without leaking.
    let mut tx = TxControl::new(64, 10, 24, 64, 28, 15, 5);
    let mut seq = 0u16;
    for round in 0..40u16 {
        let body = [round as u8; 10];
        tx.add_msg(&body).unwrap();
        let fragment = tx.make_fragment(23).unwrap().unwrap();
        assert_eq!(fragment.size, 10);
        assert_eq!(tx.fragment_payload(&fragment).unwrap(), &body);
        seq = seq.wrapping_add(10);
        let summary = tx.handle_ack(seq).unwrap();
        assert_eq!(summary.n_sent_msgs, 1);
    }
}

#[test]
fn read_schedule_is_consumed_read_by_read() {
    let mut tx = TxControl::new(64, 10, 4, 64, 192, 15, 5);
    tx.add_msg(b"ABCDEFG").unwrap();
    // Two reads scheduled at size 4.
    assert_eq!(tx.next_read_size(), 4);
    assert_eq!(tx.next_read_size(), 4);
    // Schedule exhausted: fall back to the negotiated size.
    tx.set_read_size(16);
    assert_eq!(tx.next_read_size(), 16);
}
