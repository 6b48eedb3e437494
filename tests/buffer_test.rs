use wisp_wtp::{ByteBuf, WtpError};

#[test]
fn read_write_round_trip() {
    let mut buf = ByteBuf::new(16);
    buf.write(&[1, 2, 3]).unwrap();
    buf.write_u16(0x1234).unwrap();
    buf.write_u8(0xAA).unwrap();

    let mut out = [0u8; 3];
    buf.read(&mut out).unwrap();
    assert_eq!(out, [1, 2, 3]);
    assert_eq!(buf.read_u16().unwrap(), 0x1234);
    assert_eq!(buf.read_u8().unwrap(), 0xAA);
    assert!(buf.is_drained());
}

#[test]
fn integers_are_little_endian() {
    let mut buf = ByteBuf::new(4);
    buf.write_u16(0x0102).unwrap();
    assert_eq!(&buf.as_bytes()[..2], &[0x02, 0x01]);
}

#[test]
fn read_past_capacity_is_out_of_range() {
    let mut buf = ByteBuf::from_slice(&[1, 2]);
    let mut out = [0u8; 3];
    assert_eq!(buf.read(&mut out), Err(WtpError::OutOfRange));
    // The failed read must not move the cursor.
    assert_eq!(buf.read_u8().unwrap(), 1);
}

#[test]
fn write_past_capacity_is_out_of_range() {
    let mut buf = ByteBuf::new(2);
    buf.write_u8(1).unwrap();
    assert_eq!(buf.write(&[2, 3]), Err(WtpError::OutOfRange));
    buf.write_u8(2).unwrap();
    assert_eq!(buf.write_u8(3), Err(WtpError::OutOfRange));
}

#[test]
fn alloc_advances_and_returns_offsets() {
    let mut buf = ByteBuf::new(16);
    assert_eq!(buf.alloc(4).unwrap(), 0);
    assert_eq!(buf.alloc(4).unwrap(), 4);
    assert_eq!(buf.pos_w(), 8);
}

#[test]
fn alloc_wraps_when_tail_is_short() {
    let mut buf = ByteBuf::new(10);
    buf.alloc(6).unwrap();
    buf.free(6).unwrap();
    // 4 bytes of tail left, the request wraps to offset 0.
    assert_eq!(buf.alloc(6).unwrap(), 0);
}

#[test]
fn alloc_refuses_to_overrun_live_data() {
    let mut buf = ByteBuf::new(10);
    buf.alloc(6).unwrap();
    assert_eq!(buf.alloc(6), Err(WtpError::NoMemory));
    // Freeing the first region makes room again.
    buf.free(6).unwrap();
    assert!(buf.alloc(6).is_ok());
}

#[test]
fn free_follows_wrapped_allocations() {
    let mut buf = ByteBuf::new(10);
    buf.alloc(6).unwrap();
    buf.free(6).unwrap();
    let wrapped = buf.alloc(6).unwrap();
    assert_eq!(wrapped, 0);
    // The free skips the wasted tail exactly as the alloc did.
    buf.free(6).unwrap();
    assert_eq!(buf.alloc(6).unwrap(), 0);
}

#[test]
fn alloc_larger_than_capacity_fails() {
    let mut buf = ByteBuf::new(8);
    assert_eq!(buf.alloc(9), Err(WtpError::NoMemory));
}

#[test]
fn reset_zeroes_both_cursors() {
    let mut buf = ByteBuf::new(8);
    buf.write(&[1, 2, 3]).unwrap();
    buf.read_u8().unwrap();
    buf.reset();
    assert_eq!(buf.pos_r(), 0);
    assert_eq!(buf.pos_w(), 0);
    assert_eq!(buf.remaining(), 0);
}

#[test]
fn compact_moves_unread_bytes_to_front() {
    let mut buf = ByteBuf::new(8);
    buf.write(&[1, 2, 3, 4, 5]).unwrap();
    let mut out = [0u8; 3];
    buf.read(&mut out).unwrap();
    buf.compact();
    assert_eq!(buf.pos_r(), 0);
    assert_eq!(buf.unread(), &[4, 5]);
    // The freed room is writable again.
    buf.write(&[6, 7, 8, 9, 10, 11]).unwrap();
    assert_eq!(buf.unread(), &[4, 5, 6, 7, 8, 9, 10, 11]);
}

#[test]
fn read_slice_borrows_and_advances() {
    let mut buf = ByteBuf::from_slice(b"abcdef");
    assert_eq!(buf.read_slice(3).unwrap(), b"abc");
    assert_eq!(buf.read_slice(3).unwrap(), b"def");
    assert!(buf.read_slice(1).is_err());
}

#[test]
fn peek_does_not_advance() {
    let mut buf = ByteBuf::from_slice(&[7, 8]);
    assert_eq!(buf.peek_u8().unwrap(), 7);
    assert_eq!(buf.peek_u8().unwrap(), 7);
    buf.skip(1).unwrap();
    assert_eq!(buf.peek_u8().unwrap(), 8);
}
