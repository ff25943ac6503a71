//! CRC-32 Engine
//!
//! Table driven CRC-32 using the reflected polynomial 0xEDB88320.
//! The update functions apply no initial or final XOR.  Callers seed the
//! running value with `SEED` and close it out with `finish`, which is how both
//! the header and payload checksums of a CAR archive are formed.

use std::io::{Read,Write};
use crate::DYNERR;

pub const POLYNOMIAL: u32 = 0xEDB88320;
/// starting value of every running CRC, also the final XOR mask
pub const SEED: u32 = 0xFFFFFFFF;

/// Build the 256 entry lookup table, 8 shift-and-conditional-xor rounds per byte value.
pub const fn build_table() -> [u32;256] {
    let mut table = [0u32;256];
    let mut i = 0;
    while i < 256 {
        let mut value = i as u32;
        let mut j = 0;
        while j < 8 {
            if value & 1 != 0 {
                value = (value >> 1) ^ POLYNOMIAL;
            } else {
                value >>= 1;
            }
            j += 1;
        }
        table[i] = value;
        i += 1;
    }
    table
}

/// Process-wide table, computed at compile time and never mutated.
static TABLE: [u32;256] = build_table();

/// Fold one byte into a running CRC
pub fn update_byte(crc: u32,c: u8) -> u32 {
    (crc >> 8) ^ TABLE[((crc ^ c as u32) & 0xff) as usize]
}

/// Fold a buffer into a running CRC
pub fn update_block(crc: u32,buf: &[u8]) -> u32 {
    buf.iter().fold(crc,|acc,c| update_byte(acc,*c))
}

/// Apply the final complement
pub fn finish(crc: u32) -> u32 {
    crc ^ SEED
}

/// Seeded and finished CRC of a whole buffer
pub fn checksum(buf: &[u8]) -> u32 {
    finish(update_block(SEED,buf))
}

/// Copy exactly `count` bytes from `src` to `dst`, returning the finished CRC of the bytes copied.
/// Running out of input before `count` bytes is an error.
pub fn copy_with_crc<R: Read,W: Write + ?Sized>(src: &mut R,dst: &mut W,count: u64) -> Result<u32,DYNERR> {
    let mut buf = [0u8;4096];
    let mut remaining = count;
    let mut crc = SEED;
    while remaining > 0 {
        let n = usize::min(buf.len(),remaining as usize);
        src.read_exact(&mut buf[0..n])?;
        dst.write_all(&buf[0..n])?;
        crc = update_block(crc,&buf[0..n]);
        remaining -= n as u64;
    }
    Ok(finish(crc))
}

/// Copy `src` to `dst` until end of input, returning (bytes copied, finished CRC)
pub fn copy_to_end_with_crc<R: Read,W: Write + ?Sized>(src: &mut R,dst: &mut W) -> Result<(u64,u32),DYNERR> {
    let mut buf = [0u8;4096];
    let mut total: u64 = 0;
    let mut crc = SEED;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind()==std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Box::new(e))
        };
        dst.write_all(&buf[0..n])?;
        crc = update_block(crc,&buf[0..n]);
        total += n as u64;
    }
    Ok((total,finish(crc)))
}

#[test]
fn table_entries() {
    let table = build_table();
    assert_eq!(table[0],0);
    assert_eq!(table[1],0x77073096);
    assert_eq!(table[255],0x2D02EF8D);
}

#[test]
fn check_value() {
    // the standard CRC-32 check value
    assert_eq!(checksum("123456789".as_bytes()),0xCBF43926);
    assert_eq!(checksum(&[]),0);
}

#[test]
fn byte_and_block_agree() {
    let data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let mut crc = SEED;
    for c in data {
        crc = update_byte(crc,*c);
    }
    assert_eq!(crc,update_block(SEED,data));
    // running value can be split at any point
    let split = update_block(update_block(SEED,&data[0..10]),&data[10..]);
    assert_eq!(finish(split),checksum(data));
}

#[test]
fn copies_accumulate_crc() {
    let data = vec![7u8;10000];
    let mut out = Vec::new();
    let crc = copy_with_crc(&mut data.as_slice(),&mut out,10000).expect("copy failed");
    assert_eq!(crc,checksum(&data));
    assert_eq!(out,data);
    let mut out = Vec::new();
    let (n,crc) = copy_to_end_with_crc(&mut data.as_slice(),&mut out).expect("copy failed");
    assert_eq!(n,10000);
    assert_eq!(crc,checksum(&data));
    assert!(copy_with_crc(&mut data.as_slice(),&mut Vec::new(),10001).is_err());
}
