//! Bit-packed token groups for the LZSS stream.
//!
//! Tokens are gathered in groups of up to 8 behind a flag byte.  Flag bits are
//! assigned starting from the least significant bit; a set bit marks a literal
//! byte, a clear bit marks a 2 byte (position,length) pair:
//! * byte 0: length code in the high nibble, upper 4 bits of the position in the low nibble
//! * byte 1: lower 8 bits of the position

use std::io::{Read,Write};

/// Collects tokens and writes them out a group at a time.
/// When a size limit is given, output is abandoned as soon as a flush would
/// bring the compressed size to the limit or past it.
pub struct TokenWriter {
    data: [u8;17],
    offset: usize,
    mask: u16,
    compressed_size: u64,
    limit: Option<u64>
}

impl TokenWriter {
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            data: [0;17],
            offset: 1,
            mask: 1,
            compressed_size: 0,
            limit
        }
    }
    /// bytes counted against the limit so far
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }
    /// Buffer a literal.  Returns false if compression has been abandoned.
    pub fn output_char<W: Write + ?Sized>(&mut self,c: u8,writer: &mut W) -> std::io::Result<bool> {
        self.data[self.offset] = c;
        self.offset += 1;
        self.data[0] |= self.mask as u8;
        self.next_token(writer)
    }
    /// Buffer a pair, `length` is the already reduced 4 bit length code.
    /// Returns false if compression has been abandoned.
    pub fn output_pair<W: Write + ?Sized>(&mut self,position: usize,length: usize,writer: &mut W) -> std::io::Result<bool> {
        self.data[self.offset] = ((length << 4) as u8) | ((position >> 8) & 0x0f) as u8;
        self.data[self.offset+1] = (position & 0xff) as u8;
        self.offset += 2;
        self.next_token(writer)
    }
    fn next_token<W: Write + ?Sized>(&mut self,writer: &mut W) -> std::io::Result<bool> {
        self.mask <<= 1;
        if self.mask == 0x100 {
            return self.flush(writer);
        }
        Ok(true)
    }
    /// Write the flag byte and buffered tokens, if any.
    /// Returns false if compression has been abandoned.
    pub fn flush<W: Write + ?Sized>(&mut self,writer: &mut W) -> std::io::Result<bool> {
        if self.offset == 1 {
            return Ok(true);
        }
        self.compressed_size += self.offset as u64;
        if let Some(limit) = self.limit {
            if self.compressed_size >= limit {
                log::debug!("token output reached {} bytes, abandoning",self.compressed_size);
                return Ok(false);
            }
        }
        writer.write_all(&self.data[0..self.offset])?;
        log::trace!("flushed group with flags {:08b}",self.data[0]);
        self.data[0] = 0;
        self.offset = 1;
        self.mask = 1;
        Ok(true)
    }
}

/// Hands out flag bits, reading a new flag byte each time 8 have been used.
pub struct FlagReader {
    flags: u8,
    mask: u16
}

impl FlagReader {
    /// The first flag byte is read on the first call to `input_bit`.
    pub fn new() -> Self {
        Self {
            flags: 0,
            mask: 0x100
        }
    }
    /// true for a literal, false for a pair
    pub fn input_bit<R: Read + ?Sized>(&mut self,reader: &mut R) -> std::io::Result<bool> {
        if self.mask == 0x100 {
            self.flags = read_byte(reader)?;
            self.mask = 1;
        }
        let ans = self.flags & self.mask as u8 != 0;
        self.mask <<= 1;
        Ok(ans)
    }
}

pub fn read_byte<R: Read + ?Sized>(reader: &mut R) -> std::io::Result<u8> {
    let mut by: [u8;1] = [0];
    reader.read_exact(&mut by)?;
    Ok(by[0])
}

#[test]
fn groups_and_flags() {
    let mut out = Vec::new();
    let mut tokens = TokenWriter::new(None);
    tokens.output_char(b'A',&mut out).unwrap();
    tokens.output_pair(0x123,0xf,&mut out).unwrap();
    tokens.output_char(b'B',&mut out).unwrap();
    // nothing written until the group is full or flushed
    assert!(out.is_empty());
    tokens.flush(&mut out).unwrap();
    assert_eq!(out,hex::decode("0541F12342").unwrap());
    assert_eq!(tokens.compressed_size(),5);
    // flushing an empty group does nothing
    tokens.flush(&mut out).unwrap();
    assert_eq!(out.len(),5);
}

#[test]
fn full_group_flushes() {
    let mut out = Vec::new();
    let mut tokens = TokenWriter::new(None);
    for c in 0..8 {
        tokens.output_char(c,&mut out).unwrap();
    }
    assert_eq!(out,hex::decode("FF0001020304050607").unwrap());
}

#[test]
fn abandons_at_limit() {
    let mut out = Vec::new();
    let mut tokens = TokenWriter::new(Some(12));
    for c in 0..7 {
        assert!(tokens.output_char(c,&mut out).unwrap());
    }
    // 9 bytes are under the limit
    assert!(tokens.output_char(7,&mut out).unwrap());
    assert_eq!(out.len(),9);
    tokens.output_char(8,&mut out).unwrap();
    tokens.output_char(9,&mut out).unwrap();
    // 9 + 3 reaches the limit
    assert!(!tokens.flush(&mut out).unwrap());
    assert_eq!(out.len(),9);
}

#[test]
fn reads_flag_bits() {
    let stream = hex::decode("05FF").unwrap();
    let mut reader = stream.as_slice();
    let mut flags = FlagReader::new();
    let bits: Vec<bool> = (0..8).map(|_| flags.input_bit(&mut reader).unwrap()).collect();
    assert_eq!(bits,vec![true,false,true,false,false,false,false,false]);
    assert!(flags.input_bit(&mut reader).unwrap());
    assert!(reader.is_empty());
    let mut flags = FlagReader::new();
    assert!(flags.input_bit(&mut reader).is_err());
}
