//! LZSS Compression
//!
//! Sliding window compression with a 4096 byte window and one flag bit per token.
//! A token is either a literal byte or a (position,length) pair pointing back
//! into the window.  Positions are absolute window positions (12 bits), lengths
//! are stored less `BREAK_EVEN + 1` in 4 bits.
//!
//! * Matches are found by a binary search tree over the window, see `tools::match_tree`
//! * Tokens are packed in flag-prefixed groups of 8, see `tools::token_buffer`
//! * The CRC-32 of the expanded data is accumulated on the way through
//!
//! Window position 0 is never used as a match position, coding begins at position 1.

use std::io::{Cursor,Read,Write,BufReader};
use crate::tools::ring_buffer::RingBuffer;
use crate::tools::match_tree::MatchTree;
use crate::tools::token_buffer::{TokenWriter,FlagReader,read_byte};
use crate::crc32;
use crate::DYNERR;

// LZSS coding constants

pub const INDEX_BIT_COUNT: usize = 12;
pub const LENGTH_BIT_COUNT: usize = 4;
pub const WIN_SIZE: usize = 1 << INDEX_BIT_COUNT;
const RAW_LOOKAHEAD: usize = 1 << LENGTH_BIT_COUNT;
/// a pair has to cover more than this many bytes to be worth coding
pub const BREAK_EVEN: usize = (1 + INDEX_BIT_COUNT + LENGTH_BIT_COUNT) / 9;
pub const LOOKAHEAD: usize = RAW_LOOKAHEAD + BREAK_EVEN;

/// Options controlling compression
#[derive(Clone)]
pub struct Options {
    /// Abandon compression once the output reaches this many bytes.
    /// The archive manager sets it to the expanded size so that a member
    /// that does not shrink is stored instead.
    pub size_limit: Option<u64>
}

pub const STD_OPTIONS: Options = Options {
    size_limit: None
};

/// Result of a pass through the codec
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct Summary {
    /// bytes consumed
    pub in_size: u64,
    /// bytes produced
    pub out_size: u64,
    /// finished CRC-32 of the expanded data
    pub crc: u32
}

/// Main compression function.
/// `expanded_in` is any `Read`, usually `std::fs::File`, or `&[u8]`.
/// `compressed_out` is any `Write`, typically an archive being built.
/// Returns `None` if the size limit was reached, in which case some groups may
/// already have been written and the caller should discard them.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &Options) -> Result<Option<Summary>,DYNERR>
where R: Read, W: Write + ?Sized {
    let reader = BufReader::new(expanded_in);
    let mut bytes = reader.bytes();
    let mut window = RingBuffer::create(0u8,WIN_SIZE);
    let mut index = MatchTree::create(WIN_SIZE,LOOKAHEAD);
    let mut tokens = TokenWriter::new(opt.size_limit);
    let mut crc = crc32::SEED;
    let mut in_size: u64 = 0;

    // prime the look-ahead
    window.set_pos(1);
    let mut len = 0;
    while len < LOOKAHEAD {
        match bytes.next() {
            Some(Ok(c)) => {
                window.set(len,c);
                crc = crc32::update_byte(crc,c);
                len += 1;
            },
            None => break,
            Some(Err(e)) => return Err(Box::new(e))
        }
    }
    in_size += len as u64;
    index.init(window.get_pos(0));
    let mut match_length = 0;
    let mut match_position = 0;

    log::debug!("entering main LZSS loop with {} bytes of look-ahead",len);
    while len > 0 {
        if match_length > len {
            match_length = len;
        }
        let replace_count = if match_length <= BREAK_EVEN {
            if !tokens.output_char(window.get(0),compressed_out)? {
                return Ok(None);
            }
            1
        } else {
            log::trace!("pair {} {}",match_position,match_length);
            if !tokens.output_pair(match_position,match_length - (BREAK_EVEN + 1),compressed_out)? {
                return Ok(None);
            }
            match_length
        };
        // slide the window, the slot leaving the history is the one the next byte goes into
        for _i in 0..replace_count {
            index.delete(window.get_pos(LOOKAHEAD));
            match bytes.next() {
                Some(Ok(c)) => {
                    crc = crc32::update_byte(crc,c);
                    window.set(LOOKAHEAD,c);
                    in_size += 1;
                },
                None => len -= 1,
                Some(Err(e)) => return Err(Box::new(e))
            }
            window.advance();
            if len > 0 {
                (match_length,match_position) = index.insert(window.get_pos(0),&window);
            }
        }
    }
    if !tokens.flush(compressed_out)? {
        return Ok(None);
    }
    Ok(Some(Summary {
        in_size,
        out_size: tokens.compressed_size(),
        crc: crc32::finish(crc)
    }))
}

/// Main decompression function.
/// Expands until `expanded_size` bytes have been produced.  Running out of input
/// first is an error.  The CRC is returned for checking by the caller.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W, expanded_size: u64) -> Result<Summary,DYNERR>
where R: Read + ?Sized, W: Write + ?Sized {
    let mut window = RingBuffer::create(0u8,WIN_SIZE);
    let mut flags = FlagReader::new();
    let mut crc = crc32::SEED;
    let mut tokens: u64 = 0;
    let mut in_size: u64 = 0;
    let mut out_size: u64 = 0;
    window.set_pos(1);
    while out_size < expanded_size {
        if flags.input_bit(compressed_in)? {
            let c = read_byte(compressed_in)?;
            expanded_out.write_all(&[c])?;
            crc = crc32::update_byte(crc,c);
            window.push(c);
            out_size += 1;
            in_size += 1;
            tokens += 1;
        } else {
            let b0 = read_byte(compressed_in)? as usize;
            let b1 = read_byte(compressed_in)? as usize;
            let match_length = (b0 >> 4) + BREAK_EVEN;
            let match_position = b1 | ((b0 & 0x0f) << 8);
            for i in 0..=match_length {
                let c = window.get_abs(match_position + i);
                expanded_out.write_all(&[c])?;
                crc = crc32::update_byte(crc,c);
                window.push(c);
            }
            out_size += match_length as u64 + 1;
            in_size += 2;
            tokens += 1;
        }
    }
    // one flag byte per group of 8
    in_size += (tokens + 7) / 8;
    expanded_out.flush()?;
    Ok(Summary {
        in_size,
        out_size,
        crc: crc32::finish(crc)
    })
}

/// Convenience function, calls `compress` with a slice returning a Vec,
/// or `None` if the size limit was reached
pub fn compress_slice(slice: &[u8],opt: &Options) -> Result<Option<Vec<u8>>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Vec<u8> = Vec::new();
    match compress(&mut src,&mut ans,opt)? {
        Some(_) => Ok(Some(ans)),
        None => Ok(None)
    }
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8],expanded_size: u64) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Vec<u8> = Vec::new();
    expand(&mut src,&mut ans,expanded_size)?;
    Ok(ans)
}

// *************** TESTS *****************

#[cfg(test)]
fn pseudo_random(n: usize,mut seed: u32) -> Vec<u8> {
    let mut ans = Vec::with_capacity(n);
    for _i in 0..n {
        seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
        ans.push((seed >> 24) as u8);
    }
    ans
}

#[cfg(test)]
fn round_trip(test_data: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let summary = compress(&mut &test_data[..],&mut compressed,&STD_OPTIONS)
        .expect("compression failed").expect("compression abandoned");
    assert_eq!(summary.in_size,test_data.len() as u64);
    assert_eq!(summary.out_size,compressed.len() as u64);
    assert_eq!(summary.crc,crc32::checksum(test_data));
    let mut expanded = Vec::new();
    let check = expand(&mut compressed.as_slice(),&mut expanded,test_data.len() as u64).expect("expansion failed");
    assert_eq!(check.crc,summary.crc);
    assert_eq!(check.in_size,compressed.len() as u64);
    assert_eq!(expanded,test_data.to_vec());
    compressed
}

#[test]
fn constants() {
    assert_eq!(BREAK_EVEN,1);
    assert_eq!(LOOKAHEAD,17);
}

#[test]
fn compression_works() {
    // literal 'a', then a pair at position 1 covering the remaining 3 bytes
    let compressed = compress_slice("aaaa".as_bytes(),&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,Some(hex::decode("01611001").unwrap()));
    // same output size as input, so a limit at the input size abandons
    let opt = Options { size_limit: Some(4) };
    assert_eq!(compress_slice("aaaa".as_bytes(),&opt).expect("compression failed"),None);
}

#[test]
fn expansion_works() {
    let expanded = expand_slice(&hex::decode("01611001").unwrap(),4).expect("expansion failed");
    assert_eq!(expanded,"aaaa".as_bytes().to_vec());
}

#[test]
fn invertibility() {
    round_trip("I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes());
    round_trip("12345123456789123456789\n".as_bytes());
    round_trip(&[]);
    round_trip(&[42]);
}

#[test]
fn empty_input_writes_nothing() {
    let compressed = round_trip(&[]);
    assert!(compressed.is_empty());
    // no flag byte is read when nothing is expected
    assert_eq!(expand_slice(&[],0).expect("expansion failed"),Vec::<u8>::new());
}

#[test]
fn repetitive_data_shrinks() {
    let zeros = vec![0u8;4096];
    let compressed = round_trip(&zeros);
    assert!(compressed.len() < 600);
    let text = "abcdefghij".repeat(1000);
    let compressed = round_trip(text.as_bytes());
    assert!(compressed.len() < text.len() / 4);
}

#[test]
fn wraps_window() {
    // several passes around the window with a mix of literals and pairs
    let mut test_data = Vec::new();
    let noise = pseudo_random(3000,7);
    for i in 0..20 {
        test_data.extend_from_slice(&noise[i*100..i*100+700]);
        test_data.extend_from_slice("the quick brown fox ".as_bytes());
    }
    round_trip(&test_data);
}

#[test]
fn incompressible_data() {
    let noise = pseudo_random(5000,12345);
    let compressed = round_trip(&noise);
    assert!(compressed.len() >= noise.len());
    let opt = Options { size_limit: Some(noise.len() as u64) };
    assert_eq!(compress_slice(&noise,&opt).expect("compression failed"),None);
}

#[test]
fn truncated_input_is_an_error() {
    let text = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(text,&STD_OPTIONS).unwrap().unwrap();
    assert!(expand_slice(&compressed[0..compressed.len()-1],text.len() as u64).is_err());
}
