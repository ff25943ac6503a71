//! CAR member headers
//!
//! Each member of an archive starts with a header:
//! ```text
//! [ file name ][ 0x00 ]
//! [ method:1 ][ original size:4 ][ compressed size:4 ][ original CRC:4 ][ header CRC:4 ]
//! ```
//! Multi-byte fields are little endian.  The header CRC covers the name with its
//! NUL and the 13 bytes from method through original CRC.  A lone 0x00 where a
//! name would start (an empty name) marks the end of the archive.

use std::borrow::Cow;
use std::io::{Read,Write,ErrorKind};
use num_derive::FromPrimitive;
use crate::{crc32,DYNERR};

/// the empty name that ends an archive
pub const END_OF_ARCHIVE: u8 = 0;
/// bytes following the name and its NUL
pub const FIXED_SIZE: usize = 17;

#[derive(FromPrimitive,Clone,Copy,Debug,PartialEq,Eq)]
pub enum Method {
    Stored = 1,
    Lzss = 2
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Stored => "Stored",
            Method::Lzss => "LZSS"
        }
    }
}

#[derive(Clone,Debug,Default,PartialEq)]
pub struct Header {
    /// raw name bytes, without the NUL
    pub name: Vec<u8>,
    /// method byte as found, see `Header::method`
    pub method: u8,
    pub original_size: u32,
    pub compressed_size: u32,
    pub original_crc: u32,
    pub header_crc: u32
}

impl Header {
    pub fn create(name: &[u8],method: Method) -> Self {
        Self {
            name: name.to_vec(),
            method: method as u8,
            ..Default::default()
        }
    }
    /// `None` if the method byte is not one we know
    pub fn method(&self) -> Option<Method> {
        num_traits::FromPrimitive::from_u8(self.method)
    }
    pub fn display_name(&self) -> Cow<'_,str> {
        String::from_utf8_lossy(&self.name)
    }
    fn fixed_fields(&self) -> [u8;13] {
        let mut ans = [0u8;13];
        ans[0] = self.method;
        ans[1..5].copy_from_slice(&u32::to_le_bytes(self.original_size));
        ans[5..9].copy_from_slice(&u32::to_le_bytes(self.compressed_size));
        ans[9..13].copy_from_slice(&u32::to_le_bytes(self.original_crc));
        ans
    }
    /// CRC over the name, its NUL, and the fixed fields
    pub fn compute_crc(&self) -> u32 {
        let mut crc = crc32::update_block(crc32::SEED,&self.name);
        crc = crc32::update_byte(crc,0);
        crc = crc32::update_block(crc,&self.fixed_fields());
        crc32::finish(crc)
    }
    /// Seal the header CRC and serialize
    pub fn to_bytes(&mut self) -> Vec<u8> {
        self.header_crc = self.compute_crc();
        let mut ans = Vec::with_capacity(self.name.len() + 1 + FIXED_SIZE);
        ans.extend_from_slice(&self.name);
        ans.push(0);
        ans.extend_from_slice(&self.fixed_fields());
        ans.extend_from_slice(&u32::to_le_bytes(self.header_crc));
        ans
    }
    /// Seal the header CRC and write the header
    pub fn write<W: Write + ?Sized>(&mut self,writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
    /// Read the next header.  Returns `None` at the end of the archive, which is either
    /// the end marker or the end of the stream where a name would begin.
    /// A name reaching `max_name` bytes, or a header CRC mismatch, is an error.
    pub fn read<R: Read + ?Sized>(reader: &mut R,max_name: usize) -> Result<Option<Self>,DYNERR> {
        let mut name = Vec::new();
        let mut by: [u8;1] = [0];
        loop {
            match reader.read_exact(&mut by) {
                Ok(()) => {},
                Err(e) if e.kind()==ErrorKind::UnexpectedEof && name.is_empty() => {
                    log::debug!("archive ended without an end marker");
                    return Ok(None);
                },
                Err(e) => return Err(Box::new(e))
            }
            if by[0] == 0 {
                break;
            }
            name.push(by[0]);
            if name.len() >= max_name {
                return Err(Box::new(crate::Error::FileNameTooLong));
            }
        }
        if name.is_empty() {
            return Ok(None);
        }
        let mut fixed: [u8;FIXED_SIZE] = [0;FIXED_SIZE];
        reader.read_exact(&mut fixed)?;
        let le = |i: usize| u32::from_le_bytes([fixed[i],fixed[i+1],fixed[i+2],fixed[i+3]]);
        let ans = Self {
            name,
            method: fixed[0],
            original_size: le(1),
            compressed_size: le(5),
            original_crc: le(9),
            header_crc: le(13)
        };
        if ans.compute_crc() != ans.header_crc {
            return Err(Box::new(crate::Error::HeaderChecksum(ans.display_name().to_string())));
        }
        Ok(Some(ans))
    }
}

#[cfg(test)]
fn sample() -> Header {
    let mut ans = Header::create("a.txt".as_bytes(),Method::Lzss);
    ans.original_size = 11;
    ans.compressed_size = 9;
    ans.original_crc = 0x0d4a1185;
    ans
}

#[test]
fn layout() {
    let mut header = sample();
    let bytes = header.to_bytes();
    assert_eq!(bytes.len(),6 + FIXED_SIZE);
    assert_eq!(&bytes[0..6],"a.txt\0".as_bytes());
    assert_eq!(&bytes[6..19],hex::decode("020B0000000900000085114A0D").unwrap());
    assert_eq!(header.header_crc,crc32::checksum(&bytes[0..19]));
    assert_eq!(&bytes[19..23],&u32::to_le_bytes(header.header_crc));
    let read_back = Header::read(&mut bytes.as_slice(),crate::STD_OPTIONS.max_name).unwrap();
    assert_eq!(read_back,Some(header));
}

#[test]
fn any_mutation_fails_crc() {
    let bytes = sample().to_bytes();
    // every byte of the name and fixed fields, except the NUL which would shorten the name
    for i in (0..bytes.len()).filter(|i| *i != 5) {
        let mut corrupt = bytes.clone();
        corrupt[i] ^= 0x40;
        assert!(Header::read(&mut corrupt.as_slice(),128).is_err(),"byte {} not detected",i);
    }
}

#[test]
fn end_of_archive() {
    assert_eq!(Header::read(&mut [0u8].as_slice(),128).unwrap(),None);
    assert_eq!(Header::read(&mut [0u8;0].as_slice(),128).unwrap(),None);
    // truncated fixed fields
    let bytes = sample().to_bytes();
    assert!(Header::read(&mut &bytes[0..10],128).is_err());
    assert!(Header::read(&mut &bytes[0..3],128).is_err());
}

#[test]
fn long_names() {
    let mut header = Header::create(&[b'x';127],Method::Stored);
    let bytes = header.to_bytes();
    assert!(Header::read(&mut bytes.as_slice(),128).unwrap().is_some());
    let mut header = Header::create(&[b'x';128],Method::Stored);
    let bytes = header.to_bytes();
    match Header::read(&mut bytes.as_slice(),128) {
        Err(e) => assert_eq!(e.to_string(),crate::Error::FileNameTooLong.to_string()),
        Ok(_) => panic!("long name was accepted")
    }
}

#[test]
fn methods() {
    let mut header = sample();
    assert_eq!(header.method(),Some(Method::Lzss));
    header.method = 1;
    assert_eq!(header.method(),Some(Method::Stored));
    header.method = 9;
    assert_eq!(header.method(),None);
    assert_eq!(Method::Lzss.name(),"LZSS");
}
