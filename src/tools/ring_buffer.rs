//! Ring buffer for the LZSS sliding window
use num_traits::PrimInt;

/// Fixed size circular buffer with a cursor.  All positions wrap modulo the size,
/// so callers can freely add look-ahead offsets to an absolute position.
pub struct RingBuffer<T: PrimInt> {
    buf: Vec<T>,
    pos: usize,
    n: usize
}

impl <T: PrimInt> RingBuffer<T> {
    pub fn create(fill: T,n: usize) -> Self {
        Self {
            buf: vec![fill;n],
            pos: 0,
            n
        }
    }
    /// get absolute position of cursor + offset
    pub fn get_pos(&self,offset: usize) -> usize {
        (self.pos + offset) % self.n
    }
    /// set absolute position of cursor
    pub fn set_pos(&mut self,pos: usize) {
        self.pos = pos % self.n;
    }
    /// get value at absolute position, cursor does not move
    pub fn get_abs(&self,abs: usize) -> T {
        self.buf[abs % self.n]
    }
    /// set value at absolute position, cursor does not move
    pub fn set_abs(&mut self,abs: usize,val: T) {
        self.buf[abs % self.n] = val;
    }
    /// get value at cursor + offset
    pub fn get(&self,offset: usize) -> T {
        self.buf[(self.pos + offset) % self.n]
    }
    /// set value at cursor + offset
    pub fn set(&mut self,offset: usize,val: T) {
        self.buf[(self.pos + offset) % self.n] = val;
    }
    /// advance cursor by 1
    pub fn advance(&mut self) {
        self.pos = (self.pos + 1) % self.n;
    }
    /// set value at cursor, then advance
    pub fn push(&mut self,val: T) {
        self.buf[self.pos] = val;
        self.advance();
    }
}

#[test]
fn offset() {
    let mut ring: RingBuffer<u8> = RingBuffer::create(0,4);
    ring.set_pos(5);
    assert_eq!(ring.get_pos(0),1);
    assert_eq!(ring.get_pos(4),1);
    assert_eq!(ring.get_pos(3),0);
    assert_eq!(ring.get_pos(8),1);
}

#[test]
fn push_wraps() {
    let mut ring: RingBuffer<u8> = RingBuffer::create(0,4);
    ring.set_pos(3);
    ring.push(b'a');
    ring.push(b'b');
    assert_eq!(ring.get_pos(0),1);
    assert_eq!(ring.get_abs(3),b'a');
    assert_eq!(ring.get_abs(4),b'b');
    assert_eq!(ring.get(3),b'b');
    ring.set(1,b'c');
    assert_eq!(ring.get_abs(2),b'c');
}
