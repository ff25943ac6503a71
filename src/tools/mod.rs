//! Building blocks for the LZSS codec and the archive manager.

pub mod ring_buffer;
pub mod match_tree;
pub mod token_buffer;
pub mod wildcard;
