//! Block compression for the score array inside a [`crate::file_handler::TablebaseFile`]
//! (§4.D "Block format"). Grounded directly on the collaborator crate's own
//! `EncoderDecoder`/`Block`/`BlockHeader` trio: `deku` frames the header,
//! `zstd` compresses the payload, `positioned_io` seeks to a block without
//! reading the whole file. The only real change is the payload itself: a
//! `Score` array (2 bytes/cell via [`Score::to_u16`]) instead of the
//! teacher's `ByColor<OutcomeU8>` pairs.

use std::io::{self, ErrorKind::InvalidData, Write};

#[cfg(feature = "cached")]
use cached::proc_macro::cached;
use deku::bitvec::BitView;
use deku::{ctx::Limit, prelude::*};
use log::trace;
use positioned_io::ReadAt;
use zstd::stream::{decode_all, encode_all};

use crate::score::{Score, Variant};

/// Logical cells per block (§4.D): 4096 cells * 2 bytes = 8KiB of raw score
/// data before compression, small enough that probing one cell only ever
/// decompresses a bounded amount of data.
pub const BLOCK_CELLS: usize = 4096;

#[derive(Debug)]
pub struct EncoderDecoder<T> {
    inner: T,
}

impl<T> EncoderDecoder<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[inline]
fn to_u64(x: usize) -> u64 {
    x.try_into().unwrap()
}

impl<T: Write> EncoderDecoder<T> {
    /// Writes `scores` as a sequence of blocks and returns the block index
    /// (§4.D): one `(index_from, byte_offset)` entry per block, `byte_offset`
    /// relative to the first byte written here. Callers that persist this
    /// alongside the blocks (`file_handler::TablebaseFile`) can later seek
    /// straight to any block instead of scanning from the start.
    pub fn compress(&mut self, scores: &[Score], variant: Variant) -> io::Result<Vec<BlockIndexEntry>> {
        let mut entries = Vec::new();
        let mut byte_offset = 0u64;
        for (i, elements) in scores.chunks(BLOCK_CELLS).enumerate() {
            let block = Block::new(elements, BLOCK_CELLS * i, variant)?;
            entries.push(BlockIndexEntry { index_from: block.header.index_from, byte_offset });
            let bytes = block.to_bytes().unwrap();
            byte_offset += to_u64(bytes.len());
            self.inner.write_all(&bytes)?;
        }
        Ok(entries)
    }
}

impl<T: ReadAt> EncoderDecoder<T> {
    fn read_block_header(&self, byte_offset: u64) -> io::Result<BlockHeader> {
        let mut header_buf: [u8; BlockHeader::BYTE_SIZE] = [0; BlockHeader::BYTE_SIZE];
        self.inner.read_exact_at(byte_offset, &mut header_buf)?;
        from_bytes_exact::<BlockHeader>(&header_buf)
    }

    fn read_block(&self, byte_offset: u64) -> io::Result<Block> {
        let block_header = self.read_block_header(byte_offset)?;
        trace!("size_including_headers {:?}", block_header.size_including_headers());
        let mut block_buf: Vec<u8> = vec![0; block_header.size_including_headers()];
        self.inner.read_exact_at(byte_offset, &mut block_buf)?;
        from_bytes_exact::<Block>(&block_buf)
    }

    /// Walk the block index from the start of the file, looking for the
    /// block that contains `idx`. Callers that already know a byte offset
    /// (from a file-level block-offset table, §4.D) should seek there and
    /// call [`EncoderDecoder::read_block`] directly instead; this linear
    /// scan exists for the cases that don't have one (e.g. verifying a
    /// freshly compressed file end-to-end).
    pub fn score_of(&self, idx: u64, variant: Variant) -> io::Result<Score> {
        let mut byte_offset = 0;
        loop {
            match self.read_block_header(byte_offset) {
                Ok(block_header) if block_header.idx_is_in_block(idx) => {
                    return self.read_block(byte_offset).and_then(|block| {
                        #[cfg(feature = "cached")]
                        let scores = decompress_scores_cached(block.header, &block, variant);
                        #[cfg(not(feature = "cached"))]
                        let scores = block.decompress_scores(variant);
                        scores.and_then(|scores| {
                            scores
                                .get((idx - block.header.index_from) as usize)
                                .copied()
                                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "index not found in block"))
                        })
                    });
                }
                Ok(block_header) => byte_offset += to_u64(block_header.size_including_headers()),
                Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err),
            }
        }
        Err(io::Error::new(io::ErrorKind::NotFound, "index not found in table"))
    }

    /// Locate `idx`'s block via a resident block index instead of scanning
    /// headers from byte 0 (§4.D, `EgtbMemMode::Tiny`): binary search picks
    /// the entry whose range covers `idx`, then one seek reads that block.
    pub fn score_of_indexed(&self, idx: u64, variant: Variant, index: &[BlockIndexEntry]) -> io::Result<Score> {
        let entry = match index.binary_search_by(|e| e.index_from.cmp(&idx)) {
            Ok(i) => index[i],
            Err(0) => return Err(io::Error::new(io::ErrorKind::NotFound, "index not found in table")),
            Err(i) => index[i - 1],
        };
        let block = self.read_block(entry.byte_offset)?;
        if !block.header.idx_is_in_block(idx) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "index not found in table"));
        }
        #[cfg(feature = "cached")]
        let scores = decompress_scores_cached(block.header, &block, variant);
        #[cfg(not(feature = "cached"))]
        let scores = block.decompress_scores(variant);
        scores.and_then(|scores| {
            scores
                .get((idx - block.header.index_from) as usize)
                .copied()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "index not found in block"))
        })
    }

    pub fn decompress_file(&self, variant: Variant) -> io::Result<Vec<Score>> {
        let mut scores = Vec::new();
        let mut byte_offset = 0;
        loop {
            match self.read_block(byte_offset) {
                Ok(block) => {
                    byte_offset += to_u64(block.header.size_including_headers());
                    scores.extend(block.decompress_scores(variant)?);
                }
                Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err),
            }
        }
        Ok(scores)
    }
}

#[derive(Debug, PartialEq, DekuRead, DekuWrite, Eq, Hash, Clone, Copy)]
pub struct BlockHeader {
    pub index_from: u64, // inclusive
    pub index_to: u64,   // exclusive
    pub block_size: u64, // compressed byte length, excluding this header
}

impl BlockHeader {
    const BYTE_SIZE: usize = 8 * 3;

    pub fn size_including_headers(&self) -> usize {
        Self::BYTE_SIZE + self.block_size as usize
    }

    pub fn idx_is_in_block(&self, idx: u64) -> bool {
        self.index_from <= idx && idx < self.index_to
    }

    pub const fn nb_elements(&self) -> usize {
        (self.index_to - self.index_from) as usize
    }
}

/// One entry of the on-disk block index (§4.D, GLOSSARY "block index"): the
/// byte offset of the block starting at `index_from`, relative to the start
/// of the blocks region (immediately after the index itself).
#[derive(Debug, PartialEq, DekuRead, DekuWrite, Eq, Hash, Clone, Copy)]
pub struct BlockIndexEntry {
    pub index_from: u64,
    pub byte_offset: u64,
}

impl BlockIndexEntry {
    pub const BYTE_SIZE: usize = 16;
}

/// Serializes a block index as a `u64` entry count followed by the entries
/// themselves, so a reader can learn its byte length without re-parsing the
/// blocks it points into.
#[must_use]
pub fn encode_block_index(entries: &[BlockIndexEntry]) -> Vec<u8> {
    let mut out = (entries.len() as u64).to_le_bytes().to_vec();
    for entry in entries {
        out.extend(entry.to_bytes().unwrap());
    }
    out
}

pub fn decode_block_index(buf: &[u8]) -> io::Result<Vec<BlockIndexEntry>> {
    if buf.len() < 8 {
        return Err(io::Error::new(InvalidData, "block index truncated"));
    }
    let count = u64::from_le_bytes(buf[..8].try_into().unwrap()) as usize;
    let mut entries = Vec::with_capacity(count);
    let mut offset = 8;
    for _ in 0..count {
        let end = offset + BlockIndexEntry::BYTE_SIZE;
        let bytes = buf.get(offset..end).ok_or_else(|| io::Error::new(InvalidData, "block index truncated"))?;
        entries.push(from_bytes_exact::<BlockIndexEntry>(bytes)?);
        offset = end;
    }
    Ok(entries)
}

// Empty wrap because `deku` does not implement `DekuWrite` for `Vec<u16>` directly.
#[derive(Debug, PartialEq, DekuWrite, Eq)]
struct RawScores(pub Vec<u16>);

#[derive(Debug, PartialEq, DekuRead, DekuWrite, Eq, Hash)]
struct Block {
    header: BlockHeader,
    #[deku(count = "header.block_size")]
    pub compressed_scores: Vec<u8>,
}

impl Block {
    pub fn new(scores: &[Score], index_from_usize: usize, variant: Variant) -> io::Result<Self> {
        let index_from = to_u64(index_from_usize);
        let index_to = to_u64(index_from_usize + scores.len());
        let raw_scores = RawScores(scores.iter().map(|s| s.to_u16(variant)).collect());
        let raw_bytes = raw_scores.to_bytes().unwrap();
        encode_all(raw_bytes.as_slice(), 19).map(|compressed_scores| {
            let block_size = to_u64(compressed_scores.len());
            Self {
                header: BlockHeader { index_from, index_to, block_size },
                compressed_scores,
            }
        })
    }

    pub fn decompress_scores(&self, variant: Variant) -> io::Result<Vec<Score>> {
        decode_all(self.compressed_scores.as_slice()).and_then(|bytes| {
            Vec::<u16>::read(bytes.view_bits(), Limit::new_count(self.header.nb_elements()))
                .map_err(|e| io::Error::new(InvalidData, e))
                .map(|(rest, raw)| {
                    assert!(rest.is_empty());
                    raw.into_iter().map(|code| Score::from_u16(code, variant)).collect()
                })
        })
    }
}

#[cfg(feature = "cached")]
#[cached(
    result = true,
    type = "cached::SizedCache<(BlockHeader, Variant), Vec<Score>>",
    create = "{ cached::SizedCache::with_size(256) }",
    convert = "{ (block.header, variant) }"
)]
fn decompress_scores_cached(header: BlockHeader, block: &Block, variant: Variant) -> io::Result<Vec<Score>> {
    let _ = header;
    block.decompress_scores(variant)
}

fn from_bytes_exact<'a, T: deku::DekuContainerRead<'a>>(buf: &'a [u8]) -> io::Result<T> {
    let ((byte_not_read, bit_offset), t) = T::from_bytes((buf, 0)).map_err(|e| io::Error::new(InvalidData, e))?;
    assert!(byte_not_read.is_empty());
    assert_eq!(bit_offset, 0);
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen_scores(n: usize) -> Vec<Score> {
        (0..n)
            .map(|i| match i % 4 {
                0 => Score::Draw,
                1 => Score::Win((i % 100) as u16),
                2 => Score::Lose((i % 100) as u16),
                _ => Score::Unset,
            })
            .collect()
    }

    #[test]
    fn block_header_size() {
        let header = BlockHeader { index_from: 0, index_to: 1, block_size: 0 };
        assert_eq!(BlockHeader::BYTE_SIZE, header.to_bytes().unwrap().len());
    }

    #[test]
    fn block_round_trips() {
        let scores = gen_scores(1000);
        let block = Block::new(&scores, 0, Variant::Chess).unwrap();
        assert_eq!(block.decompress_scores(Variant::Chess).unwrap(), scores);
        let bytes = block.to_bytes().unwrap();
        let block2 = from_bytes_exact::<Block>(&bytes).unwrap();
        assert_eq!(block, block2);
    }

    #[test]
    fn encoder_decoder_round_trips_across_blocks() {
        let scores = gen_scores(BLOCK_CELLS * 2 + BLOCK_CELLS / 2);
        let mut encoder = EncoderDecoder::new(Vec::<u8>::new());
        encoder.compress(&scores, Variant::Xiangqi).unwrap();
        let decompressed = encoder.decompress_file(Variant::Xiangqi).unwrap();
        assert_eq!(scores, decompressed);
    }

    #[test]
    fn score_of_finds_the_right_block() {
        let scores = gen_scores(BLOCK_CELLS + 10);
        let mut encoder = EncoderDecoder::new(Vec::<u8>::new());
        encoder.compress(&scores, Variant::Chess).unwrap();
        for idx in [0u64, BLOCK_CELLS as u64 - 1, BLOCK_CELLS as u64, BLOCK_CELLS as u64 + 9] {
            assert_eq!(encoder.score_of(idx, Variant::Chess).unwrap(), scores[idx as usize]);
        }
    }
}
