use std::io;

use declio::ctx::Len;
use declio::{magic_bytes, Decode, Encode, EncodedSize};

use crate::result::{Error, Result};
use crate::utils::div_ceil;
use crate::{constants, BufMsfStream};

pub(crate) const DEFAULT_BLOCK_SIZE: u32 = 0x200;

magic_bytes! {
    #[derive(Debug)]
    pub(crate) MsfHeader(b"Microsoft C/C++ program database 2.00\r\n\x1aJG\0\0");
}

/// The "small MSF" superblock used by the JG-signed PDB 2.0 container.
///
/// Unlike the later big-MSF (PDB 7) format, the block map is embedded directly
/// after the header rather than addressed indirectly through a second level
/// of block indices.
#[derive(Debug)]
pub(crate) struct SuperBlock {
    pub magic: MsfHeader,
    pub block_size: u32,
    pub free_block_map: BlockIndex,
    pub num_blocks: u32,
    pub num_dir_bytes: u32,
    pub block_map: Vec<BlockIndex>,
}

impl SuperBlock {
    pub fn dir_block_count(&self) -> u32 {
        div_ceil(self.num_dir_bytes, self.block_size)
    }
}

impl<Ctx: Copy> Decode<Ctx> for SuperBlock {
    fn decode<R>(_ctx: Ctx, reader: &mut R) -> std::result::Result<Self, declio::Error>
    where
        R: io::Read,
    {
        let magic = MsfHeader::decode((), reader)?;
        let block_size = u32::decode(constants::ENDIANESS, reader)?;
        let free_block_map = BlockIndex::decode(constants::ENDIANESS, reader)?;
        let num_blocks = u32::decode(constants::ENDIANESS, reader)?;
        let num_dir_bytes = u32::decode(constants::ENDIANESS, reader)?;
        let _reserved = u32::decode(constants::ENDIANESS, reader)?;

        let block_count = div_ceil(num_dir_bytes, block_size);
        let block_map = Decode::decode(Len(block_count as usize), reader)?;

        Ok(Self {
            magic,
            block_size,
            free_block_map,
            num_blocks,
            num_dir_bytes,
            block_map,
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct MsfStreamLayout {
    pub blocks: Vec<BlockIndex>,
    pub byte_size: u32,
}

impl MsfStreamLayout {
    pub fn new(blocks: Vec<BlockIndex>, byte_size: u32) -> Self {
        Self { blocks, byte_size }
    }
}

#[derive(Debug)]
pub(crate) struct MsfStream<'a, R> {
    layout: &'a MsfStreamLayout,
    inner: R,
    position: u32,
    block_size: u32,
}

impl<'a, R> MsfStream<'a, R> {
    pub fn new(inner: R, layout: &'a MsfStreamLayout, block_size: u32) -> Self {
        Self {
            inner,
            layout,
            position: 0,
            block_size,
        }
    }

    pub fn length(&self) -> u32 {
        self.layout.byte_size
    }

    pub fn is_eof(&self) -> bool {
        self.layout.byte_size == self.position
    }
}

impl<'a, R> io::Read for MsfStream<'a, R>
where
    R: io::Read + io::Seek,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let cur = self.position / self.block_size;
        let rem_block = self.block_size - self.position % self.block_size;
        let rem_stream = self.layout.byte_size - self.position;
        if rem_stream == 0 {
            return Ok(0);
        }
        if rem_block == self.block_size {
            let file_pos = self.layout.blocks[cur as usize];
            self.inner
                .seek(io::SeekFrom::Start(file_pos.to_file_pos(self.block_size)))?;
        }
        let len = rem_stream.min(rem_block).min(buf.len() as u32);
        let read = self.inner.read(&mut buf[..len as usize])?;
        self.position += read as u32;
        Ok(read)
    }
}

impl<'a, R> io::Seek for MsfStream<'a, R>
where
    R: io::Seek,
{
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        match pos {
            io::SeekFrom::Start(pos) => {
                self.position = pos as u32;
            }
            io::SeekFrom::End(offset) => {
                self.position = (self.layout.byte_size as i64 + offset) as u32;
            }
            io::SeekFrom::Current(offset) => {
                self.position = (self.position as i64 + offset) as u32;
            }
        }
        if self.position < self.layout.byte_size {
            let cur = self.position / self.block_size;
            let file_pos = self.layout.blocks[cur as usize];
            let offset: u64 = (self.position % self.block_size).into();
            self.inner.seek(io::SeekFrom::Start(
                file_pos.to_file_pos(self.block_size) + offset,
            ))?;
        }
        Ok(self.position.into())
    }
}

/// Index of a fixed-size block within the PDB file. 16-bit in the small-MSF
/// container: the original toolchain never produced files large enough to
/// need the wider indices the later big-MSF format uses.
#[derive(Debug, Clone, Copy, Encode, Decode)]
#[declio(ctx_is = "constants::ENDIANESS")]
pub(crate) struct BlockIndex(pub u16);

impl BlockIndex {
    #[inline]
    fn to_file_pos(self, block_size: u32) -> u64 {
        self.0 as u64 * block_size as u64
    }
}

#[derive(Debug, Clone, Copy, Encode, Decode, EncodedSize)]
#[declio(ctx_is = "constants::ENDIANESS")]
pub struct StreamIndex(pub(crate) u16);

impl From<StreamIndex> for u16 {
    fn from(idx: StreamIndex) -> Self {
        idx.0
    }
}

/// One entry of the stream directory: `{size, ReservedPtr}`. The reserved
/// pointer is a leftover field from the in-memory layout of the original
/// toolchain's directory and carries no on-disk meaning for a reader.
#[derive(Debug, Clone, Copy, Decode)]
#[declio(ctx_is = "constants::ENDIANESS")]
struct StreamSizeEntry {
    size: u32,
    #[allow(unused)]
    reserved_ptr: u32,
}

/// Reads the stream directory (itself an MSF stream addressed by
/// `SuperBlock::block_map`) and resolves each stream's block list.
pub(crate) fn read_stream_layouts<R>(
    reader: &mut R,
    super_block: &SuperBlock,
) -> Result<Vec<MsfStreamLayout>>
where
    R: io::Read + io::Seek,
{
    let dir_layout = MsfStreamLayout::new(super_block.block_map.clone(), super_block.num_dir_bytes);
    let mut dir_reader: BufMsfStream<&mut R> =
        io::BufReader::new(MsfStream::new(&mut *reader, &dir_layout, super_block.block_size));

    let num_streams = u32::decode(constants::ENDIANESS, &mut dir_reader)?;
    if num_streams == 0 {
        return Err(Error::UnsupportedFeature("empty stream directory"));
    }

    let sizes: Vec<StreamSizeEntry> =
        Decode::decode((Len(num_streams as usize), constants::ENDIANESS), &mut dir_reader)?;

    let mut layouts = Vec::with_capacity(sizes.len());
    for entry in sizes {
        if entry.size == u32::MAX {
            layouts.push(MsfStreamLayout::default());
            continue;
        }
        let block_count = div_ceil(entry.size, super_block.block_size);
        let blocks: Vec<BlockIndex> = Decode::decode(
            (Len(block_count as usize), constants::ENDIANESS),
            &mut dir_reader,
        )?;
        layouts.push(MsfStreamLayout::new(blocks, entry.size));
    }

    Ok(layouts)
}

