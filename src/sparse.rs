//! Android sparse image conversion
//!
//! Factory and OTA archives commonly ship partitions as sparse images. The
//! filesystem tools only understand raw images, so sparse files are expanded
//! before unpacking.

use anyhow::{bail, Context, Result};
use binrw::{BinRead, BinReaderExt};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const SPARSE_MAGIC: u32 = 0xED26_FF3A;

const CHUNK_TYPE_RAW: u16 = 0xCAC1;
const CHUNK_TYPE_FILL: u16 = 0xCAC2;
const CHUNK_TYPE_DONT_CARE: u16 = 0xCAC3;
const CHUNK_TYPE_CRC32: u16 = 0xCAC4;

const FILE_HEADER_SIZE: u64 = 28;
const CHUNK_HEADER_SIZE: u64 = 12;

#[derive(BinRead, Debug)]
#[br(little)]
struct SparseHeader {
    magic: u32,
    major_version: u16,
    _minor_version: u16,
    file_header_size: u16,
    chunk_header_size: u16,
    block_size: u32,
    total_blocks: u32,
    total_chunks: u32,
    _image_checksum: u32,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct ChunkHeader {
    chunk_type: u16,
    _reserved: u16,
    chunk_blocks: u32,
    total_size: u32,
}

/// Whether the file starts with the sparse image magic
pub fn is_sparse(path: &Path) -> Result<bool> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(u32::from_le_bytes(magic) == SPARSE_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Expand a sparse image into a raw image at `dst`
pub fn unsparse(src: &Path, dst: &Path) -> Result<()> {
    let file = File::open(src)
        .with_context(|| format!("Failed to open {}", src.display()))?;
    let mut reader = BufReader::new(file);

    let header: SparseHeader = reader
        .read_le()
        .with_context(|| format!("Failed to read sparse header of {}", src.display()))?;

    if header.magic != SPARSE_MAGIC {
        bail!("{} is not a sparse image", src.display());
    }
    if header.major_version != 1 {
        bail!(
            "Unsupported sparse image version {} in {}",
            header.major_version,
            src.display()
        );
    }

    skip(&mut reader, header.file_header_size as u64, FILE_HEADER_SIZE)?;

    log::debug!(
        "Unsparsing {}: {} chunks, {} blocks of {} bytes",
        src.display(),
        header.total_chunks,
        header.total_blocks,
        header.block_size
    );

    let out = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dst)
        .with_context(|| format!("Failed to create {}", dst.display()))?;
    let mut writer = BufWriter::new(out);

    let block_size = header.block_size as u64;

    for index in 0..header.total_chunks {
        let chunk: ChunkHeader = reader
            .read_le()
            .with_context(|| format!("Failed to read chunk #{} header", index))?;
        skip(&mut reader, header.chunk_header_size as u64, CHUNK_HEADER_SIZE)?;

        let data_size = (chunk.total_size as u64)
            .checked_sub(header.chunk_header_size as u64)
            .with_context(|| format!("Chunk #{} is smaller than its header", index))?;
        let output_size = chunk.chunk_blocks as u64 * block_size;

        match chunk.chunk_type {
            CHUNK_TYPE_RAW => {
                if data_size != output_size {
                    bail!("Raw chunk #{} has {} bytes, expected {}", index, data_size, output_size);
                }
                let copied = io::copy(&mut (&mut reader).take(data_size), &mut writer)?;
                if copied != data_size {
                    bail!("Sparse image truncated in chunk #{}", index);
                }
            }
            CHUNK_TYPE_FILL => {
                if data_size != 4 {
                    bail!("Fill chunk #{} has {} bytes of data, expected 4", index, data_size);
                }
                let mut pattern = [0u8; 4];
                reader.read_exact(&mut pattern)?;
                write_fill(&mut writer, pattern, output_size)?;
            }
            CHUNK_TYPE_DONT_CARE => {
                writer.seek(SeekFrom::Current(output_size as i64))?;
            }
            CHUNK_TYPE_CRC32 => {
                reader.seek_relative(data_size as i64)?;
            }
            other => bail!("Unknown sparse chunk type {:#06x} in chunk #{}", other, index),
        }
    }

    let out = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("Failed to write {}", dst.display()))?;

    // Trailing don't-care chunks only move the cursor
    out.set_len(header.total_blocks as u64 * block_size)?;

    Ok(())
}

fn skip<R: Seek>(reader: &mut R, declared: u64, known: u64) -> Result<()> {
    if declared > known {
        reader.seek(SeekFrom::Current((declared - known) as i64))?;
    }
    Ok(())
}

fn write_fill<W: Write>(writer: &mut W, pattern: [u8; 4], size: u64) -> Result<()> {
    let buffer: Vec<u8> = pattern.iter().copied().cycle().take(64 * 1024).collect();
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(buffer.len() as u64) as usize;
        writer.write_all(&buffer[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}
