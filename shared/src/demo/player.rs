use std::io::Read;

use crate::demo::{
    block::{parse_block_header, DemoBlockType, DEMO_VERSION},
    DemoError,
};

/// Reads back a demo written by a [`DemoRecorder`](crate::demo::DemoRecorder).
pub struct DemoPlayer {
    bytes: Vec<u8>,
    start_block: (usize, usize),
    position: usize,
}

impl DemoPlayer {
    pub fn open(bytes: Vec<u8>) -> Result<Self, DemoError> {
        let version = read_u32(&bytes, 0)?;
        if version != DEMO_VERSION {
            return Err(DemoError::VersionMismatch {
                expected: DEMO_VERSION,
                found: version,
            });
        }
        let start_size = read_u32(&bytes, 4)? as usize;
        let start = 8;
        let end = start + start_size;
        if end > bytes.len() {
            return Err(DemoError::Truncated);
        }
        Ok(Self {
            bytes,
            start_block: (start, end),
            position: end,
        })
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self, DemoError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::open(bytes)
    }

    pub fn start_block(&self) -> &[u8] {
        &self.bytes[self.start_block.0..self.start_block.1]
    }

    /// Next recorded block, or `None` at the end of the demo.
    pub fn next_block(&mut self) -> Result<Option<(DemoBlockType, &[u8])>, DemoError> {
        if self.position == self.bytes.len() {
            return Ok(None);
        }
        let header = self
            .bytes
            .get(self.position..self.position + 2)
            .ok_or(DemoError::Truncated)?;
        let (block_type, size) = parse_block_header([header[0], header[1]])?;
        let start = self.position + 2;
        let payload = self
            .bytes
            .get(start..start + size)
            .ok_or(DemoError::Truncated)?;
        self.position = start + size;
        Ok(Some((block_type, payload)))
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, DemoError> {
    let slice = bytes.get(offset..offset + 4).ok_or(DemoError::Truncated)?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
