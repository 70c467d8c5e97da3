use std::io::Write;

use log::info;

use crate::demo::{
    block::{block_header, DemoBlockType, DEMO_VERSION},
    DemoError,
};

/// Writes a demo: version, connection start block, then one framed block per
/// recorded event.
pub struct DemoRecorder<W: Write> {
    writer: W,
    blocks_written: u64,
}

impl<W: Write> DemoRecorder<W> {
    pub fn start(mut writer: W, start_block: &[u8]) -> Result<Self, DemoError> {
        writer.write_all(&DEMO_VERSION.to_le_bytes())?;
        writer.write_all(&(start_block.len() as u32).to_le_bytes())?;
        writer.write_all(start_block)?;
        info!("demo recording started");
        Ok(Self {
            writer,
            blocks_written: 0,
        })
    }

    pub fn write_block(&mut self, block_type: DemoBlockType, payload: &[u8]) -> Result<(), DemoError> {
        let header = block_header(block_type, payload.len())?;
        self.writer.write_all(&header)?;
        self.writer.write_all(payload)?;
        self.blocks_written += 1;
        Ok(())
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Flushes and hands back the writer.
    pub fn finish(mut self) -> Result<W, DemoError> {
        self.writer.flush()?;
        info!("demo recording stopped after {} blocks", self.blocks_written);
        Ok(self.writer)
    }
}
