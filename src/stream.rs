//! Raw sample streaming for the CLI frontend.
//!
//! Reads mono f32 little-endian samples, drives the first input of a
//! [`Simulator`] with them and writes its first output in the same format.

use std::io::{Read, Write};

use crate::description::Simulator;
use crate::error::{AlgebraError, Result};

/// Samples processed per block.
pub const BLOCK_SIZE: usize = 256;

/// Reads f32 LE samples from any byte source.
pub struct SampleReader<R> {
    inner: R,
    buffer: Vec<u8>,
    /// Bytes of a partial sample carried to the next read
    pending: usize,
}

impl<R: Read> SampleReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: vec![0u8; BLOCK_SIZE * 4],
            pending: 0,
        }
    }

    /// Read up to `samples.len()` samples. Returns 0 on end of input.
    pub fn read_block(&mut self, samples: &mut [f32]) -> Result<usize> {
        let wanted = (samples.len() * 4).min(self.buffer.len());
        loop {
            let read = self
                .inner
                .read(&mut self.buffer[self.pending..wanted])
                .map_err(|e| AlgebraError::StreamInputError {
                    message: e.to_string(),
                })?;
            if read == 0 {
                return Ok(0);
            }
            let available = self.pending + read;
            let count = available / 4;
            if count == 0 {
                self.pending = available;
                continue;
            }

            for (sample, bytes) in samples.iter_mut().zip(self.buffer[..count * 4].chunks_exact(4)) {
                *sample = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            self.buffer.copy_within(count * 4..available, 0);
            self.pending = available - count * 4;
            return Ok(count);
        }
    }
}

/// Writes f32 LE samples to any byte sink.
pub struct SampleWriter<W> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: Write> SampleWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(BLOCK_SIZE * 4),
        }
    }

    pub fn write_block(&mut self, samples: &[f32]) -> Result<()> {
        self.buffer.clear();
        for sample in samples {
            self.buffer.extend_from_slice(&sample.to_le_bytes());
        }
        self.inner
            .write_all(&self.buffer)
            .map_err(|e| AlgebraError::StreamOutputError {
                message: e.to_string(),
            })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|e| AlgebraError::StreamOutputError {
                message: e.to_string(),
            })
    }
}

/// Stream samples from `input` through `simulator` into `output`.
/// Returns the number of samples processed.
pub fn process_stream(simulator: &mut Simulator, input: impl Read, output: impl Write) -> Result<usize> {
    let mut reader = SampleReader::new(input);
    let mut writer = SampleWriter::new(output);

    let mut in_samples = vec![0.0f32; BLOCK_SIZE];
    let mut out_samples = vec![0.0f32; BLOCK_SIZE];
    let mut total = 0;

    loop {
        let count = reader.read_block(&mut in_samples)?;
        if count == 0 {
            break;
        }
        simulator.process_block(&in_samples[..count], &mut out_samples[..count])?;
        writer.write_block(&out_samples[..count])?;
        total += count;
    }

    writer.flush()?;
    Ok(total)
}
