//! Mono 16-bit WAV reading and writing for the CLI.

use anyhow::{bail, Context, Result};
use std::io::Write;

/// Decoded WAV contents, downmixed to mono.
pub struct MonoPcm {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

// --- Writing ---

pub fn write_wav(w: &mut impl Write, samples: &[i16], sample_rate: u32) -> std::io::Result<()> {
    let bits_per_sample: u16 = 16;
    let block_align: u16 = bits_per_sample / 8;
    let data_size = samples.len() as u32 * block_align as u32;

    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&bits_per_sample.to_le_bytes())?;

    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    for s in samples {
        w.write_all(&s.to_le_bytes())?;
    }
    Ok(())
}

// --- Reading ---

/// Parse a PCM WAV (8 or 16 bit, mono or stereo) into mono 16-bit samples.
pub fn load_wav(data: &[u8]) -> Result<MonoPcm> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        bail!("not a RIFF/WAVE file");
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u32, u16)> = None;
    let mut body: Option<&[u8]> = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32_le(data, pos + 4) as usize;
        let start = pos + 8;
        let end = start.saturating_add(chunk_size).min(data.len());

        if chunk_id == b"fmt " && chunk_size >= 16 {
            if end - start < 16 {
                bail!("truncated fmt chunk");
            }
            let format = read_u16_le(data, start);
            if format != 1 {
                bail!("unsupported WAV format tag {format}");
            }
            let channels = read_u16_le(data, start + 2);
            let rate = read_u32_le(data, start + 4);
            let bits = read_u16_le(data, start + 14);
            fmt = Some((channels, rate, bits));
        } else if chunk_id == b"data" {
            body = Some(&data[start..end]);
        }

        pos = start.saturating_add(chunk_size);
        if pos % 2 != 0 {
            pos += 1;
        }
    }

    let (channels, sample_rate, bits) = fmt.context("missing fmt chunk")?;
    let raw = body.context("missing data chunk")?;

    let frames: Vec<i16> = match (bits, channels) {
        (8, 1) => raw.iter().map(|&b| u8_to_i16(b)).collect(),
        (8, 2) => raw
            .chunks_exact(2)
            .map(|c| mix(u8_to_i16(c[0]), u8_to_i16(c[1])))
            .collect(),
        (16, 1) => raw
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect(),
        (16, 2) => raw
            .chunks_exact(4)
            .map(|c| mix(i16::from_le_bytes([c[0], c[1]]), i16::from_le_bytes([c[2], c[3]])))
            .collect(),
        _ => bail!("unsupported WAV layout: {channels} channels, {bits} bits"),
    };

    Ok(MonoPcm {
        samples: frames,
        sample_rate,
    })
}

/// 8-bit WAV is unsigned, centered on 128.
fn u8_to_i16(b: u8) -> i16 {
    (b as i16 - 128) << 8
}

fn mix(l: i16, r: i16) -> i16 {
    ((l as i32 + r as i32) / 2) as i16
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}
