//! Guest sample decoding.

use csnd_ir::Encoding;

/// Decode raw guest bytes into mono 16-bit samples.
///
/// Returns `None` for encodings the mixer cannot render.
pub fn decode_pcm(bytes: &[u8], encoding: Encoding) -> Option<Vec<i16>> {
    match encoding {
        Encoding::Pcm8 => Some(bytes.iter().map(|&b| (b as i8 as i16) << 8).collect()),
        Encoding::Pcm16 => Some(
            bytes
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        Encoding::ImaAdpcm | Encoding::Psg => None,
    }
}

/// Number of silent samples standing in for `byte_len` bytes of an
/// undecodable block.
pub fn silent_len(byte_len: usize) -> usize {
    byte_len / 2
}
