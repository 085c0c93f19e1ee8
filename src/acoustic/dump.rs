//! The feature-stream dump/replay format of spec.md §6: "one frame per
//! record, host byte order: `int32 n_active; repeated n_active times
//! (int16 senone_id, int16 score)`. Score is the normalized log-likelihood
//! (<= 0). EOF indicates end of utterance."
//!
//! spec.md §9's redesign note applies: "write an explicit endian marker in
//! the first record; readers reject mismatches rather than silently
//! producing garbage." We prepend a 4-byte magic/endian marker before the
//! first frame record.
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::acoustic::cache::SenoneScores;
use crate::error::{DecoderError, ModelLoadError};
use crate::model::mdef::SenoneId;

/// Magic value written once at the start of a dump stream. Chosen so a
/// reader given a big-endian-authored stream (which would see the byte-
/// swapped value) can detect the mismatch immediately instead of
/// misinterpreting every subsequent record.
pub const DUMP_MAGIC: u32 = 0x5053_4653; // "PSFS"

/// Write the stream header (call once, before any frames).
pub fn write_header<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_u32::<LittleEndian>(DUMP_MAGIC)
}

/// Read and validate the stream header.
pub fn read_header<R: Read>(r: &mut R) -> Result<(), DecoderError> {
    let magic = r
        .read_u32::<LittleEndian>()
        .map_err(|e| DecoderError::ModelLoad(ModelLoadError::Io {
            path: "<dump stream>".to_string(),
            source: e,
        }))?;
    if magic != DUMP_MAGIC {
        return Err(DecoderError::ModelLoad(ModelLoadError::Malformed {
            path: "<dump stream>".to_string(),
            line: 0,
            reason: format!("bad dump magic/endian marker: got {magic:#x}, expected {DUMP_MAGIC:#x}"),
        }));
    }
    Ok(())
}

/// Write one frame's active-senone scores.
pub fn write_frame<W: Write>(w: &mut W, scores: &SenoneScores) -> io::Result<()> {
    let active: Vec<(SenoneId, i32)> = scores
        .active_senones()
        .map(|s| (s, scores.score(s).unwrap()))
        .collect();
    w.write_i32::<LittleEndian>(active.len() as i32)?;
    for (senone, score) in active {
        w.write_i16::<LittleEndian>(senone.0.min(i16::MAX as u32) as i16)?;
        w.write_i16::<LittleEndian>(score.clamp(i16::MIN as i32, i16::MAX as i32) as i16)?;
    }
    Ok(())
}

/// Read one frame. Returns `Ok(None)` at clean EOF (no partial record).
pub fn read_frame<R: Read>(r: &mut R, frame_index: u32) -> io::Result<Option<SenoneScores>> {
    let n_active = match r.read_i32::<LittleEndian>() {
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut scores = Vec::with_capacity(n_active.max(0) as usize);
    for _ in 0..n_active {
        let senone = r.read_i16::<LittleEndian>()? as u32;
        let score = r.read_i16::<LittleEndian>()? as i32;
        scores.push((SenoneId(senone), score));
    }
    Ok(Some(SenoneScores::new(frame_index, scores)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_stream_of_frames() {
        let frames = vec![
            SenoneScores::new(0, vec![(SenoneId(3), 0), (SenoneId(7), -12)]),
            SenoneScores::new(1, vec![(SenoneId(1), 0)]),
        ];
        let mut buf = Vec::new();
        write_header(&mut buf).unwrap();
        for f in &frames {
            write_frame(&mut buf, f).unwrap();
        }

        let mut cursor = Cursor::new(buf);
        read_header(&mut cursor).unwrap();
        let mut read_back = Vec::new();
        let mut idx = 0u32;
        while let Some(f) = read_frame(&mut cursor, idx).unwrap() {
            read_back.push(f);
            idx += 1;
        }
        assert_eq!(read_back.len(), frames.len());
        for (a, b) in frames.iter().zip(read_back.iter()) {
            assert_eq!(a.len(), b.len());
            for s in a.active_senones() {
                assert_eq!(a.score(s), b.score(s));
            }
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(0xDEAD_BEEF).unwrap();
        let mut cursor = Cursor::new(buf);
        assert!(read_header(&mut cursor).is_err());
    }
}
