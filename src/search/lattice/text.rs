//! The lattice text format of spec.md §6: a header block, `Nodes N:`
//! followed by `N` lines `id word_id sf fef lef`, `Initial`/`Final`, an
//! `Edges:` block of `from to ascr ef`, then `End`. Words are resolved by a
//! parallel symbol table (the [`crate::model::dict::Dictionary`]) the
//! caller supplies, not embedded in the file.
use std::fmt::Write as _;

use crate::error::{DecoderError, ModelLoadError};
use crate::model::dict::WordId;

use super::Lattice;

/// Serialize `lattice` in the text format of spec.md §6.
pub fn write(lattice: &Lattice, utterance_id: &str, frames: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Frames {frames}");
    let _ = writeln!(out, "UtteranceID {utterance_id}");
    let _ = writeln!(out, "Nodes {}:", lattice.n_nodes());
    for i in 0..lattice.n_nodes() {
        let node = lattice.node(i);
        let _ = writeln!(
            out,
            "{} {} {} {} {}",
            i, node.word.0, node.start_frame, node.end_frame_min, node.end_frame_max
        );
    }
    let _ = writeln!(out, "Initial {}", lattice.initial.unwrap_or(0));
    let _ = writeln!(out, "Final {}", lattice.final_node.unwrap_or(0));
    let _ = writeln!(out, "Edges:");
    for link in lattice.links() {
        let _ = writeln!(out, "{} {} {} {}", link.from, link.to, link.acoustic_score, link.end_frame);
    }
    let _ = writeln!(out, "End");
    out
}

/// A parsed lattice in plain node/edge form, independent of the live
/// [`Lattice`] arena (used for reading a file back, e.g. in tests that
/// round-trip the format).
#[derive(Debug, Default)]
pub struct ParsedLattice {
    pub frames: u32,
    pub utterance_id: String,
    pub nodes: Vec<(WordId, u32, u32, u32)>,
    pub initial: usize,
    pub final_node: usize,
    pub edges: Vec<(usize, usize, i32, u32)>,
}

/// Parse the text format written by [`write`].
pub fn read(text: &str) -> Result<ParsedLattice, DecoderError> {
    let mut lines = text.lines();
    let mut parsed = ParsedLattice::default();

    let frames_line = next_line(&mut lines)?;
    parsed.frames = parse_field(frames_line, "Frames")?;

    let id_line = next_line(&mut lines)?;
    parsed.utterance_id = id_line
        .strip_prefix("UtteranceID ")
        .ok_or_else(|| malformed("missing UtteranceID line"))?
        .to_string();

    let nodes_line = next_line(&mut lines)?;
    let n_nodes: usize = nodes_line
        .strip_prefix("Nodes ")
        .and_then(|s| s.strip_suffix(':'))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed("missing or malformed Nodes header"))?;

    for _ in 0..n_nodes {
        let line = next_line(&mut lines)?;
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() != 5 {
            return Err(malformed("node line must have 5 columns"));
        }
        let wid: u32 = cols[1].parse().map_err(|_| malformed("bad word id"))?;
        let sf: u32 = cols[2].parse().map_err(|_| malformed("bad start frame"))?;
        let fef: u32 = cols[3].parse().map_err(|_| malformed("bad fef"))?;
        let lef: u32 = cols[4].parse().map_err(|_| malformed("bad lef"))?;
        parsed.nodes.push((WordId(wid), sf, fef, lef));
    }

    let initial_line = next_line(&mut lines)?;
    parsed.initial = parse_field(initial_line, "Initial")?;
    let final_line = next_line(&mut lines)?;
    parsed.final_node = parse_field(final_line, "Final")?;

    let edges_header = next_line(&mut lines)?;
    if edges_header.trim() != "Edges:" {
        return Err(malformed("expected Edges: header"));
    }

    for line in lines {
        let line = line.trim();
        if line == "End" || line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() != 4 {
            return Err(malformed("edge line must have 4 columns"));
        }
        let from: usize = cols[0].parse().map_err(|_| malformed("bad edge from"))?;
        let to: usize = cols[1].parse().map_err(|_| malformed("bad edge to"))?;
        let ascr: i32 = cols[2].parse().map_err(|_| malformed("bad edge score"))?;
        let ef: u32 = cols[3].parse().map_err(|_| malformed("bad edge frame"))?;
        parsed.edges.push((from, to, ascr, ef));
    }

    Ok(parsed)
}

fn next_line<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Result<&'a str, DecoderError> {
    lines.next().ok_or_else(|| malformed("unexpected end of lattice text"))
}

fn parse_field<T: std::str::FromStr>(line: &str, name: &str) -> Result<T, DecoderError> {
    let rest = line.strip_prefix(name).and_then(|s| s.strip_prefix(' ')).unwrap_or(line);
    rest.trim().parse().map_err(|_| malformed(&format!("bad {name} field")))
}

fn malformed(reason: &str) -> DecoderError {
    DecoderError::ModelLoad(ModelLoadError::Malformed {
        path: "<lattice text>".to_string(),
        line: 0,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bp::{Bp, BpTable};
    use crate::model::dict::Dictionary;

    #[test]
    fn round_trips_header_and_edges() {
        let dict = Dictionary::new();
        let mut bp = BpTable::new();
        let s = bp.push(Bp {
            frame_index: 0,
            word: dict.start_word(),
            predecessor: None,
            path_score: 0,
            acoustic_score: 0,
            lm_score: 0,
            right_context_stack: None,
        });
        bp.push(Bp {
            frame_index: 1,
            word: dict.end_word(),
            predecessor: Some(s),
            path_score: -3,
            acoustic_score: -3,
            lm_score: 0,
            right_context_stack: None,
        });
        let lattice = Lattice::build(&bp, &dict);
        let text = write(&lattice, "utt1", 2);
        let parsed = read(&text).unwrap();
        assert_eq!(parsed.utterance_id, "utt1");
        assert_eq!(parsed.nodes.len(), lattice.n_nodes());
        assert_eq!(parsed.edges.len(), lattice.links().len());
    }
}
