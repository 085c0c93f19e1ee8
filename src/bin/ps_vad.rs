//! Standalone endpointer demo (spec.md §4.7): read a raw 16-bit PCM file
//! frame by frame and print speech/non-speech transitions, the file-input
//! analogue of `examples/original_source/examples/vad.c`'s live microphone
//! loop (no audio device access is available here, so a file takes sox's
//! place as the frame source).
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use clap::Parser;

use pocketsphinx_core::config::VadMode;
use pocketsphinx_core::endpointer::Endpointer;

#[derive(Parser, Debug)]
#[command(name = "ps_vad", about = "Print speech/non-speech transitions in a raw PCM file")]
struct Args {
    /// VAD aggressiveness mode.
    #[arg(long, default_value = "medium_loose")]
    vad_threshold: String,
    /// Sample rate of the input file, in Hz.
    #[arg(long, default_value_t = 16_000)]
    samprate: u32,
    /// Raw 16-bit little-endian PCM file to scan.
    input: PathBuf,
}

fn main() -> anyhow::Result<()> {
    pocketsphinx_core::setup_logging();
    let args = Args::parse();
    let mode: VadMode = args.vad_threshold.parse()?;

    let mut ep = Endpointer::new(0.0, 0.0, mode, Some(args.samprate), None)?;
    let frame_size = ep.frame_size();

    let file = File::open(&args.input)?;
    let mut reader = BufReader::new(file);
    let mut byte_buf = vec![0u8; frame_size * 2];
    let mut frame = vec![0i16; frame_size];
    let mut prev_in_speech = false;

    loop {
        let mut read = 0;
        while read < byte_buf.len() {
            match reader.read(&mut byte_buf[read..])? {
                0 => break,
                n => read += n,
            }
        }
        if read == 0 {
            break;
        }
        if read < byte_buf.len() {
            byte_buf[read..].fill(0);
        }
        for (i, chunk) in byte_buf.chunks_exact(2).enumerate() {
            frame[i] = i16::from_le_bytes([chunk[0], chunk[1]]);
        }

        if read < byte_buf.len() {
            let _ = ep.end_stream(&frame, read / 2);
        } else {
            let _ = ep.process(&frame);
        }

        if ep.in_speech() != prev_in_speech {
            println!("{}", if ep.in_speech() { "speech" } else { "not speech" });
            prev_in_speech = ep.in_speech();
        }
        if read < byte_buf.len() {
            break;
        }
    }

    Ok(())
}
