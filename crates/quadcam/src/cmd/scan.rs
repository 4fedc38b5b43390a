use std::fs::File;
use std::io::{BufReader, Read};

use quadcam_frame::{
    AssemblerConfig, AssemblerEvent, AssemblerStats, DiscardReason, FrameAssembler,
};
use serde::Serialize;

use crate::cmd::ScanArgs;
use crate::exit::{io_error, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat, Report};

#[derive(Debug, Serialize)]
struct FrameRecord {
    sequence: u64,
    status: &'static str,
    bytes: usize,
}

#[derive(Debug, Default, Serialize)]
struct ScanReport {
    stream_bytes: u64,
    text_bytes: u64,
    frames_completed: u64,
    frames_discarded: u64,
    unmatched_ends: u64,
    open_frame_bytes: usize,
    frames: Vec<FrameRecord>,
}

impl Report for ScanReport {
    fn table(&self) -> (Vec<&'static str>, Vec<Vec<String>>) {
        let mut rows: Vec<Vec<String>> = self
            .frames
            .iter()
            .map(|f| vec![f.sequence.to_string(), f.status.to_string(), f.bytes.to_string()])
            .collect();
        if self.open_frame_bytes > 0 {
            rows.push(vec![
                "-".to_string(),
                "incomplete".to_string(),
                self.open_frame_bytes.to_string(),
            ]);
        }
        (vec!["FRAME", "STATUS", "BYTES"], rows)
    }

    fn pretty(&self) -> String {
        format!(
            "{} bytes: {} frames, {} discarded, {} stray end markers, {} text bytes",
            self.stream_bytes,
            self.frames_completed,
            self.frames_discarded,
            self.unmatched_ends,
            self.text_bytes
        )
    }
}

impl ScanReport {
    fn record(&mut self, event: AssemblerEvent, current: &mut u64) {
        match event {
            AssemblerEvent::Text(text) => self.text_bytes += text.len() as u64,
            AssemblerEvent::FrameStarted { sequence } => *current = sequence,
            AssemblerEvent::FrameCompleted(frame) => self.frames.push(FrameRecord {
                sequence: frame.sequence,
                status: "complete",
                bytes: frame.payload.len(),
            }),
            AssemblerEvent::FrameDiscarded { reason, dropped } => {
                let status = match reason {
                    DiscardReason::Overflow => "overflow",
                    DiscardReason::Restarted => "restarted",
                    DiscardReason::UnmatchedEnd => return,
                };
                self.frames.push(FrameRecord {
                    sequence: *current,
                    status,
                    bytes: dropped,
                });
            }
        }
    }

    fn finish(&mut self, stats: AssemblerStats, open_frame_bytes: usize) {
        self.stream_bytes = stats.bytes_seen;
        self.frames_completed = stats.frames_completed;
        self.frames_discarded = stats.frames_discarded;
        self.unmatched_ends = stats.unmatched_ends;
        self.open_frame_bytes = open_frame_bytes;
    }
}

pub fn run(args: ScanArgs, format: OutputFormat) -> CliResult<i32> {
    let geometry = args.geometry.geometry()?;
    let context = format!("failed reading {}", args.stream.display());
    let file = File::open(&args.stream).map_err(|err| io_error(&context, err))?;
    let mut reader = BufReader::new(file);

    let mut assembler = FrameAssembler::with_config(AssemblerConfig {
        geometry,
        ..AssemblerConfig::default()
    });
    let mut report = ScanReport::default();
    let mut current = 0;
    let mut buf = vec![0u8; args.chunk as usize];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_error(&context, err)),
        };
        for event in assembler.push(&buf[..n]) {
            report.record(event, &mut current);
        }
    }

    report.finish(assembler.stats(), assembler.buffered_len());
    print_report(&report, format);
    Ok(SUCCESS)
}
