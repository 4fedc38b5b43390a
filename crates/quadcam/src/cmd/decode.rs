use std::fs;
use std::time::Duration;

use bytes::Bytes;
use quadcam::sink::DiskSink;
use quadcam_frame::RawFrame;
use quadcam_session::decode_frame;
use serde::Serialize;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, sink_error, CliResult, SUCCESS};
use crate::output::{field_rows, print_report, OutputFormat, Report};

#[derive(Debug, Serialize)]
struct DecodeReport {
    width: usize,
    height: usize,
    raw_bytes: usize,
    rgb565_path: String,
    rgb565_bytes: usize,
    rgb888_path: String,
    rgb888_bytes: usize,
}

impl Report for DecodeReport {
    fn table(&self) -> (Vec<&'static str>, Vec<Vec<String>>) {
        let rows = field_rows([
            ("geometry", format!("{}x{}", self.width, self.height)),
            ("raw", self.raw_bytes.to_string()),
            ("rgb565", format!("{} ({} bytes)", self.rgb565_path, self.rgb565_bytes)),
            ("rgb888", format!("{} ({} bytes)", self.rgb888_path, self.rgb888_bytes)),
        ]);
        (vec!["FIELD", "VALUE"], rows)
    }

    fn pretty(&self) -> String {
        format!(
            "decoded {}x{} frame: {} ({} bytes), {} ({} bytes)",
            self.width,
            self.height,
            self.rgb565_path,
            self.rgb565_bytes,
            self.rgb888_path,
            self.rgb888_bytes
        )
    }
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let geometry = args.geometry.geometry()?;
    let raw = fs::read(&args.raw)
        .map_err(|err| io_error(&format!("failed reading {}", args.raw.display()), err))?;
    let raw_bytes = raw.len();

    let frame = RawFrame {
        sequence: 1,
        payload: Bytes::from(raw),
        elapsed: Duration::ZERO,
    };
    let decoded = decode_frame(&frame, geometry, args.order.into())
        .map_err(|err| frame_error("decode failed", err))?;

    let sink = DiskSink::new(&args.out);
    sink.save(&decoded)
        .map_err(|err| sink_error("save failed", err))?;

    print_report(
        &DecodeReport {
            width: geometry.width(),
            height: geometry.height(),
            raw_bytes,
            rgb565_path: sink.rgb565_path().display().to_string(),
            rgb565_bytes: decoded.rgb565.len(),
            rgb888_path: sink.rgb888_path().display().to_string(),
            rgb888_bytes: decoded.rgb888.len(),
        },
        format,
    );
    Ok(SUCCESS)
}
