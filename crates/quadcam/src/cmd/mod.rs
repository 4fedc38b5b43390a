use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use quadcam_frame::{ChannelOrder, FrameGeometry, SENSOR_HEIGHT, SENSOR_WIDTH};

use crate::exit::{frame_error, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod replay;
pub mod scan;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a full capture session against a recorded stream.
    Replay(ReplayArgs),
    /// Collate and convert one raw frame payload.
    Decode(DecodeArgs),
    /// Report the frames and console text in a recorded stream.
    Scan(ScanArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Replay(args) => replay::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Scan(args) => scan::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Output image size shared by the frame commands.
#[derive(Args, Debug, Clone, Copy)]
pub struct GeometryArgs {
    /// Output image width in pixels (two tiles side by side).
    #[arg(long, default_value_t = SENSOR_WIDTH)]
    pub width: usize,
    /// Output image height in pixels.
    #[arg(long, default_value_t = SENSOR_HEIGHT)]
    pub height: usize,
}

impl GeometryArgs {
    pub fn geometry(self) -> CliResult<FrameGeometry> {
        FrameGeometry::new(self.width, self.height)
            .map_err(|err| frame_error("invalid geometry", err))
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum OrderArg {
    /// Red first.
    #[default]
    Rgb,
    /// Blue first, as bitmap tools expect.
    Bgr,
}

impl From<OrderArg> for ChannelOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Rgb => ChannelOrder::Rgb,
            OrderArg::Bgr => ChannelOrder::Bgr,
        }
    }
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Recorded device stream to play back.
    pub capture: PathBuf,
    /// Bytes the simulated device makes available per poll.
    #[arg(long, default_value = "4096", value_parser = clap::value_parser!(u32).range(1..))]
    pub chunk: u32,
    /// Directory for saved frames.
    #[arg(long, value_name = "DIR", default_value = ".", env = "QUADCAM_OUT_DIR")]
    pub out: PathBuf,
    /// Bitmap renderer started for each frame: `<prog> <w> <h> <in> <out>`.
    #[arg(long, value_name = "PROG", env = "QUADCAM_RENDERER")]
    pub renderer: Option<PathBuf>,
    /// Directory of crop*.avs scripts to open after each frame.
    #[arg(long, value_name = "DIR", requires = "player")]
    pub scripts: Option<PathBuf>,
    /// Program used to open crop scripts.
    #[arg(long, value_name = "PROG")]
    pub player: Option<PathBuf>,
    /// Datagram socket that receives "ImageReady" after each frame.
    #[arg(long, value_name = "PATH", env = "QUADCAM_NOTIFY")]
    pub notify: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    pub frames: Option<u64>,
    /// Forward stdin to the device as operator commands.
    #[arg(long)]
    pub stdin: bool,
    #[command(flatten)]
    pub geometry: GeometryArgs,
    /// Byte order of the RGB888 output [default: bgr with --renderer, else rgb].
    #[arg(long, value_enum)]
    pub order: Option<OrderArg>,
}

impl ReplayArgs {
    /// Bitmap renderers read blue-first pixels, so that is the default
    /// whenever one is configured.
    pub fn channel_order(&self) -> ChannelOrder {
        match (self.order, &self.renderer) {
            (Some(order), _) => order.into(),
            (None, Some(_)) => ChannelOrder::Bgr,
            (None, None) => ChannelOrder::Rgb,
        }
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Raw frame payload (bytes between the markers).
    pub raw: PathBuf,
    /// Directory for the decoded blobs.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out: PathBuf,
    #[command(flatten)]
    pub geometry: GeometryArgs,
    /// Byte order of the RGB888 output.
    #[arg(long, value_enum, default_value_t = OrderArg::Rgb)]
    pub order: OrderArg,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Recorded device stream.
    pub stream: PathBuf,
    /// Read size used to feed the assembler.
    #[arg(long, default_value = "4096", value_parser = clap::value_parser!(u32).range(1..))]
    pub chunk: u32,
    #[command(flatten)]
    pub geometry: GeometryArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
