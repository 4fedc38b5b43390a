//! Frame sinks: persistence, external rendering and frame-ready notification.
//!
//! [`CaptureSink`] does what the desktop capture tool does with every frame:
//! save both pixel formats, start the renderer and crop scripts, then tell
//! listeners an image is ready. External programs are started and left to
//! run; the sink never waits on them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use quadcam_frame::FrameGeometry;
use quadcam_session::{DecodedFrame, FrameSink, SinkError};
use tracing::{debug, info, warn};

/// File name of the collated RGB565 blob.
pub const RGB565_FILE: &str = "usb_up565.dat";
/// File name of the converted RGB888 blob.
pub const RGB888_FILE: &str = "usb_up888.dat";
/// File name the renderer is asked to produce.
pub const BITMAP_FILE: &str = "usb_up888.bmp";
/// Payload of the frame-ready datagram.
pub const READY_MESSAGE: &[u8] = b"ImageReady";

/// Writes decoded frames as flat binary files, overwriting the previous frame.
#[derive(Debug, Clone)]
pub struct DiskSink {
    dir: PathBuf,
}

impl DiskSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn rgb565_path(&self) -> PathBuf {
        self.dir.join(RGB565_FILE)
    }

    pub fn rgb888_path(&self) -> PathBuf {
        self.dir.join(RGB888_FILE)
    }

    pub fn bitmap_path(&self) -> PathBuf {
        self.dir.join(BITMAP_FILE)
    }

    /// Write both blobs.
    pub fn save(&self, frame: &DecodedFrame) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir).map_err(|source| SinkError::Write {
            path: self.dir.clone(),
            source,
        })?;
        write_file(&self.rgb565_path(), &frame.rgb565)?;
        write_file(&self.rgb888_path(), &frame.rgb888)?;
        Ok(())
    }
}

impl FrameSink for DiskSink {
    fn on_frame(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        self.save(frame)
    }
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), SinkError> {
    fs::write(path, data).map_err(|source| SinkError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// External programs started for every saved frame.
#[derive(Debug, Clone, Default)]
pub struct RenderCommand {
    /// Converts the RGB888 blob to a bitmap:
    /// `<program> <width> <height> <input> <output>`.
    pub renderer: Option<PathBuf>,
    /// Directory holding `crop*.avs` scripts.
    pub script_dir: Option<PathBuf>,
    /// Program each crop script is opened with.
    pub player: Option<PathBuf>,
    /// Extra arguments passed to the player after the script path.
    pub player_args: Vec<String>,
}

impl RenderCommand {
    pub fn is_empty(&self) -> bool {
        self.renderer.is_none() && (self.script_dir.is_none() || self.player.is_none())
    }

    /// Start the bitmap renderer, if configured.
    pub fn render(
        &self,
        geometry: FrameGeometry,
        input: &Path,
        output: &Path,
    ) -> Result<(), SinkError> {
        let Some(program) = &self.renderer else {
            return Ok(());
        };
        let mut cmd = Command::new(program);
        cmd.arg(geometry.width().to_string())
            .arg(geometry.height().to_string())
            .arg(input)
            .arg(output);
        launch(cmd, program)
    }

    /// Crop scripts in the script directory, sorted by name.
    pub fn crop_scripts(&self) -> Vec<PathBuf> {
        let Some(dir) = &self.script_dir else {
            return Vec::new();
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "no crop scripts");
                return Vec::new();
            }
        };
        let mut scripts: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_crop_script(path))
            .collect();
        scripts.sort();
        scripts
    }

    /// Open every crop script with the player. Returns how many started.
    pub fn run_crop_scripts(&self) -> Result<usize, SinkError> {
        let Some(player) = &self.player else {
            return Ok(0);
        };
        let scripts = self.crop_scripts();
        for script in &scripts {
            let mut cmd = Command::new(player);
            cmd.arg(script).args(&self.player_args);
            launch(cmd, player)?;
        }
        Ok(scripts.len())
    }
}

fn is_crop_script(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.starts_with("crop") && name.ends_with(".avs")
}

fn launch(mut cmd: Command, program: &Path) -> Result<(), SinkError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| SinkError::Launch {
            program: program.to_path_buf(),
            source,
        })?;
    debug!(program = %program.display(), pid = child.id(), "started");
    // Reap in the background so finished children do not linger.
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

/// Announces finished frames with a datagram on a local socket.
#[derive(Debug, Clone)]
pub struct Notifier {
    path: PathBuf,
}

impl Notifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$TMPDIR/quadcam/ImageReady`.
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join("quadcam").join("ImageReady")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Send [`READY_MESSAGE`]. Fails when nobody is listening.
    #[cfg(unix)]
    pub fn notify(&self) -> Result<(), SinkError> {
        let socket = std::os::unix::net::UnixDatagram::unbound().map_err(SinkError::Notify)?;
        socket
            .send_to(READY_MESSAGE, &self.path)
            .map_err(SinkError::Notify)?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn notify(&self) -> Result<(), SinkError> {
        Err(SinkError::Notify(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "datagram notification requires unix sockets",
        )))
    }
}

/// Full per-frame handling: save, render, notify and echo console text.
pub struct CaptureSink {
    disk: DiskSink,
    render: RenderCommand,
    notifier: Option<Notifier>,
    console: Option<Box<dyn Write + Send>>,
    saved: u64,
}

impl CaptureSink {
    pub fn new(disk: DiskSink) -> Self {
        Self {
            disk,
            render: RenderCommand::default(),
            notifier: None,
            console: None,
            saved: 0,
        }
    }

    pub fn with_render(mut self, render: RenderCommand) -> Self {
        self.render = render;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Echo device console text to `out`.
    pub fn with_console(mut self, out: Box<dyn Write + Send>) -> Self {
        self.console = Some(out);
        self
    }

    /// Frames saved so far.
    pub fn saved(&self) -> u64 {
        self.saved
    }
}

impl FrameSink for CaptureSink {
    fn on_frame(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        self.disk.save(frame)?;
        self.saved += 1;
        info!(sequence = frame.sequence, dir = %self.disk.dir().display(), "image saved");

        let (input, output) = (self.disk.rgb888_path(), self.disk.bitmap_path());
        if let Err(err) = self.render.render(frame.geometry, &input, &output) {
            warn!(error = %err, "renderer not started");
        }
        match self.render.run_crop_scripts() {
            Ok(0) => {}
            Ok(n) => debug!(scripts = n, "crop scripts started"),
            Err(err) => warn!(error = %err, "crop scripts not started"),
        }

        info!("ready");

        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.notify() {
                debug!(path = %notifier.path().display(), error = %err, "no frame listener");
            }
        }
        Ok(())
    }

    fn on_text(&mut self, text: &[u8]) {
        if let Some(out) = self.console.as_mut() {
            let _ = out.write_all(text);
            let _ = out.flush();
        }
    }
}

impl std::fmt::Debug for CaptureSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSink")
            .field("disk", &self.disk)
            .field("render", &self.render)
            .field("notifier", &self.notifier)
            .field("saved", &self.saved)
            .finish_non_exhaustive()
    }
}
