//! Scan a recorded stream with the async marker codec.
//!
//! Run with:
//!   cargo run --example async-scan --features async -- capture.bin

use futures_util::StreamExt;
use quadcam::frame::{AssemblerEvent, MarkerCodec};
use tokio_util::codec::FramedRead;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("usage: async-scan <capture>")?;
    let file = tokio::fs::File::open(&path).await?;

    let mut events = FramedRead::new(file, MarkerCodec::new());
    let mut text = Vec::new();
    while let Some(event) = events.next().await {
        match event? {
            AssemblerEvent::Text(bytes) => text.extend_from_slice(&bytes),
            AssemblerEvent::FrameStarted { sequence } => eprintln!("frame {sequence} started"),
            AssemblerEvent::FrameCompleted(frame) => {
                println!("frame {}: {} bytes", frame.sequence, frame.payload.len())
            }
            AssemblerEvent::FrameDiscarded { reason, dropped } => {
                println!("discarded ({reason:?}): {dropped} bytes")
            }
        }
    }

    eprintln!("console text: {}", String::from_utf8_lossy(&text));
    Ok(())
}
