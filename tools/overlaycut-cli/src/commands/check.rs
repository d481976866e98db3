//! Check export capabilities.

use overlaycut_render_engine::RuntimeCapabilities;

pub fn run() -> anyhow::Result<()> {
    println!("overlaycut System Check");
    println!("{}", "=".repeat(50));

    let caps = RuntimeCapabilities::detect();
    let mark = |ok: bool| if ok { "[OK]  " } else { "[MISS]" };

    println!("{} Transcoder (ffmpeg)", mark(caps.has_transcoder));
    println!(
        "{} Frame codec access (ffmpeg + ffprobe)",
        mark(caps.has_frame_codec_access)
    );

    println!();
    if caps.has_frame_codec_access {
        println!("Overlay exports run on the streaming backend.");
    } else if caps.has_transcoder {
        println!("Trim-only exports are available; overlay exports are not.");
    } else {
        println!("No export backend is available. Install ffmpeg.");
    }

    Ok(())
}
