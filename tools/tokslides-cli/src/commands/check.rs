//! Check recording capabilities.

use tokslides_capture_engine::backend::{command_exists, FfmpegDevices, InputPlatform};
use tokslides_capture_engine::{Lease, MediaDevices};
use tokslides_common::config::{config_file_path, AppConfig};

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("TokSlides System Check");
    println!("{}", "=".repeat(50));
    println!("Config:    {}", config_file_path().display());
    println!("Projects:  {}", config.projects_file().display());
    println!("Downloads: {}", config.downloads_dir.display());
    println!();

    let Some(platform) = InputPlatform::current() else {
        println!("[FAIL] Unsupported platform: no camera or microphone input available");
        return Ok(());
    };
    println!(
        "[OK] Platform inputs: video {}, audio {}",
        platform.video_format(),
        platform.audio_format()
    );

    let ffmpeg = command_exists("ffmpeg");
    if ffmpeg {
        println!("[OK] ffmpeg found");
    } else {
        println!("[FAIL] ffmpeg not found on PATH (required for camera, microphone and encoding)");
    }

    let devices = FfmpegDevices::new(platform, &config.recording);
    match devices.enumerate_cameras().await {
        Ok(cameras) if cameras.is_empty() => println!("[WARN] No cameras detected"),
        Ok(cameras) => {
            println!("[OK] Cameras detected: {}", cameras.len());
            for camera in &cameras {
                println!("     {} ({})", camera.label, camera.id);
            }
        }
        Err(e) => println!("[WARN] Camera enumeration failed: {e}"),
    }

    match devices.acquire_microphone().await {
        Ok(track) => {
            let track = Lease::new(track);
            println!("[OK] Microphone: {}", track.label());
            track.release();
        }
        Err(e) if e.is_permission_denied() => {
            println!("[WARN] Microphone access denied; recordings will be video only")
        }
        Err(e) => println!("[WARN] Microphone unavailable ({e}); recordings will be video only"),
    }

    println!();
    if ffmpeg {
        println!("TokSlides is ready to record.");
    } else {
        println!("Install ffmpeg to record. Snapshots and project management still work.");
    }

    Ok(())
}
