use std::{path::PathBuf, process::ExitCode, time::Instant};

use rapideskew::{deskew_encoded, DeskewOptions};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args_os().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        eprintln!("usage: rapideskew <input> [output.png]");
        return ExitCode::FAILURE;
    };
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("deskewed.png"));

    let bytes = match std::fs::read(&input) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("Failed to read {}: {err}", input.display());
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let result = match deskew_encoded(&bytes, &DeskewOptions::default()) {
        Ok(result) => result,
        Err(err) => {
            log::error!("Deskew failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    log::debug!("{:?}", start.elapsed());
    log::debug!("{:#?}", result.diagnostics);

    if let Err(err) = std::fs::write(&output, &result.png) {
        log::error!("Failed to write {}: {err}", output.display());
        return ExitCode::FAILURE;
    }
    println!(
        "{}: rotated {:.2} degrees{}",
        output.display(),
        result.rotation_angle_degrees,
        match result.line_info {
            Some(line) if line.used_fallback => " (no horizontal line, used longest segment)",
            Some(_) => "",
            None => " (no lines found)",
        }
    );
    ExitCode::SUCCESS
}
