//! Camera barcode scanning
//!
//! A polling loop asks a detector for a code once per frame. The first
//! detection is forwarded to the dispatcher and the camera stops; a stop
//! signal ends the loop at the next poll boundary.

use crate::domain::types::ScanEvent;
use crate::services::dispatcher::{DispatchInput, ScanClock};
use anyhow::Context;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{debug, info, warn};

#[async_trait::async_trait]
pub trait BarcodeDetector: Send {
    /// One frame's worth of detection; `None` when nothing was decoded
    async fn detect(&mut self) -> anyhow::Result<Option<String>>;
}

/// Strip the symbology prefix some decoders emit (`EAN-13:4901234567894`)
pub fn strip_symbology(line: &str) -> &str {
    let line = line.trim();
    match line.split_once(':') {
        Some((symbology, code))
            if !symbology.is_empty()
                && symbology.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-') =>
        {
            code.trim()
        }
        _ => line,
    }
}

/// Detector reading decoded lines from an external decoder process (zbarcam)
pub struct ZbarDetector {
    _child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    frame: Duration,
}

impl ZbarDetector {
    pub fn spawn(command: &str, frame: Duration) -> anyhow::Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next().context("camera command is empty")?;
        let mut child = Command::new(program)
            .args(parts)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start camera decoder '{}'", command))?;
        let stdout = child.stdout.take().context("camera decoder has no stdout")?;

        info!(command = %command, "camera_decoder_started");
        Ok(Self { _child: child, lines: BufReader::new(stdout).lines(), frame })
    }
}

#[async_trait::async_trait]
impl BarcodeDetector for ZbarDetector {
    async fn detect(&mut self) -> anyhow::Result<Option<String>> {
        match tokio::time::timeout(self.frame, self.lines.next_line()).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(line))) => {
                let code = strip_symbology(&line);
                Ok((!code.is_empty()).then(|| code.to_string()))
            }
            Ok(Ok(None)) => anyhow::bail!("camera decoder exited"),
            Ok(Err(e)) => Err(e).context("Failed to read from camera decoder"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStop {
    /// A code was forwarded
    Detected,
    /// Stop signal or dispatcher gone
    Stopped,
    Failed,
}

pub struct CameraScanner {
    detector: Box<dyn BarcodeDetector>,
    poll_interval: Duration,
    clock: ScanClock,
}

impl CameraScanner {
    pub fn new(detector: Box<dyn BarcodeDetector>, poll_interval: Duration, clock: ScanClock) -> Self {
        Self { detector, poll_interval, clock }
    }

    pub async fn run(
        mut self,
        input_tx: mpsc::Sender<DispatchInput>,
        mut stop: watch::Receiver<bool>,
    ) -> CameraStop {
        info!(poll_interval_ms = %self.poll_interval.as_millis(), "camera_started");

        loop {
            if *stop.borrow() {
                info!("camera_stopped");
                return CameraStop::Stopped;
            }

            let detected = tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        info!("camera_stopped");
                        return CameraStop::Stopped;
                    }
                    continue;
                }
                detected = self.detector.detect() => detected,
            };

            match detected {
                Ok(Some(code)) => {
                    // A stop that raced the detection wins
                    if *stop.borrow() {
                        info!("camera_stopped");
                        return CameraStop::Stopped;
                    }
                    debug!(code = %code, "camera_code_detected");
                    let event = ScanEvent::camera(code, self.clock.now_ms());
                    if input_tx.send(DispatchInput::Scan(event)).await.is_err() {
                        return CameraStop::Stopped;
                    }
                    info!("camera_stopped_after_detection");
                    return CameraStop::Detected;
                }
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(e) => {
                    warn!(error = %format!("{:#}", e), "camera_detect_failed");
                    return CameraStop::Failed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Detector replaying a fixed sequence of frames
    struct ScriptedDetector {
        frames: VecDeque<Option<String>>,
    }

    #[async_trait::async_trait]
    impl BarcodeDetector for ScriptedDetector {
        async fn detect(&mut self) -> anyhow::Result<Option<String>> {
            match self.frames.pop_front() {
                Some(frame) => Ok(frame),
                None => anyhow::bail!("no more frames"),
            }
        }
    }

    fn scanner(frames: Vec<Option<&str>>) -> CameraScanner {
        let frames = frames.into_iter().map(|f| f.map(String::from)).collect();
        CameraScanner::new(
            Box::new(ScriptedDetector { frames }),
            Duration::from_millis(1),
            ScanClock::new(),
        )
    }

    #[test]
    fn test_strip_symbology() {
        assert_eq!(strip_symbology("EAN-13:4901234567894\n"), "4901234567894");
        assert_eq!(strip_symbology("QR-Code:https://x"), "https://x");
        assert_eq!(strip_symbology("4901234567894"), "4901234567894");
        assert_eq!(strip_symbology("note: lower"), "note: lower");
    }

    #[tokio::test]
    async fn test_forwards_first_detection_and_stops() {
        let (tx, mut rx) = mpsc::channel(4);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let stop = scanner(vec![None, None, Some("4901234567894"), Some("111111")]).run(tx, stop_rx).await;

        assert_eq!(stop, CameraStop::Detected);
        match rx.recv().await {
            Some(DispatchInput::Scan(ScanEvent::Camera { code, .. })) => assert_eq!(code, "4901234567894"),
            other => panic!("unexpected input {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_before_detection_forwards_nothing() {
        let (tx, mut rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();

        let stop = scanner(vec![Some("4901234567894")]).run(tx, stop_rx).await;

        assert_eq!(stop, CameraStop::Stopped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_detector_error_ends_loop() {
        let (tx, _rx) = mpsc::channel(4);
        let (_stop_tx, stop_rx) = watch::channel(false);

        assert_eq!(scanner(vec![None]).run(tx, stop_rx).await, CameraStop::Failed);
    }
}
