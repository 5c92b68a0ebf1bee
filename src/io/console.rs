use super::{IoError, Key, Viewer};
use image::RgbImage;
use log::{info, warn};
use std::io::{self, BufRead, BufReader, Stdin};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Maps a line of console input to a key.
///
/// An empty line or a space pauses/steps, `q` or `esc` quits.
pub fn parse_key(line: &str) -> Key {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Key::PauseStep;
    }
    let command = line.trim();
    if command.eq_ignore_ascii_case("q") || command.eq_ignore_ascii_case("esc") {
        return Key::Quit;
    }
    match command.chars().next() {
        Some(c) => Key::Other(c),
        None => Key::PauseStep,
    }
}

/// Terminal stand-in for a display window.
///
/// Frames are counted and optionally written to a snapshot directory. Key
/// polling with a timeout sleeps for that long and reports no key; polling
/// without a timeout blocks on a line of input. End of input quits.
pub struct ConsoleViewer<R: BufRead = BufReader<Stdin>> {
    input: R,
    snapshot_dir: Option<PathBuf>,
    shown: usize,
}

impl ConsoleViewer {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }
}

impl<R: BufRead> ConsoleViewer<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            snapshot_dir: None,
            shown: 0,
        }
    }

    /// Writes every shown frame as `frame_NNNNNN.png` into `dir`.
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn frames_shown(&self) -> usize {
        self.shown
    }
}

impl<R: BufRead> Viewer for ConsoleViewer<R> {
    fn show(&mut self, frame: &RgbImage) -> Result<(), IoError> {
        if let Some(dir) = &self.snapshot_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("frame_{:06}.png", self.shown));
            frame.save(&path)?;
        }
        self.shown += 1;
        Ok(())
    }

    fn poll_key(&mut self, timeout: Option<Duration>) -> Option<Key> {
        if let Some(wait) = timeout {
            thread::sleep(wait);
            return None;
        }

        info!("Paused: <enter> to step, 'q' to quit, anything else to resume");
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => Some(Key::Quit),
            Ok(_) => Some(parse_key(&line)),
            Err(e) => {
                warn!("Failed to read console input: {e}");
                Some(Key::Quit)
            }
        }
    }
}
