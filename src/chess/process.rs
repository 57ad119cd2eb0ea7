//! A running UCI engine: spawning, handshake, commands and output parsing.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, error, info, warn};
use shakmaty::Color;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use vampirc_uci::{uci::ScoreValue, UciInfoAttribute, UciMessage};

use crate::error::Error;

use super::types::Evaluation;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

const UCI_TIMEOUT: Duration = Duration::from_secs(10);
const READY_TIMEOUT: Duration = Duration::from_secs(5);
const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

pub type EngineReader = Lines<BufReader<ChildStdout>>;

/// A running UCI engine. Its stdout is handed out separately as an [`EngineReader`].
pub struct EngineProcess {
    child: Child,
    stdin: ChildStdin,
}

fn spawn_engine(path: &Path) -> Result<(Child, ChildStdin, EngineReader), Error> {
    if !path.exists() {
        return Err(Error::EngineNotFound(path.to_path_buf()));
    }
    let mut command = Command::new(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        command.current_dir(parent);
    }
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(target_os = "windows")]
    command.creation_flags(CREATE_NO_WINDOW);

    let mut child = command.spawn()?;
    info!("Starting engine process: {:?}", path);
    let stdin = child.stdin.take().ok_or(Error::NoStdin)?;
    let stdout = child.stdout.take().ok_or(Error::NoStdout)?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                error!("[engine-stderr] {}", line);
            }
        });
    }
    Ok((child, stdin, BufReader::new(stdout).lines()))
}

/// Read engine output until `expected` shows up.
async fn wait_for(
    reader: &mut EngineReader,
    expected: &str,
    limit: Duration,
) -> Result<(), Error> {
    let received = tokio::time::timeout(limit, async {
        while let Some(line) = reader.next_line().await? {
            debug!("[engine-stdout] {}", line);
            if line.trim() == expected {
                return Ok::<_, Error>(true);
            }
        }
        Ok(false)
    })
    .await;

    match received {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(Error::EngineInitFailed(format!(
            "Engine closed before sending {}",
            expected
        ))),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(Error::EngineTimeout(format!(
            "Engine did not answer with {}",
            expected
        ))),
    }
}

impl EngineProcess {
    /// Spawn the engine and run the `uci` / `isready` handshake.
    ///
    /// # Errors
    /// Returns `Error::EngineNotFound` for a missing binary and
    /// `Error::EngineTimeout` if the engine doesn't answer in time.
    pub async fn new(path: &Path) -> Result<(Self, EngineReader), Error> {
        let (child, stdin, mut reader) = spawn_engine(path)?;
        let mut process = Self { child, stdin };

        process.send("uci\n").await?;
        wait_for(&mut reader, "uciok", UCI_TIMEOUT).await?;
        process.send("isready\n").await?;
        wait_for(&mut reader, "readyok", READY_TIMEOUT).await?;

        Ok((process, reader))
    }

    async fn send(&mut self, msg: &str) -> Result<(), Error> {
        debug!("[engine-stdin] {}", msg.trim_end());
        self.stdin.write_all(msg.as_bytes()).await?;
        Ok(())
    }

    /// Set a single UCI option for the engine.
    pub async fn set_option<T>(&mut self, name: &str, value: T) -> Result<(), Error>
    where
        T: std::fmt::Display,
    {
        self.send(&format!("setoption name {} value {}\n", name, value))
            .await
    }

    pub async fn set_position(&mut self, fen: &str) -> Result<(), Error> {
        self.send(&format!("position fen {}\n", fen)).await
    }

    /// Start a search to a fixed depth.
    pub async fn go(&mut self, depth: u32) -> Result<(), Error> {
        self.send(&format!("go depth {}\n", depth)).await
    }

    pub async fn stop(&mut self) -> Result<(), Error> {
        self.send("stop\n").await
    }

    /// Send `quit` and wait briefly, then force-kill.
    pub async fn kill(&mut self) -> Result<(), Error> {
        if let Err(e) = self.send("quit\n").await {
            warn!("Failed to send quit command to engine: {}", e);
        }

        match tokio::time::timeout(QUIT_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!("Engine process exited with status: {:?}", status);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Error waiting for engine process: {}", e);
                self.child.kill().await?;
                Ok(())
            }
            Err(_) => {
                warn!("Engine did not exit gracefully, force-killing");
                self.child.kill().await?;
                let _ = self.child.wait().await;
                Ok(())
            }
        }
    }
}

/// Search depth and score from an `info` line, with the score turned to
/// White's point of view. `turn` is the side to move in the searched position.
pub fn parse_evaluation(line: &str, turn: Color) -> Option<(u32, Evaluation)> {
    let UciMessage::Info(attrs) = vampirc_uci::parse_one(line) else {
        return None;
    };
    let mut depth = 0;
    let mut evaluation = None;
    for attr in attrs {
        match attr {
            UciInfoAttribute::Depth(d) => depth = d as u32,
            UciInfoAttribute::Score(score) => {
                evaluation = Some(match score.value {
                    ScoreValue::Cp(cp) => Evaluation::Centipawns(cp as i32),
                    ScoreValue::Mate(n) => Evaluation::Mate(n as i32),
                });
            }
            _ => {}
        }
    }
    let evaluation = evaluation?;
    Some(match turn {
        Color::White => (depth, evaluation),
        Color::Black => (depth, evaluation.inverted()),
    })
}

/// The move of a `bestmove` line, in UCI form.
pub fn parse_best_move(line: &str) -> Option<String> {
    match vampirc_uci::parse_one(line) {
        UciMessage::BestMove { best_move, .. } => Some(best_move.to_string()),
        _ => None,
    }
}
