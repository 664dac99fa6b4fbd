//! Scripted loopback server.
//!
//! Tests drive the engine against a transcript instead of a live chess
//! server: a [`ScriptServer`] binds a loopback listener, accepts one
//! connection, and plays its [`ScriptStep`]s in order — sending prompts,
//! rows and raw telnet bytes, and asserting on the lines the client sends.
//! After the script completes the connection is held open (draining
//! whatever else the client writes) until the client disconnects, so
//! engines can keep issuing commands past the scripted portion.
//!
//! The server writes lines with the `LF CR` terminator the real protocol
//! uses; the engine's transport swaps the endings back.

use std::{io, net::SocketAddr};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tracing::debug;

/// Line terminator as the server sends it.
const SERVER_LINE_ENDING: &[u8] = b"\n\r";

/// One step of a server transcript.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Send text verbatim, no terminator (prompts such as `login: `).
    Send(String),
    /// Send one line, terminated the way the server terminates lines.
    SendLine(String),
    /// Send raw bytes (telnet negotiation sequences).
    SendRaw(Vec<u8>),
    /// Read one line from the client and require this exact content.
    ExpectLine(String),
    /// Read exactly this many raw bytes and require this exact content.
    ExpectRaw(Vec<u8>),
}

/// A one-connection scripted server.
pub struct ScriptServer {
    addr: SocketAddr,
    task: JoinHandle<Result<(), String>>,
}

impl ScriptServer {
    /// Bind a loopback listener and start playing the script against the
    /// first connection.
    pub async fn start(script: Vec<ScriptStep>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(run_script(listener, script));
        Ok(Self { addr, task })
    }

    /// The server's loopback port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the script to finish; `Err` carries the first expectation
    /// that failed.
    pub async fn finished(self) -> Result<(), String> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(format!("script task failed: {e}")),
        }
    }
}

/// Accept one connection and play the script.
async fn run_script(listener: TcpListener, script: Vec<ScriptStep>) -> Result<(), String> {
    let (mut stream, peer) =
        listener.accept().await.map_err(|e| format!("accept failed: {e}"))?;
    debug!(%peer, "client connected");

    for (index, step) in script.into_iter().enumerate() {
        run_step(&mut stream, &step)
            .await
            .map_err(|e| format!("script step {index} ({step:?}): {e}"))?;
    }

    // Script done; drain until the client hangs up so late commands do not
    // observe a surprise EOF.
    let mut sink = [0u8; 256];
    loop {
        match stream.read(&mut sink).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {},
        }
    }
    Ok(())
}

/// Play one step.
async fn run_step(stream: &mut TcpStream, step: &ScriptStep) -> Result<(), String> {
    match step {
        ScriptStep::Send(text) => {
            stream.write_all(text.as_bytes()).await.map_err(|e| e.to_string())
        },
        ScriptStep::SendLine(line) => {
            let mut bytes = line.clone().into_bytes();
            bytes.extend_from_slice(SERVER_LINE_ENDING);
            stream.write_all(&bytes).await.map_err(|e| e.to_string())
        },
        ScriptStep::SendRaw(bytes) => {
            stream.write_all(bytes).await.map_err(|e| e.to_string())
        },
        ScriptStep::ExpectLine(expected) => {
            let line = read_line(stream).await?;
            if line == *expected {
                Ok(())
            } else {
                Err(format!("expected line {expected:?}, got {line:?}"))
            }
        },
        ScriptStep::ExpectRaw(expected) => {
            let mut got = vec![0u8; expected.len()];
            stream.read_exact(&mut got).await.map_err(|e| e.to_string())?;
            if got == *expected {
                Ok(())
            } else {
                Err(format!("expected bytes {expected:?}, got {got:?}"))
            }
        },
    }
}

/// Read one client line (terminated by `\n`).
async fn read_line(stream: &mut TcpStream) -> Result<String, String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.map_err(|e| e.to_string())?;
        if n == 0 {
            return Err("client closed while a line was expected".to_string());
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    String::from_utf8(line).map_err(|e| e.to_string())
}
