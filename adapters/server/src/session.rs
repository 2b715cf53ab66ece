//! Per-connection dispatch loop.

use std::io::{self, BufRead, Read, Write};

use tracing::{debug, info, warn};

use crate::{
    engine::{EndOutcome, SharedEngine},
    protocol::{self, ProtocolError, Request, Response},
    SessionError,
};

/// Longest request line accepted, terminator included.
pub const MAX_LINE_BYTES: u64 = 4096;

/// How a session finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent `QUIT`.
    Quit,
    /// The peer closed its side of the stream.
    Disconnected,
}

/// Serves one peer until it quits or disconnects.
///
/// Sends the greeting, then answers one request per line in order. Request
/// failures are reported as `ERR <reason>` and the session continues; only
/// transport errors end it early.
pub fn serve<R, W>(
    engine: &SharedEngine,
    server_name: &str,
    mut reader: R,
    mut writer: W,
) -> io::Result<SessionEnd>
where
    R: BufRead,
    W: Write,
{
    send(
        &mut writer,
        &Response::Hello {
            server_name: server_name.to_owned(),
        },
    )?;

    let mut buffer = Vec::new();
    loop {
        let line = match read_request(&mut reader, &mut buffer)? {
            Incoming::Line(line) => line,
            Incoming::TooLong => {
                let error = ProtocolError::LineTooLong {
                    limit: MAX_LINE_BYTES,
                };
                warn!(%error, "request rejected");
                send_error(&mut writer, &SessionError::from(error))?;
                continue;
            }
            Incoming::Closed => return Ok(SessionEnd::Disconnected),
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match protocol::parse(&line) {
            Ok(request) => request,
            Err(error) => {
                warn!(line = line.trim_end(), %error, "request rejected");
                send_error(&mut writer, &error)?;
                continue;
            }
        };

        let keyword = request.keyword();
        debug!(command = keyword, "dispatching request");
        match dispatch(engine, request, &mut writer) {
            Ok(Some(Response::Bye)) => {
                send(&mut writer, &Response::Bye)?;
                return Ok(SessionEnd::Quit);
            }
            Ok(Some(response)) => send(&mut writer, &response)?,
            Ok(None) => {}
            Err(SessionError::Io(error)) => return Err(error),
            Err(error) => {
                warn!(command = keyword, %error, "request failed");
                send_error(&mut writer, &error)?;
            }
        }
    }
}

enum Incoming {
    Line(String),
    TooLong,
    Closed,
}

/// Reads one line of at most [`MAX_LINE_BYTES`]. Bytes that are not UTF-8
/// are replaced, so they surface as an unknown command.
fn read_request<R: BufRead>(reader: &mut R, buffer: &mut Vec<u8>) -> io::Result<Incoming> {
    buffer.clear();
    let read = reader
        .by_ref()
        .take(MAX_LINE_BYTES)
        .read_until(b'\n', buffer)?;
    if read == 0 {
        return Ok(Incoming::Closed);
    }
    if buffer.last() != Some(&b'\n') && read as u64 == MAX_LINE_BYTES {
        skip_line(reader)?;
        return Ok(Incoming::TooLong);
    }
    Ok(Incoming::Line(String::from_utf8_lossy(buffer).into_owned()))
}

fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let (used, done) = {
            let available = reader.fill_buf()?;
            match available.iter().position(|byte| *byte == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), available.is_empty()),
            }
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}

fn dispatch<W: Write>(
    engine: &SharedEngine,
    request: Request,
    writer: &mut W,
) -> Result<Option<Response>, SessionError> {
    let response = match request {
        Request::NewSim(new_sim) => {
            let replications_done = engine.new_simulation(new_sim)?;
            info!(replications_done, "simulation created");
            Response::Replicated {
                command: "NEW_SIM",
                replications_done,
            }
        }
        Request::ResumeSim {
            path,
            replications,
            result_path,
        } => {
            let replications_done = engine.resume_simulation(&path, replications, result_path)?;
            info!(path = %path.display(), replications_done, "simulation resumed");
            Response::Replicated {
                command: "RESUME_SIM",
                replications_done,
            }
        }
        Request::RunMore { replications } => Response::Replicated {
            command: "RUN_MORE",
            replications_done: engine.run_more(replications)?,
        },
        Request::SetMode(mode) => {
            engine.set_display_mode(mode);
            Response::ModeSet
        }
        Request::Summary(kind) => {
            engine.write_summary(kind, writer)?;
            return Ok(None);
        }
        Request::EndSim => {
            match engine.end_simulation() {
                EndOutcome::NoSimulation => {}
                EndOutcome::Saved { path } => {
                    info!(path = %path.display(), "simulation ended");
                }
                EndOutcome::SaveFailed { path, error } => {
                    warn!(path = %path.display(), %error, "simulation ended without snapshot");
                }
            }
            Response::Ended
        }
        Request::Quit => Response::Bye,
    };

    Ok(Some(response))
}

fn send<W: Write>(writer: &mut W, response: &Response) -> io::Result<()> {
    writeln!(writer, "{response}")?;
    writer.flush()
}

fn send_error<W: Write>(writer: &mut W, error: &SessionError) -> io::Result<()> {
    let reason = error
        .to_string()
        .replace(|symbol: char| symbol == '\r' || symbol == '\n', " ");
    writeln!(writer, "ERR {reason}")?;
    writer.flush()
}
