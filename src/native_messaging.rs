use anyhow::anyhow;
use log::{debug, warn};
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::protocol::protocol::{ClientMessage, ServerMessage};
use crate::provider::segment::SegmentProvider;
use crate::session::session::{SessionDefaults, create_outbound_channel, spawn_session};

/// Chrome refuses host messages larger than 1 MiB.
pub const MAX_OUTGOING_BYTES: usize = 1024 * 1024;
/// Chrome never sends more than 64 MiB in one message.
pub const MAX_INCOMING_BYTES: usize = 64 * 1024 * 1024;

/// Read one frame using the Chrome native messaging protocol.
/// Frames are prefixed with a 4-byte length in native byte order.
/// Returns `None` once the browser closes the pipe.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut length_bytes = [0u8; 4];

    match reader.read_exact(&mut length_bytes) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Ok(None);
        }
        Err(e) => return Err(e),
    }

    let length = u32::from_ne_bytes(length_bytes) as usize;
    if length > MAX_INCOMING_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", length),
        ));
    }

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer)?;
    Ok(Some(buffer))
}

pub fn decode_message(frame: &[u8]) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_slice(frame)
}

/// Write one message using the Chrome native messaging protocol.
pub fn write_message<W: Write>(writer: &mut W, message: &ServerMessage) -> io::Result<()> {
    let json = serde_json::to_vec(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if json.len() > MAX_OUTGOING_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message of {} bytes exceeds the 1 MiB host limit", json.len()),
        ));
    }

    let length_bytes = (json.len() as u32).to_ne_bytes();
    writer.write_all(&length_bytes)?;
    writer.write_all(&json)?;
    writer.flush()?;

    Ok(())
}

/// Serves one practice session over stdin/stdout until the browser hangs up.
pub async fn run_native_host(provider: Arc<SegmentProvider>, defaults: SessionDefaults) -> anyhow::Result<()> {
    serve_streams(io::stdin(), io::stdout(), provider, defaults).await
}

/// Runs a session over any framed byte streams; returns once `input` hits EOF
/// and every reply has been written.
pub async fn serve_streams<R, W>(
    mut input: R,
    mut out: W,
    provider: Arc<SegmentProvider>,
    defaults: SessionDefaults,
) -> anyhow::Result<()>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let (outbox, mut replies) = create_outbound_channel();
    let (session, session_task) = spawn_session(provider, defaults, outbox.clone());

    let writer = std::thread::spawn(move || -> io::Result<()> {
        while let Some(reply) = replies.blocking_recv() {
            match write_message(&mut out, &reply) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    warn!("Dropping reply: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    });

    let reader = tokio::task::spawn_blocking(move || -> io::Result<()> {
        while let Some(frame) = read_frame(&mut input)? {
            match decode_message(&frame) {
                Ok(message) => {
                    if session.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to parse native message: {}", e);
                    let _ = outbox.send(ServerMessage::invalid_input(format!("Parse error: {}", e)));
                }
            }
        }
        debug!("Native messaging input closed");
        Ok(())
    });

    let read_result = reader.await?;
    session_task.await?;
    writer
        .join()
        .map_err(|_| anyhow!("native messaging writer thread panicked"))??;
    read_result?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config::ScheduleConfig;
    use crate::provider::segment::fakes::provider;
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut bytes = (body.len() as u32).to_ne_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn frames_are_read_in_sequence() {
        let mut bytes = frame(br#"{"type":"resume"}"#);
        bytes.extend(frame(br#"{"type":"play","currentTime":4.5}"#));
        let mut reader = Cursor::new(bytes);

        let first = read_frame(&mut reader).unwrap().unwrap();
        assert_eq!(decode_message(&first).unwrap(), ClientMessage::Resume);
        let second = read_frame(&mut reader).unwrap().unwrap();
        assert_eq!(
            decode_message(&second).unwrap(),
            ClientMessage::Play { current_time: 4.5 }
        );
        assert!(read_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn bad_json_leaves_stream_aligned() {
        let mut bytes = frame(b"not json");
        bytes.extend(frame(br#"{"type":"ended"}"#));
        let mut reader = Cursor::new(bytes);

        let bad = read_frame(&mut reader).unwrap().unwrap();
        assert!(decode_message(&bad).is_err());
        let good = read_frame(&mut reader).unwrap().unwrap();
        assert_eq!(decode_message(&good).unwrap(), ClientMessage::Ended);
    }

    #[test]
    fn truncated_body_is_an_error() {
        let mut bytes = frame(br#"{"type":"ended"}"#);
        bytes.truncate(bytes.len() - 3);
        assert!(read_frame(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn oversized_length_is_rejected() {
        let bytes = ((MAX_INCOMING_BYTES + 1) as u32).to_ne_bytes().to_vec();
        let err = read_frame(&mut Cursor::new(bytes)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn written_message_is_length_prefixed() {
        let mut out = Vec::new();
        write_message(&mut out, &ServerMessage::Pause { at_time: 12.0 }).unwrap();

        let length = u32::from_ne_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(length, out.len() - 4);
        let json: serde_json::Value = serde_json::from_slice(&out[4..]).unwrap();
        assert_eq!(json["type"], "pause");
        assert_eq!(json["atTime"], 12.0);
    }

    #[tokio::test]
    async fn host_replies_and_finishes_on_eof() {
        let mut input = frame(br#"{"type":"checkSimilarity","original":"Hola","spoken":"hola"}"#);
        input.extend(frame(b"garbage"));
        input.extend(frame(br#"{"type":"startSession","videoId":"dQw4w9WgXcQ"}"#));
        let output = SharedOutput::default();
        let defaults = SessionDefaults {
            language: "es-ES".to_string(),
            schedule: ScheduleConfig::new(30, 59).unwrap(),
        };

        serve_streams(
            Cursor::new(input),
            output.clone(),
            Arc::new(provider(&["hello"])),
            defaults,
        )
        .await
        .unwrap();

        let written = output.0.lock().unwrap().clone();
        let mut reader = Cursor::new(written);
        let mut types = Vec::new();
        while let Some(frame) = read_frame(&mut reader).unwrap() {
            let json: serde_json::Value = serde_json::from_slice(&frame).unwrap();
            types.push(json["type"].as_str().unwrap().to_string());
        }
        // The parse error is reported from the reader, so it may overtake
        // replies the session has not produced yet.
        assert_eq!(types.len(), 4, "{:?}", types);
        assert!(types.contains(&"error".to_string()));
        let session_replies: Vec<&str> = types
            .iter()
            .map(String::as_str)
            .filter(|t| *t != "error")
            .collect();
        assert_eq!(session_replies, ["similarity", "scheduled", "summary"]);
    }
}
