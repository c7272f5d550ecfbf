//! Transcription bridge: validates an uploaded WAV, streams its PCM to the
//! external transcoder over TCP, and returns the transcript.
//!
//! Wire protocol, both directions: a 4-byte big-endian length followed by a
//! JSON event object. `audio-chunk` events additionally carry
//! `payload_length` raw little-endian PCM bytes immediately after the JSON.

use std::io::Cursor;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::WhisperConfig;

/// The only PCM shape the bridge accepts.
const REQUIRED_RATE: u32 = 16_000;
const REQUIRED_BITS: u16 = 16;
const REQUIRED_CHANNELS: u16 = 1;

/// Samples per audio-chunk frame.
const CHUNK_SAMPLES: usize = 4096;

/// Upper bound on a sane control frame; anything larger is a protocol fault.
const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug)]
pub enum TranscribeError {
    /// The transcoder could not be reached.
    Unavailable(String),
    /// The transcoder stalled past the configured deadline.
    Timeout,
    /// The transcoder spoke something other than the event protocol.
    Protocol(String),
}

#[derive(Debug)]
pub struct Transcript {
    pub text: String,
    pub duration_ms: u64,
    /// Present when the transcoder produced no text; a fake transcript is
    /// never synthesized.
    pub warning: Option<String>,
}

#[derive(Debug)]
pub struct WavAudio {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl WavAudio {
    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() as u64 * 1000) / u64::from(self.sample_rate)
    }
}

/// Decode and validate an uploaded WAV body.
pub fn parse_wav(bytes: &[u8]) -> Result<WavAudio, String> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|err| format!("not a WAV file: {err}"))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int
        || spec.bits_per_sample != REQUIRED_BITS
        || spec.sample_rate != REQUIRED_RATE
        || spec.channels != REQUIRED_CHANNELS
    {
        return Err(format!(
            "expected {REQUIRED_RATE} Hz / {REQUIRED_BITS}-bit / mono PCM, got {} Hz / {}-bit / {} channel(s)",
            spec.sample_rate, spec.bits_per_sample, spec.channels
        ));
    }

    let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    let samples = samples.map_err(|err| format!("corrupt WAV samples: {err}"))?;

    Ok(WavAudio {
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        channels: spec.channels,
        samples,
    })
}

/// Encode one control frame: length prefix plus JSON.
pub fn encode_frame(event: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(event).unwrap_or_else(|_| b"{}".to_vec());
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Encode an audio-chunk frame: the JSON header names the payload length and
/// the little-endian PCM bytes follow.
pub fn encode_audio_chunk(samples: &[i16]) -> Vec<u8> {
    let payload_length = samples.len() * 2;
    let header = json!({
        "type": "audio-chunk",
        "rate": REQUIRED_RATE,
        "width": 2,
        "channels": REQUIRED_CHANNELS,
        "payload_length": payload_length,
    });
    let mut frame = encode_frame(&header);
    frame.reserve(payload_length);
    for sample in samples {
        frame.extend_from_slice(&sample.to_le_bytes());
    }
    frame
}

/// Decode one control frame from a buffer; returns the event and the bytes
/// consumed. Only used by tests and kept in lockstep with `read_event`.
pub fn decode_frame(buf: &[u8]) -> Result<(Value, usize), String> {
    if buf.len() < 4 {
        return Err("truncated length prefix".to_string());
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(format!("frame length {len} exceeds protocol bound"));
    }
    if buf.len() < 4 + len {
        return Err("truncated frame body".to_string());
    }
    let event: Value =
        serde_json::from_slice(&buf[4..4 + len]).map_err(|err| format!("bad frame JSON: {err}"))?;
    Ok((event, 4 + len))
}

async fn read_event(stream: &mut TcpStream) -> Result<Value, TranscribeError> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|err| TranscribeError::Protocol(format!("read length: {err}")))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TranscribeError::Protocol(format!(
            "frame length {len} exceeds protocol bound"
        )));
    }

    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|err| TranscribeError::Protocol(format!("read body: {err}")))?;
    serde_json::from_slice(&body)
        .map_err(|err| TranscribeError::Protocol(format!("bad frame JSON: {err}")))
}

#[derive(Clone)]
pub struct Transcriber {
    addr: String,
    deadline: Duration,
}

impl Transcriber {
    pub fn new(config: &WhisperConfig) -> Self {
        Self {
            addr: config.url.clone(),
            deadline: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Stream the audio and wait for the transcript event. Empty transcripts
    /// come back as success with a warning, never as an invented phrase.
    pub async fn transcribe(
        &self,
        audio: &WavAudio,
        language: Option<&str>,
    ) -> Result<Transcript, TranscribeError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|err| TranscribeError::Unavailable(err.to_string()))?;

        let preamble = json!({
            "type": "transcribe",
            "language": language.unwrap_or("en"),
        });
        let start = json!({
            "type": "audio-start",
            "rate": audio.sample_rate,
            "width": audio.bits_per_sample / 8,
            "channels": audio.channels,
        });

        self.send(&mut stream, encode_frame(&preamble)).await?;
        self.send(&mut stream, encode_frame(&start)).await?;
        for chunk in audio.samples.chunks(CHUNK_SAMPLES) {
            self.send(&mut stream, encode_audio_chunk(chunk)).await?;
        }
        self.send(&mut stream, encode_frame(&json!({ "type": "audio-stop" })))
            .await?;

        loop {
            let event = tokio::time::timeout(self.deadline, read_event(&mut stream))
                .await
                .map_err(|_| TranscribeError::Timeout)??;

            match event.get("type").and_then(Value::as_str) {
                Some("transcript") => {
                    let text = event
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    let warning = text
                        .is_empty()
                        .then(|| "transcoder returned an empty transcript".to_string());
                    return Ok(Transcript {
                        text,
                        duration_ms: audio.duration_ms(),
                        warning,
                    });
                }
                // Progress events are allowed and skipped.
                Some(_) => continue,
                None => {
                    return Err(TranscribeError::Protocol(
                        "event without a type field".to_string(),
                    ));
                }
            }
        }
    }

    async fn send(&self, stream: &mut TcpStream, frame: Vec<u8>) -> Result<(), TranscribeError> {
        tokio::time::timeout(self.deadline, stream.write_all(&frame))
            .await
            .map_err(|_| TranscribeError::Timeout)?
            .map_err(|err| TranscribeError::Protocol(format!("write: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(rate: u32, bits: u16, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: bits,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for sample in samples {
                writer.write_sample(*sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn accepts_the_required_pcm_shape() {
        let bytes = wav_bytes(16_000, 16, 1, &[0, 100, -100, 32000]);
        let audio = parse_wav(&bytes).unwrap();
        assert_eq!(audio.samples, vec![0, 100, -100, 32000]);
        assert_eq!(audio.sample_rate, 16_000);
    }

    #[test]
    fn rejects_wrong_sample_rate_and_stereo() {
        let bytes = wav_bytes(44_100, 16, 1, &[0, 1]);
        let err = parse_wav(&bytes).unwrap_err();
        assert!(err.contains("44100"));

        let bytes = wav_bytes(16_000, 16, 2, &[0, 1, 2, 3]);
        let err = parse_wav(&bytes).unwrap_err();
        assert!(err.contains("2 channel"));
    }

    #[test]
    fn rejects_non_wav_bytes() {
        assert!(parse_wav(b"definitely not a wav").is_err());
    }

    #[test]
    fn duration_is_derived_from_sample_count() {
        let audio = WavAudio {
            sample_rate: 16_000,
            bits_per_sample: 16,
            channels: 1,
            samples: vec![0; 16_000],
        };
        assert_eq!(audio.duration_ms(), 1000);
    }

    #[test]
    fn control_frame_round_trips() {
        let event = json!({ "type": "transcribe", "language": "en" });
        let frame = encode_frame(&event);
        let (decoded, consumed) = decode_frame(&frame).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn audio_chunk_header_names_payload_length() {
        let frame = encode_audio_chunk(&[1, -2, 3]);
        let (header, consumed) = decode_frame(&frame).unwrap();
        assert_eq!(header["type"], "audio-chunk");
        assert_eq!(header["payload_length"], 6);
        // The PCM payload follows the JSON header.
        assert_eq!(frame.len(), consumed + 6);
        assert_eq!(&frame[consumed..consumed + 2], &1i16.to_le_bytes());
        assert_eq!(&frame[consumed + 2..consumed + 4], &(-2i16).to_le_bytes());
    }

    #[test]
    fn truncated_frames_are_detected() {
        let frame = encode_frame(&json!({ "type": "audio-stop" }));
        assert!(decode_frame(&frame[..2]).is_err());
        assert!(decode_frame(&frame[..frame.len() - 1]).is_err());
    }
}
