//! Dispatcher/worker message protocol.
//!
//! Frames are a little-endian `u32` body length followed by a bincode body.
//! Each channel carries at most one request at a time: the dispatcher never
//! sends a second `Command` before it has read the `Reply` to the first.

use crate::env::{EnvInfo, Frame, MultiAgentStep, Observation, ResetOptions, Value};
use crate::spaces::DynSpace;
use crate::{MarlError, Result};
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};

/// Upper bound on a single frame body
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Request sent to a worker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// One action row per agent of the slot
    Step(Array2<f32>),
    Reset {
        seed: Option<u64>,
        options: ResetOptions,
    },
    Render,
    /// Release the environment and exit; no reply
    Close,
    GetSpaces,
    EnvMethod {
        name: String,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    },
    GetAttr(String),
    SetAttr(String, Value),
    IsWrapped(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Step(_) => "step",
            Command::Reset { .. } => "reset",
            Command::Render => "render",
            Command::Close => "close",
            Command::GetSpaces => "get_spaces",
            Command::EnvMethod { .. } => "env_method",
            Command::GetAttr(_) => "get_attr",
            Command::SetAttr(..) => "set_attr",
            Command::IsWrapped(_) => "is_wrapped",
        }
    }
}

/// Reply sent back by a worker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Step(MultiAgentStep),
    Reset(Observation, EnvInfo),
    Render(Option<Frame>),
    Spaces {
        observation: DynSpace,
        action: DynSpace,
    },
    /// Result of `env_method`, `get_attr`, or the previous value for `set_attr`
    Value(Value),
    Wrapped(bool),
    /// The environment rejected the command; the worker keeps running
    Failed(String),
}

impl Reply {
    pub fn name(&self) -> &'static str {
        match self {
            Reply::Step(_) => "step",
            Reply::Reset(..) => "reset",
            Reply::Render(_) => "render",
            Reply::Spaces { .. } => "spaces",
            Reply::Value(_) => "value",
            Reply::Wrapped(_) => "wrapped",
            Reply::Failed(_) => "failed",
        }
    }
}

/// Write one length-prefixed frame and flush
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let body = bincode::serialize(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(MarlError::ShapeMismatch {
            expected: vec![MAX_FRAME_LEN],
            actual: vec![body.len()],
        });
    }
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream (no bytes of the next header).
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(MarlError::IoError(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "stream ended inside a frame header",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(MarlError::ShapeMismatch {
            expected: vec![MAX_FRAME_LEN],
            actual: vec![len],
        });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(bincode::deserialize(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};
    use std::io::Cursor;

    #[test]
    fn test_frames_in_sequence() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Command::GetSpaces).unwrap();
        write_frame(
            &mut buf,
            &Command::Step(Array2::from_shape_vec((2, 2), vec![0.1, 0.2, 0.3, 0.4]).unwrap()),
        )
        .unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame::<_, Command>(&mut cursor).unwrap(), Some(Command::GetSpaces));
        match read_frame::<_, Command>(&mut cursor).unwrap() {
            Some(Command::Step(a)) => assert_eq!(a[[1, 0]], 0.3),
            other => panic!("unexpected frame {:?}", other),
        }
        assert_eq!(read_frame::<_, Command>(&mut cursor).unwrap(), None);
    }

    #[test]
    fn test_reply_with_observation() {
        let reply = Reply::Reset(
            Observation::Tuple(vec![ArrayD::from_elem(IxDyn(&[4]), 1.5)]),
            EnvInfo::new().with_extra("seed", 3i64),
        );
        let mut buf = Vec::new();
        write_frame(&mut buf, &reply).unwrap();
        let decoded: Option<Reply> = read_frame(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, Some(reply));
    }

    #[test]
    fn test_truncated_frame_is_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Command::Render).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(read_frame::<_, Command>(&mut Cursor::new(buf.clone())).is_err());

        // half a header
        assert!(read_frame::<_, Command>(&mut Cursor::new(vec![1u8, 0])).is_err());
    }

    #[test]
    fn test_garbage_body_is_codec_error() {
        let mut buf = 2u32.to_le_bytes().to_vec();
        buf.extend_from_slice(&[0xff, 0xff]);
        let err = read_frame::<_, Command>(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, MarlError::Codec(_)));
    }
}
