use std::{borrow::Cow, collections::BTreeMap, io};

use crate::{
    Deserialize, Serialize,
    specs::{preprocessing::BundleSpec, training::FitSpec},
};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR_KIND: Header = 0;
const CONTROL_KIND: Header = 1;
const PARAMS_KIND: Header = 2;

/// Named scalar metrics reported by a client, ordered so that logs and tests are stable.
pub type Metrics = BTreeMap<String, f32>;

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug)]
pub enum Payload<'a> {
    /// Every tensor of a parameter vector flattened and concatenated in order.
    Params(&'a [f32]),
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// First message of a client, announces its identity.
    Join { client_id: String },
    /// Accepts a client and hands it the fitted preprocessors for the run.
    Welcome { bundle: BundleSpec },
    /// Asks a client to train from the parameters that follow in a `Data` frame.
    Fit {
        round: usize,
        config: FitSpec,
        shapes: Vec<Vec<usize>>,
    },
    /// Header of a client update, its parameters follow in a `Data` frame.
    FitRes {
        sample_count: usize,
        metrics: Metrics,
        shapes: Vec<Vec<usize>>,
        fingerprint: String,
    },
    /// Asks a client to evaluate the parameters that follow in a `Data` frame.
    Evaluate {
        round: usize,
        shapes: Vec<Vec<usize>>,
    },
    EvaluateRes {
        loss: f32,
        sample_count: usize,
        metrics: Metrics,
    },
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// Returns a short name for the kind of this message, used on protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::Join { .. }) => "control/join",
            Msg::Control(Command::Welcome { .. }) => "control/welcome",
            Msg::Control(Command::Fit { .. }) => "control/fit",
            Msg::Control(Command::FitRes { .. }) => "control/fit_res",
            Msg::Control(Command::Evaluate { .. }) => "control/evaluate",
            Msg::Control(Command::EvaluateRes { .. }) => "control/evaluate_res",
            Msg::Control(Command::Disconnect) => "control/disconnect",
            Msg::Data(Payload::Params(_)) => "data/params",
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {kind}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_KIND.to_be_bytes());
                Ok(Some(e.as_bytes()))
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_KIND.to_be_bytes());
                serde_json::to_writer(buf, cmd)?;
                Ok(None)
            }
            Msg::Data(Payload::Params(params)) => {
                buf.extend_from_slice(&PARAMS_KIND.to_be_bytes());
                Ok(Some(bytemuck::cast_slice(params)))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);
        let mut header = [0; HEADER_SIZE];
        header.copy_from_slice(kind_buf);

        match Header::from_be_bytes(header) {
            ERR_KIND => {
                let text = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(text)))
            }
            CONTROL_KIND => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            PARAMS_KIND => {
                let params = bytemuck::try_cast_slice(rest).map_err(|err| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("params payload of {} bytes is not a f32 slice: {err}", rest.len()),
                    )
                })?;

                Ok(Self::Data(Payload::Params(params)))
            }
            kind => Self::invalid_kind(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specs::training::FitSpec;

    fn roundtrip(msg: &Msg<'_>) -> Vec<f32> {
        let mut buf = Vec::new();
        let tail = msg.serialize(&mut buf).unwrap();
        buf.extend_from_slice(tail.unwrap_or_default());

        // Copy into an f32 backed buffer so the params payload is aligned.
        let mut aligned = vec![0f32; buf.len().div_ceil(4)];
        bytemuck::cast_slice_mut::<f32, u8>(&mut aligned)[..buf.len()].copy_from_slice(&buf);
        aligned
    }

    #[test]
    fn control_survives_serialization() {
        let cmd = Command::Fit {
            round: 2,
            config: FitSpec::default(),
            shapes: vec![vec![2, 3], vec![3]],
        };

        let msg = Msg::Control(cmd.clone());
        let mut buf = Vec::new();
        assert!(msg.serialize(&mut buf).unwrap().is_none());

        match Msg::deserialize(&buf).unwrap() {
            Msg::Control(got) => assert_eq!(got, cmd),
            other => panic!("unexpected msg: {other:?}"),
        }
    }

    #[test]
    fn params_are_read_back_in_place() {
        let params = [1.0, -2.5, 3.25];
        let aligned = roundtrip(&Msg::Data(Payload::Params(&params)));
        let bytes: &[u8] = bytemuck::cast_slice(&aligned);

        match Msg::deserialize(&bytes[..HEADER_SIZE + 12]).unwrap() {
            Msg::Data(Payload::Params(got)) => assert_eq!(got, params),
            other => panic!("unexpected msg: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let buf = 9u32.to_be_bytes();
        assert!(Msg::deserialize(&buf).is_err());
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(Msg::deserialize(&[0, 1]).is_err());
    }
}
