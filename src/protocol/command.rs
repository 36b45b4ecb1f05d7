//! Typed command vocabulary.
//!
//! Peer to local: `startfilm`, `stopfilm`, `gainchange,<f>`, `showgain,<0|1>`,
//! `lockupdate,<offset>,<sum>`.
//!
//! Local to peer: touch actions with normalized coordinates, focus and lock
//! buttons, `record`, and the flow-control replies `ack` / `newimage`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Command received from the peer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerCommand {
    /// Recording started.
    StartFilm,
    /// Recording stopped.
    StopFilm,
    /// Display gain multiplier changed.
    GainChange(f32),
    /// Whether the gain overlay should be shown.
    ShowGain(bool),
    /// Focus lock readout.
    LockUpdate { offset: f32, sum: f32 },
}

impl PeerCommand {
    /// Parse a command from the tokens of a text frame.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        let verb: &str = tokens.first().map(AsRef::<str>::as_ref).unwrap_or("");
        let args: &[S] = tokens.get(1..).unwrap_or(&[]);

        match verb {
            "startfilm" => Ok(PeerCommand::StartFilm),
            "stopfilm" => Ok(PeerCommand::StopFilm),
            "gainchange" => Ok(PeerCommand::GainChange(arg(verb, args, 0)?)),
            "showgain" => {
                let flag: i32 = arg(verb, args, 0)?;
                Ok(PeerCommand::ShowGain(flag != 0))
            }
            "lockupdate" => Ok(PeerCommand::LockUpdate {
                offset: arg(verb, args, 0)?,
                sum: arg(verb, args, 1)?,
            }),
            other => Err(LinkError::UnknownCommand(other.to_string())),
        }
    }
}

fn arg<T: FromStr, S: AsRef<str>>(verb: &str, args: &[S], index: usize) -> Result<T> {
    let raw = args
        .get(index)
        .map(|s| AsRef::<str>::as_ref(s).trim())
        .ok_or_else(|| LinkError::MalformedCommand(format!("{verb}: missing argument {index}")))?;
    raw.parse()
        .map_err(|_| LinkError::MalformedCommand(format!("{verb}: bad argument {raw:?}")))
}

/// Command sent to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalCommand {
    /// Touch began at normalized `(x, y)`.
    ActionDown { x: f32, y: f32 },
    /// Touch moved to normalized `(x, y)`.
    ActionMove { x: f32, y: f32 },
    /// Touch ended at normalized `(x, y)`.
    ActionUp { x: f32, y: f32 },
    FocusDown,
    FocusUp,
    LockClick,
    Record,
    /// Acknowledge the last text command.
    Ack,
    /// Request the next image.
    NewImage,
}

impl LocalCommand {
    /// Encode as wire text (without terminator).
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LocalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalCommand::ActionDown { x, y } => write!(f, "actiondown,{x:.3},{y:.3}"),
            LocalCommand::ActionMove { x, y } => write!(f, "actionmove,{x:.3},{y:.3}"),
            LocalCommand::ActionUp { x, y } => write!(f, "actionup,{x:.3},{y:.3}"),
            LocalCommand::FocusDown => f.write_str("focusdown"),
            LocalCommand::FocusUp => f.write_str("focusup"),
            LocalCommand::LockClick => f.write_str("lockclick"),
            LocalCommand::Record => f.write_str("record"),
            LocalCommand::Ack => f.write_str("ack"),
            LocalCommand::NewImage => f.write_str("newimage"),
        }
    }
}
