//! Wire frames exchanged with the master.
//!
//! | Frame   | Bytes | Layout                                                    |
//! |---------|-------|-----------------------------------------------------------|
//! | Command | 5     | `C0 ch cmd param_hi param_lo`                              |
//! | Data    | 4+2N  | `DA ch N_hi N_lo s0_lo s0_hi … s(N-1)_lo s(N-1)_hi`         |
//!
//! Frame boundaries come from the select line, so a captured span may be
//! longer than the frame it carries (trailing bytes are ignored) but never
//! shorter. Parsing validates structure only; the channel byte is checked
//! by the dispatcher.

use platform::stream_config::{BUFFER_CAPACITY, COMMAND_FRAME_LEN, DATA_HEADER_LEN};

/// First byte of a command frame.
pub const COMMAND_HEADER: u8 = 0xC0;

/// First byte of a data frame.
pub const DATA_HEADER: u8 = 0xDA;

/// Command codes carried in byte 2 of a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// `0x01`: start output from the active buffer.
    Play,
    /// `0x02`: stop output.
    Stop,
    /// `0x03`: set volume from `param` (clamped to 100).
    Volume,
    /// `0xFF`: stop and reinitialise the channel.
    Reset,
    /// Anything else; counted and ignored.
    Unknown(u8),
}

impl Command {
    /// Decode a command byte.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::Play,
            0x02 => Self::Stop,
            0x03 => Self::Volume,
            0xFF => Self::Reset,
            other => Self::Unknown(other),
        }
    }

    /// Encode to the command byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Play => 0x01,
            Self::Stop => 0x02,
            Self::Volume => 0x03,
            Self::Reset => 0xFF,
            Self::Unknown(other) => other,
        }
    }
}

/// Decoded command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandFrame {
    /// Raw channel byte, not yet validated.
    pub channel: u8,
    /// Command code.
    pub command: Command,
    /// Big-endian parameter; volume percent for VOLUME, zero otherwise.
    pub param: u16,
}

impl CommandFrame {
    /// Command frame with a zero parameter.
    #[must_use]
    pub const fn new(channel: u8, command: Command) -> Self {
        Self {
            channel,
            command,
            param: 0,
        }
    }

    /// VOLUME command frame.
    #[must_use]
    pub const fn volume(channel: u8, percent: u16) -> Self {
        Self {
            channel,
            command: Command::Volume,
            param: percent,
        }
    }

    /// Wire bytes.
    #[must_use]
    pub const fn encode(&self) -> [u8; COMMAND_FRAME_LEN] {
        let [hi, lo] = self.param.to_be_bytes();
        [COMMAND_HEADER, self.channel, self.command.code(), hi, lo]
    }
}

/// Decoded data frame borrowing its payload from the landing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFrame<'a> {
    /// Raw channel byte, not yet validated.
    pub channel: u8,
    payload: &'a [u8],
}

impl<'a> DataFrame<'a> {
    /// Declared sample count `N` (1..=2048).
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.payload.len() / 2
    }

    /// Samples in wire order, little-endian signed 16-bit.
    pub fn samples(&self) -> impl Iterator<Item = i16> + 'a {
        self.payload
            .chunks_exact(2)
            .map(|pair| <[u8; 2]>::try_from(pair).map_or(0, i16::from_le_bytes))
    }
}

/// A validated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Control frame.
    Command(CommandFrame),
    /// PCM payload.
    Data(DataFrame<'a>),
}

/// Why a captured span was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Fewer bytes than a data header.
    #[error("runt frame: {len} bytes")]
    Runt {
        /// Captured length.
        len: usize,
    },
    /// First byte is neither `0xC0` nor `0xDA`.
    #[error("invalid header 0x{0:02X}")]
    InvalidHeader(u8),
    /// Command header with fewer than 5 bytes.
    #[error("short command frame: {len} bytes")]
    ShortCommand {
        /// Captured length.
        len: usize,
    },
    /// Declared sample count is zero or exceeds one buffer.
    #[error("invalid sample count {0}")]
    InvalidSampleCount(u16),
    /// Fewer bytes captured than the header declares.
    #[error("truncated data frame: declared {declared} bytes, captured {captured}")]
    Truncated {
        /// `4 + 2N`.
        declared: usize,
        /// Captured length.
        captured: usize,
    },
}

/// Classify and validate a captured span.
pub fn parse_frame(span: &[u8]) -> Result<Frame<'_>, ProtocolError> {
    let [header, channel, b2, b3, rest @ ..] = span else {
        return Err(ProtocolError::Runt { len: span.len() });
    };

    match *header {
        COMMAND_HEADER => {
            let [param_lo, ..] = rest else {
                return Err(ProtocolError::ShortCommand { len: span.len() });
            };
            Ok(Frame::Command(CommandFrame {
                channel: *channel,
                command: Command::from_code(*b2),
                param: u16::from_be_bytes([*b3, *param_lo]),
            }))
        }
        DATA_HEADER => {
            let declared = u16::from_be_bytes([*b2, *b3]);
            let count = usize::from(declared);
            if count == 0 || count > BUFFER_CAPACITY {
                return Err(ProtocolError::InvalidSampleCount(declared));
            }
            let payload_len = count.saturating_mul(2);
            let payload = rest.get(..payload_len).ok_or(ProtocolError::Truncated {
                declared: DATA_HEADER_LEN.saturating_add(payload_len),
                captured: span.len(),
            })?;
            Ok(Frame::Data(DataFrame {
                channel: *channel,
                payload,
            }))
        }
        other => Err(ProtocolError::InvalidHeader(other)),
    }
}

/// Encode a data frame into `out`, returning the number of bytes written.
///
/// Fails with [`ProtocolError::InvalidSampleCount`] for an empty or
/// oversized `samples`, and with [`ProtocolError::Truncated`] when `out` is
/// too small.
pub fn encode_data_frame(
    channel: u8,
    samples: &[i16],
    out: &mut [u8],
) -> Result<usize, ProtocolError> {
    let declared = u16::try_from(samples.len()).unwrap_or(u16::MAX);
    if samples.is_empty() || samples.len() > BUFFER_CAPACITY {
        return Err(ProtocolError::InvalidSampleCount(declared));
    }
    let total = DATA_HEADER_LEN.saturating_add(samples.len().saturating_mul(2));
    let Some(frame) = out.get_mut(..total) else {
        return Err(ProtocolError::Truncated {
            declared: total,
            captured: out.len(),
        });
    };

    let (head, payload) = frame.split_at_mut(DATA_HEADER_LEN);
    let [hi, lo] = declared.to_be_bytes();
    head.copy_from_slice(&[DATA_HEADER, channel, hi, lo]);
    for (pair, sample) in payload.chunks_exact_mut(2).zip(samples) {
        pair.copy_from_slice(&sample.to_le_bytes());
    }
    Ok(total)
}
