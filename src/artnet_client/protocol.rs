//! art-net datagram decoding
//! the wire format is handled by the artnet_protocol crate, this module only
//! turns an ArtDmx packet into a channel update for the dmx bus

use artnet_protocol::ArtCommand;

use crate::common::error::DecodeError;
use crate::driver::dmx::prelude::{DmxAddress, DmxValue, DMX_CHANNEL_LEN};

/// contiguous channel values starting at `offset` (0-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUpdate {
    pub offset: DmxAddress,
    pub data: Vec<DmxValue>,
}

/// turns one datagram into a channel update
pub trait DmxDecoder: Send {
    fn decode(&self, datagram: &[u8]) -> Result<ChannelUpdate, DecodeError>;
}

/// ArtDmx (OpOutput) decoder, every other opcode is rejected
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtDmxDecoder;

impl DmxDecoder for ArtDmxDecoder {
    fn decode(&self, datagram: &[u8]) -> Result<ChannelUpdate, DecodeError> {
        let command =
            ArtCommand::from_buffer(datagram).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        match command {
            ArtCommand::Output(output) => {
                // the payload runs to the end of the datagram, only `length` bytes are channel data
                let length = *output.length as usize;
                let payload = output.data.as_ref();
                if length == 0 || length > DMX_CHANNEL_LEN {
                    return Err(DecodeError::Malformed(format!("ArtDmx length {} out of range", length)));
                }
                if length > payload.len() {
                    return Err(DecodeError::Malformed(format!(
                        "ArtDmx length {} but only {} bytes of data",
                        length,
                        payload.len()
                    )));
                }
                Ok(ChannelUpdate {
                    // ArtDmx payloads always start at the first slot of the universe
                    offset: 0,
                    data: payload[..length].to_vec(),
                })
            }
            ArtCommand::Poll(_) => Err(DecodeError::Unsupported(String::from("OpPoll"))),
            ArtCommand::PollReply(_) => Err(DecodeError::Unsupported(String::from("OpPollReply"))),
            _ => Err(DecodeError::Unsupported(String::from("non-dmx command"))),
        }
    }
}
