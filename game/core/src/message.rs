use crate::command::Command;
use crate::geometry::Vector;
use byteorder::{ReadBytesExt, WriteBytesExt};
use relay::buffer::Buffer;
use relay::stream::{self, Wire};
use relay::support::{ErrorType, NetworkError, NetworkResult};
use std::io::{self, Cursor};

const MSG_NEW_PLAYER: i32 = 0;
const MSG_ACCEPT_PLAYER: i32 = 1;
const MSG_CONNECT_PLAYER: i32 = 2;
const MSG_READY_FOR_GAME: i32 = 3;
const MSG_COMMAND: i32 = 4;
const MSG_PAUSE: i32 = 5;

/// The six protocol messages. Every frame on the wire is one of these,
/// preceded by a `u32` byte length that includes the length field itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Joiner to master: the joiner's own listener endpoint. Master to the
    /// other peers: the joiner's externally reachable endpoint plus its
    /// freshly assigned id. The two forms differ by the trailing id.
    NewPlayer { address: String, id: Option<i32> },
    /// Master to joiner: full game configuration.
    AcceptPlayer {
        players_count: i32,
        field_size: Vector,
        id: i32,
        master_id: i32,
        turn_time: u32,
        seed: u32,
    },
    /// Existing peer introducing itself to a fresh joiner.
    ConnectPlayer { id: i32 },
    /// Barrier traffic: joiners report readiness to the master; the master
    /// broadcasts the final tally to start the game.
    ReadyForGame {
        known_players: i32,
        players_count: i32,
        ready_players: i32,
    },
    /// A committed turn command from `author`.
    Command { author: i32, command: Command },
    /// Explicit pause toggle propagation.
    Pause { pause: bool },
}

impl Message {
    #[inline]
    pub fn tag(&self) -> i32 {
        match self {
            Message::NewPlayer { .. } => MSG_NEW_PLAYER,
            Message::AcceptPlayer { .. } => MSG_ACCEPT_PLAYER,
            Message::ConnectPlayer { .. } => MSG_CONNECT_PLAYER,
            Message::ReadyForGame { .. } => MSG_READY_FOR_GAME,
            Message::Command { .. } => MSG_COMMAND,
            Message::Pause { .. } => MSG_PAUSE,
        }
    }

    /// Parse one complete frame, length prefix included.
    pub fn parse(frame: &[u8]) -> NetworkResult<Message> {
        let mut reader = Cursor::new(frame);

        let length = reader.read_u32::<Wire>()? as usize;
        if length != frame.len() {
            return Err(NetworkError::Fatal(ErrorType::Malformed));
        }

        let tag = reader.read_i32::<Wire>()?;

        match tag {
            MSG_NEW_PLAYER => {
                let address = stream::read_str(&mut reader)?;
                let id = if (reader.position() as usize) < frame.len() {
                    Some(reader.read_i32::<Wire>()?)
                } else {
                    None
                };

                Ok(Message::NewPlayer { address, id })
            }
            MSG_ACCEPT_PLAYER => {
                let players_count = reader.read_i32::<Wire>()?;
                let x = reader.read_i32::<Wire>()?;
                let y = reader.read_i32::<Wire>()?;
                let id = reader.read_i32::<Wire>()?;
                let master_id = reader.read_i32::<Wire>()?;
                let turn_time = reader.read_u32::<Wire>()?;
                let seed = reader.read_u32::<Wire>()?;

                Ok(Message::AcceptPlayer {
                    players_count,
                    field_size: Vector::new(x, y),
                    id,
                    master_id,
                    turn_time,
                    seed,
                })
            }
            MSG_CONNECT_PLAYER => Ok(Message::ConnectPlayer {
                id: reader.read_i32::<Wire>()?,
            }),
            MSG_READY_FOR_GAME => Ok(Message::ReadyForGame {
                known_players: reader.read_i32::<Wire>()?,
                players_count: reader.read_i32::<Wire>()?,
                ready_players: reader.read_i32::<Wire>()?,
            }),
            MSG_COMMAND => {
                let author = reader.read_i32::<Wire>()?;
                let command = Command::read(&mut reader)?;

                Ok(Message::Command { author, command })
            }
            MSG_PAUSE => Ok(Message::Pause {
                pause: stream::read_bool(&mut reader)?,
            }),
            _ => Err(NetworkError::Fatal(ErrorType::UnknownMessage)),
        }
    }

    /// Serialize into an outbound buffer as one frame, patching the length
    /// in front of the body once it is known.
    pub fn write(&self, output: &mut Buffer) -> io::Result<()> {
        let start = output.pos();
        output.write_u32::<Wire>(0)?;
        output.write_i32::<Wire>(self.tag())?;

        match self {
            Message::NewPlayer { address, id } => {
                stream::write_str(output, address)?;
                if let Some(id) = id {
                    output.write_i32::<Wire>(*id)?;
                }
            }
            Message::AcceptPlayer {
                players_count,
                field_size,
                id,
                master_id,
                turn_time,
                seed,
            } => {
                output.write_i32::<Wire>(*players_count)?;
                output.write_i32::<Wire>(field_size.x)?;
                output.write_i32::<Wire>(field_size.y)?;
                output.write_i32::<Wire>(*id)?;
                output.write_i32::<Wire>(*master_id)?;
                output.write_u32::<Wire>(*turn_time)?;
                output.write_u32::<Wire>(*seed)?;
            }
            Message::ConnectPlayer { id } => {
                output.write_i32::<Wire>(*id)?;
            }
            Message::ReadyForGame {
                known_players,
                players_count,
                ready_players,
            } => {
                output.write_i32::<Wire>(*known_players)?;
                output.write_i32::<Wire>(*players_count)?;
                output.write_i32::<Wire>(*ready_players)?;
            }
            Message::Command { author, command } => {
                output.write_i32::<Wire>(*author)?;
                command.write(output)?;
            }
            Message::Pause { pause } => {
                stream::write_bool(output, *pause)?;
            }
        }

        let length = (output.pos() - start) as u32;
        output.patch_u32(start, length);

        Ok(())
    }
}
