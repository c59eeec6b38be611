use crate::field::GameField;
use crate::geometry::{Matrix3x3, Vector};
use byteorder::{ReadBytesExt, WriteBytesExt};
use relay::stream::Wire;
use relay::support::{ErrorType, NetworkError, NetworkResult};
use std::collections::VecDeque;
use std::io;

const CMD_EMPTY: i32 = 0;
const CMD_ADD_UNITS: i32 = 1;
const CMD_ADD_PRESET: i32 = 2;
const CMD_COMPLEX: i32 = 3;

/// Upper bound on units in one command; a frame is capped at 1 MiB anyway,
/// so a larger count is a lie.
const MAX_UNITS: usize = 1 << 17;
/// Upper bound on children of a composite command.
const MAX_CHILDREN: usize = 1 << 10;

/// One player action, or a whole turn's worth of them.
///
/// `Complex` is the only kind ever transmitted at turn commit time; it wraps
/// the turn's actions together with the turn index and the committing
/// peer's world checksum. The pre-fill entries seeded at game start are
/// bare `Empty` commands.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Command {
    Empty,
    AddUnits {
        player: i32,
        units: Vec<Vector>,
    },
    AddPreset {
        transform: Matrix3x3,
        preset: i32,
        player: i32,
    },
    Complex {
        turn_step: i32,
        checksum: u64,
        commands: Vec<Command>,
    },
}

/// Per-player FIFO of committed commands.
pub type CommandQueue = VecDeque<Command>;

impl Command {
    #[inline]
    pub fn tag(&self) -> i32 {
        match self {
            Command::Empty => CMD_EMPTY,
            Command::AddUnits { .. } => CMD_ADD_UNITS,
            Command::AddPreset { .. } => CMD_ADD_PRESET,
            Command::Complex { .. } => CMD_COMPLEX,
        }
    }

    /// Turn index carried by a committed command; pre-fill commands read 0.
    #[inline]
    pub fn turn_step(&self) -> i32 {
        match self {
            Command::Complex { turn_step, .. } => *turn_step,
            _ => 0,
        }
    }

    /// World checksum carried by a committed command; pre-fill commands
    /// read 0.
    #[inline]
    pub fn checksum(&self) -> u64 {
        match self {
            Command::Complex { checksum, .. } => *checksum,
            _ => 0,
        }
    }

    pub fn read<R: io::Read>(reader: &mut R) -> NetworkResult<Command> {
        let tag = reader.read_i32::<Wire>()?;

        match tag {
            CMD_EMPTY => Ok(Command::Empty),
            CMD_ADD_UNITS => {
                let player = reader.read_i32::<Wire>()?;
                let count = reader.read_u32::<Wire>()? as usize;

                if count > MAX_UNITS {
                    return Err(NetworkError::Fatal(ErrorType::Malformed));
                }

                let mut units = Vec::with_capacity(count);
                for _ in 0..count {
                    let x = reader.read_i32::<Wire>()?;
                    let y = reader.read_i32::<Wire>()?;
                    units.push(Vector::new(x, y));
                }

                Ok(Command::AddUnits { player, units })
            }
            CMD_ADD_PRESET => {
                let mut rows = [[0i32; 3]; 3];
                for row in rows.iter_mut() {
                    for entry in row.iter_mut() {
                        *entry = reader.read_i32::<Wire>()?;
                    }
                }

                let preset = reader.read_i32::<Wire>()?;
                let player = reader.read_i32::<Wire>()?;

                Ok(Command::AddPreset {
                    transform: Matrix3x3::new(rows),
                    preset,
                    player,
                })
            }
            CMD_COMPLEX => {
                let turn_step = reader.read_i32::<Wire>()?;
                let checksum = reader.read_u64::<Wire>()?;
                let count = reader.read_u32::<Wire>()? as usize;

                if count > MAX_CHILDREN {
                    return Err(NetworkError::Fatal(ErrorType::Malformed));
                }

                let mut commands = Vec::with_capacity(count);
                for _ in 0..count {
                    commands.push(Command::read(reader)?);
                }

                Ok(Command::Complex {
                    turn_step,
                    checksum,
                    commands,
                })
            }
            _ => Err(NetworkError::Fatal(ErrorType::UnknownCommand)),
        }
    }

    pub fn write<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<Wire>(self.tag())?;

        match self {
            Command::Empty => {}
            Command::AddUnits { player, units } => {
                writer.write_i32::<Wire>(*player)?;
                writer.write_u32::<Wire>(units.len() as u32)?;
                for unit in units {
                    writer.write_i32::<Wire>(unit.x)?;
                    writer.write_i32::<Wire>(unit.y)?;
                }
            }
            Command::AddPreset {
                transform,
                preset,
                player,
            } => {
                for row in &transform.rows {
                    for &entry in row {
                        writer.write_i32::<Wire>(entry)?;
                    }
                }
                writer.write_i32::<Wire>(*preset)?;
                writer.write_i32::<Wire>(*player)?;
            }
            Command::Complex {
                turn_step,
                checksum,
                commands,
            } => {
                writer.write_i32::<Wire>(*turn_step)?;
                writer.write_u64::<Wire>(*checksum)?;
                writer.write_u32::<Wire>(commands.len() as u32)?;
                for command in commands {
                    command.write(writer)?;
                }
            }
        }

        Ok(())
    }

    /// Execute against the world. Composite commands apply their children
    /// in order; unit writes are first-writer-wins.
    pub fn apply(&self, field: &mut GameField) {
        match self {
            Command::Empty => {}
            Command::AddUnits { player, units } => {
                for &unit in units {
                    field.emplace(unit, *player);
                }
            }
            Command::AddPreset {
                transform,
                preset,
                player,
            } => {
                field.apply_preset(transform, *preset as usize, *player);
            }
            Command::Complex { commands, .. } => {
                for command in commands {
                    command.apply(field);
                }
            }
        }
    }
}
