use clap::Parser;
use lifecore::geometry::Vector;
use std::path::PathBuf;

/// Ticks per second are clamped to this range; 0 disables automatic turns.
const MAX_TURNS_PER_SECOND: u32 = 10;
/// Mesh capacity; the simulation packs one 4-bit lane per player.
const MAX_PLAYERS: i32 = 8;
/// Torus axes are carried as u16 on the wire configuration.
const MAX_FIELD_AXIS: i32 = 65535;

/// Headless host for the peer-to-peer Life mesh.
#[derive(Debug, Parser)]
#[command(name = "liferunner")]
pub struct Args {
    /// Torus dimensions.
    #[arg(long, num_args = 2, value_names = ["W", "H"], default_values_t = vec![1000, 1000])]
    pub field: Vec<i32>,

    /// Renderer window hint; accepted for compatibility, unused by the
    /// headless host.
    #[arg(long, num_args = 2, value_names = ["W", "H"], default_values_t = vec![800, 600])]
    pub window: Vec<i32>,

    /// Join the game hosted at this endpoint instead of hosting one.
    #[arg(long, value_name = "HOST:PORT")]
    pub server: Option<String>,

    /// Directory of RLE pattern files.
    #[arg(long, default_value = "rle")]
    pub presets: PathBuf,

    /// Ticks per second, clamped to [1, 10]; 0 disables automatic turns.
    #[arg(long, default_value_t = MAX_TURNS_PER_SECOND)]
    pub turn: u32,

    /// Expected player count, clamped to [1, 8]. Hosting only.
    #[arg(long, default_value_t = 1)]
    pub players: i32,

    /// Enemy-proximity radius for unit placement.
    #[arg(long, default_value_t = 4)]
    pub distance_to_enemy: i32,

    /// Place pattern PRESET at (X, Y) once the game starts.
    #[arg(long, num_args = 3, value_names = ["PRESET", "X", "Y"], allow_negative_numbers = true)]
    pub place: Option<Vec<i32>>,

    /// Root logger level (trace, debug, info, warning, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn field_size(&self) -> Vector {
        Vector::new(
            self.field[0].clamp(1, MAX_FIELD_AXIS),
            self.field[1].clamp(1, MAX_FIELD_AXIS),
        )
    }

    /// Turn period in milliseconds; 0 disables automatic turns.
    pub fn turn_period(&self) -> u32 {
        match self.turn {
            0 => 0,
            turns => 1000 / turns.min(MAX_TURNS_PER_SECOND),
        }
    }

    pub fn players(&self) -> i32 {
        self.players.clamp(1, MAX_PLAYERS)
    }

    pub fn place_request(&self) -> Option<(usize, Vector)> {
        self.place
            .as_ref()
            .map(|place| (place[0].max(0) as usize, Vector::new(place[1], place[2])))
    }
}
