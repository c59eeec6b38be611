//! Headless host for the lockstep Life mesh. Builds a hosting or joining
//! peer from the command line, then drives the tick loop: pump the
//! selector, fire a turn every turn period, exit when the session dies.

mod args;
mod logging;
mod rle;

use crate::args::Args;
use clap::Parser;
use lifecore::field::GameField;
use lifecore::geometry::Matrix3x3;
use lifecore::peer::Peer;
use slog::{error, info, o, warn, Logger};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() {
    let args = Args::parse();
    let log = logging::init(&args.log_level);

    process::exit(run(args, log));
}

fn run(args: Args, log: Logger) -> i32 {
    let presets = Arc::new(rle::load_presets(&args.presets, &log));
    info!(log, "patterns loaded"; "count" => presets.count());

    let peer = match &args.server {
        Some(address) => {
            let field = GameField::new(presets, args.distance_to_enemy);
            Peer::join(field, address.clone(), log.new(o!()))
        }
        None => {
            let field = GameField::with_size(
                presets,
                args.field_size(),
                args.turn_period(),
                0,
                args.distance_to_enemy,
            );
            Peer::host(field, args.players(), log.new(o!()))
        }
    };

    let mut peer = match peer {
        Ok(peer) => peer,
        Err(err) => {
            error!(log, "failed to set up peer"; "error" => %err);
            return 1;
        }
    };

    if let Err(err) = peer.init() {
        error!(log, "failed to join the game"; "error" => ?err);
        return 1;
    }

    if let Ok(address) = peer.listener_address() {
        info!(log, "listening"; "address" => address, "master" => peer.is_master());
    }

    let mut place = args.place_request();
    let mut last_turn = Instant::now();

    loop {
        if let Err(err) = peer.update(false) {
            error!(log, "socket failure"; "error" => ?err);
            return 1;
        }

        if peer.is_destroyed() {
            info!(log, "session over");
            return 0;
        }

        if peer.is_game_started() {
            if let Some((preset, cell)) = place.take() {
                if peer.add_preset(Matrix3x3::translation(cell), preset) {
                    info!(log, "pattern placed"; "preset" => preset, "cell" => %cell);
                } else {
                    warn!(log, "pattern placement refused"; "preset" => preset, "cell" => %cell);
                }
            }
        }

        let period = peer.turn_time();
        if period > 0 && last_turn.elapsed() >= Duration::from_millis(u64::from(period)) {
            peer.turn();
            last_turn = Instant::now();
        }

        thread::sleep(Duration::from_millis(1));
    }
}
