use crate::command::{Command, CommandQueue};
use crate::field::GameField;
use crate::geometry::{Matrix3x3, Vector};
use crate::message::Message;
use crate::random::{self, Random};
use indexmap::IndexMap;
use mio::net::{TcpListener, TcpStream};
use relay::connection::Connection;
use relay::selector::Selector;
use relay::support::{ErrorType, NetworkError, NetworkResult};
use slog::{debug, info, o, warn, Logger};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::ToSocketAddrs;

/// Listener readiness token; connection tokens count up from 1.
const LISTENER_TOKEN: usize = 0;

/// Turns the engine may run ahead of the slowest peer's commands. Every
/// queue is pre-filled with this many empty commands at game start.
const FUTURE_TURNS: usize = 3;

/// One node of the full mesh: owns the world, the connection registry and
/// the per-player command queues, and drives the lockstep turn pipeline.
///
/// The peer with no master connection is the master; it accepts joiners,
/// assigns ids and decides the seed and dimensions. All logic is
/// single-threaded and cooperative: the host calls `update` once per tick
/// and `turn` once per turn period.
pub struct Peer {
    field: GameField,
    selector: Selector,
    listener: Option<TcpListener>,
    connections: IndexMap<usize, Connection>,
    next_token: usize,
    /// Connection token to player id, one entry per registered peer.
    ids: HashMap<usize, i32>,
    /// Player id to command queue, iterated in ascending id order when
    /// applying a turn so every peer agrees on the application order.
    players: BTreeMap<i32, CommandQueue>,
    self_commands: CommandQueue,
    /// Token of the master's connection; `None` means this peer is master.
    master: Option<usize>,
    master_address: Option<String>,
    players_count: i32,
    ready_players: i32,
    seed: u32,
    random: Random,
    pause: bool,
    pause_on_last_turn: bool,
    destroyed: bool,
    added_units: Vec<Vector>,
    pending_commands: Vec<Command>,
    log: Logger,
}

impl Peer {
    /// Host a new game for `players` participants. With a single player the
    /// game starts immediately.
    pub fn host(field: GameField, players: i32, log: Logger) -> io::Result<Peer> {
        debug_assert!(field.is_initialized());

        let mut peer = Peer::with_field(field, 1, players, log)?;
        peer.listen()?;
        peer.set_seed(random::entropy_seed());

        if peer.is_game_started() {
            debug_assert_eq!(peer.players_count, 1);
            peer.start_game();
        }

        Ok(peer)
    }

    /// Join the game hosted at `address`. The handshake runs in `init`.
    pub fn join<S: Into<String>>(field: GameField, address: S, log: Logger) -> io::Result<Peer> {
        let mut peer = Peer::with_field(field, 0, 0, log)?;
        peer.master_address = Some(address.into());
        Ok(peer)
    }

    fn with_field(field: GameField, ready_players: i32, players_count: i32, log: Logger) -> io::Result<Peer> {
        Ok(Peer {
            field,
            selector: Selector::new()?,
            listener: None,
            connections: IndexMap::new(),
            next_token: LISTENER_TOKEN + 1,
            ids: HashMap::new(),
            players: BTreeMap::new(),
            self_commands: CommandQueue::new(),
            master: None,
            master_address: None,
            players_count,
            ready_players,
            seed: 0,
            random: Random::new(1),
            pause: false,
            pause_on_last_turn: false,
            destroyed: false,
            added_units: Vec::new(),
            pending_commands: Vec::new(),
            log,
        })
    }

    /// Drive the join handshake. On the master this is a no-op. A joiner
    /// connects out, advertises its own listener endpoint, then pumps the
    /// selector until the outbound NewPlayer has flushed and the
    /// AcceptPlayer reply has configured the world. This is the only place
    /// the engine may block the thread.
    pub fn init(&mut self) -> NetworkResult<()> {
        let address = match self.master_address.clone() {
            Some(address) => address,
            None => return Ok(()),
        };

        let address = address
            .to_socket_addrs()
            .ok()
            .and_then(|mut resolved| resolved.next())
            .ok_or(NetworkError::Fatal(ErrorType::Address))?;

        let stream = TcpStream::connect(&address).map_err(NetworkError::from)?;
        self.listen().map_err(NetworkError::from)?;

        let token = self.add_connection(stream)?;
        self.master = Some(token);

        let listener_address = self.listener_address().map_err(NetworkError::from)?;
        self.post(token, &Message::NewPlayer {
            address: listener_address,
            id: None,
        });

        while !self.connection_can_write(token) {
            self.update(true)?;
            if self.destroyed {
                return Err(NetworkError::Closed);
            }
        }

        while !self.field.is_initialized() {
            self.update(true)?;
            if self.destroyed {
                return Err(NetworkError::Closed);
            }
        }

        Ok(())
    }

    /// Pump the selector once and service every ready socket.
    pub fn update(&mut self, block: bool) -> NetworkResult<()> {
        if self.destroyed {
            return Ok(());
        }

        let ready = self.selector.select(block).map_err(NetworkError::from)?;

        for readiness in ready {
            if readiness.token == LISTENER_TOKEN {
                self.accept_connections();
                continue;
            }
            if readiness.readable {
                self.handle_read(readiness.token);
            }
            if readiness.writable {
                self.handle_write(readiness.token);
            }
        }

        Ok(())
    }

    /// One lockstep turn: verify that every queue front agrees on the turn
    /// index and checksum, apply one command per player in ascending id
    /// order (the local player last), advance the world a generation, then
    /// commit and broadcast the local command for a future turn.
    pub fn turn(&mut self) {
        if self.destroyed || !self.is_game_started() || self.is_pause() {
            return;
        }

        if !self.check_sync() {
            warn!(self.log, "game instances are out of sync"; "player" => self.field.player());
            self.destroy();
            return;
        }

        let ids: Vec<i32> = self.players.keys().copied().collect();
        for id in ids {
            let command = self.players.get_mut(&id).and_then(|queue| queue.pop_front());
            debug_assert!(command.is_some());
            if let Some(command) = command {
                command.apply(&mut self.field);
            }
        }

        let command = self.self_commands.pop_front();
        debug_assert!(command.is_some());
        if let Some(command) = command {
            command.apply(&mut self.field);
        }

        self.field.process_units();
        self.prepare_commands();
    }

    /// Stage a single unit for the local player's next committed command.
    /// Rejected while stopped, on an occupied cell, or too close to an
    /// enemy unit.
    pub fn add_unit(&mut self, cell: Vector) {
        if !self.is_game_started() || self.is_pause() {
            return;
        }

        let cell = self.field.clamp(cell);
        if self.field.unit_at(cell).is_none() && self.field.can_insert(cell) {
            self.added_units.push(cell);
        }
    }

    /// Stage a pattern placement. The whole transformed footprint must
    /// clear the enemy-proximity gate or the placement is refused; the
    /// receivers trust this check and any disagreement trips the checksum.
    pub fn add_preset(&mut self, transform: Matrix3x3, preset: usize) -> bool {
        if !self.is_game_started() || self.is_pause() {
            return false;
        }

        let units = match self.field.presets().get(preset) {
            Some(pattern) => pattern.units().to_vec(),
            None => return false,
        };

        for unit in units {
            let cell = self.field.clamp(transform * unit);
            if !self.field.can_insert(cell) {
                return false;
            }
        }

        self.pending_commands.push(Command::AddPreset {
            transform,
            preset: preset as i32,
            player: self.field.player(),
        });

        true
    }

    /// Toggle the explicit pause and propagate the new state to every peer.
    pub fn toggle_pause(&mut self) {
        self.pause = !self.pause;
        let message = Message::Pause { pause: self.pause };
        self.broadcast(&message);
    }

    /// Paused either explicitly or because some peer's command for the next
    /// turn has not arrived. The starvation transitions are logged once per
    /// edge.
    pub fn is_pause(&mut self) -> bool {
        if self.pause {
            return true;
        }

        let starved = self
            .players
            .iter()
            .find(|(_, queue)| queue.is_empty())
            .map(|(&id, _)| id);

        match (starved, self.pause_on_last_turn) {
            (Some(peer), false) => {
                warn!(self.log, "waiting for peer command";
                      "player" => self.field.player(), "peer" => peer);
            }
            (None, true) => {
                warn!(self.log, "all peer commands received"; "player" => self.field.player());
            }
            _ => {}
        }

        self.pause_on_last_turn = starved.is_some();
        starved.is_some()
    }

    #[inline]
    pub fn is_master(&self) -> bool {
        self.master.is_none()
    }

    #[inline]
    pub fn is_game_started(&self) -> bool {
        self.players_count > 0 && self.ready_players == self.players_count
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[inline]
    pub fn field(&self) -> &GameField {
        &self.field
    }

    #[inline]
    pub fn turn_time(&self) -> u32 {
        self.field.turn_time()
    }

    /// The endpoint this peer accepts mesh connections on.
    pub fn listener_address(&self) -> io::Result<String> {
        match &self.listener {
            Some(listener) => Ok(listener.local_addr()?.to_string()),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no listener")),
        }
    }

    /// Tear the session down: every connection is shut, the listener is
    /// dropped and the destroyed flag is raised for the host loop.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        self.players.clear();
        self.ids.clear();
        self.master = None;
        self.field.clear();

        for (_, mut connection) in self.connections.drain(..) {
            let _ = connection.deregister(&self.selector);
            connection.close();
        }

        if let Some(listener) = self.listener.take() {
            let _ = self.selector.deregister(&listener);
        }

        info!(self.log, "peer session destroyed");
    }

    fn listen(&mut self) -> io::Result<()> {
        let address = "127.0.0.1:0".parse().expect("loopback address");
        let listener = TcpListener::bind(&address)?;

        self.selector.register(&listener, LISTENER_TOKEN, false)?;
        self.listener = Some(listener);

        Ok(())
    }

    fn set_seed(&mut self, seed: u32) {
        self.seed = seed;
        self.random.reseed(seed);
    }

    fn add_connection(&mut self, stream: TcpStream) -> NetworkResult<usize> {
        let token = self.next_token;
        self.next_token += 1;

        let connection = Connection::new(stream, self.log.new(o!("conn" => token)));
        connection
            .register(&self.selector, token)
            .map_err(NetworkError::from)?;

        self.connections.insert(token, connection);
        debug!(self.log, "connection added"; "conn" => token);

        Ok(token)
    }

    fn connection_can_write(&self, token: usize) -> bool {
        self.connections
            .get(&token)
            .map_or(true, Connection::can_write)
    }

    /// Queue a message on a connection and arm write interest.
    fn post(&mut self, token: usize, message: &Message) {
        let selector = &self.selector;
        if let Some(connection) = self.connections.get_mut(&token) {
            if message.write(&mut connection.output).is_ok() {
                let _ = connection.reregister(selector, token);
            }
        }
    }

    /// Send a message to every registered peer.
    fn broadcast(&mut self, message: &Message) {
        let tokens: Vec<usize> = self.ids.keys().copied().collect();
        for token in tokens {
            self.post(token, message);
        }
    }

    fn accept_connections(&mut self) {
        loop {
            let accepted = match &self.listener {
                Some(listener) => listener.accept(),
                None => return,
            };

            match accepted {
                Ok((stream, address)) => {
                    // A full roster turns late arrivals away at the door.
                    if self.players_count > 0
                        && self.players.len() as i32 >= self.players_count - 1
                    {
                        debug!(self.log, "rejecting connection, game is full"; "address" => %address);
                        continue;
                    }

                    if self.add_connection(stream).is_err() {
                        warn!(self.log, "failed to register accepted connection");
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    warn!(self.log, "accept failed"; "error" => %err);
                    return;
                }
            }
        }
    }

    fn handle_read(&mut self, token: usize) {
        let result = match self.connections.get_mut(&token) {
            Some(connection) => connection.receive(),
            None => return,
        };

        match result {
            Ok(_) => self.drain_messages(token),
            Err(NetworkError::Wait) => {}
            Err(NetworkError::Closed) => self.close_connection(token, true),
            Err(error) => {
                warn!(self.log, "receive failed"; "conn" => token, "error" => ?error);
                self.close_connection(token, true);
            }
        }
    }

    fn handle_write(&mut self, token: usize) {
        let selector = &self.selector;
        let result = match self.connections.get_mut(&token) {
            Some(connection) => {
                let result = connection.send();
                if connection.can_write() {
                    let _ = connection.reregister(selector, token);
                }
                result
            }
            None => return,
        };

        match result {
            Ok(_) | Err(NetworkError::Wait) => {}
            Err(error) => {
                warn!(self.log, "send failed"; "conn" => token, "error" => ?error);
                self.close_connection(token, true);
            }
        }
    }

    fn drain_messages(&mut self, token: usize) {
        loop {
            let frame = match self.connections.get_mut(&token) {
                Some(connection) => connection.pop_frame(),
                None => return,
            };

            match frame {
                Ok(Some(bytes)) => match Message::parse(&bytes) {
                    Ok(message) => self.dispatch(token, message),
                    Err(error) => {
                        warn!(self.log, "dropping peer on malformed message";
                              "conn" => token, "error" => ?error);
                        self.close_connection(token, true);
                        return;
                    }
                },
                Ok(None) => return,
                Err(error) => {
                    warn!(self.log, "dropping peer on bad frame"; "conn" => token, "error" => ?error);
                    self.close_connection(token, true);
                    return;
                }
            }
        }
    }

    fn dispatch(&mut self, token: usize, message: Message) {
        match message {
            Message::NewPlayer { address, id } => self.on_new_player(token, address, id),
            Message::AcceptPlayer {
                players_count,
                field_size,
                id,
                master_id,
                turn_time,
                seed,
            } => self.on_accept_player(token, players_count, field_size, id, master_id, turn_time, seed),
            Message::ConnectPlayer { id } => {
                self.add_player(id, token);
                self.check_ready_for_game();
            }
            Message::ReadyForGame {
                known_players,
                players_count,
                ready_players,
            } => self.on_ready_for_game(known_players, players_count, ready_players),
            Message::Command { author, command } => {
                if let Some(queue) = self.players.get_mut(&author) {
                    queue.push_back(command);
                }
            }
            Message::Pause { pause } => {
                info!(self.log, "pause toggled by peer"; "pause" => pause);
                self.pause = pause;
            }
        }
    }

    /// The master half of the join dance: rewrite the joiner's advertised
    /// endpoint into one the other peers can reach (the host seen on the
    /// accepted socket plus the advertised listener port), announce it to
    /// the mesh, then register and accept the joiner.
    fn on_new_player(&mut self, token: usize, address: String, id: Option<i32>) {
        if self.is_master() {
            let remote = match self.connections.get(&token).and_then(|c| c.peer_addr().ok()) {
                Some(remote) => remote,
                None => return,
            };

            let port = address
                .rsplit(':')
                .next()
                .and_then(|port| port.parse::<u16>().ok());
            let port = match port {
                Some(port) => port,
                None => {
                    warn!(self.log, "joiner advertised a bad endpoint"; "address" => address);
                    self.close_connection(token, true);
                    return;
                }
            };

            let reachable = format!("{}:{}", remote.ip(), port);
            let id = self.players.len() as i32 + 1;

            info!(self.log, "accepting new player"; "id" => id, "address" => reachable.as_str());

            self.broadcast(&Message::NewPlayer {
                address: reachable,
                id: Some(id),
            });
            self.add_player(id, token);
            self.accept_new_player(token, id);
        } else {
            // Relayed announcement: connect out to the new peer.
            let id = match id {
                Some(id) if id >= 0 => id,
                _ => {
                    warn!(self.log, "player announcement without an id");
                    self.close_connection(token, true);
                    return;
                }
            };

            self.connect_new_player(&address, id);
        }
    }

    fn accept_new_player(&mut self, token: usize, id: i32) {
        let message = Message::AcceptPlayer {
            players_count: self.players_count,
            field_size: self.field.size(),
            id,
            master_id: self.field.player(),
            turn_time: self.field.turn_time(),
            seed: self.seed,
        };
        self.post(token, &message);
    }

    fn on_accept_player(
        &mut self,
        token: usize,
        players_count: i32,
        field_size: Vector,
        id: i32,
        master_id: i32,
        turn_time: u32,
        seed: u32,
    ) {
        self.players_count = players_count;
        self.field.set_size(field_size);
        self.field.set_player(id);
        self.field.set_turn_time(turn_time);
        self.add_player(master_id, token);
        self.check_ready_for_game();
        self.set_seed(seed);

        debug_assert!(self.field.player() >= 0 && self.field.player() < self.players_count);

        info!(self.log, "accepted into game";
              "player" => id, "master" => master_id,
              "players_count" => players_count, "seed" => seed);
    }

    fn connect_new_player(&mut self, address: &str, id: i32) {
        info!(self.log, "connecting to peer"; "peer" => id, "address" => address);

        let resolved = address
            .to_socket_addrs()
            .ok()
            .and_then(|mut resolved| resolved.next());
        let resolved = match resolved {
            Some(resolved) => resolved,
            None => {
                warn!(self.log, "peer endpoint does not resolve"; "address" => address);
                return;
            }
        };

        let stream = match TcpStream::connect(&resolved) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(self.log, "failed to connect to peer"; "peer" => id, "error" => %err);
                return;
            }
        };

        let token = match self.add_connection(stream) {
            Ok(token) => token,
            Err(_) => return,
        };

        self.add_player(id, token);
        self.post(token, &Message::ConnectPlayer {
            id: self.field.player(),
        });
        self.check_ready_for_game();
    }

    fn add_player(&mut self, id: i32, token: usize) {
        self.players.insert(id, CommandQueue::new());
        self.ids.insert(token, id);
    }

    /// Every time the roster grows, a non-master peer that now knows every
    /// other participant reports readiness to the master.
    fn check_ready_for_game(&mut self) {
        if self.is_game_started() {
            return;
        }

        if self.players.len() as i32 == self.players_count - 1 {
            let message = Message::ReadyForGame {
                known_players: self.players.len() as i32,
                players_count: self.players_count,
                ready_players: self.ready_players,
            };

            if let Some(master) = self.master {
                self.post(master, &message);
            }
        }
    }

    fn on_ready_for_game(&mut self, known_players: i32, players_count: i32, ready_players: i32) {
        debug_assert_eq!(players_count, self.players_count);
        debug_assert_eq!(known_players, self.players.len() as i32);

        if self.is_master() {
            debug_assert_eq!(ready_players, 0);
            self.ready_players += 1;

            if self.ready_players == self.players_count {
                let message = Message::ReadyForGame {
                    known_players: self.players.len() as i32,
                    players_count: self.players_count,
                    ready_players: self.ready_players,
                };
                self.broadcast(&message);
                self.start_game();
            }
        } else {
            debug_assert_eq!(self.ready_players, 0);
            self.ready_players = ready_players;
            self.start_game();
            debug_assert_eq!(self.players_count, self.ready_players);
        }
    }

    /// Pre-fill every queue so the engine can run `FUTURE_TURNS` turns
    /// ahead of network receipt without stalling.
    fn start_game(&mut self) {
        for queue in self.players.values_mut() {
            debug_assert!(queue.is_empty());
            for _ in 0..FUTURE_TURNS {
                queue.push_back(Command::Empty);
            }
        }

        debug_assert!(self.self_commands.is_empty());
        for _ in 0..FUTURE_TURNS {
            self.self_commands.push_back(Command::Empty);
        }

        info!(self.log, "game started";
              "player" => self.field.player(), "players_count" => self.players_count);
    }

    /// All queue fronts must agree on the turn index and checksum; any
    /// disagreement means the simulations have diverged.
    fn check_sync(&self) -> bool {
        let front = match self.self_commands.front() {
            Some(front) => front,
            None => return false,
        };

        self.players.values().all(|queue| match queue.front() {
            Some(command) => {
                command.turn_step() == front.turn_step() && command.checksum() == front.checksum()
            }
            None => false,
        })
    }

    /// Commit phase: flush the staged units and preset placements into one
    /// composite command stamped with the turn-step draw and the world
    /// checksum, queue it locally and broadcast it.
    fn prepare_commands(&mut self) {
        let mut commands = std::mem::take(&mut self.pending_commands);

        if !self.added_units.is_empty() {
            let units = std::mem::take(&mut self.added_units);
            commands.push(Command::AddUnits {
                player: self.field.player(),
                units,
            });
        }

        let turn_step = self.random.next();
        let checksum = self.field.checksum();
        let command = Command::Complex {
            turn_step,
            checksum,
            commands,
        };

        let message = Message::Command {
            author: self.field.player(),
            command: command.clone(),
        };

        self.self_commands.push_back(command);
        self.broadcast(&message);
    }

    fn close_connection(&mut self, token: usize, callback: bool) {
        let mut connection = match self.connections.shift_remove(&token) {
            Some(connection) => connection,
            None => return,
        };

        let _ = connection.deregister(&self.selector);
        connection.close();

        if callback {
            self.on_close_connection(token);
        }
    }

    /// Drop the departed player and, when the master is gone, elect the
    /// smallest surviving id (the local player included) as the new one.
    /// Before the start barrier the session cannot recover a partial
    /// roster and is destroyed instead.
    fn on_close_connection(&mut self, token: usize) {
        if self.ids.is_empty() || !self.is_game_started() {
            self.destroy();
            return;
        }

        let id = match self.ids.remove(&token) {
            Some(id) => id,
            None => return,
        };
        self.players.remove(&id);

        if self.master == Some(token) {
            let survivor = self
                .ids
                .iter()
                .map(|(&token, &id)| (id, token))
                .min();

            self.master = match survivor {
                Some((survivor_id, survivor_token)) if survivor_id < self.field.player() => {
                    Some(survivor_token)
                }
                _ => None,
            };
        }

        let master = if self.is_master() {
            self.field.player()
        } else {
            self.master
                .and_then(|token| self.ids.get(&token).copied())
                .unwrap_or(-1)
        };

        warn!(self.log, "peer closed connection"; "peer" => id, "master" => master);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;
    use crate::presets::Presets;
    use slog::Discard;
    use std::io::Read;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    fn blinker_presets() -> Arc<Presets> {
        Arc::new(Presets::new(vec![Pattern::new(
            "blinker",
            vec![Vector::new(-1, 0), Vector::new(0, 0), Vector::new(1, 0)],
        )]))
    }

    fn master_peer(players: i32) -> Peer {
        let field = GameField::with_size(blinker_presets(), Vector::new(10, 10), 100, 0, 0);
        Peer::host(field, players, test_logger()).unwrap()
    }

    fn spawn_joiner(address: String) -> thread::JoinHandle<Peer> {
        thread::spawn(move || {
            let field = GameField::new(blinker_presets(), 0);
            let mut joiner = Peer::join(field, address, test_logger()).unwrap();
            joiner.init().unwrap();
            joiner
        })
    }

    fn pump(peers: &mut [&mut Peer], rounds: usize) {
        for _ in 0..rounds {
            for peer in peers.iter_mut() {
                peer.update(false).unwrap();
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn pump_until<F>(peers: &mut [&mut Peer], mut done: F)
    where
        F: FnMut(&[&mut Peer]) -> bool,
    {
        for _ in 0..2000 {
            for peer in peers.iter_mut() {
                peer.update(false).unwrap();
            }
            if done(peers) {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("condition not reached while pumping");
    }

    /// A started two-peer mesh: master (player 0) and one joiner (player 1).
    fn start_pair() -> (Peer, Peer) {
        let mut master = master_peer(2);
        let address = master.listener_address().unwrap();

        let handle = spawn_joiner(address);
        while !handle.is_finished() {
            master.update(false).unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        let mut joiner = handle.join().unwrap();

        pump_until(&mut [&mut master, &mut joiner], |peers| {
            peers.iter().all(|peer| peer.is_game_started())
        });

        (master, joiner)
    }

    fn snapshot(field: &GameField) -> Vec<(Vector, i32)> {
        let mut units: Vec<_> = field.units().collect();
        units.sort_by_key(|(pos, _)| (pos.x, pos.y));
        units
    }

    #[test]
    fn test_solo_master_starts_immediately() {
        let master = master_peer(1);

        assert!(master.is_master());
        assert!(master.is_game_started());
        assert_eq!(master.self_commands.len(), FUTURE_TURNS);
        assert!(master.players.is_empty());
    }

    #[test]
    fn test_solo_lockstep_applies_after_future_turns() {
        let mut master = master_peer(1);

        master.add_unit(Vector::new(4, 5));
        master.add_unit(Vector::new(5, 5));
        master.add_unit(Vector::new(6, 5));

        // The commit lands behind the pre-fill; nothing appears until the
        // future-turn window has drained.
        for _ in 0..FUTURE_TURNS {
            master.turn();
            assert_eq!(master.field().unit_count(), 0);
        }

        master.turn();
        assert_eq!(
            snapshot(master.field()),
            vec![
                (Vector::new(5, 4), 0),
                (Vector::new(5, 5), 0),
                (Vector::new(5, 6), 0),
            ]
        );
        assert_eq!(master.self_commands.len(), FUTURE_TURNS);
    }

    #[test]
    fn test_join_barrier() {
        let (master, joiner) = start_pair();

        assert!(master.is_master());
        assert!(!joiner.is_master());

        assert_eq!(master.ready_players, 2);
        assert_eq!(joiner.ready_players, 2);

        assert_eq!(master.field().player(), 0);
        assert_eq!(joiner.field().player(), 1);
        assert_eq!(joiner.field().size(), Vector::new(10, 10));
        assert_eq!(joiner.field().turn_time(), 100);
        assert_eq!(joiner.seed, master.seed);

        // Every queue is pre-filled with exactly FUTURE_TURNS empty commands.
        assert_eq!(master.self_commands.len(), FUTURE_TURNS);
        assert_eq!(master.players[&1].len(), FUTURE_TURNS);
        assert_eq!(joiner.self_commands.len(), FUTURE_TURNS);
        assert_eq!(joiner.players[&0].len(), FUTURE_TURNS);
    }

    #[test]
    fn test_lockstep_commit_and_apply() {
        let (mut master, mut joiner) = start_pair();

        master.add_unit(Vector::new(4, 5));
        master.add_unit(Vector::new(5, 5));
        master.add_unit(Vector::new(6, 5));

        for _ in 0..=FUTURE_TURNS {
            master.turn();
            joiner.turn();
            pump(&mut [&mut master, &mut joiner], 20);
        }

        assert!(!master.is_destroyed());
        assert!(!joiner.is_destroyed());

        assert_ne!(master.field().unit_count(), 0);
        assert_eq!(snapshot(master.field()), snapshot(joiner.field()));
        assert_eq!(master.field().checksum(), joiner.field().checksum());
    }

    #[test]
    fn test_preset_placement_stays_in_lockstep() {
        let (mut master, mut joiner) = start_pair();

        assert!(master.add_preset(Matrix3x3::translation(Vector::new(9, 0)), 0));

        for _ in 0..=FUTURE_TURNS {
            master.turn();
            joiner.turn();
            pump(&mut [&mut master, &mut joiner], 20);
        }

        assert_ne!(master.field().unit_count(), 0);
        assert_eq!(snapshot(master.field()), snapshot(joiner.field()));
        assert_eq!(master.field().checksum(), joiner.field().checksum());
    }

    #[test]
    fn test_missing_commands_pause_the_engine() {
        let (mut master, _joiner) = start_pair();

        // Without pumping the joiner, its queue drains in FUTURE_TURNS
        // turns and the engine refuses to run further.
        for _ in 0..FUTURE_TURNS {
            assert!(!master.is_pause());
            master.turn();
        }

        assert!(master.is_pause());
        let checksum = master.field().checksum();
        master.turn();
        assert_eq!(master.field().checksum(), checksum);
    }

    #[test]
    fn test_pause_propagates_to_peers() {
        let (mut master, mut joiner) = start_pair();

        master.toggle_pause();
        pump_until(&mut [&mut master, &mut joiner], |peers| peers[1].pause);
        assert!(joiner.is_pause());

        master.toggle_pause();
        pump_until(&mut [&mut master, &mut joiner], |peers| !peers[1].pause);
        assert!(!joiner.is_pause());
    }

    #[test]
    fn test_divergence_destroys_the_session() {
        let (_master, mut joiner) = start_pair();

        // Corrupt the master's next queued command on the joiner's side.
        let queue = joiner.players.get_mut(&0).unwrap();
        queue.pop_front();
        queue.push_front(Command::Complex {
            turn_step: 99,
            checksum: 7,
            commands: Vec::new(),
        });

        joiner.turn();

        assert!(joiner.is_destroyed());
        assert_eq!(joiner.field().unit_count(), 0);
    }

    #[test]
    fn test_late_connection_is_rejected() {
        let (mut master, mut joiner) = start_pair();
        let address: std::net::SocketAddr = master.listener_address().unwrap().parse().unwrap();

        let mut late = std::net::TcpStream::connect(address).unwrap();
        late.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

        pump(&mut [&mut master, &mut joiner], 20);

        // The master dropped the socket without registering it.
        let mut buffer = [0u8; 16];
        let read = late.read(&mut buffer).unwrap_or(0);
        assert_eq!(read, 0);
    }

    #[test]
    fn test_master_handoff_elects_smallest_id() {
        let mut master = master_peer(3);
        let address = master.listener_address().unwrap();

        let handle = spawn_joiner(address.clone());
        while !handle.is_finished() {
            master.update(false).unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        let mut first = handle.join().unwrap();

        let handle = spawn_joiner(address);
        while !handle.is_finished() {
            master.update(false).unwrap();
            first.update(false).unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        let mut second = handle.join().unwrap();

        pump_until(&mut [&mut master, &mut first, &mut second], |peers| {
            peers.iter().all(|peer| peer.is_game_started())
        });

        assert_eq!(first.field().player(), 1);
        assert_eq!(second.field().player(), 2);

        // Player 0 goes away mid-game.
        master.destroy();
        drop(master);

        pump_until(&mut [&mut first, &mut second], |peers| {
            peers[0].is_master() && !peers[0].is_destroyed()
        });

        // Player 1 is the smallest surviving id and takes over; player 2
        // keeps its connection to player 1 as the new master.
        assert!(first.is_master());
        assert!(!second.is_destroyed());
        assert!(!second.is_master());

        let master_token = second.master.unwrap();
        assert_eq!(second.ids[&master_token], 1);

        assert!(!first.players.contains_key(&0));
        assert!(!second.players.contains_key(&0));
    }

    #[test]
    fn test_departure_before_start_destroys_session() {
        let mut master = master_peer(3);
        let address = master.listener_address().unwrap();

        let handle = spawn_joiner(address);
        while !handle.is_finished() {
            master.update(false).unwrap();
            thread::sleep(Duration::from_millis(1));
        }
        let mut joiner = handle.join().unwrap();

        assert!(!joiner.is_game_started());

        // The barrier cannot recover from a departure; the joiner folds.
        joiner.destroy();
        drop(joiner);

        pump_until(&mut [&mut master], |peers| peers[0].is_destroyed());
    }
}
