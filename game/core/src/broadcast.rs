//! View-based broadcast pipeline (§4.13): for each dirty player, finds viewers via the spatial
//! index, accumulates per-viewer batches, and turns them into `Batch_Player_Spatial` /
//! `Left_Game` frames on the right connections.

use hashbrown::{HashMap, HashSet};
use neutronium::identity::PlayerId;
use neutronium::net::ConnectionRegistry;
use neutronium::wire::packet::{self, PlayerSnapshot};
use neutronium::world::{PlayerRegistry, World};

fn snapshot_of(registry: &PlayerRegistry, id: PlayerId) -> Option<PlayerSnapshot> {
    registry.get(id).map(|p| PlayerSnapshot {
        player_id: id.get(),
        x: p.x as u16,
        y: p.y as u16,
        facing: p.facing.as_u8(),
    })
}

/// Runs one tick's worth of dirty-player broadcasting. `dirty` is the set consumed from the
/// `PlayerRegistry` this tick; `conn_registry` resolves a player's owning connection to enqueue
/// outgoing frames on.
///
/// For each mover, diffs its Chebyshev neighborhood against `VisibilityTracker::update`'s record
/// of who it last knew about (§4.9's "Primary operation"). Since the range check is symmetric,
/// a newly-entered neighbor is told about the mover in the same pass (and vice versa), and a
/// newly-out-of-range neighbor gets `Left_Game` for the mover (and vice versa) — this is what
/// catches a player drifting out of another's view without disconnecting.
pub fn broadcast_dirty(
    world: &mut World,
    registry: &PlayerRegistry,
    conn_registry: &ConnectionRegistry,
    dirty: impl IntoIterator<Item = PlayerId>,
    view_range: i16,
) {
    let mut batches: HashMap<PlayerId, Vec<PlayerSnapshot>> = HashMap::new();
    let mut departures: HashMap<PlayerId, Vec<PlayerId>> = HashMap::new();

    for mover in dirty {
        let Some(mover_player) = registry.get(mover) else { continue };
        let Some(mover_snapshot) = snapshot_of(registry, mover) else { continue };

        let nearby: HashSet<PlayerId> = world
            .players_in_range(registry, mover_player.x, mover_player.y, view_range)
            .into_iter()
            .filter(|&id| id != mover)
            .collect();

        let diff = world.visibility.update(mover, &nearby);

        for subject in diff.entered {
            if let Some(subject_snapshot) = snapshot_of(registry, subject) {
                batches.entry(mover).or_default().push(subject_snapshot);
            }
            world.visibility.add_known(subject, mover);
            batches.entry(subject).or_default().push(mover_snapshot);
        }

        for subject in diff.left {
            departures.entry(mover).or_default().push(subject);
            world.visibility.remove_known(subject, mover);
            departures.entry(subject).or_default().push(mover);
        }
    }

    for (viewer, snapshots) in batches {
        let Some(conn_id) = registry.connection_id_for_player(viewer) else { continue };
        let Some(conn) = conn_registry.get(conn_id) else { continue };
        for frame in packet::batch_player_spatial(&snapshots) {
            conn.enqueue(frame);
        }
    }

    for (viewer, gone) in departures {
        let Some(conn_id) = registry.connection_id_for_player(viewer) else { continue };
        let Some(conn) = conn_registry.get(conn_id) else { continue };
        for subject in gone {
            conn.enqueue(packet::left_game(subject.get() as u32));
        }
    }
}

/// On login: seeds `new_player`'s known set, sends `Welcome`, sends one batch containing every
/// currently-visible player (including the new player, for authoritative self-sync), and tells
/// every viewer already in range about the newcomer (§4.13).
pub fn broadcast_login(
    world: &mut World,
    registry: &PlayerRegistry,
    conn_registry: &ConnectionRegistry,
    new_player: PlayerId,
    view_range: i16,
) {
    let Some(me) = registry.get(new_player) else { return };
    let (x, y) = (me.x, me.y);
    let facing = me.facing.as_u8();

    let visible_now = world.players_in_range(registry, x, y, view_range);
    let visible_excluding_self: Vec<PlayerId> = visible_now.iter().copied().filter(|&id| id != new_player).collect();
    world.visibility.initialize(new_player, visible_excluding_self.iter().copied());

    if let Some(conn_id) = registry.connection_id_for_player(new_player) {
        if let Some(conn) = conn_registry.get(conn_id) {
            conn.enqueue(packet::welcome(new_player.get() as u32, x as u16, y as u16, facing));

            let mut snapshots: Vec<PlayerSnapshot> = visible_now
                .iter()
                .filter_map(|&id| snapshot_of(registry, id))
                .collect();
            if let Some(self_snapshot) = snapshot_of(registry, new_player) {
                snapshots.push(self_snapshot);
            }
            for frame in packet::batch_player_spatial(&snapshots) {
                conn.enqueue(frame);
            }
        }
    }

    if let Some(new_snapshot) = snapshot_of(registry, new_player) {
        for &viewer in &visible_excluding_self {
            if let Some(conn_id) = registry.connection_id_for_player(viewer) {
                if let Some(conn) = conn_registry.get(conn_id) {
                    for frame in packet::batch_player_spatial(&[new_snapshot]) {
                        conn.enqueue(frame);
                    }
                }
            }
            world.visibility.add_known(viewer, new_player);
        }
    }
}

/// On disconnect: queries viewers *before* removal, tells each (other than the leaver) that the
/// player left, then removes the player from Spatial/Visibility/Registry (§4.13). Removal from
/// `PlayerRegistry` is the caller's responsibility once this returns, since the registry borrow
/// here is immutable. Observers are found the same way `broadcast_dirty` finds them — a direct
/// Chebyshev query against the leaver's last position — rather than through the visibility
/// tracker's reverse index, since that index only tells us who was known as of the last diff,
/// not who is actually still in range right now.
pub fn broadcast_departure(
    world: &mut World,
    registry: &PlayerRegistry,
    conn_registry: &ConnectionRegistry,
    leaver: PlayerId,
    view_range: i16,
) {
    let Some(player) = registry.get(leaver) else { return };
    let (x, y) = (player.x, player.y);

    let observers = world.players_in_range(registry, x, y, view_range);

    for observer in observers {
        if observer == leaver {
            continue;
        }
        if let Some(conn_id) = registry.connection_id_for_player(observer) {
            if let Some(conn) = conn_registry.get(conn_id) {
                conn.enqueue(packet::left_game(leaver.get() as u32));
            }
        }
    }

    world.remove_player(leaver);
}

#[cfg(test)]
mod tests {
    use super::*;
    use neutronium::identity::ConnectionId;
    use neutronium::world::Facing;
    use std::net::{TcpListener, TcpStream as StdTcpStream};
    use std::sync::Arc;
    use std::time::Duration;

    fn make_conn(registry: &ConnectionRegistry, conn_id: u64) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = StdTcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        let conn = Arc::new(neutronium::net::Connection::new(
            ConnectionId::new(conn_id),
            "127.0.0.1".to_string(),
            mio::net::TcpStream::from_std(server),
            Duration::from_secs(5),
        ));
        registry.insert(conn);
    }

    #[test]
    fn broadcast_dirty_enqueues_batch_only_on_in_range_viewer() {
        let mut world = World::new(64, 64);
        let mut registry = PlayerRegistry::new();
        let conn_registry = ConnectionRegistry::new();

        make_conn(&conn_registry, 1);
        make_conn(&conn_registry, 2);
        make_conn(&conn_registry, 3);

        let a = registry.create_player(ConnectionId::new(1), 0, 0, Facing::South).unwrap();
        let b = registry.create_player(ConnectionId::new(2), 5, 5, Facing::South).unwrap();
        let c = registry.create_player(ConnectionId::new(3), 40, 40, Facing::South).unwrap();
        world.add_player(a, 0, 0);
        world.add_player(b, 5, 5);
        world.add_player(c, 40, 40);

        broadcast_dirty(&mut world, &registry, &conn_registry, vec![a], 10);

        let conn_b = conn_registry.get(ConnectionId::new(2)).unwrap();
        let conn_c = conn_registry.get(ConnectionId::new(3)).unwrap();
        assert!(conn_b.has_pending_writes());
        assert!(!conn_c.has_pending_writes());
    }

    #[test]
    fn broadcast_dirty_tells_both_sides_when_a_mover_drifts_out_of_range() {
        let mut world = World::new(64, 64);
        let mut registry = PlayerRegistry::new();
        let conn_registry = ConnectionRegistry::new();

        make_conn(&conn_registry, 1);
        make_conn(&conn_registry, 2);

        let a = registry.create_player(ConnectionId::new(1), 0, 0, Facing::South).unwrap();
        let b = registry.create_player(ConnectionId::new(2), 5, 5, Facing::South).unwrap();
        world.add_player(a, 0, 0);
        world.add_player(b, 5, 5);

        // First tick: a and b see each other and the tracker records it.
        broadcast_dirty(&mut world, &registry, &conn_registry, vec![a], 10);
        assert!(world.visibility.knows(a, b));
        assert!(world.visibility.knows(b, a));

        // a moves far enough away that neither side is still in range of the other.
        registry.get_mut(a).unwrap().x = 50;
        registry.get_mut(a).unwrap().y = 50;
        world.update_player_position(a, 50, 50);

        let conn_a = conn_registry.get(ConnectionId::new(1)).unwrap();
        let conn_b = conn_registry.get(ConnectionId::new(2)).unwrap();
        conn_a.flush_send_queue().unwrap();
        conn_b.flush_send_queue().unwrap();

        broadcast_dirty(&mut world, &registry, &conn_registry, vec![a], 10);

        assert!(!world.visibility.knows(a, b));
        assert!(!world.visibility.knows(b, a));
        assert!(conn_a.has_pending_writes());
        assert!(conn_b.has_pending_writes());
    }
}
