//! # Connection Index
//!
//! Spatial lookup of connection points. Every connection on the workspace lives in
//! one of four buckets, each sorted by Y so that a snap search only has to look at a
//! narrow band of the list around the dragged connection.
//!
//! Statement-input connections behave like `Next` connections (they accept a
//! `Previous`), so they are bucketed with them.

use crate::model::{BlockGraph, ConnectionId, ConnectionType};
use glam::Vec2;
use thiserror::Error;

/// Why two connections may not be joined.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("connection does not exist")]
    Missing,
    #[error("both connections belong to the same block")]
    SelfConnection,
    #[error("connection types are not compatible")]
    WrongType,
    #[error("type checks do not match")]
    ChecksFailed,
    #[error("connection is being dragged")]
    InDragMode,
    #[error("connections are already linked to each other")]
    AlreadyLinked,
    #[error("connections are too far apart")]
    OutOfRange,
    #[error("connection is already occupied")]
    Occupied,
    #[error("occupying block cannot be moved")]
    Unmovable,
    #[error("connection would create a cycle")]
    CreatesCycle,
    #[error("procedure calls would be left without their definition")]
    StrandsReferences,
}

/// The bucket a connection is matched in.
fn match_kind(graph: &BlockGraph, id: ConnectionId) -> Option<ConnectionType> {
    let conn = graph.connection(id)?;
    Some(if conn.is_statement_input() {
        ConnectionType::Next
    } else {
        conn.kind
    })
}

/// Checks the connection rules that do not depend on distance, occupancy or drag
/// state: block identity, shape compatibility and type checks.
pub(crate) fn check_shape(
    graph: &BlockGraph,
    a: ConnectionId,
    b: ConnectionId,
) -> Result<(), RejectReason> {
    let (Some(conn_a), Some(conn_b)) = (graph.connection(a), graph.connection(b)) else {
        return Err(RejectReason::Missing);
    };
    if conn_a.block == conn_b.block {
        return Err(RejectReason::SelfConnection);
    }
    let (Some(kind_a), Some(kind_b)) = (match_kind(graph, a), match_kind(graph, b)) else {
        return Err(RejectReason::Missing);
    };
    if kind_a.opposite() != kind_b {
        return Err(RejectReason::WrongType);
    }
    if !conn_a.checks_compatible(conn_b) {
        return Err(RejectReason::ChecksFailed);
    }
    if conn_a.target() == Some(b) {
        return Err(RejectReason::AlreadyLinked);
    }
    Ok(())
}

/// Full legality test used while dragging.
///
/// `moving` is the connection on the dragged block, `candidate` the one already on
/// the workspace. Only free `Next`/`Input` candidates, or occupied ones that can be
/// spliced/bumped, are accepted; `Previous`/`Output` candidates must be free on both
/// ends.
pub fn check_connection(
    graph: &BlockGraph,
    moving: ConnectionId,
    candidate: ConnectionId,
    max_radius: f32,
) -> Result<(), RejectReason> {
    check_shape(graph, moving, candidate)?;
    let (Some(a), Some(b)) = (graph.connection(moving), graph.connection(candidate)) else {
        return Err(RejectReason::Missing);
    };

    if b.in_drag_mode() {
        return Err(RejectReason::InDragMode);
    }
    if a.distance_from(b) > max_radius {
        return Err(RejectReason::OutOfRange);
    }

    if b.kind.is_parent_link() && (b.is_connected() || a.is_connected()) {
        return Err(RejectReason::Occupied);
    }
    if a.kind.is_parent_link() && a.is_connected() {
        return Err(RejectReason::Occupied);
    }

    if !b.kind.is_parent_link()
        && let Some(occupant) = graph.target_block(candidate)
        && graph.block(occupant).is_some_and(|block| !block.is_movable())
    {
        return Err(RejectReason::Unmovable);
    }

    if graph.is_descendant_of(a.block, b.block) || graph.is_descendant_of(b.block, a.block) {
        return Err(RejectReason::CreatesCycle);
    }
    Ok(())
}

/// A list of connections kept sorted by ascending Y position.
#[derive(Clone, Debug, Default)]
pub struct YSortedList {
    connections: Vec<ConnectionId>,
}

fn y_of(graph: &BlockGraph, id: ConnectionId) -> f32 {
    graph.connection(id).map_or(f32::NAN, |c| c.position().y)
}

impl YSortedList {
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<ConnectionId> {
        self.connections.clone()
    }

    /// Index of the first entry whose Y is not below `y`.
    pub fn find_position_for_y(&self, graph: &BlockGraph, y: f32) -> usize {
        self.connections.partition_point(|&c| y_of(graph, c) < y)
    }

    pub fn add(&mut self, graph: &BlockGraph, id: ConnectionId) {
        let idx = self.find_position_for_y(graph, y_of(graph, id));
        self.connections.insert(idx, id);
    }

    /// Finds `id` by binary search on its current Y, then scans entries with equal Y.
    pub fn find(&self, graph: &BlockGraph, id: ConnectionId) -> Option<usize> {
        let y = y_of(graph, id);
        let start = self.find_position_for_y(graph, y);
        self.connections[start..]
            .iter()
            .take_while(|&&c| y_of(graph, c) <= y)
            .position(|&c| c == id)
            .map(|offset| start + offset)
    }

    pub fn remove(&mut self, graph: &BlockGraph, id: ConnectionId) -> bool {
        match self.find(graph, id) {
            Some(idx) => {
                self.connections.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.connections.clear();
    }

    /// Closest connection that `conn` may legally join within `max_radius`.
    ///
    /// Scans down from the insertion point, then up, and stops a direction once the
    /// Y distance alone exceeds the radius. On equal distances the first candidate
    /// found in that scan order is kept.
    pub fn search_for_closest(
        &self,
        graph: &BlockGraph,
        conn: ConnectionId,
        max_radius: f32,
    ) -> Option<ConnectionId> {
        let moving = graph.connection(conn)?;
        if self.connections.is_empty() {
            return None;
        }
        let base_y = moving.position().y;
        let start = self.find_position_for_y(graph, base_y);
        let mut best: Option<(ConnectionId, f32)> = None;

        let mut consider = |candidate: ConnectionId| {
            if check_connection(graph, conn, candidate, max_radius).is_err() {
                return;
            }
            let Some(other) = graph.connection(candidate) else {
                return;
            };
            let distance = moving.distance_from(other);
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((candidate, distance));
            }
        };

        for &candidate in self.connections[..start].iter().rev() {
            if (y_of(graph, candidate) - base_y).abs() > max_radius {
                break;
            }
            consider(candidate);
        }
        for &candidate in &self.connections[start..] {
            if (y_of(graph, candidate) - base_y).abs() > max_radius {
                break;
            }
            consider(candidate);
        }

        best.map(|(candidate, _)| candidate)
    }

    /// Every entry within `max_radius` of `position`, legal or not.
    pub fn neighbours(&self, graph: &BlockGraph, position: Vec2, max_radius: f32) -> Vec<ConnectionId> {
        let start = self.find_position_for_y(graph, position.y - max_radius);
        self.connections[start..]
            .iter()
            .copied()
            .take_while(|&c| y_of(graph, c) <= position.y + max_radius)
            .filter(|&c| {
                graph
                    .connection(c)
                    .is_some_and(|other| other.position().distance(position) <= max_radius)
            })
            .collect()
    }

    pub fn is_sorted(&self, graph: &BlockGraph) -> bool {
        self.connections
            .windows(2)
            .all(|pair| y_of(graph, pair[0]) <= y_of(graph, pair[1]))
    }
}

/// Index of all connections that may take part in a snap.
#[derive(Clone, Debug, Default)]
pub struct ConnectionManager {
    lists: [YSortedList; 4],
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn list_for(&self, graph: &BlockGraph, id: ConnectionId) -> Option<&YSortedList> {
        match_kind(graph, id).map(|kind| &self.lists[kind.index()])
    }

    fn list_for_mut(&mut self, graph: &BlockGraph, id: ConnectionId) -> Option<&mut YSortedList> {
        match_kind(graph, id).map(|kind| &mut self.lists[kind.index()])
    }

    /// Inserts a connection. Connections in drag mode are never indexed.
    pub fn add_connection(&mut self, graph: &BlockGraph, id: ConnectionId) {
        let Some(conn) = graph.connection(id) else {
            return;
        };
        if conn.in_drag_mode() || self.contains(graph, id) {
            return;
        }
        if let Some(list) = self.list_for_mut(graph, id) {
            list.add(graph, id);
        }
    }

    /// Removes a connection. No-op if it is in drag mode or was never added.
    pub fn remove_connection(&mut self, graph: &BlockGraph, id: ConnectionId) -> bool {
        if graph.connection(id).is_none_or(|c| c.in_drag_mode()) {
            return false;
        }
        self.list_for_mut(graph, id)
            .is_some_and(|list| list.remove(graph, id))
    }

    /// Moves a connection to `new_position + offset`, keeping its bucket sorted.
    ///
    /// A connection in drag mode only has its position updated; it is reinserted
    /// when the drag ends.
    pub fn move_connection_to(
        &mut self,
        graph: &mut BlockGraph,
        id: ConnectionId,
        new_position: Vec2,
        offset: Vec2,
    ) {
        let target = new_position + offset;
        let Some(conn) = graph.connection(id) else {
            return;
        };
        if conn.position() == target {
            return;
        }
        let reindex = !conn.in_drag_mode() && self.remove_connection(graph, id);
        if let Some(conn) = graph.connections.get_mut(id) {
            conn.position = target;
        }
        if reindex {
            self.add_connection(graph, id);
        }
    }

    pub fn contains(&self, graph: &BlockGraph, id: ConnectionId) -> bool {
        self.list_for(graph, id)
            .is_some_and(|list| list.find(graph, id).is_some())
    }

    /// Snapshot of one bucket. Statement-input connections are reported under `Next`.
    pub fn connections(&self, kind: ConnectionType) -> Vec<ConnectionId> {
        self.lists[kind.index()].to_vec()
    }

    pub fn list(&self, kind: ConnectionType) -> &YSortedList {
        &self.lists[kind.index()]
    }

    pub fn len(&self) -> usize {
        self.lists.iter().map(YSortedList::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(YSortedList::is_empty)
    }

    pub fn clear(&mut self) {
        self.lists.iter_mut().for_each(YSortedList::clear);
    }

    pub fn is_connection_allowed(
        &self,
        graph: &BlockGraph,
        moving: ConnectionId,
        candidate: ConnectionId,
        max_radius: f32,
    ) -> bool {
        check_connection(graph, moving, candidate, max_radius).is_ok()
    }

    /// Closest legal match for `conn` within `max_radius`.
    pub fn closest_connection(
        &self,
        graph: &BlockGraph,
        conn: ConnectionId,
        max_radius: f32,
    ) -> Option<ConnectionId> {
        let kind = match_kind(graph, conn)?;
        self.lists[kind.opposite().index()].search_for_closest(graph, conn, max_radius)
    }

    /// All connections of the opposite shape within `max_radius`, legal or not.
    pub fn neighbours(
        &self,
        graph: &BlockGraph,
        conn: ConnectionId,
        max_radius: f32,
    ) -> Vec<ConnectionId> {
        let (Some(kind), Some(c)) = (match_kind(graph, conn), graph.connection(conn)) else {
            return Vec::new();
        };
        self.lists[kind.opposite().index()].neighbours(graph, c.position(), max_radius)
    }

    pub fn is_sorted(&self, graph: &BlockGraph) -> bool {
        self.lists.iter().all(|list| list.is_sorted(graph))
    }
}
