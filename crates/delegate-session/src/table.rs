//! The collision tree that stores sessions by id.
//!
//! The table is `width` buckets wide. Each occupied slot holds a node
//! with `width` child slots of its own, so colliding ids hang off the
//! node that got there first:
//!
//! ```text
//! buckets:  [ 0 ][ 1 ] ... [18]          width = 19
//!             │
//!           id 0 ── children[1] → id 19
//!                └─ children[2] → id 38
//! ```
//!
//! The bucket is `id % width`. At depth `d` the child slot is digit `d`
//! of the id in base `width`, so two different ids part ways no later
//! than their first differing digit. That bounds the depth by the digit
//! count of a `u64` (16 levels at width 19), whatever the id pattern.
//!
//! `SessionTable` is NOT thread-safe by itself; [`SessionRegistry`]
//! wraps it in a mutex.
//!
//! [`SessionRegistry`]: crate::SessionRegistry

use delegate_protocol::SessionId;

use crate::{Session, SessionError, SessionStatus};

type Slot = Option<Box<Node>>;

struct Node {
    session: Session,
    children: Box<[Slot]>,
}

impl Node {
    fn new(session: Session, width: usize) -> Box<Self> {
        Box::new(Self {
            session,
            children: empty_slots(width),
        })
    }
}

fn empty_slots(width: usize) -> Box<[Slot]> {
    (0..width).map(|_| None).collect()
}

/// Fixed-width bucket table with a bounded-depth collision tree.
pub struct SessionTable {
    width: u64,
    buckets: Box<[Slot]>,
    len: usize,
}

impl SessionTable {
    /// Creates an empty table. Widths below 2 are raised to 2.
    pub fn new(width: usize) -> Self {
        let width = width.max(2);
        Self {
            width: width as u64,
            buckets: empty_slots(width),
            len: 0,
        }
    }

    /// Number of top-level buckets.
    pub fn width(&self) -> usize {
        self.width as usize
    }

    /// Number of sessions stored anywhere in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn digit(&self, key: u64) -> usize {
        (key % self.width) as usize
    }

    /// Stores `session`, marking it `Active`.
    ///
    /// # Errors
    /// Returns [`SessionError::DuplicateId`] if the id is already stored.
    /// The existing record is left untouched.
    pub fn insert(&mut self, mut session: Session) -> Result<(), SessionError> {
        let id = session.id;
        let width = self.width;
        let mut key = id.0;
        let mut slot = &mut self.buckets[(key % width) as usize];

        while let Some(node) = slot {
            if node.session.id == id {
                return Err(SessionError::DuplicateId(id));
            }
            key /= width;
            slot = &mut node.children[(key % width) as usize];
        }

        session.status = SessionStatus::Active;
        *slot = Some(Node::new(session, width as usize));
        self.len += 1;
        Ok(())
    }

    /// Returns the stored session with this id.
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        let mut key = id.0;
        let mut slot = &self.buckets[self.digit(key)];

        while let Some(node) = slot {
            if node.session.id == id {
                return Some(&node.session);
            }
            key /= self.width;
            slot = &node.children[self.digit(key)];
        }
        None
    }

    /// Returns the stored session with this id, mutably.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        let width = self.width;
        let slot = &mut self.buckets[(id.0 % width) as usize];
        find_mut(slot, id, id.0, width).map(|node| &mut node.session)
    }

    /// Removes the session with this id and returns it as `Closed`.
    ///
    /// Every descendant of the removed node is detached and reinserted
    /// through [`insert`](Self::insert) before this returns, so sessions
    /// that merely collided with the removed one stay reachable.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no session has this id.
    pub fn remove(&mut self, id: SessionId) -> Result<Session, SessionError> {
        let width = self.width;
        let slot = &mut self.buckets[(id.0 % width) as usize];
        let mut node =
            detach(slot, id, id.0, width).ok_or(SessionError::NotFound(id))?;

        let mut orphans = Vec::new();
        drain_descendants(&mut node, &mut orphans);
        self.len -= 1 + orphans.len();

        for orphan in orphans {
            let orphan_id = orphan.id;
            if let Err(e) = self.insert(orphan) {
                // Unreachable while ids are unique; the tree held each
                // orphan exactly once.
                tracing::error!(
                    session_id = %orphan_id,
                    error = %e,
                    "failed to reparent session"
                );
            }
        }

        let mut session = node.session;
        session.status = SessionStatus::Closed;
        Ok(session)
    }

    /// Returns every stored id, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut out = Vec::with_capacity(self.len);
        for slot in self.buckets.iter() {
            collect_ids(slot, &mut out);
        }
        out.sort_unstable();
        out
    }

    /// Depth of the deepest node (0 for an empty table, 1 for a table
    /// with no collisions).
    pub fn depth(&self) -> usize {
        self.buckets.iter().map(slot_depth).max().unwrap_or(0)
    }
}

impl std::fmt::Debug for SessionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTable")
            .field("width", &self.width)
            .field("len", &self.len)
            .finish()
    }
}

fn find_mut(
    slot: &mut Slot,
    id: SessionId,
    key: u64,
    width: u64,
) -> Option<&mut Node> {
    let node = slot.as_deref_mut()?;
    if node.session.id == id {
        Some(node)
    } else {
        let key = key / width;
        find_mut(&mut node.children[(key % width) as usize], id, key, width)
    }
}

fn detach(
    slot: &mut Slot,
    id: SessionId,
    key: u64,
    width: u64,
) -> Option<Box<Node>> {
    let found = matches!(slot, Some(node) if node.session.id == id);
    if found {
        return slot.take();
    }
    let node = slot.as_deref_mut()?;
    let key = key / width;
    detach(&mut node.children[(key % width) as usize], id, key, width)
}

/// Empties every child slot below `node`, depth first.
fn drain_descendants(node: &mut Node, out: &mut Vec<Session>) {
    for child in node.children.iter_mut() {
        if let Some(mut child) = child.take() {
            drain_descendants(&mut child, out);
            out.push(child.session);
        }
    }
}

fn collect_ids(slot: &Slot, out: &mut Vec<SessionId>) {
    if let Some(node) = slot {
        out.push(node.session.id);
        for child in node.children.iter() {
            collect_ids(child, out);
        }
    }
}

fn slot_depth(slot: &Slot) -> usize {
    match slot {
        None => 0,
        Some(node) => 1 + node.children.iter().map(slot_depth).max().unwrap_or(0),
    }
}
