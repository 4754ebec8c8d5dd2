//! 顶点环：以节点池（arena）承载的双向链表，可在开放链与闭合环之间切换。
//!
//! 节点通过 [`NodeKey`] 寻址，`prev`/`next` 只是池内下标，因此不存在所有权环。
//! 从环中摘除的节点仍留在池里并保留原先的邻接关系，撤销/重做时可以把
//! 同一个节点原样接回，外部持有的 `NodeKey` 在整个编辑会话中保持有效。
//! 摘除的节点在 [`VertexRing::reset`] 之前不会回收；重置清空节点池并推进世代，
//! 重置前取得的句柄随之失效。

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::geometry::LatLng;
use crate::vertex::{Vertex, VertexId};

pub mod policy;

pub use policy::BreakOutcome;

/// 节点池中的稳定句柄：池内槽位加上节点池的世代。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    epoch: u32,
    slot: u32,
}

impl NodeKey {
    #[inline]
    fn index(self) -> usize {
        self.slot as usize
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    vertex: Vertex,
    prev: Option<NodeKey>,
    next: Option<NodeKey>,
}

impl Node {
    #[inline]
    pub fn vertex(&self) -> &Vertex {
        &self.vertex
    }

    #[inline]
    pub fn prev(&self) -> Option<NodeKey> {
        self.prev
    }

    #[inline]
    pub fn next(&self) -> Option<NodeKey> {
        self.next
    }
}

/// 摘除记录：节点句柄以及它在摘除前是否位于头/尾。
///
/// 节点自身仍保留摘除前的 `prev`/`next`，配合本记录即可由
/// [`VertexRing::restore`] 精确还原。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    pub key: NodeKey,
    pub was_head: bool,
    pub was_tail: bool,
}

/// 环结构变化通知。环只负责缓冲，由上层在操作完成后统一分发。
#[derive(Debug, Clone, PartialEq)]
pub enum RingEvent {
    Changed {
        head: Option<VertexId>,
        tail: Option<VertexId>,
        size: usize,
    },
    Cleared,
    Closed,
    Broken {
        at: LatLng,
    },
    VertexInserted {
        id: VertexId,
        position: LatLng,
    },
    VertexMoved {
        id: VertexId,
        from: LatLng,
        to: LatLng,
    },
    VertexPromoted {
        id: VertexId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    SizeMismatch { size: usize, indexed: usize },
    HeadTailMismatch,
    SingleNodeLinked,
    InvalidBoundary,
    BrokenLink { at: VertexId },
    UnindexedNode { at: VertexId },
    TailNotReached,
}

impl Display for InvariantViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InvariantViolation::SizeMismatch { size, indexed } => {
                write!(f, "size {size} 与索引条目数 {indexed} 不一致")
            }
            InvariantViolation::HeadTailMismatch => write!(f, "头尾指针只有一个为空"),
            InvariantViolation::SingleNodeLinked => write!(f, "单节点环仍带有链接"),
            InvariantViolation::InvalidBoundary => {
                write!(f, "边界链接既不是开放链也不是闭合环")
            }
            InvariantViolation::BrokenLink { at } => write!(f, "顶点 {at} 的前后链接不对称"),
            InvariantViolation::UnindexedNode { at } => {
                write!(f, "顶点 {at} 可从头部遍历到但不在索引中")
            }
            InvariantViolation::TailNotReached => write!(f, "遍历 size 步后没有停在尾节点"),
        }
    }
}

impl Error for InvariantViolation {}

#[derive(Debug, Clone, Default)]
pub struct VertexRing {
    nodes: Vec<Node>,
    epoch: u32,
    head: Option<NodeKey>,
    tail: Option<NodeKey>,
    size: usize,
    index: HashMap<VertexId, NodeKey>,
    auto_midpoints: bool,
    next_vertex_id: u64,
    events: Vec<RingEvent>,
}

impl VertexRing {
    /// `auto_midpoints` 决定辅助中点模式，影响闭合/断开阈值。
    pub fn new(auto_midpoints: bool) -> Self {
        Self {
            auto_midpoints,
            next_vertex_id: 1,
            ..Self::default()
        }
    }

    #[inline]
    pub fn auto_midpoints(&self) -> bool {
        self.auto_midpoints
    }

    /// 分配一个从未在本环中出现过的顶点 ID。
    pub fn next_id(&mut self) -> VertexId {
        let id = VertexId::new(self.next_vertex_id);
        self.next_vertex_id += 1;
        id
    }

    /// 下一次 [`next_id`](Self::next_id) 将分配的 ID，不消耗。
    #[inline]
    pub fn peek_next_id(&self) -> VertexId {
        VertexId::new(self.next_vertex_id)
    }

    /// 使 ID 生成器越过外部给定的 ID。
    pub fn reserve_id(&mut self, id: VertexId) {
        if id.get() >= self.next_vertex_id {
            self.next_vertex_id = id.get() + 1;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn head(&self) -> Option<NodeKey> {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> Option<NodeKey> {
        self.tail
    }

    /// 判断句柄当前是否挂在环上（而不只是躺在节点池里）。
    pub fn is_linked(&self, key: NodeKey) -> bool {
        self.node(key)
            .is_some_and(|node| self.index.get(&node.vertex.id) == Some(&key))
    }

    /// 返回节点，包括已摘除但仍保存在池中的节点。其他世代的句柄返回 `None`。
    #[inline]
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        if key.epoch != self.epoch {
            return None;
        }
        self.nodes.get(key.index())
    }

    /// 节点池中的节点数，包括已摘除、等待撤销/重做接回的节点。
    #[inline]
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn vertex(&self, key: NodeKey) -> Option<&Vertex> {
        self.node(key).map(Node::vertex)
    }

    #[inline]
    pub fn key_of(&self, id: VertexId) -> Option<NodeKey> {
        self.index.get(&id).copied()
    }

    pub fn find_node_by_id(&self, id: VertexId) -> Option<&Node> {
        self.key_of(id).and_then(|key| self.node(key))
    }

    pub fn find_vertex_by_id(&self, id: VertexId) -> Option<&Vertex> {
        self.find_node_by_id(id).map(Node::vertex)
    }

    pub fn prev_of(&self, key: NodeKey) -> Option<NodeKey> {
        if self.is_linked(key) {
            self.nodes[key.index()].prev
        } else {
            None
        }
    }

    pub fn next_of(&self, key: NodeKey) -> Option<NodeKey> {
        if self.is_linked(key) {
            self.nodes[key.index()].next
        } else {
            None
        }
    }

    pub fn is_auxiliary(&self, key: NodeKey) -> bool {
        self.vertex(key).is_some_and(|vertex| vertex.is_auxiliary)
    }

    /// 按遍历顺序迭代环上的节点，闭合环只走一圈。
    pub fn iter(&self) -> RingIter<'_> {
        RingIter {
            ring: self,
            cursor: self.head,
            remaining: self.size,
        }
    }

    pub fn ids(&self) -> Vec<VertexId> {
        self.iter().map(|(_, vertex)| vertex.id).collect()
    }

    pub fn positions(&self) -> Vec<LatLng> {
        self.iter().map(|(_, vertex)| vertex.position).collect()
    }

    pub fn primary_count(&self) -> usize {
        self.iter().filter(|(_, vertex)| vertex.is_primary()).count()
    }

    pub fn auxiliary_count(&self) -> usize {
        self.size - self.primary_count()
    }

    /// 在尾部追加顶点。闭合环中新节点插在旧尾与头之间并成为新尾。
    /// 顶点 ID 已存在时返回 `None`。
    pub fn append(&mut self, vertex: Vertex) -> Option<NodeKey> {
        if self.index.contains_key(&vertex.id) {
            return None;
        }
        let circular = self.is_circular();
        let key = self.alloc(vertex)?;
        match (self.head, self.tail) {
            (Some(head), Some(tail)) => {
                self.nodes[tail.index()].next = Some(key);
                self.nodes[key.index()].prev = Some(tail);
                if circular {
                    self.nodes[key.index()].next = Some(head);
                    self.nodes[head.index()].prev = Some(key);
                }
                self.tail = Some(key);
            }
            _ => {
                self.head = Some(key);
                self.tail = Some(key);
            }
        }
        self.index.insert(vertex.id, key);
        self.size += 1;
        self.notify_changed();
        Some(key)
    }

    /// 在 `key` 与其后继之间插入顶点；在尾节点之后插入时新节点成为尾。
    pub fn insert_after(&mut self, key: NodeKey, vertex: Vertex) -> Option<NodeKey> {
        if !self.is_linked(key) || self.index.contains_key(&vertex.id) {
            return None;
        }
        let next = self.nodes[key.index()].next;
        let new_key = self.alloc(vertex)?;
        self.nodes[new_key.index()].prev = Some(key);
        self.nodes[new_key.index()].next = next;
        self.nodes[key.index()].next = Some(new_key);
        if let Some(next) = next {
            self.nodes[next.index()].prev = Some(new_key);
        }
        if self.tail == Some(key) {
            self.tail = Some(new_key);
        }
        self.index.insert(vertex.id, new_key);
        self.size += 1;
        self.notify_changed();
        Some(new_key)
    }

    pub fn remove_by_id(&mut self, id: VertexId) -> Option<Removed> {
        let key = self.key_of(id)?;
        self.remove_key(key)
    }

    /// 摘除节点。被摘除的节点保留原先的 `prev`/`next`，供撤销时重新接回。
    pub fn remove_key(&mut self, key: NodeKey) -> Option<Removed> {
        if !self.is_linked(key) {
            return None;
        }
        let was_head = self.head == Some(key);
        let was_tail = self.tail == Some(key);
        let Node { vertex, prev, next } = self.nodes[key.index()].clone();

        if self.size == 1 {
            self.head = None;
            self.tail = None;
        } else {
            if let Some(prev) = prev {
                self.nodes[prev.index()].next = next;
            }
            if let Some(next) = next {
                self.nodes[next.index()].prev = prev;
            }
            if was_head {
                self.head = next;
            }
            if was_tail {
                self.tail = prev;
            }
        }

        self.index.remove(&vertex.id);
        self.size -= 1;

        if self.size == 1 {
            if let Some(survivor) = self.head {
                self.nodes[survivor.index()].prev = None;
                self.nodes[survivor.index()].next = None;
            }
        }

        self.notify_changed();
        Some(Removed {
            key,
            was_head,
            was_tail,
        })
    }

    /// 按摘除记录把同一节点接回原位。要求环处于该节点刚被摘除后的状态。
    pub fn restore(&mut self, removed: &Removed) -> bool {
        let key = removed.key;
        let Some(node) = self.node(key) else {
            return false;
        };
        if self.index.contains_key(&node.vertex.id) {
            return false;
        }
        let (id, prev, next) = (node.vertex.id, node.prev, node.next);

        if self.size == 0 {
            self.nodes[key.index()].prev = None;
            self.nodes[key.index()].next = None;
            self.head = Some(key);
            self.tail = Some(key);
        } else {
            let neighbours_linked = prev.is_none_or(|prev| self.is_linked(prev))
                && next.is_none_or(|next| self.is_linked(next))
                && (prev.is_some() || next.is_some());
            if !neighbours_linked {
                return false;
            }
            if let Some(prev) = prev {
                self.nodes[prev.index()].next = Some(key);
            }
            if let Some(next) = next {
                self.nodes[next.index()].prev = Some(key);
            }
            if removed.was_head {
                self.head = Some(key);
            }
            if removed.was_tail {
                self.tail = Some(key);
            }
        }

        self.index.insert(id, key);
        self.size += 1;
        self.notify_changed();
        true
    }

    /// 写入坐标并返回旧值。拖拽预览也走这里。
    pub fn set_position(&mut self, key: NodeKey, position: LatLng) -> Option<LatLng> {
        if !self.is_linked(key) {
            return None;
        }
        let slot = &mut self.nodes[key.index()].vertex.position;
        let previous = *slot;
        *slot = position;
        self.notify_changed();
        Some(previous)
    }

    pub fn set_auxiliary(&mut self, key: NodeKey, is_auxiliary: bool) -> Option<bool> {
        if !self.is_linked(key) {
            return None;
        }
        let slot = &mut self.nodes[key.index()].vertex.is_auxiliary;
        let previous = *slot;
        *slot = is_auxiliary;
        self.notify_changed();
        Some(previous)
    }

    /// `id` 是否为遍历顺序中的最后一个主顶点；自动中点模式下的闭合环
    /// 会跳过尾部的闭合辅助点。
    pub fn is_last_primary_vertex(&self, id: VertexId) -> bool {
        let (Some(key), Some(mut last)) = (self.key_of(id), self.tail) else {
            return false;
        };
        if self.auto_midpoints && self.is_circular() && self.is_auxiliary(last) {
            match self.nodes[last.index()].prev {
                Some(prev) => last = prev,
                None => return false,
            }
        }
        last == key && !self.is_auxiliary(key)
    }

    /// 清空环并回收节点池。ID 生成器不回退，旧 ID 不会被再次分配；
    /// 世代前进，旧句柄不会命中新节点。
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.epoch = self.epoch.wrapping_add(1);
        self.head = None;
        self.tail = None;
        self.size = 0;
        self.index.clear();
        self.events.push(RingEvent::Cleared);
        self.notify_changed();
    }

    /// 由命令补充的语义通知（插入、移动、提升）。
    pub fn emit(&mut self, event: RingEvent) {
        self.events.push(event);
    }

    pub fn pending_events(&self) -> &[RingEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<RingEvent> {
        std::mem::take(&mut self.events)
    }

    /// 校验核心不变量，测试与调试断言使用。
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.size != self.index.len() {
            return Err(InvariantViolation::SizeMismatch {
                size: self.size,
                indexed: self.index.len(),
            });
        }
        let (head, tail) = match (self.head, self.tail) {
            (None, None) if self.size == 0 => return Ok(()),
            (Some(head), Some(tail)) if self.size > 0 => (head, tail),
            _ => return Err(InvariantViolation::HeadTailMismatch),
        };

        if self.size == 1 {
            let node = &self.nodes[head.index()];
            if head != tail {
                return Err(InvariantViolation::HeadTailMismatch);
            }
            if node.prev.is_some() || node.next.is_some() {
                return Err(InvariantViolation::SingleNodeLinked);
            }
            return match self.index.get(&node.vertex.id) {
                Some(&key) if key == head => Ok(()),
                _ => Err(InvariantViolation::UnindexedNode { at: node.vertex.id }),
            };
        }

        let circular = self.is_circular();
        let head_prev = self.nodes[head.index()].prev;
        let tail_next = self.nodes[tail.index()].next;
        if !circular && (head_prev.is_some() || tail_next.is_some()) {
            return Err(InvariantViolation::InvalidBoundary);
        }

        let mut visited = HashSet::with_capacity(self.size);
        let mut cursor = head;
        for step in 0..self.size {
            let node = &self.nodes[cursor.index()];
            let id = node.vertex.id;
            if self.index.get(&id) != Some(&cursor) || !visited.insert(cursor) {
                return Err(InvariantViolation::UnindexedNode { at: id });
            }
            if step + 1 == self.size {
                if cursor != tail {
                    return Err(InvariantViolation::TailNotReached);
                }
                break;
            }
            let Some(next) = node.next else {
                return Err(InvariantViolation::BrokenLink { at: id });
            };
            if self.nodes[next.index()].prev != Some(cursor) {
                return Err(InvariantViolation::BrokenLink { at: id });
            }
            cursor = next;
        }
        Ok(())
    }

    fn alloc(&mut self, vertex: Vertex) -> Option<NodeKey> {
        let slot = u32::try_from(self.nodes.len()).ok()?;
        self.reserve_id(vertex.id);
        self.nodes.push(Node {
            vertex,
            prev: None,
            next: None,
        });
        Some(NodeKey {
            epoch: self.epoch,
            slot,
        })
    }

    fn id_at(&self, key: Option<NodeKey>) -> Option<VertexId> {
        key.and_then(|key| self.vertex(key)).map(|vertex| vertex.id)
    }

    fn notify_changed(&mut self) {
        let event = RingEvent::Changed {
            head: self.id_at(self.head),
            tail: self.id_at(self.tail),
            size: self.size,
        };
        self.events.push(event);
    }
}

pub struct RingIter<'a> {
    ring: &'a VertexRing,
    cursor: Option<NodeKey>,
    remaining: usize,
}

impl<'a> Iterator for RingIter<'a> {
    type Item = (NodeKey, &'a Vertex);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let key = self.cursor?;
        let node = self.ring.node(key)?;
        self.remaining -= 1;
        self.cursor = node.next;
        Some((key, &node.vertex))
    }
}
