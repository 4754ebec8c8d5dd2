//! 闭合/断开相关的判定与结构变换。

use super::{NodeKey, Removed, RingEvent, VertexRing};
use crate::geometry::LatLng;

/// 断开操作的完整记录，[`VertexRing::unbreak`] 据此精确还原。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakOutcome {
    /// 用户点击的断开位置及其坐标。
    pub at: NodeKey,
    pub position: LatLng,
    /// 丢弃辅助点之后、重新选定头尾之前的头尾。
    pub rotated_head: Option<NodeKey>,
    pub rotated_tail: Option<NodeKey>,
    /// 断开后的新头尾。
    pub head: NodeKey,
    pub tail: NodeKey,
    /// 自动中点模式下被丢弃的辅助点。
    pub dropped: Option<Removed>,
}

impl VertexRing {
    #[inline]
    fn closing_threshold(&self) -> usize {
        if self.auto_midpoints { 3 } else { 2 }
    }

    pub fn is_circular(&self) -> bool {
        let (Some(head), Some(tail)) = (self.head, self.tail) else {
            return false;
        };
        self.nodes[head.index()].prev == Some(tail) && self.nodes[tail.index()].next == Some(head)
    }

    /// 剩余顶点太少，开放与闭合已无区别，环应当被断开。
    pub fn can_break(&self) -> bool {
        self.size <= self.closing_threshold()
    }

    pub fn can_close(&self) -> bool {
        self.size > self.closing_threshold() && !self.is_circular()
    }

    /// 连接 `tail.next = head` 与 `head.prev = tail`。不增删顶点。
    pub fn close(&mut self) -> bool {
        let (Some(head), Some(tail)) = (self.head, self.tail) else {
            return false;
        };
        if head == tail || self.is_circular() {
            return false;
        }
        self.nodes[tail.index()].next = Some(head);
        self.nodes[head.index()].prev = Some(tail);
        self.events.push(RingEvent::Closed);
        self.notify_changed();
        true
    }

    /// 清除边界链接，头尾保持不变。
    pub fn open_boundary(&mut self) -> bool {
        if !self.is_circular() {
            return false;
        }
        if let (Some(head), Some(tail)) = (self.head, self.tail) {
            self.nodes[head.index()].prev = None;
            self.nodes[tail.index()].next = None;
        }
        self.notify_changed();
        true
    }

    /// 在 `at` 处断开闭合环。
    ///
    /// 点击辅助点：丢弃该点，其前驱成为尾、后继成为头。点击主顶点：若其后继是
    /// 辅助点则丢弃之，主顶点成为尾，原来的"后继的后继"成为头；否则主顶点成为尾、
    /// 后继成为头。
    pub fn break_at(&mut self, at: NodeKey) -> Option<BreakOutcome> {
        if !self.is_circular() || !self.is_linked(at) {
            return None;
        }
        let vertex = self.nodes[at.index()].vertex;
        let next = self.nodes[at.index()].next?;

        let (cut, tail) = if vertex.is_auxiliary {
            (Some(at), self.nodes[at.index()].prev?)
        } else if next != at && self.is_auxiliary(next) {
            (Some(next), at)
        } else {
            (None, at)
        };

        let dropped = match cut {
            Some(cut) => Some(self.remove_key(cut)?),
            None => None,
        };
        let rotated_head = self.head;
        let rotated_tail = self.tail;

        let head = self.nodes[tail.index()].next.unwrap_or(tail);
        self.head = Some(head);
        self.tail = Some(tail);
        self.nodes[head.index()].prev = None;
        self.nodes[tail.index()].next = None;

        self.events.push(RingEvent::Broken {
            at: vertex.position,
        });
        self.notify_changed();
        Some(BreakOutcome {
            at,
            position: vertex.position,
            rotated_head,
            rotated_tail,
            head,
            tail,
            dropped,
        })
    }

    /// [`break_at`](Self::break_at) 的逆操作，要求环仍处于断开后的状态。
    pub fn unbreak(&mut self, outcome: &BreakOutcome) -> bool {
        if self.head != Some(outcome.head) || self.tail != Some(outcome.tail) || self.is_circular()
        {
            return false;
        }
        if outcome.head != outcome.tail {
            self.nodes[outcome.tail.index()].next = Some(outcome.head);
            self.nodes[outcome.head.index()].prev = Some(outcome.tail);
        }
        self.head = outcome.rotated_head;
        self.tail = outcome.rotated_tail;
        if let Some(dropped) = outcome.dropped.as_ref() {
            self.restore(dropped);
        } else {
            self.notify_changed();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::geometry::LatLng;
    use crate::ring::{NodeKey, RingEvent, VertexRing};
    use crate::vertex::Vertex;

    fn build(auto: bool, pattern: &[bool]) -> (VertexRing, Vec<NodeKey>) {
        let mut ring = VertexRing::new(auto);
        let keys = pattern
            .iter()
            .enumerate()
            .map(|(i, &aux)| {
                let id = ring.next_id();
                let position = LatLng::new(i as f64, i as f64 * 2.0);
                let vertex = if aux {
                    Vertex::auxiliary(id, position)
                } else {
                    Vertex::primary(id, position)
                };
                ring.append(vertex).unwrap()
            })
            .collect();
        (ring, keys)
    }

    fn snapshot(ring: &VertexRing) -> Vec<(u64, bool)> {
        ring.iter()
            .map(|(_, vertex)| (vertex.id.get(), vertex.is_auxiliary))
            .collect()
    }

    #[test]
    fn thresholds_follow_midpoint_mode() {
        let (manual, _) = build(false, &[false, false]);
        assert!(manual.can_break());
        assert!(!manual.can_close());

        let (manual, _) = build(false, &[false, false, false]);
        assert!(!manual.can_break());
        assert!(manual.can_close());

        let (auto, _) = build(true, &[false, true, false]);
        assert!(auto.can_break());
        assert!(!auto.can_close());

        let (auto, _) = build(true, &[false, true, false, true, false]);
        assert!(auto.can_close());
    }

    #[test]
    fn close_links_boundary_and_is_idempotent() {
        let (mut ring, keys) = build(false, &[false, false, false]);
        assert!(!ring.is_circular());
        assert!(ring.close());
        assert!(ring.is_circular());
        assert_eq!(ring.next_of(keys[2]), Some(keys[0]));
        assert_eq!(ring.prev_of(keys[0]), Some(keys[2]));
        assert!(!ring.can_close());
        assert!(!ring.close());
        ring.check_invariants().unwrap();
        assert!(ring.drain_events().contains(&RingEvent::Closed));
    }

    #[test]
    fn close_rejects_empty_and_single() {
        let mut ring = VertexRing::new(false);
        assert!(!ring.close());
        let (mut single, _) = build(false, &[false]);
        assert!(!single.close());
        single.check_invariants().unwrap();
    }

    #[test]
    fn open_boundary_keeps_head_and_tail() {
        let (mut ring, keys) = build(false, &[false, false, false]);
        ring.close();
        assert!(ring.open_boundary());
        assert!(!ring.is_circular());
        assert_eq!(ring.head(), Some(keys[0]));
        assert_eq!(ring.tail(), Some(keys[2]));
        ring.check_invariants().unwrap();
        assert!(!ring.open_boundary());
    }

    #[test]
    fn break_on_auxiliary_drops_it() {
        let (mut ring, keys) = build(true, &[false, true, false, true, false, true]);
        ring.close();
        let outcome = ring.break_at(keys[3]).unwrap();
        assert!(!ring.is_circular());
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.tail(), Some(keys[2]));
        assert_eq!(ring.head(), Some(keys[4]));
        assert_eq!(outcome.dropped.map(|removed| removed.key), Some(keys[3]));
        ring.check_invariants().unwrap();
    }

    #[test]
    fn break_on_primary_drops_following_auxiliary() {
        let (mut ring, keys) = build(true, &[false, true, false, true, false, true]);
        ring.close();
        ring.break_at(keys[2]).unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.tail(), Some(keys[2]));
        assert_eq!(ring.head(), Some(keys[4]));
        assert!(ring.find_vertex_by_id(ring.vertex(keys[3]).unwrap().id).is_none());
        ring.check_invariants().unwrap();
    }

    #[test]
    fn manual_break_keeps_all_vertices() {
        let (mut ring, keys) = build(false, &[false, false, false, false]);
        ring.close();
        let outcome = ring.break_at(keys[1]).unwrap();
        assert!(outcome.dropped.is_none());
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.tail(), Some(keys[1]));
        assert_eq!(ring.head(), Some(keys[2]));
        assert!(!ring.is_circular());
        ring.check_invariants().unwrap();
    }

    #[test]
    fn unbreak_restores_exact_structure() {
        for at in 0..6 {
            let (mut ring, keys) = build(true, &[false, true, false, true, false, true]);
            ring.close();
            let before = snapshot(&ring);
            let (head, tail) = (ring.head(), ring.tail());

            let outcome = ring.break_at(keys[at]).unwrap();
            assert!(ring.unbreak(&outcome));

            assert_eq!(snapshot(&ring), before);
            assert_eq!((ring.head(), ring.tail()), (head, tail));
            assert!(ring.is_circular());
            ring.check_invariants().unwrap();
        }
    }

    #[test]
    fn break_requires_circular_ring() {
        let (mut ring, keys) = build(false, &[false, false, false]);
        assert!(ring.break_at(keys[0]).is_none());
        assert_eq!(ring.len(), 3);
        ring.check_invariants().unwrap();
    }
}
