//! 辅助中点管理。
//!
//! 仅在自动中点模式下生效：相邻两个主顶点之间总有一个位于二者中点的辅助点。
//! 每次维护动作都记录为 [`AuxPatch`]，撤销时只移除本次创建的节点，
//! 重做时接回同一批节点而不是重新合成。

use tracing::trace;
use vedit_core::geometry::LatLng;
use vedit_core::ring::{NodeKey, Removed, VertexRing};
use vedit_core::vertex::Vertex;

/// 一次坐标重算：节点、重算前后的坐标。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retarget {
    pub key: NodeKey,
    pub before: LatLng,
    pub after: LatLng,
}

#[derive(Debug, Clone, PartialEq)]
enum AuxStep {
    /// 新建的辅助点；撤销后摘除记录暂存在 `parked`。
    Created {
        key: NodeKey,
        parked: Option<Removed>,
    },
    /// 被移除的节点。
    Discarded(Removed),
    Retargeted(Retarget),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxPatch {
    steps: Vec<AuxStep>,
}

impl AuxPatch {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 本补丁合成的辅助点。
    pub fn created(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.steps.iter().filter_map(|step| match step {
            AuxStep::Created { key, .. } => Some(*key),
            _ => None,
        })
    }

    pub fn discarded(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.steps.iter().filter_map(|step| match step {
            AuxStep::Discarded(removed) => Some(removed.key),
            _ => None,
        })
    }

    pub fn retargeted(&self) -> impl Iterator<Item = &Retarget> + '_ {
        self.steps.iter().filter_map(|step| match step {
            AuxStep::Retargeted(retarget) => Some(retarget),
            _ => None,
        })
    }

    /// 移除节点并记入补丁。
    pub fn discard(&mut self, ring: &mut VertexRing, key: NodeKey) -> bool {
        match ring.remove_key(key) {
            Some(removed) => {
                self.steps.push(AuxStep::Discarded(removed));
                true
            }
            None => false,
        }
    }

    /// 按相反顺序撤销全部步骤。
    pub fn revert(&mut self, ring: &mut VertexRing) {
        for step in self.steps.iter_mut().rev() {
            match step {
                AuxStep::Created { key, parked } => {
                    if parked.is_none() {
                        *parked = ring.remove_key(*key);
                    }
                }
                AuxStep::Discarded(removed) => {
                    ring.restore(removed);
                }
                AuxStep::Retargeted(retarget) => {
                    ring.set_position(retarget.key, retarget.before);
                }
            }
        }
    }

    /// 按原顺序重放，接回 `revert` 摘下的同一批节点。
    pub fn reapply(&mut self, ring: &mut VertexRing) {
        for step in self.steps.iter_mut() {
            match step {
                AuxStep::Created { parked, .. } => {
                    if let Some(removed) = parked.take() {
                        ring.restore(&removed);
                    }
                }
                AuxStep::Discarded(removed) => {
                    if let Some(again) = ring.remove_key(removed.key) {
                        *removed = again;
                    }
                }
                AuxStep::Retargeted(retarget) => {
                    ring.set_position(retarget.key, retarget.after);
                }
            }
        }
    }
}

/// 辅助点坐标：两端点的算术平均。
#[inline]
pub fn midpoint(a: LatLng, b: LatLng) -> LatLng {
    a.midpoint(b)
}

/// 围绕 `key` 整理两侧：辅助邻居重新居中，主顶点邻居之间补一个辅助点。
///
/// 适用于追加（闭合环中会重算旧的闭合辅助点并补上新的）、线段插入与辅助点提升。
pub fn settle(ring: &mut VertexRing, key: NodeKey) -> AuxPatch {
    let mut patch = AuxPatch::default();
    if !ring.auto_midpoints() || !ring.is_linked(key) {
        return patch;
    }

    if let Some(prev) = ring.prev_of(key).filter(|&prev| prev != key) {
        if ring.is_auxiliary(prev) {
            recenter(ring, prev, &mut patch);
        } else {
            insert_between(ring, prev, &mut patch);
        }
    }
    if let Some(next) = ring.next_of(key).filter(|&next| next != key) {
        if ring.is_auxiliary(next) {
            recenter(ring, next, &mut patch);
        } else {
            insert_between(ring, key, &mut patch);
        }
    }
    patch
}

/// 在 `left` 与其后继之间插入一个辅助点，闭合时补闭合辅助点用。
pub fn bridge(ring: &mut VertexRing, left: NodeKey) -> AuxPatch {
    let mut patch = AuxPatch::default();
    if ring.auto_midpoints() {
        insert_between(ring, left, &mut patch);
    }
    patch
}

/// 移除尾节点；若新尾是辅助点一并移除。闭合环若仍有至少两个主顶点，
/// 在尾与头之间重新合成闭合辅助点，`tail.next = head` 保持不变。
pub fn retract_tail(ring: &mut VertexRing) -> AuxPatch {
    let mut patch = AuxPatch::default();
    let Some(tail) = ring.tail() else {
        return patch;
    };
    let circular = ring.is_circular();
    patch.discard(ring, tail);

    if let Some(tail) = ring.tail().filter(|&tail| ring.is_auxiliary(tail)) {
        patch.discard(ring, tail);
    }

    if circular && ring.auto_midpoints() && ring.is_circular() && ring.primary_count() >= 2 {
        let (Some(head), Some(tail)) = (ring.head(), ring.tail()) else {
            return patch;
        };
        if !ring.is_auxiliary(tail) && !ring.is_auxiliary(head) {
            insert_between(ring, tail, &mut patch);
        }
    }
    patch
}

/// 移除主顶点并缝合辅助点。
///
/// 统一规则：丢弃主顶点之后的辅助点，之前的辅助点重新居中到两个存活主顶点之间；
/// 位于开放链端点时只丢弃唯一相邻的辅助点。
pub fn dissolve(ring: &mut VertexRing, key: NodeKey) -> AuxPatch {
    let mut patch = AuxPatch::default();
    if !ring.is_linked(key) {
        return patch;
    }
    let before = ring.prev_of(key).filter(|&prev| ring.is_auxiliary(prev));
    let after = ring.next_of(key).filter(|&next| ring.is_auxiliary(next));

    patch.discard(ring, key);
    match (before, after) {
        (Some(before), Some(after)) if before != after => {
            patch.discard(ring, after);
            recenter(ring, before, &mut patch);
        }
        (_, Some(stale)) | (Some(stale), None) => {
            patch.discard(ring, stale);
        }
        (None, None) => {}
    }
    patch
}

/// 主顶点移动后重算相邻辅助点，返回重算记录。
pub fn resync_neighbours(ring: &mut VertexRing, key: NodeKey) -> Vec<Retarget> {
    let mut patch = AuxPatch::default();
    if !ring.auto_midpoints() {
        return Vec::new();
    }
    for neighbour in [ring.prev_of(key), ring.next_of(key)].into_iter().flatten() {
        if neighbour != key && ring.is_auxiliary(neighbour) {
            recenter(ring, neighbour, &mut patch);
        }
    }
    patch.retargeted().copied().collect()
}

fn recenter(ring: &mut VertexRing, aux: NodeKey, patch: &mut AuxPatch) {
    let (Some(prev), Some(next)) = (ring.prev_of(aux), ring.next_of(aux)) else {
        return;
    };
    let (Some(a), Some(b)) = (ring.vertex(prev), ring.vertex(next)) else {
        return;
    };
    let after = midpoint(a.position, b.position);
    if let Some(before) = ring.set_position(aux, after) {
        patch.steps.push(AuxStep::Retargeted(Retarget {
            key: aux,
            before,
            after,
        }));
    }
}

fn insert_between(ring: &mut VertexRing, left: NodeKey, patch: &mut AuxPatch) {
    let Some(right) = ring.next_of(left) else {
        return;
    };
    let (Some(a), Some(b)) = (ring.vertex(left), ring.vertex(right)) else {
        return;
    };
    let position = midpoint(a.position, b.position);
    let id = ring.next_id();
    if let Some(key) = ring.insert_after(left, Vertex::auxiliary(id, position)) {
        trace!(id = id.get(), "合成辅助中点");
        patch.steps.push(AuxStep::Created { key, parked: None });
    }
}
