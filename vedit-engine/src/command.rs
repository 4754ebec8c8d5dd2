//! 可逆的结构编辑命令。
//!
//! 每个命令在首次执行时记录撤销所需的全部上下文；重做时接回同一批节点，
//! 而不是重新创建，因此外部持有的 `NodeKey`/`VertexId` 在撤销/重做之间保持有效。
//! 前置条件不满足时命令静默失效（记为 inert），之后的 undo/redo 也都是空操作。

use tracing::{debug, trace};
use vedit_core::geometry::LatLng;
use vedit_core::ring::{BreakOutcome, NodeKey, Removed, RingEvent, VertexRing};
use vedit_core::vertex::{Vertex, VertexId};

use crate::auxiliary::{self, AuxPatch};

/// 工具的闭合模式状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawMode {
    #[default]
    Open,
    Closed,
}

pub struct CommandContext<'a> {
    pub ring: &'a mut VertexRing,
    pub mode: &'a mut DrawMode,
}

pub trait EditCommand {
    fn execute(&mut self, context: &mut CommandContext<'_>);
    fn undo(&mut self, context: &mut CommandContext<'_>);
    fn kind(&self) -> CommandKind;
    /// 首次执行时前置条件不满足，命令没有改动任何状态。
    fn is_inert(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    AddVertex,
    InsertVertexOnSegment,
    MoveVertex,
    RemoveVertex,
    PromoteAuxiliary,
    CloseRing,
    BreakRing,
    Compound,
}

impl CommandKind {
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::AddVertex => "add_vertex",
            CommandKind::InsertVertexOnSegment => "insert_vertex_on_segment",
            CommandKind::MoveVertex => "move_vertex",
            CommandKind::RemoveVertex => "remove_vertex",
            CommandKind::PromoteAuxiliary => "promote_auxiliary",
            CommandKind::CloseRing => "close_ring",
            CommandKind::BreakRing => "break_ring",
            CommandKind::Compound => "compound",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Fresh,
    Applied,
    Undone,
    Inert,
}

#[derive(Debug, Clone)]
pub enum Command {
    AddVertex(AddVertex),
    InsertVertexOnSegment(InsertVertexOnSegment),
    MoveVertex(MoveVertex),
    RemoveVertex(RemoveVertex),
    PromoteAuxiliary(PromoteAuxiliaryToPrimary),
    CloseRing(CloseRing),
    BreakRing(BreakRing),
    Compound(CompoundCommand),
}

impl EditCommand for Command {
    fn execute(&mut self, context: &mut CommandContext<'_>) {
        match self {
            Command::AddVertex(command) => command.execute(context),
            Command::InsertVertexOnSegment(command) => command.execute(context),
            Command::MoveVertex(command) => command.execute(context),
            Command::RemoveVertex(command) => command.execute(context),
            Command::PromoteAuxiliary(command) => command.execute(context),
            Command::CloseRing(command) => command.execute(context),
            Command::BreakRing(command) => command.execute(context),
            Command::Compound(command) => command.execute(context),
        }
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        match self {
            Command::AddVertex(command) => command.undo(context),
            Command::InsertVertexOnSegment(command) => command.undo(context),
            Command::MoveVertex(command) => command.undo(context),
            Command::RemoveVertex(command) => command.undo(context),
            Command::PromoteAuxiliary(command) => command.undo(context),
            Command::CloseRing(command) => command.undo(context),
            Command::BreakRing(command) => command.undo(context),
            Command::Compound(command) => command.undo(context),
        }
    }

    fn kind(&self) -> CommandKind {
        match self {
            Command::AddVertex(command) => command.kind(),
            Command::InsertVertexOnSegment(command) => command.kind(),
            Command::MoveVertex(command) => command.kind(),
            Command::RemoveVertex(command) => command.kind(),
            Command::PromoteAuxiliary(command) => command.kind(),
            Command::CloseRing(command) => command.kind(),
            Command::BreakRing(command) => command.kind(),
            Command::Compound(command) => command.kind(),
        }
    }

    fn is_inert(&self) -> bool {
        match self {
            Command::AddVertex(command) => command.is_inert(),
            Command::InsertVertexOnSegment(command) => command.is_inert(),
            Command::MoveVertex(command) => command.is_inert(),
            Command::RemoveVertex(command) => command.is_inert(),
            Command::PromoteAuxiliary(command) => command.is_inert(),
            Command::CloseRing(command) => command.is_inert(),
            Command::BreakRing(command) => command.is_inert(),
            Command::Compound(command) => command.is_inert(),
        }
    }
}

macro_rules! impl_from_command {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Command {
                fn from(value: $ty) -> Self {
                    Command::$variant(value)
                }
            }
        )*
    };
}

impl_from_command! {
    AddVertex => AddVertex,
    InsertVertexOnSegment => InsertVertexOnSegment,
    MoveVertex => MoveVertex,
    RemoveVertex => RemoveVertex,
    PromoteAuxiliary => PromoteAuxiliaryToPrimary,
    CloseRing => CloseRing,
    BreakRing => BreakRing,
    Compound => CompoundCommand,
}

/// 在链尾追加一个主顶点；自动中点模式下同时补齐辅助点。
#[derive(Debug, Clone)]
pub struct AddVertex {
    position: LatLng,
    node: Option<NodeKey>,
    parked: Option<Removed>,
    patch: AuxPatch,
    phase: Phase,
}

impl AddVertex {
    pub fn new(position: LatLng) -> Self {
        Self {
            position,
            node: None,
            parked: None,
            patch: AuxPatch::default(),
            phase: Phase::Fresh,
        }
    }

    /// 首次执行后得到的节点。
    #[inline]
    pub fn node(&self) -> Option<NodeKey> {
        self.node
    }
}

impl EditCommand for AddVertex {
    fn execute(&mut self, context: &mut CommandContext<'_>) {
        match self.phase {
            Phase::Fresh => {
                let id = context.ring.next_id();
                let Some(key) = context.ring.append(Vertex::primary(id, self.position)) else {
                    self.phase = Phase::Inert;
                    return;
                };
                self.node = Some(key);
                self.patch = auxiliary::settle(context.ring, key);
                self.phase = Phase::Applied;
                debug!(id = id.get(), size = context.ring.len(), "追加主顶点");
            }
            Phase::Undone => {
                if let Some(parked) = self.parked.take() {
                    context.ring.restore(&parked);
                }
                self.patch.reapply(context.ring);
                self.phase = Phase::Applied;
            }
            Phase::Applied | Phase::Inert => {}
        }
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        if self.phase != Phase::Applied {
            return;
        }
        self.patch.revert(context.ring);
        if let Some(key) = self.node {
            self.parked = context.ring.remove_key(key);
        }
        self.phase = Phase::Undone;
    }

    fn kind(&self) -> CommandKind {
        CommandKind::AddVertex
    }

    fn is_inert(&self) -> bool {
        self.phase == Phase::Inert
    }
}

/// 在 `segment_start` 之后插入主顶点。
#[derive(Debug, Clone)]
pub struct InsertVertexOnSegment {
    position: LatLng,
    segment_start: NodeKey,
    node: Option<NodeKey>,
    parked: Option<Removed>,
    patch: AuxPatch,
    phase: Phase,
}

impl InsertVertexOnSegment {
    pub fn new(position: LatLng, segment_start: NodeKey) -> Self {
        Self {
            position,
            segment_start,
            node: None,
            parked: None,
            patch: AuxPatch::default(),
            phase: Phase::Fresh,
        }
    }

    #[inline]
    pub fn node(&self) -> Option<NodeKey> {
        self.node
    }

    fn announce(&self, ring: &mut VertexRing) {
        if let Some(vertex) = self.node.and_then(|key| ring.vertex(key)).copied() {
            ring.emit(RingEvent::VertexInserted {
                id: vertex.id,
                position: vertex.position,
            });
        }
    }
}

impl EditCommand for InsertVertexOnSegment {
    fn execute(&mut self, context: &mut CommandContext<'_>) {
        match self.phase {
            Phase::Fresh => {
                let id = context.ring.next_id();
                let inserted = context
                    .ring
                    .insert_after(self.segment_start, Vertex::primary(id, self.position));
                let Some(key) = inserted else {
                    debug!("线段起点不在环上，忽略插入");
                    self.phase = Phase::Inert;
                    return;
                };
                self.node = Some(key);
                self.patch = auxiliary::settle(context.ring, key);
                self.phase = Phase::Applied;
                self.announce(context.ring);
            }
            Phase::Undone => {
                // 重做时接回同一个节点，尾/头之间的边界情况由摘除记录处理。
                if let Some(parked) = self.parked.take() {
                    context.ring.restore(&parked);
                }
                self.patch.reapply(context.ring);
                self.phase = Phase::Applied;
                self.announce(context.ring);
            }
            Phase::Applied | Phase::Inert => {}
        }
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        if self.phase != Phase::Applied {
            return;
        }
        self.patch.revert(context.ring);
        let id = self
            .node
            .and_then(|key| context.ring.vertex(key))
            .map(|vertex| vertex.id);
        if let Some(id) = id {
            self.parked = context.ring.remove_by_id(id);
        }
        self.phase = Phase::Undone;
    }

    fn kind(&self) -> CommandKind {
        CommandKind::InsertVertexOnSegment
    }

    fn is_inert(&self) -> bool {
        self.phase == Phase::Inert
    }
}

/// 把顶点从 `start` 移到 `end`，并重算相邻辅助点。
///
/// 辅助点不能直接移动（需先提升），因此辅助点总位于两侧主顶点的中点，
/// 撤销时重新居中即可得到原坐标。
#[derive(Debug, Clone)]
pub struct MoveVertex {
    key: NodeKey,
    start: LatLng,
    end: LatLng,
    phase: Phase,
}

impl MoveVertex {
    /// 终点取自节点当前（拖拽中已更新）的位置。
    pub fn new(ring: &VertexRing, key: NodeKey, start: LatLng) -> Self {
        let end = ring.vertex(key).map_or(start, |vertex| vertex.position);
        Self::to(key, start, end)
    }

    pub fn to(key: NodeKey, start: LatLng, end: LatLng) -> Self {
        Self {
            key,
            start,
            end,
            phase: Phase::Fresh,
        }
    }

    #[inline]
    pub fn start(&self) -> LatLng {
        self.start
    }

    #[inline]
    pub fn end(&self) -> LatLng {
        self.end
    }

    fn apply(&self, ring: &mut VertexRing, from: LatLng, to: LatLng) -> bool {
        let Some(id) = ring.vertex(self.key).map(|vertex| vertex.id) else {
            return false;
        };
        if ring.set_position(self.key, to).is_none() {
            return false;
        }
        let recentred = auxiliary::resync_neighbours(ring, self.key);
        trace!(id = id.get(), recentred = recentred.len(), "重算相邻辅助点");
        ring.emit(RingEvent::VertexMoved { id, from, to });
        true
    }
}

impl EditCommand for MoveVertex {
    fn execute(&mut self, context: &mut CommandContext<'_>) {
        match self.phase {
            Phase::Fresh if context.ring.is_auxiliary(self.key) => {
                debug!("辅助点需先提升为主顶点才能移动");
                self.phase = Phase::Inert;
            }
            Phase::Fresh | Phase::Undone => {
                if self.apply(context.ring, self.start, self.end) {
                    self.phase = Phase::Applied;
                } else if self.phase == Phase::Fresh {
                    debug!("移动目标不在环上，忽略");
                    self.phase = Phase::Inert;
                }
            }
            Phase::Applied | Phase::Inert => {}
        }
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        if self.phase != Phase::Applied {
            return;
        }
        self.apply(context.ring, self.end, self.start);
        self.phase = Phase::Undone;
    }

    fn kind(&self) -> CommandKind {
        CommandKind::MoveVertex
    }

    fn is_inert(&self) -> bool {
        self.phase == Phase::Inert
    }
}

/// 删除顶点，按环的中点模式选择实现。
#[derive(Debug, Clone)]
pub enum RemoveVertex {
    Manual(ManualRemoval),
    Auto(AutoRemoval),
}

impl RemoveVertex {
    pub fn new(ring: &VertexRing, id: VertexId) -> Self {
        if ring.auto_midpoints() {
            RemoveVertex::Auto(AutoRemoval::new(id))
        } else {
            RemoveVertex::Manual(ManualRemoval::new(id))
        }
    }

    pub fn target(&self) -> VertexId {
        match self {
            RemoveVertex::Manual(removal) => removal.id,
            RemoveVertex::Auto(removal) => removal.id,
        }
    }
}

impl EditCommand for RemoveVertex {
    fn execute(&mut self, context: &mut CommandContext<'_>) {
        match self {
            RemoveVertex::Manual(removal) => removal.execute(context),
            RemoveVertex::Auto(removal) => removal.execute(context),
        }
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        match self {
            RemoveVertex::Manual(removal) => removal.undo(context),
            RemoveVertex::Auto(removal) => removal.undo(context),
        }
    }

    fn kind(&self) -> CommandKind {
        CommandKind::RemoveVertex
    }

    fn is_inert(&self) -> bool {
        match self {
            RemoveVertex::Manual(removal) => removal.phase == Phase::Inert,
            RemoveVertex::Auto(removal) => removal.phase == Phase::Inert,
        }
    }
}

/// 手动模式：所有顶点都是主顶点。删到无法维持闭合时同时断开边界。
#[derive(Debug, Clone)]
pub struct ManualRemoval {
    id: VertexId,
    removed: Option<Removed>,
    opened: bool,
    previous_mode: Option<DrawMode>,
    phase: Phase,
}

impl ManualRemoval {
    pub fn new(id: VertexId) -> Self {
        Self {
            id,
            removed: None,
            opened: false,
            previous_mode: None,
            phase: Phase::Fresh,
        }
    }

    fn execute(&mut self, context: &mut CommandContext<'_>) {
        if !matches!(self.phase, Phase::Fresh | Phase::Undone) {
            return;
        }
        let was_circular = context.ring.is_circular();
        let Some(removed) = context.ring.remove_by_id(self.id) else {
            debug!(id = self.id.get(), "删除目标不存在");
            if self.phase == Phase::Fresh {
                self.phase = Phase::Inert;
            }
            return;
        };
        self.removed = Some(removed);
        self.opened = false;
        self.previous_mode = None;
        if context.ring.can_break() {
            if was_circular {
                self.opened = context.ring.open_boundary();
            }
            self.previous_mode = Some(*context.mode);
            *context.mode = DrawMode::Open;
        }
        self.phase = Phase::Applied;
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        if self.phase != Phase::Applied {
            return;
        }
        if self.opened {
            context.ring.close();
        }
        if let Some(removed) = self.removed.take() {
            context.ring.restore(&removed);
        }
        if let Some(mode) = self.previous_mode.take() {
            *context.mode = mode;
        }
        self.phase = Phase::Undone;
    }
}

/// 自动中点模式：只允许删除主顶点，辅助点随之缝合。
#[derive(Debug, Clone)]
pub struct AutoRemoval {
    id: VertexId,
    patch: AuxPatch,
    opened: bool,
    previous_mode: Option<DrawMode>,
    phase: Phase,
}

impl AutoRemoval {
    pub fn new(id: VertexId) -> Self {
        Self {
            id,
            patch: AuxPatch::default(),
            opened: false,
            previous_mode: None,
            phase: Phase::Fresh,
        }
    }

    fn execute(&mut self, context: &mut CommandContext<'_>) {
        match self.phase {
            Phase::Fresh => self.first_execute(context),
            Phase::Undone => {
                self.patch.reapply(context.ring);
                if self.opened {
                    context.ring.open_boundary();
                }
                if self.previous_mode.is_some() {
                    *context.mode = DrawMode::Open;
                }
                self.phase = Phase::Applied;
            }
            Phase::Applied | Phase::Inert => {}
        }
    }

    fn first_execute(&mut self, context: &mut CommandContext<'_>) {
        let ring = &mut *context.ring;
        let Some(key) = ring.key_of(self.id) else {
            debug!(id = self.id.get(), "删除目标不存在");
            self.phase = Phase::Inert;
            return;
        };
        if ring.is_auxiliary(key) {
            debug!(id = self.id.get(), "辅助点不能直接删除");
            self.phase = Phase::Inert;
            return;
        }

        let mut patch = if !ring.is_circular() && ring.is_last_primary_vertex(self.id) {
            auxiliary::retract_tail(ring)
        } else {
            auxiliary::dissolve(ring, key)
        };

        // 闭合环少于三个主顶点时不再成立：去掉闭合辅助点并断开边界。
        if ring.is_circular() && ring.primary_count() < 3 {
            if let Some(tail) = ring.tail().filter(|&tail| ring.is_auxiliary(tail)) {
                patch.discard(ring, tail);
            }
            self.opened = ring.open_boundary();
        }
        if ring.can_break() {
            self.previous_mode = Some(*context.mode);
            *context.mode = DrawMode::Open;
        }
        self.patch = patch;
        self.phase = Phase::Applied;
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        if self.phase != Phase::Applied {
            return;
        }
        if self.opened {
            context.ring.close();
        }
        self.patch.revert(context.ring);
        if let Some(mode) = self.previous_mode {
            *context.mode = mode;
        }
        self.phase = Phase::Undone;
    }
}

/// 把辅助点提升为主顶点，并在它与两侧主顶点之间各合成一个新的辅助点。
#[derive(Debug, Clone)]
pub struct PromoteAuxiliaryToPrimary {
    key: NodeKey,
    patch: AuxPatch,
    phase: Phase,
}

impl PromoteAuxiliaryToPrimary {
    pub fn new(key: NodeKey) -> Self {
        Self {
            key,
            patch: AuxPatch::default(),
            phase: Phase::Fresh,
        }
    }

    /// 本次提升合成的辅助点。
    pub fn created(&self) -> Vec<NodeKey> {
        self.patch.created().collect()
    }

    fn announce(&self, ring: &mut VertexRing) {
        if let Some(id) = ring.vertex(self.key).map(|vertex| vertex.id) {
            ring.emit(RingEvent::VertexPromoted { id });
        }
    }
}

impl EditCommand for PromoteAuxiliaryToPrimary {
    fn execute(&mut self, context: &mut CommandContext<'_>) {
        match self.phase {
            Phase::Fresh => {
                if !context.ring.is_linked(self.key) || !context.ring.is_auxiliary(self.key) {
                    debug!("提升目标不是环上的辅助点");
                    self.phase = Phase::Inert;
                    return;
                }
                context.ring.set_auxiliary(self.key, false);
                self.patch = auxiliary::settle(context.ring, self.key);
                self.phase = Phase::Applied;
                self.announce(context.ring);
            }
            Phase::Undone => {
                context.ring.set_auxiliary(self.key, false);
                self.patch.reapply(context.ring);
                self.phase = Phase::Applied;
                self.announce(context.ring);
            }
            Phase::Applied | Phase::Inert => {}
        }
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        if self.phase != Phase::Applied {
            return;
        }
        self.patch.revert(context.ring);
        context.ring.set_auxiliary(self.key, true);
        self.phase = Phase::Undone;
    }

    fn kind(&self) -> CommandKind {
        CommandKind::PromoteAuxiliary
    }

    fn is_inert(&self) -> bool {
        self.phase == Phase::Inert
    }
}

/// 闭合环；自动中点模式下补上尾与头之间的闭合辅助点。
#[derive(Debug, Clone, Default)]
pub struct CloseRing {
    patch: AuxPatch,
    previous_mode: DrawMode,
    phase: Phase,
}

impl CloseRing {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EditCommand for CloseRing {
    fn execute(&mut self, context: &mut CommandContext<'_>) {
        match self.phase {
            Phase::Fresh => {
                if !context.ring.can_close() {
                    debug!(size = context.ring.len(), "顶点不足或已闭合，忽略闭合");
                    self.phase = Phase::Inert;
                    return;
                }
                context.ring.close();
                if let Some(tail) = context.ring.tail() {
                    self.patch = auxiliary::bridge(context.ring, tail);
                }
                self.previous_mode = *context.mode;
                *context.mode = DrawMode::Closed;
                self.phase = Phase::Applied;
            }
            Phase::Undone => {
                context.ring.close();
                self.patch.reapply(context.ring);
                *context.mode = DrawMode::Closed;
                self.phase = Phase::Applied;
            }
            Phase::Applied | Phase::Inert => {}
        }
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        if self.phase != Phase::Applied {
            return;
        }
        self.patch.revert(context.ring);
        context.ring.open_boundary();
        *context.mode = self.previous_mode;
        self.phase = Phase::Undone;
    }

    fn kind(&self) -> CommandKind {
        CommandKind::CloseRing
    }

    fn is_inert(&self) -> bool {
        self.phase == Phase::Inert
    }
}

/// 在 `at` 处断开闭合环。
#[derive(Debug, Clone)]
pub struct BreakRing {
    at: NodeKey,
    outcome: Option<BreakOutcome>,
    phase: Phase,
}

impl BreakRing {
    pub fn new(at: NodeKey) -> Self {
        Self {
            at,
            outcome: None,
            phase: Phase::Fresh,
        }
    }
}

impl EditCommand for BreakRing {
    fn execute(&mut self, context: &mut CommandContext<'_>) {
        if !matches!(self.phase, Phase::Fresh | Phase::Undone) {
            return;
        }
        let Some(outcome) = context.ring.break_at(self.at) else {
            if self.phase == Phase::Fresh {
                debug!("环未闭合或断点无效，忽略断开");
                self.phase = Phase::Inert;
            }
            return;
        };
        self.outcome = Some(outcome);
        *context.mode = DrawMode::Open;
        self.phase = Phase::Applied;
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        if self.phase != Phase::Applied {
            return;
        }
        if let Some(outcome) = self.outcome.take() {
            context.ring.unbreak(&outcome);
        }
        *context.mode = DrawMode::Closed;
        self.phase = Phase::Undone;
    }

    fn kind(&self) -> CommandKind {
        CommandKind::BreakRing
    }

    fn is_inert(&self) -> bool {
        self.phase == Phase::Inert
    }
}

/// 事务：顺序执行子命令，逆序撤销。
#[derive(Debug, Clone, Default)]
pub struct CompoundCommand {
    commands: Vec<Command>,
}

impl CompoundCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个已经执行过的子命令（事务缓冲用）。
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn kinds(&self) -> Vec<CommandKind> {
        self.commands.iter().map(EditCommand::kind).collect()
    }
}

impl FromIterator<Command> for CompoundCommand {
    fn from_iter<T: IntoIterator<Item = Command>>(iter: T) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}

impl EditCommand for CompoundCommand {
    fn execute(&mut self, context: &mut CommandContext<'_>) {
        for command in self.commands.iter_mut() {
            command.execute(context);
        }
    }

    fn undo(&mut self, context: &mut CommandContext<'_>) {
        for command in self.commands.iter_mut().rev() {
            command.undo(context);
        }
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Compound
    }

    /// 没有任何子命令生效（包括空事务）。
    fn is_inert(&self) -> bool {
        self.commands.iter().all(EditCommand::is_inert)
    }
}
