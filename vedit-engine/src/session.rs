use tracing::{debug, info};
use vedit_core::geometry::LatLng;
use vedit_core::ring::{NodeKey, VertexRing};
use vedit_core::vertex::{Vertex, VertexId};

use crate::auxiliary;
use crate::command::{
    AddVertex, BreakRing, CloseRing, Command, CommandContext, DrawMode, InsertVertexOnSegment,
    MoveVertex, PromoteAuxiliaryToPrimary, RemoveVertex,
};
use crate::errors::{EngineError, SeedError};
use crate::events::{EditEvent, EventBus, EventFilter, SubscriptionId};
use crate::seed::Seed;
use crate::timeline::Timeline;

/// 辅助中点策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MidpointMode {
    #[default]
    Auto,
    Manual,
}

impl MidpointMode {
    #[inline]
    pub fn is_auto(self) -> bool {
        matches!(self, MidpointMode::Auto)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSettings {
    pub midpoints: MidpointMode,
    /// 撤销栈上限；`None` 表示不限制。
    pub history_depth: Option<usize>,
}

/// 一次编辑会话：独占一个顶点环、一条命令日志、闭合模式与事件总线。
///
/// 所有结构修改都经由这里进入命令日志，每次操作结束后先发布环通知，再发布栈深度通知。
#[derive(Debug)]
pub struct EditSession {
    ring: VertexRing,
    timeline: Timeline,
    mode: DrawMode,
    bus: EventBus,
    settings: SessionSettings,
}

impl EditSession {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            ring: VertexRing::new(settings.midpoints.is_auto()),
            timeline: Timeline::with_depth(settings.history_depth),
            mode: DrawMode::Open,
            bus: EventBus::new(),
            settings,
        }
    }

    /// 由种子构建会话。自动中点模式下辅助点（含闭合辅助点）一并生成，命令日志为空。
    pub fn from_seed(seed: &Seed, settings: SessionSettings) -> Result<Self, EngineError> {
        let validated = seed.validate()?;
        let mut session = Self::new(settings);

        for id in validated.steps.iter().filter_map(|step| step.id) {
            session.ring.reserve_id(id);
        }
        for step in &validated.steps {
            let id = match step.id {
                Some(id) => id,
                None => session.ring.next_id(),
            };
            let key = session
                .ring
                .append(Vertex::primary(id, step.position))
                .ok_or(SeedError::DuplicateId(id))?;
            auxiliary::settle(&mut session.ring, key);
        }
        if validated.close_geometry {
            session.ring.close();
            if let Some(tail) = session.ring.tail() {
                auxiliary::bridge(&mut session.ring, tail);
            }
            session.mode = DrawMode::Closed;
        }
        session.ring.drain_events();

        info!(
            size = session.ring.len(),
            closed = validated.close_geometry,
            "从种子构建编辑会话"
        );
        Ok(session)
    }

    #[inline]
    pub fn ring(&self) -> &VertexRing {
        &self.ring
    }

    #[inline]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    #[inline]
    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    #[inline]
    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn vertex(&self, id: VertexId) -> Result<Vertex, EngineError> {
        self.ring
            .find_vertex_by_id(id)
            .copied()
            .ok_or(EngineError::VertexNotFound(id.get()))
    }

    pub fn subscribe<F>(&mut self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: FnMut(&EditEvent) + 'static,
    {
        self.bus.subscribe(filter, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// 执行并记录命令。
    pub fn commit(&mut self, command: impl Into<Command>) {
        let mut context = CommandContext {
            ring: &mut self.ring,
            mode: &mut self.mode,
        };
        self.timeline.commit(command, &mut context);
        self.flush();
    }

    pub fn undo(&mut self) -> bool {
        let mut context = CommandContext {
            ring: &mut self.ring,
            mode: &mut self.mode,
        };
        let undone = self.timeline.undo(&mut context);
        self.flush();
        undone
    }

    pub fn redo(&mut self) -> bool {
        let mut context = CommandContext {
            ring: &mut self.ring,
            mode: &mut self.mode,
        };
        let redone = self.timeline.redo(&mut context);
        self.flush();
        redone
    }

    pub fn begin_transaction(&mut self) -> bool {
        self.timeline.begin_transaction()
    }

    pub fn commit_transaction(&mut self) -> bool {
        let committed = self.timeline.commit_transaction();
        self.flush();
        committed
    }

    pub fn cancel_transaction(&mut self) -> bool {
        let mut context = CommandContext {
            ring: &mut self.ring,
            mode: &mut self.mode,
        };
        let cancelled = self.timeline.cancel_transaction(&mut context);
        self.flush();
        cancelled
    }

    /// 清空环与历史，回到开放模式。
    pub fn reset(&mut self) {
        self.ring.reset();
        self.timeline.reset_stacks();
        self.mode = DrawMode::Open;
        self.flush();
    }

    pub fn reset_stacks(&mut self) {
        self.timeline.reset_stacks();
        self.flush();
    }

    /// 追加主顶点，返回其 ID。
    pub fn add_vertex(&mut self, position: LatLng) -> Option<VertexId> {
        let id = self.ring.peek_next_id();
        self.commit(AddVertex::new(position));
        self.ring.key_of(id).map(|_| id)
    }

    /// 在 `segment_start` 与其后继之间插入主顶点。
    pub fn insert_on_segment(
        &mut self,
        segment_start: VertexId,
        position: LatLng,
    ) -> Option<VertexId> {
        let Some(start) = self.ring.key_of(segment_start) else {
            debug!(id = segment_start.get(), "线段起点不存在");
            return None;
        };
        let id = self.ring.peek_next_id();
        self.commit(InsertVertexOnSegment::new(position, start));
        self.ring.key_of(id).map(|_| id)
    }

    /// 拖拽预览：直接写坐标并重算相邻辅助点，不进入命令日志。
    /// 拖拽结束后用 [`move_vertex`](Self::move_vertex) 以起点提交。
    pub fn preview_position(&mut self, id: VertexId, position: LatLng) -> Option<LatLng> {
        let key = self.primary_key(id, "预览目标")?;
        let previous = self.ring.set_position(key, position)?;
        auxiliary::resync_neighbours(&mut self.ring, key);
        self.flush();
        Some(previous)
    }

    /// 提交一次拖拽：终点取顶点当前位置。
    pub fn move_vertex(&mut self, id: VertexId, start: LatLng) -> bool {
        let Some(key) = self.primary_key(id, "移动目标") else {
            return false;
        };
        let command = MoveVertex::new(&self.ring, key, start);
        self.commit(command);
        true
    }

    pub fn move_vertex_to(&mut self, id: VertexId, end: LatLng) -> bool {
        let Some(key) = self.primary_key(id, "移动目标") else {
            return false;
        };
        let Some(start) = self.ring.vertex(key).map(|vertex| vertex.position) else {
            return false;
        };
        self.commit(MoveVertex::to(key, start, end));
        true
    }

    /// 辅助点随主顶点增删，不能单独删除。
    pub fn remove_vertex(&mut self, id: VertexId) -> bool {
        if self.primary_key(id, "删除目标").is_none() {
            return false;
        }
        let command = RemoveVertex::new(&self.ring, id);
        self.commit(command);
        self.ring.key_of(id).is_none()
    }

    pub fn promote(&mut self, id: VertexId) -> bool {
        let Some(key) = self.ring.key_of(id).filter(|&key| self.ring.is_auxiliary(key)) else {
            debug!(id = id.get(), "提升目标不是辅助点");
            return false;
        };
        self.commit(PromoteAuxiliaryToPrimary::new(key));
        true
    }

    pub fn close(&mut self) -> bool {
        if !self.ring.can_close() {
            debug!(size = self.ring.len(), "无法闭合");
            return false;
        }
        self.commit(CloseRing::new());
        true
    }

    pub fn break_at(&mut self, id: VertexId) -> bool {
        let Some(key) = self.ring.key_of(id) else {
            debug!(id = id.get(), "断开位置不存在");
            return false;
        };
        if !self.ring.is_circular() {
            debug!("环未闭合，无法断开");
            return false;
        }
        self.commit(BreakRing::new(key));
        true
    }

    #[inline]
    pub fn can_undo(&self) -> bool {
        self.timeline.can_undo()
    }

    #[inline]
    pub fn can_redo(&self) -> bool {
        self.timeline.can_redo()
    }

    /// 辅助点只能先提升再编辑。
    fn primary_key(&self, id: VertexId, role: &str) -> Option<NodeKey> {
        let Some(key) = self.ring.key_of(id) else {
            debug!(id = id.get(), role, "目标不存在");
            return None;
        };
        if self.ring.is_auxiliary(key) {
            debug!(id = id.get(), role, "目标是辅助点，忽略");
            return None;
        }
        Some(key)
    }

    /// 先发布环通知，再发布栈深度通知。
    fn flush(&mut self) {
        for event in self.ring.drain_events() {
            self.bus.publish(&EditEvent::Ring(event));
        }
        for event in self.timeline.drain_events() {
            self.bus.publish(&event);
        }
    }
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}
