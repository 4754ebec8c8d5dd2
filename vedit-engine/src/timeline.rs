//! 撤销/重做命令日志。
//!
//! 提交即执行；撤销把命令移到重做栈，重做再移回来。事务期间提交的命令先缓冲在
//! 一个 [`CompoundCommand`] 里，提交事务时作为一步入栈。栈深度变化以
//! [`EditEvent`] 缓冲，由会话在环通知之后统一发布。

use tracing::{debug, trace};

use crate::command::{Command, CommandContext, CompoundCommand, EditCommand};
use crate::events::EditEvent;

#[derive(Debug, Default)]
pub struct Timeline {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    transaction: Option<CompoundCommand>,
    max_depth: Option<usize>,
    reported_undo: usize,
    reported_redo: usize,
    events: Vec<EditEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max_depth` 为 `None` 或 0 时不限制撤销栈深度。
    pub fn with_depth(max_depth: Option<usize>) -> Self {
        Self {
            max_depth: max_depth.filter(|&depth| depth > 0),
            ..Self::default()
        }
    }

    #[inline]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// 执行命令并入栈，清空重做栈。事务进行中时只缓冲，重做栈同样清空。
    ///
    /// 执行后失效的命令不入栈，两个栈都保持原样。
    pub fn commit(&mut self, command: impl Into<Command>, context: &mut CommandContext<'_>) {
        let mut command = command.into();
        command.execute(context);
        if command.is_inert() {
            debug!(kind = command.kind().name(), "命令未生效，不记入历史");
            return;
        }
        debug!(kind = command.kind().name(), size = context.ring.len(), "提交命令");

        self.redo_stack.clear();
        match self.transaction.as_mut() {
            Some(transaction) => transaction.push(command),
            None => self.push_undo(command),
        }
        self.report_depths();
    }

    pub fn undo(&mut self, context: &mut CommandContext<'_>) -> bool {
        if self.transaction.is_some() {
            debug!("事务进行中，忽略撤销");
            return false;
        }
        let Some(mut command) = self.undo_stack.pop() else {
            return false;
        };
        command.undo(context);
        debug!(kind = command.kind().name(), "撤销");
        self.redo_stack.push(command);
        self.report_depths();
        true
    }

    pub fn redo(&mut self, context: &mut CommandContext<'_>) -> bool {
        if self.transaction.is_some() {
            debug!("事务进行中，忽略重做");
            return false;
        }
        let Some(mut command) = self.redo_stack.pop() else {
            return false;
        };
        command.execute(context);
        debug!(kind = command.kind().name(), "重做");
        self.push_undo(command);
        self.report_depths();
        true
    }

    /// 开启事务；已有事务时忽略，后续命令继续进入已开启的事务。
    pub fn begin_transaction(&mut self) -> bool {
        if self.transaction.is_some() {
            debug!("事务已开启，忽略嵌套开启");
            return false;
        }
        self.transaction = Some(CompoundCommand::new());
        true
    }

    /// 把缓冲的命令作为一步入栈。空事务不入栈。
    pub fn commit_transaction(&mut self) -> bool {
        let Some(transaction) = self.transaction.take() else {
            return false;
        };
        if transaction.is_empty() {
            return false;
        }
        debug!(commands = transaction.len(), "提交事务");
        self.push_undo(transaction.into());
        self.redo_stack.clear();
        self.report_depths();
        true
    }

    /// 逆序撤销缓冲的命令并丢弃事务。
    pub fn cancel_transaction(&mut self, context: &mut CommandContext<'_>) -> bool {
        let Some(mut transaction) = self.transaction.take() else {
            return false;
        };
        transaction.undo(context);
        debug!(commands = transaction.len(), "取消事务");
        true
    }

    /// 丢弃全部历史（包括未提交的事务），不触碰环。
    pub fn reset_stacks(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.transaction = None;
        self.report_depths();
    }

    #[inline]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[inline]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[inline]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    #[inline]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    #[inline]
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn drain_events(&mut self) -> Vec<EditEvent> {
        std::mem::take(&mut self.events)
    }

    fn push_undo(&mut self, command: Command) {
        self.undo_stack.push(command);
        if let Some(max_depth) = self.max_depth {
            let overflow = self.undo_stack.len().saturating_sub(max_depth);
            if overflow > 0 {
                self.undo_stack.drain(..overflow);
                trace!(dropped = overflow, "撤销栈超出上限，丢弃最旧的记录");
            }
        }
    }

    fn report_depths(&mut self) {
        if self.undo_stack.len() != self.reported_undo {
            self.reported_undo = self.undo_stack.len();
            self.events
                .push(EditEvent::UndoDepthChanged(self.reported_undo));
        }
        if self.redo_stack.len() != self.reported_redo {
            self.reported_redo = self.redo_stack.len();
            self.events
                .push(EditEvent::RedoDepthChanged(self.reported_redo));
        }
    }
}
