//! 编辑事件总线。
//!
//! 渲染、面板、光标等协作方通过这里订阅结构变化，它们只能观察，不能直接改环。
//! 事件按订阅顺序同步投递，并且总是在一次命令的结构工作全部完成之后才发出。

use std::fmt;

use vedit_core::ring::RingEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum EditEvent {
    Ring(RingEvent),
    UndoDepthChanged(usize),
    RedoDepthChanged(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Ring,
    History,
}

impl EditEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            EditEvent::Ring(_) => EventCategory::Ring,
            EditEvent::UndoDepthChanged(_) | EditEvent::RedoDepthChanged(_) => {
                EventCategory::History
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    #[default]
    All,
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    pub fn matches(&self, event: &EditEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

/// 订阅句柄，用于退订。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type EventHandler = Box<dyn FnMut(&EditEvent)>;

#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(SubscriptionId, EventFilter, EventHandler)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: FnMut(&EditEvent) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, filter, Box::new(handler)));
        id
    }

    /// 退订，返回该订阅此前是否存在。
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(existing, _, _)| *existing != id);
        self.handlers.len() != before
    }

    /// 按订阅顺序投递，返回收到事件的订阅者数量。
    pub fn publish(&mut self, event: &EditEvent) -> usize {
        let mut delivered = 0;
        for (_, filter, handler) in self.handlers.iter_mut() {
            if filter.matches(event) {
                handler(event);
                delivered += 1;
            }
        }
        delivered
    }

    #[inline]
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.handlers.len())
            .finish()
    }
}
