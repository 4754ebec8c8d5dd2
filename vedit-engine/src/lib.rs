pub mod auxiliary;
pub mod command;
pub mod events;
pub mod seed;
pub mod session;
pub mod timeline;

pub mod errors {
    use thiserror::Error;
    use vedit_core::vertex::VertexId;

    /// 初始种子数据校验失败。只在构造会话时出现，是唯一面向用户的错误。
    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum SeedError {
        #[error("seed contains no vertices")]
        EmptySeed,
        #[error("id generation is disabled but step {index} has no id")]
        MissingIds { index: usize },
        #[error("vertex id {0} appears more than once in the seed")]
        DuplicateId(VertexId),
        #[error("closing a geometry needs at least 3 distinct points, got {count}")]
        TooFewPointsToClose { count: usize },
        #[error("a closed seed must end on its first point")]
        FirstLastPointMismatch,
    }

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error(transparent)]
        Seed(#[from] SeedError),
        #[error("vertex with id {0} not found")]
        VertexNotFound(u64),
    }
}
