//! 初始顶点序列（种子）的构造期校验。

use std::collections::HashSet;

use vedit_core::geometry::LatLng;
use vedit_core::vertex::VertexId;

use crate::errors::SeedError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedVertex {
    pub id: Option<VertexId>,
    pub position: LatLng,
}

impl SeedVertex {
    #[inline]
    pub fn new(position: LatLng) -> Self {
        Self { id: None, position }
    }

    #[inline]
    pub fn with_id(id: VertexId, position: LatLng) -> Self {
        Self {
            id: Some(id),
            position,
        }
    }
}

/// 初始序列。`close_geometry` 要求序列以首点收尾（预闭合形式）。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seed {
    pub steps: Vec<SeedVertex>,
    pub close_geometry: bool,
    pub generate_id: bool,
}

/// 校验通过的种子；闭合时末尾重复的首点已被去掉。
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSeed {
    pub steps: Vec<SeedVertex>,
    pub close_geometry: bool,
}

impl Seed {
    /// 只给坐标、由环生成 ID 的常见用法。
    pub fn from_positions<I, P>(positions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<LatLng>,
    {
        Self {
            steps: positions
                .into_iter()
                .map(|position| SeedVertex::new(position.into()))
                .collect(),
            close_geometry: false,
            generate_id: true,
        }
    }

    pub fn closed(mut self, close_geometry: bool) -> Self {
        self.close_geometry = close_geometry;
        self
    }

    pub fn generate_ids(mut self, generate_id: bool) -> Self {
        self.generate_id = generate_id;
        self
    }

    pub fn validate(&self) -> Result<ValidatedSeed, SeedError> {
        if self.steps.is_empty() {
            return Err(SeedError::EmptySeed);
        }
        if !self.generate_id {
            if let Some(index) = self.steps.iter().position(|step| step.id.is_none()) {
                return Err(SeedError::MissingIds { index });
            }
        }

        let mut steps = self.steps.clone();
        if self.close_geometry {
            if steps.len() < 3 {
                return Err(SeedError::TooFewPointsToClose { count: steps.len() });
            }
            let (first, last) = (steps[0].position, steps[steps.len() - 1].position);
            if first != last {
                return Err(SeedError::FirstLastPointMismatch);
            }
            steps.pop();
            if steps.len() < 3 {
                return Err(SeedError::TooFewPointsToClose { count: steps.len() });
            }
        }

        let mut seen = HashSet::with_capacity(steps.len());
        for id in steps.iter().filter_map(|step| step.id) {
            if !seen.insert(id) {
                return Err(SeedError::DuplicateId(id));
            }
        }

        Ok(ValidatedSeed {
            steps,
            close_geometry: self.close_geometry,
        })
    }
}
