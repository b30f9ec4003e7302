//! Transform pipeline applied to every inbound line before it is published.
//!
//! Data flow:
//! ```text
//! InboundLine → OutboundItem::from_line → stage 1 → … → stage N → outbound queue
//! ```
//!
//! The stage list is assembled once at startup (base stages followed by the
//! named extensions from settings) and is immutable afterwards. A stage that
//! returns `None` stops the chain and the line is dropped.

pub mod stages;

use std::collections::BTreeSet;
use std::sync::Arc;

use tenyks_core::{ConnectionConfig, InboundLine, OutboundItem};

/// What a stage can see besides the item itself.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// Name of the connection the line arrived on.
    pub connection: &'a str,
    /// The relay's own nick on that connection.
    pub nick: &'a str,
    /// Masks allowed to administer the relay on that connection.
    pub admins: &'a BTreeSet<String>,
}

impl<'a> StageContext<'a> {
    pub fn for_connection(config: &'a ConnectionConfig) -> Self {
        Self {
            connection: &config.name,
            nick: &config.nick,
            admins: &config.admins,
        }
    }
}

pub type StageFn = fn(&StageContext<'_>, OutboundItem) -> Option<OutboundItem>;

/// A named transform.
#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub apply: StageFn,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Stage").field(&self.name).finish()
    }
}

/// Errors from assembling a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Unknown pipeline stage: {0}")]
    UnknownStage(String),
}

/// An ordered, immutable chain of stages. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Arc<[Stage]>,
}

impl Pipeline {
    /// Build from an explicit stage list.
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    /// The base stages followed by `extensions`, in order.
    pub fn with_extensions(extensions: &[Stage]) -> Self {
        let mut all = stages::base().to_vec();
        all.extend_from_slice(extensions);
        Self::new(all)
    }

    /// The base stages followed by extensions looked up by name.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, PipelineError> {
        let extensions = names
            .iter()
            .map(|name| {
                stages::by_name(name.as_ref())
                    .ok_or_else(|| PipelineError::UnknownStage(name.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::with_extensions(&extensions))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name).collect()
    }

    /// Run every stage in order, short-circuiting on the first `None`.
    pub fn run(&self, ctx: &StageContext<'_>, line: InboundLine) -> Option<OutboundItem> {
        self.stages
            .iter()
            .try_fold(OutboundItem::from_line(line), |item, stage| {
                (stage.apply)(ctx, item)
            })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::with_extensions(&[])
    }
}
