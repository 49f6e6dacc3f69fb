// SPDX-License-Identifier: MIT

//! Memory strategy router
//!
//! Maps a memory mode to the exact node set that runs each phase of a turn,
//! and rejects unknown modes or missing nodes before anything executes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::adk::error::RoutingError;
use crate::adk::model::Invoker;
use crate::adk::pii::Masker;
use crate::adk::retrieval::Retriever;
use crate::mnemos::nodes::{
    AnswerComposer, FactExtractor, MetricsRecorder, Node, NodeKind, PiiFilter, RetrievalFetcher,
    SummaryUpdater,
};
use crate::mnemos::policy::{RetentionPolicy, RetrievalTrigger};

/// Memory retention strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// Full history, windowed by token budget
    Rolling,
    /// Running summary of trimmed history
    Summary,
    /// Structured fact extraction
    Facts,
    /// Summary and facts plus conditional retrieval
    Hybrid,
}

impl MemoryMode {
    pub const ALL: [MemoryMode; 4] = [
        MemoryMode::Rolling,
        MemoryMode::Summary,
        MemoryMode::Facts,
        MemoryMode::Hybrid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryMode::Rolling => "rolling",
            MemoryMode::Summary => "summary",
            MemoryMode::Facts => "facts",
            MemoryMode::Hybrid => "hybrid",
        }
    }

    /// Retention that applies in this mode: the turn limit everywhere, the
    /// token budget only where raw history is the memory
    pub fn retention(self, base: RetentionPolicy) -> RetentionPolicy {
        match self {
            MemoryMode::Rolling | MemoryMode::Hybrid => base,
            MemoryMode::Summary | MemoryMode::Facts => RetentionPolicy {
                token_budget: None,
                max_turns: base.max_turns,
            },
        }
    }
}

impl FromStr for MemoryMode {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rolling" => Ok(MemoryMode::Rolling),
            "summary" => Ok(MemoryMode::Summary),
            "facts" => Ok(MemoryMode::Facts),
            "hybrid" => Ok(MemoryMode::Hybrid),
            _ => Err(RoutingError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nodes scheduled for the mode-dependent phases of one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnPlan {
    pub mode: MemoryMode,
    pub fan_out: Vec<NodeKind>,
    pub conditional: Vec<NodeKind>,
}

impl TurnPlan {
    /// Finalize pipeline, identical in every mode
    pub const FINALIZE: [NodeKind; 3] = [
        NodeKind::AnswerComposer,
        NodeKind::PiiFilter,
        NodeKind::MetricsRecorder,
    ];

    pub fn for_mode(mode: MemoryMode) -> Self {
        let fan_out = match mode {
            MemoryMode::Rolling => vec![],
            MemoryMode::Summary => vec![NodeKind::SummaryUpdater],
            MemoryMode::Facts => vec![NodeKind::FactExtractor],
            MemoryMode::Hybrid => vec![NodeKind::SummaryUpdater, NodeKind::FactExtractor],
        };
        let conditional = match mode {
            MemoryMode::Hybrid => vec![NodeKind::RetrievalFetcher],
            _ => vec![],
        };
        Self {
            mode,
            fan_out,
            conditional,
        }
    }

    /// Every node the plan may run, in phase order
    pub fn nodes(&self) -> impl Iterator<Item = NodeKind> + '_ {
        self.fan_out
            .iter()
            .chain(self.conditional.iter())
            .copied()
            .chain(Self::FINALIZE)
    }
}

/// Selects and validates the node set for each turn
#[derive(Clone)]
pub struct MemoryRouter {
    nodes: HashMap<NodeKind, Arc<dyn Node>>,
    trigger: RetrievalTrigger,
}

impl MemoryRouter {
    pub fn new(trigger: RetrievalTrigger) -> Self {
        Self {
            nodes: HashMap::new(),
            trigger,
        }
    }

    /// Router with all six nodes wired to the given capabilities
    pub fn standard(
        trigger: RetrievalTrigger,
        invoker: Arc<dyn Invoker>,
        masker: Arc<dyn Masker>,
        retriever: Arc<dyn Retriever>,
    ) -> Self {
        Self::new(trigger)
            .with_node(Arc::new(SummaryUpdater::new(invoker.clone())))
            .with_node(Arc::new(FactExtractor::new(invoker.clone())))
            .with_node(Arc::new(RetrievalFetcher::new(retriever)))
            .with_node(Arc::new(AnswerComposer::new(invoker)))
            .with_node(Arc::new(PiiFilter::new(masker)))
            .with_node(Arc::new(MetricsRecorder::new()))
    }

    pub fn register(&mut self, node: Arc<dyn Node>) {
        self.nodes.insert(node.kind(), node);
    }

    pub fn with_node(mut self, node: Arc<dyn Node>) -> Self {
        self.register(node);
        self
    }

    pub fn get(&self, kind: NodeKind) -> Option<Arc<dyn Node>> {
        self.nodes.get(&kind).cloned()
    }

    pub fn trigger(&self) -> &RetrievalTrigger {
        &self.trigger
    }

    /// Plan a turn, failing if any node the mode needs is not registered
    pub fn plan(&self, mode: MemoryMode) -> Result<TurnPlan, RoutingError> {
        let plan = TurnPlan::for_mode(mode);
        if let Some(missing) = plan.nodes().find(|kind| !self.nodes.contains_key(kind)) {
            return Err(RoutingError::MissingNode {
                mode: mode.to_string(),
                node: missing.name().to_string(),
            });
        }
        Ok(plan)
    }

    /// Parse a requested mode name and plan it
    pub fn route(&self, mode: &str) -> Result<TurnPlan, RoutingError> {
        self.plan(mode.parse()?)
    }

    /// Whether the conditional phase runs for this user message
    pub fn should_retrieve(&self, plan: &TurnPlan, user_message: &str) -> bool {
        !plan.conditional.is_empty() && self.trigger.fires(user_message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::NodeFailure;
    use crate::mnemos::nodes::NodeContext;
    use crate::mnemos::state::PartialUpdate;
    use async_trait::async_trait;

    struct NoopNode(NodeKind);

    #[async_trait]
    impl Node for NoopNode {
        fn kind(&self) -> NodeKind {
            self.0
        }

        async fn run(&self, _ctx: &NodeContext) -> Result<PartialUpdate, NodeFailure> {
            Ok(PartialUpdate::new(self.0.name(), self.0.seq()))
        }
    }

    fn router_with(kinds: &[NodeKind]) -> MemoryRouter {
        let mut router = MemoryRouter::new(RetrievalTrigger::default());
        for kind in kinds {
            router.register(Arc::new(NoopNode(*kind)));
        }
        router
    }

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("Hybrid".parse::<MemoryMode>().unwrap(), MemoryMode::Hybrid);
        for mode in MemoryMode::ALL {
            assert_eq!(mode.to_string().parse::<MemoryMode>().unwrap(), mode);
        }
        assert!(matches!(
            "episodic".parse::<MemoryMode>(),
            Err(RoutingError::UnknownMode(m)) if m == "episodic"
        ));
    }

    #[test]
    fn test_node_sets_per_mode() {
        let rolling = TurnPlan::for_mode(MemoryMode::Rolling);
        assert!(rolling.fan_out.is_empty());
        assert!(rolling.conditional.is_empty());
        assert_eq!(rolling.nodes().count(), 3);

        let summary = TurnPlan::for_mode(MemoryMode::Summary);
        assert_eq!(summary.fan_out, vec![NodeKind::SummaryUpdater]);

        let facts = TurnPlan::for_mode(MemoryMode::Facts);
        assert_eq!(facts.fan_out, vec![NodeKind::FactExtractor]);

        let hybrid = TurnPlan::for_mode(MemoryMode::Hybrid);
        assert_eq!(hybrid.nodes().count(), 6);
        assert_eq!(hybrid.conditional, vec![NodeKind::RetrievalFetcher]);
    }

    #[test]
    fn test_plan_rejects_missing_node() {
        let router = router_with(&[
            NodeKind::AnswerComposer,
            NodeKind::PiiFilter,
            NodeKind::MetricsRecorder,
        ]);
        assert!(router.plan(MemoryMode::Rolling).is_ok());
        let err = router.plan(MemoryMode::Summary).unwrap_err();
        assert!(matches!(
            err,
            RoutingError::MissingNode { ref node, .. } if node == "summary-updater"
        ));
    }

    #[test]
    fn test_standard_router_plans_every_mode() {
        use crate::adk::pii::PatternMasker;
        use crate::adk::retrieval::StateRetriever;
        use crate::mnemos::nodes::testing::ScriptedInvoker;

        let router = MemoryRouter::standard(
            RetrievalTrigger::default(),
            Arc::new(ScriptedInvoker::replying("ok")),
            Arc::new(PatternMasker::new()),
            Arc::new(StateRetriever::default()),
        );
        for mode in MemoryMode::ALL {
            assert!(router.plan(mode).is_ok(), "{mode} should plan");
        }
    }

    #[test]
    fn test_route_unknown_mode() {
        let router = router_with(&[]);
        assert!(matches!(router.route("bogus"), Err(RoutingError::UnknownMode(_))));
    }

    #[test]
    fn test_should_retrieve_only_in_hybrid() {
        let router = router_with(&[]);
        let hybrid = TurnPlan::for_mode(MemoryMode::Hybrid);
        let facts = TurnPlan::for_mode(MemoryMode::Facts);
        assert!(router.should_retrieve(&hybrid, "Do you remember my name?"));
        assert!(!router.should_retrieve(&hybrid, "What's my name?"));
        assert!(!router.should_retrieve(&facts, "Do you remember my name?"));
    }

    #[test]
    fn test_retention_per_mode() {
        let base = RetentionPolicy {
            token_budget: Some(100),
            max_turns: Some(4),
        };
        assert_eq!(MemoryMode::Rolling.retention(base), base);
        assert_eq!(MemoryMode::Summary.retention(base).token_budget, None);
        assert_eq!(MemoryMode::Facts.retention(base).max_turns, Some(4));
    }
}
