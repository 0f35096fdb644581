//! Execution-tree compiler: lower a logical plan, then run the registered
//! passes until none of them reports a change.
//!
//! Default pass order is fixed: no-op removal, then step fusion (when
//! `enable_op_fusion`), then the printer (when `print_tree`). Passes added
//! with [`TreeCompiler::register`] run after the defaults.
//!
//! Random steps are reseeded right after lowering, before fusion can change
//! step positions: from `PipelineConfig::seed` when set, otherwise from a
//! fresh seed per compile.

use dsflow_core::config::PipelineConfig;

use crate::error::PlanError;
use crate::logical::LogicalPlan;
use crate::lower::{lower_to_tree, seed_random_steps};
use crate::pass::{run_on_tree, TreePass};
use crate::passes::{FusionPass, PrinterPass, RemovalPass};
use crate::tree::ExecutionTree;

pub struct TreeCompiler {
    seed: Option<u64>,
    max_rounds: usize,
    passes: Vec<Box<dyn TreePass>>,
}

impl TreeCompiler {
    pub fn new(config: &PipelineConfig) -> Self {
        let mut passes: Vec<Box<dyn TreePass>> = vec![Box::new(RemovalPass::new())];
        if config.enable_op_fusion {
            passes.push(Box::new(FusionPass::new()));
        }
        if config.print_tree {
            passes.push(Box::new(PrinterPass::new()));
        }
        Self {
            seed: config.seed,
            max_rounds: config.max_optimizer_rounds.max(1),
            passes,
        }
    }

    /// Append a pass; it runs after everything already registered.
    pub fn register(&mut self, pass: Box<dyn TreePass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn compile(&mut self, plan: &LogicalPlan) -> Result<ExecutionTree, PlanError> {
        let mut tree = lower_to_tree(plan)?;
        let seed = self.seed.unwrap_or_else(rand::random);
        let reseeded = seed_random_steps(&mut tree, seed)
            .map_err(|e| PlanError::Lowering(e.to_string()))?;
        if reseeded > 0 {
            tracing::debug!(reseeded, "seeded random steps");
        }
        self.optimize(&mut tree)?;
        Ok(tree)
    }

    /// Run all passes in order, repeating the sequence while any pass
    /// modified the tree. Returns the number of rounds run.
    pub fn optimize(&mut self, tree: &mut ExecutionTree) -> Result<usize, PlanError> {
        for round in 1..=self.max_rounds {
            let mut modified = false;
            for pass in self.passes.iter_mut() {
                let name = pass.name();
                let changed = run_on_tree(pass.as_mut(), tree)
                    .map_err(|source| PlanError::Pass { pass: name, source })?;
                tracing::debug!(round, pass = name, changed, "optimizer pass");
                modified |= changed;
            }
            if !modified {
                return Ok(round);
            }
        }
        tracing::warn!(
            max_rounds = self.max_rounds,
            "optimizer stopped at the round cap before reaching a fixed point"
        );
        Ok(self.max_rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PassError;
    use crate::logical::Dataset;
    use crate::tree::{Node, NodeId, OperatorKind};
    use dsflow_operators::vision::BorderType;
    use dsflow_operators::{Sampler, SourceSpec, TransformSpec};

    fn mnist(n: usize) -> Dataset {
        Dataset::source(SourceSpec::synthetic_mnist(n), Sampler::default()).unwrap()
    }

    fn map_steps(tree: &ExecutionTree) -> Vec<String> {
        for id in tree.preorder().unwrap() {
            if let OperatorKind::Map(stage) = &tree.node(id).unwrap().kind {
                return stage.steps.iter().map(|s| s.describe()).collect();
            }
        }
        vec![]
    }

    fn pipeline() -> Dataset {
        mnist(20)
            .repeat(1)
            .unwrap()
            .map(vec![
                TransformSpec::resize(30, 30).into(),
                TransformSpec::center_crop(16, 16).into(),
                TransformSpec::pad(vec![1], vec![0.0], BorderType::Constant).into(),
            ])
            .unwrap()
            .batch(1)
            .unwrap()
    }

    #[test]
    fn default_order_and_fixed_point() {
        let cfg = PipelineConfig::default();
        let mut compiler = TreeCompiler::new(&cfg);
        assert_eq!(compiler.pass_names(), vec!["removal", "fusion"]);

        let tree = compiler.compile(pipeline().plan()).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(
            map_steps(&tree),
            vec![
                "fused[resize(30x30), center_crop(16x16)]".to_string(),
                "pad(l=1, t=1, r=1, b=1, Constant)".to_string()
            ]
        );
    }

    #[test]
    fn random_steps_follow_the_config_seed() {
        let ds = mnist(4)
            .map(vec![
                TransformSpec::resize(8, 8).into(),
                TransformSpec::random_crop(4, 4).into(),
            ])
            .unwrap();
        let cfg = PipelineConfig {
            seed: Some(9),
            ..Default::default()
        };
        let crop_of = |tree: &ExecutionTree| match &tree.node(tree.root().unwrap()).unwrap().kind {
            OperatorKind::Map(stage) => std::sync::Arc::clone(&stage.steps[1]),
            other => panic!("expected map root, got {}", other.name()),
        };
        let a = crop_of(&TreeCompiler::new(&cfg).compile(ds.plan()).unwrap());
        let b = crop_of(&TreeCompiler::new(&cfg).compile(ds.plan()).unwrap());
        assert!(!std::sync::Arc::ptr_eq(&a, &b));
        let image = dsflow_core::tensor::Tensor::from_u8(vec![8, 8, 1], (0..64).collect()).unwrap();
        for n in 0..10 {
            assert_eq!(
                a.apply_at(vec![image.clone()], n).unwrap(),
                b.apply_at(vec![image.clone()], n).unwrap()
            );
        }
    }

    #[test]
    fn fusion_can_be_disabled() {
        let cfg = PipelineConfig {
            enable_op_fusion: false,
            print_tree: true,
            ..Default::default()
        };
        let mut compiler = TreeCompiler::new(&cfg);
        assert_eq!(compiler.pass_names(), vec!["removal", "printer"]);
        let tree = compiler.compile(pipeline().plan()).unwrap();
        assert_eq!(map_steps(&tree).len(), 3);
    }

    #[test]
    fn unchanged_tree_takes_one_round() {
        let mut compiler = TreeCompiler::new(&PipelineConfig::default());
        let mut tree = lower_to_tree(mnist(3).batch(1).unwrap().plan()).unwrap();
        assert_eq!(compiler.optimize(&mut tree).unwrap(), 1);
    }

    /// Always claims a change, so the compiler must stop at the cap.
    struct Restless;

    impl TreePass for Restless {
        fn name(&self) -> &'static str {
            "restless"
        }
        fn visit_source(&mut self, _node: &mut Node) -> Result<bool, PassError> {
            Ok(true)
        }
    }

    #[test]
    fn round_cap_bounds_iteration() {
        let cfg = PipelineConfig {
            max_optimizer_rounds: 3,
            ..Default::default()
        };
        let mut compiler = TreeCompiler::new(&cfg);
        compiler.register(Box::new(Restless));
        let mut tree = lower_to_tree(mnist(3).plan()).unwrap();
        assert_eq!(compiler.optimize(&mut tree).unwrap(), 3);
    }

    /// Breaks the contract by walking into a cycle it creates.
    struct CycleMaker;

    impl TreePass for CycleMaker {
        fn name(&self) -> &'static str {
            "cycle_maker"
        }
        fn visit_node(&mut self, tree: &mut ExecutionTree, id: NodeId) -> Result<bool, PassError> {
            if tree.root()? == id {
                let root = id;
                tree.set_children(NodeId(0), vec![root])?;
            }
            Ok(false)
        }
    }

    #[test]
    fn pass_errors_name_the_pass() {
        let mut compiler = TreeCompiler::new(&PipelineConfig::default());
        compiler.register(Box::new(CycleMaker));
        let err = compiler
            .compile(mnist(3).batch(1).unwrap().plan())
            .unwrap_err();
        match err {
            PlanError::Pass { pass, source } => {
                assert_eq!(pass, "cycle_maker");
                assert!(matches!(source, PassError::Cycle(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
