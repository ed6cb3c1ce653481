//! Human-readable rendering of a map/reduce plan layout.

use crate::physical::merge::{MergeVariant, merge_depth};
use crate::physical::optimizer::{OptimizationDecision, ShuffleStrategy, SideLayout};
use std::fmt::{Display, Formatter, Result as FormatResult};

/// A single stage of the physical plan.
#[derive(Debug, Clone)]
pub struct ExplainStep {
    /// Position in the stage sequence.
    pub step: usize,
    /// Stage name (`Spray`, `Map`, `Shuffle`, ...).
    pub stage: String,
    /// Human-readable description.
    pub description: String,
    /// Number of parallel instances of the stage.
    pub instances: usize,
}

/// Detailed explanation of a map/reduce plan, produced without building it.
#[derive(Debug, Clone)]
pub struct PlanExplanation {
    /// `MapReduce` or `Map2Reduce`.
    pub plan: String,
    /// One layout per map pipeline.
    pub layouts: Vec<SideLayout>,
    pub steps: Vec<ExplainStep>,
    pub optimizations: Vec<OptimizationDecision>,
    /// Depth of the final merge tree.
    pub final_merge_depth: usize,
}

impl PlanExplanation {
    pub(crate) fn new(
        plan: &str,
        sides: &[(SideLayout, bool)],
        binary_reduce: bool,
        optimizations: Vec<OptimizationDecision>,
    ) -> Self {
        let mut steps = Vec::new();
        let mut push = |stage: &str, description: String, instances: usize| {
            steps.push(ExplainStep {
                step: steps.len() + 1,
                stage: stage.to_string(),
                description,
                instances,
            });
        };
        let multi = sides.len() > 1;
        for (i, (layout, binary_map)) in sides.iter().enumerate() {
            let tag = if multi { format!("[{}] ", i + 1) } else { String::new() };
            let m = layout.map_arity;
            push("Spray", format!("{tag}left input {} into {m} partitions", layout.left_spray), m);
            if let Some(right) = &layout.right_spray {
                push("Spray", format!("{tag}right input {right} into {m} partitions"), m);
            }
            let arity = if *binary_map { "two-input" } else { "single-input" };
            push("Map", format!("{tag}{arity} transform per partition"), m);
            match layout.strategy {
                ShuffleStrategy::LocalGroup => {
                    push("LocalGroup", format!("{tag}group by (key, reduce key) in place"), m);
                }
                ShuffleStrategy::Shuffle => {
                    let r = layout.reduce_arity;
                    push("Shuffle", format!("{tag}route by reduce key hash into {r} lanes"), m);
                    push(
                        "Gather",
                        format!(
                            "{tag}{r} {} merge trees over {m} inputs, depth {}",
                            layout.gather_variant,
                            merge_depth(m)
                        ),
                        r,
                    );
                }
            }
        }
        let r = sides.first().map_or(1, |(l, _)| l.reduce_arity);
        let reducer = if binary_reduce { "two-input reducer" } else { "reducer" };
        push("Reduce", format!("{reducer} per lane"), r);
        push("Ungroup", "restore map-level key".to_string(), r);
        let depth = merge_depth(r);
        push(
            "Merge",
            format!("{} root merge over {r} inputs, depth {depth}", MergeVariant::General),
            1,
        );
        Self {
            plan: plan.to_string(),
            layouts: sides.iter().map(|(l, _)| l.clone()).collect(),
            steps,
            optimizations,
            final_merge_depth: depth,
        }
    }

    /// Whether every pipeline replaced Shuffle + Gather with a local group.
    pub fn skips_shuffle(&self) -> bool {
        self.layouts
            .iter()
            .all(|l| l.strategy == ShuffleStrategy::LocalGroup)
    }

    pub fn reduce_arity(&self) -> usize {
        self.layouts.first().map_or(1, |l| l.reduce_arity)
    }
}

impl Display for PlanExplanation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(f, "╔═══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║  {:<59}  ║", format!("{} PHYSICAL PLAN", self.plan.to_uppercase()))?;
        writeln!(f, "╚═══════════════════════════════════════════════════════════════╝")?;
        writeln!(f)?;

        writeln!(f, "┌─ LAYOUT ─────────────────────────────────────────────────────┐")?;
        for (i, l) in self.layouts.iter().enumerate() {
            writeln!(
                f,
                "│ Pipeline {}: map arity {:>3}, reduce arity {:>3}, {}",
                i + 1,
                l.map_arity,
                l.reduce_arity,
                l.strategy
            )?;
        }
        writeln!(f, "│ Final merge depth: {:>3}", self.final_merge_depth)?;
        writeln!(f, "└──────────────────────────────────────────────────────────────┘")?;
        writeln!(f)?;

        writeln!(f, "┌─ STAGES ─────────────────────────────────────────────────────┐")?;
        for step in &self.steps {
            writeln!(f, "│")?;
            writeln!(f, "│ Step {}: {} (x{})", step.step, step.stage, step.instances)?;
            writeln!(f, "│   {}", step.description)?;
        }
        writeln!(f, "│")?;
        writeln!(f, "└──────────────────────────────────────────────────────────────┘")?;

        if !self.optimizations.is_empty() {
            writeln!(f)?;
            writeln!(f, "┌─ DECISIONS ──────────────────────────────────────────────────┐")?;
            for d in &self.optimizations {
                writeln!(f, "│ • {d}")?;
            }
            writeln!(f, "└──────────────────────────────────────────────────────────────┘")?;
        }
        Ok(())
    }
}
