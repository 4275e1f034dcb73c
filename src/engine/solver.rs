// ==========================================
// 评审分配引擎 - 求解器调度
// ==========================================
// 职责: 约束图 → 分配方案（可插拔求解策略）
// 红线: 所有求解器都必须遵守排除组合与节点容量上下限
// 红线: NoSolution（无可行解）与 SolverFault（求解故障）严格区分
// ==========================================

mod alternates;
mod dispatch;
mod fair_flow;
mod fair_sequence;
mod flow;
mod minmax;
mod perturbed;
mod randomized;
mod types;

#[cfg(test)]
mod tests;

pub use alternates::select_alternates;
pub use dispatch::{dispatch, solve};
pub use fair_flow::FairFlowSolver;
pub use fair_sequence::FairSequenceSolver;
pub use minmax::MinMaxSolver;
pub use perturbed::PerturbedMaximizationSolver;
pub use randomized::RandomizedSolver;
pub use types::{AssignedPair, Assignment, CancellationFlag, Solver, SolverParams};
