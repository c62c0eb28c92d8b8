use std::cmp::Ordering;

use rand::rngs::SmallRng;
use rand::Rng;
use tracing::{debug, trace};

use super::strategy::{
    action_prior, best_build, mcts_override, root_buy_prior, rollout_action, rollout_turn,
    PurchaseContext,
};
use super::{Agent, AgentConfig, AgentKind, AgentStats, SelectionPolicy};
use crate::game::{Action, Cash, GameState, PlayerId, TurnResolver};
use crate::utils::Stopwatch;

/// 模拟中的启发式估值除以该常数后截断到 [-1, 1]。
const REWARD_SCALE: f64 = 3000.0;
const BUILD_SHORTCUT_CASH: Cash = 300;

/// 节点在搜索树数组中的下标。
pub type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
pub struct MctsNode {
    pub state: GameState,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// 从父节点到达本节点所采取的动作。
    pub action: Option<Action>,
    pub visits: u32,
    pub total_reward: f64,
    pub squared_reward: f64,
    pub untried: Vec<Action>,
    /// 在本节点行动的玩家。
    pub player: PlayerId,
    pub prior: f64,
    /// 本节点停在一个尚未作出的买地决定上。
    pub pending: bool,
}

impl MctsNode {
    fn new(
        state: GameState,
        parent: Option<NodeId>,
        action: Option<Action>,
        prior: f64,
        pending: bool,
    ) -> Self {
        let untried = if pending && !state.game_over {
            decision_actions(&state)
        } else {
            Vec::new()
        };
        Self {
            player: state.current_player,
            state,
            parent,
            children: Vec::new(),
            action,
            visits: 0,
            total_reward: 0.0,
            squared_reward: 0.0,
            untried,
            prior,
            pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.game_over
    }

    pub fn is_fully_expanded(&self) -> bool {
        self.untried.is_empty()
    }

    pub fn mean_reward(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.total_reward / self.visits as f64
        }
    }

    /// 父节点访问 `parent_visits` 次时本节点的选择得分；未访问过的节点为无穷大。
    pub fn selection_score(
        &self,
        parent_visits: u32,
        exploration: f64,
        policy: SelectionPolicy,
    ) -> f64 {
        if self.visits == 0 {
            return f64::INFINITY;
        }
        let n = self.visits as f64;
        let parent = parent_visits.max(1) as f64;
        let log_parent = parent.ln();
        let mean = self.total_reward / n;

        match policy {
            SelectionPolicy::Ucb1 => mean + exploration * (log_parent / n).sqrt(),
            SelectionPolicy::Ucb1Tuned => {
                let variance = (self.squared_reward / n - mean * mean).max(0.0);
                let spread = (variance + (2.0 * log_parent / n).sqrt()).min(0.25);
                let ucb = mean + exploration * (log_parent / n * spread).sqrt();
                let prior_bonus = self.prior * parent.sqrt() / (1.0 + n);
                ucb + 0.5 * prior_bonus
            }
        }
    }
}

/// 当前玩家所在格的 BUY/SKIP；加盖交给快捷规则处理。
fn decision_actions(state: &GameState) -> Vec<Action> {
    state
        .legal_actions(state.current_player)
        .into_iter()
        .filter(|action| !matches!(action, Action::Build { .. }))
        .collect()
}

/// 连续进行整回合，直到行动方遇到买得起的无主地产或终局。
/// 停在这样的回合中途决策点时返回 `true`。
fn advance_to_decision<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R, max_turns: u32) -> bool {
    for _ in 0..max_turns {
        if state.game_over {
            return false;
        }
        let player = state.current_player;
        TurnResolver::roll_and_move(state, rng);
        let landing = TurnResolver::resolve_landing(state, player, rng);
        if landing.needs_decision()
            && PurchaseContext::at(state, player)
                .map(|ctx| ctx.affordable())
                .unwrap_or(false)
        {
            return true;
        }
        state.end_turn();
    }
    false
}

/// 带启发式先验的 UCB1-Tuned 树搜索。配置了截断阈值时即为混合变体：
/// 模拟较短，财富差距拉开后提前结束。
pub struct MctsAgent {
    kind: AgentKind,
    simulations: u32,
    exploration: f64,
    simulation_depth: u32,
    cutoff_threshold: Option<Cash>,
    cutoff_min_depth: u32,
    selection: SelectionPolicy,
    rng: SmallRng,
    last_root_visits: u32,
    stats: AgentStats,
}

impl MctsAgent {
    pub fn new(config: &AgentConfig) -> Self {
        let hybrid = config.kind == AgentKind::HybridMcts || config.cutoff_threshold.is_some();
        let (name, algorithm) = if hybrid {
            (
                format!(
                    "Hybrid MCTS (sims={}, depth={})",
                    config.simulations, config.simulation_depth
                ),
                "Hybrid MCTS with Smart Cutoff",
            )
        } else {
            (
                format!("MCTS (sims={})", config.simulations),
                match config.selection {
                    SelectionPolicy::Ucb1Tuned => "Enhanced MCTS with UCB1-Tuned and Strategic Priors",
                    SelectionPolicy::Ucb1 => "MCTS with UCB1",
                },
            )
        };
        Self {
            kind: if hybrid {
                AgentKind::HybridMcts
            } else {
                AgentKind::Mcts
            },
            simulations: config.simulations.max(1),
            exploration: config.exploration,
            simulation_depth: config.simulation_depth.max(1),
            cutoff_threshold: if hybrid {
                Some(config.cutoff_threshold.unwrap_or(1000))
            } else {
                None
            },
            cutoff_min_depth: config.cutoff_min_depth,
            selection: config.selection,
            rng: config.rng(),
            last_root_visits: 0,
            stats: AgentStats::named(name, algorithm),
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    /// 最近一次搜索后根节点的访问次数。
    pub fn last_root_visits(&self) -> u32 {
        self.last_root_visits
    }

    /// 在 BUY/SKIP 上跑满模拟预算，不使用启发式捷径。局面无可选动作时返回 `None`。
    pub fn run_search(&mut self, state: &GameState) -> Option<Action> {
        if state.game_over {
            return None;
        }
        let mut tree = vec![MctsNode::new(state.clone(), None, None, 0.5, true)];
        if tree[ROOT].untried.is_empty() {
            return None;
        }

        for _ in 0..self.simulations {
            let leaf = self.select(&mut tree);
            let reward = self.simulate(&tree[leaf], state.current_player);
            backpropagate(&mut tree, leaf, reward, state.current_player);
        }

        self.last_root_visits = tree[ROOT].visits;
        self.stats.simulations_run += self.simulations as u64;
        self.stats.nodes_evaluated = tree.len() as u64;

        tree[ROOT]
            .children
            .iter()
            .map(|&id| &tree[id])
            .max_by(|a, b| {
                let score_a = a.visits as f64 + a.total_reward;
                let score_b = b.visits as f64 + b.total_reward;
                score_a.partial_cmp(&score_b).unwrap_or(Ordering::Equal)
            })
            .and_then(|node| node.action.clone())
    }

    fn select(&mut self, tree: &mut Vec<MctsNode>) -> NodeId {
        let mut current = ROOT;
        loop {
            let node = &tree[current];
            if node.is_terminal() {
                return current;
            }
            if !node.is_fully_expanded() {
                return self.expand(tree, current);
            }
            if node.children.is_empty() {
                return current;
            }
            current = self.best_child(tree, current);
        }
    }

    fn best_child(&self, tree: &[MctsNode], id: NodeId) -> NodeId {
        let parent_visits = tree[id].visits;
        let score = |child: NodeId| {
            tree[child].selection_score(parent_visits, self.exploration, self.selection)
        };
        tree[id]
            .children
            .iter()
            .copied()
            .max_by(|&a, &b| score(a).partial_cmp(&score(b)).unwrap_or(Ordering::Equal))
            .unwrap_or(id)
    }

    fn expand(&mut self, tree: &mut Vec<MctsNode>, id: NodeId) -> NodeId {
        let action = match tree[id].untried.pop() {
            Some(action) => action,
            None => return id,
        };
        let parent = &tree[id];
        let player = parent.player;
        let context = PurchaseContext::at(&parent.state, player);
        let prior = match (id, &action, &context) {
            (ROOT, Action::Buy, Some(ctx)) => root_buy_prior(ctx),
            (ROOT, Action::Skip, Some(ctx)) => 1.0 - root_buy_prior(ctx),
            _ => action_prior(context.as_ref(), &action),
        };

        let mut state = parent.state.clone();
        state.apply_action(player, &action);
        state.end_turn();
        let pending = advance_to_decision(&mut state, &mut self.rng, self.simulation_depth);

        let child = tree.len();
        tree.push(MctsNode::new(state, Some(id), Some(action), prior, pending));
        tree[id].children.push(child);
        child
    }

    fn simulate(&mut self, node: &MctsNode, me: PlayerId) -> f64 {
        let mut sim = node.state.clone();
        let mut depth = 0;
        if node.pending && !sim.game_over {
            let player = sim.current_player;
            if let Some(action) = rollout_action(&sim, player, &mut self.rng) {
                sim.apply_action(player, &action);
            }
            sim.end_turn();
            depth += 1;
        }

        while !sim.game_over && depth < self.simulation_depth {
            rollout_turn(&mut sim, &mut self.rng);
            depth += 1;
            if let Some(threshold) = self.cutoff_threshold {
                if depth >= self.cutoff_min_depth {
                    let gap = sim.total_wealth(0) as i64 - sim.total_wealth(1) as i64;
                    if gap.unsigned_abs() > threshold as u64 {
                        trace!(depth, gap, "rollout cut off");
                        break;
                    }
                }
            }
        }
        reward(&sim, me)
    }
}

/// 终局胜负恰为 ±1，其余为缩放后的启发式估值。
fn reward(state: &GameState, me: PlayerId) -> f64 {
    if state.game_over {
        return match state.winner {
            Some(winner) if winner == me => 1.0,
            Some(_) => -1.0,
            None => 0.0,
        };
    }
    (state.evaluate(me) / REWARD_SCALE).clamp(-1.0, 1.0)
}

/// 奖励按“做出进入该节点选择的玩家”视角累加，根节点按搜索方计。
fn backpropagate(tree: &mut [MctsNode], leaf: NodeId, reward: f64, me: PlayerId) {
    let mut current = Some(leaf);
    while let Some(id) = current {
        let chooser = tree[id]
            .parent
            .map(|parent| tree[parent].player)
            .unwrap_or(tree[id].player);
        let signed = if chooser == me { reward } else { -reward };
        let node = &mut tree[id];
        node.visits += 1;
        node.total_reward += signed;
        node.squared_reward += reward * reward;
        current = node.parent;
    }
}

impl Agent for MctsAgent {
    fn name(&self) -> String {
        self.stats.name.clone()
    }

    fn choose_action(&mut self, state: &GameState) -> Action {
        if state.game_over {
            return Action::Skip;
        }
        let player = state.current_player;
        let legal = state.legal_actions(player);
        if legal.len() <= 1 {
            return legal.into_iter().next().unwrap_or_default();
        }

        let watch = Stopwatch::start();
        self.stats.decisions += 1;

        if state.cash[player as usize] > BUILD_SHORTCUT_CASH {
            if let Some(build) = best_build(state, player, &legal) {
                debug!(agent = %self.stats.name, action = %build, "build shortcut");
                return build;
            }
        }
        if let Some(action) = PurchaseContext::at(state, player)
            .as_ref()
            .and_then(mcts_override)
        {
            if legal.contains(&action) {
                debug!(agent = %self.stats.name, action = %action, "heuristic override");
                return action;
            }
        }

        let action = self.run_search(state).unwrap_or_default();
        self.stats.last_duration_ms = watch.elapsed_ms();
        debug!(
            agent = %self.stats.name,
            action = %action,
            simulations = self.simulations,
            root_visits = self.last_root_visits,
            "mcts decision"
        );
        action
    }

    fn stats(&self) -> AgentStats {
        self.stats.clone()
    }
}
