use rand::rngs::SmallRng;
use tracing::debug;

use super::strategy::{expectiminimax_override, PurchaseContext};
use super::{Agent, AgentConfig, AgentStats};
use crate::game::{roll_dice, Action, GameState, PlayerId, DICE_OUTCOMES};
use crate::utils::Stopwatch;

/// 两枚骰子的期望点数。
const AVERAGE_ROLL: u8 = 7;

fn format_depth(name: &str, depth: u8) -> String {
    format!("{name} (depth={depth})")
}

/// 搜索树内地产决策点上的 BUY/SKIP 分支。
fn decision_branches(state: &GameState, slot: usize) -> impl Iterator<Item = bool> {
    let can_buy = state.can_buy(state.current_player, slot);
    [true, false].into_iter().filter(move |buy| !*buy || can_buy)
}

fn branch_state(state: &GameState, slot: usize, buy: bool) -> GameState {
    let mut child = state.clone();
    if buy {
        let mover = child.current_player;
        child.buy_property(mover, slot);
    }
    child.end_turn();
    child
}

/// 把一个子节点的值并入 min/max 决策节点；其余兄弟节点可剪掉时返回 `true`。
fn update_window(
    maximizing: bool,
    value: f64,
    best: &mut f64,
    alpha: &mut f64,
    beta: &mut f64,
    prune: bool,
) -> bool {
    if maximizing {
        *best = best.max(value);
        *alpha = alpha.max(*best);
    } else {
        *best = best.min(value);
        *beta = beta.min(*best);
    }
    prune && *beta <= *alpha
}

/*********        SIMPLIFIED MINIMAX        *********/

/// 确定性近似下的极小极大：每次掷骰都按 7 点，机会格期望收益为零。
pub struct SimplifiedMinimaxAgent {
    depth: u8,
    alpha_beta: bool,
    stats: AgentStats,
}

impl SimplifiedMinimaxAgent {
    pub fn new(config: &AgentConfig) -> Self {
        let depth = config.depth.max(1);
        Self {
            depth,
            alpha_beta: config.alpha_beta,
            stats: AgentStats::named(
                format_depth("Simplified Minimax", depth),
                "Simplified Minimax (Average Dice)",
            ),
        }
    }

    /// 按配置深度计算 `state` 对 `player` 的搜索值。
    pub fn search_value(&mut self, state: &GameState, player: PlayerId) -> f64 {
        self.stats.nodes_evaluated = 0;
        self.minimax(state, self.depth, f64::NEG_INFINITY, f64::INFINITY, player)
    }

    pub fn nodes_evaluated(&self) -> u64 {
        self.stats.nodes_evaluated
    }

    fn minimax(&mut self, state: &GameState, depth: u8, alpha: f64, beta: f64, me: PlayerId) -> f64 {
        self.stats.nodes_evaluated += 1;
        if depth == 0 || state.game_over {
            return state.evaluate(me);
        }

        let mover = state.current_player;
        let mut next = state.clone();
        let position = next.move_player(mover, AVERAGE_ROLL);
        if let Some(slot) = next.property_slot(position) {
            match next.properties[slot].owner {
                None => return self.decide(&next, slot, depth, alpha, beta, me),
                Some(owner) if owner != mover => {
                    next.pay_fare(mover, slot);
                }
                Some(_) => {}
            }
        }
        next.end_turn();
        self.minimax(&next, depth - 1, alpha, beta, me)
    }

    fn decide(
        &mut self,
        state: &GameState,
        slot: usize,
        depth: u8,
        mut alpha: f64,
        mut beta: f64,
        me: PlayerId,
    ) -> f64 {
        let maximizing = state.current_player == me;
        let mut best = if maximizing {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
        for buy in decision_branches(state, slot) {
            let child = branch_state(state, slot, buy);
            let value = self.minimax(&child, depth - 1, alpha, beta, me);
            if update_window(maximizing, value, &mut best, &mut alpha, &mut beta, self.alpha_beta) {
                break;
            }
        }
        best
    }
}

impl Agent for SimplifiedMinimaxAgent {
    fn name(&self) -> String {
        self.stats.name.clone()
    }

    fn choose_action(&mut self, state: &GameState) -> Action {
        let player = state.current_player;
        let legal = state.legal_actions(player);
        if state.game_over {
            return Action::Skip;
        }
        if legal.len() <= 1 {
            return legal.into_iter().next().unwrap_or_default();
        }

        let watch = Stopwatch::start();
        self.stats.nodes_evaluated = 0;
        let mut best_action = Action::Skip;
        let mut best_value = f64::NEG_INFINITY;
        for action in legal {
            let mut child = state.clone();
            child.apply_action(player, &action);
            child.end_turn();
            let alpha = if self.alpha_beta {
                best_value
            } else {
                f64::NEG_INFINITY
            };
            let value = self.minimax(&child, self.depth - 1, alpha, f64::INFINITY, player);
            if value > best_value {
                best_value = value;
                best_action = action;
            }
        }

        self.stats.decisions += 1;
        self.stats.last_duration_ms = watch.elapsed_ms();
        debug!(
            agent = %self.stats.name,
            action = %best_action,
            value = best_value,
            nodes = self.stats.nodes_evaluated,
            "minimax decision"
        );
        best_action
    }

    fn stats(&self) -> AgentStats {
        self.stats.clone()
    }
}

/*********        EXPECTIMINIMAX        *********/

/// 决策节点与骰子、机会格期望节点交替出现。
/// 每个期望节点都以全新的 (-inf, inf) 窗口展开子树，而决策节点只有
/// BUY/SKIP 两个分支，所以 `alpha_beta` 在这里实际不会剪枝，结果总是
/// 等于完整搜索。
pub struct ExpectiminimaxAgent {
    depth: u8,
    dice_samples: Option<u8>,
    alpha_beta: bool,
    rng: SmallRng,
    stats: AgentStats,
}

impl ExpectiminimaxAgent {
    pub fn new(config: &AgentConfig) -> Self {
        let depth = config.depth.max(1);
        let algorithm = match config.dice_samples {
            Some(_) => "Expectiminimax with Alpha-Beta Pruning (sampled dice)",
            None => "Expectiminimax with Alpha-Beta Pruning",
        };
        Self {
            depth,
            dice_samples: config.dice_samples.filter(|&n| n > 0),
            alpha_beta: config.alpha_beta,
            rng: config.rng(),
            stats: AgentStats::named(format_depth("Expectiminimax", depth), algorithm),
        }
    }

    pub fn search_value(&mut self, state: &GameState, player: PlayerId) -> f64 {
        self.stats.nodes_evaluated = 0;
        self.expectiminimax(state, self.depth, player)
    }

    pub fn nodes_evaluated(&self) -> u64 {
        self.stats.nodes_evaluated
    }

    fn expectiminimax(&mut self, state: &GameState, depth: u8, me: PlayerId) -> f64 {
        self.stats.nodes_evaluated += 1;
        if depth == 0 || state.game_over {
            return state.evaluate(me);
        }
        self.dice_node(state, depth, me)
    }

    fn dice_node(&mut self, state: &GameState, depth: u8, me: PlayerId) -> f64 {
        match self.dice_samples {
            None => {
                let mut expected = 0.0;
                for (sum, ways) in DICE_OUTCOMES {
                    expected += ways as f64 / 36.0 * self.landing(state, sum, depth, me);
                }
                expected
            }
            Some(samples) => {
                let mut total = 0.0;
                for _ in 0..samples {
                    let roll = roll_dice(&mut self.rng);
                    total += self.landing(state, roll, depth, me);
                }
                total / samples as f64
            }
        }
    }

    fn landing(&mut self, state: &GameState, roll: u8, depth: u8, me: PlayerId) -> f64 {
        let mut next = state.clone();
        let mover = next.current_player;
        let position = next.move_player(mover, roll);
        if next.is_chance_tile(position) {
            return self.gamble_node(&next, depth, me);
        }
        if let Some(slot) = next.property_slot(position) {
            match next.properties[slot].owner {
                None => {
                    return self.decision_node(
                        &next,
                        slot,
                        depth,
                        f64::NEG_INFINITY,
                        f64::INFINITY,
                        me,
                    )
                }
                Some(owner) if owner != mover => {
                    next.pay_fare(mover, slot);
                }
                Some(_) => {}
            }
        }
        next.end_turn();
        self.expectiminimax(&next, depth - 1, me)
    }

    fn gamble_node(&mut self, state: &GameState, depth: u8, me: PlayerId) -> f64 {
        let mover = state.current_player;
        let effects = state.board().chance_effects();
        if effects.is_empty() {
            let mut next = state.clone();
            next.end_turn();
            return self.expectiminimax(&next, depth - 1, me);
        }
        let weight = 1.0 / effects.len() as f64;
        let mut expected = 0.0;
        for effect in effects {
            let mut next = state.clone();
            effect.apply(&mut next, mover);
            next.end_turn();
            expected += weight * self.expectiminimax(&next, depth - 1, me);
        }
        expected
    }

    fn decision_node(
        &mut self,
        state: &GameState,
        slot: usize,
        depth: u8,
        mut alpha: f64,
        mut beta: f64,
        me: PlayerId,
    ) -> f64 {
        let maximizing = state.current_player == me;
        let mut best = if maximizing {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
        for buy in decision_branches(state, slot) {
            let child = branch_state(state, slot, buy);
            let value = self.expectiminimax(&child, depth - 1, me);
            if update_window(maximizing, value, &mut best, &mut alpha, &mut beta, self.alpha_beta) {
                break;
            }
        }
        best
    }
}

impl Agent for ExpectiminimaxAgent {
    fn name(&self) -> String {
        self.stats.name.clone()
    }

    fn choose_action(&mut self, state: &GameState) -> Action {
        let player = state.current_player;
        let legal = state.legal_actions(player);
        if state.game_over {
            return Action::Skip;
        }
        if legal.len() <= 1 {
            return legal.into_iter().next().unwrap_or_default();
        }

        let context = PurchaseContext::at(state, player);
        if let Some(action) = context.as_ref().and_then(expectiminimax_override) {
            if legal.contains(&action) {
                self.stats.decisions += 1;
                debug!(agent = %self.stats.name, action = %action, "heuristic override");
                return action;
            }
        }

        let watch = Stopwatch::start();
        self.stats.nodes_evaluated = 0;
        let mut best_action = Action::Skip;
        let mut best_value = f64::NEG_INFINITY;
        for action in legal {
            let mut child = state.clone();
            child.apply_action(player, &action);
            child.end_turn();
            let mut value = self.expectiminimax(&child, self.depth - 1, player);
            // 浅层搜索低估了地产的长期收益
            if action == Action::Buy {
                if let Some(ctx) = &context {
                    value += ctx.fare as f64 * 2.0;
                }
            }
            if value > best_value {
                best_value = value;
                best_action = action;
            }
        }

        self.stats.decisions += 1;
        self.stats.last_duration_ms = watch.elapsed_ms();
        debug!(
            agent = %self.stats.name,
            action = %best_action,
            value = best_value,
            nodes = self.stats.nodes_evaluated,
            "expectiminimax decision"
        );
        best_action
    }

    fn stats(&self) -> AgentStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AgentKind;
    use crate::game::{DEFAULT_MAX_TURNS, DEFAULT_STARTING_CASH};

    fn fresh() -> GameState {
        GameState::with_cash(DEFAULT_STARTING_CASH, DEFAULT_MAX_TURNS)
    }

    fn standing(position: u8) -> GameState {
        let mut state = fresh();
        state.positions[0] = position;
        state
    }

    /// 几个包含买地决策的局面，双方都持有一些地产。
    fn scenarios() -> Vec<GameState> {
        let mut out = Vec::new();
        for (p0, p1) in [(0u8, 0u8), (3, 11), (20, 6), (31, 27)] {
            let mut state = fresh();
            state.positions = [p0, p1];
            out.push(state.clone());

            state.grant_group(1, 1);
            state.cash = [900, 400];
            out.push(state);
        }
        out
    }

    fn minimax(alpha_beta: bool, depth: u8) -> SimplifiedMinimaxAgent {
        SimplifiedMinimaxAgent::new(
            &AgentConfig::for_kind(AgentKind::SimplifiedMinimax)
                .with_depth(depth)
                .with_alpha_beta(alpha_beta),
        )
    }

    fn exact_expectiminimax(alpha_beta: bool, depth: u8) -> ExpectiminimaxAgent {
        ExpectiminimaxAgent::new(
            &AgentConfig::for_kind(AgentKind::Expectiminimax)
                .with_depth(depth)
                .with_dice_samples(None)
                .with_alpha_beta(alpha_beta),
        )
    }

    #[test]
    fn pruning_never_changes_minimax_value() {
        let mut pruned_total = 0;
        let mut full_total = 0;
        for state in scenarios() {
            for me in [0, 1] {
                let mut pruned = minimax(true, 6);
                let mut full = minimax(false, 6);
                let a = pruned.search_value(&state, me);
                let b = full.search_value(&state, me);
                assert_eq!(a, b, "pruned and full search disagree");
                assert!(pruned.nodes_evaluated() <= full.nodes_evaluated());
                pruned_total += pruned.nodes_evaluated();
                full_total += full.nodes_evaluated();
            }
        }
        assert!(pruned_total < full_total, "pruning should cut something");
    }

    #[test]
    fn minimax_returns_a_legal_action() {
        for position in [1u8, 5, 14, 27, 38] {
            let state = standing(position);
            let legal = state.legal_actions(0);
            let mut agent = minimax(true, 4);
            let action = agent.choose_action(&state);
            assert!(legal.contains(&action), "{action} not legal at {position}");
        }
    }

    #[test]
    fn expectiminimax_returns_a_legal_action() {
        let mut state = standing(37);
        state.cash = [400, 1500];
        let legal = state.legal_actions(0);
        let config = AgentConfig::for_kind(AgentKind::Expectiminimax)
            .with_depth(2)
            .with_seed(Some(3));
        let mut agent = ExpectiminimaxAgent::new(&config);
        let action = agent.choose_action(&state);
        assert!(legal.contains(&action));
        assert_eq!(agent.stats().decisions, 1);
    }

    #[test]
    fn finished_game_yields_skip() {
        let mut state = standing(5);
        state.cash[1] = 0;
        state.check_game_over();
        assert_eq!(minimax(true, 3).choose_action(&state), Action::Skip);
        assert_eq!(exact_expectiminimax(true, 2).choose_action(&state), Action::Skip);
    }

    #[test]
    fn only_skip_when_broke() {
        let mut state = standing(38);
        state.cash[0] = 10;
        assert_eq!(state.legal_actions(0), vec![Action::Skip]);
        assert_eq!(minimax(true, 3).choose_action(&state), Action::Skip);
    }

    #[test]
    fn override_completes_monopoly_without_search() {
        let mut state = standing(4);
        for position in 1..=3u8 {
            let slot = state.property_slot(position).expect("property");
            state.properties[slot].owner = Some(0);
        }
        let mut agent = exact_expectiminimax(true, 3);
        assert_eq!(agent.choose_action(&state), Action::Buy);
        assert_eq!(agent.nodes_evaluated(), 0, "search was skipped");
    }

    #[test]
    fn late_expensive_lot_goes_through_search() {
        let mut state = standing(37);
        for slot in 0..32 {
            state.properties[slot].owner = Some((slot % 2) as PlayerId);
        }
        state.cash[0] = 1000;
        let price = state.property_at(37).map(|p| p.price);
        assert_eq!(price, Some(330));

        let legal = state.legal_actions(0);
        let mut agent = exact_expectiminimax(true, 2);
        let action = agent.choose_action(&state);
        assert!(legal.contains(&action));
        assert!(agent.nodes_evaluated() > 0, "search must run for a late purchase");
    }

    #[test]
    fn sampled_search_is_reproducible_with_seed() {
        let state = standing(21);
        let config = AgentConfig::for_kind(AgentKind::Expectiminimax)
            .with_depth(3)
            .with_seed(Some(99));
        let a = ExpectiminimaxAgent::new(&config).search_value(&state, 0);
        let b = ExpectiminimaxAgent::new(&config).search_value(&state, 0);
        assert_eq!(a, b);
    }
}
