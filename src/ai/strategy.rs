//! 各搜索代理共用的手调启发式：购买规则、探索先验、模拟策略、加盖选择与变卖。

use std::cmp::Ordering;

use rand::Rng;

use super::{SellKind, SellOrder};
use crate::game::{Action, Cash, GameState, Landing, PlayerId, TurnResolver};

/// 落在无主地产上时评估购买所需的局面信息。
#[derive(Debug, Clone, Copy)]
pub struct PurchaseContext {
    pub slot: usize,
    pub price: Cash,
    pub fare: Cash,
    pub cash: Cash,
    /// 购买后剩余现金，买不起时为负。
    pub cash_after: i64,
    pub mine: usize,
    pub theirs: usize,
    pub group_size: usize,
    pub unowned: usize,
}

impl PurchaseContext {
    /// 仅当 `player` 站在无主地产上时返回 `Some`。
    pub fn at(state: &GameState, player: PlayerId) -> Option<Self> {
        let position = state.positions[player as usize];
        let slot = state.property_slot(position)?;
        let property = &state.properties[slot];
        if property.owner.is_some() {
            return None;
        }
        let cash = state.cash[player as usize];
        Some(Self {
            slot,
            price: property.price,
            fare: property.fare,
            cash,
            cash_after: cash as i64 - property.price as i64,
            mine: state.owned_in_group(player, property.color),
            theirs: state.owned_in_group(GameState::opponent(player), property.color),
            group_size: state.group_size(property.color),
            unowned: state.unowned_count(),
        })
    }

    pub fn affordable(&self) -> bool {
        self.cash_after >= 0
    }

    pub fn completes_monopoly(&self) -> bool {
        self.mine + 1 == self.group_size
    }

    pub fn blocks_monopoly(&self) -> bool {
        self.theirs + 1 == self.group_size
    }

    /// 开局阶段（无主地产仍多）的低价地产。
    pub fn is_early_bargain(&self) -> bool {
        self.unowned > 25 && self.price <= 150
    }

    pub fn fare_ratio(&self) -> f64 {
        if self.price == 0 {
            0.0
        } else {
            self.fare as f64 / self.price as f64
        }
    }
}

const GOOD_FARE_RATIO: f64 = 0.45;

/// 期望极小极大在搜索前使用的高置信度规则。
pub fn expectiminimax_override(ctx: &PurchaseContext) -> Option<Action> {
    if !ctx.affordable() {
        return None;
    }
    if ctx.completes_monopoly() {
        return Some(Action::Buy);
    }
    if ctx.blocks_monopoly() && ctx.cash_after >= 30 {
        return Some(Action::Buy);
    }
    if ctx.is_early_bargain() && ctx.cash_after >= 100 {
        return Some(Action::Buy);
    }
    None
}

pub fn mcts_override(ctx: &PurchaseContext) -> Option<Action> {
    if !ctx.affordable() {
        return None;
    }
    let group = ctx.group_size;
    if ctx.completes_monopoly() {
        return Some(Action::Buy);
    }
    if ctx.blocks_monopoly() && ctx.cash_after >= 30 {
        return Some(Action::Buy);
    }
    if ctx.theirs + 2 >= group && ctx.mine == 0 && ctx.cash_after >= 50 {
        return Some(Action::Buy);
    }
    if ctx.unowned > 28 && ctx.cash_after >= 100 {
        return Some(Action::Buy);
    }
    if ctx.is_early_bargain() && ctx.fare_ratio() >= GOOD_FARE_RATIO && ctx.cash_after >= 150 {
        return Some(Action::Buy);
    }
    None
}

/// 根决策上分给 BUY 的先验比例，取值在 (0, 1)。
pub fn root_buy_prior(ctx: &PurchaseContext) -> f64 {
    let mut buy = 0.5;
    let mut skip = 0.5;
    if ctx.mine >= 1 {
        buy += 0.2;
    }
    if ctx.theirs >= 2 {
        buy += 0.3;
    }
    if ctx.cash_after < 50 {
        skip += 0.3;
    } else if ctx.cash_after > 300 {
        buy += 0.2;
    }
    if ctx.unowned > 25 {
        buy += 0.1;
    } else if ctx.unowned < 10 {
        skip += 0.1;
    }
    if ctx.fare_ratio() >= GOOD_FARE_RATIO {
        buy += 0.15;
    }
    buy / (buy + skip)
}

/// 根以下由 `action` 生成的子节点的先验。
pub fn action_prior(ctx: Option<&PurchaseContext>, action: &Action) -> f64 {
    let ctx = match (action, ctx) {
        (Action::Skip, _) => return 0.4,
        (_, None) => return 0.5,
        (_, Some(ctx)) => ctx,
    };
    let mut prior: f64 = 0.5;
    if ctx.mine >= 1 {
        prior += 0.2;
    }
    if ctx.theirs >= 2 {
        prior += 0.25;
    }
    if ctx.cash_after < 50 {
        prior -= 0.2;
    } else if ctx.cash_after > 200 {
        prior += 0.1;
    }
    prior.clamp(0.1, 0.9)
}

fn max_fare_of(state: &GameState, player: PlayerId) -> Cash {
    state
        .player_properties(player)
        .map(|p| p.fare)
        .max()
        .unwrap_or(0)
}

/// 玩家应保留的现金，按对手地产的租金威胁确定。
pub fn safe_reserve(state: &GameState, player: PlayerId) -> Cash {
    let opponent = GameState::opponent(player);
    let max_fare = max_fare_of(state, opponent);
    if state.monopoly_count(opponent) > 0 {
        (max_fare * 3).max(150)
    } else {
        (max_fare * 2).max(80)
    }
}

/// 模拟阶段使用的随机购买策略。
pub fn rollout_should_buy<R: Rng + ?Sized>(
    state: &GameState,
    player: PlayerId,
    ctx: &PurchaseContext,
    rng: &mut R,
) -> bool {
    if !ctx.affordable() {
        return false;
    }
    let cash_after = ctx.cash_after;
    if ctx.completes_monopoly() {
        return true;
    }
    if ctx.blocks_monopoly() && cash_after >= 20 {
        return true;
    }
    if ctx.theirs + 2 >= ctx.group_size && ctx.mine == 0 && cash_after >= 40 {
        return true;
    }
    if ctx.mine >= 1 && ctx.theirs == 0 {
        return cash_after >= 60 || rng.gen_bool(0.7);
    }

    let reserve = safe_reserve(state, player) as f64;
    let after = cash_after as f64;
    let (threshold, chance) = match ctx.unowned {
        n if n > 28 => (50.0, 0.8),
        n if n > 22 => (80.0, 0.7),
        n if n > 15 => (reserve, 0.5),
        n if n > 8 => (reserve * 1.2, 0.35),
        _ => (reserve * 1.5, 0.2),
    };
    after >= threshold || rng.gen_bool(chance)
}

/// 模拟中的加盖：付完造价仍保有储备时，在租金最高的可建地产上加盖。
pub fn rollout_build<R: Rng + ?Sized>(
    state: &GameState,
    player: PlayerId,
    rng: &mut R,
) -> Option<Action> {
    let reserve = safe_reserve(state, player);
    let cash = state.cash[player as usize];
    let slot = state
        .buildable_slots(player)
        .into_iter()
        .filter(|&slot| cash.saturating_sub(state.build_cost(slot)) >= reserve)
        .max_by_key(|&slot| state.fare_for(slot))?;
    if rng.gen_bool(0.5) {
        Some(Action::Build {
            property: state.properties[slot].index,
        })
    } else {
        None
    }
}

/// 用模拟策略替 `state.current_player` 走完一整个回合。
pub fn rollout_turn<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) -> bool {
    let player = state.current_player;
    TurnResolver::roll_and_move(state, rng);
    let landing = TurnResolver::resolve_landing(state, player, rng);
    if let Landing::Unowned { .. } = landing {
        if let Some(action) = rollout_action(state, player, rng) {
            state.apply_action(player, &action);
        }
    }
    state.end_turn()
}

pub fn rollout_action<R: Rng + ?Sized>(
    state: &GameState,
    player: PlayerId,
    rng: &mut R,
) -> Option<Action> {
    let ctx = PurchaseContext::at(state, player)?;
    if rollout_should_buy(state, player, &ctx, rng) {
        return Some(Action::Buy);
    }
    rollout_build(state, player, rng)
}

/// 在 `legal` 中挑选价值最高、且建后现金仍多于 150 的 BUILD。
pub fn best_build(state: &GameState, player: PlayerId, legal: &[Action]) -> Option<Action> {
    let cash = state.cash[player as usize] as i64;
    let mut best: Option<(f64, Action)> = None;
    for action in legal {
        let index = match action {
            Action::Build { property } => *property,
            _ => continue,
        };
        let slot = match state.property_slot(index) {
            Some(slot) => slot,
            None => continue,
        };
        let property = &state.properties[slot];
        let mut fare_gain = property.fare as f64 * 0.4;
        if state.has_monopoly(player, property.color) {
            fare_gain *= 2.0;
        }
        let room = (state.board().max_buildings.saturating_sub(property.buildings)) as f64 * 10.0;
        let value = fare_gain + room + property.fare as f64 / 10.0;
        let remaining = cash - state.build_cost(slot) as i64;
        if remaining > 150 && value > best.as_ref().map(|(v, _)| *v).unwrap_or(0.0) {
            best = Some((value, action.clone()));
        }
    }
    best.map(|(_, action)| action)
}

/*********        LIQUIDATION        *********/

fn building_keep_value(state: &GameState, player: PlayerId, slot: usize) -> f64 {
    let property = &state.properties[slot];
    let mut value = property.fare as f64 * 2.0;
    if state.has_monopoly(player, property.color) {
        value += 200.0;
    }
    value += property.price as f64 / 2.0;
    value - (property.buildings as f64 - 1.0) * 20.0
}

fn property_keep_value(state: &GameState, player: PlayerId, slot: usize) -> f64 {
    let property = &state.properties[slot];
    let mine = state.owned_in_group(player, property.color);
    let theirs = state.owned_in_group(GameState::opponent(player), property.color);
    let size = state.group_size(property.color);

    let mut value = property.fare as f64 * 3.0;
    if mine == size {
        value += 1000.0;
    }
    if mine + 1 == size {
        value += 500.0;
    }
    value += 300.0 * theirs as f64;
    value + property.price as f64 + property.fare as f64 * 5.0
}

fn cheapest_to_keep<F>(candidates: impl Iterator<Item = usize>, keep_value: F) -> Option<usize>
where
    F: Fn(usize) -> f64,
{
    candidates.min_by(|&a, &b| {
        keep_value(a)
            .partial_cmp(&keep_value(b))
            .unwrap_or(Ordering::Equal)
    })
}

/// 排出变卖顺序，直到 `player` 手中至少有 `amount_needed`。先卖建筑后卖地产，
/// 同类中最不值得保留的先卖。变卖在克隆上预演，不改动 `state`。
pub fn plan_liquidation(state: &GameState, player: PlayerId, amount_needed: Cash) -> Vec<SellOrder> {
    let mut scratch = state.clone();
    let mut orders = Vec::new();

    while scratch.cash[player as usize] < amount_needed {
        let slots = 0..scratch.properties.len();
        let building = cheapest_to_keep(
            slots.clone().filter(|&s| scratch.can_sell_building(player, s)),
            |s| building_keep_value(&scratch, player, s),
        );
        let (slot, kind) = match building {
            Some(slot) => (slot, SellKind::SellBuilding),
            None => {
                let property = cheapest_to_keep(
                    slots.filter(|&s| scratch.can_sell_property(player, s)),
                    |s| property_keep_value(&scratch, player, s),
                );
                match property {
                    Some(slot) => (slot, SellKind::SellProperty),
                    None => break,
                }
            }
        };

        let value = match kind {
            SellKind::SellBuilding => scratch.sell_building(player, slot),
            SellKind::SellProperty => scratch.sell_property(player, slot),
        };
        let property = &scratch.properties[slot];
        orders.push(SellOrder {
            kind,
            property_index: property.index,
            property_name: property.name.clone(),
            value,
        });
    }
    orders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{DEFAULT_MAX_TURNS, DEFAULT_STARTING_CASH};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn fresh() -> GameState {
        GameState::with_cash(DEFAULT_STARTING_CASH, DEFAULT_MAX_TURNS)
    }

    /// 让 `player` 站在 `position` 上。
    fn standing(mut state: GameState, player: PlayerId, position: u8) -> GameState {
        state.positions[player as usize] = position;
        state.current_player = player;
        state
    }

    #[test]
    fn context_only_on_unowned_property() {
        let state = standing(fresh(), 0, 9);
        assert!(PurchaseContext::at(&state, 0).is_none());

        let mut state = standing(fresh(), 0, 5);
        let ctx = PurchaseContext::at(&state, 0).expect("unowned");
        assert_eq!((ctx.price, ctx.fare, ctx.cash_after), (80, 40, 1420));
        assert_eq!(ctx.unowned, 35);

        let slot = state.property_slot(5).expect("property");
        state.properties[slot].owner = Some(1);
        assert!(PurchaseContext::at(&state, 0).is_none());
    }

    #[test]
    fn completing_monopoly_overrides_search() {
        let mut state = standing(fresh(), 0, 4);
        // 棕色组 1-4 号格，玩家 0 已有前三块
        for position in 1..=3u8 {
            let slot = state.property_slot(position).expect("property");
            state.properties[slot].owner = Some(0);
        }
        state.cash[0] = 100;
        let ctx = PurchaseContext::at(&state, 0).expect("unowned");
        assert!(ctx.completes_monopoly());
        assert_eq!(expectiminimax_override(&ctx), Some(Action::Buy));
        assert_eq!(mcts_override(&ctx), Some(Action::Buy));

        state.cash[0] = 10;
        let ctx = PurchaseContext::at(&state, 0).expect("unowned");
        assert_eq!(mcts_override(&ctx), None, "cannot afford");
    }

    #[test]
    fn fare_ratio_only_overrides_early_bargains() {
        let early = standing(fresh(), 0, 6);
        let ctx = PurchaseContext::at(&early, 0).expect("unowned");
        assert!(ctx.fare_ratio() >= GOOD_FARE_RATIO);
        assert_eq!(expectiminimax_override(&ctx), Some(Action::Buy));
        assert_eq!(mcts_override(&ctx), Some(Action::Buy));

        let mut late = standing(fresh(), 0, 37);
        for slot in 0..32 {
            late.properties[slot].owner = Some((slot % 2) as PlayerId);
        }
        late.cash[0] = 1000;
        let ctx = PurchaseContext::at(&late, 0).expect("unowned");
        assert!(ctx.fare_ratio() >= GOOD_FARE_RATIO);
        assert!(ctx.cash_after >= 150);
        assert_eq!(expectiminimax_override(&ctx), None);
        assert_eq!(mcts_override(&ctx), None);
    }

    #[test]
    fn blocking_needs_small_reserve() {
        let mut state = standing(fresh(), 0, 4);
        for position in 1..=3u8 {
            let slot = state.property_slot(position).expect("property");
            state.properties[slot].owner = Some(1);
        }
        // 4 号格价格 90
        state.cash[0] = 110;
        let ctx = PurchaseContext::at(&state, 0).expect("unowned");
        assert!(ctx.blocks_monopoly());
        assert_eq!(expectiminimax_override(&ctx), None);

        state.cash[0] = 120;
        let ctx = PurchaseContext::at(&state, 0).expect("unowned");
        assert_eq!(expectiminimax_override(&ctx), Some(Action::Buy));
    }

    #[test]
    fn priors_stay_in_unit_interval() {
        let mut state = standing(fresh(), 0, 6);
        for cash in [0, 40, 100, 400, 5000] {
            state.cash[0] = cash;
            let ctx = PurchaseContext::at(&state, 0).expect("unowned");
            let root = root_buy_prior(&ctx);
            assert!(root > 0.0 && root < 1.0, "root prior {root}");
            let buy = action_prior(Some(&ctx), &Action::Buy);
            assert!((0.1..=0.9).contains(&buy));
        }
        assert_eq!(action_prior(None, &Action::Skip), 0.4);
    }

    #[test]
    fn reserve_grows_with_opponent_monopoly() {
        let mut state = fresh();
        assert_eq!(safe_reserve(&state, 0), 80);
        state.grant_group(1, 7);
        // 深蓝组最高租金 155，已垄断 -> 3 倍
        assert_eq!(safe_reserve(&state, 0), 465);
    }

    #[test]
    fn rollout_policy_never_buys_unaffordable() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut state = standing(fresh(), 0, 38);
        state.cash[0] = 100;
        let ctx = PurchaseContext::at(&state, 0).expect("unowned");
        for _ in 0..100 {
            assert!(!rollout_should_buy(&state, 0, &ctx, &mut rng));
        }
    }

    #[test]
    fn rollout_turns_reach_the_end() {
        let mut rng = SmallRng::seed_from_u64(17);
        let mut state = GameState::with_cash(DEFAULT_STARTING_CASH, 80);
        let mut turns = 0;
        while !rollout_turn(&mut state, &mut rng) {
            turns += 1;
            assert!(state.integrity_check().is_ok());
        }
        assert!(turns < 80);
        assert!(state.winner.is_some());
    }

    #[test]
    fn best_build_respects_reserve() {
        let mut state = standing(fresh(), 0, 5);
        state.grant_group(0, 0);
        let legal = state.legal_actions(0);
        let pick = best_build(&state, 0, &legal).expect("rich enough to build");
        assert!(matches!(pick, Action::Build { .. }));

        state.cash[0] = 200;
        let legal = state.legal_actions(0);
        assert_eq!(best_build(&state, 0, &legal), None);
    }

    #[test]
    fn liquidation_sells_buildings_before_properties() {
        let mut state = fresh();
        state.grant_group(0, 2);
        let slot = state.property_slot(10).expect("pink");
        assert!(state.build_on_property(0, slot));
        let brown = state.property_slot(1).expect("brown");
        state.properties[brown].owner = Some(0);
        state.cash[0] = 0;

        let orders = plan_liquidation(&state, 0, 150);
        assert_eq!(orders[0].kind, SellKind::SellBuilding);
        assert_eq!(orders[0].property_index, 10);
        assert_eq!(
            orders[1].property_index, 1,
            "the lone brown lot is cheaper to keep than the pink monopoly"
        );
        let raised: Cash = orders.iter().map(|o| o.value).sum();
        assert!(raised >= 150);
        assert_eq!(state.cash[0], 0, "planning does not touch the real state");
    }

    #[test]
    fn liquidation_stops_when_nothing_is_left() {
        let state = fresh();
        assert!(plan_liquidation(&state, 0, 5000).is_empty());
    }
}
