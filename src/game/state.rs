use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::board::{Board, BoardConfig, Property, BOARD_SIZE, STANDARD_BOARD};
use super::rules::Action;

/// 玩家标识，只会是 0 或 1。
pub type PlayerId = u8;
/// 现金数额，类型上保证非负。
pub type Cash = u32;

pub const PLAYER_COUNT: usize = 2;
pub const DEFAULT_STARTING_CASH: Cash = 1500;
pub const DEFAULT_MAX_TURNS: u32 = 200;

/// 两枚骰子的点数和及其组合数（总数 36）。
pub const DICE_OUTCOMES: [(u8, u8); 11] = [
    (2, 1),
    (3, 2),
    (4, 3),
    (5, 4),
    (6, 5),
    (7, 6),
    (8, 5),
    (9, 4),
    (10, 3),
    (11, 2),
    (12, 1),
];

pub fn dice_probability(sum: u8) -> f64 {
    DICE_OUTCOMES
        .iter()
        .find(|(s, _)| *s == sum)
        .map(|(_, ways)| *ways as f64 / 36.0)
        .unwrap_or(0.0)
}

/// 两个独立的 1–6 均匀骰子之和，范围 2–12。
pub fn roll_dice<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(1..=6u8) + rng.gen_range(1..=6u8)
}

// 评估权重
const FARE_WEIGHT: f64 = 3.0;
const PROPERTY_COUNT_WEIGHT: f64 = 15.0;
const MONOPOLY_WEIGHT: f64 = 300.0;
const BUILDING_WEIGHT: f64 = 40.0;
const MISSING_ONE_BONUS: f64 = 120.0;
const MISSING_TWO_BONUS: f64 = 40.0;
pub const TERMINAL_SCORE: f64 = 1_000_000.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum VictoryReason {
    Bankruptcy { loser: PlayerId },
    TurnCap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    InvalidCurrentPlayer { player_id: PlayerId },
    PositionOutOfRange { player_id: PlayerId, position: u8 },
    BuildingsWithoutMonopoly { index: u8 },
    TooManyBuildings { index: u8, count: u8 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerStats {
    pub player: PlayerId,
    pub cash: Cash,
    pub position: u8,
    pub property_count: usize,
    pub property_value: Cash,
    pub building_count: u32,
    pub building_value: Cash,
    pub fare_income: Cash,
    pub monopoly_count: usize,
    pub total_wealth: Cash,
}

/// 供展示层使用的只读快照。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSnapshot {
    pub positions: [u8; PLAYER_COUNT],
    pub cash: [Cash; PLAYER_COUNT],
    pub current_player: PlayerId,
    pub turn: u32,
    pub max_turns: u32,
    pub game_over: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victory: Option<VictoryReason>,
    pub last_dice_roll: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chance: Option<String>,
    pub color_names: Vec<String>,
    pub chance_positions: Vec<u8>,
    pub properties: Vec<Property>,
    pub player_stats: Vec<PlayerStats>,
}

/// 游戏整体状态。棋盘布局通过 `Arc` 共享，地产表随 `clone` 深拷贝。
#[derive(Debug, Clone)]
pub struct GameState {
    board: Arc<Board>,
    pub properties: Vec<Property>,
    pub positions: [u8; PLAYER_COUNT],
    pub cash: [Cash; PLAYER_COUNT],
    pub current_player: PlayerId,
    pub turn: u32,
    pub max_turns: u32,
    pub game_over: bool,
    pub winner: Option<PlayerId>,
    pub victory: Option<VictoryReason>,
    pub last_dice_roll: u8,
    pub last_action: Option<Action>,
    pub last_chance: Option<String>,
}

impl GameState {
    pub fn new(
        board: Arc<Board>,
        properties: Vec<Property>,
        starting_cash: Cash,
        max_turns: u32,
    ) -> Self {
        Self {
            board,
            properties,
            positions: [0; PLAYER_COUNT],
            cash: [starting_cash; PLAYER_COUNT],
            current_player: 0,
            turn: 0,
            max_turns,
            game_over: false,
            winner: None,
            victory: None,
            last_dice_roll: 0,
            last_action: None,
            last_chance: None,
        }
    }

    pub fn from_config(config: &BoardConfig, starting_cash: Cash, max_turns: u32) -> Self {
        let (board, properties) = Board::generate(config);
        Self::new(Arc::new(board), properties, starting_cash, max_turns)
    }

    /// 使用标准棋盘创建新局面。
    pub fn with_cash(starting_cash: Cash, max_turns: u32) -> Self {
        let (board, properties) = &*STANDARD_BOARD;
        Self::new(
            Arc::clone(board),
            properties.clone(),
            starting_cash,
            max_turns,
        )
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn opponent(player: PlayerId) -> PlayerId {
        1 - player
    }

    pub fn roll_dice<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        roll_dice(rng)
    }

    /*********        MOVEMENT & CASH        *********/

    /// 让 `player` 前进；绕过起点时发放一次过起点奖励。返回新位置。
    pub fn move_player(&mut self, player: PlayerId, distance: u8) -> u8 {
        let idx = player as usize;
        let old = self.positions[idx];
        let new = ((old as u32 + distance as u32) % BOARD_SIZE as u32) as u8;
        self.positions[idx] = new;
        if new < old {
            let bonus = self.board.pass_start_bonus;
            self.credit(player, bonus);
        }
        new
    }

    pub fn credit(&mut self, player: PlayerId, amount: Cash) {
        let cash = &mut self.cash[player as usize];
        *cash = cash.saturating_add(amount);
    }

    /// 扣款并在 0 处截断，返回实际扣除的金额。
    pub fn debit(&mut self, player: PlayerId, amount: Cash) -> Cash {
        let cash = &mut self.cash[player as usize];
        let taken = amount.min(*cash);
        *cash -= taken;
        taken
    }

    pub fn transfer(&mut self, from: PlayerId, to: PlayerId, amount: Cash) -> Cash {
        let moved = self.debit(from, amount);
        self.credit(to, moved);
        moved
    }

    /*********        PROPERTY LOOKUP        *********/

    pub fn property_slot(&self, position: u8) -> Option<usize> {
        self.board.property_slot(position)
    }

    pub fn property_at(&self, position: u8) -> Option<&Property> {
        self.property_slot(position).map(|slot| &self.properties[slot])
    }

    pub fn is_chance_tile(&self, position: u8) -> bool {
        self.board.is_chance(position)
    }

    pub fn player_properties(&self, player: PlayerId) -> impl Iterator<Item = &Property> + '_ {
        self.properties
            .iter()
            .filter(move |property| property.is_owned_by(player))
    }

    pub fn unowned_count(&self) -> usize {
        self.properties.iter().filter(|p| p.owner.is_none()).count()
    }

    pub fn owned_in_group(&self, player: PlayerId, color: usize) -> usize {
        self.board
            .group(color)
            .map(|group| {
                group
                    .slots
                    .iter()
                    .filter(|&&slot| self.properties[slot].is_owned_by(player))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn group_size(&self, color: usize) -> usize {
        self.board.group(color).map(|g| g.size()).unwrap_or(0)
    }

    pub fn has_monopoly(&self, player: PlayerId, color: usize) -> bool {
        let size = self.group_size(color);
        size > 0 && self.owned_in_group(player, color) == size
    }

    pub fn monopoly_count(&self, player: PlayerId) -> usize {
        (0..self.board.groups().len())
            .filter(|&color| self.has_monopoly(player, color))
            .count()
    }

    /*********        FARES & PRICES        *********/

    /// 落在 `slot` 地产上应付的租金：整组垄断时翻倍，每栋建筑再加固定百分比。
    pub fn fare_for(&self, slot: usize) -> Cash {
        let property = &self.properties[slot];
        let mut fare = property.fare;
        if let Some(owner) = property.owner {
            if self.has_monopoly(owner, property.color) {
                fare *= 2;
            }
        }
        let surcharge = fare * self.board.building_fare_percent * property.buildings as u32 / 100;
        fare + surcharge
    }

    pub fn build_cost(&self, slot: usize) -> Cash {
        self.properties[slot].price * self.board.build_cost_percent / 100
    }

    pub fn building_sell_value(&self, slot: usize) -> Cash {
        self.build_cost(slot) * self.board.sell_back_percent / 100
    }

    pub fn property_sell_value(&self, slot: usize) -> Cash {
        self.properties[slot].price * self.board.sell_back_percent / 100
    }

    /// 向 `payer` 收取 `slot` 的租金，现金不足时按实有部分支付，返回实际转账金额。
    pub fn pay_fare(&mut self, payer: PlayerId, slot: usize) -> Cash {
        let owner = match self.properties[slot].owner {
            Some(owner) if owner != payer => owner,
            _ => return 0,
        };
        let fare = self.fare_for(slot);
        self.transfer(payer, owner, fare)
    }

    /*********        ELIGIBILITY & COMMANDS        *********/

    pub fn can_buy(&self, player: PlayerId, slot: usize) -> bool {
        let property = &self.properties[slot];
        property.owner.is_none() && self.cash[player as usize] >= property.price
    }

    pub fn buy_property(&mut self, player: PlayerId, slot: usize) -> bool {
        if !self.can_buy(player, slot) {
            return false;
        }
        let price = self.properties[slot].price;
        self.cash[player as usize] -= price;
        self.properties[slot].owner = Some(player);
        true
    }

    pub fn can_build(&self, player: PlayerId, slot: usize) -> bool {
        let property = &self.properties[slot];
        property.is_owned_by(player)
            && property.buildings < self.board.max_buildings
            && self.has_monopoly(player, property.color)
            && self.cash[player as usize] >= self.build_cost(slot)
    }

    pub fn build_on_property(&mut self, player: PlayerId, slot: usize) -> bool {
        if !self.can_build(player, slot) {
            return false;
        }
        let cost = self.build_cost(slot);
        self.cash[player as usize] -= cost;
        self.properties[slot].buildings += 1;
        true
    }

    pub fn can_sell_building(&self, player: PlayerId, slot: usize) -> bool {
        let property = &self.properties[slot];
        property.is_owned_by(player) && property.buildings > 0
    }

    pub fn sell_building(&mut self, player: PlayerId, slot: usize) -> Cash {
        if !self.can_sell_building(player, slot) {
            return 0;
        }
        let value = self.building_sell_value(slot);
        self.properties[slot].buildings -= 1;
        self.credit(player, value);
        value
    }

    /// 只有当本地产及同色组其他地产都没有建筑时才可出售。
    pub fn can_sell_property(&self, player: PlayerId, slot: usize) -> bool {
        let property = &self.properties[slot];
        if !property.is_owned_by(player) {
            return false;
        }
        self.board
            .group(property.color)
            .map(|group| {
                group
                    .slots
                    .iter()
                    .all(|&member| self.properties[member].buildings == 0)
            })
            .unwrap_or(property.buildings == 0)
    }

    pub fn sell_property(&mut self, player: PlayerId, slot: usize) -> Cash {
        if !self.can_sell_property(player, slot) {
            return 0;
        }
        let value = self.property_sell_value(slot);
        self.properties[slot].owner = None;
        self.credit(player, value);
        value
    }

    pub fn buildable_slots(&self, player: PlayerId) -> Vec<usize> {
        (0..self.properties.len())
            .filter(|&slot| self.can_build(player, slot))
            .collect()
    }

    /// `player` 在当前格可执行的动作。只有无主地产提供选择，其余情况只有 `Skip`。
    pub fn legal_actions(&self, player: PlayerId) -> Vec<Action> {
        let position = self.positions[player as usize];
        let slot = match self.property_slot(position) {
            Some(slot) if self.properties[slot].owner.is_none() => slot,
            _ => return vec![Action::Skip],
        };

        let mut actions = Vec::new();
        if self.can_buy(player, slot) {
            actions.push(Action::Buy);
        }
        actions.push(Action::Skip);
        for build_slot in self.buildable_slots(player) {
            actions.push(Action::Build {
                property: self.properties[build_slot].index,
            });
        }
        actions
    }

    /// 在当前位置为 `player` 执行 `action`，返回状态是否发生变化。
    pub fn apply_action(&mut self, player: PlayerId, action: &Action) -> bool {
        match action {
            Action::Skip => false,
            Action::Buy => match self.property_slot(self.positions[player as usize]) {
                Some(slot) => self.buy_property(player, slot),
                None => false,
            },
            Action::Build { property } => match self.property_slot(*property) {
                Some(slot) => self.build_on_property(player, slot),
                None => false,
            },
        }
    }

    /*********        AGGREGATES        *********/

    pub fn property_value(&self, player: PlayerId) -> Cash {
        self.player_properties(player).map(|p| p.price).sum()
    }

    pub fn building_count(&self, player: PlayerId) -> u32 {
        self.player_properties(player)
            .map(|p| p.buildings as u32)
            .sum()
    }

    pub fn building_value(&self, player: PlayerId) -> Cash {
        (0..self.properties.len())
            .filter(|&slot| self.properties[slot].is_owned_by(player))
            .map(|slot| self.build_cost(slot) * self.properties[slot].buildings as u32)
            .sum()
    }

    pub fn fare_income(&self, player: PlayerId) -> Cash {
        (0..self.properties.len())
            .filter(|&slot| self.properties[slot].is_owned_by(player))
            .map(|slot| self.fare_for(slot))
            .sum()
    }

    pub fn total_wealth(&self, player: PlayerId) -> Cash {
        self.cash[player as usize] + self.property_value(player) + self.building_value(player)
    }

    fn near_monopoly_bonus(&self, player: PlayerId) -> f64 {
        let opponent = Self::opponent(player);
        let mut bonus = 0.0;
        for group in self.board.groups() {
            if self.owned_in_group(opponent, group.id) > 0 {
                continue;
            }
            let mine = self.owned_in_group(player, group.id);
            match group.size().saturating_sub(mine) {
                1 => bonus += MISSING_ONE_BONUS,
                2 if mine > 0 => bonus += MISSING_TWO_BONUS,
                _ => {}
            }
        }
        bonus
    }

    /// 从 `player` 视角看的局面启发式估值。
    pub fn evaluate(&self, player: PlayerId) -> f64 {
        if self.game_over {
            if let Some(winner) = self.winner {
                return if winner == player {
                    TERMINAL_SCORE
                } else {
                    -TERMINAL_SCORE
                };
            }
        }

        let opponent = Self::opponent(player);
        let wealth = self.total_wealth(player) as f64 - self.total_wealth(opponent) as f64;
        let fare = self.fare_income(player) as f64 - self.fare_income(opponent) as f64;
        let count = self.player_properties(player).count() as f64
            - self.player_properties(opponent).count() as f64;
        let monopolies = self.monopoly_count(player) as f64 - self.monopoly_count(opponent) as f64;
        let buildings = self.building_count(player) as f64 - self.building_count(opponent) as f64;
        let near = self.near_monopoly_bonus(player) - self.near_monopoly_bonus(opponent);

        wealth
            + FARE_WEIGHT * fare
            + PROPERTY_COUNT_WEIGHT * count
            + MONOPOLY_WEIGHT * monopolies
            + BUILDING_WEIGHT * buildings
            + near
    }

    /*********        TURN FLOW        *********/

    pub fn end_turn(&mut self) -> bool {
        self.current_player = Self::opponent(self.current_player);
        self.turn += 1;
        self.check_game_over()
    }

    fn wealth_leader(&self) -> PlayerId {
        if self.total_wealth(0) >= self.total_wealth(1) {
            0
        } else {
            1
        }
    }

    fn finish(&mut self, winner: PlayerId, reason: VictoryReason) {
        self.game_over = true;
        self.winner = Some(winner);
        self.victory = Some(reason);
    }

    /// 有玩家现金耗尽或达到回合上限时即为终局。
    pub fn check_game_over(&mut self) -> bool {
        if self.game_over {
            return true;
        }
        match (self.cash[0] == 0, self.cash[1] == 0) {
            (true, false) => self.finish(1, VictoryReason::Bankruptcy { loser: 0 }),
            (false, true) => self.finish(0, VictoryReason::Bankruptcy { loser: 1 }),
            (true, true) => {
                let winner = self.wealth_leader();
                let loser = Self::opponent(winner);
                self.finish(winner, VictoryReason::Bankruptcy { loser });
            }
            (false, false) if self.turn >= self.max_turns => {
                let winner = self.wealth_leader();
                self.finish(winner, VictoryReason::TurnCap);
            }
            _ => {}
        }
        self.game_over
    }

    /*********        INTROSPECTION        *********/

    pub fn player_stats(&self, player: PlayerId) -> PlayerStats {
        PlayerStats {
            player,
            cash: self.cash[player as usize],
            position: self.positions[player as usize],
            property_count: self.player_properties(player).count(),
            property_value: self.property_value(player),
            building_count: self.building_count(player),
            building_value: self.building_value(player),
            fare_income: self.fare_income(player),
            monopoly_count: self.monopoly_count(player),
            total_wealth: self.total_wealth(player),
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            positions: self.positions,
            cash: self.cash,
            current_player: self.current_player,
            turn: self.turn,
            max_turns: self.max_turns,
            game_over: self.game_over,
            winner: self.winner,
            victory: self.victory.clone(),
            last_dice_roll: self.last_dice_roll,
            last_action: self.last_action.clone(),
            last_chance: self.last_chance.clone(),
            color_names: self.board.groups().iter().map(|g| g.name.clone()).collect(),
            chance_positions: (0..BOARD_SIZE)
                .filter(|&p| self.board.is_chance(p))
                .collect(),
            properties: self.properties.clone(),
            player_stats: (0..PLAYER_COUNT as PlayerId)
                .map(|p| self.player_stats(p))
                .collect(),
        }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if self.current_player as usize >= PLAYER_COUNT {
            return Err(IntegrityError::InvalidCurrentPlayer {
                player_id: self.current_player,
            });
        }
        for (player_id, &position) in self.positions.iter().enumerate() {
            if position >= BOARD_SIZE {
                return Err(IntegrityError::PositionOutOfRange {
                    player_id: player_id as PlayerId,
                    position,
                });
            }
        }
        for property in &self.properties {
            if property.buildings == 0 {
                continue;
            }
            if property.buildings > self.board.max_buildings {
                return Err(IntegrityError::TooManyBuildings {
                    index: property.index,
                    count: property.buildings,
                });
            }
            let monopoly = property
                .owner
                .map(|owner| self.has_monopoly(owner, property.color))
                .unwrap_or(false);
            if !monopoly {
                return Err(IntegrityError::BuildingsWithoutMonopoly {
                    index: property.index,
                });
            }
        }
        Ok(())
    }

    /// 测试与调试用：把一个颜色组整体交给 `player`。
    pub fn grant_group(&mut self, player: PlayerId, color: usize) {
        let slots = self
            .board
            .group(color)
            .map(|g| g.slots.clone())
            .unwrap_or_default();
        for slot in slots {
            self.properties[slot].owner = Some(player);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn fresh() -> GameState {
        GameState::with_cash(DEFAULT_STARTING_CASH, DEFAULT_MAX_TURNS)
    }

    fn slot_of(state: &GameState, position: u8) -> usize {
        state.property_slot(position).expect("property tile")
    }

    #[test]
    fn dice_stay_in_range_and_follow_triangle() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut counts = [0u32; 13];
        let draws = 72_000;
        for _ in 0..draws {
            let roll = roll_dice(&mut rng);
            assert!((2..=12).contains(&roll), "roll {roll} out of range");
            counts[roll as usize] += 1;
        }
        for (sum, _) in DICE_OUTCOMES {
            let observed = counts[sum as usize] as f64 / draws as f64;
            let expected = dice_probability(sum);
            assert!(
                (observed - expected).abs() < 0.01,
                "sum {sum}: observed {observed:.4}, expected {expected:.4}"
            );
        }
        let total: f64 = DICE_OUTCOMES.iter().map(|(s, _)| dice_probability(*s)).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn wrapping_credits_bonus_once() {
        let mut state = fresh();
        state.positions[0] = 35;
        let pos = state.move_player(0, 8);
        assert_eq!(pos, 3);
        assert_eq!(state.cash[0], 1700);

        state.positions[1] = 30;
        state.move_player(1, 9);
        assert_eq!(state.positions[1], 39);
        assert_eq!(state.cash[1], 1500, "no bonus without wrapping");
    }

    #[test]
    fn full_lap_moves_are_periodic() {
        let mut state = fresh();
        state.positions[0] = 12;
        state.move_player(0, 40);
        assert_eq!(state.positions[0], 12, "a full lap returns to the same tile");
        // 整圈移动没有出现“新位置小于旧位置”，不发放奖励
        assert_eq!(state.cash[0], 1500);
    }

    #[test]
    fn landing_exactly_on_start_after_wrap_pays_once() {
        let mut state = fresh();
        state.positions[0] = 33;
        state.move_player(0, 7);
        assert_eq!(state.positions[0], 0);
        assert_eq!(state.cash[0], 1700);
    }

    #[test]
    fn buying_tile_five_after_rolling_five() {
        let mut state = fresh();
        let pos = state.move_player(0, 5);
        assert_eq!(pos, 5);
        assert_eq!(state.legal_actions(0), vec![Action::Buy, Action::Skip]);
        assert!(state.apply_action(0, &Action::Buy));
        assert_eq!(state.cash, [1420, 1500]);
        assert_eq!(state.property_at(5).and_then(|p| p.owner), Some(0));
    }

    #[test]
    fn monopoly_doubles_fare_and_buildings_add_surcharge() {
        let mut state = fresh();
        let pink = state.properties[slot_of(&state, 10)].color;
        state.grant_group(0, pink);
        // 粉色组：地价 100/110/120/130，基础租金 50/55/60/65
        let slot = slot_of(&state, 10);
        assert_eq!(state.properties[slot].fare, 50);
        assert_eq!(state.fare_for(slot), 100);

        assert!(state.build_on_property(0, slot));
        assert!(state.build_on_property(0, slot));
        assert_eq!(state.fare_for(slot), 100 + 40);
    }

    #[test]
    fn fare_is_capped_by_tenant_cash() {
        let mut state = fresh();
        let pink = state.properties[slot_of(&state, 10)].color;
        state.grant_group(0, pink);
        let slot = slot_of(&state, 10);

        state.cash = [1500, 60];
        let paid = state.pay_fare(1, slot);
        assert_eq!(paid, 60);
        assert_eq!(state.cash, [1560, 0]);
        assert!(state.check_game_over());
        assert_eq!(state.winner, Some(0));
    }

    #[test]
    fn owner_never_pays_own_fare() {
        let mut state = fresh();
        let slot = slot_of(&state, 1);
        state.properties[slot].owner = Some(0);
        assert_eq!(state.pay_fare(0, slot), 0);
        assert_eq!(state.cash[0], 1500);
    }

    #[test]
    fn build_requires_monopoly_and_cash() {
        let mut state = fresh();
        let slot = slot_of(&state, 1);
        state.properties[slot].owner = Some(0);
        assert!(!state.can_build(0, slot), "no monopoly yet");
        assert!(!state.build_on_property(0, slot));

        let brown = state.properties[slot].color;
        state.grant_group(0, brown);
        state.cash[0] = state.build_cost(slot) - 1;
        assert!(!state.build_on_property(0, slot), "cannot afford");

        state.cash[0] = 10_000;
        for _ in 0..4 {
            assert!(state.build_on_property(0, slot));
        }
        assert!(!state.build_on_property(0, slot), "capped at four");
        assert_eq!(state.properties[slot].buildings, 4);
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn build_cost_rounds_down() {
        let state = fresh();
        // 价格 70 -> 建造费 77 -> 回收 73
        let slot = slot_of(&state, 2);
        assert_eq!(state.properties[slot].price, 70);
        assert_eq!(state.build_cost(slot), 77);
        assert_eq!(state.building_sell_value(slot), 73);
    }

    #[test]
    fn selling_new_building_is_never_profitable() {
        let mut state = fresh();
        state.cash[0] = 100_000;
        for color in 0..state.board().groups().len() {
            state.grant_group(0, color);
        }
        for slot in 0..state.properties.len() {
            let before = state.cash[0];
            assert!(state.build_on_property(0, slot));
            let refund = state.sell_building(0, slot);
            assert!(refund > 0);
            assert!(state.cash[0] < before, "slot {slot} made a profit");
        }
    }

    #[test]
    fn property_sale_requires_bare_group() {
        let mut state = fresh();
        let slot = slot_of(&state, 1);
        let other = slot_of(&state, 2);
        let brown = state.properties[slot].color;
        state.grant_group(0, brown);
        assert!(state.build_on_property(0, other));

        assert!(!state.can_sell_property(0, slot));
        assert_eq!(state.sell_property(0, slot), 0);

        assert!(state.sell_building(0, other) > 0);
        let before = state.cash[0];
        assert_eq!(state.sell_property(0, slot), 57);
        assert_eq!(state.cash[0], before + 57);
        assert_eq!(state.properties[slot].owner, None);
    }

    #[test]
    fn ineligible_commands_are_noops() {
        let mut state = fresh();
        let slot = slot_of(&state, 1);
        assert_eq!(state.sell_building(0, slot), 0);
        assert_eq!(state.sell_property(0, slot), 0);
        state.cash[1] = 10;
        assert!(!state.buy_property(1, slot));
        assert_eq!(state.cash[1], 10);
        assert!(!state.apply_action(0, &Action::Build { property: 0 }));
    }

    #[test]
    fn game_over_conditions() {
        let mut state = fresh();
        assert!(!state.check_game_over());

        state.turn = state.max_turns;
        assert!(state.check_game_over());
        assert_eq!(state.winner, Some(0), "equal wealth favours player 0");
        assert_eq!(state.victory, Some(VictoryReason::TurnCap));

        let mut state = fresh();
        state.turn = state.max_turns - 1;
        state.cash = [1000, 1200];
        assert!(!state.check_game_over());
        assert!(state.end_turn());
        assert_eq!(state.winner, Some(1));

        let mut state = fresh();
        state.cash[0] = 0;
        assert!(state.check_game_over());
        assert_eq!(state.winner, Some(1));
    }

    #[test]
    fn turn_cap_counts_property_and_buildings() {
        let mut state = fresh();
        let slot = slot_of(&state, 38);
        state.properties[slot].owner = Some(1);
        state.cash = [1500, 1500 - state.properties[slot].price];
        state.turn = state.max_turns;
        state.check_game_over();
        assert_eq!(state.winner, Some(0), "equal wealth still favours player 0");

        let mut state = fresh();
        state.properties[slot].owner = Some(1);
        state.turn = state.max_turns;
        state.check_game_over();
        assert_eq!(state.winner, Some(1));
    }

    #[test]
    fn clones_do_not_alias() {
        let mut state = fresh();
        let mut copy = state.clone();
        let slot = slot_of(&state, 5);
        assert!(copy.buy_property(1, slot));
        copy.move_player(0, 7);
        assert_eq!(state.properties[slot].owner, None);
        assert_eq!(state.positions[0], 0);
        state.cash[0] = 3;
        assert_eq!(copy.cash[0], 1500);
    }

    #[test]
    fn evaluation_rewards_monopolies() {
        let mut state = fresh();
        assert_eq!(state.evaluate(0), 0.0);
        state.grant_group(0, 0);
        let mine = state.evaluate(0);
        assert!(mine > 0.0);
        assert_eq!(state.evaluate(1), -mine, "evaluation is zero-sum");
    }

    #[test]
    fn evaluation_of_finished_game_is_decisive() {
        let mut state = fresh();
        state.cash[1] = 0;
        state.check_game_over();
        assert_eq!(state.evaluate(0), TERMINAL_SCORE);
        assert_eq!(state.evaluate(1), -TERMINAL_SCORE);
    }

    #[test]
    fn near_monopoly_bonus_counts_missing_one() {
        let mut state = fresh();
        let group = state.board().groups()[1].slots.clone();
        for &slot in &group[..3] {
            state.properties[slot].owner = Some(0);
        }
        let with_three = state.evaluate(0);
        state.properties[group[3]].owner = Some(1);
        let blocked = state.evaluate(0);
        assert!(with_three > blocked);
    }

    #[test]
    fn legal_actions_offer_builds_with_monopoly() {
        let mut state = fresh();
        state.grant_group(0, 0);
        state.positions[0] = 10;
        let actions = state.legal_actions(0);
        assert_eq!(actions[0], Action::Buy);
        assert!(actions.contains(&Action::Skip));
        assert_eq!(
            actions
                .iter()
                .filter(|a| matches!(a, Action::Build { .. }))
                .count(),
            4
        );

        state.positions[0] = 9;
        assert_eq!(state.legal_actions(0), vec![Action::Skip]);
    }

    #[test]
    fn snapshot_reports_player_stats() {
        let mut state = fresh();
        state.grant_group(1, 8);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.player_stats.len(), 2);
        assert_eq!(snapshot.player_stats[1].property_count, 3);
        assert_eq!(snapshot.player_stats[1].monopoly_count, 1);
        assert_eq!(snapshot.chance_positions, vec![9, 19, 29, 39]);
        let json = serde_json::to_string(&snapshot).expect("serializable");
        assert!(json.contains("\"player_stats\""));
    }
}
