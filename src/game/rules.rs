use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::effects::draw_effect;
use super::state::{Cash, GameState, PlayerId, PLAYER_COUNT};
use crate::ai::{Agent, SellKind, SellOrder};

/// 落在无主地产时可做的决定。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Skip,
    Buy,
    /// 在自己已垄断的颜色组中的 `property`（棋盘下标）上加盖一栋建筑。
    Build { property: u8 },
}

impl Default for Action {
    fn default() -> Self {
        Action::Skip
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Skip => write!(f, "SKIP"),
            Action::Buy => write!(f, "BUY"),
            Action::Build { property } => write!(f, "BUILD_{property}"),
        }
    }
}

/// 本回合落点的结算结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Landing {
    Start,
    Chance {
        effect: String,
        net: i64,
    },
    Fare {
        index: u8,
        owner: PlayerId,
        owed: Cash,
        paid: Cash,
    },
    OwnProperty {
        index: u8,
    },
    Unowned {
        index: u8,
    },
}

impl Landing {
    pub fn needs_decision(&self) -> bool {
        matches!(self, Landing::Unowned { .. })
    }
}

/// 回合日志中的一条记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: u32,
    pub player: PlayerId,
    pub agent: String,
    pub dice_roll: u8,
    pub old_position: u8,
    pub new_position: u8,
    pub passed_start: bool,
    pub landed_on: String,
    pub landing: Landing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    pub action_applied: bool,
    pub fare_paid: Cash,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub liquidation: Vec<SellOrder>,
    pub cash_before: [Cash; PLAYER_COUNT],
    pub cash_after: [Cash; PLAYER_COUNT],
    pub game_over: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TurnOptions {
    /// 付不起租金时先让代理人变卖资产。
    pub forced_liquidation: bool,
}

pub struct TurnResolver;

impl TurnResolver {
    pub fn roll_and_move<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) -> (u8, u8, u8) {
        let player = state.current_player;
        let roll = state.roll_dice(rng);
        let from = state.positions[player as usize];
        let to = state.move_player(player, roll);
        state.last_dice_roll = roll;
        (roll, from, to)
    }

    /// 结算落点自身的效果（机会格、租金）。无主地产原样返回，由调用方决定。
    pub fn resolve_landing<R: Rng + ?Sized>(
        state: &mut GameState,
        player: PlayerId,
        rng: &mut R,
    ) -> Landing {
        let position = state.positions[player as usize];
        if state.is_chance_tile(position) {
            let effect = draw_effect(state.board().chance_effects(), rng).cloned();
            return match effect {
                Some(effect) => {
                    let res = effect.apply(state, player);
                    state.last_chance = Some(effect.label());
                    Landing::Chance {
                        effect: effect.name,
                        net: res.net(),
                    }
                }
                None => Landing::Chance {
                    effect: String::new(),
                    net: 0,
                },
            };
        }

        let slot = match state.property_slot(position) {
            Some(slot) => slot,
            None => return Landing::Start,
        };
        let index = state.properties[slot].index;
        match state.properties[slot].owner {
            None => Landing::Unowned { index },
            Some(owner) if owner == player => Landing::OwnProperty { index },
            Some(owner) => {
                let owed = state.fare_for(slot);
                let paid = state.pay_fare(player, slot);
                Landing::Fare {
                    index,
                    owner,
                    owed,
                    paid,
                }
            }
        }
    }

    pub fn execute_sales(state: &mut GameState, player: PlayerId, orders: &[SellOrder]) -> Vec<SellOrder> {
        let mut executed = Vec::with_capacity(orders.len());
        for order in orders {
            let slot = match state.property_slot(order.property_index) {
                Some(slot) => slot,
                None => continue,
            };
            let value = match order.kind {
                SellKind::SellBuilding => state.sell_building(player, slot),
                SellKind::SellProperty => state.sell_property(player, slot),
            };
            if value > 0 {
                executed.push(SellOrder { value, ..order.clone() });
            }
        }
        executed
    }

    /// 由 `agent` 决策，替 `state.current_player` 走完一个回合：
    /// 掷骰移动、结算落点、执行所选动作、交出回合并检查终局。
    pub fn play_turn<R: Rng + ?Sized>(
        state: &mut GameState,
        agent: &mut dyn Agent,
        options: TurnOptions,
        rng: &mut R,
    ) -> TurnRecord {
        let player = state.current_player;
        let turn = state.turn;
        let cash_before = state.cash;
        state.last_chance = None;

        let (roll, from, to) = Self::roll_and_move(state, rng);

        let mut liquidation = Vec::new();
        if options.forced_liquidation {
            if let Some(slot) = state.property_slot(to) {
                let owner = state.properties[slot].owner;
                let owed = state.fare_for(slot);
                if owner.is_some() && owner != Some(player) && owed > state.cash[player as usize] {
                    let orders = agent.choose_assets_to_sell(state, owed);
                    liquidation = Self::execute_sales(state, player, &orders);
                }
            }
        }

        let landing = Self::resolve_landing(state, player, rng);
        let landed_on = Self::describe(state, to, &landing);

        let mut action = None;
        let mut action_applied = false;
        if landing.needs_decision() {
            let chosen = agent.choose_action(state);
            action_applied = state.apply_action(player, &chosen);
            state.last_action = Some(chosen.clone());
            action = Some(chosen);
        }

        let fare_paid = match landing {
            Landing::Fare { paid, .. } => paid,
            _ => 0,
        };

        let game_over = state.end_turn();
        debug!(
            turn,
            player,
            roll,
            position = to,
            action = action.as_ref().map(|a| a.to_string()).unwrap_or_default(),
            "turn resolved"
        );

        TurnRecord {
            turn,
            player,
            agent: agent.name(),
            dice_roll: roll,
            old_position: from,
            new_position: to,
            passed_start: to < from,
            landed_on,
            landing,
            action,
            action_applied,
            fare_paid,
            liquidation,
            cash_before,
            cash_after: state.cash,
            game_over,
        }
    }

    fn describe(state: &GameState, position: u8, landing: &Landing) -> String {
        let name = state
            .property_at(position)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        match landing {
            Landing::Start => "Start".to_owned(),
            Landing::Chance { .. } => "Chance Tile".to_owned(),
            Landing::OwnProperty { .. } => format!("{name} (owned)"),
            Landing::Fare { .. } | Landing::Unowned { .. } => name,
        }
    }
}
