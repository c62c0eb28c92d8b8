use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::{Cash, GameState, PlayerId};

/// 机会格效果类型。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChanceKind {
    /// 与银行之间的现金变动，扣减时在 0 处截断。
    CashChange,
    /// 与对手之间的转账，金额不超过付款方现有现金。
    OpponentTransfer,
}

/// 机会格抽到的单个效果。`amount` 为正表示当前玩家获得现金。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChanceEffect {
    pub name: String,
    pub description: String,
    pub kind: ChanceKind,
    pub amount: i32,
}

/// 效果结算后的实际现金流（从触发者角度）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChanceResolution {
    pub gained: Cash,
    pub lost: Cash,
}

impl ChanceResolution {
    pub fn net(&self) -> i64 {
        self.gained as i64 - self.lost as i64
    }
}

impl ChanceEffect {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        kind: ChanceKind,
        amount: i32,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            amount,
        }
    }

    pub fn cash_change(name: &str, description: &str, amount: i32) -> Self {
        Self::new(name, description, ChanceKind::CashChange, amount)
    }

    pub fn opponent_transfer(name: &str, description: &str, amount: i32) -> Self {
        Self::new(name, description, ChanceKind::OpponentTransfer, amount)
    }

    pub fn label(&self) -> String {
        format!("{}: {}", self.name, self.description)
    }

    pub fn apply(&self, state: &mut GameState, player: PlayerId) -> ChanceResolution {
        let magnitude = self.amount.unsigned_abs();
        match self.kind {
            ChanceKind::CashChange if self.amount >= 0 => {
                state.credit(player, magnitude);
                ChanceResolution {
                    gained: magnitude,
                    lost: 0,
                }
            }
            ChanceKind::CashChange => ChanceResolution {
                gained: 0,
                lost: state.debit(player, magnitude),
            },
            ChanceKind::OpponentTransfer => {
                let opponent = GameState::opponent(player);
                if self.amount >= 0 {
                    let moved = state.transfer(opponent, player, magnitude);
                    ChanceResolution {
                        gained: moved,
                        lost: 0,
                    }
                } else {
                    let moved = state.transfer(player, opponent, magnitude);
                    ChanceResolution {
                        gained: 0,
                        lost: moved,
                    }
                }
            }
        }
    }
}

/// 均匀地从目录中抽取一个效果。目录为空时返回 `None`。
pub fn draw_effect<'a, R: Rng + ?Sized>(
    catalog: &'a [ChanceEffect],
    rng: &mut R,
) -> Option<&'a ChanceEffect> {
    if catalog.is_empty() {
        return None;
    }
    Some(&catalog[rng.gen_range(0..catalog.len())])
}

pub static STANDARD_CHANCE_EFFECTS: Lazy<Vec<ChanceEffect>> = Lazy::new(|| {
    vec![
        ChanceEffect::cash_change("Jackpot!", "Win $300", 300),
        ChanceEffect::cash_change("Lucky Day", "Win $200", 200),
        ChanceEffect::cash_change("Small Win", "Win $100", 100),
        ChanceEffect::cash_change("Tax Refund", "Win $150", 150),
        ChanceEffect::cash_change("Bad Luck", "Lose $100", -100),
        ChanceEffect::cash_change("Unlucky", "Lose $150", -150),
        ChanceEffect::cash_change("Disaster", "Lose $200", -200),
        ChanceEffect::opponent_transfer("Pay Opponent", "Pay opponent $100", -100),
        ChanceEffect::opponent_transfer(
            "Receive from Opponent",
            "Receive $100 from opponent",
            100,
        ),
        ChanceEffect::cash_change("Nothing", "Nothing happens", 0),
    ]
});
