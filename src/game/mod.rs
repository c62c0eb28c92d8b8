//! 游戏核心逻辑：棋盘、状态、机会格效果与回合结算。

pub mod board;
pub mod effects;
pub mod rules;
pub mod state;

pub use board::{
    Board, BoardConfig, ColorGroup, ColorSpec, ConfigError, Property, Tile, BOARD_SIZE,
    STANDARD_BOARD, STANDARD_CONFIG, START_TILE,
};
pub use effects::{draw_effect, ChanceEffect, ChanceKind, ChanceResolution, STANDARD_CHANCE_EFFECTS};
pub use rules::{Action, Landing, TurnOptions, TurnRecord, TurnResolver};
pub use state::{
    dice_probability, roll_dice, Cash, GameSnapshot, GameState, IntegrityError, PlayerId,
    PlayerStats, VictoryReason, DEFAULT_MAX_TURNS, DEFAULT_STARTING_CASH, DICE_OUTCOMES,
    PLAYER_COUNT, TERMINAL_SCORE,
};
