use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::effects::{ChanceEffect, STANDARD_CHANCE_EFFECTS};
use super::state::{Cash, PlayerId};

/// 棋盘格子总数，位置取值范围为 `0..BOARD_SIZE`。
pub const BOARD_SIZE: u8 = 40;
/// 起点格的位置。
pub const START_TILE: u8 = 0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum ConfigError {
    #[error("chance tile {position} is outside the board")]
    ChancePositionOutOfRange { position: u8 },
    #[error("chance tile cannot be placed on the start tile")]
    ChanceOnStart,
    #[error("duplicate chance tile {position}")]
    DuplicateChancePosition { position: u8 },
    #[error("{colors} color groups of size {group_size} cannot hold {slots} properties")]
    NotEnoughColors {
        colors: usize,
        group_size: u8,
        slots: usize,
    },
    #[error("group size must be at least 1")]
    EmptyGroups,
    #[error("turn cap must be greater than zero")]
    ZeroTurnCap,
    #[error("starting cash must be greater than zero")]
    ZeroStartingCash,
    #[error("unknown agent type `{name}`")]
    UnknownAgent { name: String },
    #[error("invalid agent setting: {reason}")]
    InvalidAgent { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColorSpec {
    pub name: String,
    pub base_price: Cash,
    pub base_fare: Cash,
}

impl ColorSpec {
    pub fn new(name: &str, base_price: Cash, base_fare: Cash) -> Self {
        Self {
            name: name.to_owned(),
            base_price,
            base_fare,
        }
    }
}

/// 可由外部提供的棋盘配置：颜色组、价格表、机会格位置及效果目录。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoardConfig {
    pub colors: Vec<ColorSpec>,
    pub group_size: u8,
    pub price_step: Cash,
    pub fare_step: Cash,
    pub chance_positions: Vec<u8>,
    pub chance_effects: Vec<ChanceEffect>,
    pub pass_start_bonus: Cash,
    pub building_fare_percent: u32,
    pub build_cost_percent: u32,
    pub sell_back_percent: u32,
    pub max_buildings: u8,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            colors: vec![
                ColorSpec::new("Brown", 60, 30),
                ColorSpec::new("Light Blue", 80, 40),
                ColorSpec::new("Pink", 100, 50),
                ColorSpec::new("Orange", 120, 60),
                ColorSpec::new("Red", 150, 75),
                ColorSpec::new("Yellow", 180, 90),
                ColorSpec::new("Green", 220, 110),
                ColorSpec::new("Dark Blue", 280, 140),
                ColorSpec::new("Purple", 320, 160),
            ],
            group_size: 4,
            price_step: 10,
            fare_step: 5,
            chance_positions: vec![9, 19, 29, 39],
            chance_effects: STANDARD_CHANCE_EFFECTS.clone(),
            pass_start_bonus: 200,
            building_fare_percent: 20,
            build_cost_percent: 110,
            sell_back_percent: 95,
            max_buildings: 4,
        }
    }
}

impl BoardConfig {
    pub fn property_slots(&self) -> usize {
        BOARD_SIZE as usize - 1 - self.chance_positions.len()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_size == 0 {
            return Err(ConfigError::EmptyGroups);
        }
        let mut seen = Vec::with_capacity(self.chance_positions.len());
        for &position in &self.chance_positions {
            if position >= BOARD_SIZE {
                return Err(ConfigError::ChancePositionOutOfRange { position });
            }
            if position == START_TILE {
                return Err(ConfigError::ChanceOnStart);
            }
            if seen.contains(&position) {
                return Err(ConfigError::DuplicateChancePosition { position });
            }
            seen.push(position);
        }
        let slots = self.property_slots();
        if self.colors.len() * (self.group_size as usize) < slots {
            return Err(ConfigError::NotEnoughColors {
                colors: self.colors.len(),
                group_size: self.group_size,
                slots,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tile {
    Start,
    Chance,
    Property { slot: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColorGroup {
    pub id: usize,
    pub name: String,
    /// 组内地产在 `GameState::properties` 中的下标。
    pub slots: Vec<usize>,
}

impl ColorGroup {
    pub fn size(&self) -> usize {
        self.slots.len()
    }
}

/// 地产：静态属性与可变的所有权/建筑字段放在一起，随状态深拷贝。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Property {
    pub index: u8,
    pub name: String,
    pub color: usize,
    pub price: Cash,
    pub fare: Cash,
    pub owner: Option<PlayerId>,
    pub buildings: u8,
}

impl Property {
    pub fn is_owned_by(&self, player: PlayerId) -> bool {
        self.owner == Some(player)
    }
}

/// 游戏过程中不变的棋盘布局与规则参数，在克隆之间共享。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    tiles: Vec<Tile>,
    groups: Vec<ColorGroup>,
    chance_effects: Vec<ChanceEffect>,
    pub pass_start_bonus: Cash,
    pub building_fare_percent: u32,
    pub build_cost_percent: u32,
    pub sell_back_percent: u32,
    pub max_buildings: u8,
}

impl Board {
    /// 排布 40 个格子，返回棋盘与全新的无主地产表。假定 `config` 已通过 `validate`。
    pub fn generate(config: &BoardConfig) -> (Board, Vec<Property>) {
        let mut tiles = Vec::with_capacity(BOARD_SIZE as usize);
        let mut properties = Vec::with_capacity(config.property_slots());
        let mut groups: Vec<ColorGroup> = Vec::new();
        let group_size = config.group_size.max(1) as usize;

        for index in 0..BOARD_SIZE {
            if index == START_TILE {
                tiles.push(Tile::Start);
                continue;
            }
            if config.chance_positions.contains(&index) {
                tiles.push(Tile::Chance);
                continue;
            }

            let slot = properties.len();
            let color = (slot / group_size).min(config.colors.len().saturating_sub(1));
            let position_in_group = (slot % group_size) as Cash;
            let spec = config
                .colors
                .get(color)
                .cloned()
                .unwrap_or_else(|| ColorSpec::new("Gray", 100, 50));

            if groups.len() <= color {
                groups.push(ColorGroup {
                    id: color,
                    name: spec.name.clone(),
                    slots: Vec::new(),
                });
            }
            groups[color].slots.push(slot);

            properties.push(Property {
                index,
                name: format!("{} Property {}", spec.name, position_in_group + 1),
                color,
                price: spec.base_price + position_in_group * config.price_step,
                fare: spec.base_fare + position_in_group * config.fare_step,
                owner: None,
                buildings: 0,
            });
            tiles.push(Tile::Property { slot });
        }

        let board = Board {
            tiles,
            groups,
            chance_effects: config.chance_effects.clone(),
            pass_start_bonus: config.pass_start_bonus,
            building_fare_percent: config.building_fare_percent,
            build_cost_percent: config.build_cost_percent,
            sell_back_percent: config.sell_back_percent,
            max_buildings: config.max_buildings,
        };
        (board, properties)
    }

    pub fn tile(&self, position: u8) -> Tile {
        self.tiles
            .get(position as usize)
            .copied()
            .unwrap_or(Tile::Start)
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn is_chance(&self, position: u8) -> bool {
        matches!(self.tile(position), Tile::Chance)
    }

    pub fn property_slot(&self, position: u8) -> Option<usize> {
        match self.tile(position) {
            Tile::Property { slot } => Some(slot),
            _ => None,
        }
    }

    pub fn groups(&self) -> &[ColorGroup] {
        &self.groups
    }

    pub fn group(&self, color: usize) -> Option<&ColorGroup> {
        self.groups.get(color)
    }

    pub fn chance_effects(&self) -> &[ChanceEffect] {
        &self.chance_effects
    }
}

pub static STANDARD_CONFIG: Lazy<BoardConfig> = Lazy::new(BoardConfig::default);

pub static STANDARD_BOARD: Lazy<(Arc<Board>, Vec<Property>)> = Lazy::new(|| {
    let (board, properties) = Board::generate(&STANDARD_CONFIG);
    (Arc::new(board), properties)
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_layout_has_expected_tiles() {
        let (board, properties) = &*STANDARD_BOARD;
        assert_eq!(board.tiles().len(), 40);
        assert_eq!(properties.len(), 35);
        assert_eq!(board.tile(0), Tile::Start);
        for position in [9u8, 19, 29, 39] {
            assert!(board.is_chance(position), "tile {position} should be chance");
        }
        assert_eq!(board.groups().len(), 9);
        let sizes: Vec<usize> = board.groups().iter().map(ColorGroup::size).collect();
        assert_eq!(sizes, vec![4, 4, 4, 4, 4, 4, 4, 4, 3]);
    }

    #[test]
    fn tile_five_is_first_light_blue() {
        let (board, properties) = &*STANDARD_BOARD;
        let slot = board.property_slot(5).expect("tile 5 is a property");
        let property = &properties[slot];
        assert_eq!(property.index, 5);
        assert_eq!(property.price, 80);
        assert_eq!(property.fare, 40);
        assert_eq!(board.groups()[property.color].name, "Light Blue");
    }

    #[test]
    fn prices_scale_inside_group() {
        let (board, properties) = &*STANDARD_BOARD;
        let brown = &board.groups()[0];
        let prices: Vec<Cash> = brown.slots.iter().map(|&s| properties[s].price).collect();
        let fares: Vec<Cash> = brown.slots.iter().map(|&s| properties[s].fare).collect();
        assert_eq!(prices, vec![60, 70, 80, 90]);
        assert_eq!(fares, vec![30, 35, 40, 45]);
    }

    #[test]
    fn validation_rejects_bad_layouts() {
        let mut config = BoardConfig::default();
        config.chance_positions = vec![9, 40];
        assert_eq!(
            config.validate(),
            Err(ConfigError::ChancePositionOutOfRange { position: 40 })
        );

        let mut config = BoardConfig::default();
        config.colors.truncate(3);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotEnoughColors { .. })
        ));

        assert!(BoardConfig::default().validate().is_ok());
    }
}
