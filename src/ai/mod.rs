//! 决策代理：极小极大/期望极小极大搜索与蒙特卡洛树搜索。

pub mod mcts;
pub mod minimax;
pub mod strategy;

use std::fmt;
use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::game::{Action, Cash, ConfigError, GameState};

pub use mcts::{MctsAgent, MctsNode, NodeId};
pub use minimax::{ExpectiminimaxAgent, SimplifiedMinimaxAgent};

/// 所有代理共享的能力：在需要决策时给出一个合法动作。
pub trait Agent: Send {
    fn name(&self) -> String;

    /// 为站在触发决策格上的 `state.current_player` 选择动作，
    /// 返回值总在 `state.legal_actions(..)` 之中。
    fn choose_action(&mut self, state: &GameState) -> Action;

    /// 给出变卖顺序，使当前玩家凑够 `amount_needed` 现金；垄断与阻挡用的资产最后卖。
    fn choose_assets_to_sell(&self, state: &GameState, amount_needed: Cash) -> Vec<SellOrder> {
        strategy::plan_liquidation(state, state.current_player, amount_needed)
    }

    fn stats(&self) -> AgentStats;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SellKind {
    SellBuilding,
    SellProperty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SellOrder {
    #[serde(rename = "type")]
    pub kind: SellKind,
    pub property_index: u8,
    pub property_name: String,
    pub value: Cash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentStats {
    pub name: String,
    pub algorithm: String,
    pub decisions: u64,
    pub nodes_evaluated: u64,
    pub simulations_run: u64,
    pub last_duration_ms: f64,
}

impl AgentStats {
    pub fn named(name: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            algorithm: algorithm.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    SimplifiedMinimax,
    Expectiminimax,
    Mcts,
    HybridMcts,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::SimplifiedMinimax,
        AgentKind::Expectiminimax,
        AgentKind::Mcts,
        AgentKind::HybridMcts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::SimplifiedMinimax => "simplified_minimax",
            AgentKind::Expectiminimax => "expectiminimax",
            AgentKind::Mcts => "mcts",
            AgentKind::HybridMcts => "hybrid_mcts",
        }
    }

    /// 列出所有代理类型及其可调参数，供前端展示。
    pub fn catalog() -> Vec<AgentDescriptor> {
        Self::ALL.iter().map(|kind| kind.descriptor()).collect()
    }

    fn descriptor(&self) -> AgentDescriptor {
        let defaults = AgentConfig::for_kind(*self);
        let (label, description, tunables) = match self {
            AgentKind::SimplifiedMinimax => (
                "Simplified Minimax",
                "Depth-limited minimax with alpha-beta; dice treated as their average (7).",
                vec![TunableSpec::new("depth", 1.0, 10.0, defaults.depth as f64)],
            ),
            AgentKind::Expectiminimax => (
                "Expectiminimax",
                "Minimax with dice and chance-tile expectation nodes.",
                vec![
                    TunableSpec::new("depth", 1.0, 6.0, defaults.depth as f64),
                    TunableSpec::new(
                        "dice_samples",
                        0.0,
                        11.0,
                        defaults.dice_samples.unwrap_or(0) as f64,
                    ),
                ],
            ),
            AgentKind::Mcts => (
                "MCTS",
                "UCB1-Tuned tree search with heuristic priors and rollouts.",
                vec![
                    TunableSpec::new("simulations", 1.0, 20_000.0, defaults.simulations as f64),
                    TunableSpec::new("exploration", 0.0, 5.0, defaults.exploration),
                    TunableSpec::new(
                        "simulation_depth",
                        1.0,
                        200.0,
                        defaults.simulation_depth as f64,
                    ),
                ],
            ),
            AgentKind::HybridMcts => (
                "Hybrid MCTS",
                "MCTS with short rollouts that stop once wealth diverges.",
                vec![
                    TunableSpec::new("simulations", 1.0, 20_000.0, defaults.simulations as f64),
                    TunableSpec::new(
                        "simulation_depth",
                        1.0,
                        200.0,
                        defaults.simulation_depth as f64,
                    ),
                ],
            ),
        };
        AgentDescriptor {
            kind: *self,
            label: label.to_owned(),
            description: description.to_owned(),
            tunables,
            defaults,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "minimax" | "simplified_minimax" => Ok(AgentKind::SimplifiedMinimax),
            "expectiminimax" => Ok(AgentKind::Expectiminimax),
            "mcts" => Ok(AgentKind::Mcts),
            "hybrid_mcts" | "hybrid" => Ok(AgentKind::HybridMcts),
            _ => Err(ConfigError::UnknownAgent { name: s.to_owned() }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TunableSpec {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl TunableSpec {
    fn new(name: &str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name: name.to_owned(),
            min,
            max,
            default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDescriptor {
    pub kind: AgentKind,
    pub label: String,
    pub description: String,
    pub tunables: Vec<TunableSpec>,
    pub defaults: AgentConfig,
}

/// MCTS 选择阶段使用的打分公式。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    Ucb1,
    Ucb1Tuned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub kind: AgentKind,
    pub depth: u8,
    /// `None` 表示对 11 种点数和做精确期望。
    pub dice_samples: Option<u8>,
    pub alpha_beta: bool,
    pub simulations: u32,
    pub exploration: f64,
    pub simulation_depth: u32,
    /// 财富差超过该值时提前结束模拟（仅混合 MCTS）。
    pub cutoff_threshold: Option<Cash>,
    pub cutoff_min_depth: u32,
    pub selection: SelectionPolicy,
    pub seed: Option<u64>,
}

impl AgentConfig {
    pub fn for_kind(kind: AgentKind) -> Self {
        let base = Self {
            kind,
            depth: 4,
            dice_samples: Some(5),
            alpha_beta: true,
            simulations: 500,
            exploration: 1.414,
            simulation_depth: 50,
            cutoff_threshold: None,
            cutoff_min_depth: 10,
            selection: SelectionPolicy::Ucb1Tuned,
            seed: None,
        };
        match kind {
            AgentKind::SimplifiedMinimax => Self { depth: 6, ..base },
            AgentKind::Expectiminimax => base,
            AgentKind::Mcts => base,
            AgentKind::HybridMcts => Self {
                simulations: 300,
                exploration: 1.0,
                simulation_depth: 20,
                cutoff_threshold: Some(1000),
                ..base
            },
        }
    }

    pub fn with_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_dice_samples(mut self, samples: Option<u8>) -> Self {
        self.dice_samples = samples;
        self
    }

    pub fn with_alpha_beta(mut self, enabled: bool) -> Self {
        self.alpha_beta = enabled;
        self
    }

    pub fn with_simulations(mut self, simulations: u32) -> Self {
        self.simulations = simulations;
        self
    }

    pub fn with_exploration(mut self, exploration: f64) -> Self {
        self.exploration = exploration;
        self
    }

    pub fn with_simulation_depth(mut self, depth: u32) -> Self {
        self.simulation_depth = depth;
        self
    }

    pub fn with_selection(mut self, selection: SelectionPolicy) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::InvalidAgent {
                reason: reason.to_owned(),
            })
        };
        match self.kind {
            AgentKind::SimplifiedMinimax | AgentKind::Expectiminimax => {
                if self.depth == 0 {
                    return invalid("search depth must be at least 1");
                }
                if self.dice_samples == Some(0) {
                    return invalid("dice_samples must be at least 1 when sampling");
                }
            }
            AgentKind::Mcts | AgentKind::HybridMcts => {
                if self.simulations == 0 {
                    return invalid("simulations must be at least 1");
                }
                if !self.exploration.is_finite() || self.exploration < 0.0 {
                    return invalid("exploration must be a finite, non-negative number");
                }
                if self.simulation_depth == 0 {
                    return invalid("simulation_depth must be at least 1");
                }
            }
        }
        Ok(())
    }

    pub(crate) fn rng(&self) -> SmallRng {
        match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig::for_kind(AgentKind::Expectiminimax)
    }
}

pub fn create_agent(config: &AgentConfig) -> Result<Box<dyn Agent>, ConfigError> {
    config.validate()?;
    let agent: Box<dyn Agent> = match config.kind {
        AgentKind::SimplifiedMinimax => Box::new(SimplifiedMinimaxAgent::new(config)),
        AgentKind::Expectiminimax => Box::new(ExpectiminimaxAgent::new(config)),
        AgentKind::Mcts | AgentKind::HybridMcts => Box::new(MctsAgent::new(config)),
    };
    Ok(agent)
}
