//! 对局注册表：以显式的 `GameStore` 管理进行中的对局，供边界层调用。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::ai::{create_agent, AgentConfig, AgentDescriptor, AgentKind, AgentStats, SelectionPolicy};
use crate::engine::{run_tournament, GameConfig, GameEngine, GameResult, TournamentReport};
use crate::game::{
    Action, Cash, ConfigError, GameSnapshot, GameState, PlayerId, TurnRecord, PLAYER_COUNT,
};

/// 单次快进的回合上限。
pub const MAX_FAST_FORWARD: u32 = 50;
/// 单次锦标赛的局数上限。
pub const MAX_TOURNAMENT_GAMES: u32 = 100;
/// 视图中附带的最近回合数。
pub const RECENT_HISTORY: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Error)]
#[serde(tag = "type")]
pub enum SessionError {
    #[error("game `{game_id}` not found")]
    GameNotFound { game_id: String },
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
    #[error("configuration error: {error}")]
    Config { error: ConfigError },
}

impl From<ConfigError> for SessionError {
    fn from(error: ConfigError) -> Self {
        SessionError::Config { error }
    }
}

/// 前端传来的代理描述：类型字符串加可选调参。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub depth: Option<u8>,
    pub dice_samples: Option<u8>,
    pub alpha_beta: Option<bool>,
    pub simulations: Option<u32>,
    pub exploration: Option<f64>,
    pub simulation_depth: Option<u32>,
    pub selection: Option<SelectionPolicy>,
    pub seed: Option<u64>,
}

impl AgentRequest {
    pub fn of(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            ..Self::default()
        }
    }

    pub fn to_config(&self) -> Result<AgentConfig, ConfigError> {
        let kind: AgentKind = self.kind.parse()?;
        let mut config = AgentConfig::for_kind(kind);
        if let Some(depth) = self.depth {
            config = config.with_depth(depth);
        }
        if let Some(samples) = self.dice_samples {
            config = config.with_dice_samples(Some(samples));
        }
        if let Some(enabled) = self.alpha_beta {
            config = config.with_alpha_beta(enabled);
        }
        if let Some(simulations) = self.simulations {
            config = config.with_simulations(simulations);
        }
        if let Some(exploration) = self.exploration {
            config = config.with_exploration(exploration);
        }
        if let Some(depth) = self.simulation_depth {
            config = config.with_simulation_depth(depth);
        }
        if let Some(selection) = self.selection {
            config = config.with_selection(selection);
        }
        config = config.with_seed(self.seed);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewGameRequest {
    pub agents: [AgentRequest; PLAYER_COUNT],
    pub starting_cash: Option<Cash>,
    pub max_turns: Option<u32>,
    pub seed: Option<u64>,
    pub forced_liquidation: bool,
}

impl Default for NewGameRequest {
    fn default() -> Self {
        Self {
            agents: [
                AgentRequest::of(AgentKind::Expectiminimax.as_str()),
                AgentRequest::of(AgentKind::Mcts.as_str()),
            ],
            starting_cash: None,
            max_turns: None,
            seed: None,
            forced_liquidation: false,
        }
    }
}

impl NewGameRequest {
    pub fn game_config(&self) -> GameConfig {
        let defaults = GameConfig::default();
        GameConfig {
            starting_cash: self.starting_cash.unwrap_or(defaults.starting_cash),
            max_turns: self.max_turns.unwrap_or(defaults.max_turns),
            seed: self.seed,
            forced_liquidation: self.forced_liquidation,
            ..defaults
        }
    }

    pub fn agent_configs(&self) -> Result<[AgentConfig; PLAYER_COUNT], ConfigError> {
        Ok([self.agents[0].to_config()?, self.agents[1].to_config()?])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TournamentRequest {
    pub agents: [AgentRequest; PLAYER_COUNT],
    pub games: u32,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// 对局视图：快照、代理信息与最近的回合记录。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameView {
    pub game_id: String,
    pub agents: [String; PLAYER_COUNT],
    pub agent_stats: Vec<AgentStats>,
    pub state: GameSnapshot,
    pub recent_history: Vec<TurnRecord>,
    pub total_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub player: PlayerId,
    pub action: Action,
    pub legal_actions: Vec<Action>,
    pub stats: AgentStats,
}

impl Suggestion {
    pub fn compute(state: &GameState, config: &AgentConfig) -> Result<Self, ConfigError> {
        let mut agent = create_agent(config)?;
        let player = state.current_player;
        let action = agent.choose_action(state);
        Ok(Self {
            player,
            action,
            legal_actions: state.legal_actions(player),
            stats: agent.stats(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResponse {
    pub turns: Vec<TurnRecord>,
    pub view: GameView,
}

struct Session {
    engine: GameEngine,
    agents: [AgentConfig; PLAYER_COUNT],
}

impl Session {
    fn view(&self, game_id: &str) -> GameView {
        let history = self.engine.history();
        let start = history.len().saturating_sub(RECENT_HISTORY);
        GameView {
            game_id: game_id.to_owned(),
            agents: self.engine.agent_names(),
            agent_stats: (0..PLAYER_COUNT as u8)
                .filter_map(|seat| self.engine.agent(seat).map(|a| a.stats()))
                .collect(),
            state: self.engine.state().snapshot(),
            recent_history: history[start..].to_vec(),
            total_turns: history.len(),
        }
    }
}

/// 进行中对局的显式存储，生命周期为 create / read / delete。
#[derive(Default)]
pub struct GameStore {
    games: HashMap<String, Session>,
    next_id: u64,
}

impl GameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn contains(&self, game_id: &str) -> bool {
        self.games.contains_key(game_id)
    }

    pub fn create_game(&mut self, request: &NewGameRequest) -> Result<GameView, SessionError> {
        let agents = request.agent_configs()?;
        let engine = GameEngine::from_configs(request.game_config(), agents.clone())?;
        self.next_id += 1;
        let game_id = format!("game_{}", self.next_id);
        info!(game_id = %game_id, "session created");
        let session = Session { engine, agents };
        let view = session.view(&game_id);
        self.games.insert(game_id, session);
        Ok(view)
    }

    pub fn get_game(&self, game_id: &str) -> Result<GameView, SessionError> {
        self.session(game_id).map(|s| s.view(game_id))
    }

    pub fn step(&mut self, game_id: &str) -> Result<StepResponse, SessionError> {
        self.fast_forward(game_id, 1)
    }

    /// 连续推进至多 `turns` 个回合（上限 [`MAX_FAST_FORWARD`]），遇到终局即停。
    pub fn fast_forward(&mut self, game_id: &str, turns: u32) -> Result<StepResponse, SessionError> {
        if turns == 0 || turns > MAX_FAST_FORWARD {
            return Err(SessionError::InvalidRequest {
                reason: format!("turns must be between 1 and {MAX_FAST_FORWARD}"),
            });
        }
        let session = self.session_mut(game_id)?;
        let mut played = Vec::new();
        for _ in 0..turns {
            match session.engine.play_turn() {
                Some(record) => played.push(record),
                None => break,
            }
        }
        debug!(game_id, played = played.len(), "fast forward");
        Ok(StepResponse {
            turns: played,
            view: session.view(game_id),
        })
    }

    /// 从开局重新完整对弈一局并返回结果。
    pub fn auto_play(&mut self, game_id: &str) -> Result<GameResult, SessionError> {
        let session = self.session_mut(game_id)?;
        session.engine.new_game(None)?;
        Ok(session.engine.play_game())
    }

    pub fn delete_game(&mut self, game_id: &str) -> Result<(), SessionError> {
        self.games
            .remove(game_id)
            .map(|_| info!(game_id, "session deleted"))
            .ok_or_else(|| SessionError::GameNotFound {
                game_id: game_id.to_owned(),
            })
    }

    pub fn state_of(&self, game_id: &str) -> Result<GameSnapshot, SessionError> {
        self.session(game_id).map(|s| s.engine.state().snapshot())
    }

    /// 克隆当前状态及当前玩家座位上的代理配置，以便在不影响对局的前提下计算建议。
    pub fn suggestion_input(&self, game_id: &str) -> Result<(GameState, AgentConfig), SessionError> {
        let session = self.session(game_id)?;
        let state = session.engine.state().clone();
        let config = session.agents[state.current_player as usize].clone();
        Ok((state, config))
    }

    /// 让当前玩家的代理给出建议动作，但不落子。
    pub fn suggest(&self, game_id: &str) -> Result<Suggestion, SessionError> {
        let (state, config) = self.suggestion_input(game_id)?;
        Ok(Suggestion::compute(&state, &config)?)
    }

    fn session(&self, game_id: &str) -> Result<&Session, SessionError> {
        self.games.get(game_id).ok_or_else(|| SessionError::GameNotFound {
            game_id: game_id.to_owned(),
        })
    }

    fn session_mut(&mut self, game_id: &str) -> Result<&mut Session, SessionError> {
        self.games.get_mut(game_id).ok_or_else(|| SessionError::GameNotFound {
            game_id: game_id.to_owned(),
        })
    }
}

pub fn tournament(request: &TournamentRequest) -> Result<TournamentReport, SessionError> {
    if request.games == 0 || request.games > MAX_TOURNAMENT_GAMES {
        return Err(SessionError::InvalidRequest {
            reason: format!("games must be between 1 and {MAX_TOURNAMENT_GAMES}"),
        });
    }
    let mut config = GameConfig::default().with_seed(request.seed);
    if let Some(max_turns) = request.max_turns {
        config = config.with_max_turns(max_turns);
    }
    let agents = [request.agents[0].to_config()?, request.agents[1].to_config()?];
    Ok(run_tournament(&config, agents, request.games)?)
}

pub fn agent_catalog() -> Vec<AgentDescriptor> {
    AgentKind::catalog()
}
