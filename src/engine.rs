//! 对局驱动：两个代理轮流行动直到终局，以及多局锦标赛统计。

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ai::{create_agent, Agent, AgentConfig, AgentKind};
use crate::game::{
    BoardConfig, Cash, ConfigError, GameSnapshot, GameState, PlayerId, TurnOptions, TurnRecord,
    TurnResolver, VictoryReason, DEFAULT_MAX_TURNS, DEFAULT_STARTING_CASH, PLAYER_COUNT,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    pub starting_cash: Cash,
    pub max_turns: u32,
    pub seed: Option<u64>,
    pub forced_liquidation: bool,
    pub board: BoardConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_cash: DEFAULT_STARTING_CASH,
            max_turns: DEFAULT_MAX_TURNS,
            seed: None,
            forced_liquidation: false,
            board: BoardConfig::default(),
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starting_cash == 0 {
            return Err(ConfigError::ZeroStartingCash);
        }
        if self.max_turns == 0 {
            return Err(ConfigError::ZeroTurnCap);
        }
        self.board.validate()
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    fn options(&self) -> TurnOptions {
        TurnOptions {
            forced_liquidation: self.forced_liquidation,
        }
    }

    fn rng(&self) -> SmallRng {
        match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        }
    }
}

/// 一局结束后的汇总。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameResult {
    pub winner: Option<PlayerId>,
    pub winner_name: Option<String>,
    pub victory: Option<VictoryReason>,
    pub turns: u32,
    pub final_state: GameSnapshot,
    pub history: Vec<TurnRecord>,
}

pub struct GameEngine {
    config: GameConfig,
    template: GameState,
    state: GameState,
    agents: [Box<dyn Agent>; PLAYER_COUNT],
    rng: SmallRng,
    history: Vec<TurnRecord>,
    /// 由配置创建时保存，`new_game` 据此重建代理。
    agent_configs: Option<[AgentConfig; PLAYER_COUNT]>,
}

fn build_agents(configs: &[AgentConfig; PLAYER_COUNT]) -> Result<[Box<dyn Agent>; PLAYER_COUNT], ConfigError> {
    Ok([create_agent(&configs[0])?, create_agent(&configs[1])?])
}

impl GameEngine {
    pub fn new(config: GameConfig, agents: [Box<dyn Agent>; PLAYER_COUNT]) -> Result<Self, ConfigError> {
        config.validate()?;
        let template = GameState::from_config(&config.board, config.starting_cash, config.max_turns);
        let rng = config.rng();
        debug!(
            first = %agents[0].name(),
            second = %agents[1].name(),
            max_turns = config.max_turns,
            "game created"
        );
        Ok(Self {
            state: template.clone(),
            template,
            agents,
            rng,
            history: Vec::new(),
            agent_configs: None,
            config,
        })
    }

    pub fn from_configs(config: GameConfig, agents: [AgentConfig; PLAYER_COUNT]) -> Result<Self, ConfigError> {
        let mut engine = Self::new(config, build_agents(&agents)?)?;
        engine.agent_configs = Some(agents);
        Ok(engine)
    }

    /// 重置到开局。传入 `seed` 时骰子序列重新播种；由配置创建的代理
    /// 会被重建，随机源与统计一并归零，同一种子的对局可以完整复现。
    pub fn new_game(&mut self, seed: Option<u64>) -> Result<(), ConfigError> {
        if let Some(configs) = &self.agent_configs {
            self.agents = build_agents(configs)?;
        }
        self.state = self.template.clone();
        self.history.clear();
        if let Some(seed) = seed.or(self.config.seed) {
            self.rng = SmallRng::seed_from_u64(seed);
        }
        Ok(())
    }

    pub fn agent_configs(&self) -> Option<&[AgentConfig; PLAYER_COUNT]> {
        self.agent_configs.as_ref()
    }

    /// 推进一个回合；已终局时返回 `None`。
    pub fn play_turn(&mut self) -> Option<TurnRecord> {
        if self.state.game_over {
            return None;
        }
        let seat = self.state.current_player as usize;
        let agent = self.agents[seat].as_mut();
        let record = TurnResolver::play_turn(&mut self.state, agent, self.config.options(), &mut self.rng);
        if record.game_over {
            info!(
                winner = self.state.winner.map(|w| w as i64).unwrap_or(-1),
                turns = self.state.turn,
                "game finished"
            );
        }
        self.history.push(record.clone());
        Some(record)
    }

    pub fn play_game(&mut self) -> GameResult {
        while self.play_turn().is_some() {}
        self.result()
    }

    pub fn result(&self) -> GameResult {
        let winner = self.state.winner;
        GameResult {
            winner,
            winner_name: winner.map(|w| self.agents[w as usize].name()),
            victory: self.state.victory.clone(),
            turns: self.state.turn,
            final_state: self.state.snapshot(),
            history: self.history.clone(),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn history(&self) -> &[TurnRecord] {
        &self.history
    }

    pub fn is_over(&self) -> bool {
        self.state.game_over
    }

    pub fn agent_names(&self) -> [String; PLAYER_COUNT] {
        [self.agents[0].name(), self.agents[1].name()]
    }

    pub fn agent(&self, seat: PlayerId) -> Option<&dyn Agent> {
        self.agents.get(seat as usize).map(|a| a.as_ref())
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }
}

/*********        TOURNAMENT        *********/

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSummary {
    pub name: String,
    pub kind: AgentKind,
    pub wins: u32,
    pub win_rate: f64,
    pub average_final_cash: f64,
    pub average_final_wealth: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSummary {
    pub game: u32,
    /// 先手代理在 `agents` 中的下标。
    pub first_agent: usize,
    pub winner_agent: Option<usize>,
    pub turns: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victory: Option<VictoryReason>,
    /// 按代理下标排列，而非座位。
    pub final_cash: [Cash; PLAYER_COUNT],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TournamentReport {
    pub games: u32,
    pub draws: u32,
    pub agents: Vec<AgentSummary>,
    pub results: Vec<GameSummary>,
}

fn offset_seed(seed: Option<u64>, game: u32) -> Option<u64> {
    seed.map(|s| s.wrapping_add(game as u64))
}

/// 两个代理之间进行 `games` 局相互独立的对局，轮换先手。
/// 每局使用全新的代理与状态；设置了种子时按局序号偏移。
pub fn run_tournament(
    config: &GameConfig,
    agents: [AgentConfig; PLAYER_COUNT],
    games: u32,
) -> Result<TournamentReport, ConfigError> {
    config.validate()?;
    for agent in &agents {
        agent.validate()?;
    }

    let mut wins = [0u32; PLAYER_COUNT];
    let mut cash_sum = [0f64; PLAYER_COUNT];
    let mut wealth_sum = [0f64; PLAYER_COUNT];
    let mut names = [String::new(), String::new()];
    let mut draws = 0;
    let mut results = Vec::with_capacity(games as usize);

    for game in 0..games {
        let swapped = game % 2 == 1;
        // 座位 -> 代理下标
        let order = if swapped { [1, 0] } else { [0, 1] };
        let seated = order.map(|idx| {
            let cfg = &agents[idx];
            cfg.clone().with_seed(offset_seed(cfg.seed, game))
        });
        let game_config = config.clone().with_seed(offset_seed(config.seed, game));

        let mut engine = GameEngine::from_configs(game_config, seated)?;
        let seat_names = engine.agent_names();
        let result = engine.play_game();

        let mut final_cash = [0; PLAYER_COUNT];
        for (seat, &idx) in order.iter().enumerate() {
            let stats = &result.final_state.player_stats[seat];
            final_cash[idx] = stats.cash;
            cash_sum[idx] += stats.cash as f64;
            wealth_sum[idx] += stats.total_wealth as f64;
            if names[idx].is_empty() {
                names[idx] = seat_names[seat].clone();
            }
        }

        let winner_agent = result.winner.map(|seat| order[seat as usize]);
        match winner_agent {
            Some(idx) => wins[idx] += 1,
            None => draws += 1,
        }

        results.push(GameSummary {
            game,
            first_agent: order[0],
            winner_agent,
            turns: result.turns,
            victory: result.victory,
            final_cash,
        });

        if (game + 1) % 10 == 0 {
            info!(completed = game + 1, total = games, wins_a = wins[0], wins_b = wins[1], "tournament progress");
        }
    }

    let played = games.max(1) as f64;
    let summaries = (0..PLAYER_COUNT)
        .map(|idx| AgentSummary {
            name: std::mem::take(&mut names[idx]),
            kind: agents[idx].kind,
            wins: wins[idx],
            win_rate: if games == 0 { 0.0 } else { wins[idx] as f64 / played },
            average_final_cash: cash_sum[idx] / played,
            average_final_wealth: wealth_sum[idx] / played,
        })
        .collect();

    Ok(TournamentReport {
        games,
        draws,
        agents: summaries,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::SelectionPolicy;

    fn quick_minimax() -> AgentConfig {
        AgentConfig::for_kind(AgentKind::SimplifiedMinimax)
            .with_depth(1)
            .with_seed(Some(1))
    }

    fn quick_mcts() -> AgentConfig {
        AgentConfig::for_kind(AgentKind::Mcts)
            .with_simulations(16)
            .with_simulation_depth(6)
            .with_selection(SelectionPolicy::Ucb1)
            .with_seed(Some(2))
    }

    fn short_game(seed: u64) -> GameConfig {
        GameConfig::default().with_max_turns(60).with_seed(Some(seed))
    }

    #[test]
    fn game_runs_to_completion() {
        let mut engine =
            GameEngine::from_configs(short_game(5), [quick_minimax(), quick_mcts()]).expect("engine");
        let result = engine.play_game();

        assert!(engine.is_over());
        assert!(result.winner.is_some());
        assert!(result.winner_name.is_some());
        assert!(result.turns <= 60);
        assert_eq!(result.history.len() as u32, result.turns);
        assert!(engine.play_turn().is_none(), "no turns after the end");
        assert!(engine.state().integrity_check().is_ok());
    }

    #[test]
    fn history_alternates_players() {
        let mut engine =
            GameEngine::from_configs(short_game(8), [quick_minimax(), quick_minimax()]).expect("engine");
        for _ in 0..6 {
            engine.play_turn();
        }
        let players: Vec<_> = engine.history().iter().map(|r| r.player).collect();
        assert_eq!(players, vec![0, 1, 0, 1, 0, 1]);
        for record in engine.history() {
            assert!((2..=12).contains(&record.dice_roll));
        }
    }

    #[test]
    fn seeded_games_replay_identically() {
        let play = || {
            GameEngine::from_configs(short_game(21), [quick_minimax(), quick_mcts()])
                .expect("engine")
                .play_game()
        };
        let first = play();
        let second = play();
        assert_eq!(first.history, second.history);
        assert_eq!(first.winner, second.winner);
    }

    #[test]
    fn new_game_resets_state() {
        let mut engine =
            GameEngine::from_configs(short_game(3), [quick_minimax(), quick_minimax()]).expect("engine");
        engine.play_turn();
        engine.play_turn();
        engine.new_game(None).expect("reset");
        assert_eq!(engine.state().turn, 0);
        assert!(engine.history().is_empty());
        assert_eq!(engine.state().cash, [DEFAULT_STARTING_CASH; PLAYER_COUNT]);
    }

    #[test]
    fn replay_after_reset_is_identical() {
        let emm = AgentConfig::for_kind(AgentKind::Expectiminimax)
            .with_depth(2)
            .with_seed(Some(6));
        let mut engine = GameEngine::from_configs(short_game(5), [emm, quick_mcts()]).expect("engine");
        let first = engine.play_game();

        engine.new_game(None).expect("reset");
        assert_eq!(engine.agent(0).map(|a| a.stats().decisions), Some(0));
        let second = engine.play_game();
        assert_eq!(first.history, second.history);
        assert_eq!(first.winner, second.winner);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = GameConfig {
            max_turns: 0,
            ..GameConfig::default()
        };
        assert_eq!(
            GameEngine::from_configs(config, [quick_minimax(), quick_minimax()]).err(),
            Some(ConfigError::ZeroTurnCap)
        );
    }

    #[test]
    fn tournament_wins_sum_to_games() {
        let report = run_tournament(&short_game(100), [quick_minimax(), quick_mcts()], 10).expect("tournament");
        assert_eq!(report.games, 10);
        assert_eq!(report.results.len(), 10);
        let total: u32 = report.agents.iter().map(|a| a.wins).sum();
        assert_eq!(total + report.draws, 10);
        assert_eq!(report.draws, 0);

        let firsts: Vec<_> = report.results.iter().map(|r| r.first_agent).collect();
        assert_eq!(firsts, vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
        let rate_sum: f64 = report.agents.iter().map(|a| a.win_rate).sum();
        assert!((rate_sum - 1.0).abs() < 1e-9);
    }
}
