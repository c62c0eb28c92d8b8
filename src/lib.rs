pub mod ai;
pub mod engine;
pub mod game;
pub mod session;
pub mod utils;

use gloo_timers::future::TimeoutFuture;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{
    create_agent, Agent, AgentConfig, AgentDescriptor, AgentKind, AgentStats, ExpectiminimaxAgent,
    MctsAgent, SelectionPolicy, SellKind, SellOrder, SimplifiedMinimaxAgent,
};
pub use engine::{
    run_tournament, AgentSummary, GameConfig, GameEngine, GameResult, GameSummary, TournamentReport,
};
pub use game::{
    Action, Board, BoardConfig, Cash, ChanceEffect, ChanceKind, ConfigError, GameSnapshot, GameState,
    IntegrityError, Landing, PlayerId, PlayerStats, Property, TurnOptions, TurnRecord, TurnResolver,
    VictoryReason,
};
pub use session::{
    AgentRequest, GameStore, GameView, NewGameRequest, SessionError, StepResponse, Suggestion,
    TournamentRequest,
};

use utils::{console_log, set_panic_hook};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error(error: SessionError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn is_missing(value: &JsValue) -> bool {
    value.is_undefined() || value.is_null()
}

/// 浏览器侧的对局会话入口，内部持有一个 `GameStore`。
#[wasm_bindgen]
pub struct MonopolyArena {
    store: GameStore,
}

#[wasm_bindgen]
impl MonopolyArena {
    #[wasm_bindgen(constructor)]
    pub fn new() -> MonopolyArena {
        MonopolyArena {
            store: GameStore::new(),
        }
    }

    /// 创建对局；`request` 省略时使用默认的期望极小极大 vs MCTS。
    pub fn create_game(&mut self, request: JsValue) -> Result<JsValue, JsValue> {
        let request: NewGameRequest = if is_missing(&request) {
            NewGameRequest::default()
        } else {
            from_value(request).map_err(JsValue::from)?
        };
        let view = self.store.create_game(&request).map_err(to_js_error)?;
        console_log(&format!("created {}", view.game_id));
        to_value(&view).map_err(JsValue::from)
    }

    pub fn create_game_json(&mut self, request_json: &str) -> Result<String, JsValue> {
        let request: NewGameRequest = serde_json::from_str(request_json).map_err(serde_to_js_error)?;
        let view = self.store.create_game(&request).map_err(to_js_error)?;
        serde_json::to_string(&view).map_err(serde_to_js_error)
    }

    pub fn get_game(&self, game_id: &str) -> Result<JsValue, JsValue> {
        let view = self.store.get_game(game_id).map_err(to_js_error)?;
        to_value(&view).map_err(JsValue::from)
    }

    pub fn state_json(&self, game_id: &str) -> Result<String, JsValue> {
        let snapshot = self.store.state_of(game_id).map_err(to_js_error)?;
        serde_json::to_string(&snapshot).map_err(serde_to_js_error)
    }

    pub fn step(&mut self, game_id: &str) -> Result<JsValue, JsValue> {
        let response = self.store.step(game_id).map_err(to_js_error)?;
        to_value(&response).map_err(JsValue::from)
    }

    pub fn fast_forward(&mut self, game_id: &str, turns: u32) -> Result<JsValue, JsValue> {
        let response = self.store.fast_forward(game_id, turns).map_err(to_js_error)?;
        to_value(&response).map_err(JsValue::from)
    }

    pub fn auto_play(&mut self, game_id: &str) -> Result<JsValue, JsValue> {
        let result = self.store.auto_play(game_id).map_err(to_js_error)?;
        console_log(&format!(
            "{game_id} finished after {} turns, winner {:?}",
            result.turns, result.winner_name
        ));
        to_value(&result).map_err(JsValue::from)
    }

    pub fn delete_game(&mut self, game_id: &str) -> Result<(), JsValue> {
        self.store.delete_game(game_id).map_err(to_js_error)
    }

    pub fn game_count(&self) -> usize {
        self.store.len()
    }

    /// 异步计算当前玩家代理的建议动作（不落子），可选先等待 `delay_ms` 毫秒。
    pub fn suggest_action(&self, game_id: &str, delay_ms: Option<u32>) -> Result<Promise, JsValue> {
        let (state, config) = self.store.suggestion_input(game_id).map_err(to_js_error)?;
        let delay = delay_ms.unwrap_or(0);

        Ok(future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let suggestion = Suggestion::compute(&state, &config)
                .map_err(|error| to_js_error(SessionError::from(error)))?;
            let json = serde_json::to_string(&suggestion).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        }))
    }
}

impl Default for MonopolyArena {
    fn default() -> Self {
        Self::new()
    }
}

/// 列出可用的代理类型、可调参数及默认值。
#[wasm_bindgen(js_name = "listAgents")]
pub fn list_agents() -> Result<JsValue, JsValue> {
    to_value(&session::agent_catalog()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "runTournament")]
pub fn run_tournament_js(request: JsValue) -> Result<JsValue, JsValue> {
    let request: TournamentRequest = from_value(request).map_err(JsValue::from)?;
    let report = session::tournament(&request).map_err(to_js_error)?;
    to_value(&report).map_err(JsValue::from)
}

/// 返回标准棋盘配置，方便前端渲染。
#[wasm_bindgen(js_name = "standardBoard")]
pub fn standard_board() -> Result<JsValue, JsValue> {
    to_value(&*game::STANDARD_CONFIG).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateConfig")]
pub fn validate_config(config: JsValue) -> Result<(), JsValue> {
    let config: GameConfig = from_value(config).map_err(JsValue::from)?;
    config
        .validate()
        .map_err(|error| to_js_error(SessionError::from(error)))
}

#[wasm_bindgen(js_name = "validateAgent")]
pub fn validate_agent(request: JsValue) -> Result<JsValue, JsValue> {
    let request: AgentRequest = from_value(request).map_err(JsValue::from)?;
    let config = request
        .to_config()
        .map_err(|error| to_js_error(SessionError::from(error)))?;
    to_value(&config).map_err(JsValue::from)
}
