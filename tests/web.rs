//! 浏览器环境下的冒烟测试，使用 `wasm-pack test --headless --chrome` 运行。
#![cfg(target_arch = "wasm32")]

use monopoly_ai::{list_agents, validate_config, GameConfig, GameView, MonopolyArena, StepResponse};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

const CHEAP_GAME: &str = r#"{
    "agents": [
        {"type": "minimax", "depth": 1},
        {"type": "mcts", "simulations": 8, "simulation_depth": 4, "seed": 1}
    ],
    "max_turns": 30,
    "seed": 7
}"#;

#[wasm_bindgen_test]
fn create_and_step_game() {
    let mut arena = MonopolyArena::new();
    let json = arena.create_game_json(CHEAP_GAME).expect("create");
    let view: GameView = serde_json::from_str(&json).expect("view");
    assert_eq!(view.game_id, "game_1");

    let step = arena.step(&view.game_id).expect("step");
    let step: StepResponse = from_value(step).expect("decode");
    assert_eq!(step.turns.len(), 1);
    assert_eq!(arena.game_count(), 1);

    arena.delete_game(&view.game_id).expect("delete");
    assert_eq!(arena.game_count(), 0);
}

#[wasm_bindgen_test]
fn unknown_game_is_an_error() {
    let mut arena = MonopolyArena::new();
    assert!(arena.step("game_404").is_err());
}

#[wasm_bindgen_test]
fn agents_are_listed() {
    let agents = list_agents().expect("catalog");
    assert!(js_sys_array_len(&agents) == 4);
}

#[wasm_bindgen_test]
fn bad_config_is_rejected() {
    let config = GameConfig {
        max_turns: 0,
        ..GameConfig::default()
    };
    let value = to_value(&config).expect("encode");
    assert!(validate_config(value).is_err());
    assert!(validate_config(to_value(&GameConfig::default()).expect("encode")).is_ok());
}

fn js_sys_array_len(value: &JsValue) -> u32 {
    web_sys::js_sys::Array::from(value).length()
}
