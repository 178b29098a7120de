pub mod engine;
pub mod players;

pub use engine::{EngineClient, EngineRpcError, HttpEngineClient};
pub use players::{HttpPlayersClient, PlayersClient};
