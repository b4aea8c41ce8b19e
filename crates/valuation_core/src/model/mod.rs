mod ids;
mod records;

pub use ids::{ParamKey, ScenarioId};
pub use records::{AnnualRecord, AssetPosition, Horizon, ScenarioResult};
