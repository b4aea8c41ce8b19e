use thiserror::Error;

use crate::model::{ParamKey, ScenarioId};

/// Errors raised by the configuration store at construction or mutation time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown parameter '{0}'")]
    UnknownParameter(ParamKey),
    #[error("invalid value {value} for parameter '{key}': {reason}")]
    InvalidParameterValue {
        key: ParamKey,
        value: f64,
        reason: String,
    },
    #[error("parameter '{0}' is not numeric")]
    NotNumeric(ParamKey),
    #[error("parameter '{0}' is not text")]
    NotText(ParamKey),
    #[error("parameter '{0}' is derived and cannot be set directly")]
    DerivedParameter(ParamKey),
    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(ParamKey),
    #[error("derived field '{target}' depends on undeclared parameter '{input}'")]
    UnresolvedInput { target: ParamKey, input: ParamKey },
    #[error("derived fields form a cycle through '{0}'")]
    DerivationCycle(ParamKey),
    #[error("derived field '{target}' could not be computed: {reason}")]
    Derivation { target: ParamKey, reason: String },
}

/// Errors in a discount schedule definition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("declining schedule has no tiers")]
    EmptyTiers,
    #[error("first tier must start at offset 0, found {0}")]
    FirstTierOffset(u32),
    #[error("tier starting at offset {found} does not follow the previous tier (expected {expected})")]
    NonContiguous { expected: u32, found: u32 },
    #[error("tier [{start}, {end}] ends before it starts")]
    InvertedTier { start: u32, end: u32 },
    #[error("only the last tier may be open-ended (tier starting at {0})")]
    OpenEndedTier(u32),
    #[error("discount rate {0} must be finite and greater than -1")]
    InvalidRate(f64),
}

/// Errors reported by a scenario evaluator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("required configuration field '{0}' is missing")]
    MissingField(ParamKey),
    #[error("scenario '{0}' is not known to the evaluator")]
    UnknownScenario(ScenarioId),
    #[error("evaluator returned a record for year {returned} when asked for {requested}")]
    YearMismatch { requested: i32, returned: i32 },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("model failure: {0}")]
    Model(String),
}

/// Errors in a marginal distribution definition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributionError {
    #[error("invalid {distribution} parameters: {reason}")]
    InvalidParameters {
        distribution: &'static str,
        reason: &'static str,
    },
}

/// Errors in declared correlations or while inducing them
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorrelationError {
    #[error("correlation between '{first}' and '{second}' is {coefficient}, outside [-1, 1]")]
    OutOfRange {
        first: ParamKey,
        second: ParamKey,
        coefficient: f64,
    },
    #[error("parameter '{0}' cannot be correlated with itself")]
    SelfCorrelation(ParamKey),
    #[error("correlation between '{first}' and '{second}' is declared twice")]
    Duplicate { first: ParamKey, second: ParamKey },
    #[error("correlated parameter '{0}' is not a registered uncertain parameter")]
    UnknownParameter(ParamKey),
    #[error("target correlation matrix is not positive definite")]
    NotPositiveDefinite,
    #[error("{samples} samples are too few to induce correlation across {dimensions} parameters")]
    TooFewSamples { samples: usize, dimensions: usize },
}

/// Errors while loading or validating run settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_saphyr::Error),
    #[error("failed to write settings: {0}")]
    Write(#[from] serde_saphyr::ser::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Top-level error for every engine operation
#[derive(Debug, Error)]
pub enum ValuationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("scenario '{scenario}' failed: {source}")]
    Evaluation {
        scenario: ScenarioId,
        #[source]
        source: EvaluationError,
    },
    #[error("distribution for '{parameter}': {source}")]
    Distribution {
        parameter: ParamKey,
        #[source]
        source: DistributionError,
    },
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("scenarios '{first}' and '{second}' cover different years")]
    HorizonMismatch { first: ScenarioId, second: ScenarioId },
    #[error("iteration exceeded its time budget of {budget_ms} ms")]
    IterationTimeout { budget_ms: u64 },
    #[error("base configuration changed during the run (fingerprint {before:#018x} -> {after:#018x})")]
    BaseConfigurationModified { before: u64, after: u64 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("failed to export report: {0}")]
    Export(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ValuationError>;
