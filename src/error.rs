use thiserror::Error;

/// Fixed message returned to callers of the single-buyer service whenever the solver fails
pub const OPTIMIZATION_UNSUCCESSFUL: &str = "Optimization was unsuccessful";

/// Failures of the numerical backend that prevent it from producing a point at all
#[derive(Debug, Error)]
pub enum MinimizerError {
    #[error("problem dimensions do not match: {0}")]
    DimensionMismatch(String),
    #[error("invalid solver settings: {0}")]
    Settings(String),
    #[error("solver setup failed: {0}")]
    Setup(String),
}

/// Errors of the market core (optimizers and game engine)
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("optimization unsuccessful after {iterations} iterations: {message}")]
    OptimizationUnsuccessful { message: String, iterations: u32 },
    #[error(transparent)]
    Minimizer(#[from] MinimizerError),
}

impl MarketError {
    pub fn invalid(message: impl Into<String>) -> Self {
        MarketError::InvalidInput(message.into())
    }
}

/// Errors surfaced at the single-buyer service boundary
///
/// Everything except malformed input collapses into one fixed message so no solver
/// detail leaks to the caller.
#[derive(Debug, Error, PartialEq)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Optimization was unsuccessful")]
    OptimizationUnsuccessful,
}

impl ServiceError {
    /// HTTP-style status category of the failure
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::InvalidInput(_) => 400,
            ServiceError::OptimizationUnsuccessful => 500,
        }
    }

    /// JSON body `{"message": ...}` describing the failure
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({ "message": self.to_string() })
    }
}

impl From<MarketError> for ServiceError {
    fn from(error: MarketError) -> Self {
        match error {
            MarketError::InvalidInput(message) => ServiceError::InvalidInput(message),
            MarketError::OptimizationUnsuccessful { .. } | MarketError::Minimizer(_) => {
                ServiceError::OptimizationUnsuccessful
            }
        }
    }
}
