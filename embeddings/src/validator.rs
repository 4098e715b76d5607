//! Gatekeeper for vectors returned by an embedding API.
//!
//! Four independent checks run in a fixed order: shape, non-zero, value
//! range, dimension match. The first failure is the one reported.

use crate::error::ValidationFailure;
use crate::models::expected_dimensions;

/// Default half-width of the accepted value band.
pub const DEFAULT_RANGE_TOLERANCE: f32 = 1.1;

type Check = fn(&EmbeddingValidator, &[f32], &str) -> Result<(), ValidationFailure>;

/// Validates candidate embeddings.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingValidator {
    tolerance: f32,
}

impl EmbeddingValidator {
    const CHECKS: [Check; 4] = [
        Self::check_shape,
        Self::check_non_zero,
        Self::check_range,
        Self::check_dimensions,
    ];

    /// Create a validator with the default tolerance.
    pub fn new() -> Self {
        Self {
            tolerance: DEFAULT_RANGE_TOLERANCE,
        }
    }

    /// Accept values within `[-tolerance, tolerance]`.
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance.abs();
        self
    }

    /// Tolerance in use.
    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Run every check against `embedding` produced by `model`.
    pub fn validate(&self, embedding: &[f32], model: &str) -> Result<(), ValidationFailure> {
        Self::CHECKS
            .iter()
            .try_for_each(|check| check(self, embedding, model))
    }

    fn check_shape(&self, embedding: &[f32], _model: &str) -> Result<(), ValidationFailure> {
        if embedding.is_empty() || embedding.iter().any(|x| !x.is_finite()) {
            return Err(ValidationFailure::InvalidShape);
        }
        Ok(())
    }

    fn check_non_zero(&self, embedding: &[f32], _model: &str) -> Result<(), ValidationFailure> {
        if embedding.iter().all(|x| *x == 0.0) {
            return Err(ValidationFailure::AllZeros);
        }
        Ok(())
    }

    fn check_range(&self, embedding: &[f32], _model: &str) -> Result<(), ValidationFailure> {
        let tolerance = self.tolerance;
        match embedding
            .iter()
            .position(|x| !(-tolerance..=tolerance).contains(x))
        {
            Some(index) => Err(ValidationFailure::OutOfRange {
                index,
                value: embedding[index],
                tolerance,
            }),
            None => Ok(()),
        }
    }

    fn check_dimensions(&self, embedding: &[f32], model: &str) -> Result<(), ValidationFailure> {
        let expected = expected_dimensions(model);
        if embedding.len() != expected {
            return Err(ValidationFailure::DimensionMismatch {
                model: model.to_string(),
                expected,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl Default for EmbeddingValidator {
    fn default() -> Self {
        Self::new()
    }
}
