// Parameter validation for playback operations
//
// Volume and pan are checked on the calling thread before any work reaches
// the dispatcher. Out-of-range values are rejected, never clamped.

use crate::error::EngineError;

pub const VOLUME_MIN: f32 = 0.0;
pub const VOLUME_MAX: f32 = 1.0;
pub const PAN_MIN: f32 = -1.0;
pub const PAN_MAX: f32 = 1.0;

/// Validator for playback parameters
pub struct ParamValidator;

impl ParamValidator {
    /// Validate a volume value
    ///
    /// # Arguments
    /// * `volume` - Linear gain
    ///
    /// # Returns
    /// * `Ok(())` - Value in [0.0, 1.0]
    /// * `Err(EngineError::Validation)` - Out of range or NaN
    pub fn volume(volume: f32) -> Result<(), EngineError> {
        Self::check("volume", volume, VOLUME_MIN, VOLUME_MAX)
    }

    /// Validate a pan value
    ///
    /// # Arguments
    /// * `pan` - Stereo position, -1.0 (left) to 1.0 (right)
    ///
    /// # Returns
    /// * `Ok(())` - Value in [-1.0, 1.0]
    /// * `Err(EngineError::Validation)` - Out of range or NaN
    pub fn pan(pan: f32) -> Result<(), EngineError> {
        Self::check("pan", pan, PAN_MIN, PAN_MAX)
    }

    fn check(parameter: &'static str, value: f32, min: f32, max: f32) -> Result<(), EngineError> {
        // NaN fails the range test as well
        if (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(EngineError::Validation {
                parameter,
                value,
                min,
                max,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_bounds_inclusive() {
        assert!(ParamValidator::volume(0.0).is_ok());
        assert!(ParamValidator::volume(1.0).is_ok());
        assert!(ParamValidator::volume(0.37).is_ok());
    }

    #[test]
    fn test_volume_out_of_range() {
        match ParamValidator::volume(1.01).unwrap_err() {
            EngineError::Validation {
                parameter, value, ..
            } => {
                assert_eq!(parameter, "volume");
                assert_eq!(value, 1.01);
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }
        assert!(ParamValidator::volume(-0.001).is_err());
    }

    #[test]
    fn test_pan_bounds() {
        assert!(ParamValidator::pan(-1.0).is_ok());
        assert!(ParamValidator::pan(1.0).is_ok());
        assert!(ParamValidator::pan(1.5).is_err());
        assert!(ParamValidator::pan(-1.5).is_err());
    }

    #[test]
    fn test_nan_and_infinity_rejected() {
        assert!(ParamValidator::volume(f32::NAN).is_err());
        assert!(ParamValidator::pan(f32::NAN).is_err());
        assert!(ParamValidator::volume(f32::INFINITY).is_err());
    }
}
